use core::{
    fmt,
    hash::{Hash, Hasher},
};
use std::collections::hash_map::DefaultHasher;

use crate::PoolConfig;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6379;

/// Where and as whom to connect.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Identity of a pool inside the registry.
///
/// Two requests share a pool exactly when host, port, username, password and
/// pool configuration all match. The password and configuration are kept
/// only as digests.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password_digest: u64,
    pub pool_config_digest: u64,
}

impl ConnectionDescriptor {
    pub fn new(endpoint: &Endpoint, config: &PoolConfig) -> Self {
        let mut hasher = DefaultHasher::new();
        endpoint.password.hash(&mut hasher);
        Self {
            host: endpoint.host.clone(),
            port: endpoint.port,
            username: endpoint.username.clone(),
            password_digest: hasher.finish(),
            pool_config_digest: config.digest(),
        }
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{:016x}.{:016x}",
            self.host,
            self.port,
            self.username.as_deref().unwrap_or("-"),
            self.password_digest,
            self.pool_config_digest
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_password() {
        let endpoint = Endpoint::new("cache", 6380).with_password("hunter2");
        let dbg = format!("{endpoint:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn descriptor_distinguishes_every_component() {
        let config = PoolConfig::default();
        let base = Endpoint::new("cache", 6379).with_password("a");
        let same = ConnectionDescriptor::new(&base.clone(), &config);
        assert_eq!(ConnectionDescriptor::new(&base, &config), same);

        let variants = [
            ConnectionDescriptor::new(&Endpoint::new("other", 6379).with_password("a"), &config),
            ConnectionDescriptor::new(&Endpoint::new("cache", 6380).with_password("a"), &config),
            ConnectionDescriptor::new(&base.clone().with_username("app"), &config),
            ConnectionDescriptor::new(&Endpoint::new("cache", 6379).with_password("b"), &config),
            ConnectionDescriptor::new(&base, &config.clone().with_max_active(3)),
        ];
        for variant in variants {
            assert_ne!(variant, same);
        }
    }

    #[test]
    fn display_hides_password() {
        let endpoint = Endpoint::new("cache", 6379).with_password("hunter2");
        let name = ConnectionDescriptor::new(&endpoint, &PoolConfig::default()).to_string();
        assert!(name.starts_with("cache.6379.-."));
        assert!(!name.contains("hunter2"));
    }
}
