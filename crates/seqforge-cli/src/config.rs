use std::time::Duration;

use anyhow::bail;
use clap::{Parser, Subcommand, ValueEnum};
use seqforge::{BackendKind, ClockSequenceConfig, Endpoint, FULL_64, IdWidth, Namespace, PoolConfig};

/// Command-line surface of the `seqforge` binary.
///
/// Every global option can also be supplied through the environment (or a
/// `.env` file next to the working directory).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "seqforge",
    version,
    about = "Issue and inspect namespace-scoped sequence IDs"
)]
pub struct CliArgs {
    /// Backend serving `next`, `current` and `set`.
    ///
    /// Environment variable: `SEQFORGE_BACKEND`
    #[arg(long, env = "SEQFORGE_BACKEND", value_enum, default_value_t = Backend::Counter)]
    pub backend: Backend,

    /// Environment variable: `REDIS_HOST`
    #[arg(long, env = "REDIS_HOST", default_value_t = String::from("127.0.0.1"))]
    pub redis_host: String,

    /// Environment variable: `REDIS_PORT`
    #[arg(long, env = "REDIS_PORT", default_value_t = 6379)]
    pub redis_port: u16,

    /// Environment variable: `REDIS_USERNAME`
    #[arg(long, env = "REDIS_USERNAME")]
    pub redis_username: Option<String>,

    /// Environment variable: `REDIS_PASSWORD`
    #[arg(long, env = "REDIS_PASSWORD", hide_env_values = true)]
    pub redis_password: Option<String>,

    /// Connect, read and write timeout for Redis connections.
    ///
    /// Environment variable: `REDIS_TIMEOUT_MS`
    #[arg(long, env = "REDIS_TIMEOUT_MS", default_value_t = 10_000)]
    pub redis_timeout_ms: u64,

    /// Prefix prepended to every namespace to form the counter key.
    ///
    /// Environment variable: `KEY_PREFIX`
    #[arg(long, env = "KEY_PREFIX", default_value_t = String::from(seqforge::DEFAULT_KEY_PREFIX))]
    pub key_prefix: String,

    /// Upper bound on open connections.
    ///
    /// Environment variable: `MAX_ACTIVE`
    #[arg(long, env = "MAX_ACTIVE", default_value_t = seqforge::DEFAULT_MAX_ACTIVE)]
    pub max_active: usize,

    /// How long to wait for a free connection before giving up.
    ///
    /// Environment variable: `MAX_WAIT_MS`
    #[arg(long, env = "MAX_WAIT_MS", default_value_t = seqforge::DEFAULT_MAX_WAIT_MS)]
    pub max_wait_ms: u64,

    /// Node id embedded in clock-sequence IDs. Must be unique among
    /// processes issuing IDs concurrently.
    ///
    /// Environment variable: `NODE_ID`
    #[arg(long, env = "NODE_ID", default_value_t = 0)]
    pub node_id: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Counter,
    Clock,
}

impl From<Backend> for BackendKind {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Counter => Self::Counter,
            Backend::Clock => Self::Clock,
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Advance a namespace and print the issued IDs.
    Next {
        namespace: String,
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Print the current value of a namespace.
    Current { namespace: String },
    /// Overwrite the current value of a namespace.
    Set {
        namespace: String,
        #[arg(allow_hyphen_values = true)]
        value: i64,
    },
    /// Generate clock-sequence IDs locally.
    Snowflake {
        #[arg(long, default_value_t = IdWidth::Full64)]
        width: IdWidth,
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Break an ID into its timestamp, node and sequence fields.
    Decode {
        id: u128,
        #[arg(long, default_value_t = IdWidth::Full64)]
        width: IdWidth,
    },
}

/// Validated settings derived from [`CliArgs`].
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub backend: BackendKind,
    pub endpoint: Endpoint,
    pub redis_timeout: Duration,
    pub pool: PoolConfig,
    pub key_prefix: String,
    pub clock: ClockSequenceConfig,
    pub command: Command,
}

impl TryFrom<CliArgs> for CliConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.max_active == 0 {
            bail!("MAX_ACTIVE must be greater than 0");
        }

        if args.redis_timeout_ms == 0 {
            bail!("REDIS_TIMEOUT_MS must be greater than 0");
        }

        let max_node_id = FULL_64.max_node_id();
        if args.node_id > max_node_id {
            bail!(
                "NODE_ID ({}) exceeds the node id space (max = {})",
                args.node_id,
                max_node_id
            );
        }

        if args.key_prefix.chars().any(|c| c.is_whitespace() || c.is_control()) {
            bail!("KEY_PREFIX must not contain whitespace or control characters");
        }

        match &args.command {
            Command::Next { namespace, count } => {
                Namespace::parse(namespace)?;
                if *count == 0 {
                    bail!("--count must be greater than 0");
                }
            }
            Command::Current { namespace } | Command::Set { namespace, .. } => {
                Namespace::parse(namespace)?;
            }
            Command::Snowflake { count, .. } => {
                if *count == 0 {
                    bail!("--count must be greater than 0");
                }
            }
            Command::Decode { id, width } => {
                let bits = width.layout().width;
                if bits < u128::BITS && *id >> bits != 0 {
                    bail!("{id} does not fit the {bits}-bit `{width}` layout");
                }
            }
        }

        let mut endpoint = Endpoint::new(args.redis_host, args.redis_port);
        endpoint.username = args.redis_username;
        endpoint.password = args.redis_password;

        let pool = PoolConfig::default()
            .with_max_active(args.max_active)
            .with_max_wait_ms(args.max_wait_ms);

        Ok(Self {
            backend: args.backend.into(),
            endpoint,
            redis_timeout: Duration::from_millis(args.redis_timeout_ms),
            pool,
            key_prefix: args.key_prefix,
            clock: ClockSequenceConfig::new(args.node_id),
            command: args.command,
        })
    }
}
