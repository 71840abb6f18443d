use core::fmt;

use crate::{Error, Result};

/// Longest namespace accepted, in bytes.
pub const MAX_NAMESPACE_LEN: usize = 512;

/// A validated namespace: the logical partition a counter sequence is scoped
/// to.
///
/// Namespaces are non-empty, at most [`MAX_NAMESPACE_LEN`] bytes, and contain
/// no whitespace or control characters. They are checked before any I/O so a
/// bad name never reaches the store.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Namespace<'a>(&'a str);

impl<'a> Namespace<'a> {
    /// Validates `raw` as a namespace.
    ///
    /// # Errors
    /// Returns [`Error::InvalidNamespace`] describing the first rule broken.
    pub fn parse(raw: &'a str) -> Result<Self> {
        if raw.is_empty() {
            return Err(invalid("namespace is empty"));
        }
        if raw.len() > MAX_NAMESPACE_LEN {
            return Err(invalid(format!(
                "namespace is {} bytes, limit is {MAX_NAMESPACE_LEN}",
                raw.len()
            )));
        }
        if let Some(c) = raw.chars().find(|c| c.is_whitespace() || c.is_control()) {
            return Err(invalid(format!(
                "namespace contains forbidden character {c:?}"
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &'a str {
        self.0
    }
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::InvalidNamespace {
        reason: reason.into(),
    }
}

impl fmt::Display for Namespace<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl fmt::Debug for Namespace<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Namespace({:?})", self.0)
    }
}

impl AsRef<str> for Namespace<'_> {
    fn as_ref(&self) -> &str {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        for ok in ["order", "user:profile", "tenant-42.invoices", "订单"] {
            assert_eq!(Namespace::parse(ok).unwrap().as_str(), ok);
        }
    }

    #[test]
    fn rejects_empty_whitespace_and_control() {
        for bad in ["", " ", "two words", "tab\there", "nl\n", "bell\u{7}"] {
            assert!(
                matches!(Namespace::parse(bad), Err(Error::InvalidNamespace { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_oversized() {
        let long = "n".repeat(MAX_NAMESPACE_LEN + 1);
        assert!(Namespace::parse(&long).is_err());
        let edge = "n".repeat(MAX_NAMESPACE_LEN);
        assert!(Namespace::parse(&edge).is_ok());
    }
}
