//! Prefixed ULID identifiers for users, sessions, and tokens.

use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = chat_common::id::prefixed_ulid("usr");
/// assert!(id.starts_with("usr_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Well-known ID prefixes.
pub mod prefix {
    /// A registered user.
    pub const USER: &str = "usr";
    /// A live gateway connection session.
    pub const SESSION: &str = "ses";
    /// An opaque bearer token.
    pub const TOKEN: &str = "tok";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_ulid_format() {
        let id = prefixed_ulid(prefix::USER);
        assert!(id.starts_with("usr_"));
        // ULID is 26 chars, plus prefix + underscore.
        assert_eq!(id.len(), 4 + 26);
    }

    #[test]
    fn prefixed_ulid_is_unique() {
        let a = prefixed_ulid(prefix::SESSION);
        let b = prefixed_ulid(prefix::SESSION);
        assert_ne!(a, b);
    }
}
