//! Redacted storage for Hub access tokens.
//!
//! Tokens arrive through YAML configuration and are only handed to the Hub
//! client; they must never show up in logs or `Debug` dumps of a config.

use serde::Deserialize;
use std::fmt;

/// A string whose content is hidden from `Debug` and `Display`.
///
/// Deserializes from a plain string so it can sit directly in a config file.
///
/// # Example
///
/// ```
/// use unclip_core::SecretString;
///
/// let token = SecretString::new("hf_abcdef");
/// assert_eq!(format!("{:?}", token), "SecretString([REDACTED])");
/// assert_eq!(token.expose_secret(), "hf_abcdef");
/// ```
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct SecretString {
    inner: String,
}

impl SecretString {
    /// Wrap a secret value.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            inner: secret.into(),
        }
    }

    /// Expose the secret value.
    ///
    /// Only call this at the point where the token is handed to the Hub client.
    #[inline]
    pub fn expose_secret(&self) -> &str {
        &self.inner
    }

    /// Check if the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Drop for SecretString {
    fn drop(&mut self) {
        // Best effort: the allocator may still have copies from earlier reallocations.
        if !self.inner.is_empty() {
            // SAFETY: we own the buffer exclusively, the pointer is valid for `len`
            // bytes, and zero bytes keep the string valid UTF-8.
            unsafe {
                let ptr = self.inner.as_mut_ptr();
                for i in 0..self.inner.len() {
                    std::ptr::write_volatile(ptr.add(i), 0);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_and_display_redact() {
        let secret = SecretString::new("hf_token_value");
        assert_eq!(format!("{:?}", secret), "SecretString([REDACTED])");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(secret.expose_secret(), "hf_token_value");
    }

    #[test]
    fn test_deserialize_from_plain_string() {
        let secret: SecretString = serde_yaml::from_str("\"hf_from_yaml\"").unwrap();
        assert_eq!(secret.expose_secret(), "hf_from_yaml");
        assert!(!secret.is_empty());
        assert!(SecretString::default().is_empty());
    }
}
