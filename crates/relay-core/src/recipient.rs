//! Recipient normalization.
//!
//! Callers type phone numbers the way humans write them:
//! `"+1 (555) 000-1111"`.  The chat network addresses a user by the bare
//! digits followed by a fixed suffix: `"15550001111@c.us"`.
//!
//! # Normalization rule
//!
//! 1. Strip every character that is not an ASCII digit.
//! 2. Reject the result if it has fewer than [`MIN_RECIPIENT_DIGITS`] digits.
//! 3. Append [`ADDRESS_SUFFIX`].
//!
//! Because the suffix contains no digits, normalizing an already-normalized
//! address yields the same address.

use std::fmt;

use thiserror::Error;

/// Suffix the network uses for individual user addresses.
pub const ADDRESS_SUFFIX: &str = "@c.us";

/// Minimum number of digits a phone number must have.
pub const MIN_RECIPIENT_DIGITS: usize = 10;

/// The recipient could not be turned into a valid address.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid phone number: {raw}")]
pub struct InvalidRecipient {
    /// The input exactly as supplied.
    pub raw: String,
}

/// A canonical channel address such as `15550001111@c.us`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelAddress(String);

impl ChannelAddress {
    /// Normalizes a raw recipient string.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRecipient`] when fewer than [`MIN_RECIPIENT_DIGITS`]
    /// digits remain after stripping.
    ///
    /// # Example
    ///
    /// ```rust
    /// use relay_core::ChannelAddress;
    ///
    /// let addr = ChannelAddress::parse("+1 (555) 000-1111").unwrap();
    /// assert_eq!(addr.as_str(), "15550001111@c.us");
    /// assert!(ChannelAddress::parse("555-1111").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self, InvalidRecipient> {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        if digits.len() < MIN_RECIPIENT_DIGITS {
            return Err(InvalidRecipient {
                raw: raw.to_string(),
            });
        }
        Ok(Self(format!("{digits}{ADDRESS_SUFFIX}")))
    }

    /// Returns the full address.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
