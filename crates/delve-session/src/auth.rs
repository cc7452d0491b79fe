//! Account validation hook.
//!
//! Delve does not store accounts. It calls an [`AccountValidator`] once per
//! player contact, with the nick and password from the contact record, and
//! turns a rejection into the `Account` status code.
//!
//! The call happens on the reactor thread in the middle of a tick, so an
//! implementation must answer from memory or a local cache and must not
//! block.

use crate::SessionError;

/// What the validator knows about an accepted account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountInfo {
    /// Stable account identifier. Two sessions with the same id belong to
    /// the same person, which lets a reconnect replace a stale session.
    pub account_id: u32,
    /// Characters already on the account.
    pub characters: u16,
    /// Character slots the account may use.
    pub max_characters: u16,
}

/// Checks a nick/password pair.
///
/// # Example
///
/// ```rust
/// use delve_session::{AccountInfo, AccountValidator, SessionError};
///
/// /// Only lets one nick in.
/// struct Whitelist;
///
/// impl AccountValidator for Whitelist {
///     fn validate(&self, nick: &str, _pass: &str) -> Result<AccountInfo, SessionError> {
///         if nick == "Gimli" {
///             Ok(AccountInfo { account_id: 1, characters: 1, max_characters: 4 })
///         } else {
///             Err(SessionError::AccountRejected(format!("{nick} is not invited")))
///         }
///     }
/// }
/// ```
pub trait AccountValidator: Send + 'static {
    /// Returns account details, or `SessionError::AccountRejected`.
    fn validate(&self, nick: &str, pass: &str) -> Result<AccountInfo, SessionError>;
}

/// Accepts everyone. Each nick maps to its own account.
///
/// Meant for demos and tests.
#[derive(Debug, Clone, Copy)]
pub struct AllowAll {
    pub max_characters: u16,
}

impl Default for AllowAll {
    fn default() -> Self {
        Self { max_characters: 1 }
    }
}

impl AccountValidator for AllowAll {
    fn validate(&self, nick: &str, _pass: &str) -> Result<AccountInfo, SessionError> {
        Ok(AccountInfo {
            account_id: account_id_for(nick),
            characters: 1,
            max_characters: self.max_characters,
        })
    }
}

/// FNV-1a over the lower-cased nick; stable across runs.
fn account_id_for(nick: &str) -> u32 {
    nick.bytes()
        .map(|b| b.to_ascii_lowercase())
        .fold(0x811c_9dc5u32, |h, b| (h ^ u32::from(b)).wrapping_mul(0x0100_0193))
}
