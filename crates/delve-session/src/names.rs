//! Validation of the names a client presents at contact time.

use crate::SessionError;

/// Nicks no player may take.
const RESERVED_NICKS: &[&str] = &["server", "account"];

/// Validates and normalises the contact names.
///
/// Returns the nick with trailing whitespace removed and its first letter
/// upper-cased. The nick must start with an ASCII letter and contain only
/// letters, digits, and spaces. Real name and host must be non-empty and
/// free of control characters.
pub fn check_names(nick: &str, real: &str, host: &str) -> Result<String, SessionError> {
    let nick = nick.trim_end();

    let mut chars = nick.chars();
    let first = chars
        .next()
        .ok_or_else(|| SessionError::InvalidName("empty nick".into()))?;
    if !first.is_ascii_alphabetic() {
        return Err(SessionError::InvalidName(format!(
            "nick must start with a letter: {nick:?}"
        )));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == ' ') {
        return Err(SessionError::InvalidName(format!(
            "nick may only hold letters, digits and spaces: {nick:?}"
        )));
    }
    if RESERVED_NICKS.iter().any(|r| r.eq_ignore_ascii_case(nick)) {
        return Err(SessionError::InvalidName(format!("nick {nick:?} is reserved")));
    }

    for (what, value) in [("real name", real), ("host", host)] {
        if value.is_empty() {
            return Err(SessionError::InvalidName(format!("empty {what}")));
        }
        if value.chars().any(char::is_control) {
            return Err(SessionError::InvalidName(format!(
                "{what} holds control characters"
            )));
        }
    }

    let mut normalised = String::with_capacity(nick.len());
    normalised.push(first.to_ascii_uppercase());
    normalised.push_str(&nick[first.len_utf8()..]);
    Ok(normalised)
}
