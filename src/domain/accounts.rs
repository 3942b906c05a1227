//! Account credential rules and the stored password digest.

use sha2::{Digest, Sha512};

use crate::domain::error::DomainError;

pub const MIN_ACCOUNT_NAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 6;

fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

fn is_word(value: &str, min_len: usize) -> bool {
    value.len() >= min_len && value.chars().all(is_word_char)
}

pub fn validate_account_name(account_name: &str) -> Result<(), DomainError> {
    if is_word(account_name, MIN_ACCOUNT_NAME_LEN) {
        Ok(())
    } else {
        Err(DomainError::InvalidAccountName(account_name.to_string()))
    }
}

pub fn validate_password(password: &str) -> Result<(), DomainError> {
    if is_word(password, MIN_PASSWORD_LEN) {
        Ok(())
    } else {
        Err(DomainError::InvalidPassword)
    }
}

pub fn validate_credentials(account_name: &str, password: &str) -> Result<(), DomainError> {
    validate_account_name(account_name)?;
    validate_password(password)
}

fn sha512_hex(input: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize().to_vec())
}

/// Digest stored in `users.passhash`: `sha512(password ":" sha512(account_name))`,
/// both hex encoded. The account name acts as the salt.
pub fn password_digest(account_name: &str, password: &str) -> String {
    let salt = sha512_hex(account_name);
    sha512_hex(&format!("{password}:{salt}"))
}
