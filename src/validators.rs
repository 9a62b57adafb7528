/// Input validators for credentials
///
/// Format checks run before any store access, so malformed usernames and
/// passwords never reach the database.
/// Lengths are measured in bytes, like the bcrypt input limit.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 20;
const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 32;

lazy_static! {
    // Anything other than letters, digits, whitespace, '_' and '-'
    static ref USERNAME_DISALLOWED: Regex = Regex::new(r"[^\p{L}\p{N}\s_-]").unwrap();
    static ref HAS_LETTER: Regex = Regex::new(r"\p{L}").unwrap();
    static ref HAS_DIGIT: Regex = Regex::new(r"\d").unwrap();
    static ref HAS_SPECIAL: Regex = Regex::new(r"\p{P}|\p{S}").unwrap();
}

/// Validates a username
/// - 3 to 20 bytes
/// - letters, digits, whitespace, underscore and hyphen only
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() {
        return Err(ValidationError::EmptyField("username"));
    }

    if username.len() < MIN_USERNAME_LENGTH {
        return Err(ValidationError::TooShort("username", MIN_USERNAME_LENGTH));
    }

    if username.len() > MAX_USERNAME_LENGTH {
        return Err(ValidationError::TooLong("username", MAX_USERNAME_LENGTH));
    }

    if USERNAME_DISALLOWED.is_match(username) {
        return Err(ValidationError::InvalidCharacters("username"));
    }

    Ok(())
}

/// Validates a new password against the password policy
/// - 8 to 32 bytes
/// - at least one letter, one digit and one punctuation or symbol character
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    check_password_length(password)?;

    let satisfied = HAS_LETTER.is_match(password)
        && HAS_DIGIT.is_match(password)
        && HAS_SPECIAL.is_match(password);

    if !satisfied {
        return Err(ValidationError::PasswordCriteriaUnmet);
    }

    Ok(())
}

/// Format check for a password presented at login.
///
/// Only the length bounds and a ban on control characters apply here, so
/// passwords stored before the character-class rule still authenticate.
pub fn validate_login_password(password: &str) -> Result<(), ValidationError> {
    check_password_length(password)?;

    if password.chars().any(char::is_control) {
        return Err(ValidationError::InvalidCharacters("password"));
    }

    Ok(())
}

fn check_password_length(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::EmptyField("password"));
    }

    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort("password", MIN_PASSWORD_LENGTH));
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong("password", MAX_PASSWORD_LENGTH));
    }

    Ok(())
}
