//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest nickname accepted, in characters.
pub const MAX_NICKNAME_CHARS: usize = 32;

/// Validates a player nickname: 1 to 32 characters after trimming, no control characters.
pub fn validate_nickname(nickname: &str) -> Result<(), ValidationError> {
    let trimmed = nickname.trim();
    let length = trimmed.chars().count();
    if length == 0 || length > MAX_NICKNAME_CHARS {
        let mut err = ValidationError::new("nickname_length");
        err.message = Some(
            format!("Nickname must be 1 to {MAX_NICKNAME_CHARS} characters (got {length})").into(),
        );
        return Err(err);
    }

    if trimmed.chars().any(char::is_control) {
        let mut err = ValidationError::new("nickname_format");
        err.message = Some("Nickname must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a join code is made of ASCII digits only.
///
/// The exact length is a configuration concern and is checked on lookup.
pub fn validate_join_code(code: &str) -> Result<(), ValidationError> {
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
        let mut err = ValidationError::new("join_code_format");
        err.message = Some("Join code must contain only digits".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_nickname_valid() {
        assert!(validate_nickname("ana").is_ok());
        assert!(validate_nickname("  Zoë the great ").is_ok());
        assert!(validate_nickname(&"x".repeat(32)).is_ok());
    }

    #[test]
    fn test_validate_nickname_invalid() {
        assert!(validate_nickname("").is_err());
        assert!(validate_nickname("   ").is_err());
        assert!(validate_nickname(&"x".repeat(33)).is_err());
        assert!(validate_nickname("bad\u{7}bell").is_err());
    }

    #[test]
    fn test_validate_join_code() {
        assert!(validate_join_code("042137").is_ok());
        assert!(validate_join_code("").is_err());
        assert!(validate_join_code("12a456").is_err());
        assert!(validate_join_code("12 456").is_err());
    }
}
