use crate::error::{AppError, Result};

/// Maximum length of a user or device identifier.
const MAX_IDENTIFIER_LEN: usize = 255;

/// Validates an identifier that becomes part of a cache key.
///
/// # Arguments
///
/// * `field` - The field name, for the error message.
/// * `value` - The identifier to validate.
/// * `separator` - The key separator, which must not appear in `value`.
///
/// # Returns
///
/// A `Result<()>` indicating whether the identifier is valid.
pub fn validate_identifier(field: &str, value: &str, separator: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} must not be empty", field)));
    }

    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            field, MAX_IDENTIFIER_LEN
        )));
    }

    if value.contains(separator) {
        return Err(AppError::Validation(format!(
            "{} must not contain '{}'",
            field, separator
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        assert!(validate_identifier("id", "user-42", "::").is_ok());
    }

    #[test]
    fn rejects_empty_long_and_separator() {
        assert!(matches!(validate_identifier("id", "  ", "::"), Err(AppError::Validation(_))));
        assert!(matches!(
            validate_identifier("id", &"x".repeat(256), "::"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(validate_identifier("device_id", "a::b", "::"), Err(AppError::Validation(_))));
    }
}
