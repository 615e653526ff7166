//! Input validation for conversation steps.
//!
//! Pure functions: raw text in, normalized value or a user-facing reason out.
//! A failed validation never ends a flow; the state machine re-prompts with
//! the reason attached.

use thiserror::Error;

/// A rejected input with a reason suitable for showing to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ValidationError {
    reason: String,
}

impl ValidationError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Parse an API ID: a positive integer of at least 6 digits.
pub fn api_id(input: &str) -> Result<i32, ValidationError> {
    let value: i64 = input
        .trim()
        .parse()
        .map_err(|_| ValidationError::new("The API ID must be a number"))?;
    if value < 100_000 {
        return Err(ValidationError::new(
            "The API ID must be a positive number with at least 6 digits",
        ));
    }
    i32::try_from(value).map_err(|_| ValidationError::new("The API ID is out of range"))
}

/// Parse an API hash: exactly 32 hex characters, normalized to lowercase.
pub fn api_hash(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.len() != 32 || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::new(
            "The API hash must be a 32-character hexadecimal string",
        ));
    }
    Ok(trimmed.to_ascii_lowercase())
}

/// Parse a phone number in international format.
///
/// Everything except digits is stripped (separators and a leading '+' are
/// common paste artifacts); the result is 1 to 15 digits with a non-zero
/// leading digit, normalized to a '+' prefix.
pub fn phone_number(input: &str) -> Result<String, ValidationError> {
    let digits: String = input.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() || digits.len() > 15 || digits.starts_with('0') {
        return Err(ValidationError::new(
            "The phone number must be in international format, e.g. +12025550123",
        ));
    }
    Ok(format!("+{digits}"))
}

/// Parse a login code: exactly 5 digits after stripping separators.
pub fn otp(input: &str) -> Result<String, ValidationError> {
    let digits: String = input.chars().filter(char::is_ascii_digit).collect();
    if digits.len() != 5 {
        return Err(ValidationError::new("The login code must be 5 digits"));
    }
    Ok(digits)
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("123456", 123456)]
    #[case(" 29839172 ", 29839172)]
    #[case("100000", 100_000)]
    fn api_id_accepts_six_plus_digits(#[case] input: &str, #[case] expected: i32) {
        assert_eq!(api_id(input).unwrap(), expected);
    }

    #[rstest]
    #[case("12345")] // too short
    #[case("0")]
    #[case("-123456")]
    #[case("abc")]
    #[case("12e45")]
    #[case("99999999999999999")] // overflows i32
    fn api_id_rejects_bad_input(#[case] input: &str) {
        assert!(api_id(input).is_err());
    }

    #[test]
    fn api_hash_normalizes_to_lowercase() {
        let hash = "0123456789ABCDEF0123456789abcdef";
        assert_eq!(api_hash(hash).unwrap(), hash.to_ascii_lowercase());
        assert_eq!(api_hash(&format!("  {hash} ")).unwrap(), hash.to_ascii_lowercase());
    }

    #[rstest]
    #[case("0123456789abcdef0123456789abcde")] // 31 chars
    #[case("0123456789abcdef0123456789abcdef0")] // 33 chars
    #[case("0123456789abcdef0123456789abcdeg")] // non-hex char
    #[case("")]
    fn api_hash_rejects_mutations(#[case] input: &str) {
        assert!(api_hash(input).is_err());
    }

    #[test]
    fn phone_number_normalizes() {
        assert_eq!(phone_number("12025550123").unwrap(), "+12025550123");
        assert_eq!(phone_number("+1 202 555 0123").unwrap(), "+12025550123");
        assert_eq!(phone_number("+44 (20) 7123-4567").unwrap(), "+442071234567");
    }

    #[rstest]
    #[case("0")] // leading zero
    #[case("")]
    #[case("+")]
    #[case("1234567890123456")] // 16 digits
    #[case("0123456789")]
    fn phone_number_rejects_bad_input(#[case] input: &str) {
        assert!(phone_number(input).is_err());
    }

    #[test]
    fn otp_strips_separators() {
        assert_eq!(otp("12 345").unwrap(), "12345");
        assert_eq!(otp("1-2-3-4-5").unwrap(), "12345");
    }

    #[rstest]
    #[case("123")]
    #[case("123456")]
    #[case("abcde")]
    fn otp_rejects_wrong_length(#[case] input: &str) {
        assert!(otp(input).is_err());
    }
}
