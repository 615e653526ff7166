//! Masking and sanitisation for log output.
//!
//! Session strings, API hashes, phone numbers and login codes must never
//! reach the logs in the clear. Everything here is pure string work; callers
//! apply it at the logging call site.

use {once_cell::sync::Lazy, regex::Regex, sha2::Digest};

#[allow(clippy::expect_used)]
static HEX32_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[a-f0-9]{32}").expect("hex32 regex"));

#[allow(clippy::expect_used)]
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\+\d{10,15}").expect("phone regex"));

#[allow(clippy::expect_used)]
static CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{5}\b").expect("code regex"));

/// Truncated preview of a secret: `head…tail`, at most `visible` characters
/// of the secret shown in total. Secrets no longer than `visible` are
/// returned unchanged.
pub fn preview(secret: &str, visible: usize) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= visible {
        return secret.to_string();
    }
    let head: String = chars[..visible / 2].iter().collect();
    let tail: String = chars[chars.len() - visible / 2..].iter().collect();
    format!("{head}…{tail}")
}

/// Stable short hash of a user id for privacy-preserving action logs.
pub fn hashed_id(user_id: i64) -> String {
    let digest = sha2::Sha256::digest(user_id.to_string().as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

/// Scrub credential-shaped substrings out of free text before logging.
///
/// Replaces 32-char hex runs (API hashes), international phone numbers and
/// 5-digit codes. Applied to backend error text, which can echo user input.
pub fn sanitize(text: &str) -> String {
    let text = HEX32_RE.replace_all(text, "[api-hash]");
    let text = PHONE_RE.replace_all(&text, "[phone]");
    CODE_RE.replace_all(&text, "[code]").into_owned()
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_long_secrets() {
        let secret = "0123456789abcdefghijklmnopqrstuvwxyz";
        let p = preview(secret, 8);
        assert_eq!(p, "0123…wxyz");
        assert!(p.len() < secret.len());
    }

    #[test]
    fn preview_keeps_short_values() {
        assert_eq!(preview("short", 20), "short");
    }

    #[test]
    fn hashed_id_is_stable_and_short() {
        let a = hashed_id(42);
        let b = hashed_id(42);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_ne!(a, hashed_id(43));
    }

    #[test]
    fn sanitize_scrubs_api_hashes() {
        let msg = "bad hash 0123456789ABCDEF0123456789abcdef rejected";
        assert_eq!(sanitize(msg), "bad hash [api-hash] rejected");
    }

    #[test]
    fn sanitize_scrubs_phones_and_codes() {
        let msg = "sign_in(+12025550123, 12345) failed";
        let out = sanitize(msg);
        assert!(!out.contains("+12025550123"));
        assert!(!out.contains("12345"));
        assert!(out.contains("[phone]"));
        assert!(out.contains("[code]"));
    }

    #[test]
    fn sanitize_leaves_ordinary_text_alone() {
        assert_eq!(sanitize("connection reset by peer"), "connection reset by peer");
    }
}
