//! Country hints from international phone prefixes.

/// Dialling-prefix table, longest prefixes first so `+971` wins over `+9`.
const COUNTRY_PREFIXES: &[(&str, &str)] = &[
    ("+966", "SA"),
    ("+971", "AE"),
    ("+1", "US/CA"),
    ("+7", "RU/KZ"),
    ("+20", "EG"),
    ("+27", "ZA"),
    ("+33", "FR"),
    ("+34", "ES"),
    ("+39", "IT"),
    ("+44", "UK"),
    ("+49", "DE"),
    ("+52", "MX"),
    ("+55", "BR"),
    ("+61", "AU"),
    ("+81", "JP"),
    ("+82", "KR"),
    ("+86", "CN"),
    ("+90", "TR"),
    ("+91", "IN"),
    ("+98", "IR"),
];

/// Best-effort country hint for a normalized `+`-prefixed phone number.
pub fn country_hint(phone: &str) -> Option<&'static str> {
    COUNTRY_PREFIXES
        .iter()
        .filter(|(prefix, _)| phone.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, country)| *country)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_prefixes() {
        assert_eq!(country_hint("+12025550123"), Some("US/CA"));
        assert_eq!(country_hint("+919876543210"), Some("IN"));
        assert_eq!(country_hint("+442071234567"), Some("UK"));
    }

    #[test]
    fn longest_prefix_wins() {
        // +971 (AE) must not be shadowed by +9x prefixes.
        assert_eq!(country_hint("+971501234567"), Some("AE"));
        assert_eq!(country_hint("+966501234567"), Some("SA"));
    }

    #[test]
    fn unknown_prefix() {
        assert_eq!(country_hint("+999123"), None);
    }
}
