//! Phone number normalization
//!
//! Everything that crosses a store boundary is held in E.164 form
//! (`+` followed by country code and subscriber digits). Numbers that cannot
//! be brought into that form are unusable and are dropped by the caller.

/// Normalize a raw phone number into E.164.
///
/// Accepts already-normalized numbers (`+14155550100`), international
/// dialing prefixes (`0044...`), national format with a trunk zero
/// (`07911...` with a known country), and bare national significant numbers
/// for NANP countries. Formatting characters are stripped.
///
/// Idempotent: normalizing an already-normalized number returns it unchanged.
pub fn normalize_e164(raw: &str, default_country: &str) -> Option<String> {
    let trimmed = raw.trim();
    let has_plus = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

    if has_plus {
        return valid_e164_digits(&digits).then(|| format!("+{}", digits));
    }

    // International dialing prefix
    if let Some(rest) = digits.strip_prefix("00") {
        return valid_e164_digits(rest).then(|| format!("+{}", rest));
    }

    let country_code = calling_code(default_country);

    // National format with trunk zero, e.g. "07911 123456" in GB
    if let Some(rest) = digits.strip_prefix('0') {
        let code = country_code?;
        let candidate = format!("{}{}", code, rest.trim_start_matches('0'));
        return valid_e164_digits(&candidate).then(|| format!("+{}", candidate));
    }

    // Bare 10-digit national significant number in NANP countries
    if digits.len() == 10 && country_code == Some("1") {
        return Some(format!("+1{}", digits));
    }

    // Already carries its country code, just missing the plus
    if let Some(code) = country_code {
        if digits.starts_with(code) && digits.len() > 10 && valid_e164_digits(&digits) {
            return Some(format!("+{}", digits));
        }
    }

    None
}

fn valid_e164_digits(digits: &str) -> bool {
    (8..=15).contains(&digits.len()) && !digits.starts_with('0')
}

/// ITU calling code for an ISO 3166 alpha-2 country.
fn calling_code(country: &str) -> Option<&'static str> {
    match country.to_ascii_uppercase().as_str() {
        "US" | "CA" => Some("1"),
        "GB" | "UK" => Some("44"),
        "IE" => Some("353"),
        "AU" => Some("61"),
        "NZ" => Some("64"),
        "DE" => Some("49"),
        "FR" => Some("33"),
        "ES" => Some("34"),
        "IT" => Some("39"),
        "NL" => Some("31"),
        "BE" => Some("32"),
        "PT" => Some("351"),
        "IN" => Some("91"),
        "SG" => Some("65"),
        "MX" => Some("52"),
        "BR" => Some("55"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_normalized_is_unchanged() {
        assert_eq!(
            normalize_e164("+14155550100", "US"),
            Some("+14155550100".to_string())
        );
    }

    #[test]
    fn test_idempotent() {
        for raw in ["+447911123456", "0044 7911 123456", "(415) 555-0100"] {
            let once = normalize_e164(raw, "GB").or_else(|| normalize_e164(raw, "US"));
            let once = once.expect("normalizes");
            assert_eq!(normalize_e164(&once, "GB"), Some(once.clone()));
        }
    }

    #[test]
    fn test_international_prefix_matches_plus_form() {
        assert_eq!(
            normalize_e164("00447911123456", "GB"),
            normalize_e164("+447911123456", "GB")
        );
    }

    #[test]
    fn test_national_trunk_zero() {
        assert_eq!(
            normalize_e164("07911 123456", "GB"),
            Some("+447911123456".to_string())
        );
    }

    #[test]
    fn test_bare_nanp_number() {
        assert_eq!(
            normalize_e164("415-555-0100", "US"),
            Some("+14155550100".to_string())
        );
    }

    #[test]
    fn test_formatting_characters_stripped() {
        assert_eq!(
            normalize_e164("+1 (415) 555-0100", "US"),
            Some("+14155550100".to_string())
        );
    }

    #[test]
    fn test_unusable_input_dropped() {
        assert_eq!(normalize_e164("", "US"), None);
        assert_eq!(normalize_e164("front desk", "US"), None);
        assert_eq!(normalize_e164("123", "US"), None);
        // National format with no country to resolve the trunk zero
        assert_eq!(normalize_e164("07911123456", "ZZ"), None);
    }
}
