//! # Language Normalization
//!
//! Reduces the raw language identifiers returned by the translation service
//! (or supplied by operators) to a canonical short code. The rest of the
//! system only ever stores the output of [`normalize`], so session state is
//! guaranteed to hold either `None` or a lowercase, locale-stripped code.

/// Raw values that mean "no language detected" regardless of casing.
const UNDETERMINED: [&str; 4] = ["unknown", "und", "undefined", "null"];

/// Normalize a raw language identifier to a canonical short code.
///
/// Trims and lowercases the input, rejects placeholder values such as
/// `"unknown"` or `"und"`, and keeps only the leading run of ASCII letters,
/// so `"EN-US"` becomes `"en"` and `"pt_BR"` becomes `"pt"`. Returns `None`
/// when no usable code remains.
///
/// Pure and total: no I/O, no state, never panics.
pub fn normalize(raw: Option<&str>) -> Option<String> {
    let s = raw?.trim().to_lowercase();
    if s.is_empty() || UNDETERMINED.contains(&s.as_str()) {
        return None;
    }

    let code: String = s.chars().take_while(|c| c.is_ascii_alphabetic()).collect();

    // A locale suffix can hide a placeholder ("und-Latn"), and inputs that
    // start with a separator or digit leave nothing behind. Both cases are
    // "no language", not a stored code.
    if code.is_empty() || UNDETERMINED.contains(&code.as_str()) {
        None
    } else {
        Some(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_locale_suffix() {
        assert_eq!(normalize(Some("EN-US")), Some("en".to_string()));
        assert_eq!(normalize(Some("pt_BR")), Some("pt".to_string()));
        assert_eq!(normalize(Some("zh-Hant-TW")), Some("zh".to_string()));
    }

    #[test]
    fn test_trims_and_lowercases() {
        assert_eq!(normalize(Some("  Fr  ")), Some("fr".to_string()));
        assert_eq!(normalize(Some("AR")), Some("ar".to_string()));
    }

    #[test]
    fn test_placeholder_values_are_none() {
        assert_eq!(normalize(Some("unknown")), None);
        assert_eq!(normalize(Some("UND")), None);
        assert_eq!(normalize(Some("undefined")), None);
        assert_eq!(normalize(Some("null")), None);
        assert_eq!(normalize(Some("und-Latn")), None);
    }

    #[test]
    fn test_empty_and_absent_are_none() {
        assert_eq!(normalize(None), None);
        assert_eq!(normalize(Some("")), None);
        assert_eq!(normalize(Some("   ")), None);
    }

    #[test]
    fn test_no_leading_letters_is_none() {
        assert_eq!(normalize(Some("123")), None);
        assert_eq!(normalize(Some("-en")), None);
    }

    #[test]
    fn test_full_language_names_pass_through() {
        // The translation service sometimes answers with a name instead of a
        // code; the leading letter run keeps it intact.
        assert_eq!(normalize(Some("Spanish")), Some("spanish".to_string()));
    }
}
