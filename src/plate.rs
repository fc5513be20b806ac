//! Brazilian license plate recognition.
//!
//! Turns noisy OCR text into a canonical plate string. Two grammars are
//! accepted, both seven characters long once cleaned:
//!
//! * Mercosul: `LLLDLDD`, e.g. `ABC1D23`
//! * Legacy ("antigo"): `LLLDDDD`, e.g. `ABC1234`
//!
//! Position 5 is a letter in one grammar and a digit in the other, so a
//! cleaned candidate matches at most one of them. None of the functions
//! here fail: anything that is not a plate is `NotRecognized`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static MERCOSUL_EXACT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{3}[0-9][A-Z][0-9]{2}$").expect("Invalid Mercosul pattern"));
static LEGACY_EXACT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{3}[0-9]{4}$").expect("Invalid legacy pattern"));
static MERCOSUL_ANYWHERE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Z]{3}[0-9][A-Z][0-9]{2}").expect("Invalid Mercosul pattern"));
static LEGACY_ANYWHERE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Z]{3}[0-9]{4}").expect("Invalid legacy pattern"));

pub const PLATE_LEN: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlateFormat {
    Mercosul,
    Legacy,
}

impl PlateFormat {
    /// Label used in stored records and JSON replies.
    pub fn as_str(self) -> &'static str {
        match self {
            PlateFormat::Mercosul => "mercosul",
            PlateFormat::Legacy => "antigo",
        }
    }

    fn exact(self) -> &'static Regex {
        match self {
            PlateFormat::Mercosul => &MERCOSUL_EXACT,
            PlateFormat::Legacy => &LEGACY_EXACT,
        }
    }

    fn anywhere(self) -> &'static Regex {
        match self {
            PlateFormat::Mercosul => &MERCOSUL_ANYWHERE,
            PlateFormat::Legacy => &LEGACY_ANYWHERE,
        }
    }
}

impl fmt::Display for PlateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Search order for both exact and substring matching.
const FORMATS: [PlateFormat; 2] = [PlateFormat::Mercosul, PlateFormat::Legacy];

/// Outcome of a recognition attempt. A format and a plate always come
/// together, so there is no way to build a half-valid result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    NotRecognized,
    Valid { format: PlateFormat, plate: String },
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid { .. })
    }

    pub fn format(&self) -> Option<PlateFormat> {
        match self {
            ValidationResult::Valid { format, .. } => Some(*format),
            ValidationResult::NotRecognized => None,
        }
    }

    /// Canonical plate: uppercase, no separator.
    pub fn plate(&self) -> Option<&str> {
        match self {
            ValidationResult::Valid { plate, .. } => Some(plate),
            ValidationResult::NotRecognized => None,
        }
    }
}

/// Uppercases `text` and drops everything that is not `A-Z` or `0-9`.
pub fn normalize(text: &str) -> String {
    text.to_uppercase()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// Treats the whole of `text` as a single plate candidate.
pub fn validate(text: &str) -> ValidationResult {
    if text.trim().is_empty() {
        return ValidationResult::NotRecognized;
    }
    let cleaned = normalize(text);
    if cleaned.len() != PLATE_LEN {
        return ValidationResult::NotRecognized;
    }
    FORMATS
        .iter()
        .find(|format| format.exact().is_match(&cleaned))
        .map_or(ValidationResult::NotRecognized, |&format| {
            ValidationResult::Valid {
                format,
                plate: cleaned,
            }
        })
}

/// Looks for the first plate-shaped run inside `text`.
///
/// Cleaning also removes the spaces between words, so neighbouring words
/// can fuse into a match (`"ABC 1234"` is found, and so is `"XAB C1234"`).
/// Mercosul is searched over the whole string before Legacy is tried.
pub fn extract_plate(text: &str) -> ValidationResult {
    let cleaned = normalize(text);
    for &format in FORMATS.iter() {
        if let Some(m) = format.anywhere().find(&cleaned) {
            return ValidationResult::Valid {
                format,
                plate: m.as_str().to_string(),
            };
        }
    }
    ValidationResult::NotRecognized
}

/// Direct validation first, substring extraction as the fallback.
pub fn find_plate_in_text(text: &str) -> ValidationResult {
    let direct = validate(text);
    if direct.is_valid() {
        return direct;
    }
    extract_plate(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid(format: PlateFormat, plate: &str) -> ValidationResult {
        ValidationResult::Valid {
            format,
            plate: plate.to_string(),
        }
    }

    #[test]
    fn normalize_strips_noise() {
        assert_eq!(normalize(" abc-1d23 "), "ABC1D23");
        assert_eq!(normalize("Placa: ABC.1234!"), "PLACAABC1234");
        assert_eq!(normalize("Veículo"), "VECULO");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn validates_mercosul() {
        let expected = valid(PlateFormat::Mercosul, "ABC1D23");
        assert_eq!(validate("ABC1D23"), expected);
        assert_eq!(validate("abc1d23"), expected);
        assert_eq!(validate("ABC 1D23"), expected);
        assert_eq!(validate("ABC-1D23"), expected);
    }

    #[test]
    fn validates_legacy() {
        let expected = valid(PlateFormat::Legacy, "ABC1234");
        assert_eq!(validate("ABC1234"), expected);
        assert_eq!(validate("abc1234"), expected);
        assert_eq!(validate("ABC 1234"), expected);
        // Punctuation is stripped before matching.
        assert_eq!(validate("ABC@1234"), expected);
    }

    #[test]
    fn rejects_non_plates() {
        for text in &[
            "", "   ", "ABC123", "1234ABC", "ABC1123", "123ABCD", "ABCD123", "AB1234",
            "ABC12345", "1234567", "ABCDEFG", "ABC1D234", "Ç#@!",
        ] {
            assert_eq!(validate(text), ValidationResult::NotRecognized, "{:?}", text);
        }
    }

    #[test]
    fn accepts_real_plates() {
        for (text, format) in &[
            ("ABC1234", PlateFormat::Legacy),
            ("XYZ9876", PlateFormat::Legacy),
            ("ABC1D23", PlateFormat::Mercosul),
            ("XYZ9A87", PlateFormat::Mercosul),
            ("BRA2E19", PlateFormat::Mercosul),
        ] {
            assert_eq!(validate(text).format(), Some(*format), "{}", text);
        }
    }

    #[test]
    fn canonical_form_is_a_fixed_point() {
        for text in &["abc-1d23", " xyz 9876 ", "bra.2e19"] {
            let first = validate(text);
            let again = validate(first.plate().unwrap());
            assert_eq!(first, again);
        }
    }

    #[test]
    fn case_and_separators_do_not_matter() {
        for plate in &["ABC1D23", "QWE4567", "BRA2E19", "ABC1123", "A1B2C3D"] {
            let base = validate(plate);
            assert_eq!(validate(&plate.to_lowercase()), base);
            for i in 0..=plate.len() {
                let (head, tail) = plate.split_at(i);
                assert_eq!(validate(&format!("{} {}", head, tail)), base);
                assert_eq!(validate(&format!("{}-{}", head, tail)), base);
            }
        }
    }

    #[test]
    fn grammars_are_disjoint() {
        let alphabet: Vec<char> = "AZ09".chars().collect();
        let mut candidate = vec!['A'; PLATE_LEN];
        // Every 7-char string over a letter/digit sample.
        let total = alphabet.len().pow(PLATE_LEN as u32);
        for n in 0..total {
            let mut rest = n;
            for slot in candidate.iter_mut() {
                *slot = alphabet[rest % alphabet.len()];
                rest /= alphabet.len();
            }
            let s: String = candidate.iter().collect();
            assert!(!(MERCOSUL_EXACT.is_match(&s) && LEGACY_EXACT.is_match(&s)), "{}", s);
        }
    }

    #[test]
    fn extracts_from_surrounding_text() {
        assert_eq!(
            extract_plate("Placa: ABC1D23 - Veículo"),
            valid(PlateFormat::Mercosul, "ABC1D23")
        );
        assert_eq!(
            extract_plate("Veículo ABC1234 registrado"),
            valid(PlateFormat::Legacy, "ABC1234")
        );
        assert_eq!(extract_plate("Texto sem placa"), ValidationResult::NotRecognized);
        assert_eq!(extract_plate(""), ValidationResult::NotRecognized);
    }

    #[test]
    fn extraction_prefers_mercosul_over_earlier_legacy() {
        // The legacy run comes first in the text but Mercosul is searched first.
        assert_eq!(
            extract_plate("ABC1234 XYZ9A87"),
            valid(PlateFormat::Mercosul, "XYZ9A87")
        );
    }

    #[test]
    fn extraction_fuses_adjacent_words() {
        assert_eq!(
            extract_plate("rua ABC 12 34"),
            valid(PlateFormat::Legacy, "ABC1234")
        );
    }

    #[test]
    fn find_plate_in_text_validates_then_extracts() {
        assert_eq!(
            find_plate_in_text("ABC1D23"),
            valid(PlateFormat::Mercosul, "ABC1D23")
        );
        assert_eq!(
            find_plate_in_text("O veículo de placa ABC1234 está estacionado"),
            valid(PlateFormat::Legacy, "ABC1234")
        );
        assert_eq!(find_plate_in_text("nada aqui"), ValidationResult::NotRecognized);
    }

    #[test]
    fn never_panics_on_odd_input() {
        for text in &["\u{0}", "ßßß1234", "🚗🚗🚗", "ﬀ", "\t\n", "İİİ1234"] {
            let result = find_plate_in_text(text);
            if let Some(plate) = result.plate() {
                assert_eq!(plate.len(), PLATE_LEN);
            }
        }
    }

    #[test]
    fn accessors_agree_with_variant() {
        let none = ValidationResult::NotRecognized;
        assert!(!none.is_valid());
        assert_eq!(none.format(), None);
        assert_eq!(none.plate(), None);
        assert_eq!(PlateFormat::Legacy.to_string(), "antigo");
        assert_eq!(PlateFormat::Mercosul.as_str(), "mercosul");
    }
}
