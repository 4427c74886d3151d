//! Meter reading extraction from OCR text.
//!
//! The camera points at a five-digit mechanical counter. OCR output is noisy:
//! digits come back spaced out, wrapped in stray punctuation, or embedded in
//! longer runs. Three passes, loosest match last.

use once_cell::sync::Lazy;
use regex::Regex;

pub const READING_DIGITS: usize = 5;

// Stray glyphs dropped before matching.
const NOISE: [char; 4] = ['•', '*', '?', '\''];

static SPACED_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]\s*[0-9]\s*[0-9]\s*[0-9]\s*[0-9]").expect("valid regex"));
static WHOLE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[0-9]{5}\b").expect("valid regex"));

/// Pulls a five-digit counter reading out of raw OCR text.
pub fn extract_reading(ocr_text: &str) -> Option<String> {
    let cleaned: String = ocr_text.chars().filter(|c| !NOISE.contains(c)).collect();

    if let Some(m) = SPACED_DIGITS.find(&cleaned) {
        let digits: String = m.as_str().chars().filter(|c| !c.is_whitespace()).collect();
        if digits.chars().count() == READING_DIGITS {
            return Some(digits);
        }
    }

    if let Some(m) = WHOLE_WORD.find(&cleaned) {
        return Some(m.as_str().to_string());
    }

    let digits: Vec<char> = cleaned.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() >= READING_DIGITS {
        return Some(digits[..READING_DIGITS].iter().collect());
    }
    None
}
