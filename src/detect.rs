//! Hebrew text detection.
//!
//! Detection is presence-based: a single character from the Hebrew block is
//! enough to classify the whole string as RTL. Mixed-language strings such as
//! "hello שלום" are treated exactly like pure Hebrew ones.

use serde::Serialize;

/// Inclusive bounds of the Hebrew Unicode block.
const HEBREW_BLOCK: std::ops::RangeInclusive<char> = '\u{0590}'..='\u{05FF}';

/// How sure the detector is about its verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// The text contains at least one character from the Hebrew block.
    Definite,
    /// No Hebrew characters were found; the text is assumed LTR.
    Probabilistic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DetectionResult {
    pub is_rtl: bool,
    pub confidence: Confidence,
}

impl DetectionResult {
    pub const RTL: Self = Self {
        is_rtl: true,
        confidence: Confidence::Definite,
    };

    pub const LTR: Self = Self {
        is_rtl: false,
        confidence: Confidence::Probabilistic,
    };
}

pub fn is_hebrew(c: char) -> bool {
    HEBREW_BLOCK.contains(&c)
}

/// Classify a string as RTL if it contains any Hebrew character.
pub fn detect(text: &str) -> DetectionResult {
    if text.chars().any(is_hebrew) {
        DetectionResult::RTL
    } else {
        DetectionResult::LTR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hebrew_word_is_rtl() {
        let r = detect("שלום");
        assert!(r.is_rtl);
        assert_eq!(r.confidence, Confidence::Definite);
    }

    #[test]
    fn english_word_is_ltr() {
        let r = detect("hello");
        assert!(!r.is_rtl);
        assert_eq!(r.confidence, Confidence::Probabilistic);
    }

    #[test]
    fn single_hebrew_word_flips_mixed_text() {
        assert!(detect("hello שלום").is_rtl);
        assert!(detect("a long english sentence with one word: תודה").is_rtl);
    }

    #[test]
    fn empty_and_whitespace_are_ltr() {
        assert!(!detect("").is_rtl);
        assert!(!detect("  \n\t ").is_rtl);
    }

    #[test]
    fn block_boundaries() {
        assert!(is_hebrew('\u{0590}'));
        assert!(is_hebrew('\u{05FF}'));
        assert!(!is_hebrew('\u{058F}'));
        assert!(!is_hebrew('\u{0600}')); // Arabic block is out of range
    }

    #[test]
    fn niqqud_alone_counts_as_hebrew() {
        // U+05B8 QAMATS
        assert!(detect("\u{05B8}").is_rtl);
    }
}
