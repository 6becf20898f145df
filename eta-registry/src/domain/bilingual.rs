//! Bilingual display text.

use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Which of the two locales to surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    En,
    Zh,
}

/// A pair of display strings, one per supported locale.
///
/// Immutable; consumers pick a locale with [`BilingualText::get`].
/// Concatenation is componentwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BilingualText {
    pub zh: String,
    pub en: String,
}

impl BilingualText {
    pub fn new(zh: impl Into<String>, en: impl Into<String>) -> Self {
        Self {
            zh: zh.into(),
            en: en.into(),
        }
    }

    /// The empty text in both locales.
    pub fn empty() -> Self {
        Self::new("", "")
    }

    /// Select the string for a locale.
    pub fn get(&self, language: Language) -> &str {
        match language {
            Language::En => &self.en,
            Language::Zh => &self.zh,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.zh.is_empty() && self.en.is_empty()
    }
}

impl Add<&BilingualText> for &BilingualText {
    type Output = BilingualText;

    fn add(self, rhs: &BilingualText) -> BilingualText {
        BilingualText {
            zh: format!("{}{}", self.zh, rhs.zh),
            en: format!("{}{}", self.en, rhs.en),
        }
    }
}

impl fmt::Display for BilingualText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.zh, self.en)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_selects_locale() {
        let t = BilingualText::new("中環", "Central");
        assert_eq!(t.get(Language::Zh), "中環");
        assert_eq!(t.get(Language::En), "Central");
    }

    #[test]
    fn concatenation_is_componentwise() {
        let a = BilingualText::new("往", "To ");
        let b = BilingualText::new("中環", "Central");
        let joined = &a + &b;
        assert_eq!(joined, BilingualText::new("往中環", "To Central"));
    }

    #[test]
    fn empty() {
        assert!(BilingualText::empty().is_empty());
        assert!(!BilingualText::new("x", "").is_empty());
    }

    #[test]
    fn serde_round_trip() {
        let t = BilingualText::new("尖沙咀", "Tsim Sha Tsui");
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(serde_json::from_str::<BilingualText>(&json).unwrap(), t);
    }
}
