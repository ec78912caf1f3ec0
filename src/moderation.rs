//! Denylist moderation for vote rationales
//!
//! Matching is case-insensitive and on whole words, with a few common
//! suffixes so "idiots" is caught but "hello" never trips "hell".

use regex::Regex;
use std::sync::LazyLock;

/// Built-in denylist
pub const BANNED_TERMS: &[&str] = &[
    "idiot",
    "stupid",
    "moron",
    "dumb",
    "loser",
    "retard",
    "fuck",
    "shit",
    "bitch",
    "bastard",
    "asshole",
    "crap",
    "damn",
];

const MASK_CHAR: char = '*';

static DEFAULT_MODERATOR: LazyLock<TextModerator> = LazyLock::new(|| {
    TextModerator::new(BANNED_TERMS.iter().copied())
        .expect("built-in denylist is a valid pattern")
});

#[derive(Debug, Clone, PartialEq)]
pub struct ModerationResult {
    pub sanitized: String,
    pub moderated: bool,
}

#[derive(Debug, Clone)]
pub struct TextModerator {
    /// None when the denylist is empty
    pattern: Option<Regex>,
}

impl Default for TextModerator {
    fn default() -> Self {
        DEFAULT_MODERATOR.clone()
    }
}

impl TextModerator {
    pub fn new<'a>(terms: impl IntoIterator<Item = &'a str>) -> Result<Self, regex::Error> {
        let alternatives: Vec<String> = terms
            .into_iter()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(term_pattern)
            .collect();

        if alternatives.is_empty() {
            return Ok(Self { pattern: None });
        }

        let pattern = Regex::new(&format!("(?i)(?:{})", alternatives.join("|")))?;
        Ok(Self {
            pattern: Some(pattern),
        })
    }

    /// Built-in denylist plus comma-separated extras from TROLLEY_EXTRA_BANNED_TERMS
    pub fn from_env() -> Self {
        let extra = std::env::var("TROLLEY_EXTRA_BANNED_TERMS").unwrap_or_default();
        if extra.trim().is_empty() {
            return Self::default();
        }

        let terms = BANNED_TERMS.iter().copied().chain(extra.split(','));
        match Self::new(terms) {
            Ok(moderator) => {
                tracing::info!("Loaded extra banned terms");
                moderator
            }
            Err(e) => {
                tracing::warn!("Invalid extra banned terms ({}), using built-in list", e);
                Self::default()
            }
        }
    }

    /// Trim the text and mask every denylisted word
    pub fn moderate(&self, raw: &str) -> ModerationResult {
        let trimmed = raw.trim();

        let Some(pattern) = &self.pattern else {
            return ModerationResult {
                sanitized: trimmed.to_string(),
                moderated: false,
            };
        };

        if trimmed.is_empty() || !pattern.is_match(trimmed) {
            return ModerationResult {
                sanitized: trimmed.to_string(),
                moderated: false,
            };
        }

        let sanitized = pattern.replace_all(trimmed, |caps: &regex::Captures| {
            MASK_CHAR.to_string().repeat(caps[0].chars().count())
        });

        ModerationResult {
            sanitized: sanitized.into_owned(),
            moderated: true,
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whole-word pattern for one term.
///
/// `\b` only applies next to a word character; a term like "c++" would
/// otherwise never match.
fn term_pattern(term: &str) -> String {
    let escaped = regex::escape(&term.to_lowercase());
    let starts_word = term.chars().next().is_some_and(is_word_char);
    let ends_word = term.chars().last().is_some_and(is_word_char);

    let mut pattern = String::new();
    if starts_word {
        pattern.push_str(r"\b");
    }
    pattern.push_str(&escaped);
    if ends_word {
        pattern.push_str(r"(?:s|es|ed|ing)?\b");
    }
    pattern
}

/// Moderate with the built-in denylist
pub fn moderate_text(raw: &str) -> ModerationResult {
    DEFAULT_MODERATOR.moderate(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banned_word_is_masked() {
        let result = moderate_text("idiot choice");
        assert!(result.moderated);
        assert_eq!(result.sanitized, "***** choice");
        assert!(!result.sanitized.to_lowercase().contains("idiot"));
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let result = moderate_text("What an IDIOT");
        assert!(result.moderated);
        assert_eq!(result.sanitized, "What an *****");
    }

    #[test]
    fn test_suffixed_forms_are_caught() {
        let result = moderate_text("they are idiots");
        assert!(result.moderated);
        assert_eq!(result.sanitized, "they are ******");
    }

    #[test]
    fn test_clean_text_is_trimmed_verbatim() {
        let result = moderate_text("  Saves more lives  ");
        assert!(!result.moderated);
        assert_eq!(result.sanitized, "Saves more lives");
    }

    #[test]
    fn test_words_containing_terms_are_not_masked() {
        let result = moderate_text("Scrapping the plan is dumbfounding");
        assert!(!result.moderated);
        assert_eq!(result.sanitized, "Scrapping the plan is dumbfounding");
    }

    #[test]
    fn test_empty_input() {
        for raw in ["", "   ", "\n\t"] {
            let result = moderate_text(raw);
            assert_eq!(result.sanitized, "");
            assert!(!result.moderated);
        }
    }

    #[test]
    fn test_moderation_is_deterministic() {
        let input = "stupid idea, damn it";
        assert_eq!(moderate_text(input), moderate_text(input));
        assert_eq!(moderate_text(input).sanitized, "****** idea, **** it");
    }

    #[test]
    fn test_custom_denylist() {
        let moderator = TextModerator::new(["trolley", "c++"]).unwrap();
        let result = moderator.moderate("The Trolley is fine");
        assert!(result.moderated);
        assert_eq!(result.sanitized, "The ******* is fine");
    }

    #[test]
    fn test_terms_with_symbols_are_masked() {
        let moderator = TextModerator::new(["c++", "@$$"]).unwrap();
        let result = moderator.moderate("c++ is bad, @$$ too");
        assert!(result.moderated);
        assert_eq!(result.sanitized, "*** is bad, *** too");

        // Word side still needs a boundary
        assert!(!moderator.moderate("abc++ rocks").moderated);
    }

    #[test]
    fn test_term_pattern_boundaries() {
        assert_eq!(term_pattern("idiot"), r"\bidiot(?:s|es|ed|ing)?\b");
        assert_eq!(term_pattern("c++"), r"\bc\+\+");
        assert_eq!(term_pattern("@$$"), r"@\$\$");
    }

    #[test]
    fn test_empty_denylist_never_moderates() {
        let moderator = TextModerator::new(Vec::<&str>::new()).unwrap();
        let result = moderator.moderate(" idiot ");
        assert!(!result.moderated);
        assert_eq!(result.sanitized, "idiot");
    }
}
