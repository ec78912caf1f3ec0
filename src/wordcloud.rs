//! Word frequencies over vote rationales
//!
//! Always recomputed from scratch; a room's rationale set is small.

use crate::types::{Choice, Vote};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tokens shorter than this are dropped
pub const MIN_TOKEN_CHARS: usize = 2;

/// Default number of entries shown per cloud
pub const DEFAULT_CLOUD_SIZE: usize = 30;

const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "cant", "could", "did", "didnt", "do", "does", "doesnt", "doing", "dont", "down",
    "during", "each", "few", "for", "from", "further", "had", "has", "have", "having", "he", "her",
    "here", "hers", "him", "his", "how", "if", "im", "in", "into", "is", "isnt", "it", "its",
    "itself", "just", "me", "more", "most", "my", "no", "nor", "not", "now", "of", "off", "on",
    "once", "only", "or", "other", "our", "ours", "out", "over", "own", "same", "she", "should",
    "so", "some", "such", "than", "that", "the", "their", "them", "then", "there", "these",
    "they", "this", "those", "through", "to", "too", "under", "until", "up", "very", "was", "we",
    "were", "what", "when", "where", "which", "while", "who", "whom", "why", "will", "with",
    "would", "you", "your", "yours",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WordCloudEntry {
    /// Normalized token the count is keyed by
    pub stem: String,
    /// Most frequent surface form, for display
    pub word: String,
    pub count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WordClouds {
    pub pull: Vec<WordCloudEntry>,
    pub dont_pull: Vec<WordCloudEntry>,
}

impl WordClouds {
    /// Build both clouds from a round's votes
    pub fn from_votes<'a>(votes: impl IntoIterator<Item = &'a Vote>, limit: usize) -> Self {
        let mut pull = Vec::new();
        let mut dont_pull = Vec::new();
        for vote in votes {
            if vote.rationale.is_empty() {
                continue;
            }
            match vote.choice {
                Choice::Pull => pull.push(vote.rationale.as_str()),
                Choice::DontPull => dont_pull.push(vote.rationale.as_str()),
            }
        }

        Self {
            pull: word_cloud(&pull, limit),
            dont_pull: word_cloud(&dont_pull, limit),
        }
    }
}

/// Lowercase word tokens with stopwords and short tokens removed (unstemmed)
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace(['\'', '\u{2019}'], "")
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .filter(|t| !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Light suffix-stripping stemmer.
///
/// Rules run in a fixed order so variants like "save", "saves", "saved"
/// and "saving" all land on the same token.
pub fn stem(word: &str) -> String {
    let mut w = word.to_string();

    if w.ends_with("sses") {
        w.truncate(w.len() - 2);
    } else if w.ends_with("ies") && w.len() > 4 {
        w.truncate(w.len() - 3);
        w.push('y');
    } else if w.ends_with('s')
        && !w.ends_with("ss")
        && !w.ends_with("us")
        && !w.ends_with("is")
        && w.len() > 3
    {
        w.pop();
    }

    if w.ends_with("ing") && w.len() > 5 {
        w.truncate(w.len() - 3);
        undouble(&mut w);
    } else if w.ends_with("ied") && w.len() > 4 {
        w.truncate(w.len() - 3);
        w.push('y');
    } else if w.ends_with("ed") && w.len() > 4 {
        w.truncate(w.len() - 2);
        undouble(&mut w);
    } else if w.ends_with("ly") && w.len() > 4 {
        w.truncate(w.len() - 2);
    }

    if w.ends_with('e') && w.len() > 3 {
        w.pop();
    }

    w
}

/// "stopp" -> "stop", but "fall" and "pass" keep their double letters
fn undouble(w: &mut String) {
    let bytes = w.as_bytes();
    let n = bytes.len();
    if n >= 2 && bytes[n - 1] == bytes[n - 2] {
        let c = bytes[n - 1];
        if c.is_ascii_alphabetic() && !matches!(c, b'l' | b's' | b'z' | b'a' | b'e' | b'i' | b'o' | b'u') {
            w.pop();
        }
    }
}

/// Count stemmed tokens across all texts
pub fn compute_frequencies<S: AsRef<str>>(texts: &[S]) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for text in texts {
        for token in tokenize(text.as_ref()) {
            *counts.entry(stem(&token)).or_insert(0) += 1;
        }
    }
    counts
}

/// Display-ready cloud sorted by count (desc), then stem
pub fn word_cloud<S: AsRef<str>>(texts: &[S], limit: usize) -> Vec<WordCloudEntry> {
    let mut by_stem: HashMap<String, HashMap<String, u32>> = HashMap::new();
    for text in texts {
        for token in tokenize(text.as_ref()) {
            *by_stem
                .entry(stem(&token))
                .or_default()
                .entry(token)
                .or_insert(0) += 1;
        }
    }

    let mut entries: Vec<WordCloudEntry> = by_stem
        .into_iter()
        .map(|(stem, forms)| {
            let count = forms.values().sum();
            // Pick deterministically regardless of input order
            let word = forms
                .into_iter()
                .max_by(|(wa, ca), (wb, cb)| ca.cmp(cb).then_with(|| wb.cmp(wa)))
                .map(|(w, _)| w)
                .unwrap_or_else(|| stem.clone());
            WordCloudEntry { stem, word, count }
        })
        .collect();

    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.stem.cmp(&b.stem)));
    entries.truncate(limit);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_punctuation_stopwords_and_short_tokens() {
        let tokens = tokenize("It saves MORE lives, doesn't it? A.I. wins!");
        assert_eq!(tokens, vec!["saves", "lives", "wins"]);
    }

    #[test]
    fn test_tokenize_keeps_two_char_words() {
        assert_eq!(tokenize("ai is ok"), vec!["ai", "ok"]);
    }

    #[test]
    fn test_stem_collapses_variants() {
        let stems: Vec<String> = ["save", "saves", "saved", "saving"]
            .iter()
            .map(|w| stem(w))
            .collect();
        assert!(stems.iter().all(|s| s == &stems[0]), "{:?}", stems);

        assert_eq!(stem("stopping"), stem("stopped"));
        assert_eq!(stem("lives"), stem("live"));
        assert_eq!(stem("harmful"), "harmful");
    }

    #[test]
    fn test_stem_is_idempotent_on_short_words() {
        assert_eq!(stem("ai"), "ai");
        assert_eq!(stem("bus"), "bus");
        assert_eq!(stem("is"), "is");
    }

    #[test]
    fn test_compute_frequencies_counts_across_texts() {
        let counts = compute_frequencies(&["saves lives", "saving more lives", "fairness"]);
        assert_eq!(counts.get(&stem("lives")), Some(&2));
        assert_eq!(counts.get(&stem("saves")), Some(&2));
        assert_eq!(counts.get(&stem("fairness")), Some(&1));
        assert!(!counts.contains_key("more"));
    }

    #[test]
    fn test_compute_frequencies_is_order_independent() {
        let texts = vec![
            "Human oversight matters",
            "AI is faster and fairer",
            "oversight beats speed",
            "",
        ];
        let mut reversed = texts.clone();
        reversed.reverse();
        let mut rotated = texts.clone();
        rotated.rotate_left(1);

        let expected = compute_frequencies(&texts);
        assert_eq!(compute_frequencies(&reversed), expected);
        assert_eq!(compute_frequencies(&rotated), expected);
        assert_eq!(word_cloud(&texts, 10), word_cloud(&reversed, 10));
    }

    #[test]
    fn test_compute_frequencies_empty_input() {
        let empty: [&str; 0] = [];
        assert!(compute_frequencies(&empty).is_empty());
        assert!(compute_frequencies(&["", "the and of"]).is_empty());
    }

    #[test]
    fn test_word_cloud_sorted_and_limited() {
        let cloud = word_cloud(&["trust trust trust", "speed speed", "cost"], 2);
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud[0].word, "trust");
        assert_eq!(cloud[0].count, 3);
        assert_eq!(cloud[1].word, "speed");
    }

    #[test]
    fn test_word_cloud_shows_most_common_form() {
        let cloud = word_cloud(&["saving lives", "saves time", "saves money"], 10);
        let save = cloud.iter().find(|e| e.stem == stem("save")).unwrap();
        assert_eq!(save.word, "saves");
        assert_eq!(save.count, 3);
    }

    #[test]
    fn test_clouds_partition_by_choice() {
        let votes = vec![
            Vote {
                participant_id: "p1".to_string(),
                choice: Choice::Pull,
                rationale: "efficiency".to_string(),
                moderated: false,
                ts: String::new(),
            },
            Vote {
                participant_id: "p2".to_string(),
                choice: Choice::DontPull,
                rationale: "accountability".to_string(),
                moderated: false,
                ts: String::new(),
            },
            Vote {
                participant_id: "p3".to_string(),
                choice: Choice::DontPull,
                rationale: String::new(),
                moderated: false,
                ts: String::new(),
            },
        ];

        let clouds = WordClouds::from_votes(&votes, DEFAULT_CLOUD_SIZE);
        assert_eq!(clouds.pull.len(), 1);
        assert_eq!(clouds.pull[0].word, "efficiency");
        assert_eq!(clouds.dont_pull.len(), 1);
        assert_eq!(clouds.dont_pull[0].word, "accountability");
    }
}
