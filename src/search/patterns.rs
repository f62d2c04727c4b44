//! Term-association graph derived from indexed knowledge documents.
//!
//! Every keyword of an entry (title, description, tags) maps to every other
//! keyword of the same entry, so a query phrased in one vocabulary can reach
//! entries written in a related one. The cache is a pure function of the
//! documents it was built from and is never mutated afterwards.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::IndexedDocument;

const MIN_KEYWORD_LEN: usize = 3;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was", "one",
    "our", "out", "day", "get", "has", "him", "his", "how", "its", "may", "new", "now", "old",
    "see", "two", "who", "boy", "did", "she", "use", "way", "will", "with",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternCache {
    associations: BTreeMap<String, BTreeSet<String>>,
}

impl PatternCache {
    pub fn from_documents(docs: &[IndexedDocument]) -> Self {
        let mut associations: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for doc in docs {
            let mut terms = BTreeSet::new();
            terms.extend(extract_keywords(&doc.title));
            terms.extend(extract_keywords(&doc.description));
            terms.extend(extract_keywords(&doc.tags));

            for term in &terms {
                associations
                    .entry(term.clone())
                    .or_default()
                    .extend(terms.iter().cloned());
            }
        }

        Self { associations }
    }

    /// Keywords associated with `keyword` (already lowercase), if it is known.
    pub fn related(&self, keyword: &str) -> Option<&BTreeSet<String>> {
        self.associations.get(keyword)
    }

    pub fn len(&self) -> usize {
        self.associations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.associations.is_empty()
    }
}

/// Lowercase words of at least three characters that are not stop words.
///
/// Splits on anything non-alphanumeric, matching how the index tokenizes,
/// so every keyword is a term the index can actually contain.
pub fn extract_keywords(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= MIN_KEYWORD_LEN)
        .map(str::to_lowercase)
        .filter(|word| !is_stop_word(word))
}

fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}
