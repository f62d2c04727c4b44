use std::sync::Arc;
use tantivy::query::{BooleanQuery, Occur, Query, RegexQuery, TermQuery};
use tantivy::schema::{Field, IndexRecordOption};
use tantivy::Term;

use crate::error::SearchError;
use crate::models::{Finding, IndexedDocument, SearchHit};
use crate::search::index::KnowledgeIndex;
use crate::search::patterns::PatternCache;
use crate::search::store::DocumentStore;

/// Shortest tag the raw-source scan considers.
const MIN_SCAN_TAG_LEN: usize = 4;

/// Longest query that still gets a `*query*` clause. Regex automaton cost
/// grows with pattern length.
pub const MAX_WILDCARD_QUERY_CHARS: usize = 128;

/// Read side of the knowledge index.
///
/// The pattern cache is built once, from a full scan at construction, and is
/// read-only afterwards; concurrent searches share it without locking.
pub struct KnowledgeSearcher {
    index: Arc<KnowledgeIndex>,
    patterns: PatternCache,
}

impl KnowledgeSearcher {
    pub fn open(index: Arc<KnowledgeIndex>) -> Result<Self, SearchError> {
        let docs = index.scan()?;
        let patterns = PatternCache::from_documents(&docs);
        tracing::debug!(
            "Pattern cache built: {} keywords from {} documents",
            patterns.len(),
            docs.len()
        );
        Ok(Self { index, patterns })
    }

    /// Ranked entries for `query`, at most `max_results`, best first.
    pub fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
        let fields = self.index.fields().searchable();
        let Some(query) = build_query(&fields, query, &self.patterns) else {
            return Ok(Vec::new());
        };

        let hits = self
            .index
            .top_documents(query.as_ref(), max_results)?
            .into_iter()
            .map(|(score, doc)| SearchHit {
                entry: doc.to_entry(),
                score,
            })
            .collect::<Vec<_>>();

        for hit in &hits {
            tracing::debug!("Match: {} (score: {:.3})", hit.entry.title, hit.score);
        }
        Ok(hits)
    }

    /// Every indexed title, sorted so suggestions do not depend on segment layout.
    pub fn all_topics(&self) -> Result<Vec<String>, SearchError> {
        let mut titles: Vec<String> = self
            .index
            .scan()?
            .into_iter()
            .map(|doc| doc.title)
            .collect();
        titles.sort();
        Ok(titles)
    }

    /// Flag entries whose tags appear literally in `source`.
    pub fn search_in_code(
        &self,
        source: &str,
        file_label: &str,
    ) -> Result<Vec<Finding>, SearchError> {
        let docs = self.index.scan()?;
        Ok(scan_source(&docs, source, file_label))
    }
}

/// OR-query over `fields`: exact term, `*query*` wildcard, and one term per
/// keyword the pattern cache associates with the query.
///
/// Returns `None` for a blank query.
pub fn build_query(
    fields: &[Field],
    query: &str,
    patterns: &PatternCache,
) -> Option<Box<dyn Query>> {
    let normalized = query.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }

    let words: Vec<&str> = normalized.split_whitespace().collect();
    let related = patterns.related(&normalized);
    let wildcard = wildcard_pattern(&normalized);

    let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

    for &field in fields {
        clauses.push((Occur::Should, term_query(field, &normalized)));

        if words.len() > 1 {
            for word in &words {
                clauses.push((Occur::Should, term_query(field, word)));
            }
        }

        if let Some(pattern) = &wildcard {
            match RegexQuery::from_pattern(pattern, field) {
                Ok(q) => {
                    let q: Box<dyn Query> = Box::new(q);
                    clauses.push((Occur::Should, q));
                }
                Err(e) => tracing::debug!("Skipping wildcard clause for '{normalized}': {e}"),
            }
        }

        if let Some(terms) = related {
            for term in terms {
                clauses.push((Occur::Should, term_query(field, term)));
            }
        }
    }

    let query: Box<dyn Query> = Box::new(BooleanQuery::new(clauses));
    Some(query)
}

/// `.*query.*` for queries of 3 to `MAX_WILDCARD_QUERY_CHARS` characters.
fn wildcard_pattern(normalized: &str) -> Option<String> {
    let len = normalized.chars().count();
    (len > 2 && len <= MAX_WILDCARD_QUERY_CHARS)
        .then(|| format!(".*{}.*", regex::escape(normalized)))
}

fn term_query(field: Field, text: &str) -> Box<dyn Query> {
    Box::new(TermQuery::new(
        Term::from_field_text(field, text),
        IndexRecordOption::WithFreqs,
    ))
}

/// At most one finding per document: the first tag longer than three
/// characters found as a case-insensitive substring of `source`.
///
/// Substring containment, not tokenized: "size" also matches "sizeOf".
pub fn scan_source(docs: &[IndexedDocument], source: &str, file_label: &str) -> Vec<Finding> {
    let haystack = source.to_lowercase();
    let mut findings = Vec::new();

    for doc in docs {
        for tag in doc.tag_list() {
            if tag.chars().count() < MIN_SCAN_TAG_LEN {
                continue;
            }
            let needle = tag.to_lowercase();
            if haystack.contains(&needle) {
                let line = find_line_number(source, &needle);
                findings.push(Finding::new(
                    doc.title.clone(),
                    format!(
                        "{file_label}:{line} - Knowledge base pattern '{tag}' detected in code."
                    ),
                ));
                break;
            }
        }
    }

    findings
}

/// 1-based line of the first occurrence of `needle` (lowercase), else 1.
fn find_line_number(source: &str, needle: &str) -> usize {
    source
        .lines()
        .position(|line| line.to_lowercase().contains(needle))
        .map(|i| i + 1)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntryKind, KnowledgeEntry};
    use crate::search::indexer::index_knowledge_base;

    fn entry(title: &str, description: &str, tags: &[&str]) -> KnowledgeEntry {
        KnowledgeEntry {
            title: title.into(),
            kind: EntryKind::AntiPattern,
            description: description.into(),
            example: None,
            reference: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn searcher_with(entries: &[KnowledgeEntry]) -> (tempfile::TempDir, KnowledgeSearcher) {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(KnowledgeIndex::open_or_create(dir.path()).unwrap());
        index_knowledge_base(index.as_ref(), entries).unwrap();
        let searcher = KnowledgeSearcher::open(index).unwrap();
        (dir, searcher)
    }

    fn doc(title: &str, tags: &str) -> IndexedDocument {
        IndexedDocument::from(&entry(title, "body", &tags.split(' ').collect::<Vec<_>>()))
    }

    #[test]
    fn test_wildcard_recovers_partial_word() {
        let (_dir, searcher) = searcher_with(&[entry(
            "Thread confinement",
            "Keep mutable state local",
            &["threadlocalstorage"],
        )]);
        let hits = searcher.search("ThreadLocal", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.title, "Thread confinement");
    }

    #[test]
    fn test_short_query_skips_wildcard() {
        let (_dir, searcher) = searcher_with(&[entry(
            "Thread confinement",
            "Keep mutable state local",
            &["threadlocalstorage"],
        )]);
        assert!(searcher.search("th", 5).unwrap().is_empty());
        assert!(searcher.search("", 5).unwrap().is_empty());
        assert!(searcher.search("   ", 5).unwrap().is_empty());
    }

    #[test]
    fn test_huge_result_limit_is_bounded_by_index() {
        let (_dir, searcher) = searcher_with(&[
            entry("Avoid Vector", "Legacy type", &["vector"]),
            entry("Close streams", "Release handles", &["stream"]),
        ]);
        let hits = searcher.search("vector", usize::MAX).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.title, "Avoid Vector");
    }

    #[test]
    fn test_wildcard_only_for_moderate_lengths() {
        assert!(wildcard_pattern("ab").is_none());
        assert_eq!(wildcard_pattern("abc").as_deref(), Some(".*abc.*"));
        assert!(wildcard_pattern(&"a".repeat(MAX_WILDCARD_QUERY_CHARS)).is_some());
        assert!(wildcard_pattern(&"a".repeat(MAX_WILDCARD_QUERY_CHARS + 1)).is_none());
    }

    #[test]
    fn test_very_long_query_still_searches_by_term() {
        let (_dir, searcher) =
            searcher_with(&[entry("Avoid Vector", "Legacy type", &["vector"])]);
        let long = format!("vector {}", "x".repeat(12_000));
        let hits = searcher.search(&long, 5).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_concurrent_searches_share_one_searcher() {
        let (_dir, searcher) = searcher_with(&[
            entry("Avoid Vector", "Synchronized on every call", &["vector", "legacy"]),
            entry("Avoid Hashtable", "Prefer HashMap", &["hashtable", "legacy"]),
            entry("Close streams", "Release file handles", &["stream"]),
        ]);
        let searcher = Arc::new(searcher);
        let titles = |hits: Vec<SearchHit>| -> Vec<String> {
            hits.into_iter().map(|h| h.entry.title).collect()
        };
        let expected = titles(searcher.search("legacy", 10).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let searcher = searcher.clone();
                std::thread::spawn(move || {
                    (0..20)
                        .map(|_| searcher.search("legacy", 10).unwrap())
                        .map(|hits| hits.into_iter().map(|h| h.entry.title).collect())
                        .collect::<Vec<Vec<String>>>()
                })
            })
            .collect();

        for handle in handles {
            for result in handle.join().unwrap() {
                assert_eq!(result, expected);
            }
        }
        assert_eq!(expected.len(), 2);
    }

    #[test]
    fn test_expansion_bridges_related_entries() {
        let (_dir, searcher) = searcher_with(&[
            entry("Avoid Vector", "Synchronized on every call", &["vector", "legacy"]),
            entry("Avoid Hashtable", "Prefer HashMap", &["hashtable", "legacy"]),
            entry("Close streams", "Release file handles", &["stream"]),
        ]);

        let hits = searcher.search("vector", 10).unwrap();
        let titles: Vec<&str> = hits.iter().map(|h| h.entry.title.as_str()).collect();
        assert_eq!(titles[0], "Avoid Vector");
        // Reached only through "legacy", associated with "vector".
        assert!(titles.contains(&"Avoid Hashtable"));
        assert!(!titles.contains(&"Close streams"));
    }

    #[test]
    fn test_unknown_query_returns_nothing() {
        let (_dir, searcher) = searcher_with(&[entry("Avoid Vector", "Legacy type", &["vector"])]);
        assert!(searcher.search("UnknownRule123", 5).unwrap().is_empty());
    }

    #[test]
    fn test_results_bounded_and_sorted() {
        let (_dir, searcher) = searcher_with(&[
            entry("Logging one", "logging logging logging", &["logging"]),
            entry("Logging two", "Use a logger", &["logging"]),
            entry("Logging three", "Structured output", &["logging"]),
        ]);
        let hits = searcher.search("logging", 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
        assert!(searcher.search("logging", 0).unwrap().is_empty());
    }

    #[test]
    fn test_multi_word_query_matches_either_word() {
        let (_dir, searcher) = searcher_with(&[
            entry("Naming conventions", "Best names describe intent", &["naming"]),
            entry("Small methods", "Keep methods short", &["methods"]),
        ]);
        let hits = searcher.search("best practices", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.title, "Naming conventions");
    }

    #[test]
    fn test_hits_reconstruct_tags() {
        let (_dir, searcher) =
            searcher_with(&[entry("Avoid Vector", "Legacy type", &["vector", "arraylist"])]);
        let hits = searcher.search("vector", 1).unwrap();
        assert_eq!(hits[0].entry.tags, vec!["vector", "arraylist"]);
        assert_eq!(hits[0].entry.kind, EntryKind::AntiPattern);
    }

    #[test]
    fn test_all_topics_are_sorted_regardless_of_write_order() {
        let (_dir, searcher) = searcher_with(&[
            entry("Gamma", "Third", &[]),
            entry("Alpha", "First", &[]),
            entry("Beta", "Second", &[]),
        ]);
        assert_eq!(searcher.all_topics().unwrap(), vec!["Alpha", "Beta", "Gamma"]);
    }

    #[test]
    fn test_topics_stable_after_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(KnowledgeIndex::open_or_create(dir.path()).unwrap());
        let entries = [
            entry("Alpha", "First", &[]),
            entry("Beta", "Second", &[]),
            entry("Gamma", "Third", &[]),
        ];
        index_knowledge_base(index.as_ref(), &entries).unwrap();
        let before = KnowledgeSearcher::open(index.clone()).unwrap().all_topics().unwrap();

        // Rewriting Alpha moves its document to a newer segment.
        index.put(IndexedDocument::from(&entry("Alpha", "First, revised", &[]))).unwrap();
        let after = KnowledgeSearcher::open(index).unwrap().all_topics().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_scan_reports_first_matching_line() {
        let source = "class A {\n  void f() {\n    synchronized (this) {}\n    synchronized (lock) {}\n  }\n}";
        let docs = [doc("Prefer concurrent utilities", "synchronized concurrent")];
        let findings = scan_source(&docs, source, "A.java");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].issue, "Prefer concurrent utilities");
        assert!(findings[0].details.starts_with("A.java:3 - "));
        assert!(findings[0].details.contains("'synchronized'"));
    }

    #[test]
    fn test_scan_emits_one_finding_per_entry() {
        let source = "Vector v; ArrayList a; // legacy";
        let docs = [doc("Avoid Vector", "vector arraylist legacy")];
        let findings = scan_source(&docs, source, "B.java");
        assert_eq!(findings.len(), 1);
        assert!(findings[0].details.contains("'vector'"));
    }

    #[test]
    fn test_scan_ignores_short_tags() {
        let findings = scan_source(&[doc("IO", "io api")], "api io calls", "C.java");
        assert!(findings.is_empty());
    }

    #[test]
    fn test_scan_overmatches_inside_identifiers() {
        let docs = [doc("Collection size", "size")];
        let findings = scan_source(&docs, "int n = sizeOf(x);", "D.java");
        assert_eq!(findings.len(), 1);

        let docs = [doc("Stream usage", "stream")];
        let findings = scan_source(&docs, "InputStreamReader r;", "D.java");
        assert_eq!(findings.len(), 1);
        assert!(findings[0].details.starts_with("D.java:1 - "));
    }

    #[test]
    fn test_searcher_scan_uses_indexed_tags() {
        let (_dir, searcher) = searcher_with(&[entry(
            "Prefer concurrent utilities",
            "Locks are easy to misuse",
            &["synchronized", "concurrent"],
        )]);
        let findings = searcher
            .search_in_code("public synchronized void run() {}", "E.java")
            .unwrap();
        assert_eq!(findings.len(), 1);
    }
}
