use std::collections::HashSet;

use crate::error::IndexWriteError;
use crate::models::{IndexedDocument, KnowledgeEntry};
use crate::search::store::DocumentStore;

/// What one indexing run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub indexed: usize,
    /// Entries whose stored document was already identical.
    pub unchanged: usize,
    /// Entries rejected by validation.
    pub skipped: Vec<String>,
    /// Stored documents whose title is no longer in the knowledge base.
    pub pruned: usize,
}

/// Write every valid entry into `store`, one independent write per entry.
///
/// A write failure stops the run; earlier writes stay in place.
pub fn index_knowledge_base<S>(
    store: &S,
    entries: &[KnowledgeEntry],
) -> Result<IndexReport, IndexWriteError>
where
    S: DocumentStore + ?Sized,
{
    let mut report = IndexReport::default();
    let mut titles = HashSet::new();

    for entry in entries {
        if let Err(reason) = entry.validate() {
            tracing::warn!("Skipping knowledge entry: {reason}");
            report.skipped.push(reason);
            continue;
        }

        let doc = IndexedDocument::from(entry);
        titles.insert(doc.title.clone());

        // A failed read only costs a redundant write.
        if let Ok(Some(existing)) = store.get(&doc.title) {
            if existing == doc {
                report.unchanged += 1;
                continue;
            }
        }

        store.put(doc)?;
        report.indexed += 1;
    }

    match store.scan() {
        Ok(stored) => {
            for doc in stored {
                if !titles.contains(&doc.title) {
                    store.delete(&doc.title)?;
                    report.pruned += 1;
                }
            }
        }
        Err(e) => tracing::warn!("Could not scan index for stale entries: {e}"),
    }

    tracing::info!(
        "Indexed {} knowledge entries ({} unchanged, {} skipped, {} pruned)",
        report.indexed,
        report.unchanged,
        report.skipped.len(),
        report.pruned
    );

    Ok(report)
}
