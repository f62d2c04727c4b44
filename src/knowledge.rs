//! Knowledge base loading: one JSON entry per file.

use std::path::Path;
use walkdir::WalkDir;

use crate::error::{IndexWriteError, RecordParseError};
use crate::models::KnowledgeEntry;

/// Entries read from a knowledge base directory, plus the records that were skipped.
#[derive(Debug, Default)]
pub struct LoadedKnowledge {
    pub entries: Vec<KnowledgeEntry>,
    pub errors: Vec<RecordParseError>,
}

/// Read every `*.json` file under `dir`, in file-name order.
///
/// A malformed or unreadable record is skipped with a warning. Only an
/// unreadable directory fails the load.
pub fn load_knowledge_base(dir: &Path) -> Result<LoadedKnowledge, IndexWriteError> {
    std::fs::read_dir(dir).map_err(|source| IndexWriteError::KnowledgeBaseUnreadable {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut loaded = LoadedKnowledge::default();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                let path = e.path().unwrap_or(dir).to_path_buf();
                skip(&mut loaded, RecordParseError {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().is_file() || !is_json(path) {
            continue;
        }

        match read_entry(path) {
            Ok(knowledge) => loaded.entries.push(knowledge),
            Err(e) => skip(&mut loaded, e),
        }
    }

    tracing::info!(
        "Loaded {} knowledge entries from {} ({} skipped)",
        loaded.entries.len(),
        dir.display(),
        loaded.errors.len()
    );
    Ok(loaded)
}

fn skip(loaded: &mut LoadedKnowledge, err: RecordParseError) {
    tracing::warn!("{err}");
    loaded.errors.push(err);
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

fn read_entry(path: &Path) -> Result<KnowledgeEntry, RecordParseError> {
    let data = std::fs::read_to_string(path).map_err(|e| RecordParseError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&data).map_err(|e| RecordParseError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
