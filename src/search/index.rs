use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tantivy::collector::TopDocs;
use tantivy::query::{Query, TermQuery};
use tantivy::schema::*;
use tantivy::{DocAddress, Index, IndexReader, IndexWriter, ReloadPolicy, Term};

use crate::error::{IndexWriteError, SearchError};
use crate::models::IndexedDocument;
use crate::search::store::DocumentStore;

const WRITER_MEMORY_BYTES: usize = 50_000_000;

/// Knowledge document index built on tantivy.
///
/// The writer is created on first write and then held, so at most one
/// indexing operation can run against a location. Readers never take it.
pub struct KnowledgeIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<Option<IndexWriter>>,
    location: PathBuf,
    fields: KnowledgeFields,
}

/// Field handles. Title, description, example and tags are tokenized;
/// type and reference are exact-match.
#[derive(Debug, Clone, Copy)]
pub struct KnowledgeFields {
    pub title: Field,
    pub title_key: Field,
    pub kind: Field,
    pub description: Field,
    pub example: Field,
    pub reference: Field,
    pub tags: Field,
}

impl KnowledgeFields {
    /// Fields the multi-field query runs against.
    pub fn searchable(&self) -> [Field; 3] {
        [self.title, self.description, self.tags]
    }
}

fn build_schema() -> (Schema, KnowledgeFields) {
    let mut schema_builder = Schema::builder();
    let fields = KnowledgeFields {
        title: schema_builder.add_text_field("title", TEXT | STORED),
        title_key: schema_builder.add_text_field("title_key", STRING),
        kind: schema_builder.add_text_field("type", STRING | STORED),
        description: schema_builder.add_text_field("description", TEXT | STORED),
        example: schema_builder.add_text_field("example", TEXT | STORED),
        reference: schema_builder.add_text_field("reference", STRING | STORED),
        tags: schema_builder.add_text_field("tags", TEXT | STORED),
    };
    (schema_builder.build(), fields)
}

impl KnowledgeIndex {
    /// Create or open an index at the given directory.
    pub fn open_or_create(index_dir: &Path) -> Result<Self, IndexWriteError> {
        std::fs::create_dir_all(index_dir).map_err(|source| IndexWriteError::Unwritable {
            path: index_dir.to_path_buf(),
            source,
        })?;

        let (schema, fields) = build_schema();

        let index = if index_dir.join("meta.json").exists() {
            Index::open_in_dir(index_dir)?
        } else {
            Index::create_in_dir(index_dir, schema)?
        };

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(None),
            location: index_dir.to_path_buf(),
            fields,
        })
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn fields(&self) -> KnowledgeFields {
        self.fields
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Run `query` and return up to `limit` documents, best score first.
    ///
    /// `limit` is clamped to the document count; the collector preallocates
    /// for the full limit.
    pub fn top_documents(
        &self,
        query: &dyn Query,
        limit: usize,
    ) -> Result<Vec<(f32, IndexedDocument)>, SearchError> {
        let searcher = self.reader.searcher();
        let limit = limit.min(usize::try_from(searcher.num_docs()).unwrap_or(usize::MAX));
        if limit == 0 {
            return Ok(Vec::new());
        }
        let top_docs = searcher.search(query, &TopDocs::with_limit(limit))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            hits.push((score, self.to_indexed(&doc)?));
        }
        Ok(hits)
    }

    /// Apply one write and make it visible to readers.
    fn write<F>(&self, op: F) -> Result<(), IndexWriteError>
    where
        F: FnOnce(&mut IndexWriter) -> Result<(), IndexWriteError>,
    {
        let mut guard = self.writer.lock();
        let writer = match guard.as_mut() {
            Some(writer) => writer,
            None => guard.insert(self.index.writer_with_num_threads(1, WRITER_MEMORY_BYTES)?),
        };
        op(writer)?;
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    fn to_indexed(&self, doc: &TantivyDocument) -> Result<IndexedDocument, SearchError> {
        let text = |field: Field| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        Ok(IndexedDocument {
            title: text(self.fields.title).ok_or(SearchError::MissingField("title"))?,
            kind: text(self.fields.kind).unwrap_or_default(),
            description: text(self.fields.description)
                .ok_or(SearchError::MissingField("description"))?,
            example: text(self.fields.example),
            reference: text(self.fields.reference),
            tags: text(self.fields.tags).unwrap_or_default(),
        })
    }

    fn to_tantivy(&self, doc: &IndexedDocument) -> TantivyDocument {
        let mut out = TantivyDocument::default();
        out.add_text(self.fields.title, &doc.title);
        out.add_text(self.fields.title_key, &doc.title);
        out.add_text(self.fields.kind, &doc.kind);
        out.add_text(self.fields.description, &doc.description);
        if let Some(example) = &doc.example {
            out.add_text(self.fields.example, example);
        }
        if let Some(reference) = &doc.reference {
            out.add_text(self.fields.reference, reference);
        }
        out.add_text(self.fields.tags, &doc.tags);
        out
    }

    fn title_term(&self, title: &str) -> Term {
        Term::from_field_text(self.fields.title_key, title)
    }
}

impl DocumentStore for KnowledgeIndex {
    fn put(&self, doc: IndexedDocument) -> Result<(), IndexWriteError> {
        let term = self.title_term(&doc.title);
        let tantivy_doc = self.to_tantivy(&doc);
        self.write(|writer| {
            writer.delete_term(term);
            writer.add_document(tantivy_doc)?;
            Ok(())
        })
    }

    fn get(&self, title: &str) -> Result<Option<IndexedDocument>, SearchError> {
        let query = TermQuery::new(self.title_term(title), IndexRecordOption::Basic);
        Ok(self
            .top_documents(&query, 1)?
            .into_iter()
            .next()
            .map(|(_, doc)| doc))
    }

    fn delete(&self, title: &str) -> Result<(), IndexWriteError> {
        let term = self.title_term(title);
        self.write(|writer| {
            writer.delete_term(term);
            Ok(())
        })
    }

    fn scan(&self) -> Result<Vec<IndexedDocument>, SearchError> {
        let searcher = self.reader.searcher();
        let mut docs = Vec::new();

        for (segment_ord, segment_reader) in searcher.segment_readers().iter().enumerate() {
            for doc_id in segment_reader.doc_ids_alive() {
                let doc: TantivyDocument =
                    searcher.doc(DocAddress::new(segment_ord as u32, doc_id))?;
                docs.push(self.to_indexed(&doc)?);
            }
        }

        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::store::tests::{check_store_contract, doc};

    #[test]
    fn test_knowledge_index_honors_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        let index = KnowledgeIndex::open_or_create(dir.path()).unwrap();
        check_store_contract(&index);
        assert_eq!(index.num_docs(), 1);
    }

    #[test]
    fn test_documents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = KnowledgeIndex::open_or_create(dir.path()).unwrap();
            index.put(doc("Avoid Vector", "vector legacy")).unwrap();
        }
        let reopened = KnowledgeIndex::open_or_create(dir.path()).unwrap();
        let stored = reopened.get("Avoid Vector").unwrap().unwrap();
        assert_eq!(stored.tags, "vector legacy");
    }

    #[test]
    fn test_optional_fields_round_trip_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let index = KnowledgeIndex::open_or_create(dir.path()).unwrap();
        let mut d = doc("Close streams", "resource stream");
        d.reference = Some("Effective Java, Item 9".into());
        index.put(d.clone()).unwrap();

        let stored = index.get("Close streams").unwrap().unwrap();
        assert_eq!(stored, d);
        assert!(stored.example.is_none());
    }

    #[test]
    fn test_top_documents_with_zero_limit_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = KnowledgeIndex::open_or_create(dir.path()).unwrap();
        index.put(doc("Alpha", "one")).unwrap();
        let query = tantivy::query::AllQuery;
        assert!(index.top_documents(&query, 0).unwrap().is_empty());
        assert_eq!(index.top_documents(&query, 5).unwrap().len(), 1);
    }

    #[test]
    fn test_huge_limit_is_clamped_to_document_count() {
        let dir = tempfile::tempdir().unwrap();
        let index = KnowledgeIndex::open_or_create(dir.path()).unwrap();
        index.put(doc("Alpha", "one")).unwrap();
        index.put(doc("Beta", "two")).unwrap();
        let query = tantivy::query::AllQuery;
        assert_eq!(index.top_documents(&query, usize::MAX).unwrap().len(), 2);
    }

    #[test]
    fn test_empty_index_with_huge_limit_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = KnowledgeIndex::open_or_create(dir.path()).unwrap();
        let query = tantivy::query::AllQuery;
        assert!(index.top_documents(&query, usize::MAX).unwrap().is_empty());
    }

    #[test]
    fn test_second_writer_on_same_location_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let first = KnowledgeIndex::open_or_create(dir.path()).unwrap();
        // First write creates and then holds the writer lock.
        first.put(doc("Alpha", "one")).unwrap();

        let second = KnowledgeIndex::open_or_create(dir.path()).unwrap();
        let err = second.put(doc("Beta", "two")).unwrap_err();
        assert!(matches!(err, IndexWriteError::Tantivy(_)));

        // Readers are unaffected, and the first writer keeps working.
        assert_eq!(second.num_docs(), 1);
        first.put(doc("Beta", "two")).unwrap();
        assert_eq!(first.num_docs(), 2);
    }

    #[test]
    fn test_unwritable_location_is_index_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();
        let err = KnowledgeIndex::open_or_create(&blocker.join("index"))
            .err()
            .unwrap();
        assert!(matches!(err, IndexWriteError::Unwritable { .. }));
    }
}
