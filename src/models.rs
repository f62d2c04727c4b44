use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::pipeline::Stage;

/// Kind of guidance a knowledge entry carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EntryKind {
    #[default]
    BestPractice,
    AntiPattern,
    Enhancement,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::BestPractice => "BestPractice",
            EntryKind::AntiPattern => "AntiPattern",
            EntryKind::Enhancement => "Enhancement",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = String;

    /// Accepts "BestPractice", "Best Practice", "best-practice", "ANTI_PATTERN", ...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        match folded.as_str() {
            "bestpractice" => Ok(EntryKind::BestPractice),
            "antipattern" => Ok(EntryKind::AntiPattern),
            "enhancement" => Ok(EntryKind::Enhancement),
            _ => Err(format!("unknown entry type '{s}'")),
        }
    }
}

impl TryFrom<String> for EntryKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntryKind> for String {
    fn from(kind: EntryKind) -> Self {
        kind.as_str().to_string()
    }
}

/// A best-practice / anti-pattern record used as retrievable context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub description: String,
    #[serde(default)]
    pub example: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl KnowledgeEntry {
    /// Title and description must both carry text for the entry to be indexed.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title is empty".to_string());
        }
        if self.description.trim().is_empty() {
            return Err(format!("'{}' has an empty description", self.title));
        }
        Ok(())
    }
}

/// A single issue reported against source code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Finding {
    /// Short label, typically the analyzer rule name.
    pub issue: String,
    /// Free text, typically "file:line - message".
    pub details: String,
}

impl Finding {
    pub fn new(issue: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            issue: issue.into(),
            details: details.into(),
        }
    }
}

/// Stored field mapping for one knowledge entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub title: String,
    pub kind: String,
    pub description: String,
    pub example: Option<String>,
    pub reference: Option<String>,
    /// Tags joined with single spaces.
    pub tags: String,
}

impl IndexedDocument {
    /// Rebuild the entry, splitting tags back on whitespace.
    pub fn to_entry(&self) -> KnowledgeEntry {
        KnowledgeEntry {
            title: self.title.clone(),
            kind: self.kind.parse().unwrap_or_default(),
            description: self.description.clone(),
            example: self.example.clone(),
            reference: self.reference.clone(),
            tags: self.tags.split_whitespace().map(str::to_string).collect(),
        }
    }

    pub fn tag_list(&self) -> impl Iterator<Item = &str> {
        self.tags.split_whitespace()
    }
}

impl From<&KnowledgeEntry> for IndexedDocument {
    fn from(entry: &KnowledgeEntry) -> Self {
        Self {
            title: entry.title.clone(),
            kind: entry.kind.to_string(),
            description: entry.description.clone(),
            example: entry.example.clone().filter(|s| !s.trim().is_empty()),
            reference: entry.reference.clone().filter(|s| !s.trim().is_empty()),
            tags: entry
                .tags
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// A ranked retrieval result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub entry: KnowledgeEntry,
    pub score: f32,
}

/// Feedback produced for one distinct finding.
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackItem {
    pub finding: Finding,
    /// Titles of the entries the feedback was built from, best first.
    pub matched: Vec<String>,
    /// Name of the strategy whose text was kept.
    pub strategy: String,
    pub degraded: bool,
    pub text: String,
}

/// Counters emitted at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub findings: usize,
    pub knowledge_matches: usize,
    /// Integer percent of findings with at least one knowledge match.
    pub match_rate: u32,
}

impl RunSummary {
    pub fn new(findings: usize, knowledge_matches: usize) -> Self {
        let match_rate = if findings == 0 {
            0
        } else {
            (knowledge_matches * 100 / findings) as u32
        };
        Self {
            findings,
            knowledge_matches,
            match_rate,
        }
    }
}

/// Full result of one pipeline run over one input.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewReport {
    pub run_id: Uuid,
    pub file_label: String,
    pub generated_at: DateTime<Utc>,
    pub items: Vec<FeedbackItem>,
    /// Answer to the user's question when no findings were reported.
    pub answer: Option<String>,
    /// Entries from the generic fallback query when nothing matched.
    pub general_guidance: Vec<KnowledgeEntry>,
    pub warnings: Vec<String>,
    pub summary: RunSummary,
    pub trace: Vec<Stage>,
}

impl ReviewReport {
    /// Concatenate everything a reader should see, in order.
    pub fn render(&self) -> String {
        let mut out = String::new();

        if self.items.is_empty() && self.answer.is_none() {
            out.push_str("No issues found - code looks good!\n");
        }
        for item in &self.items {
            out.push_str(&item.text);
            if !item.text.ends_with('\n') {
                out.push('\n');
            }
            out.push('\n');
        }
        if let Some(answer) = &self.answer {
            out.push_str(answer);
            if !answer.ends_with('\n') {
                out.push('\n');
            }
            out.push('\n');
        }

        if !self.general_guidance.is_empty() {
            out.push_str("=== GENERAL BEST PRACTICES ===\n");
            for entry in &self.general_guidance {
                out.push_str(&format!(
                    "- {} ({})\n  {}\n",
                    entry.title, entry.kind, entry.description
                ));
            }
            out.push('\n');
        }

        for warning in &self.warnings {
            out.push_str(&format!("WARNING: {warning}\n"));
        }

        out.push_str("=== RAG PIPELINE SUMMARY ===\n");
        out.push_str(&format!("Total findings: {}\n", self.summary.findings));
        out.push_str(&format!(
            "Knowledge base matches: {}\n",
            self.summary.knowledge_matches
        ));
        out.push_str(&format!("Match rate: {}%\n", self.summary.match_rate));
        out
    }
}

/// Review request
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRequest {
    pub file_name: String,
    pub source: String,
    pub query: Option<String>,
    /// Findings already produced by external analyzers.
    #[serde(default)]
    pub findings: Vec<Finding>,
}

/// Search request
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    5
}

/// Search response
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchHit>,
}
