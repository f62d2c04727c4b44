use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::Stage;

/// The knowledge base or the index location cannot be written. Fatal.
#[derive(Debug, Error)]
pub enum IndexWriteError {
    #[error("knowledge base directory {path} is unreadable: {source}")]
    KnowledgeBaseUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("index location {path} is unwritable: {source}")]
    Unwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("index write failed: {0}")]
    Tantivy(#[from] tantivy::TantivyError),
}

/// Reading from the index failed.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("index read failed: {0}")]
    Tantivy(#[from] tantivy::TantivyError),
    #[error("stored document is missing field '{0}'")]
    MissingField(&'static str),
}

/// One knowledge record could not be parsed. Recovered by skipping it.
#[derive(Debug, Error)]
#[error("skipping knowledge record {path}: {reason}")]
pub struct RecordParseError {
    pub path: PathBuf,
    pub reason: String,
}

/// An external analyzer failed. Recovered as a synthetic finding.
#[derive(Debug, Error)]
#[error("analyzer '{analyzer}' failed: {reason}")]
pub struct AnalyzerError {
    pub analyzer: String,
    pub reason: String,
}

impl AnalyzerError {
    pub fn new(analyzer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            analyzer: analyzer.into(),
            reason: reason.into(),
        }
    }
}

/// A generation attempt failed. Recovered by retry, then template fallback.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    #[error("generation backend timed out")]
    Timeout,
    #[error("generation backend unreachable: {0}")]
    Unreachable(String),
    #[error("generation backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed generation response: {0}")]
    Malformed(String),
    #[error("generation backend reports unavailable")]
    Unavailable,
    #[error("unsupported LLM provider: {0}")]
    UnsupportedProvider(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GenerationError::Timeout
        } else if e.is_decode() {
            GenerationError::Malformed(e.to_string())
        } else {
            GenerationError::Unreachable(e.to_string())
        }
    }
}

/// Required settings are missing or invalid. Fatal, reported before indexing.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{what} not found at {path}; {remedy}")]
    MissingPath {
        what: &'static str,
        path: PathBuf,
        remedy: &'static str,
    },
    #[error("invalid value '{value}' for {key}; expected {expected}")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Why a pipeline run stopped.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Index(#[from] IndexWriteError),
    #[error("pipeline failed at {stage:?}: {reason}")]
    Failed { stage: Stage, reason: String },
}

impl PipelineError {
    /// The terminal `Failed` state this error leaves a run in.
    pub fn terminal_stage(&self) -> Stage {
        let (at, reason) = match self {
            PipelineError::Config(e) => (Stage::Init, e.to_string()),
            PipelineError::Index(e) => (Stage::Init, e.to_string()),
            PipelineError::Failed { stage, reason } => (stage.clone(), reason.clone()),
        };
        Stage::Failed {
            at: Box::new(at),
            reason,
        }
    }
}
