//! Finding producers: the knowledge scan plus external analyzer output.

use serde::Deserialize;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::AnalyzerError;
use crate::models::Finding;
use crate::search::searcher::KnowledgeSearcher;

/// The file under review.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisInput<'a> {
    /// On-disk path, when the source came from a file.
    pub path: Option<&'a Path>,
    pub file_label: &'a str,
    pub source: &'a str,
}

pub trait Analyzer: Send + Sync {
    fn name(&self) -> &str;

    fn analyze(&self, input: &AnalysisInput<'_>) -> Result<Vec<Finding>, AnalyzerError>;
}

/// Flags knowledge entries whose tags appear literally in the source.
pub struct KnowledgeScanAnalyzer {
    searcher: Arc<KnowledgeSearcher>,
}

impl KnowledgeScanAnalyzer {
    pub fn new(searcher: Arc<KnowledgeSearcher>) -> Self {
        Self { searcher }
    }
}

impl Analyzer for KnowledgeScanAnalyzer {
    fn name(&self) -> &str {
        "knowledge-scan"
    }

    fn analyze(&self, input: &AnalysisInput<'_>) -> Result<Vec<Finding>, AnalyzerError> {
        self.searcher
            .search_in_code(input.source, input.file_label)
            .map_err(|e| AnalyzerError::new(self.name(), e.to_string()))
    }
}

/// Findings some other tool already wrote to a JSON file.
pub struct FindingsFileAnalyzer {
    path: PathBuf,
}

impl FindingsFileAnalyzer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Analyzer for FindingsFileAnalyzer {
    fn name(&self) -> &str {
        "findings-file"
    }

    fn analyze(&self, _input: &AnalysisInput<'_>) -> Result<Vec<Finding>, AnalyzerError> {
        let data = std::fs::read_to_string(&self.path).map_err(|e| {
            AnalyzerError::new(self.name(), format!("{}: {e}", self.path.display()))
        })?;
        parse_findings(self.name(), &data)
    }
}

pub const DEFAULT_ANALYZER_TIMEOUT: Duration = Duration::from_secs(120);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs an external command and reads findings from its stdout.
///
/// The file path is appended as the last argument; when the source has no
/// path it is piped on stdin instead. A command still running at the
/// deadline is killed and reported as an analyzer failure.
pub struct CommandAnalyzer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandAnalyzer {
    /// Split a command line on whitespace. `None` when it is blank.
    ///
    /// Quotes are not interpreted; wrap invocations that need quoted
    /// arguments in a script.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            timeout: DEFAULT_ANALYZER_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn wait_with_deadline(&self, child: &mut Child) -> Result<ExitStatus, AnalyzerError> {
        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if started.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    tracing::warn!("Analyzer '{}' killed after {:?}", self.program, self.timeout);
                    return Err(AnalyzerError::new(
                        self.name(),
                        format!("timed out after {}s", self.timeout.as_secs_f32()),
                    ));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    return Err(AnalyzerError::new(self.name(), format!("wait failed: {e}")));
                }
            }
        }
    }
}

impl Analyzer for CommandAnalyzer {
    fn name(&self) -> &str {
        &self.program
    }

    fn analyze(&self, input: &AnalysisInput<'_>) -> Result<Vec<Finding>, AnalyzerError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        match input.path {
            Some(path) => {
                cmd.arg(path).stdin(Stdio::null());
            }
            None => {
                cmd.stdin(Stdio::piped());
            }
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| AnalyzerError::new(self.name(), format!("failed to start: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            let source = input.source.to_string();
            // The child may never read stdin.
            thread::spawn(move || {
                let _ = stdin.write_all(source.as_bytes());
            });
        }
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = self.wait_with_deadline(&mut child)?;
        let stdout = collect(stdout);
        let stderr = collect(stderr);

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(AnalyzerError::new(
                self.name(),
                format!("exited with {status}: {}", stderr.trim()),
            ));
        }

        parse_findings(self.name(), &String::from_utf8_lossy(&stdout))
    }
}

/// Read a child pipe to the end on its own thread, so a chatty child never
/// blocks on a full pipe while we poll for its exit.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

#[derive(Deserialize)]
struct RawFinding {
    issue: String,
    #[serde(default)]
    details: String,
}

/// Parse a JSON array of `{issue, details}` objects.
pub fn parse_findings(analyzer: &str, data: &str) -> Result<Vec<Finding>, AnalyzerError> {
    let trimmed = data.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let raw: Vec<RawFinding> = serde_json::from_str(trimmed)
        .map_err(|e| AnalyzerError::new(analyzer, format!("unparseable findings: {e}")))?;
    Ok(raw
        .into_iter()
        .filter(|f| !f.issue.trim().is_empty())
        .map(|f| Finding::new(f.issue, f.details))
        .collect())
}

/// Stand-in finding so a failed analyzer still shows up in the report.
pub fn analyzer_failure(err: &AnalyzerError, file_label: &str) -> Finding {
    Finding::new("AnalyzerError", format!("{file_label} - {err}"))
}
