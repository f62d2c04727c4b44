//! Review orchestration: index, analyze, retrieve, augment, generate.
//!
//! One [`Pipeline`] is built per process; each call to [`Pipeline::review`]
//! is an independent, strictly sequential run over one source file.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::analysis::{
    analyzer_failure, AnalysisInput, Analyzer, CommandAnalyzer, KnowledgeScanAnalyzer,
};
use crate::config::{Config, StrategyKind};
use crate::error::{GenerationError, PipelineError, SearchError};
use crate::feedback::prompt::PromptBuilder;
use crate::feedback::template::{basic_feedback, FeedbackTemplate};
use crate::feedback::{
    BackendStrategy, FeedbackRequest, Generated, GenerationStrategy, ResilientStrategy,
    TemplateStrategy,
};
use crate::knowledge::load_knowledge_base;
use crate::llm::client::LlmClient;
use crate::models::{FeedbackItem, Finding, KnowledgeEntry, ReviewReport, RunSummary};
use crate::search::index::KnowledgeIndex;
use crate::search::indexer::{index_knowledge_base, IndexReport};
use crate::search::searcher::KnowledgeSearcher;

/// Generic query used when no finding matched anything.
pub const GENERAL_QUERY: &str = "best practices";
const GENERAL_RESULTS: usize = 2;

/// Where a run is, or where it stopped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    Init,
    Indexed,
    Analyzed,
    Retrieved,
    Augmented,
    Generated,
    Done,
    Failed { at: Box<Stage>, reason: String },
}

/// One file to review.
#[derive(Debug, Clone, Default)]
pub struct ReviewInput {
    pub file_label: String,
    pub path: Option<PathBuf>,
    pub source: String,
    pub query: Option<String>,
    /// Findings supplied by the caller, ahead of any configured analyzer.
    pub findings: Vec<Finding>,
}

impl ReviewInput {
    pub fn from_source(file_label: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            file_label: file_label.into(),
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let source = std::fs::read_to_string(path)?;
        let file_label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            file_label,
            path: Some(path.to_path_buf()),
            source,
            ..Self::default()
        })
    }

    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query.filter(|q| !q.trim().is_empty());
        self
    }

    pub fn with_findings(mut self, findings: Vec<Finding>) -> Self {
        self.findings = findings;
        self
    }
}

/// Validate the configuration, load the knowledge base and index it.
///
/// Everything here is fatal: no knowledge base means no retrieval.
pub fn build_index(config: &Config) -> Result<(Arc<KnowledgeIndex>, IndexReport), PipelineError> {
    config.validate()?;
    let loaded = load_knowledge_base(&config.kb_dir)?;
    let index = Arc::new(KnowledgeIndex::open_or_create(&config.index_dir)?);
    let report = index_knowledge_base(index.as_ref(), &loaded.entries)?;
    Ok((index, report))
}

/// The strategy the configuration asks for, wrapped for graceful degradation.
pub fn strategy_from_config(
    config: &Config,
    template: TemplateStrategy,
) -> Box<dyn GenerationStrategy> {
    match config.generation.strategy {
        StrategyKind::Template => Box::new(template),
        StrategyKind::Backend => match LlmClient::new(config.llm.clone()) {
            Ok(client) => {
                tracing::info!(
                    "LLM provider: {} ({}, model {})",
                    config.llm.provider,
                    config.llm.base_url,
                    config.llm.model
                );
                let prompts = PromptBuilder::new(
                    config.generation.max_code_chars,
                    config.generation.max_prompt_findings,
                );
                Box::new(ResilientStrategy::new(
                    BackendStrategy::new(Arc::new(client), prompts),
                    template,
                ))
            }
            Err(e) => {
                tracing::warn!("{e}; using template feedback");
                Box::new(template)
            }
        },
    }
}

pub struct Pipeline {
    config: Config,
    index: Arc<KnowledgeIndex>,
    searcher: Arc<KnowledgeSearcher>,
    strategy: Box<dyn GenerationStrategy>,
    fallback: TemplateStrategy,
    analyzers: Vec<Box<dyn Analyzer>>,
    index_report: IndexReport,
}

impl Pipeline {
    /// Init → Indexed, with the strategy chosen by `config`.
    pub fn bootstrap(config: Config) -> Result<Self, PipelineError> {
        let template = configured_template(&config);
        let strategy = strategy_from_config(&config, template);
        Self::bootstrap_with(config, strategy)
    }

    /// Init → Indexed, with an explicit generation strategy.
    pub fn bootstrap_with(
        config: Config,
        strategy: Box<dyn GenerationStrategy>,
    ) -> Result<Self, PipelineError> {
        let (index, index_report) = build_index(&config)?;
        let searcher = KnowledgeSearcher::open(index.clone())
            .map_err(|e| failed(Stage::Indexed, e))?;
        let searcher = Arc::new(searcher);

        let mut analyzers: Vec<Box<dyn Analyzer>> = Vec::new();
        if config.scan_source {
            analyzers.push(Box::new(KnowledgeScanAnalyzer::new(searcher.clone())));
        }
        if let Some(command) = config
            .analyzer_command
            .as_deref()
            .and_then(CommandAnalyzer::from_command_line)
        {
            let timeout = Duration::from_secs(config.analyzer_timeout_secs);
            analyzers.push(Box::new(command.with_timeout(timeout)));
        }

        tracing::info!(
            "Pipeline ready: {} documents, strategy '{}', {} analyzers",
            index.num_docs(),
            strategy.name(),
            analyzers.len()
        );

        Ok(Self {
            fallback: configured_template(&config),
            config,
            index,
            searcher,
            strategy,
            analyzers,
            index_report,
        })
    }

    pub fn with_analyzer(mut self, analyzer: Box<dyn Analyzer>) -> Self {
        self.analyzers.push(analyzer);
        self
    }

    pub fn index(&self) -> &KnowledgeIndex {
        &self.index
    }

    pub fn searcher(&self) -> &KnowledgeSearcher {
        &self.searcher
    }

    pub fn index_report(&self) -> &IndexReport {
        &self.index_report
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Indexed → Analyzed → Retrieved → Augmented → Generated → Done.
    pub fn review(&self, input: &ReviewInput) -> Result<ReviewReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("review", %run_id, file = %input.file_label);
        let _enter = span.enter();

        let mut trace = vec![Stage::Init, Stage::Indexed];
        let mut warnings = Vec::new();

        let findings = self.analyze(input, &mut warnings);
        trace.push(Stage::Analyzed);
        tracing::info!("{} distinct findings", findings.len());

        let retrieved = self
            .retrieve(&findings)
            .map_err(|e| failed(Stage::Retrieved, e))?;
        let knowledge_matches = retrieved.iter().filter(|r| !r.is_empty()).count();
        let general_guidance = if !findings.is_empty() && knowledge_matches == 0 {
            tracing::info!("No finding matched, falling back to '{GENERAL_QUERY}'");
            self.searcher
                .search(GENERAL_QUERY, GENERAL_RESULTS)
                .map_err(|e| failed(Stage::Retrieved, e))?
                .into_iter()
                .map(|hit| hit.entry)
                .collect()
        } else {
            Vec::new()
        };
        trace.push(Stage::Retrieved);

        let query = input.query.as_deref();
        let requests: Vec<FeedbackRequest<'_>> = findings
            .iter()
            .zip(&retrieved)
            .map(|(finding, entries)| FeedbackRequest {
                finding,
                entries,
                query,
                code: &input.source,
                file_label: &input.file_label,
            })
            .collect();
        trace.push(Stage::Augmented);

        let topics = if knowledge_matches < findings.len() {
            self.suggested_topics()
        } else {
            Vec::new()
        };

        let mut items = Vec::with_capacity(requests.len());
        for req in &requests {
            if req.entries.is_empty() {
                tracing::info!("No knowledge match for '{}'", req.finding.issue);
                items.push(FeedbackItem {
                    finding: req.finding.clone(),
                    matched: Vec::new(),
                    strategy: "basic".to_string(),
                    degraded: false,
                    text: basic_feedback(req.finding, &topics),
                });
                continue;
            }

            let generated = self.generate(req);
            if let Some(err) = &generated.degraded {
                push_warning(&mut warnings, degradation_warning(&req.finding.issue, err));
            }
            items.push(FeedbackItem {
                finding: req.finding.clone(),
                matched: req.entries.iter().map(|e| e.title.clone()).collect(),
                strategy: generated.strategy.to_string(),
                degraded: generated.degraded.is_some(),
                text: generated.text,
            });
        }

        let answer = match query {
            Some(q) if findings.is_empty() => {
                let generated = self.answer(q, input);
                if let Some(err) = &generated.degraded {
                    push_warning(&mut warnings, degradation_warning("question", err));
                }
                Some(generated.text)
            }
            _ => None,
        };
        trace.push(Stage::Generated);

        let summary = RunSummary::new(findings.len(), knowledge_matches);
        trace.push(Stage::Done);
        tracing::info!(
            "Review complete: {} findings, {} knowledge matches ({}%)",
            summary.findings,
            summary.knowledge_matches,
            summary.match_rate
        );

        Ok(ReviewReport {
            run_id,
            file_label: input.file_label.clone(),
            generated_at: Utc::now(),
            items,
            answer,
            general_guidance,
            warnings,
            summary,
            trace,
        })
    }

    /// Caller findings first, then each analyzer's, deduplicated in order.
    fn analyze(&self, input: &ReviewInput, warnings: &mut Vec<String>) -> Vec<Finding> {
        let analysis = AnalysisInput {
            path: input.path.as_deref(),
            file_label: &input.file_label,
            source: &input.source,
        };

        let mut all = input.findings.clone();
        for analyzer in &self.analyzers {
            match analyzer.analyze(&analysis) {
                Ok(found) => {
                    tracing::info!("{} found {} issues", analyzer.name(), found.len());
                    all.extend(found);
                }
                Err(e) => {
                    tracing::warn!("{e}");
                    push_warning(warnings, e.to_string());
                    all.push(analyzer_failure(&e, &input.file_label));
                }
            }
        }

        let mut seen = HashSet::new();
        all.retain(|f| seen.insert(f.clone()));
        all
    }

    fn retrieve(&self, findings: &[Finding]) -> Result<Vec<Vec<KnowledgeEntry>>, SearchError> {
        findings
            .iter()
            .map(|finding| {
                let hits = self
                    .searcher
                    .search(&finding.issue, self.config.results_per_finding)?;
                Ok(hits.into_iter().map(|hit| hit.entry).collect())
            })
            .collect()
    }

    fn generate(&self, req: &FeedbackRequest<'_>) -> Generated {
        match self.strategy.feedback(req) {
            Ok(generated) => generated,
            Err(e) => {
                tracing::warn!("Strategy '{}' failed: {e}", self.strategy.name());
                Generated {
                    degraded: Some(e),
                    ..self.fallback.feedback_text(req)
                }
            }
        }
    }

    fn answer(&self, query: &str, input: &ReviewInput) -> Generated {
        match self.strategy.answer(query, &input.source, &input.file_label) {
            Ok(generated) => generated,
            Err(e) => {
                tracing::warn!("Strategy '{}' failed to answer: {e}", self.strategy.name());
                Generated {
                    degraded: Some(e),
                    ..self.fallback.answer_text()
                }
            }
        }
    }

    fn suggested_topics(&self) -> Vec<String> {
        match self.searcher.all_topics() {
            Ok(mut topics) => {
                topics.truncate(self.config.suggestion_count);
                topics
            }
            Err(e) => {
                tracing::warn!("Could not list topics: {e}");
                Vec::new()
            }
        }
    }
}

fn configured_template(config: &Config) -> TemplateStrategy {
    TemplateStrategy::new(FeedbackTemplate::from_path(
        config.generation.template_path.as_deref(),
    ))
}

fn failed(stage: Stage, err: impl std::fmt::Display) -> PipelineError {
    let reason = err.to_string();
    tracing::error!("Pipeline failed at {stage:?}: {reason}");
    PipelineError::Failed { stage, reason }
}

fn degradation_warning(what: &str, err: &GenerationError) -> String {
    match err {
        GenerationError::Unavailable => {
            "generation backend unavailable; template feedback used".to_string()
        }
        other => format!("generation failed for '{what}' ({other}); template feedback used"),
    }
}

fn push_warning(warnings: &mut Vec<String>, warning: String) {
    if !warnings.contains(&warning) {
        warnings.push(warning);
    }
}
