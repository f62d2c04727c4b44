use std::sync::Arc;

use crate::error::GenerationError;
use crate::feedback::prompt::PromptBuilder;
use crate::feedback::template::{basic_feedback, FeedbackTemplate};
use crate::llm::GenerationBackend;
use crate::models::{Finding, KnowledgeEntry};

/// Everything one generation call may draw on.
#[derive(Debug, Clone, Copy)]
pub struct FeedbackRequest<'a> {
    pub finding: &'a Finding,
    /// Retrieved entries, best first.
    pub entries: &'a [KnowledgeEntry],
    pub query: Option<&'a str>,
    pub code: &'a str,
    pub file_label: &'a str,
}

/// Text a strategy produced, and why it is degraded if it is.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub text: String,
    pub strategy: &'static str,
    /// The backend failure that forced a fallback, if any.
    pub degraded: Option<GenerationError>,
}

impl Generated {
    fn clean(text: String, strategy: &'static str) -> Self {
        Self {
            text,
            strategy,
            degraded: None,
        }
    }
}

pub trait GenerationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Feedback for one finding and its retrieved entries.
    fn feedback(&self, req: &FeedbackRequest<'_>) -> Result<Generated, GenerationError>;

    /// Reply to a free-text question when the run has no findings.
    fn answer(
        &self,
        query: &str,
        code: &str,
        file_label: &str,
    ) -> Result<Generated, GenerationError>;
}

/// Fixed text for question mode without a generative backend.
pub const NO_ISSUES_ANSWER: &str = "No issues found - code looks good!";

/// Deterministic placeholder substitution. Never fails.
#[derive(Debug, Clone, Default)]
pub struct TemplateStrategy {
    template: FeedbackTemplate,
}

impl TemplateStrategy {
    pub fn new(template: FeedbackTemplate) -> Self {
        Self { template }
    }

    pub fn render(&self, req: &FeedbackRequest<'_>) -> String {
        match req.entries.first() {
            Some(best) => self.template.render(req.finding, best),
            None => basic_feedback(req.finding, &[]),
        }
    }

    pub fn feedback_text(&self, req: &FeedbackRequest<'_>) -> Generated {
        Generated::clean(self.render(req), "template")
    }

    pub fn answer_text(&self) -> Generated {
        Generated::clean(NO_ISSUES_ANSWER.to_string(), "template")
    }
}

impl GenerationStrategy for TemplateStrategy {
    fn name(&self) -> &'static str {
        "template"
    }

    fn feedback(&self, req: &FeedbackRequest<'_>) -> Result<Generated, GenerationError> {
        Ok(self.feedback_text(req))
    }

    fn answer(
        &self,
        _query: &str,
        _code: &str,
        _file_label: &str,
    ) -> Result<Generated, GenerationError> {
        Ok(self.answer_text())
    }
}

/// Structured prompt sent to a generative backend.
pub struct BackendStrategy {
    backend: Arc<dyn GenerationBackend>,
    prompts: PromptBuilder,
}

impl BackendStrategy {
    pub fn new(backend: Arc<dyn GenerationBackend>, prompts: PromptBuilder) -> Self {
        Self { backend, prompts }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }
}

impl GenerationStrategy for BackendStrategy {
    fn name(&self) -> &'static str {
        "backend"
    }

    fn feedback(&self, req: &FeedbackRequest<'_>) -> Result<Generated, GenerationError> {
        let prompt = self.prompts.build(
            req.query,
            std::slice::from_ref(req.finding),
            req.entries,
            req.code,
            req.file_label,
        );
        let text = self.backend.generate(&prompt)?;
        Ok(Generated::clean(text, self.name()))
    }

    fn answer(
        &self,
        query: &str,
        code: &str,
        file_label: &str,
    ) -> Result<Generated, GenerationError> {
        let prompt = PromptBuilder::build_simple(query, code, file_label);
        let text = self.backend.generate(&prompt)?;
        Ok(Generated::clean(text, self.name()))
    }
}

/// Backend first; one retry on failure, then the template.
///
/// Availability is checked once at construction. An unavailable backend is
/// never called, and its output is exactly the template's.
pub struct ResilientStrategy {
    primary: BackendStrategy,
    fallback: TemplateStrategy,
    available: bool,
}

impl ResilientStrategy {
    pub fn new(primary: BackendStrategy, fallback: TemplateStrategy) -> Self {
        let available = primary.is_available();
        if available {
            tracing::info!("Generation backend available");
        } else {
            tracing::warn!("Generation backend unavailable, using template feedback");
        }
        Self {
            primary,
            fallback,
            available,
        }
    }

    fn with_retry<F>(
        &self,
        what: &str,
        call: F,
        fallback: impl FnOnce() -> Generated,
    ) -> Generated
    where
        F: Fn() -> Result<Generated, GenerationError>,
    {
        if !self.available {
            return Generated {
                degraded: Some(GenerationError::Unavailable),
                ..fallback()
            };
        }

        let err = match call() {
            Ok(generated) => return generated,
            Err(first) => {
                tracing::warn!("Generation failed for {what} ({first}), retrying once");
                match call() {
                    Ok(generated) => return generated,
                    Err(second) => second,
                }
            }
        };

        tracing::warn!("Generation failed again for {what} ({err}), falling back to template");
        Generated {
            degraded: Some(err),
            ..fallback()
        }
    }
}

impl GenerationStrategy for ResilientStrategy {
    fn name(&self) -> &'static str {
        "resilient"
    }

    fn feedback(&self, req: &FeedbackRequest<'_>) -> Result<Generated, GenerationError> {
        Ok(self.with_retry(
            &req.finding.issue,
            || self.primary.feedback(req),
            || self.fallback.feedback_text(req),
        ))
    }

    fn answer(
        &self,
        query: &str,
        code: &str,
        file_label: &str,
    ) -> Result<Generated, GenerationError> {
        Ok(self.with_retry(
            "question",
            || self.primary.answer(query, code, file_label),
            || self.fallback.answer_text(),
        ))
    }
}
