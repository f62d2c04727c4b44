//! Feedback generation: template substitution, prompt construction, and the
//! strategies that choose between them.

pub mod prompt;
pub mod strategy;
pub mod template;

pub use strategy::{
    BackendStrategy, FeedbackRequest, Generated, GenerationStrategy, ResilientStrategy,
    TemplateStrategy,
};
