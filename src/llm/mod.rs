pub mod client;

use crate::error::GenerationError;

/// Text-generation service behind the backend strategy.
pub trait GenerationBackend: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Cheap health check; never an error, just unreachable or not.
    fn is_available(&self) -> bool;
}
