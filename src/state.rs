use std::sync::Arc;

use crate::pipeline::Pipeline;

const MAX_CONCURRENT_REVIEWS: usize = 3;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Bounds concurrent review runs; each may hold a backend call.
    pub review_semaphore: Arc<tokio::sync::Semaphore>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            review_semaphore: Arc::new(tokio::sync::Semaphore::new(MAX_CONCURRENT_REVIEWS)),
        }
    }
}
