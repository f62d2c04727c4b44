//! Axum handlers for the review service.

pub mod review;
