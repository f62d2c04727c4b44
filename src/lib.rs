//! # kb-review
//!
//! Augments static-analysis findings with guidance retrieved from a local
//! knowledge base of best practices and anti-patterns, and optionally with a
//! natural-language explanation from an LLM.
//!
//! ## Architecture
//!
//! Each review is a strictly sequential run:
//!
//! ```text
//!        ┌──────────────────┐      ┌────────────────────┐
//!        │ Knowledge JSON   │      │  Source file       │
//!        │ (one per entry)  │      │  + user query      │
//!        └────────┬─────────┘      └─────────┬──────────┘
//!                 │ Init → Indexed            │
//!                 ▼                           ▼
//!        ┌──────────────────┐      ┌────────────────────┐
//!        │ tantivy index    │◄─────│ Analyzers          │
//!        │ + pattern cache  │ scan │ caller / file /    │
//!        └────────┬─────────┘      │ command / KB scan  │
//!                 │                └─────────┬──────────┘
//!                 │                          │ Analyzed: distinct findings
//!                 ▼                          ▼
//!        ┌───────────────────────────────────────────────┐
//!        │ Retrieved: per finding, OR-query over title,  │
//!        │ description, tags (exact, *wildcard*, terms   │
//!        │ associated through the pattern cache)         │
//!        │ none matched → "best practices" (k=2)         │
//!        └───────────────────────┬───────────────────────┘
//!                                ▼
//!        ┌───────────────────────────────────────────────┐
//!        │ Augmented: template fill or structured prompt │
//!        └───────────────────────┬───────────────────────┘
//!                                ▼
//!        ┌───────────────────────────────────────────────┐
//!        │ Generated: backend → retry once → template    │
//!        │ no match → basic feedback + suggested topics  │
//!        └───────────────────────┬───────────────────────┘
//!                                ▼
//!                  Done: report + summary (match rate)
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for paths, strategy, and LLM settings
//! - [`models`] - Shared data types: `KnowledgeEntry`, `Finding`, `ReviewReport`, request/response types
//! - [`error`] - Typed errors, one per failure class
//! - [`knowledge`] - Loading knowledge entry JSON files
//! - [`search::store`] - The `DocumentStore` contract and an in-memory store
//! - [`search::index`] - Knowledge document index powered by tantivy
//! - [`search::indexer`] - Idempotent indexing of a knowledge base into a store
//! - [`search::patterns`] - Keyword co-occurrence cache used for query expansion
//! - [`search::searcher`] - Ranked search, topic listing, and raw-source tag scan
//! - [`analysis`] - Finding producers (knowledge scan, findings file, external command)
//! - [`feedback`] - Template and LLM-backed generation strategies, prompt building
//! - [`llm`] - Blocking chat client for Ollama or OpenAI-compatible APIs
//! - [`pipeline`] - The review state machine
//! - [`api`] - Axum HTTP handlers for review, search, and topics
//! - [`state`] - Shared application state for the HTTP server

pub mod analysis;
pub mod api;
pub mod config;
pub mod error;
pub mod feedback;
pub mod knowledge;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod search;
pub mod state;
