//! Core library for an offline image catalog with AI-generated descriptions.
//!
//! The GUI shell talks to [`catalog::Catalog`], which composes the JSON-backed
//! record store, recursive file discovery and the retry-protected captioning
//! client. There is no CLI surface and no server: this crate is embedded in a
//! desktop shell that renders the grid and forwards user actions.

pub mod caption;
pub mod catalog;
pub mod config;
pub mod debounce;
pub mod discovery;
pub mod error;
pub mod models;
pub mod store;

pub use caption::{CaptionClient, CaptionProvider, GeminiProvider, ImagePayload};
pub use catalog::{Catalog, CaptionRequest};
pub use config::{CaptionConfig, PromptCatalog, RetryPolicy, StorePaths, DEFAULT_PROMPT};
pub use debounce::Debouncer;
pub use error::{Error, Result};
pub use models::{BatchFailure, BatchSummary, EditOutcome, ImageRecord, TagsInput};
pub use store::CatalogStore;
