//! # batcher-types
//!
//! Shared domain types for the index batcher.
//!
//! This crate defines the data that flows between the pipeline, the
//! network client and the command-line front end:
//! - Actions: a requested document mutation and its kind
//! - Results: the per-action outcome reported by the indexing service
//! - Settings: layered configuration for the sender and the service
//!
//! ## Usage
//!
//! ```rust
//! use batcher_types::{ActionKind, IndexAction};
//!
//! let action = IndexAction::upload(serde_json::json!({"id": "1"}));
//! assert_eq!(action.kind, ActionKind::Upload);
//! ```

pub mod action;
pub mod config;
pub mod error;
pub mod result;

pub use action::{ActionKind, IndexAction};
pub use config::{SenderConfig, ServiceSettings, Settings};
pub use error::SettingsError;
pub use result::ActionResult;
