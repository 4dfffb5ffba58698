//! CiteWeave Common Library
//!
//! Shared code for the CiteWeave services including:
//! - Paper identifiers and their normalization
//! - Paper, job, citation-network and relationship models
//! - The per-conversation relationship store
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod errors;
pub mod ids;
pub mod metrics;
pub mod models;
pub mod store;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use ids::{PaperId, RawPaperId};
pub use models::Paper;
pub use store::RelationshipStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum children kept per expanded node, in memory and in the store
pub const MAX_CHILDREN: usize = 3;
