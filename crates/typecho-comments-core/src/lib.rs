//! Typecho comment rows to Twikoo comment documents.
//!
//! The crate is pure: every read from the source database goes through the
//! [`SourceLookup`] trait and every output record is returned in memory.

use serde::{Deserialize, Serialize};

pub mod category;
pub mod config;
pub mod graph;
pub mod hash;
pub mod markdown;
pub mod permalink;
pub mod transform;

pub use category::CategoryResolver;
pub use config::{DatabaseConfig, MigrationConfig};
pub use graph::CommentGraph;
pub use hash::{hash_id, md5_hex};
pub use markdown::{MarkdownRenderer, Renderer};
pub use permalink::{render_template, PermalinkResolver};
pub use transform::{to_json_lines, Migrator, OutputRecord};

/// Status value Typecho stores for comments flagged as spam.
pub const SPAM_STATUS: &str = "spam";

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("content {cid} not found")]
    ContentNotFound { cid: i64 },
    #[error("comment {coid} is not part of the comment graph")]
    UnknownComment { coid: i64 },
    #[error("comment id {coid} cannot be hashed into a document id")]
    InvalidId { coid: i64 },
    #[error("comment {coid} replies to missing comment {parent}")]
    DanglingParent { coid: i64, parent: i64 },
    #[error("reply chain of comment {coid} exceeds {limit} levels")]
    AncestryTooDeep { coid: i64, limit: usize },
    #[error("category chain of meta {mid} exceeds {limit} levels")]
    CategoryTooDeep { mid: i64, limit: usize },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("source lookup failed: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to convert comment {coid}: {source}")]
    Record {
        coid: i64,
        row: String,
        #[source]
        source: Box<MigrationError>,
    },
}

impl MigrationError {
    /// Wrap any backend error as a source lookup failure.
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Source(err.into())
    }
}

/// One row of the `comments` table.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct SourceComment {
    pub coid: i64,
    pub cid: i64,
    /// `0` marks a top-level comment.
    pub parent: i64,
    pub author: Option<String>,
    pub mail: Option<String>,
    pub url: Option<String>,
    pub agent: Option<String>,
    pub ip: Option<String>,
    pub status: Option<String>,
    pub text: Option<String>,
    /// Unix seconds.
    pub created: i64,
}

impl SourceComment {
    #[must_use]
    pub fn is_spam(&self) -> bool {
        self.status.as_deref() == Some(SPAM_STATUS)
    }
}

/// One `type = 'category'` row of the `metas` table.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct CategoryMeta {
    pub mid: i64,
    pub slug: String,
    /// `0` marks a root category.
    pub parent: i64,
}

/// The subset of a `contents` row needed to build its permalink.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ContentRow {
    pub cid: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub slug: Option<String>,
    /// Unix seconds.
    pub created: i64,
}

/// Read-only access to the Typecho tables.
///
/// Calls are issued one at a time, in sequence, for a single comment.
pub trait SourceLookup {
    /// All comments, skipping those attached to any content id in `ignore_cids`.
    ///
    /// # Errors
    /// Returns [`MigrationError::Source`] when the backend cannot be read.
    fn comments(&self, ignore_cids: &[i64]) -> Result<Vec<SourceComment>, MigrationError>;

    /// # Errors
    /// Returns [`MigrationError::Source`] when the backend cannot be read.
    fn content(&self, cid: i64) -> Result<Option<ContentRow>, MigrationError>;

    /// Category metas linked to `cid`, in the backend's natural order.
    ///
    /// # Errors
    /// Returns [`MigrationError::Source`] when the backend cannot be read.
    fn categories_for_content(&self, cid: i64) -> Result<Vec<CategoryMeta>, MigrationError>;

    /// # Errors
    /// Returns [`MigrationError::Source`] when the backend cannot be read.
    fn category(&self, mid: i64) -> Result<Option<CategoryMeta>, MigrationError>;
}

impl<T: SourceLookup + ?Sized> SourceLookup for &T {
    fn comments(&self, ignore_cids: &[i64]) -> Result<Vec<SourceComment>, MigrationError> {
        (**self).comments(ignore_cids)
    }

    fn content(&self, cid: i64) -> Result<Option<ContentRow>, MigrationError> {
        (**self).content(cid)
    }

    fn categories_for_content(&self, cid: i64) -> Result<Vec<CategoryMeta>, MigrationError> {
        (**self).categories_for_content(cid)
    }

    fn category(&self, mid: i64) -> Result<Option<CategoryMeta>, MigrationError> {
        (**self).category(mid)
    }
}
