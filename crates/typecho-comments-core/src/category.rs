use std::collections::VecDeque;

use crate::config::MigrationConfig;
use crate::{CategoryMeta, MigrationError, SourceLookup};

/// Walks the category tree a piece of content belongs to.
#[derive(Debug)]
pub struct CategoryResolver<'a, S: SourceLookup> {
    source: &'a S,
    config: &'a MigrationConfig,
}

impl<'a, S: SourceLookup> CategoryResolver<'a, S> {
    #[must_use]
    pub fn new(source: &'a S, config: &'a MigrationConfig) -> Self {
        Self { source, config }
    }

    /// The first category linked to `cid`, before any ancestry walk.
    ///
    /// # Errors
    /// Propagates source lookup failures.
    pub fn leaf_category(&self, cid: i64) -> Result<Option<CategoryMeta>, MigrationError> {
        Ok(self.source.categories_for_content(cid)?.into_iter().next())
    }

    /// Root-first chain from the top-level category down to the linked one.
    ///
    /// The walk stops at a root (`parent == 0`) or at a parent id with no
    /// category row.
    ///
    /// # Errors
    /// Propagates source lookup failures and returns
    /// [`MigrationError::CategoryTooDeep`] when `maxReplyDepth` is set and exceeded.
    pub fn category_chain(&self, cid: i64) -> Result<Vec<CategoryMeta>, MigrationError> {
        let Some(leaf) = self.leaf_category(cid)? else {
            return Ok(Vec::new());
        };

        let mut chain = VecDeque::from([leaf]);
        while let Some(top) = chain.front() {
            if top.parent == 0 {
                break;
            }
            if let Some(limit) = self.config.max_reply_depth {
                if chain.len() > limit {
                    return Err(MigrationError::CategoryTooDeep { mid: top.mid, limit });
                }
            }
            match self.source.category(top.parent)? {
                Some(parent) => chain.push_front(parent),
                None => break,
            }
        }

        Ok(chain.into())
    }

    /// Slug of the category linked directly to `cid`, renamed, or `""`.
    ///
    /// # Errors
    /// Propagates source lookup failures.
    pub fn immediate_category(&self, cid: i64) -> Result<String, MigrationError> {
        Ok(self
            .leaf_category(cid)?
            .map(|meta| self.config.replace_slug(&meta.slug).to_string())
            .unwrap_or_default())
    }

    /// Every renamed slug of the chain joined with `/`, root first.
    ///
    /// # Errors
    /// Same as [`Self::category_chain`].
    pub fn directory(&self, cid: i64) -> Result<String, MigrationError> {
        Ok(self
            .category_chain(cid)?
            .iter()
            .map(|meta| self.config.replace_slug(&meta.slug))
            .collect::<Vec<_>>()
            .join("/"))
    }
}
