use std::collections::HashMap;

use crate::{MigrationError, SourceComment};

/// All comments of one run, addressable by `coid`, iterated in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct CommentGraph {
    comments: Vec<SourceComment>,
    index: HashMap<i64, usize>,
    max_depth: Option<usize>,
}

impl CommentGraph {
    /// Build the graph from source rows.
    ///
    /// A repeated `coid` replaces the earlier row but keeps its position.
    #[must_use]
    pub fn build(rows: Vec<SourceComment>) -> Self {
        let mut graph = Self::default();
        for row in rows {
            match graph.index.get(&row.coid) {
                Some(&slot) => graph.comments[slot] = row,
                None => {
                    graph.index.insert(row.coid, graph.comments.len());
                    graph.comments.push(row);
                }
            }
        }
        graph
    }

    /// Bound ancestry walks; without a bound a cyclic reply chain never terminates.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn get(&self, coid: i64) -> Option<&SourceComment> {
        self.index.get(&coid).map(|&slot| &self.comments[slot])
    }

    pub fn values(&self) -> impl Iterator<Item = &SourceComment> {
        self.comments.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.comments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    /// The `coid` this comment replies to, without checking that it exists.
    ///
    /// # Errors
    /// Returns [`MigrationError::UnknownComment`] when `coid` is not in the graph.
    pub fn immediate_parent(&self, coid: i64) -> Result<Option<i64>, MigrationError> {
        let comment = self.get(coid).ok_or(MigrationError::UnknownComment { coid })?;
        Ok((comment.parent != 0).then_some(comment.parent))
    }

    /// The top of this comment's reply chain, or `None` for a top-level comment.
    ///
    /// # Errors
    /// Returns [`MigrationError::DanglingParent`] when a link in the chain points
    /// at a comment that is not in the graph, and [`MigrationError::AncestryTooDeep`]
    /// when a depth bound is set and exceeded.
    pub fn root_ancestor(&self, coid: i64) -> Result<Option<i64>, MigrationError> {
        let mut current = self.get(coid).ok_or(MigrationError::UnknownComment { coid })?;
        if current.parent == 0 {
            return Ok(None);
        }

        let mut hops = 0_usize;
        while current.parent != 0 {
            if let Some(limit) = self.max_depth {
                if hops >= limit {
                    return Err(MigrationError::AncestryTooDeep { coid, limit });
                }
            }
            current = self.get(current.parent).ok_or(MigrationError::DanglingParent {
                coid: current.coid,
                parent: current.parent,
            })?;
            hops += 1;
        }

        Ok(Some(current.coid))
    }
}
