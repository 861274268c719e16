use std::path::Path;

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};
use typecho_comments_core::{
    CategoryMeta, ContentRow, MigrationError, SourceComment, SourceLookup,
};

/// Read-only view over the tables of a Typecho SQLite database.
///
/// The connection is opened once and closed when the source is dropped.
pub struct SqliteSource {
    conn: Connection,
    comments_table: String,
    contents_table: String,
    metas_table: String,
    relationships_table: String,
}

impl SqliteSource {
    /// Open a Typecho database file without write access.
    ///
    /// # Errors
    /// Returns an error when the prefix is not identifier-safe, the file cannot be
    /// opened, or one of the required tables is missing.
    pub fn open(path: &Path, prefix: &str) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch("PRAGMA busy_timeout = 5000;")
            .context("failed to configure sqlite pragmas")?;

        tracing::debug!(path = %path.display(), prefix, "opened typecho database");
        Self::from_connection(conn, prefix)
    }

    /// Wrap an already open connection.
    ///
    /// # Errors
    /// Same as [`Self::open`], minus the file handling.
    pub fn from_connection(conn: Connection, prefix: &str) -> Result<Self> {
        if !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(anyhow!("table prefix MUST be [A-Za-z0-9_]*, got {prefix:?}"));
        }

        let source = Self {
            conn,
            comments_table: format!("{prefix}comments"),
            contents_table: format!("{prefix}contents"),
            metas_table: format!("{prefix}metas"),
            relationships_table: format!("{prefix}relationships"),
        };

        for table in [
            &source.comments_table,
            &source.contents_table,
            &source.metas_table,
            &source.relationships_table,
        ] {
            if !table_exists(&source.conn, table)? {
                return Err(anyhow!("required table {table} is missing"));
            }
        }

        Ok(source)
    }

    fn load_comments(&self, ignore_cids: &[i64]) -> Result<Vec<SourceComment>> {
        let filter = if ignore_cids.is_empty() {
            String::new()
        } else {
            let placeholders = vec!["?"; ignore_cids.len()].join(", ");
            format!(" WHERE cid NOT IN ({placeholders})")
        };
        let sql = format!(
            "SELECT coid, cid, parent, author, mail, url, agent, ip, status, text, created
             FROM \"{}\"{filter}
             ORDER BY coid ASC",
            self.comments_table
        );

        let mut stmt = self.conn.prepare(&sql).context("failed to prepare comment query")?;
        let mut rows = stmt.query(params_from_iter(ignore_cids.iter()))?;
        let mut comments = Vec::new();

        while let Some(row) = rows.next()? {
            comments.push(comment_from_row(row)?);
        }

        tracing::debug!(count = comments.len(), ignored = ignore_cids.len(), "loaded comments");
        Ok(comments)
    }

    fn load_content(&self, cid: i64) -> Result<Option<ContentRow>> {
        let sql = format!(
            "SELECT cid, type, slug, created FROM \"{}\" WHERE cid = ?1",
            self.contents_table
        );
        self.conn
            .query_row(&sql, params![cid], |row| {
                Ok(ContentRow {
                    cid: row.get(0)?,
                    kind: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    slug: row.get(2)?,
                    created: row.get(3)?,
                })
            })
            .optional()
            .with_context(|| format!("failed to load content {cid}"))
    }

    fn load_linked_categories(&self, cid: i64) -> Result<Vec<CategoryMeta>> {
        let sql = format!(
            "SELECT mid, slug, parent FROM \"{}\"
             WHERE type = 'category'
               AND mid IN (SELECT mid FROM \"{}\" WHERE cid = ?1)
             ORDER BY mid ASC",
            self.metas_table, self.relationships_table
        );
        let mut stmt = self.conn.prepare(&sql).context("failed to prepare category query")?;
        let metas = stmt
            .query_map(params![cid], category_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("failed to load categories of content {cid}"))?;
        Ok(metas)
    }

    fn load_category(&self, mid: i64) -> Result<Option<CategoryMeta>> {
        let sql = format!(
            "SELECT mid, slug, parent FROM \"{}\" WHERE mid = ?1 AND type = 'category'",
            self.metas_table
        );
        self.conn
            .query_row(&sql, params![mid], category_from_row)
            .optional()
            .with_context(|| format!("failed to load category {mid}"))
    }
}

impl SourceLookup for SqliteSource {
    fn comments(&self, ignore_cids: &[i64]) -> Result<Vec<SourceComment>, MigrationError> {
        self.load_comments(ignore_cids).map_err(MigrationError::backend)
    }

    fn content(&self, cid: i64) -> Result<Option<ContentRow>, MigrationError> {
        self.load_content(cid).map_err(MigrationError::backend)
    }

    fn categories_for_content(&self, cid: i64) -> Result<Vec<CategoryMeta>, MigrationError> {
        self.load_linked_categories(cid).map_err(MigrationError::backend)
    }

    fn category(&self, mid: i64) -> Result<Option<CategoryMeta>, MigrationError> {
        self.load_category(mid).map_err(MigrationError::backend)
    }
}

fn comment_from_row(row: &Row<'_>) -> Result<SourceComment> {
    let coid: i64 = row.get(0).context("comment row without coid")?;
    Ok(SourceComment {
        coid,
        cid: row.get(1).with_context(|| format!("comment {coid} has no cid"))?,
        parent: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
        author: row.get(3)?,
        mail: row.get(4)?,
        url: row.get(5)?,
        agent: row.get(6)?,
        ip: row.get(7)?,
        status: row.get(8)?,
        text: row.get(9)?,
        created: row.get(10).with_context(|| format!("comment {coid} has no created time"))?,
    })
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<CategoryMeta> {
    Ok(CategoryMeta {
        mid: row.get(0)?,
        slug: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        parent: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
    })
}

fn table_exists(conn: &Connection, table_name: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            params![table_name],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("failed to check if table exists: {table_name}"))?;
    Ok(exists == 1)
}
