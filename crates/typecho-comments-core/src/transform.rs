use serde::{Deserialize, Serialize};

use crate::config::MigrationConfig;
use crate::graph::CommentGraph;
use crate::hash::{hash_id, md5_hex};
use crate::markdown::Renderer;
use crate::permalink::PermalinkResolver;
use crate::{MigrationError, SourceComment, SourceLookup};

/// One Twikoo comment document.
///
/// `pid`, `rid` and `isSpam` are left out of the JSON entirely when unset; every
/// other optional field serializes as `null`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub nick: Option<String>,
    pub mail: Option<String>,
    #[serde(rename = "mailMd5")]
    pub mail_md5: Option<String>,
    pub link: Option<String>,
    pub ua: String,
    pub ip: Option<String>,
    pub master: bool,
    pub url: String,
    pub href: Option<String>,
    pub comment: String,
    #[serde(rename = "isSpam", default, skip_serializing_if = "Option::is_none")]
    pub is_spam: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub created: i64,
    pub updated: i64,
}

/// Runs the whole conversion for one source and configuration.
pub struct Migrator<'a, S: SourceLookup, R: Renderer> {
    config: &'a MigrationConfig,
    source: &'a S,
    permalinks: PermalinkResolver<'a, S>,
    renderer: R,
}

impl<'a, S: SourceLookup, R: Renderer> Migrator<'a, S, R> {
    /// # Errors
    /// Returns [`MigrationError::Config`] when the configuration does not validate.
    pub fn new(
        config: &'a MigrationConfig,
        source: &'a S,
        renderer: R,
    ) -> Result<Self, MigrationError> {
        config.validate()?;
        Ok(Self { config, source, permalinks: PermalinkResolver::new(source, config)?, renderer })
    }

    /// Load every comment outside `ignoreCID` into a graph.
    ///
    /// # Errors
    /// Propagates source lookup failures.
    pub fn load_graph(&self) -> Result<CommentGraph, MigrationError> {
        let rows = self.source.comments(&self.config.ignore_cid)?;
        Ok(CommentGraph::build(rows).with_max_depth(self.config.max_reply_depth))
    }

    /// Convert every comment of `graph`, in graph order, stopping at the first failure.
    ///
    /// # Errors
    /// Returns [`MigrationError::Record`] naming the comment that failed.
    pub fn convert(&self, graph: &CommentGraph) -> Result<Vec<OutputRecord>, MigrationError> {
        let mut records = Vec::with_capacity(graph.len());
        for comment in graph.values() {
            let record = self.convert_one(graph, comment).map_err(|err| {
                let row = serde_json::to_string(comment).unwrap_or_default();
                tracing::error!(coid = comment.coid, row = %row, "failed to convert comment: {err}");
                MigrationError::Record { coid: comment.coid, row, source: Box::new(err) }
            })?;
            tracing::info!(
                coid = comment.coid,
                author = comment.author.as_deref().unwrap_or_default(),
                text = comment.text.as_deref().unwrap_or_default(),
                "converted comment"
            );
            records.push(record);
        }
        tracing::info!(total = graph.len(), "converted all comments");
        Ok(records)
    }

    /// Load, convert and serialize in one call.
    ///
    /// # Errors
    /// Same as [`Self::load_graph`] and [`Self::convert`].
    pub fn run(&self) -> Result<String, MigrationError> {
        let graph = self.load_graph()?;
        let records = self.convert(&graph)?;
        to_json_lines(&records)
    }

    fn convert_one(
        &self,
        graph: &CommentGraph,
        comment: &SourceComment,
    ) -> Result<OutputRecord, MigrationError> {
        let url = self.permalinks.resolve_url(comment.cid)?;
        let created = comment.created.saturating_mul(1000);
        let salt = self.config.salt();

        let mail = comment
            .mail
            .as_deref()
            .filter(|mail| !mail.is_empty())
            .map(str::to_lowercase);
        let master = match (mail.as_deref(), self.config.email.as_deref()) {
            (Some(mail), Some(owner)) if !owner.is_empty() => mail == owner.to_lowercase(),
            _ => false,
        };
        let href = self
            .config
            .site
            .as_deref()
            .filter(|site| !site.is_empty())
            .map(|site| format!("{site}{url}"));

        Ok(OutputRecord {
            id: hash_id(salt, Some(comment.coid))
                .ok_or(MigrationError::InvalidId { coid: comment.coid })?,
            nick: comment.author.clone(),
            mail_md5: mail.as_deref().map(md5_hex),
            mail,
            link: comment.url.clone(),
            ua: comment.agent.clone().unwrap_or_default(),
            ip: comment.ip.clone(),
            master,
            url,
            href,
            comment: self.renderer.render(comment.text.as_deref().unwrap_or_default()),
            is_spam: comment.is_spam().then_some(true),
            pid: hash_id(salt, graph.immediate_parent(comment.coid)?),
            rid: hash_id(salt, graph.root_ancestor(comment.coid)?),
            created,
            updated: created,
        })
    }
}

/// One JSON document per line, each line terminated by `\n`.
///
/// # Errors
/// Returns [`MigrationError::Serialize`] when a record cannot be encoded.
pub fn to_json_lines(records: &[OutputRecord]) -> Result<String, MigrationError> {
    let mut output = String::new();
    for record in records {
        output.push_str(&serde_json::to_string(record)?);
        output.push('\n');
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::fixtures::{comment, MemorySource};
    use crate::markdown::MarkdownRenderer;

    // 2021-03-05T12:00:00Z
    const MARCH_5_2021: i64 = 1_614_945_600;

    fn config() -> MigrationConfig {
        MigrationConfig {
            salt: Some("pepper".to_string()),
            site: Some("https://blog.example".to_string()),
            email: Some("Owner@Example.com".to_string()),
            timezone: Some("+00:00".to_string()),
            post_permalink: "/{year}/{month}/{day}/{slug}/".to_string(),
            ..MigrationConfig::default()
        }
    }

    fn threaded_source() -> MemorySource {
        MemorySource::default()
            .with_content(10, "post", "hello", MARCH_5_2021)
            .with_comment(comment(1, 10, 0))
            .with_comment(comment(2, 10, 1))
            .with_comment(comment(3, 10, 2))
            .with_comment(comment(4, 10, 0))
    }

    fn convert(source: &MemorySource, config: &MigrationConfig) -> Vec<OutputRecord> {
        let migrator = Migrator::new(config, source, MarkdownRenderer)
            .unwrap_or_else(|err| panic!("migrator should build: {err}"));
        let graph =
            migrator.load_graph().unwrap_or_else(|err| panic!("graph should load: {err}"));
        migrator.convert(&graph).unwrap_or_else(|err| panic!("conversion should succeed: {err}"))
    }

    fn json_lines(output: &str) -> Vec<Value> {
        output
            .lines()
            .map(|line| {
                serde_json::from_str(line)
                    .unwrap_or_else(|err| panic!("line is not JSON: {err}\n{line}"))
            })
            .collect()
    }

    #[test]
    fn top_level_comments_have_no_pid_or_rid() {
        let records = convert(&threaded_source(), &config());
        for record in [&records[0], &records[3]] {
            assert_eq!(record.pid, None);
            assert_eq!(record.rid, None);
        }
    }

    #[test]
    fn replies_reference_parent_and_root_hashes() {
        let records = convert(&threaded_source(), &config());
        let salt = Some("pepper");
        let hash = |coid| hash_id(salt, Some(coid));

        assert_eq!(records.len(), 4);
        assert_eq!(records[1].id, hash(2).unwrap_or_default());
        assert_eq!(records[1].pid, hash(1));
        assert_eq!(records[1].rid, hash(1));

        assert_eq!(records[2].id, hash(3).unwrap_or_default());
        assert_eq!(records[2].pid, hash(2));
        assert_eq!(records[2].rid, hash(1));

        // pid/rid of every reply resolve to an `_id` emitted in the same run
        let ids = records.iter().map(|record| record.id.clone()).collect::<Vec<_>>();
        for record in &records {
            for reference in [&record.pid, &record.rid].into_iter().flatten() {
                assert!(ids.contains(reference));
            }
        }
    }

    #[test]
    fn fields_are_normalised() {
        let mut source = threaded_source();
        source.comments[0].mail = Some("Owner@EXAMPLE.com".to_string());
        source.comments[0].agent = None;
        source.comments[0].text = Some("**bold**".to_string());
        let records = convert(&source, &config());
        let first = &records[0];

        assert_eq!(first.mail.as_deref(), Some("owner@example.com"));
        assert_eq!(first.mail_md5, Some(md5_hex("owner@example.com")));
        assert!(first.master);
        assert!(!records[1].master);
        assert_eq!(first.ua, "");
        assert_eq!(first.url, "/2021/03/05/hello/");
        assert_eq!(first.href.as_deref(), Some("https://blog.example/2021/03/05/hello/"));
        assert_eq!(first.comment, "<p><strong>bold</strong></p>\n");
        assert_eq!(first.created, MARCH_5_2021 * 1000);
        assert_eq!(first.updated, first.created);
    }

    #[test]
    fn missing_mail_and_site_serialize_as_null() -> Result<(), MigrationError> {
        let mut source = threaded_source();
        source.comments[0].mail = None;
        let config = MigrationConfig { site: None, ..config() };
        let migrator = Migrator::new(&config, &source, MarkdownRenderer)?;
        let lines = json_lines(&migrator.run()?);

        assert_eq!(lines[0]["mail"], Value::Null);
        assert_eq!(lines[0]["mailMd5"], Value::Null);
        assert_eq!(lines[0]["href"], Value::Null);
        assert_eq!(lines[0]["master"], Value::Bool(false));
        Ok(())
    }

    #[test]
    fn spam_flag_is_true_or_absent() -> Result<(), MigrationError> {
        let mut source = threaded_source();
        source.comments[1].status = Some("spam".to_string());
        let config = config();
        let migrator = Migrator::new(&config, &source, MarkdownRenderer)?;
        let lines = json_lines(&migrator.run()?);

        assert!(lines[0].get("isSpam").is_none());
        assert_eq!(lines[1]["isSpam"], Value::Bool(true));
        assert!(lines[0].get("pid").is_none());
        assert!(lines[0].get("rid").is_none());
        assert!(lines[1].get("pid").is_some());
        Ok(())
    }

    #[test]
    fn serialized_field_order_is_stable() -> Result<(), MigrationError> {
        let source = threaded_source();
        let config = config();
        let migrator = Migrator::new(&config, &source, MarkdownRenderer)?;
        let output = migrator.run()?;
        let second_line = output.lines().nth(1).unwrap_or_default();
        let keys = match serde_json::from_str::<Value>(second_line)? {
            Value::Object(object) => object.keys().cloned().collect::<Vec<_>>(),
            other => panic!("expected object, got {other}"),
        };
        assert_eq!(
            keys,
            vec![
                "_id", "nick", "mail", "mailMd5", "link", "ua", "ip", "master", "url", "href",
                "comment", "pid", "rid", "created", "updated"
            ]
        );
        Ok(())
    }

    #[test]
    fn rerun_is_byte_identical() -> Result<(), MigrationError> {
        let source = threaded_source();
        let config = config();
        let first = Migrator::new(&config, &source, MarkdownRenderer)?.run()?;
        let second = Migrator::new(&config, &source, MarkdownRenderer)?.run()?;
        assert_eq!(first, second);
        assert!(first.ends_with('\n'));
        assert_eq!(first.lines().count(), 4);
        Ok(())
    }

    #[test]
    fn ignored_content_is_skipped() -> Result<(), MigrationError> {
        let source = threaded_source()
            .with_content(11, "page", "about", MARCH_5_2021)
            .with_comment(comment(9, 11, 0));
        let config = MigrationConfig { ignore_cid: vec![11], ..config() };
        let migrator = Migrator::new(&config, &source, MarkdownRenderer)?;
        assert_eq!(migrator.load_graph()?.len(), 4);
        Ok(())
    }

    #[test]
    fn missing_content_aborts_before_later_comments() -> Result<(), MigrationError> {
        let source = MemorySource::default()
            .with_content(10, "post", "hello", MARCH_5_2021)
            .with_comment(comment(1, 10, 0))
            .with_comment(comment(2, 404, 0))
            .with_comment(comment(3, 10, 0));
        let config = config();
        let rendered = std::cell::Cell::new(0_usize);
        let counting = |text: &str| {
            rendered.set(rendered.get() + 1);
            text.to_string()
        };
        let migrator = Migrator::new(&config, &source, counting)?;
        let graph = migrator.load_graph()?;

        match migrator.convert(&graph) {
            Err(MigrationError::Record { coid, row, source }) => {
                assert_eq!(coid, 2);
                assert!(row.contains("\"coid\":2"), "{row}");
                assert!(matches!(*source, MigrationError::ContentNotFound { cid: 404 }));
            }
            other => panic!("expected record failure, got {other:?}"),
        }
        assert_eq!(rendered.get(), 1, "no comment after the failing one is processed");
        Ok(())
    }

    #[test]
    fn zero_comment_id_is_reported_as_invalid() -> Result<(), MigrationError> {
        let source = MemorySource::default()
            .with_content(10, "post", "hello", MARCH_5_2021)
            .with_comment(comment(0, 10, 0));
        let config = config();
        let migrator = Migrator::new(&config, &source, MarkdownRenderer)?;
        let graph = migrator.load_graph()?;
        assert!(graph.get(0).is_some());
        match migrator.convert(&graph) {
            Err(MigrationError::Record { coid: 0, source, .. }) => {
                assert!(matches!(*source, MigrationError::InvalidId { coid: 0 }));
                assert_eq!(source.to_string(), "comment id 0 cannot be hashed into a document id");
            }
            other => panic!("expected invalid id failure, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn dangling_reply_chain_aborts_the_run() -> Result<(), MigrationError> {
        let source = MemorySource::default()
            .with_content(10, "post", "hello", MARCH_5_2021)
            .with_comment(comment(5, 10, 99));
        let config = config();
        let migrator = Migrator::new(&config, &source, MarkdownRenderer)?;
        let graph = migrator.load_graph()?;
        match migrator.convert(&graph) {
            Err(MigrationError::Record { source, .. }) => {
                assert!(matches!(*source, MigrationError::DanglingParent { coid: 5, parent: 99 }));
            }
            other => panic!("expected dangling parent failure, got {other:?}"),
        }
        Ok(())
    }
}
