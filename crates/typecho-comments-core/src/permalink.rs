use std::collections::BTreeMap;

use chrono::Datelike;

use crate::category::CategoryResolver;
use crate::config::{DateZone, MigrationConfig, FALLBACK_PERMALINK};
use crate::{MigrationError, SourceLookup};

/// Replace every `{name}` token that has an entry in `substitutions`.
///
/// Single pass: substituted text is never scanned again, and tokens without an
/// entry are copied through verbatim.
#[must_use]
pub fn render_template(template: &str, substitutions: &BTreeMap<&str, String>) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let candidate = &rest[open..];
        let Some(close) = candidate[1..].find(['{', '}']).map(|index| index + 1) else {
            rendered.push_str(candidate);
            return rendered;
        };
        if candidate.as_bytes()[close] == b'{' {
            // `{` nested before any `}`: the outer brace cannot start a token
            rendered.push_str(&candidate[..close]);
            rest = &candidate[close..];
            continue;
        }
        let name = &candidate[1..close];
        match substitutions.get(name) {
            Some(value) => rendered.push_str(value),
            None => rendered.push_str(&candidate[..=close]),
        }
        rest = &candidate[close + 1..];
    }

    rendered.push_str(rest);
    rendered
}

/// Builds the public relative path of a post or page.
#[derive(Debug)]
pub struct PermalinkResolver<'a, S: SourceLookup> {
    source: &'a S,
    config: &'a MigrationConfig,
    categories: CategoryResolver<'a, S>,
    zone: DateZone,
}

impl<'a, S: SourceLookup> PermalinkResolver<'a, S> {
    /// # Errors
    /// Returns [`MigrationError::Config`] when the configured timezone is invalid.
    pub fn new(source: &'a S, config: &'a MigrationConfig) -> Result<Self, MigrationError> {
        Ok(Self {
            source,
            config,
            categories: CategoryResolver::new(source, config),
            zone: config.date_zone()?,
        })
    }

    fn template_for(&self, kind: &str) -> &str {
        match kind {
            "post" => &self.config.post_permalink,
            "page" => &self.config.page_permalink,
            _ => FALLBACK_PERMALINK,
        }
    }

    /// # Errors
    /// Returns [`MigrationError::ContentNotFound`] when `cid` has no content row,
    /// and propagates category lookup failures.
    pub fn resolve_url(&self, cid: i64) -> Result<String, MigrationError> {
        let content = self.source.content(cid)?.ok_or(MigrationError::ContentNotFound { cid })?;
        let date = self.zone.calendar_date(content.created)?;
        let slug = content.slug.as_deref().unwrap_or_default();

        let substitutions = BTreeMap::from([
            ("cid", content.cid.to_string()),
            ("slug", self.config.replace_slug(slug).to_string()),
            ("category", self.categories.immediate_category(content.cid)?),
            ("directory", self.categories.directory(content.cid)?),
            ("year", date.year().to_string()),
            ("month", format!("{:02}", date.month())),
            ("day", format!("{:02}", date.day())),
        ]);

        Ok(render_template(self.template_for(&content.kind), &substitutions))
    }
}
