use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, Local, NaiveDate};
use serde::Deserialize;

use crate::MigrationError;

pub const DEFAULT_PREFIX: &str = "typecho_";
pub const DEFAULT_POST_PERMALINK: &str = "/archives/{cid}/";
pub const DEFAULT_PAGE_PERMALINK: &str = "/{slug}.html";
pub const FALLBACK_PERMALINK: &str = "/{cid}/";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Settings for one migration run, keyed the way `config.yml` spells them.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MigrationConfig {
    pub database: Option<DatabaseConfig>,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    pub salt: Option<String>,
    pub site: Option<String>,
    pub email: Option<String>,
    #[serde(default = "default_post_permalink")]
    pub post_permalink: String,
    #[serde(default = "default_page_permalink")]
    pub page_permalink: String,
    #[serde(default)]
    pub slug_replace: BTreeMap<String, String>,
    #[serde(default, rename = "ignoreCID")]
    pub ignore_cid: Vec<i64>,
    /// Fixed UTC offset such as `+08:00`; host local time when unset.
    pub timezone: Option<String>,
    pub max_reply_depth: Option<usize>,
    pub output: Option<PathBuf>,
    /// Connection block of MySQL-era config files. Parsed only so that
    /// [`MigrationConfig::validate`] can reject it with a pointer to `database.path`.
    #[serde(default)]
    pub mysql: Option<serde_json::Value>,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_post_permalink() -> String {
    DEFAULT_POST_PERMALINK.to_string()
}

fn default_page_permalink() -> String {
    DEFAULT_PAGE_PERMALINK.to_string()
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            database: None,
            prefix: default_prefix(),
            salt: None,
            site: None,
            email: None,
            post_permalink: default_post_permalink(),
            page_permalink: default_page_permalink(),
            slug_replace: BTreeMap::new(),
            ignore_cid: Vec::new(),
            timezone: None,
            max_reply_depth: None,
            output: None,
            mysql: None,
        }
    }
}

impl MigrationConfig {
    /// Check values that serde cannot check on its own.
    ///
    /// # Errors
    /// Returns [`MigrationError::Config`] for a `mysql` connection block, a table
    /// prefix that is not a plain SQL identifier fragment, or a timezone that does
    /// not parse.
    pub fn validate(&self) -> Result<(), MigrationError> {
        if self.mysql.is_some() {
            return Err(MigrationError::Config(
                "mysql sources are not supported: export the Typecho database to SQLite and \
                 set database.path instead of mysql"
                    .to_string(),
            ));
        }
        if !self.prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(MigrationError::Config(format!(
                "prefix MUST contain only ASCII letters, digits and '_': {:?}",
                self.prefix
            )));
        }
        self.date_zone()?;
        Ok(())
    }

    /// Apply the `slugReplace` table.
    #[must_use]
    pub fn replace_slug<'a>(&'a self, slug: &'a str) -> &'a str {
        self.slug_replace.get(slug).map_or(slug, String::as_str)
    }

    /// # Errors
    /// Returns [`MigrationError::Config`] when `timezone` does not parse.
    pub fn date_zone(&self) -> Result<DateZone, MigrationError> {
        match self.timezone.as_deref() {
            None => Ok(DateZone::Local),
            Some(raw) => parse_offset(raw).map(DateZone::Fixed).ok_or_else(|| {
                MigrationError::Config(format!("timezone MUST look like +08:00: {raw:?}"))
            }),
        }
    }

    #[must_use]
    pub fn salt(&self) -> Option<&str> {
        self.salt.as_deref()
    }
}

/// The calendar used to split a creation timestamp into `{year}/{month}/{day}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateZone {
    Local,
    Fixed(FixedOffset),
}

impl DateZone {
    /// # Errors
    /// Returns [`MigrationError::Config`] when `seconds` is outside the supported range.
    pub fn calendar_date(self, seconds: i64) -> Result<NaiveDate, MigrationError> {
        let utc = DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
            MigrationError::Config(format!("timestamp out of range: {seconds}"))
        })?;
        Ok(match self {
            Self::Local => utc.with_timezone(&Local).date_naive(),
            Self::Fixed(offset) => utc.with_timezone(&offset).date_naive(),
        })
    }
}

fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    if !raw.is_ascii() {
        return None;
    }
    if raw.eq_ignore_ascii_case("utc") || raw == "Z" {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((hours, minutes)) => (hours, minutes),
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "0"),
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
