use std::fs;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing_subscriber::EnvFilter;
use typecho_comments_core::{MarkdownRenderer, MigrationConfig, Migrator};
use typecho_comments_store_sqlite::SqliteSource;

const CLI_CONTRACT_VERSION: &str = "cli.v1";
const DEFAULT_OUTPUT_FILE: &str = "comment.json";

#[derive(Debug, Parser)]
#[command(name = "typecho2twikoo")]
#[command(about = "Convert Typecho comments into Twikoo comment JSON lines")]
struct Cli {
    /// YAML configuration file.
    #[arg(default_value = "config.yml")]
    config: PathBuf,

    /// Typecho SQLite database; overrides `database.path` from the configuration.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Output file; overrides `output` from the configuration.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Write the JSON lines to stdout instead of a file.
    #[arg(long, default_value_t = false)]
    stdout: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
struct RunSummary {
    records: usize,
    output: PathBuf,
    sha256: String,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let db_path = resolve_db_path(&cli, &config)?;

    // sole connection of the run; closed on drop, including the error path
    let source = SqliteSource::open(&db_path, &config.prefix)?;
    let output = convert(&config, &source)?;
    drop(source);

    if cli.stdout {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(output.as_bytes()).context("failed to write records to stdout")?;
        stdout.flush().context("failed to flush stdout")?;
        return Ok(());
    }

    let out_path = cli
        .out
        .clone()
        .or_else(|| config.output.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_FILE));
    let summary = write_output(&out_path, &output)?;
    emit_json(serde_json::to_value(&summary).context("failed to serialize run summary")?)
}

fn load_config(path: &Path) -> Result<MigrationConfig> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration file {}", path.display()))?;
    let config: MigrationConfig = serde_yaml::from_str(&body)
        .with_context(|| format!("failed to parse configuration file {}", path.display()))?;
    config.validate().with_context(|| format!("invalid configuration in {}", path.display()))?;
    Ok(config)
}

/// `--db` wins; a relative `database.path` is taken relative to the config file.
fn resolve_db_path(cli: &Cli, config: &MigrationConfig) -> Result<PathBuf> {
    if let Some(db) = &cli.db {
        return Ok(db.clone());
    }
    let configured = config
        .database
        .as_ref()
        .map(|database| database.path.clone())
        .ok_or_else(|| anyhow!("no database given: pass --db or set database.path"))?;
    if configured.is_absolute() {
        return Ok(configured);
    }
    let base = cli.config.parent().unwrap_or_else(|| Path::new(""));
    Ok(base.join(configured))
}

fn convert(config: &MigrationConfig, source: &SqliteSource) -> Result<String> {
    let migrator = Migrator::new(config, source, MarkdownRenderer)?;
    let graph = migrator.load_graph().context("failed to load comments")?;
    let records = migrator.convert(&graph)?;
    let output = typecho_comments_core::to_json_lines(&records)?;
    Ok(output)
}

fn write_output(path: &Path, output: &str) -> Result<RunSummary> {
    fs::write(path, output)
        .with_context(|| format!("failed to write output file {}", path.display()))?;
    tracing::info!(path = %path.display(), "wrote output file");

    let mut hasher = Sha256::new();
    hasher.update(output.as_bytes());
    Ok(RunSummary {
        records: output.lines().count(),
        output: path.to_path_buf(),
        sha256: format!("{:x}", hasher.finalize()),
    })
}
