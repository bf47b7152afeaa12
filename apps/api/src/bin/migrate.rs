//! migrate: one-shot copy of the site tables from the old Supabase database to
//! Neon.
//!
//! Rows are read in `LIMIT/OFFSET` batches as JSON and written with
//! `jsonb_populate_recordset ... ON CONFLICT DO NOTHING`, so re-running the tool
//! skips rows that already arrived. There is no checkpointing: an interrupted
//! run starts over and relies on the conflict rule.
//!
//! The target schema must exist already (run the API once against it, which
//! applies the migrations).

use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use clap::Parser;
use regex::Regex;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Parents before children so foreign keys resolve.
const DEFAULT_TABLES: &[&str] = &[
    "admin_users",
    "admin_sessions",
    "conversations",
    "chat_messages",
    "form_submitters",
    "visitor_events",
];
const DEFAULT_BATCH_SIZE: i64 = 500;

#[derive(Debug, Parser)]
#[command(
    name = "migrate",
    version,
    about = "Copy site tables from the Supabase database to Neon"
)]
struct Cli {
    /// Source database URL
    #[arg(long, env = "SOURCE_DATABASE_URL")]
    source_url: String,

    /// Target database URL (not needed with --dry-run)
    #[arg(long, env = "TARGET_DATABASE_URL")]
    target_url: Option<String>,

    /// Comma-separated tables to copy, in order (default: every site table)
    #[arg(long, value_delimiter = ',')]
    tables: Vec<String>,

    /// Rows per batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: i64,

    /// Count source rows without writing anything
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct TableReport {
    table: String,
    source_rows: i64,
    copied: u64,
    skipped: u64,
}

fn identifier_regex() -> &'static Regex {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("identifier regex is valid"))
}

/// Table names are spliced into SQL, so only plain identifiers are accepted.
fn validate_table(name: &str) -> Result<()> {
    if identifier_regex().is_match(name) {
        Ok(())
    } else {
        bail!("'{name}' is not a plain table identifier")
    }
}

fn resolve_tables(requested: &[String]) -> Result<Vec<String>> {
    let tables: Vec<String> = if requested.is_empty() {
        DEFAULT_TABLES.iter().map(|t| t.to_string()).collect()
    } else {
        requested
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    };
    if tables.is_empty() {
        bail!("--tables names no tables");
    }
    for table in &tables {
        validate_table(table)?;
    }
    Ok(tables)
}

fn batch_offsets(total: i64, batch_size: i64) -> impl Iterator<Item = i64> {
    (0..total).step_by(batch_size.max(1) as usize)
}

async fn connect(url: &str, label: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(2)
        .connect(url)
        .await
        .with_context(|| format!("Failed to connect to {label} database"))
}

async fn count_rows(pool: &PgPool, table: &str) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(&format!(r#"SELECT COUNT(*) FROM "{table}""#))
        .fetch_one(pool)
        .await
        .with_context(|| format!("Failed to count rows in {table}"))
}

/// One batch as a JSON array of row objects, ordered by the first column.
async fn fetch_batch(pool: &PgPool, table: &str, limit: i64, offset: i64) -> Result<Value> {
    let sql = format!(
        r#"
        SELECT COALESCE(jsonb_agg(to_jsonb(t)), '[]'::jsonb)
        FROM (SELECT * FROM "{table}" ORDER BY 1 LIMIT $1 OFFSET $2) t
        "#
    );
    sqlx::query_scalar::<_, Value>(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_one(pool)
        .await
        .with_context(|| format!("Failed to read {table} at offset {offset}"))
}

async fn insert_batch(pool: &PgPool, table: &str, rows: Value) -> Result<u64> {
    let sql = format!(
        r#"
        INSERT INTO "{table}"
        SELECT * FROM jsonb_populate_recordset(NULL::"{table}", $1)
        ON CONFLICT DO NOTHING
        "#
    );
    let result = sqlx::query(&sql)
        .bind(rows)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to write batch into {table}"))?;
    Ok(result.rows_affected())
}

async fn copy_table(
    source: &PgPool,
    target: Option<&PgPool>,
    table: &str,
    batch_size: i64,
) -> Result<TableReport> {
    let mut report = TableReport {
        table: table.to_string(),
        source_rows: count_rows(source, table).await?,
        ..Default::default()
    };
    info!("{table}: {} source rows", report.source_rows);

    let Some(target) = target else {
        return Ok(report);
    };

    for offset in batch_offsets(report.source_rows, batch_size) {
        let rows = fetch_batch(source, table, batch_size, offset).await?;
        let fetched = rows.as_array().map(Vec::len).unwrap_or(0) as u64;
        if fetched == 0 {
            break;
        }
        let inserted = insert_batch(target, table, rows).await?;
        report.copied += inserted;
        report.skipped += fetched - inserted;
        info!(
            "{table}: batch at offset {offset}: {inserted} copied, {} skipped",
            fetched - inserted
        );
    }
    Ok(report)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("migrate=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    if cli.batch_size < 1 {
        bail!("--batch-size must be at least 1");
    }
    let tables = resolve_tables(&cli.tables)?;

    let source = connect(&cli.source_url, "source").await?;
    let target = if cli.dry_run {
        warn!("Dry run: nothing will be written");
        None
    } else {
        let url = cli
            .target_url
            .as_deref()
            .context("--target-url or TARGET_DATABASE_URL is required")?;
        Some(connect(url, "target").await?)
    };

    let mut reports = Vec::with_capacity(tables.len());
    for table in &tables {
        reports.push(copy_table(&source, target.as_ref(), table, cli.batch_size).await?);
    }

    for r in &reports {
        info!(
            table = %r.table,
            source_rows = r.source_rows,
            copied = r.copied,
            skipped = r.skipped,
            "Table done"
        );
    }
    info!(
        "Migration finished: {} copied, {} skipped across {} tables",
        reports.iter().map(|r| r.copied).sum::<u64>(),
        reports.iter().map(|r| r.skipped).sum::<u64>(),
        reports.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_validation() {
        assert!(validate_table("chat_messages").is_ok());
        assert!(validate_table("_private2").is_ok());
        assert!(validate_table("users; DROP TABLE x").is_err());
        assert!(validate_table("public.users").is_err());
        assert!(validate_table("9lives").is_err());
        assert!(validate_table("").is_err());
    }

    #[test]
    fn test_default_tables_in_dependency_order() {
        let tables = resolve_tables(&[]).unwrap();
        let pos = |t: &str| tables.iter().position(|x| x == t).unwrap();
        assert!(pos("admin_users") < pos("admin_sessions"));
        assert!(pos("conversations") < pos("chat_messages"));
    }

    #[test]
    fn test_requested_tables_are_trimmed_and_checked() {
        let tables = resolve_tables(&[" conversations".to_string(), "".to_string()]).unwrap();
        assert_eq!(tables, vec!["conversations".to_string()]);
        assert!(resolve_tables(&["bad-name".to_string()]).is_err());
        assert!(resolve_tables(&[" ".to_string()]).is_err());
    }

    #[test]
    fn test_batch_offsets() {
        assert_eq!(batch_offsets(1200, 500).collect::<Vec<_>>(), vec![0, 500, 1000]);
        assert_eq!(batch_offsets(0, 500).count(), 0);
        assert_eq!(batch_offsets(500, 500).collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "migrate",
            "--source-url",
            "postgres://src",
            "--target-url",
            "postgres://dst",
            "--tables",
            "conversations,chat_messages",
            "--batch-size",
            "100",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(cli.tables, vec!["conversations", "chat_messages"]);
        assert_eq!(cli.batch_size, 100);
        assert!(cli.dry_run);
    }
}
