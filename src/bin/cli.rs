use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use mission_authz::audit::{AuditQuery, AuditStore, SqliteAuditStore};
use mission_authz::authz::{authorize, ActionKind, ActionSpec, IdentityClaims, IdentityContext};
use mission_authz::config::load_env;
use mission_authz::db::{self, SqliteEntityLookup, MIGRATOR};
use mission_authz::guard::EntityLookup;
use mission_authz::models::{EntityDescriptor, EntityType};
use mission_authz::telemetry::init_tracing;

#[derive(Parser, Debug)]
#[command(author, version, about = "mission-authz operator tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Print audit entries, newest first
    AuditLog(AuditLogArgs),
    /// Check the audit hash chain
    AuditVerify,
    /// Adjudicate one action and print the decision
    Decide(DecideArgs),
}

#[derive(Args, Debug)]
struct AuditLogArgs {
    #[arg(long)]
    entity_type: Option<EntityType>,
    #[arg(long)]
    entity_id: Option<Uuid>,
    /// Substring of the action name
    #[arg(long)]
    action: Option<String>,
    #[arg(long)]
    actor: Option<Uuid>,
    /// RFC3339, inclusive
    #[arg(long)]
    from: Option<DateTime<Utc>>,
    /// RFC3339, inclusive
    #[arg(long)]
    to: Option<DateTime<Utc>>,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 20)]
    page_size: u32,
    /// Print the page as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct DecideArgs {
    /// JSON file holding identity claims
    #[arg(long, conflicts_with = "user")]
    identity: Option<PathBuf>,
    /// Load the identity of a stored user instead
    #[arg(long)]
    user: Option<Uuid>,
    #[arg(long)]
    kind: ActionKind,
    #[arg(long)]
    permission: Option<String>,
    /// JSON file holding an entity descriptor
    #[arg(long, conflicts_with_all = ["target_type", "target_id"])]
    target: Option<PathBuf>,
    /// Look the target up in the database
    #[arg(long, requires = "target_id")]
    target_type: Option<EntityType>,
    #[arg(long, requires = "target_type")]
    target_id: Option<Uuid>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            MIGRATOR.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            print_status(&pool).await?;
        }
        Commands::AuditLog(args) => {
            let pool = get_pool().await?;
            print_audit_log(&pool, args).await?;
        }
        Commands::AuditVerify => {
            let pool = get_pool().await?;
            let report = SqliteAuditStore::new(pool).verify_chain().await?;
            match report.first_broken {
                None => println!("Audit chain intact ({} entries)", report.checked),
                Some(seq) => anyhow::bail!(
                    "audit chain broken at seq {} after {} intact entries",
                    seq,
                    report.checked
                ),
            }
        }
        Commands::Decide(args) => decide(args).await?,
    }

    Ok(())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    db::connect(&database_url).await
}

async fn print_status(pool: &SqlitePool) -> anyhow::Result<()> {
    // If the migrations table doesn't exist, nothing is applied yet
    let table: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
            .fetch_optional(pool)
            .await?;
    let applied_versions: HashSet<i64> = if table.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} Name", "Status", "Version");
    for migration in MIGRATOR.iter() {
        let status = if applied_versions.contains(&migration.version) {
            "applied"
        } else {
            "pending"
        };
        let desc = migration.description.trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

async fn print_audit_log(pool: &SqlitePool, args: AuditLogArgs) -> anyhow::Result<()> {
    let query = AuditQuery {
        entity_type: args.entity_type,
        entity_id: args.entity_id,
        action: args.action,
        actor_id: args.actor,
        from: args.from,
        to: args.to,
        page: args.page,
        page_size: args.page_size,
    };
    let page = SqliteAuditStore::new(pool.clone()).query(&query).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    for entry in &page.entries {
        println!(
            "{}  {:<20} {:<12} {:<36}  actor={}  {}",
            entry.created_at.to_rfc3339(),
            entry.action,
            entry.entity_type,
            entry.entity_id.map(|id| id.to_string()).unwrap_or_else(|| "-".into()),
            entry.actor_id,
            entry.details.as_deref().unwrap_or("")
        );
    }
    println!(
        "page {}/{} ({} entries)",
        page.page,
        page.total_pages.max(1),
        page.total_count
    );

    Ok(())
}

async fn decide(args: DecideArgs) -> anyhow::Result<()> {
    let needs_db = args.user.is_some() || args.target_type.is_some();
    let pool = if needs_db { Some(get_pool().await?) } else { None };

    let identity = match (&args.identity, args.user, &pool) {
        (Some(path), _, _) => {
            let claims: IdentityClaims = read_json(path)?;
            IdentityContext::from_claims(claims)?
        }
        (None, Some(user_id), Some(pool)) => db::load_identity(pool, user_id)
            .await?
            .with_context(|| format!("user {user_id} not found"))?,
        _ => anyhow::bail!("either --identity or --user is required"),
    };

    let target: Option<EntityDescriptor> = match (&args.target, args.target_type, args.target_id, &pool) {
        (Some(path), _, _, _) => Some(read_json(path)?),
        (None, Some(entity_type), Some(entity_id), Some(pool)) => Some(
            SqliteEntityLookup::new(pool.clone())
                .describe(entity_type, entity_id)
                .await?
                .with_context(|| format!("{entity_type} {entity_id} not found"))?,
        ),
        _ => None,
    };

    let action = ActionSpec::new(args.kind, args.permission.as_deref());
    let decision = authorize(&identity, &action, target.as_ref());

    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> anyhow::Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}
