use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use x_watchbot::config;
use x_watchbot::model::ScopeSettings;
use x_watchbot::service::WatchService;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Manage a scope's watchlist and run fetch/translate passes by hand"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Scope (tenant) to operate on
    #[arg(long, default_value_t = 1)]
    scope: i64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Watchlist members
    #[command(subcommand)]
    Members(MembersCmd),
    /// Fetch interval and retention
    #[command(subcommand)]
    Settings(SettingsCmd),
    /// Run one fetch cycle now
    Fetch,
    /// Run one translation batch now
    Translate {
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Print stored posts, newest first
    Posts {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        per_page: u32,
        /// Print the page as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print recent operation log entries
    Log {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[derive(Debug, Subcommand)]
enum MembersCmd {
    Add {
        handle: String,
        #[arg(long)]
        note: Option<String>,
    },
    Remove {
        handle: String,
    },
    List,
}

#[derive(Debug, Subcommand)]
enum SettingsCmd {
    Show,
    /// Unset values keep their current setting. The daemon picks changes up
    /// on its next settings refresh.
    Set {
        #[arg(long)]
        interval_minutes: Option<u32>,
        #[arg(long)]
        retention_days: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;
    let service = WatchService::from_config(&cfg).await?;
    let scope = args.scope;

    match args.command {
        Command::Members(MembersCmd::Add { handle, note }) => {
            let member = service.add_member(scope, &handle, note.as_deref()).await?;
            println!("added @{} (id {})", member.handle, member.id);
        }
        Command::Members(MembersCmd::Remove { handle }) => {
            if service.remove_member(scope, &handle).await? {
                println!("removed {handle}; its posts go at the next fetch cycle");
            } else {
                println!("{handle} is not on the watchlist");
            }
        }
        Command::Members(MembersCmd::List) => {
            for m in service.members(scope).await? {
                match m.note {
                    Some(note) => println!("@{}\t{}", m.handle, note),
                    None => println!("@{}", m.handle),
                }
            }
        }
        Command::Settings(SettingsCmd::Show) => {
            print_settings(&service.settings(scope).await?);
        }
        Command::Settings(SettingsCmd::Set {
            interval_minutes,
            retention_days,
        }) => {
            let current = service.settings(scope).await?;
            let updated = service
                .update_settings(ScopeSettings {
                    scope_id: scope,
                    fetch_interval_minutes: interval_minutes
                        .unwrap_or(current.fetch_interval_minutes),
                    retention_days: retention_days.unwrap_or(current.retention_days),
                })
                .await?;
            print_settings(&updated);
        }
        Command::Fetch => {
            let report = service.fetch_now(scope).await?;
            println!("{}", report.summary());
            for err in &report.errors {
                println!("  {err}");
            }
        }
        Command::Translate { limit } => {
            let report = service.translate_now(scope, limit).await?;
            println!("{}", report.summary());
            for err in &report.errors {
                println!("  {err}");
            }
        }
        Command::Posts {
            page,
            per_page,
            json,
        } => {
            let page = service.posts(scope, page, per_page).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&page)?);
            } else {
                println!(
                    "page {} ({} posts total, {} untranslated)",
                    page.page, page.total, page.untranslated
                );
                for p in &page.posts {
                    println!(
                        "{}  @{}  {}",
                        p.created_at.format("%Y-%m-%d %H:%M"),
                        p.author_username,
                        p.original_text.replace('\n', " ")
                    );
                    if let Some(t) = &p.translated_text {
                        println!("    => {}", t.replace('\n', " "));
                    }
                }
            }
        }
        Command::Log { limit } => {
            for e in service.operation_logs(scope, limit).await? {
                println!(
                    "{}  {:<9} {:<9} attempted={} ok={} skipped={} purged={} errors={}  run={}",
                    e.created_at.format("%Y-%m-%d %H:%M:%S"),
                    e.run_type.as_str(),
                    e.status.as_str(),
                    e.attempted,
                    e.succeeded,
                    e.skipped,
                    e.purged,
                    e.error_count,
                    e.run_id
                );
            }
        }
    }

    info!(scope, "done");
    Ok(())
}

fn print_settings(s: &ScopeSettings) {
    println!(
        "scope {}: fetch every {} min{}, keep {} days{}",
        s.scope_id,
        s.fetch_interval_minutes,
        if s.fetch_interval_minutes == 0 { " (disabled)" } else { "" },
        s.retention_days,
        if s.retention_days == 0 { " (no age purge)" } else { "" },
    );
}
