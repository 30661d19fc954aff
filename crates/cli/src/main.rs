//! tmwatch CLI - one-shot Time Machine backup checks

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::sync::Arc;
use tabled::{Table, Tabled};

use tmwatch_core::application::{next_fire_time, PollCoordinator, StatusReport};
use tmwatch_core::domain::{HostStatus, MonitorSettings};
use tmwatch_core::port::id_provider::UuidProvider;
use tmwatch_core::port::time_provider::SystemTimeProvider;
use tmwatch_core::port::TimeProvider;
use tmwatch_infra_system::{resolve_config_path, SettingsLoader, SshCommandRunner};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Parser)]
#[command(name = "tmwatch")]
#[command(about = "Check Time Machine backups on remote hosts", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (TOML)
    #[arg(long, global = true, env = "TMWATCH_CONFIG")]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll every host now and print each host's status
    Check {
        /// Poll these hosts instead of the configured ones (repeatable)
        #[arg(long = "host", value_name = "HOST")]
        hosts: Vec<String>,

        /// Override the staleness threshold
        #[arg(long)]
        stale_after_days: Option<u32>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print when the next scheduled poll would run
    Next {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List configured hosts
    Hosts,
}

#[derive(Tabled)]
struct HostRow {
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Latest Backup")]
    latest: String,
    #[tabled(rename = "Volume")]
    volume: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

#[derive(Serialize)]
struct NextPoll {
    now: String,
    next_poll: String,
}

fn load_settings(config: Option<&str>) -> Result<MonitorSettings> {
    SettingsLoader::new(resolve_config_path(config))
        .load()
        .context("Failed to load settings")
}

fn status_label(status: HostStatus) -> String {
    let label = status.to_string();
    match status {
        HostStatus::Ok => label.green().to_string(),
        HostStatus::Stale => label.yellow().to_string(),
        HostStatus::Error => label.red().to_string(),
        HostStatus::NoData => label.dimmed().to_string(),
    }
}

fn print_report(report: &StatusReport) {
    let rows: Vec<HostRow> = report
        .hosts
        .iter()
        .map(|h| HostRow {
            host: h.host.clone(),
            status: h.status.to_string(),
            latest: h
                .latest
                .as_ref()
                .map(|b| b.timestamp.format(TIME_FORMAT).to_string())
                .unwrap_or_else(|| "-".to_string()),
            volume: h
                .latest
                .as_ref()
                .map(|b| b.volume_name.clone())
                .unwrap_or_else(|| "-".to_string()),
            detail: h
                .error_message
                .as_deref()
                .map(|m| m.trim().to_string())
                .unwrap_or_default(),
        })
        .collect();

    println!("{}", Table::new(rows));
    println!();

    let summary = [
        HostStatus::Ok,
        HostStatus::Stale,
        HostStatus::Error,
        HostStatus::NoData,
    ]
    .into_iter()
    .filter(|s| report.count(*s) > 0)
    .map(|s| format!("{} {}", report.count(s), status_label(s)))
    .collect::<Vec<_>>()
    .join(", ");

    if report.needs_attention() {
        println!("{} {}", "✗".red().bold(), summary);
    } else {
        println!("{} {}", "✓".green().bold(), summary);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);

    match cli.command {
        Commands::Check {
            hosts,
            stale_after_days,
            json,
        } => {
            let mut settings = load_settings(cli.config.as_deref())?;
            if !hosts.is_empty() {
                settings.hosts = hosts;
            }
            if let Some(days) = stale_after_days {
                settings.stale_after_days = days;
            }
            settings.validate().context("Invalid settings")?;

            if settings.hosts.is_empty() {
                println!("{}", "No hosts configured".yellow());
                return Ok(());
            }

            let runner = Arc::new(SshCommandRunner::new(
                settings.ssh_program.clone(),
                settings.ssh_options.clone(),
                Arc::clone(&time_provider),
            ));
            let coordinator = PollCoordinator::new(
                runner,
                settings.remote_command(),
                Arc::clone(&time_provider),
                Arc::new(UuidProvider),
            );

            if !json {
                println!(
                    "{}",
                    format!("Polling {} host(s)...", settings.hosts.len())
                        .cyan()
                        .bold()
                );
            }

            let snapshot = coordinator.run_cycle_and_wait(&settings.hosts).await?;
            let report = StatusReport::build(
                &snapshot,
                &settings.hosts,
                settings.stale_after_days,
                time_provider.now_local(),
            );

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }

            if report.needs_attention() {
                std::process::exit(1);
            }
        }

        Commands::Next { json } => {
            let now = time_provider.now_local();
            let next = next_fire_time(now).context("Failed to compute next poll time")?;
            let out = NextPoll {
                now: now.format(TIME_FORMAT).to_string(),
                next_poll: next.format(TIME_FORMAT).to_string(),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("  {} {}", "Now:".bold(), out.now);
                println!("  {} {}", "Next poll:".bold(), out.next_poll.green());
            }
        }

        Commands::Hosts => {
            let settings = load_settings(cli.config.as_deref())?;

            if settings.hosts.is_empty() {
                println!("{}", "No hosts configured".yellow());
            } else {
                println!("{}", "Configured hosts".cyan().bold());
                for host in &settings.hosts {
                    println!("  {} {}", "•".bold(), host);
                }
            }
            println!();
            println!(
                "  {} {} day(s)",
                "Stale after:".bold(),
                settings.stale_after_days
            );
        }
    }

    Ok(())
}
