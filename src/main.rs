// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Courier command line: inspect and manage persisted callbacks.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;

use courier::callback::{Callback, CallbackGroup, CallbackStatus};
use courier::config::{self, CourierConfig};
use courier::telemetry::{init_telemetry, TelemetryConfig};
use courier::{CallbackError, NotificationHub, VERSION};

/// Courier - completion notifications for long-running agents.
#[derive(Parser)]
#[command(name = "courier")]
#[command(author, version, about = "Completion notifications for long-running agents", long_about = None)]
struct Cli {
    /// Directory holding callbacks.json (overrides config)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Show debug output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show configured channels and pending callbacks
    Status,
    /// Show finished callbacks
    History {
        /// Show finished batch groups instead
        #[arg(long)]
        groups: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Cancel the pending callback for an agent
    Cancel {
        agent_id: String,
    },
    /// Show configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _guard = init_telemetry(&TelemetryConfig::for_verbosity(cli.verbose))?;

    let mut config = config::load_config(&std::env::current_dir()?)?;
    if let Some(dir) = cli.state_dir {
        config.state_dir = Some(dir);
    }

    match cli.command {
        Commands::Status => show_status(&config).await,
        Commands::History { groups, json } => show_history(&config, groups, json).await,
        Commands::Cancel { agent_id } => cancel(&config, &agent_id).await,
        Commands::Config { action } => match action {
            Some(ConfigAction::Show) | None => {
                println!("{}", serde_json::to_string_pretty(&config)?);
                Ok(())
            }
        },
        Commands::Version => {
            println!("courier {}", VERSION);
            Ok(())
        }
    }
}

fn hub(config: &CourierConfig) -> NotificationHub {
    NotificationHub::from_config(config, None)
}

fn status_label(status: CallbackStatus) -> colored::ColoredString {
    match status {
        CallbackStatus::Pending => status.as_str().yellow(),
        CallbackStatus::Dispatching => status.as_str().cyan(),
        CallbackStatus::Completed => status.as_str().green(),
        CallbackStatus::Failed => status.as_str().red(),
        CallbackStatus::Orphaned => status.as_str().dimmed(),
    }
}

fn yes_no(enabled: bool) -> colored::ColoredString {
    if enabled {
        "configured".green()
    } else {
        "not configured".dimmed()
    }
}

fn print_callback(cb: &Callback) {
    let contact = if cb.customer_email.is_empty() {
        cb.customer_phone.as_str()
    } else {
        cb.customer_email.as_str()
    };
    println!(
        "  {} {} [{}] via {} to {}",
        status_label(cb.status),
        cb.agent_id.bright_white(),
        cb.agent_name,
        cb.method,
        contact
    );
    if !cb.task_summary.is_empty() {
        println!("      {}", cb.task_summary.dimmed());
    }
    if !cb.error.is_empty() {
        println!("      {}", cb.error.red());
    }
}

fn print_group(group: &CallbackGroup) {
    println!(
        "  {} {} ({}/{} reported) via {}",
        status_label(group.status),
        group.id.bright_white(),
        group.results.len(),
        group.agent_ids.len(),
        group.method
    );
    if !group.error.is_empty() {
        println!("      {}", group.error.red());
    }
}

async fn show_status(config: &CourierConfig) -> anyhow::Result<()> {
    let hub = hub(config);
    let registry = hub.registry();

    println!("{}", "Channels".bright_blue().bold());
    println!("  call:  {}", yes_no(registry.can_call()));
    println!("  chat:  {}", yes_no(config.slack_token().is_some()));
    println!("  email: {}", yes_no(registry.can_email()));
    println!("  state: {}", config.state_dir().display());
    println!();

    let pending = registry.list_pending().await;
    println!("{} ({})", "Pending callbacks".bright_blue().bold(), pending.len());
    for cb in &pending {
        print_callback(cb);
    }

    let groups = registry.list_groups().await;
    if !groups.is_empty() {
        println!();
        println!("{} ({})", "Pending groups".bright_blue().bold(), groups.len());
        for group in &groups {
            print_group(group);
        }
    }
    Ok(())
}

async fn show_history(config: &CourierConfig, groups: bool, json: bool) -> anyhow::Result<()> {
    let hub = hub(config);
    let registry = hub.registry();

    if groups {
        let history = registry.list_group_history().await;
        if json {
            println!("{}", serde_json::to_string_pretty(&history)?);
        } else if history.is_empty() {
            println!("No finished groups.");
        } else {
            for group in history.iter().rev() {
                print_group(group);
            }
        }
    } else {
        let history = registry.list_history().await;
        if json {
            println!("{}", serde_json::to_string_pretty(&history)?);
        } else if history.is_empty() {
            println!("No finished callbacks.");
        } else {
            for cb in history.iter().rev() {
                print_callback(cb);
            }
        }
    }
    Ok(())
}

async fn cancel(config: &CourierConfig, agent_id: &str) -> anyhow::Result<()> {
    let hub = hub(config);
    if !hub.registry().cancel(agent_id).await {
        return Err(CallbackError::NotFound(format!("no pending callback for agent {}", agent_id)).into());
    }
    println!("{} callback for {}", "Cancelled".green(), agent_id.bright_white());
    Ok(())
}
