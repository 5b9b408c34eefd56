//! `gcp_sweeper` command line.
//!
//! Deletes the service accounts, custom roles, instances, firewall rules and
//! networks of a project whose names start with a prefix.
//!
//! ## Usage
//!
//! 1. Export `GCP_ACCESS_TOKEN` (or run on a GCE/Cloud Run identity)
//! 2. Preview: `gcp_sweeper --project my-project --dry-run`
//! 3. Delete:  `gcp_sweeper --project my-project`

#![allow(clippy::print_stdout)] // The binary owns the console

use std::{
    io::{self, BufRead, Write},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use owo_colors::{OwoColorize, Stream::Stdout};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use gcp_sweeper::{
    CleanupConfig, CleanupOrchestrator, CleanupReport, GcpClient, GcpClientConfig, OperationPolicy,
    cleanup_config::DEFAULT_PREFIX, exit_codes,
};

#[derive(Parser, Debug)]
#[command(name = "gcp_sweeper", version, about = "Clean up GCP IAM Vulnerable resources")]
struct Cli {
    /// GCP project ID
    #[arg(short = 'p', long = "project", env = "GCP_PROJECT")]
    project: String,

    /// Resource prefix to match
    #[arg(long = "prefix", default_value = DEFAULT_PREFIX)]
    prefix: String,

    /// Show what would be deleted without actually deleting
    #[arg(long = "dry-run", action = ArgAction::SetTrue)]
    dry_run: bool,

    /// Skip confirmation prompt
    #[arg(short = 'f', long = "force", action = ArgAction::SetTrue)]
    force: bool,

    /// Poll compute delete operations until they finish
    #[arg(long = "wait", action = ArgAction::SetTrue)]
    wait: bool,

    /// Exit with code 2 when any deletion failed
    #[arg(long = "fail-on-error", action = ArgAction::SetTrue)]
    fail_on_error: bool,

    /// Summary format
    #[arg(short = 'o', long = "output", value_enum, default_value_t = Output::Human)]
    output: Output,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => exit_code(code),
        Err(e) => {
            error!(error = %format!("{e:#}"), "sweeper failed");
            exit_code(exit_codes::INVALID)
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let policy = if cli.wait {
        OperationPolicy::wait_from_env()?
    } else {
        OperationPolicy::FireAndForget
    };

    let cfg = CleanupConfig::new(cli.project)?
        .with_prefix(cli.prefix)?
        .with_dry_run(cli.dry_run)
        .with_force(cli.force)
        .with_operation_policy(policy);

    print_banner(&cfg);

    if cfg.needs_confirmation() && !confirm(cfg.project_id())? {
        println!("Aborted.");
        return Ok(exit_codes::OK);
    }

    let client_cfg = GcpClientConfig::from_env()?;
    let call_timeout = client_cfg.timeout();
    let client = GcpClient::new(client_cfg).context("failed to build GCP client")?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let report = CleanupOrchestrator::new(client, cfg)
        .with_call_timeout(call_timeout)
        .run(&cancel)
        .await;

    match cli.output {
        Output::Human => print_summary(&report),
        Output::Json => println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to encode report")?
        ),
    }

    Ok(exit_codes::for_report(&report, cli.fail_on_error))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(false).compact())
        .init();
}

/// Cancel `token` on Ctrl-C or SIGTERM so the run stops between resources.
async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        let Ok(mut sigterm) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        else {
            error!("failed to install SIGTERM handler");
            return;
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!(signal = "SIGINT", "interrupt received, finishing current resource"),
            _ = sigterm.recv() => info!(signal = "SIGTERM", "interrupt received, finishing current resource"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Ctrl-C handler failed");
            return;
        }
        info!(signal = "SIGINT", "interrupt received, finishing current resource");
    }

    token.cancel();
}

fn confirm(project: &str) -> Result<bool> {
    print!("This will DELETE resources in project {project}. Continue? (y/N) ");
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;

    Ok(is_affirmative(&answer))
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim(), "y" | "Y")
}

fn print_banner(cfg: &CleanupConfig) {
    println!("{}", "GCP IAM Vulnerable Cleanup".if_supports_color(Stdout, |t| t.yellow()));
    println!("================================");
    println!("Project: {}", cfg.project_id());
    println!("Prefix:  {}", cfg.prefix());
    println!("Dry Run: {}", cfg.dry_run());
    println!();
}

fn print_summary(report: &CleanupReport) {
    println!();
    for pass in &report.passes {
        let r = &pass.result;
        let line = format!(
            "{:<18} matched={:<3} deleted={:<3} already_gone={:<3} failed={:<3}{}",
            pass.kind.title(),
            r.attempted,
            r.deleted,
            r.already_gone,
            r.failed,
            if r.aborted { " (incomplete)" } else { "" }
        );
        if r.is_degraded() {
            println!("{}", line.if_supports_color(Stdout, |t| t.red()));
        } else {
            println!("{line}");
        }
    }
    println!();

    if report.dry_run {
        println!(
            "{}",
            "Dry run complete. No resources were modified.".if_supports_color(Stdout, |t| t.yellow())
        );
    } else if report.interrupted {
        println!("{}", "Cleanup interrupted.".if_supports_color(Stdout, |t| t.red()));
    } else {
        println!("{}", "Cleanup complete!".if_supports_color(Stdout, |t| t.green()));
        println!();
        println!("Note: Cloud Functions, Cloud Run, and Storage cleanup is not handled");
        println!("by this tool. Use the gcloud CLI for those.");
    }
}

fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}
