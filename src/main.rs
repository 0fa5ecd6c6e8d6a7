use anyhow::{anyhow, bail, Result};
use clap::Parser;

mod cli;
mod config;
mod error;
mod hierarchy;
mod http;
mod jira;
mod reconcile;
mod scenario;
mod sync;
mod testrail;

use cli::{Command, DeleteSuiteArgs, RootArgs, SyncArgs};
use config::AppConfig;
use jira::JiraClient;
use sync::SyncOptions;
use testrail::TestRailClient;

fn main() -> Result<()> {
    // A local .env may set credentials and RUST_LOG; load it before both
    // config and logging look at the environment.
    dotenvy::dotenv().ok();
    let args = RootArgs::parse();
    init_tracing(verbose_requested(&args.command));

    match args.command {
        Command::Sync(args) => cmd_sync(args),
        Command::DeleteSuite(args) => cmd_delete_suite(args),
    }
}

fn verbose_requested(command: &Command) -> bool {
    match command {
        Command::Sync(args) => args.verbose,
        Command::DeleteSuite(args) => args.verbose,
    }
}

fn init_tracing(verbose: bool) {
    let default_directives = if verbose { "info,scsync=debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directives));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn cmd_sync(args: SyncArgs) -> Result<()> {
    let config = AppConfig::from_env()?;
    let project_id = args
        .project_id
        .or(config.testrail.project_id)
        .ok_or_else(|| anyhow!("no project selected; pass --project-id or set TESTRAIL_PROJECT_ID"))?;

    let tickets = JiraClient::new(&config.jira);
    let store = TestRailClient::new(&config.testrail);
    let options = SyncOptions {
        ticket_key: args.ticket,
        project_id,
        suite_id: args.suite_id,
        suite_name: args.suite_name,
        section_id: args.section_id,
        section_path: args.section_path,
        create_missing: args.create_missing,
        dry_run: args.dry_run,
    };

    let summary = sync::run_sync(&tickets, &store, &options)?;
    tracing::info!(
        found = summary.found,
        created = summary.created,
        updated = summary.updated,
        deleted = summary.deleted,
        skipped = summary.skipped,
        dry_run = options.dry_run,
        "run summary"
    );
    if summary.has_errors() {
        bail!(
            "{} of {} planned actions failed; see the log above",
            summary.skipped,
            summary.created + summary.updated + summary.deleted + summary.skipped
        );
    }
    Ok(())
}

fn cmd_delete_suite(args: DeleteSuiteArgs) -> Result<()> {
    // Only TestRail is touched; Jira credentials are not required here.
    let config = config::TestRailConfig::from_env()?;
    let store = TestRailClient::new(&config);
    sync::run_delete_suite(&store, args.suite_id, args.dry_run)
}
