//! CLI argument parsing for the sync workflow.
//!
//! The CLI is intentionally thin: flags are validated and handed to the
//! orchestrator, so the same core logic stays callable without a terminal.
use clap::{Parser, Subcommand};

/// Root CLI entrypoint.
///
/// Keeping a single `RootArgs` type makes command routing obvious and avoids
/// hidden defaults in subcommand constructors.
#[derive(Parser, Debug)]
#[command(
    name = "scsync",
    version,
    about = "Sync Gherkin-style scenarios from Jira tickets into TestRail",
    after_help = "Commands:\n  sync --ticket <KEY>          Sync one ticket's scenarios into a suite/section\n  delete-suite --suite-id <ID> Delete a whole TestRail suite\n\nExamples:\n  scsync sync --ticket PROJ-123 --suite-name \"Regression\" --section-path \"Auth/Login\"\n  scsync sync --ticket PROJ-123 --suite-id 42 --create-missing\n  scsync sync --ticket PROJ-123 --section-id 7 --dry-run\n  scsync delete-suite --suite-id 42 --dry-run",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    Sync(SyncArgs),
    DeleteSuite(DeleteSuiteArgs),
}

/// Sync command inputs for one ticket.
#[derive(Parser, Debug)]
#[command(about = "Sync one ticket's scenarios into TestRail cases")]
pub struct SyncArgs {
    /// Jira issue key, e.g. PROJ-123
    #[arg(long, value_name = "KEY")]
    pub ticket: String,

    /// TestRail project id (defaults to TESTRAIL_PROJECT_ID)
    #[arg(long, value_name = "ID")]
    pub project_id: Option<u64>,

    /// Target suite by id
    #[arg(long, value_name = "ID", conflicts_with_all = ["suite_name", "section_id"])]
    pub suite_id: Option<u64>,

    /// Target suite by name (case-insensitive)
    #[arg(long, value_name = "NAME", conflicts_with = "section_id")]
    pub suite_name: Option<String>,

    /// Target section by id, bypassing suite lookup
    #[arg(long, value_name = "ID")]
    pub section_id: Option<u64>,

    /// Slash-delimited section path inside the suite, e.g. "Auth/Login"
    #[arg(long, value_name = "PATH", conflicts_with = "section_id")]
    pub section_path: Option<String>,

    /// Create missing suites and sections along the way
    #[arg(long)]
    pub create_missing: bool,

    /// Plan and report without writing to TestRail
    #[arg(long)]
    pub dry_run: bool,

    /// Emit debug-level logs
    #[arg(long)]
    pub verbose: bool,
}

/// Delete-suite command inputs.
#[derive(Parser, Debug)]
#[command(about = "Delete a TestRail suite by id")]
pub struct DeleteSuiteArgs {
    /// Suite id to delete
    #[arg(long, value_name = "ID")]
    pub suite_id: u64,

    /// Report without deleting
    #[arg(long)]
    pub dry_run: bool,

    /// Emit debug-level logs
    #[arg(long)]
    pub verbose: bool,
}
