use chrono::Duration;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use phasegate::validation::{clap_id_validator, clap_ttl_validator};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "phasegate")]
#[command(about = "Phase-gate workflow engine and leverage queue", long_about = None)]
#[command(version)]
#[command(subcommand_help_heading = "Commands")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize .phasegate/ in the current directory
    Init,

    /// Start a workflow instance from a template
    Start {
        /// Template ID (see `phasegate templates`)
        #[arg(value_parser = clap_id_validator)]
        template: String,

        /// Template mode selecting the phase subset (defaults to the template's default)
        #[arg(short, long)]
        mode: Option<String>,
    },

    /// Apply a directive to an instance; without one, read directives from stdin
    ///
    /// Directives: continue, status, approve-gate, request-changes <feedback>,
    /// pause [note], skip-unit <unit> <reason>, skip-gate <reason> [--override],
    /// jump-phase <phase> [--override], add-unit <unit> [deliverable...],
    /// force-pass <reason>, force-reject <reason>, help
    #[command(name = "do")]
    Do {
        /// Instance ID
        #[arg(value_parser = clap_id_validator)]
        instance: String,

        /// Directive words, e.g. `request-changes add error states`
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        directive: Vec<String>,
    },

    /// Record a work unit result reported from outside the engine
    Unit {
        /// Instance ID
        #[arg(value_parser = clap_id_validator)]
        instance: String,

        /// Unit ID in the active phase
        unit: String,

        /// New status (running, complete, skipped, failed)
        status: String,

        /// Reason (required for skipped)
        #[arg(short, long)]
        reason: Option<String>,

        /// Produced deliverable (can be repeated)
        #[arg(short = 'd', long = "deliverable", value_name = "NAME")]
        deliverables: Vec<String>,
    },

    /// Show one instance, or list all instances
    Status {
        /// Instance ID
        #[arg(value_parser = clap_id_validator)]
        instance: Option<String>,

        /// Print JSON instead of the human view
        #[arg(long)]
        json: bool,
    },

    /// List workflow templates, or show one
    Templates {
        /// Template ID to show in detail
        #[arg(value_parser = clap_id_validator)]
        template: Option<String>,
    },

    /// Build and manage the execution queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },

    /// Manage the set of resolved targets used by the blocker check
    Resolve {
        #[command(subcommand)]
        command: ResolveCommands,
    },

    /// Record gate signals for an instance
    Signal {
        #[command(subcommand)]
        command: SignalCommands,
    },

    /// Inspect archived workflows
    Archive {
        #[command(subcommand)]
        command: ArchiveCommands,
    },

    /// Generate shell completion script
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// Rescore candidates and write a fresh queue
    Build {
        /// Candidates YAML file
        candidates: PathBuf,

        /// Maximum queue length (defaults to queue.limit)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Queue lifetime such as 90m, 24h, 7d (defaults to queue.ttl)
        #[arg(long, value_parser = clap_ttl_validator)]
        ttl: Option<Duration>,
    },

    /// Show the current queue
    Show {
        #[arg(long)]
        json: bool,
    },

    /// Remove and print the top actionable entry
    Claim {
        /// Start a workflow from the candidate's category template
        #[arg(long)]
        start: bool,

        /// Mode for the started workflow
        #[arg(short, long, requires = "start")]
        mode: Option<String>,
    },

    /// Insert a candidate from a candidates file at a rank
    Insert {
        /// Candidates YAML file holding the candidate
        candidates: PathBuf,

        /// Candidate ID
        #[arg(value_parser = clap_id_validator)]
        id: String,

        /// 1-based position (defaults to the end)
        #[arg(short, long)]
        position: Option<usize>,
    },

    /// Remove the entry at a rank
    Remove { rank: usize },

    /// Move the entry at a rank to a new position
    Reorder { rank: usize, position: usize },
}

#[derive(Subcommand)]
pub enum ResolveCommands {
    /// Mark targets resolved
    Add {
        #[arg(required = true, value_parser = clap_id_validator)]
        ids: Vec<String>,
    },

    /// Mark targets unresolved again
    Remove {
        #[arg(required = true, value_parser = clap_id_validator)]
        ids: Vec<String>,
    },

    /// List resolved targets
    List,
}

#[derive(Subcommand)]
pub enum SignalCommands {
    /// Record a signal value
    Set {
        #[arg(value_parser = clap_id_validator)]
        instance: String,

        name: String,

        /// true or false
        #[arg(action = clap::ArgAction::Set)]
        value: bool,
    },

    /// Show recorded and configured signals
    Show {
        #[arg(value_parser = clap_id_validator)]
        instance: String,
    },

    /// Drop all recorded signals of an instance
    Clear {
        #[arg(value_parser = clap_id_validator)]
        instance: String,
    },
}

#[derive(Subcommand)]
pub enum ArchiveCommands {
    /// List archived snapshots
    List,

    /// Recompute and check every snapshot digest
    Verify,
}
