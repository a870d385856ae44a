//! CLI argument definitions.
//!
//! Kept self-contained (clap + clap_complete only) so `build.rs` can
//! include this file for man-page generation without compiling the
//! rest of the crate.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Top-level CLI: `groundwork <command> [args]`.
#[derive(Debug, Parser)]
#[command(
    name = "groundwork",
    version,
    about = "Declarative, idempotent provisioning for small Debian server fleets",
    long_about = "Groundwork converges Debian servers onto a declared state: base \
                  hardening with a two-user access model, packet filter and ban \
                  service, PostgreSQL databases and roles, and application \
                  directory layouts behind an nginx reverse proxy.\n\n\
                  Every workflow probes before it mutates, so re-running a \
                  converged host changes nothing, and --check previews a run \
                  without touching the hosts."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global options ──────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Environment to operate on (defaults to the only one, if only one exists)
    #[arg(short, long, global = true, env = "GROUNDWORK_ENV", value_name = "NAME")]
    pub env: Option<String>,

    /// Start project discovery here instead of the current directory
    #[arg(long, global = true, value_name = "DIR")]
    pub project_dir: Option<PathBuf>,

    /// Read the secret-bundle passphrase from this file
    #[arg(
        long,
        global = true,
        env = "GROUNDWORK_PASSPHRASE_FILE",
        value_name = "FILE"
    )]
    pub passphrase_file: Option<PathBuf>,

    /// Output format for reports and listings
    #[arg(short, long, global = true, env = "GROUNDWORK_OUTPUT", value_enum)]
    pub output: Option<OutputFormat>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress progress display; print only the final report
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl GlobalOpts {
    /// Effective output format after config-file defaults have been
    /// folded in by `main`.
    pub fn output_format(&self) -> OutputFormat {
        self.output.unwrap_or(OutputFormat::Table)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables with color.
    Table,
    /// Pretty-printed JSON.
    Json,
    /// YAML.
    Yaml,
}

// ── Commands ────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Converge every stage the hosts' roles call for
    Converge(RunArgs),

    /// Base hardening: packages, timezone, identities, SSH lockdown
    Base(RunArgs),

    /// Packet filter and intrusion ban service
    Firewall(RunArgs),

    /// PostgreSQL engine, databases, roles, and grants
    Database(RunArgs),

    /// Application layout and reverse-proxy sites
    App(RunArgs),

    /// Check connectivity and privilege escalation on each host
    Ping(PingArgs),

    /// Show the resolved inventory, or one host's merged variables
    Hosts(HostsArgs),

    /// Manage an environment's encrypted secret bundle
    Secrets(SecretsArgs),

    /// Validate every environment without connecting anywhere
    Lint,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Options shared by the convergence workflows.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Probe and report deltas without changing anything
    #[arg(long)]
    pub check: bool,

    /// Restrict the run to one host name or one role
    #[arg(short, long, value_name = "HOST|ROLE")]
    pub limit: Option<String>,

    /// Override a variable for this run (dotted key, TOML value)
    #[arg(long, value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// First contact: connect as root and skip privilege escalation
    #[arg(long)]
    pub bootstrap: bool,

    /// Keep scheduling remaining hosts after a host fails
    #[arg(long)]
    pub continue_on_error: bool,

    /// Hosts converged concurrently (defaults to the project setting)
    #[arg(long, value_name = "N")]
    pub forks: Option<usize>,
}

#[derive(Debug, Args)]
pub struct PingArgs {
    /// Restrict the check to one host name or one role
    #[arg(short, long, value_name = "HOST|ROLE")]
    pub limit: Option<String>,

    /// Connect as root instead of the automation identity
    #[arg(long)]
    pub bootstrap: bool,
}

#[derive(Debug, Args)]
pub struct HostsArgs {
    /// Restrict the listing to one host name or one role
    #[arg(short, long, value_name = "HOST|ROLE")]
    pub limit: Option<String>,

    /// Show each host's merged variables instead of the inventory row
    #[arg(long)]
    pub vars: bool,

    /// Override a variable when rendering with --vars
    #[arg(long, value_name = "KEY=VALUE")]
    pub set: Vec<String>,
}

#[derive(Debug, Args)]
pub struct SecretsArgs {
    #[command(subcommand)]
    pub command: SecretsCommand,
}

#[derive(Debug, Subcommand)]
pub enum SecretsCommand {
    /// Create a new bundle from a commented template
    Init,

    /// Encrypt plaintext TOML (stdin or --input) as the bundle
    Encrypt {
        /// Read plaintext from this file instead of stdin
        #[arg(long, value_name = "FILE")]
        input: Option<PathBuf>,

        /// Replace an existing bundle without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Decrypt the bundle and print it to stdout
    View,

    /// Re-encrypt the bundle under a new passphrase
    Rekey,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
