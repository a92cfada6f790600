//! Clap derive structures for the `depotsync` CLI.
//!
//! Defines the command tree, global flags, and shared argument types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// depotsync -- talk to the depotsync backend from the command line
#[derive(Debug, Parser)]
#[command(
    name = "depotsync",
    version,
    about = "Send requests, run jobs, and replay import sessions against a depotsync backend",
    long_about = "A command-line client for the depotsync backend.\n\n\
        Correlated requests and pushes travel over one shared WebSocket;\n\
        long-running analytical jobs are started and polled over HTTP.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Backend profile to use
    #[arg(long, short = 'p', env = "DEPOTSYNC_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Socket endpoint (overrides profile)
    #[arg(long, env = "DEPOTSYNC_SOCKET_URL", global = true)]
    pub socket_url: Option<String>,

    /// HTTP API root for jobs (overrides profile)
    #[arg(long, env = "DEPOTSYNC_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Bearer token
    #[arg(long, env = "DEPOTSYNC_TOKEN", global = true, hide_env = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "DEPOTSYNC_OUTPUT",
        default_value = "pretty",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "DEPOTSYNC_INSECURE", global = true)]
    pub insecure: bool,

    /// HTTP timeout in seconds
    #[arg(long, env = "DEPOTSYNC_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON (default)
    Pretty,
    /// Compact single-line JSON, one document per line
    Json,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send a correlated request and print the reply
    #[command(alias = "req")]
    Request(PayloadArgs),

    /// Send a fire-and-forget message
    Send(PayloadArgs),

    /// Print inbound pushes until interrupted
    Listen(ListenArgs),

    /// Start and poll long-running jobs
    Job(JobArgs),

    /// Replay wizard signals into an import session
    Import(ImportArgs),

    /// Manage configuration profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Shared Arguments ─────────────────────────────────────────────────

/// A JSON object given inline or read from a file.
#[derive(Debug, Args)]
pub struct PayloadArgs {
    /// JSON object, e.g. '{"type":"get_portfolio"}'
    #[arg(conflicts_with = "file", required_unless_present = "file")]
    pub payload: Option<String>,

    /// Read the JSON object from a file ('-' for stdin)
    #[arg(long, short = 'f')]
    pub file: Option<PathBuf>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  LISTEN
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ListenArgs {
    /// Only messages with this `type`
    #[arg(long = "type", short = 't')]
    pub kind: Option<String>,

    /// Exit after this many messages
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  JOBS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct JobArgs {
    #[command(subcommand)]
    pub command: JobCommand,
}

#[derive(Debug, Subcommand)]
pub enum JobCommand {
    /// Start a job and poll it until it finishes
    Run {
        /// Job kind, e.g. simulation
        kind: String,

        /// Request body as a JSON object (default: {})
        body: Option<String>,

        /// Query parameter for status polls, as key=value (repeatable)
        #[arg(long = "query", short = 'Q', value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },

    /// Read a job's status once
    Status {
        kind: String,
        id: String,

        #[arg(long = "query", short = 'Q', value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },

    /// List known job kinds and their polling parameters
    Kinds,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .ok_or_else(|| format!("expected key=value, got '{s}'"))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  IMPORT
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Signals as a JSON array or one JSON value per line ('-' for stdin)
    #[arg(long, short = 'f', default_value = "-")]
    pub file: PathBuf,

    /// Attach to an existing session instead of creating one
    #[arg(long)]
    pub session_id: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create or replace a profile from --socket-url and --api-url
    Init {
        /// Profile name
        #[arg(long, default_value = "default")]
        name: String,

        /// Environment variable holding the token
        #[arg(long)]
        token_env: Option<String>,

        /// Replace an existing profile
        #[arg(long)]
        force: bool,
    },

    /// Display the configuration file (secrets redacted)
    Show,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store --token (or a line read from stdin) in the system keyring
    /// for the active profile
    SetToken,

    /// Print the configuration file path
    Path,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn key_value_parsing() {
        assert_eq!(
            parse_key_value("currency=EUR"),
            Ok(("currency".into(), "EUR".into()))
        );
        assert_eq!(parse_key_value("a=b=c"), Ok(("a".into(), "b=c".into())));
        assert!(parse_key_value("nope").is_err());
    }
}
