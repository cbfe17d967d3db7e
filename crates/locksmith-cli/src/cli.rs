use clap::{error::ErrorKind, Parser, Subcommand};

/// CLI surface definition for the `locksmith` binary.
#[derive(Parser, Debug)]
#[command(
    name = "locksmith",
    about = "Biometric-gated secret storage with an encrypted local cache",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Store a secret (requires presence).
    Add {
        key: String,
        secret: String,
        /// Lifetime of the secret, e.g. 12h, 30d, 2w, 1mo, 1y.
        #[arg(long, default_value = "30d")]
        expires: String,
    },
    /// Retrieve a secret (prompts only when the cache is stale).
    Get {
        key: String,
        /// Print the secret and its metadata as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List all stored keys and cached metadata.
    List,
    /// Remove a secret.
    Delete { key: String },
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

/// Text to print on stderr for a failed parse, or `None` when clap should
/// print help/version itself and exit successfully. Every `Some` exits 1.
pub fn parse_failure_message(err: &clap::Error) -> Option<String> {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => None,
        ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => Some(err.to_string()),
        _ => {
            let rendered = err.to_string();
            let first = rendered.lines().next().unwrap_or("invalid arguments");
            Some(format!("Error: {}", first.trim_start_matches("error: ")))
        }
    }
}
