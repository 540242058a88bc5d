//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

pub use crate::commands::acl::AclCommands;
pub use crate::commands::keys::KeysCommands;

/// credvault - encrypted, versioned and audited credentials
#[derive(Parser, Debug)]
#[command(name = "credvault")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to credvault.yaml config file
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Actor recorded in the audit trail and checked against permissions
    #[arg(long, env = "CREDVAULT_ACTOR", default_value = "cli", global = true)]
    pub actor: String,

    /// Scopes attached to the actor (comma separated)
    #[arg(long, env = "CREDVAULT_SCOPES", value_delimiter = ',', global = true)]
    pub scopes: Vec<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn global(&self) -> GlobalArgs {
        GlobalArgs {
            config: self.config.clone(),
            actor: self.actor.clone(),
            scopes: self.scopes.clone(),
        }
    }
}

/// Options shared by every command
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub config: Option<Utf8PathBuf>,
    pub actor: String,
    pub scopes: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Encryption key management
    #[command(subcommand)]
    Keys(KeysCommands),

    /// Set or generate a credential
    Put(PutArgs),

    /// Show a credential
    Get(GetArgs),

    /// Delete every version of a credential
    Delete(NameArgs),

    /// Regenerate a credential with its stored parameters
    Regenerate(NameArgs),

    /// Search credential names
    Find(FindArgs),

    /// Permission management
    #[command(subcommand)]
    Acl(AclCommands),

    /// Re-encrypt stored versions under the active key
    Rotate(RotateArgs),

    /// Show the audit trail
    Audit(AuditArgs),
}

#[derive(Args, Debug)]
pub struct PutArgs {
    /// Credential name
    pub name: String,

    /// Credential type (value, password, user, certificate, root, ssh, rsa)
    #[arg(short = 't', long = "type")]
    pub kind: String,

    /// Plain string value (value and password types)
    #[arg(long, conflicts_with_all = ["value_json", "parameters"])]
    pub value: Option<String>,

    /// Structured value as JSON, e.g. '{"certificate": "...", "private_key": "..."}'
    #[arg(long, conflicts_with = "parameters")]
    pub value_json: Option<String>,

    /// Generation parameters as JSON, e.g. '{"length": 40}'
    #[arg(short, long)]
    pub parameters: Option<String>,

    /// Append a new version when the credential exists
    #[arg(long)]
    pub overwrite: bool,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Credential name, or version id with --id
    pub name: String,

    /// Treat the argument as a version id
    #[arg(long, conflicts_with = "history")]
    pub id: bool,

    /// Show every version, newest first
    #[arg(long)]
    pub history: bool,
}

#[derive(Args, Debug)]
pub struct NameArgs {
    /// Credential name
    pub name: String,
}

#[derive(Args, Debug)]
pub struct FindArgs {
    /// Names containing this fragment (case-insensitive)
    #[arg(short, long, conflicts_with = "path")]
    pub name_like: Option<String>,

    /// Names under this path
    #[arg(short, long)]
    pub path: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct RotateArgs {
    /// Keep running, rotating every interval (seconds); defaults to the
    /// configured rotation interval
    #[arg(long)]
    pub watch: bool,

    /// Interval override for --watch
    #[arg(long, requires = "watch")]
    pub interval_secs: Option<u64>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Only the most recent N records
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
