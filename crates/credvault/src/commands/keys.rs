//! Encryption key commands

use anyhow::Result;
use clap::{Args, Subcommand};
use credvault_store::CredentialStore;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use crate::cli::GlobalArgs;
use crate::context::AppContext;
use crate::output;

#[derive(Subcommand, Debug)]
pub enum KeysCommands {
    /// Verify every configured key and show how many versions each seals
    Check(CheckArgs),
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled, Serialize)]
struct KeyRow {
    id: String,
    provider: String,
    active: bool,
    usable: bool,
    versions: usize,
}

pub async fn run(cmd: KeysCommands, global: &GlobalArgs) -> Result<()> {
    match cmd {
        KeysCommands::Check(args) => check(args, global).await,
    }
}

async fn check(args: CheckArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = AppContext::open(global).await?;
    let active = ctx.registry.active_key_id();

    let mut rows = Vec::new();
    for key in ctx.registry.all_known_keys() {
        rows.push(KeyRow {
            id: key.id.to_string(),
            provider: key.provider.describe(),
            active: key.id == active,
            usable: key.is_usable(),
            versions: ctx.store.count_encrypted_with(key.id).await?,
        });
    }

    if args.json {
        return output::json(&rows);
    }

    let unusable = rows.iter().filter(|row| !row.usable).count();
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{}", table);

    if unusable > 0 {
        output::warning(&format!("{} key(s) could not be verified", unusable));
    } else {
        output::success("All keys verified");
    }
    Ok(())
}
