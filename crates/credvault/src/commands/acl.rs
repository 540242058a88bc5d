//! Permission commands

use anyhow::Result;
use clap::{Args, Subcommand};
use credvault_core::types::PermissionOperation;
use credvault_engine::PermissionGrant;
use tabled::{settings::Style, Table, Tabled};

use crate::cli::GlobalArgs;
use crate::context::AppContext;
use crate::output;

#[derive(Subcommand, Debug)]
pub enum AclCommands {
    /// Show the permission entries of a credential
    Show(ShowArgs),

    /// Grant operations to an actor
    Grant(GrantArgs),

    /// Remove an actor's entry
    Revoke(RevokeArgs),
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Credential name
    pub name: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct GrantArgs {
    /// Credential name
    pub name: String,

    /// Actor receiving the operations
    #[arg(long)]
    pub to: String,

    /// Operations to grant (read, write, delete, read_acl, write_acl)
    #[arg(long, value_delimiter = ',', required = true)]
    pub operations: Vec<String>,
}

#[derive(Args, Debug)]
pub struct RevokeArgs {
    /// Credential name
    pub name: String,

    /// Actor whose entry is removed
    #[arg(long)]
    pub from: String,
}

#[derive(Tabled)]
struct EntryRow {
    actor: String,
    operations: String,
}

pub async fn run(cmd: AclCommands, global: &GlobalArgs) -> Result<()> {
    match cmd {
        AclCommands::Show(args) => show(args, global).await,
        AclCommands::Grant(args) => grant(args, global).await,
        AclCommands::Revoke(args) => revoke(args, global).await,
    }
}

async fn show(args: ShowArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = AppContext::open(global).await?;
    let entries = ctx.service.permissions(&ctx.caller, &args.name).await?;

    if args.json {
        return output::json(&entries);
    }
    let rows = entries.iter().map(|entry| EntryRow {
        actor: entry.actor.clone(),
        operations: entry
            .operations
            .iter()
            .map(|op| op.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    });
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{}", table);
    Ok(())
}

async fn grant(args: GrantArgs, global: &GlobalArgs) -> Result<()> {
    let operations = args
        .operations
        .iter()
        .map(|op| op.trim().parse::<PermissionOperation>())
        .collect::<credvault_core::Result<Vec<_>>>()?;

    let ctx = AppContext::open(global).await?;
    let entries = ctx
        .service
        .add_permissions(
            &ctx.caller,
            &args.name,
            vec![PermissionGrant {
                actor: args.to,
                operations,
            }],
        )
        .await?;
    output::json(&entries)
}

async fn revoke(args: RevokeArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = AppContext::open(global).await?;
    ctx.service
        .delete_permission(&ctx.caller, &args.name, &args.from)
        .await?;
    output::success(&format!("Revoked {} on {}", args.from, args.name));
    Ok(())
}
