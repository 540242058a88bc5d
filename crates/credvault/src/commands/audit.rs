//! Audit trail command

use anyhow::Result;
use credvault_core::types::AuditRecord;
use credvault_store::CredentialStore;
use tabled::{settings::Style, Table, Tabled};

use crate::cli::{AuditArgs, GlobalArgs};
use crate::context::AppContext;
use crate::output;

#[derive(Tabled)]
struct AuditRow {
    time: String,
    operation: String,
    target: String,
    actor: String,
    status: u16,
}

impl From<&AuditRecord> for AuditRow {
    fn from(record: &AuditRecord) -> Self {
        Self {
            time: record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            operation: record.operation.to_string(),
            target: record.target.clone(),
            actor: record.actor.clone(),
            status: record.status_code,
        }
    }
}

pub async fn run(args: AuditArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = AppContext::open(global).await?;
    let records = ctx.store.audit_records().await?;
    let skip = args
        .limit
        .map_or(0, |limit| records.len().saturating_sub(limit));
    let records = &records[skip..];

    if args.json {
        return output::json(records);
    }
    if records.is_empty() {
        output::info("No audit records");
        return Ok(());
    }

    let mut table = Table::new(records.iter().map(AuditRow::from));
    table.with(Style::sharp());
    println!("{}", table);
    Ok(())
}
