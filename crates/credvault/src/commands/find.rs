//! Credential search command

use anyhow::Result;
use credvault_store::NameSummary;
use tabled::{settings::Style, Table, Tabled};

use crate::cli::{FindArgs, GlobalArgs};
use crate::context::AppContext;
use crate::output;

#[derive(Tabled)]
struct NameRow {
    name: String,
    #[tabled(rename = "version created at")]
    version_created_at: String,
}

impl From<&NameSummary> for NameRow {
    fn from(summary: &NameSummary) -> Self {
        Self {
            name: summary.name.clone(),
            version_created_at: summary.version_created_at.to_rfc3339(),
        }
    }
}

pub async fn run(args: FindArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = AppContext::open(global).await?;

    let found = match (&args.name_like, &args.path) {
        (Some(fragment), _) => ctx.service.find_names_like(&ctx.caller, fragment).await?,
        (None, Some(path)) => {
            ctx.service
                .find_names_under_prefix(&ctx.caller, path)
                .await?
        }
        (None, None) => {
            let paths = ctx.service.find_paths(&ctx.caller).await?;
            if args.json {
                return output::json(&paths);
            }
            paths.iter().for_each(|path| println!("{}", path));
            return Ok(());
        }
    };

    if args.json {
        return output::json(&found);
    }
    if found.is_empty() {
        output::info("No matching credentials");
        return Ok(());
    }

    let mut table = Table::new(found.iter().map(NameRow::from));
    table.with(Style::sharp());
    println!("{}", table);
    Ok(())
}
