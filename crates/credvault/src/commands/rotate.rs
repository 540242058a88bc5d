//! Key rotation command

use anyhow::{anyhow, Result};
use credvault_engine::KeyRotationJob;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::{GlobalArgs, RotateArgs};
use crate::context::AppContext;
use crate::output;

pub async fn run(args: RotateArgs, global: &GlobalArgs) -> Result<()> {
    let ctx = AppContext::open(global).await?;
    let job = KeyRotationJob::new(ctx.store.clone(), ctx.registry.clone())
        .with_page_size(ctx.config.rotation.page_size);

    if args.watch {
        let secs = args
            .interval_secs
            .or(ctx.config.rotation.interval_secs)
            .ok_or_else(|| anyhow!("--watch needs --interval-secs or rotation.interval-secs in the config"))?;
        output::info(&format!("Rotating every {}s, press Ctrl-C to stop", secs));
        let handle = Arc::new(job).spawn(Duration::from_secs(secs.max(1)));
        tokio::signal::ctrl_c().await?;
        handle.abort();
        return Ok(());
    }

    let report = job.rotate().await?;
    if args.json {
        return output::json(&report);
    }

    output::success(&format!("Re-encrypted {} version(s)", report.rotated));
    if report.remaining > 0 {
        output::warning(&format!(
            "{} version(s) remain under retired keys",
            report.remaining
        ));
    }
    for key in &report.skipped_keys {
        output::warning(&format!("Skipped unusable key {}", key));
    }
    Ok(())
}
