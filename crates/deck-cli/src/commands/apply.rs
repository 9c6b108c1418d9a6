use std::path::PathBuf;

use anyhow::{Context as _, bail};
use deck_cluster::{ContextBuilder, DockerBuilder, ImageBuilder};
use deck_sequencer::Sequencer;
use tokio::sync::watch;
use tracing::info;

use super::Context;
use super::status::print_run;
use crate::BuilderKind;

fn image_builder(kind: BuilderKind, root: PathBuf) -> Box<dyn ImageBuilder> {
    match kind {
        BuilderKind::Local => Box::new(ContextBuilder::new(root)),
        BuilderKind::Docker => Box::new(DockerBuilder::new(root)),
    }
}

pub async fn apply(ctx: &Context, builder: BuilderKind, no_verify: bool) -> anyhow::Result<()> {
    let plan = ctx.load_plan()?;
    let cluster = ctx.open_cluster()?;
    let root = ctx.plan_dir().to_path_buf();

    // Ctrl-C stops the run before the next stage.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping after the current stage");
            let _ = shutdown_tx.send(true);
        }
    });

    let run_cluster = cluster.clone();
    let run_plan = plan.clone();
    let report = tokio::task::spawn_blocking(move || {
        let builder = image_builder(builder, root);
        Sequencer::new(&run_cluster, builder.as_ref())
            .with_ledger(run_cluster.store().clone())
            .with_shutdown(shutdown_rx)
            .run(&run_plan)
    })
    .await
    .context("sequencer task panicked")??;

    print_run(&report.record);
    if let Some(error) = report.error {
        return Err(error.into());
    }

    if no_verify || plan.checks.is_empty() {
        return Ok(());
    }
    let failures = deck_cluster::verify(&cluster, &plan.checks);
    if !failures.is_empty() {
        for failure in &failures {
            eprintln!("✗ {failure}");
        }
        bail!("{} of {} checks failed", failures.len(), plan.checks.len());
    }
    println!("✓ {} checks passed", plan.checks.len());
    Ok(())
}
