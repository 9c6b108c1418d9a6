use deck_state::{RunRecord, StageStatus};

use super::Context;

pub fn print_run(run: &RunRecord) {
    let outcome = if run.succeeded() { "ok" } else { "failed" };
    println!(
        "run #{} {} ({} changed, {}s)",
        run.id,
        outcome,
        run.changed(),
        run.finished_at.saturating_sub(run.started_at)
    );
    for stage in &run.stages {
        let marker = match stage.status {
            StageStatus::Applied => "✓",
            StageStatus::Failed => "✗",
            StageStatus::NotAttempted => "-",
        };
        println!("  {marker} {:<12} {}", stage.stage, stage.status.label());
        for outcome in &stage.outcomes {
            println!(
                "      {}/{} {}",
                outcome.kind,
                outcome.name,
                outcome.outcome.label()
            );
        }
        for exec in &stage.execs {
            println!("      exec {exec}");
        }
    }
    if let Some(error) = &run.error {
        println!("  error: {error}");
    }
}

pub fn status(ctx: &Context, runs: usize) -> anyhow::Result<()> {
    let store = ctx.open_store()?;

    let records = store.list_all_resources()?;
    if records.is_empty() {
        println!("No entities applied.");
    } else {
        println!("{:<12} {:<20} {:>4}  DIGEST", "KIND", "NAME", "GEN");
        for record in &records {
            let digest = record.digest.trim_start_matches("sha256:");
            let bound = record
                .bound_to
                .as_deref()
                .map(|v| format!("  -> {v}"))
                .unwrap_or_default();
            println!(
                "{:<12} {:<20} {:>4}  {}{bound}",
                record.kind().as_str(),
                record.table_key(),
                record.generation,
                &digest[..digest.len().min(12)]
            );
        }
    }

    let history = store.list_runs(runs)?;
    if history.is_empty() {
        println!("\nNo runs recorded.");
    }
    for run in &history {
        println!();
        print_run(run);
    }
    Ok(())
}
