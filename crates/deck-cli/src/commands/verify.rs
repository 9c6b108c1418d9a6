use anyhow::bail;
use deck_sequencer::ValidatePlan;

use super::Context;

pub fn verify(ctx: &Context) -> anyhow::Result<()> {
    let plan = ctx.load_plan()?;
    // Failures are matched to checks by name, which validation keeps unique.
    plan.validate()?;
    let cluster = ctx.open_cluster()?;

    let failures = deck_cluster::verify(&cluster, &plan.checks);
    for check in &plan.checks {
        match failures.iter().find(|f| f.check == check.name()) {
            Some(failure) => println!("✗ {}: {}", check.name(), failure.reason),
            None => println!("✓ {}", check.name()),
        }
    }
    if !failures.is_empty() {
        bail!("{} of {} checks failed", failures.len(), plan.checks.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_core::Plan;

    #[test]
    fn duplicate_check_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::new(dir.path().join("deck.toml"), dir.path().join("state.redb"));
        let mut plan = Plan::guide("someone");
        let first = plan.checks[0].clone();
        plan.checks.push(first);
        std::fs::write(&ctx.plan_path, plan.to_toml_string().unwrap()).unwrap();

        let err = verify(&ctx).unwrap_err();
        assert!(err.to_string().contains("declared more than once"), "{err}");
        // Rejected before the ledger is touched.
        assert!(!ctx.state_path.exists());
    }
}
