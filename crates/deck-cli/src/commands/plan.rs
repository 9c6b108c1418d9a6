use deck_sequencer::ValidatePlan;

use super::Context;

pub fn plan(ctx: &Context, json: bool) -> anyhow::Result<()> {
    let plan = ctx.load_plan()?;
    let stages: Vec<_> = plan.validate()?.into_iter().map(|i| &plan.stages[i]).collect();

    if json {
        let value: Vec<_> = stages
            .iter()
            .map(|stage| {
                serde_json::json!({
                    "stage": stage.name,
                    "depends_on": stage.depends_on,
                    "resources": stage.resources.iter().map(|r| r.id().to_string()).collect::<Vec<_>>(),
                    "exec": stage.exec.iter().map(|a| a.command.join(" ")).collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Plan {} v{}", plan.project.name, plan.version()?);
    for (i, stage) in stages.iter().enumerate() {
        if stage.depends_on.is_empty() {
            println!("{:>2}. {}", i + 1, stage.name);
        } else {
            println!(
                "{:>2}. {} (after {})",
                i + 1,
                stage.name,
                stage.depends_on.join(", ")
            );
        }
        for resource in &stage.resources {
            println!("      {}", resource.id());
        }
        for action in &stage.exec {
            println!("      exec {}: {}", action.workload, action.command.join(" "));
        }
    }
    if !plan.checks.is_empty() {
        let names: Vec<_> = plan.checks.iter().map(|c| c.name()).collect();
        println!("checks: {}", names.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_core::Plan;

    #[test]
    fn shows_order_without_a_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::new(dir.path().join("deck.toml"), dir.path().join("state.redb"));
        std::fs::write(&ctx.plan_path, Plan::guide("someone").to_toml_string().unwrap()).unwrap();

        plan(&ctx, false).unwrap();
        plan(&ctx, true).unwrap();
        assert!(!ctx.state_path.exists());
    }
}
