use anyhow::bail;
use deck_core::Plan;

use super::Context;

pub fn init(ctx: &Context, registry_user: &str, force: bool) -> anyhow::Result<()> {
    if ctx.plan_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            ctx.plan_path.display()
        );
    }
    let plan = Plan::guide(registry_user);
    std::fs::write(&ctx.plan_path, plan.to_toml_string()?)?;
    println!("✓ Generated {}", ctx.plan_path.display());
    println!(
        "  {} stages, {} entities, {} checks",
        plan.stages.len(),
        plan.resources().count(),
        plan.checks.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_a_loadable_plan_and_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::new(dir.path().join("deck.toml"), dir.path().join("state.redb"));

        init(&ctx, "someone", false).unwrap();
        assert_eq!(ctx.load_plan().unwrap(), Plan::guide("someone"));

        assert!(init(&ctx, "other", false).is_err());
        init(&ctx, "other", true).unwrap();
        assert_eq!(ctx.load_plan().unwrap(), Plan::guide("other"));
    }
}
