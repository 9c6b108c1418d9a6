use deck_cluster::render;
use deck_core::Resource;
use deck_sequencer::ValidatePlan;

use super::Context;
use crate::ManifestFormat;

pub fn render(ctx: &Context, format: ManifestFormat) -> anyhow::Result<()> {
    let plan = ctx.load_plan()?;
    let resources: Vec<&Resource> = plan
        .validate()?
        .into_iter()
        .flat_map(|i| plan.stages[i].resources.iter())
        .collect();
    let manifests = render::manifests(&resources)?;
    let output = match format {
        ManifestFormat::Json => render::to_json(&manifests)?,
        ManifestFormat::Yaml => render::to_yaml(&manifests)?,
    };
    print!("{output}");
    if !output.ends_with('\n') {
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_core::Plan;

    fn write_plan(plan: &Plan) -> (tempfile::TempDir, Context) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::new(dir.path().join("deck.toml"), dir.path().join("state.redb"));
        std::fs::write(&ctx.plan_path, plan.to_toml_string().unwrap()).unwrap();
        (dir, ctx)
    }

    #[test]
    fn renders_without_opening_the_ledger() {
        let (_dir, ctx) = write_plan(&Plan::guide("someone"));
        render(&ctx, ManifestFormat::Json).unwrap();
        assert!(!ctx.state_path.exists());
    }

    #[test]
    fn malformed_secret_fails_to_render() {
        let mut plan = Plan::guide("someone");
        if let Some(Resource::Secret(secret)) = plan
            .stage_mut("secret")
            .and_then(|s| s.resources.first_mut())
        {
            secret.binary_data.insert("pw".to_string(), "zz".to_string());
        }
        let (_dir, ctx) = write_plan(&plan);
        let err = render(&ctx, ManifestFormat::Yaml).unwrap_err();
        assert!(err.to_string().contains("`pw` is not hex"), "{err}");
    }
}
