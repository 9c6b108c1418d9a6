use anyhow::bail;
use deck_cluster::{ControlPlane, resolve_env};
use deck_core::{EnvSource, Resource, ResourceKind};

use super::Context;

pub fn env(ctx: &Context, workload: &str, reveal: bool) -> anyhow::Result<()> {
    let cluster = ctx.open_cluster()?;
    let Some(Resource::Workload(spec)) = cluster.get(ResourceKind::Workload, workload)? else {
        bail!("workload `{workload}` is not applied");
    };

    let resolved = resolve_env(&cluster, &spec)?;
    for (var, value) in &resolved {
        let secret = matches!(spec.env.get(var), Some(EnvSource::Secret { .. }));
        if secret && !reveal {
            println!("{var}=********");
        } else {
            println!("{var}={value}");
        }
    }
    Ok(())
}
