use deck_cluster::ContextBuilder;
use deck_sequencer::Sequencer;

use super::Context;

pub fn delete(ctx: &Context) -> anyhow::Result<()> {
    let plan = ctx.load_plan()?;
    let cluster = ctx.open_cluster()?;
    let builder = ContextBuilder::new(ctx.plan_dir());

    let deleted = Sequencer::new(&cluster, &builder).teardown(&plan)?;
    if deleted.is_empty() {
        println!("Nothing to delete.");
    }
    for reference in &deleted {
        println!("✓ deleted {reference}");
    }
    Ok(())
}
