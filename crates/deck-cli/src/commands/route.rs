use anyhow::bail;
use deck_cluster::RouteTable;

use super::Context;

pub fn route(ctx: &Context, host: &str, path: &str) -> anyhow::Result<()> {
    let cluster = ctx.open_cluster()?;
    let table = RouteTable::from_plane(&cluster)?;
    match table.resolve(host, path) {
        Some(target) => {
            println!("{host}{path} -> {} (route {})", target.endpoint(), target.route);
            Ok(())
        }
        None => bail!("no route for {host}{path}"),
    }
}
