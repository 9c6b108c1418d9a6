//! deck: apply a staged deployment plan.
//!
//! ```text
//! deck init --registry-user me
//! deck plan
//! deck apply
//! deck status
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

use commands::Context;

#[derive(Parser)]
#[command(
    name = "deck",
    about = "deck: dependency-ordered deployment sequencer",
    version,
    propagate_version = true
)]
struct Cli {
    /// Plan file.
    #[arg(long, global = true, default_value = "deck.toml")]
    plan: PathBuf,

    /// Ledger database.
    #[arg(long, global = true, default_value = ".deck/state.redb")]
    state: PathBuf,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ManifestFormat {
    /// A single `v1/List`.
    Json,
    /// One YAML document per manifest.
    Yaml,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum BuilderKind {
    /// Fingerprint build contexts without building.
    Local,
    /// Build and push with the docker CLI.
    Docker,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the reference Django + MySQL plan.
    Init {
        /// Registry account the application image is published under.
        #[arg(long, default_value = "mydockerhubuser")]
        registry_user: String,
        /// Overwrite an existing plan file.
        #[arg(long)]
        force: bool,
    },
    /// Validate the plan and show the stage order.
    Plan {
        /// Print the order as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Apply every stage in dependency order, then verify.
    Apply {
        #[arg(long, value_enum, default_value_t = BuilderKind::Local)]
        builder: BuilderKind,
        /// Skip post-deployment checks.
        #[arg(long)]
        no_verify: bool,
    },
    /// Run the plan's post-deployment checks.
    Verify,
    /// Show recent runs and applied entities.
    Status {
        /// Number of runs to show.
        #[arg(short = 'n', long, default_value = "5")]
        runs: usize,
    },
    /// Render the plan as Kubernetes manifests.
    Render {
        #[arg(short, long, value_enum, default_value_t = ManifestFormat::Yaml)]
        format: ManifestFormat,
    },
    /// Delete the plan's entities in reverse stage order.
    Delete,
    /// Show a workload's resolved environment.
    Env {
        workload: String,
        /// Print secret values instead of masking them.
        #[arg(long)]
        reveal: bool,
    },
    /// Resolve a host and path to an internal address.
    Route {
        host: String,
        #[arg(default_value = "/")]
        path: String,
    },
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("deck=info"))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    let ctx = Context::new(cli.plan, cli.state);
    match cli.command {
        Commands::Init {
            registry_user,
            force,
        } => commands::init::init(&ctx, &registry_user, force),
        Commands::Plan { json } => commands::plan::plan(&ctx, json),
        Commands::Apply { builder, no_verify } => {
            commands::apply::apply(&ctx, builder, no_verify).await
        }
        Commands::Verify => commands::verify::verify(&ctx),
        Commands::Status { runs } => commands::status::status(&ctx, runs),
        Commands::Render { format } => commands::render::render(&ctx, format),
        Commands::Delete => commands::delete::delete(&ctx),
        Commands::Env { workload, reveal } => commands::env::env(&ctx, &workload, reveal),
        Commands::Route { host, path } => commands::route::route(&ctx, &host, &path),
    }
}
