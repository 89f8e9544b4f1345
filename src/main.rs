mod api_types;
mod classify;
mod collect;
mod config;
mod enrich;
mod mailer;
mod models;
mod orchestrator;
mod out_models;
mod prompts;
mod render;
mod score;
mod select;
mod store;

use anyhow::Result;
use clap::Parser;
use orchestrator::{run_daily, RunOptions};
use std::path::PathBuf;
use tracing::{debug, info};

/// Daily paper digest - journal feed collector and digest mailer
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to config file (overrides DIGEST_CONFIG environment variable)
    #[arg(short, long)]
    config: Option<String>,

    /// Path to the SQLite paper store
    #[arg(long, default_value = "papers.db")]
    db: String,

    /// Output directory for rendered digests (default: "out")
    #[arg(short, long, default_value = "out")]
    output_dir: String,

    /// Render and persist the digest without sending email
    #[arg(long)]
    skip_email: bool,
}

fn resolve_config_path(args: &Args) -> PathBuf {
    if let Some(ref p) = args.config {
        debug!("Using config file from --config argument: {}", p);
        return PathBuf::from(p);
    }
    if let Ok(p) = std::env::var("DIGEST_CONFIG") {
        debug!("Using config file from DIGEST_CONFIG: {}", p);
        return PathBuf::from(p);
    }
    PathBuf::from("config.yaml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(true)
        .init();

    info!("Starting paper-digest");

    let args = Args::parse();
    let cfg_path = resolve_config_path(&args);

    // Friendlier error if missing
    if !cfg_path.exists() {
        return Err(anyhow::anyhow!(
            "config not found at {}\n\
             Use --config to specify a config file, or set DIGEST_CONFIG.\n\
             Example config.yaml:\n\
             journals:\n  - name: \"Nano Energy\"\n    url: \"https://rss.sciencedirect.com/publication/science/22112855\"\n\
             keywords: [\"biosensor\", \"triboelectric\"]\n\
             email:\n  recipient: \"you@example.org\"\n",
            cfg_path.display()
        ));
    }

    let cfg = config::load_config(&cfg_path)?;
    info!(
        "Config loaded - journals={}, keywords={}, fields={}, threshold={}",
        cfg.journals.len(),
        cfg.keywords.len(),
        cfg.fields.len(),
        cfg.analysis.relevance_threshold
    );

    let opts = RunOptions {
        db_path: PathBuf::from(&args.db),
        output_dir: PathBuf::from(&args.output_dir),
        skip_email: args.skip_email,
    };

    run_daily(&cfg, &opts).await
}
