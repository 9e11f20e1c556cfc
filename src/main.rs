//! httpapi CLI entry point.
//!
//! Loads a synth file, builds every API it declares into one stack and
//! writes the synthesized template as JSON.
//!
//! # Usage
//!
//! ```text
//! httpapi --config synth.toml --output template.json
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use httpapi_construct::ConfigFile;

#[derive(Parser)]
#[command(name = "httpapi", about = "Synthesize HTTP API resource graphs")]
struct Cli {
    /// Synth file to load.
    #[arg(long, env = "HTTPAPI_CONFIG")]
    config: PathBuf,

    /// Write the template here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write compact JSON.
    #[arg(long)]
    compact: bool,
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries only the template
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,httpapi=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let file = ConfigFile::from_file(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    info!(config = %cli.config.display(), apis = file.apis.len(), "Synth file loaded");

    let (stack, apis) = file.build().context("Failed to build stack")?;
    let template = stack.synthesize();

    let json = if cli.compact {
        serde_json::to_string(&template)
    } else {
        serde_json::to_string_pretty(&template)
    }
    .context("Failed to serialize template")?;

    match &cli.output {
        Some(path) => {
            std::fs::write(path, json + "\n")
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(output = %path.display(), "Template written");
        }
        None => println!("{json}"),
    }

    for api in &apis {
        info!(
            api = api.id(),
            routes = api.routes().count(),
            url = ?api.custom_domain_url(),
            "Synthesized"
        );
    }

    Ok(())
}
