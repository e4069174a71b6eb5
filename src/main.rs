//! Pastiche CLI - serve the style transfer API or stylize local files.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pastiche::{BlendingRatio, Config, Pipeline};

/// Arbitrary neural style transfer over HTTP.
#[derive(Parser, Debug)]
#[command(name = "pastiche")]
#[command(version, about, long_about = None)]
struct Args {
    /// TOML configuration file.
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve {
        /// Bind host (overrides config).
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides config).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Stylize a local content image with a local style image.
    Stylize {
        /// Content image path.
        #[arg(value_name = "CONTENT")]
        content: PathBuf,

        /// Style image path.
        #[arg(value_name = "STYLE")]
        style: PathBuf,

        /// Output image path.
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        /// How much of the content image's own style to keep (0.0-1.0).
        #[arg(short, long, default_value = "0.0", value_name = "FLOAT")]
        ratio: f32,

        /// Output JPEG quality (1-100).
        #[arg(short, long, value_name = "INT")]
        quality: Option<u8>,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("pastiche={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(err) = run(args) {
        tracing::error!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run(args: Args) -> Result<()> {
    let mut config =
        Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            // Models load (and possibly download) before the runtime starts.
            let pipeline =
                Pipeline::from_config(&config).context("Failed to initialize pipeline")?;

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime
                .block_on(pastiche::server::run(&config, pipeline))
                .context("Server failed")?;
        }
        Command::Stylize {
            content,
            style,
            output,
            ratio,
            quality,
        } => {
            for input in [&content, &style] {
                if !input.exists() {
                    anyhow::bail!("Input file does not exist: {}", input.display());
                }
            }

            let quality = quality.unwrap_or(config.images.jpeg_quality);
            if !(1..=100).contains(&quality) {
                anyhow::bail!("Quality must be between 1 and 100, got {quality}");
            }

            let mut pipeline =
                Pipeline::from_config(&config).context("Failed to initialize pipeline")?;
            pipeline
                .process(&content, &style, &output, BlendingRatio::new(ratio), quality)
                .context("Failed to stylize image")?;

            println!(
                "Successfully stylized {} with {} -> {}",
                content.display(),
                style.display(),
                output.display()
            );
        }
    }

    Ok(())
}
