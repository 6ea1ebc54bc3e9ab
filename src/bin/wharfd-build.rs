use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use wharfd_models::{Config, EntryPoint};
use wharfd_packaging::{BuildRecipe, ImageBuilder, StartCommand};

#[derive(Parser)]
#[command(name = "wharfd-build")]
#[command(about = "Build a runnable container image for a WSGI application")]
struct Args {
    /// Build context directory (the application source tree)
    #[arg(long, default_value = ".")]
    context: PathBuf,

    /// Tag for the built image
    #[arg(long)]
    tag: String,

    /// Path to a TOML config file
    #[arg(long, default_value = "configs/default.toml")]
    config: String,

    /// Bind address baked into the image CMD (defaults to 0.0.0.0:<expose_port>)
    #[arg(long)]
    bind: Option<String>,

    /// Worker count baked into the image CMD
    #[arg(long)]
    workers: Option<usize>,

    /// Allow the dependency-manager cache (disables the closed-world pin check)
    #[arg(long)]
    allow_dependency_cache: bool,

    /// WSGI entry point baked into the image CMD, as module:object
    app: String,
}

/// Check if Docker is running and accessible
async fn is_docker_running() -> bool {
    match tokio::process::Command::new("docker")
        .args(["version", "--format", "{{.Server.Version}}"])
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let args = Args::parse();

    if !is_docker_running().await {
        error!("Docker is not running or not accessible");
        std::process::exit(1);
    }

    let config = Config::load(&args.config).unwrap_or_else(|e| {
        info!("Using default configuration ({e})");
        Config::default()
    });

    let entry_point: EntryPoint = args.app.parse()?;
    let workers = config.resolve_workers(args.workers)?;
    let bind = args
        .bind
        .unwrap_or_else(|| format!("0.0.0.0:{}", config.build.expose_port));

    let mut build_config = config.build.clone();
    if args.allow_dependency_cache {
        build_config.use_dependency_cache = true;
    }

    let recipe = BuildRecipe::from_config(
        &build_config,
        StartCommand {
            bind,
            workers,
            entry_point,
        },
    );

    ImageBuilder::new()
        .build_image(&recipe, &args.context, &args.tag)
        .await?;

    info!("Image {} ready", args.tag);
    Ok(())
}
