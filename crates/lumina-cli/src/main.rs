//! Lumina CLI - visual search from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Text search
//! lumina search "red dress"
//!
//! # Detect objects and write the overlay
//! lumina detect shoe.jpg --overlay shoe-boxes.png
//!
//! # Search items similar to a detected region
//! lumina similar shoe.jpg --region 1 --json
//!
//! # Check the service is reachable
//! lumina health
//! ```

mod output;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use lumina_core::core::settings::{ENV_API_URL, ENV_REQUEST_TIMEOUT_SECS};
use lumina_core::core::workflow::WorkflowView;
use lumina_core::{
    init_logging, HttpSearchBackend, OverlayRenderer, SearchBackend, SearchOrchestrator,
    SelectedFile, Settings, Transition,
};

/// Lumina visual search CLI.
///
/// Talks to a detection / similarity-search service configured through
/// `LUMINA_*` environment variables or the flags below.
#[derive(Parser)]
#[command(name = "lumina", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Base URL of the search service (overrides LUMINA_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Request timeout in seconds (overrides LUMINA_REQUEST_TIMEOUT_SECS)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Search the catalog by text
    Search {
        /// Search query
        query: String,
    },
    /// Detect objects in an image
    Detect {
        /// Image file
        image: PathBuf,

        /// Write the image with detection boxes to this file
        #[arg(long)]
        overlay: Option<PathBuf>,
    },
    /// Search items similar to one detected region of an image
    Similar {
        /// Image file
        image: PathBuf,

        /// Region index as listed by `detect`
        #[arg(short, long)]
        region: usize,

        /// Write the image with detection boxes to this file
        #[arg(long)]
        overlay: Option<PathBuf>,
    },
    /// Check that the search service is reachable
    Health,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let settings = load_settings(&cli, |key| std::env::var(key).ok())?;

    let _log_guard = init_logging(settings.log_dir.as_deref(), cli.verbose);
    debug!("Using search service at {}", settings.api_base_url);

    let backend = Arc::new(HttpSearchBackend::from_settings(&settings)?);
    if let Command::Health = cli.command {
        return Ok(match backend.health_check().await {
            Ok(()) => {
                println!("{} is reachable", backend.base_url());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{} is unreachable: {}", backend.base_url(), e);
                ExitCode::FAILURE
            }
        });
    }

    let orchestrator = SearchOrchestrator::from_settings(backend, &settings);

    let overlay_path = match &cli.command {
        Command::Search { query } => {
            if orchestrator.submit_text(query).await == Transition::Ignored {
                eprintln!("Search query cannot be empty");
                return Ok(ExitCode::FAILURE);
            }
            None
        }
        Command::Detect { image, overlay } => {
            orchestrator.select_image(load_file(image).await?).await;
            overlay.as_deref()
        }
        Command::Similar {
            image,
            region,
            overlay,
        } => {
            orchestrator.select_image(load_file(image).await?).await;
            if orchestrator.state().error_message().is_none()
                && orchestrator.select_region(*region).await == Transition::Ignored
            {
                let found = orchestrator
                    .state()
                    .detection()
                    .map(|d| d.regions.len())
                    .unwrap_or(0);
                eprintln!("Region {} not found ({} regions detected)", region, found);
                return Ok(ExitCode::FAILURE);
            }
            overlay.as_deref()
        }
        Command::Health => None,
    };

    let view = orchestrator.snapshot();
    if let Some(path) = overlay_path {
        write_overlay(&settings, &view, path).await?;
    }

    if cli.json {
        println!("{}", output::format_json(&view));
    } else if let Some(message) = &view.error {
        eprintln!("Error: {}", message);
    } else {
        println!("{}", output::format_human(&view));
    }

    Ok(if view.error.is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Loads settings from `env`, with command-line flags taking precedence
fn load_settings<F>(cli: &Cli, env: F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let timeout = cli.timeout.map(|secs| secs.to_string());
    let settings = Settings::from_lookup(|key| match key {
        ENV_API_URL if cli.api_url.is_some() => cli.api_url.clone(),
        ENV_REQUEST_TIMEOUT_SECS if timeout.is_some() => timeout.clone(),
        _ => env(key),
    })
    .context("Invalid configuration")?;
    Ok(settings)
}

async fn load_file(path: &Path) -> Result<SelectedFile> {
    SelectedFile::from_path(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn write_overlay(settings: &Settings, view: &WorkflowView, path: &Path) -> Result<()> {
    let Some(detection) = &view.detection else {
        debug!("No detection to draw; skipping overlay");
        return Ok(());
    };

    let renderer = OverlayRenderer::from_settings(settings);
    let overlay = renderer
        .render_uploaded(&detection.image, &detection.regions)
        .await?;
    overlay.save(path)?;

    info!(
        "Wrote {}x{} overlay to {}",
        overlay.width(),
        overlay.height(),
        path.display()
    );
    Ok(())
}
