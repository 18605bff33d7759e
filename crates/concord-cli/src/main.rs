//! `concord` command-line entrypoint.

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use concord_core::{normalize, AnalysisRequest, Aggregator, BackendResponse, BackendWeights, Language};
use concord_runtime::{EnsembleError, EnsembleService, ProviderRegistry, RuntimeConfig};

mod cli;
mod output;

use cli::{Cli, Command, Timeout};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Terminal ensemble failures show only the generic message
            match e.downcast_ref::<EnsembleError>() {
                Some(ensemble) => {
                    tracing::debug!(error = %ensemble, "Analysis failed");
                    eprintln!("{}", ensemble.user_message());
                }
                None => eprintln!("Error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Analyze {
            image,
            language,
            analysis_type,
            config,
            timeout,
            format,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(Timeout(timeout)) = timeout {
                config.ensemble.call_timeout = timeout;
            }

            let bytes = std::fs::read(&image)
                .with_context(|| format!("Failed to read image {}", image.display()))?;
            if bytes.is_empty() {
                bail!("Image file {} is empty", image.display());
            }
            let request = AnalysisRequest::new(general_purpose::STANDARD.encode(&bytes))
                .with_language(language)
                .with_analysis_type(analysis_type);

            let service = build_service(&config)?;
            info!(
                backends = ?service.backend_ids(),
                primary = service.primary_id(),
                image = %image.display(),
                "Starting analysis"
            );

            let cancel = CancellationToken::new();
            let on_ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_ctrl_c.cancel();
                }
            });

            let outcome = service.analyze_with_cancel(request, cancel).await?;
            println!("{}", output::render_outcome(&outcome, language, format)?);
        }

        Command::Fuse {
            input,
            config,
            format,
        } => {
            let weights = match config {
                Some(path) => load_config(Some(path.as_path()))?.weights()?,
                None => BackendWeights::default(),
            };
            let json = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let responses: Vec<BackendResponse> = serde_json::from_str(&json)
                .with_context(|| format!("{} is not an array of backend responses", input.display()))?;

            if responses.is_empty() {
                bail!("{} holds no backend responses", input.display());
            }
            let consensus = Aggregator::new(weights).fuse_offline(&responses)?;
            let report = normalize(&consensus);
            println!("{}", output::render_report(&report, Language::En, format)?);
        }

        Command::Health { config } => {
            let config = load_config(config.as_deref())?;
            let service = build_service(&config)?;

            let mut healthy = 0;
            let results = service.health_check().await;
            for (backend, ok) in &results {
                println!("{:<24} {}", backend, if *ok { "ok" } else { "unreachable" });
                healthy += usize::from(*ok);
            }
            if healthy < service.quorum() {
                bail!(
                    "only {} of {} backends reachable, quorum is {}",
                    healthy,
                    results.len(),
                    service.quorum()
                );
            }
        }

        Command::Config => {
            print!("{}", RuntimeConfig::default().to_yaml()?);
        }
    }

    Ok(())
}

// Setup errors keep their detail.
fn build_service(config: &RuntimeConfig) -> Result<EnsembleService> {
    EnsembleService::from_config(config, &ProviderRegistry::with_defaults())
        .map_err(|e| anyhow::anyhow!("Failed to set up backends: {}", e))
}

fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(RuntimeConfig::default()),
    }
}
