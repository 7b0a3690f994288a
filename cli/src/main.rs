// Arena CLI - Command Line Interface Entry Point

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use arena_config::{CONFIG_DIR_NAME, Config, ConfigLoader};
use arena_core::ComparisonOrchestrator;
use arena_core::credentials::{CredentialRotationManager, StaticCredentialLookup};
use arena_core::model::{
    CapabilityResolver, EndpointRegistry, ModelMetadataManager, ProviderClientFactory,
    normalize_base_url,
};
use arena_protocol::{ComparisonRequest, ExecutionMode};

/// Arena - compare model providers side by side
#[derive(Parser, Debug)]
#[command(name = "arena")]
#[command(version, about, long_about = None)]
struct TopCli {
    #[clap(flatten)]
    config_overrides: CliConfigOverrides,

    /// Project directory holding an optional .arena/config.toml
    #[arg(short = 'd', long = "dir", global = true)]
    dir: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

/// CLI configuration overrides
#[derive(Debug, clap::Args)]
struct CliConfigOverrides {
    /// Configuration override in key=value format
    #[arg(short = 'c', long = "config", value_name = "KEY=VALUE", global = true)]
    overrides: Vec<String>,
}

/// Available commands
#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one comparison from a JSON request file
    Compare {
        /// Request file, `-` for stdin
        #[arg(short = 'r', long = "request")]
        request: PathBuf,

        /// Credential file (defaults to ~/.arena/credentials.toml)
        #[arg(long = "credentials")]
        credentials: Option<PathBuf>,

        /// Caller identity used for credential lookup
        #[arg(long = "caller", env = "ARENA_CALLER", default_value = "local")]
        caller: String,

        /// Stream events as SSE lines instead of one JSON document
        #[arg(long = "stream")]
        stream: bool,

        /// Cancel remaining models after the first failure
        #[arg(long = "stop-on-error")]
        stop_on_error: bool,

        /// Run models one after another
        #[arg(long = "sequential")]
        sequential: bool,
    },

    /// List known providers
    Providers {
        /// Also list catalog models per provider
        #[arg(long = "models")]
        models: bool,
    },

    /// Show how a base URL override is normalized
    NormalizeUrl {
        /// Base URL as a user would type it
        url: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },

    /// Model metadata catalog
    Catalog {
        #[command(subcommand)]
        catalog_command: CatalogCommands,
    },
}

/// Configuration commands
#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
}

/// Catalog commands
#[derive(Debug, Subcommand)]
enum CatalogCommands {
    /// Download model metadata into the local cache
    Refresh {
        /// Alternative catalog URL
        #[arg(long = "url")]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = TopCli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(dir) = &cli.dir {
        loader = loader.with_project_dir(dir.clone());
    }
    let config = loader.load_with_cli_overrides(parse_overrides(&cli.config_overrides.overrides)?)?;

    // Logs go to stderr so stdout stays machine-readable
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.filter.clone());
    tracing_subscriber::fmt()
        .with_env_filter(filter.as_str())
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Compare {
            request,
            credentials,
            caller,
            stream,
            stop_on_error,
            sequential,
        } => {
            let mut request = read_request(&request)?;
            request.options.streaming |= stream;
            request.options.stop_on_error |= stop_on_error;
            if sequential {
                request.options.mode = Some(ExecutionMode::Sequential);
            }
            run_compare(&config, request, credentials, &caller).await?;
        }
        Commands::Providers { models } => list_providers(models),
        Commands::NormalizeUrl { url } => println!("{}", normalize_base_url(&url)),
        Commands::Config { config_command } => match config_command {
            ConfigCommands::Show => print!("{}", toml::to_string_pretty(&config)?),
        },
        Commands::Catalog { catalog_command } => match catalog_command {
            CatalogCommands::Refresh { url } => {
                let mut manager = ModelMetadataManager::new(&arena_home().join("cache"));
                if let Some(url) = url {
                    manager = manager.with_source_url(url);
                }
                let count = manager.refresh().await?;
                println!(
                    "cached {count} models at {}",
                    manager.cache_path().display()
                );
            }
        },
    }

    Ok(())
}

/// Splits `key=value` overrides.
fn parse_overrides(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|item| match item.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => bail!("invalid override {item:?}, expected KEY=VALUE"),
        })
        .collect()
}

fn arena_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

fn read_request(path: &Path) -> Result<ComparisonRequest> {
    let text = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("read request from stdin")?
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("read request {}", path.display()))?
    };
    let request: ComparisonRequest = serde_json::from_str(&text).context("parse request")?;
    request.validate()?;
    Ok(request)
}

async fn build_orchestrator(
    config: &Config,
    credentials: Option<PathBuf>,
) -> Result<ComparisonOrchestrator> {
    let credentials_path = credentials.unwrap_or_else(|| arena_home().join("credentials.toml"));
    let lookup = StaticCredentialLookup::load(&credentials_path)?;

    let registry = Arc::new(EndpointRegistry::builtin());
    let metadata = Arc::new(ModelMetadataManager::new(&arena_home().join("cache")));
    match metadata.load_cache().await {
        Ok(count) if count > 0 => info!(models = count, "loaded model metadata cache"),
        Ok(_) => {}
        Err(err) => warn!(error = %err, "ignoring unreadable model metadata cache"),
    }

    // Built-in table first, then the downloaded catalog
    let resolver = CapabilityResolver::new(&config.reasoning)
        .with_catalog(registry.clone())
        .with_catalog(metadata);

    Ok(ComparisonOrchestrator::new(
        Arc::new(ProviderClientFactory::new(registry, config)),
        Arc::new(resolver),
        Arc::new(CredentialRotationManager::new()),
        Arc::new(lookup),
        config,
    ))
}

async fn run_compare(
    config: &Config,
    request: ComparisonRequest,
    credentials: Option<PathBuf>,
    caller: &str,
) -> Result<()> {
    let orchestrator = build_orchestrator(config, credentials).await?;
    let mut stdout = std::io::stdout();

    if request.options.streaming {
        let mut stream = orchestrator.compare_stream(caller, request);
        let mut interrupted = false;
        loop {
            tokio::select! {
                frame = stream.next() => {
                    let Some(frame) = frame else { break };
                    write!(stdout, "{}", frame.to_sse())?;
                    stdout.flush()?;
                    if frame.is_done() {
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c(), if !interrupted => {
                    warn!("interrupted, cancelling comparison");
                    interrupted = true;
                    stream.cancel();
                }
            }
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling comparison");
            trigger.cancel();
        }
    });

    let response = orchestrator
        .compare_with_cancel(caller, request, cancel)
        .await?;
    serde_json::to_writer_pretty(&mut stdout, &response)?;
    writeln!(stdout)?;
    Ok(())
}

fn list_providers(with_models: bool) {
    let registry = EndpointRegistry::builtin();
    for endpoint in registry.list() {
        let base_url = if endpoint.base_url.is_empty() {
            "(base URL required)"
        } else {
            endpoint.base_url.as_str()
        };
        println!(
            "{:<12} {:<18} {:<18} {}",
            endpoint.id, endpoint.name, endpoint.family, base_url
        );
        if with_models {
            for model in registry.models_for(&endpoint.id) {
                let reasoning = if model.reasoning { " [reasoning]" } else { "" };
                println!("    {:<32} {}{}", model.model_id, model.display_name, reasoning);
            }
        }
    }
}
