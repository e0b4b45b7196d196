use anyhow::Result;
use clap::{Parser, Subcommand};
use proxy_broker::{
    api::{self, wire::ProxyResponse},
    relay::{FindRequest, GrabRequest},
    ProxyParser, ProxyRecord, RequestCoordinator, ServiceConfig, ServiceError,
};
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// On-demand public proxy discovery and verification
#[derive(Parser)]
#[command(name = "proxy-broker")]
#[command(about = "On-demand public proxy discovery and verification")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// MaxMind City database for geolocation
    #[arg(long, global = true)]
    mmdb: Option<PathBuf>,

    /// File with extra proxy sources, one "URL [TYPE]" per line
    #[arg(long, global = true)]
    sources_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Listen address
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Find and verify proxies once, then exit
    Find {
        /// Proxy types (HTTP, HTTPS, SOCKS4, SOCKS5, CONNECT:80, CONNECT:25)
        #[arg(short = 't', long, num_args = 1.., required = true)]
        types: Vec<String>,
        /// ISO country codes filter
        #[arg(short, long, num_args = 1..)]
        countries: Vec<String>,
        /// Maximum number of proxies to find
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
        /// Anonymity levels must match exactly
        #[arg(long)]
        strict: bool,
        /// Use POST instead of GET when checking proxies
        #[arg(long)]
        post: bool,
        /// HTTP anonymity levels to accept (Transparent, Anonymous, High)
        #[arg(long, num_args = 1..)]
        levels: Vec<String>,
        /// Spam databases for proxy checking
        #[arg(long, num_args = 1..)]
        dnsbl: Vec<String>,
        /// Per-check timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Write IP:PORT lines here instead of printing JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Grab proxies from listings without checking them, then exit
    Grab {
        /// ISO country codes filter
        #[arg(short, long, num_args = 1..)]
        countries: Vec<String>,
        /// Maximum number of proxies to grab
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
        /// Write IP:PORT lines here instead of printing JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    (!values.is_empty()).then_some(values)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ServiceConfig::from_env()?;
    if let Some(path) = cli.mmdb {
        config = config.with_mmdb_path(path);
    }
    if let Some(path) = cli.sources_file {
        config = config.with_sources_file(path);
    }

    let session = config.build_session()?;
    session.init()?;
    let coordinator = RequestCoordinator::new(session.clone());

    match cli.command.unwrap_or(Commands::Serve { bind: None }) {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config = config.with_bind_addr(bind);
            }
            serve(coordinator, &config.bind_addr).await?;
        }
        Commands::Find {
            types,
            countries,
            limit,
            strict,
            post,
            levels,
            dnsbl,
            timeout,
            output,
        } => {
            let request = FindRequest {
                types,
                countries: non_empty(countries),
                limit,
                post,
                strict,
                dnsbl: non_empty(dnsbl),
                timeout,
                levels: non_empty(levels),
            };
            report(coordinator.find(request).await, output)?;
        }
        Commands::Grab {
            countries,
            limit,
            output,
        } => {
            let request = GrabRequest {
                countries: non_empty(countries),
                limit,
            };
            report(coordinator.grab(request).await, output)?;
        }
    }

    session.stop();
    Ok(())
}

async fn serve(coordinator: RequestCoordinator, bind: &str) -> Result<()> {
    let session = coordinator.session().clone();
    let app = api::create_router(api::AppState::new(session.clone()));

    info!("Starting API server on {}", bind);
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                return;
            }
            info!("Shutdown requested");
            session.stop();
        })
        .await?;

    Ok(())
}

fn report(result: Result<Vec<ProxyRecord>, ServiceError>, output: Option<PathBuf>) -> Result<()> {
    let records = result?;

    match output {
        Some(path) => {
            ProxyParser::save_to_file(&records, &path)?;
            info!("Saved {} proxies to {:?}", records.len(), path);
        }
        None => {
            let responses: Vec<ProxyResponse> =
                records.into_iter().map(ProxyResponse::from).collect();
            println!("{}", serde_json::to_string_pretty(&responses)?);
        }
    }

    Ok(())
}
