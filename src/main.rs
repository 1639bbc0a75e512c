use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;

use search_sigv4_proxy::config::ProxyConfig;
use search_sigv4_proxy::constants::DEFAULT_LISTEN_HOST;
use search_sigv4_proxy::credentials::AwsCredentialChain;
use search_sigv4_proxy::logging::{self, LogFormat};
use search_sigv4_proxy::proxy::{ProxyHandler, ReqwestUpstream};
use search_sigv4_proxy::server::{shutdown_signal, ProxyServer, ServerConfig};

/// Local proxy that signs search requests with AWS SigV4
#[derive(Parser, Debug)]
#[command(name = "search-sigv4-proxy")]
#[command(version, about, long_about = None)]
struct Args {
    /// Search service endpoint, e.g. https://search-domain.us-east-1.es.amazonaws.com
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Full listen address; overrides --port
    #[arg(short, long)]
    listen: Option<String>,

    /// Print each request and response
    #[arg(short, long)]
    verbose: bool,

    /// Write request/response pairs to log files
    #[arg(long = "logtofile")]
    log_to_file: bool,

    /// Prettify verbose console output
    #[arg(long)]
    pretty: bool,

    /// Forward requests without signing them
    #[arg(long = "nosign")]
    no_sign: bool,

    /// Directory for the request/response log files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Do not retry with fresh credentials when a signed request gets a 403
    #[arg(long)]
    no_retry: bool,

    /// Diagnostic log format: text or json
    #[arg(long, default_value = "text")]
    log_format: LogFormat,

    /// YAML configuration file; flags given on the command line win
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Result<ProxyConfig> {
        let mut config = match &self.config {
            Some(path) => ProxyConfig::from_file(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?,
            None => ProxyConfig::new(self.endpoint.clone().unwrap_or_default()),
        };

        if let Some(endpoint) = self.endpoint {
            config.endpoint = endpoint;
        }
        if let Some(listen) = self.listen {
            config.listen = listen;
        } else if let Some(port) = self.port {
            config.listen = format!("{}:{}", DEFAULT_LISTEN_HOST, port);
        }
        if let Some(log_dir) = self.log_dir {
            config.log_dir = log_dir;
        }
        config.verbose |= self.verbose;
        config.log_to_file |= self.log_to_file;
        config.prettify |= self.pretty;
        config.no_sign |= self.no_sign;
        if self.no_retry {
            config.retry_on_stale_credentials = false;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_subscriber(args.log_format, args.verbose)
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    let config = args.into_config()?;

    tracing::info!(
        endpoint = %config.endpoint,
        signing = config.sign_requests(),
        verbose = config.verbose,
        log_to_file = config.verbose && config.log_to_file,
        "Configuration loaded"
    );

    let credentials = Arc::new(AwsCredentialChain::from_env().await);
    let upstream = Arc::new(
        ReqwestUpstream::new(config.write_timeout()).context("failed to create upstream client")?,
    );
    let handler = ProxyHandler::from_config(&config, credentials, upstream)
        .context("failed to initialize proxy")?;

    let addr = config.listen_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    tracing::info!(
        address = %addr,
        target = %handler.target().origin(),
        "Listening"
    );

    ProxyServer::new(Arc::new(handler), ServerConfig::from_config(&config))
        .run(listener, shutdown_signal())
        .await;

    Ok(())
}
