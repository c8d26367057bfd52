use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use forward_proxy::cli::Cli;
use forward_proxy::config::{build_config, read_config_file, ConfigFile};
use forward_proxy::http::HttpServer;
use forward_proxy::lifecycle::{spawn_signal_handler, Shutdown};
use forward_proxy::net::{listener, tls};
use forward_proxy::observability::{init_logging, init_metrics};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => match read_config_file(path) {
            Ok(file) => file,
            Err(e) => {
                eprintln!("ERR: failed to read {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => ConfigFile::default(),
    };
    let file = cli.apply(file);

    init_logging(&file.observability.log_level);

    match run(file).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Proxy failed");
            eprintln!("ERR: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(file: ConfigFile) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(build_config(&file)?);
    let address = listener::parse_address(&file.listener.bind_address())?;

    if let Some(metrics_address) = &file.observability.metrics_address {
        init_metrics(listener::parse_address(metrics_address)?);
    }

    tracing::info!(
        "Proxy '{}://{}' to '{}'",
        config.proxy_scheme(),
        address,
        config.target.as_str().trim_end_matches('/')
    );
    tracing::debug!(
        no_cache = config.no_cache,
        cors = config.cors,
        proxy_external = config.proxy_external,
        overwrite = ?config.overwrite_folder,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    spawn_signal_handler(shutdown);

    let server = HttpServer::new(Arc::clone(&config))?;
    match &file.listener.tls {
        Some(tls_files) => {
            let rustls = tls::load_tls_config(Path::new(&tls_files.cert_path), Path::new(&tls_files.key_path)).await?;
            server.run_tls(address, rustls, signal).await?;
        }
        None => {
            let listener = listener::bind(address).await?;
            server.run(listener, signal).await?;
        }
    }

    Ok(())
}
