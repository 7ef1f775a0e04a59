mod cli;
mod http;
mod service;
mod state;

use anyhow::anyhow;
use clap::Parser;

use cli::{CatalogCommand, Cli, Commands};
use mlorch_infra::config::load_config;
use mlorch_observe::tracing_setup::{init_tracing, shutdown_tracing};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config).await;

    let level = match cli.verbose {
        0 if cli.quiet => "error".to_string(),
        0 => config.log_level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    init_tracing(config.log_format, &level, cli.otel).map_err(|e| anyhow!(e.to_string()))?;

    // Validation needs no state, and the file under test may differ from the
    // configured catalog.
    if let Commands::Catalog {
        action: CatalogCommand::Validate { file },
    } = &cli.command
    {
        let result = cli::catalog::validate_file(file, cli.json).await;
        shutdown_tracing();
        return result;
    }

    let result = dispatch(cli, config).await;
    shutdown_tracing();
    result
}

async fn dispatch(
    cli: Cli,
    config: mlorch_types::config::OrchestratorConfig,
) -> anyhow::Result<()> {
    let host = match &cli.command {
        Commands::Serve { host: Some(host), .. } => host.clone(),
        _ => config.server.host.clone(),
    };
    let port = match &cli.command {
        Commands::Serve { port: Some(port), .. } => *port,
        _ => config.server.port,
    };

    let state = AppState::init(config).await?;

    match cli.command {
        Commands::Serve { .. } => {
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            tracing::info!(addr = addr.as_str(), "mlorch listening");
            if !cli.quiet {
                println!(
                    "  {} mlorch listening on {}",
                    console::style("⚡").bold(),
                    console::style(format!("http://{addr}")).cyan()
                );
                println!("  {}", console::style("Press Ctrl+C to stop").dim());
            }

            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            tracing::info!("server stopped");
            if !cli.quiet {
                println!("\n  Server stopped.");
            }
        }

        Commands::Run { request, watch } => {
            cli::run::run_request(&state, &request, watch, cli.json, cli.quiet).await?;
        }

        Commands::Catalog { action } => match action {
            CatalogCommand::List => {
                cli::catalog::list_workflows(state.router.catalog(), cli.json)?;
            }
            CatalogCommand::Validate { .. } => unreachable!("handled above"),
        },
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
