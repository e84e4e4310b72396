//! Chat service CLI and REST API entry point.
//!
//! Binary name: `chatsvc`
//!
//! Parses CLI arguments, initializes logging, the database and the completion
//! service, then dispatches to a command handler or starts the REST API server.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;

use chatservice_core::llm::provider::LlmProvider;
use chatservice_observe::{LogFormat, TracingOptions, init_tracing, shutdown_tracing};
use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need logging or app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "chatsvc", &mut std::io::stdout());
        return Ok(());
    }

    let mut tracing_options = TracingOptions::from_verbosity(cli.verbose, cli.quiet);
    tracing_options.enable_otel = cli.otel;
    if cli.log_json {
        tracing_options.format = LogFormat::Json;
    }
    if let Err(e) = init_tracing(&tracing_options) {
        eprintln!("Warning: failed to initialize logging: {e}");
    }

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let needs_provider = matches!(cli.command, Commands::Serve { .. } | Commands::Ask(_));
    let state = AppState::init(needs_provider).await?;

    match cli.command {
        Commands::Serve { port, host } => serve(state.clone(), port, host).await?,

        Commands::Ask(args) => cli::chat::ask(&state, args, cli.json).await?,

        Commands::Show { chat_id } => cli::chat::show(&state, &chat_id, cli.json).await?,

        Commands::End { chat_id } => cli::chat::end(&state, &chat_id, cli.json).await?,

        Commands::Completions { .. } => unreachable!("handled in main"),
    }

    state.db_pool.close().await;
    Ok(())
}

async fn serve(state: AppState, port: Option<u16>, host: Option<String>) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| state.config.server.host.clone());
    let port = port.unwrap_or(state.config.server.port);

    if state.auth_token_hash.is_none() {
        tracing::warn!("No auth token configured; the API accepts unauthenticated requests");
        println!(
            "  {} No auth token configured (set CHATSERVICE_AUTH_TOKEN); API is unauthenticated",
            console::style("!").yellow().bold()
        );
    }

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!(
        "  {} Chat service listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}")).cyan()
    );
    println!(
        "  {}",
        console::style(format!("Data directory: {}", state.data_dir.display())).dim()
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());
    tracing::info!(%addr, provider = %state.completion_service.provider().name(), "Server started");

    let shutdown = state.shutdown.clone();
    let router = http::router::build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Cancel in-flight exchanges.
            shutdown.cancel();
        })
        .await?;

    println!("\n  Server stopped.");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
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
                tracing::error!("Failed to install SIGTERM handler: {e}");
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
}
