//! Serve command implementation

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{ConfigArgs, ServeArgs};
use crate::config::{BenchStreamConfig, LogFormat, LoggingConfig};
use crate::dashboard::{create_dashboard, run_scoped};

/// Load configuration with CLI overrides
pub fn load_config_with_overrides(args: &ConfigArgs) -> anyhow::Result<BenchStreamConfig> {
    // Load from file if it exists, otherwise use defaults
    let mut config = if args.config.exists() {
        BenchStreamConfig::load(Some(&args.config))
            .with_context(|| format!("loading {}", args.config.display()))?
    } else {
        tracing::debug!("Config file not found, using defaults");
        BenchStreamConfig::default()
    };

    config = config.with_env_overrides();

    // CLI overrides (highest priority)
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(ref host) = args.host {
        config.server.host = host.clone();
    }
    if let Some(ref log_level) = args.log_level {
        config.logging.level = log_level.clone();
    }
    if args.no_streaming {
        config.streaming.enabled = false;
    }

    config.validate()?;
    Ok(config)
}

/// Initialize tracing based on configuration
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter_str = crate::logging::build_filter_directives(config);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    match config.format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()?;
        }
    }

    Ok(())
}

/// Wait for SIGINT or SIGTERM, then cancel `cancel_token`
pub async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
        _ = cancel_token.cancelled() => {}
    }

    cancel_token.cancel();
}

/// Main serve command handler
pub async fn run_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = load_config_with_overrides(&args.config)?;
    init_tracing(&config.logging)?;

    tracing::info!("Starting benchstream dashboard");
    tracing::debug!(?config, "Loaded configuration");

    let cancel_token = CancellationToken::new();
    let dashboard = create_dashboard(&config);
    run_scoped(dashboard, |_dashboard| shutdown_signal(cancel_token.clone())).await?;

    tracing::info!("benchstream dashboard stopped");
    Ok(())
}
