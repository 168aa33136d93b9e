//! Doris Operator - Main Entry Point

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, extract::Extension, routing::get};
use clap::{Parser, ValueEnum};
use doris_operator::crd::DorisCluster;
use doris_operator::{ControllerConfig, OperatorState, ReconcilerConfig, run_controller};
use doris_shared::config::{ConfigLoader, OperatorConfigDto};
use kube::{Client, CustomResourceExt};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

/// Doris Kubernetes Operator
#[derive(Parser, Debug)]
#[command(name = "doris-operator")]
#[command(version = "0.1.0")]
#[command(about = "Kubernetes Operator for disaggregated Doris clusters", long_about = None)]
struct Args {
    /// Optional .env file loaded before the environment
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// Kubernetes namespace to watch (overrides DORIS_OPERATOR_NAMESPACE)
    #[arg(long)]
    pub namespace: Option<String>,

    /// Log level (overrides RUST_LOG)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Print the DorisCluster CRD as JSON and exit
    #[arg(long)]
    pub print_crd: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_crd {
        println!("{}", serde_json::to_string_pretty(&DorisCluster::crd())?);
        return Ok(());
    }

    let mut config = ConfigLoader::new(args.env_file.clone())
        .load_operator_config()
        .context("Failed to load operator configuration")?;
    if let Some(namespace) = args.namespace.clone() {
        config.namespace = Some(namespace);
    }

    let filter = match args.log_level {
        Some(level) => EnvFilter::default().add_directive(LevelFilter::from(level).into()),
        None => EnvFilter::try_new(&config.logging.filter)
            .context("Invalid RUST_LOG filter")?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Doris Operator");
    info!(
        namespace = ?config.namespace,
        health_bind = %config.health_bind,
        admin_timeout = ?config.admin_timeout(),
        "Operator configuration"
    );

    let k8s_client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    info!("Connected to Kubernetes");

    let state = Arc::new(OperatorState::new(
        k8s_client,
        config.namespace.clone(),
        controller_config(&config),
    ));

    let health_state = state.clone();
    let health_bind = config.health_bind;
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_bind, health_state).await {
            error!(error = %e, "Health server failed");
        }
    });

    let controller = tokio::spawn(run_controller(state.clone()));
    info!("DorisCluster controller started");

    info!("Operator is running. Press Ctrl+C to stop.");
    tokio::select! {
        _ = signal::ctrl_c() => info!("Shutting down operator..."),
        joined = controller => {
            if let Err(e) = joined {
                error!(error = %e, "Controller task aborted");
            }
        }
    }

    Ok(())
}

fn controller_config(config: &OperatorConfigDto) -> ControllerConfig {
    ControllerConfig {
        requeue_interval: config.requeue_interval(),
        error_requeue_interval: config.error_requeue_interval(),
        debounce: config.debounce(),
        reconciler: ReconcilerConfig {
            admin_timeout: config.admin_timeout(),
        },
    }
}

/// Liveness and readiness probes
async fn start_health_server(addr: SocketAddr, state: Arc<OperatorState>) -> Result<()> {
    async fn readyz(Extension(state): Extension<Arc<OperatorState>>) -> impl IntoResponse {
        if state.is_ready() {
            (StatusCode::OK, Json(serde_json::json!({ "status": "ready" })))
        } else {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "starting" })),
            )
        }
    }

    let app = axum::Router::new()
        .route(
            "/healthz",
            get(|| async { Json(serde_json::json!({ "status": "ok" })) }),
        )
        .route("/readyz", get(readyz))
        .layer(Extension(state));

    info!("Starting health endpoint at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .context("Health server failed")?;

    Ok(())
}
