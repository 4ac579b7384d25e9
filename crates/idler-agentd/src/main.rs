mod config;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use idler_api::{HttpApi, OrchestratorAdapter, axum};
use idler_core::{Backends, Orchestrator};
use idler_gcp::{CloudTasksConfig, CloudTasksScheduler, ComputeConfig, ComputeEngine};
use idler_github::{AppCredentials, GithubConfig, GithubRunners};
use idler_observe::{LoggerConfig, logger_init};
use idler_prometheus::PrometheusMetrics;

use crate::config::Config;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    // 1) logger
    logger_init(&LoggerConfig::from_env()?)?;

    // 2) config
    let cfg = Config::from_env().context("load configuration")?;
    info!(
        project = %cfg.project_id,
        queue = %cfg.task_queue,
        routes = cfg.routes.len(),
        inactive_secs = cfg.policy.inactivity_delay.as_secs(),
        retry_secs = cfg.policy.retry_delay.as_secs(),
        cancel_stop_on_queued = cfg.policy.cancel_stop_on_queued,
        "configuration loaded"
    );
    if cfg.routes.is_empty() {
        warn!("RUNNER_CONFIG is empty, every event will be skipped");
    }

    // 3) backends
    let auth = idler_gcp::default_provider()
        .await
        .context("initialize gcp auth")?;
    let compute = ComputeEngine::new(
        ComputeConfig::new(&cfg.project_id).with_timeout(cfg.backend_timeout),
        auth.clone(),
    )?;
    let tasks = CloudTasksScheduler::new(
        CloudTasksConfig::new(
            &cfg.project_id,
            &cfg.task_location,
            &cfg.task_queue,
            &cfg.service_url,
            &cfg.secret,
        )
        .with_timeout(cfg.backend_timeout),
        auth,
    )?;

    let credentials = AppCredentials::from_pem(
        cfg.github_app_id.as_str(),
        cfg.github_installation_id,
        &cfg.github_private_key,
    )
    .context("load github app credentials")?;
    let mut github = GithubConfig::default().with_timeout(cfg.backend_timeout);
    if let Some(url) = &cfg.github_api_url {
        github = github.with_api_url(url);
    }
    let jobs = GithubRunners::new(github, credentials)?;

    let backends = Backends {
        compute: Arc::new(compute),
        tasks: Arc::new(tasks),
        jobs: Arc::new(jobs),
    };

    // 4) orchestrator
    let metrics = PrometheusMetrics::new()?;
    let mut orchestrator = Orchestrator::new(Arc::new(cfg.routes), backends, cfg.policy)
        .with_metrics(Arc::new(metrics.clone()));
    if let Some(zone) = cfg.default_zone {
        orchestrator = orchestrator.with_default_zone(zone);
    }

    // 5) http
    let handler = Arc::new(OrchestratorAdapter::new(Arc::new(orchestrator)));
    let router = HttpApi::new(handler, cfg.secret)
        .with_metrics(metrics)
        .router();

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
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
    info!("shutdown signal received");
}
