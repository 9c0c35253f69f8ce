// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    runtime::{controller::Action, watcher::Config, Controller},
    Api, Client, Resource, ResourceExt,
};
use std::sync::Arc;
use std::time::Instant;
use terranetes::{
    config::ControllerConfig,
    constants::{METRICS_SERVER_BIND_ADDRESS, METRICS_SERVER_PATH, TOKIO_WORKER_THREADS},
    context::Context,
    crd::{Configuration, Provider},
    errors::ReconcileError,
    labels::CONFIGURATION_UID_LABEL,
    metrics,
    reconcilers::{
        ensure::requeue_immediate, reconcile_configuration, reconcile_provider, ReconcileResult,
    },
    selector::configuration_for_job,
    store::KubeStore,
};
use tracing::{debug, error, info, warn};

type ControllerContext = Context<KubeStore>;

const KIND_CONFIGURATION: &str = "Configuration";
const KIND_PROVIDER: &str = "Provider";

fn main() -> Result<()> {
    let config = ControllerConfig::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("terranetes-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

/// Logging setup.
///
/// Respects `RUST_LOG` (default `info`) and `RUST_LOG_FORMAT` (`json` or `text`).
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(config: ControllerConfig) -> Result<()> {
    init_tracing();

    info!(
        namespace = %config.namespace,
        cost_estimation = config.cost_estimation_enabled(),
        "Starting Terraform Controller"
    );

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    let metrics_port = config.metrics_port;
    let ctx = Arc::new(Context::new(
        Arc::new(KubeStore::new(client.clone())),
        config,
    ));

    info!("Starting all controllers");

    tokio::select! {
        result = run_configuration_controller(client.clone(), ctx.clone()) => {
            result?;
            info!("Configuration controller stopped");
        }
        result = run_provider_controller(client.clone(), ctx.clone()) => {
            result?;
            info!("Provider controller stopped");
        }
        result = run_metrics_server(metrics_port) => {
            error!("CRITICAL: metrics server exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Metrics server exited unexpectedly without error")
        }
    }

    Ok(())
}

/// Run the `Configuration` controller
///
/// Stage jobs in the controller namespace and the connection secrets re-trigger
/// the owning configuration.
async fn run_configuration_controller(client: Client, ctx: Arc<ControllerContext>) -> Result<()> {
    info!("Starting Configuration controller");

    let configurations = Api::<Configuration>::all(client.clone());
    let jobs = Api::<Job>::namespaced(client.clone(), ctx.controller_namespace());
    let secrets = Api::<Secret>::all(client);

    Controller::new(configurations, Config::default())
        .owns(secrets, Config::default().labels(CONFIGURATION_UID_LABEL))
        .watches(
            jobs,
            Config::default().labels(CONFIGURATION_UID_LABEL),
            |job: Job| configuration_for_job(&job),
        )
        .shutdown_on_signal()
        .run(reconcile_configuration_wrapper, error_policy, ctx)
        .for_each(|result| {
            if let Err(e) = result {
                debug!(error = %e, "Configuration reconcile loop reported an error");
            }
            futures::future::ready(())
        })
        .await;

    Ok(())
}

/// Run the `Provider` controller
async fn run_provider_controller(client: Client, ctx: Arc<ControllerContext>) -> Result<()> {
    info!("Starting Provider controller");

    Controller::new(Api::<Provider>::all(client), Config::default())
        .shutdown_on_signal()
        .run(reconcile_provider_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Reconcile wrapper for `Configuration`
async fn reconcile_configuration_wrapper(
    configuration: Arc<Configuration>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let result = reconcile_configuration(ctx.clone(), (*configuration).clone()).await;
    into_action(KIND_CONFIGURATION, configuration.as_ref(), result, start, &ctx)
}

/// Reconcile wrapper for `Provider`
async fn reconcile_provider_wrapper(
    provider: Arc<Provider>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let result = reconcile_provider(ctx.clone(), (*provider).clone()).await;
    into_action(KIND_PROVIDER, provider.as_ref(), result, start, &ctx)
}

/// Key of a resource in the per-resource error backoff.
fn backoff_key<K: ResourceExt>(kind: &str, resource: &K) -> String {
    format!(
        "{kind}/{}/{}",
        resource.namespace().unwrap_or_default(),
        resource.name_any()
    )
}

/// Maps a pass result onto a controller action and records it.
///
/// A successful pass resets the error backoff of the resource.
fn into_action<K: ResourceExt>(
    kind: &str,
    resource: &K,
    result: Result<ReconcileResult, ReconcileError>,
    start: Instant,
    ctx: &ControllerContext,
) -> Result<Action, ReconcileError> {
    match result {
        Ok(ReconcileResult::Complete) => {
            ctx.clear_error_requeue(&backoff_key(kind, resource));
            metrics::record_reconciliation_success(kind, start.elapsed());
            debug!(
                kind = kind,
                namespace = %resource.namespace().unwrap_or_default(),
                name = %resource.name_any(),
                "Reconcile complete"
            );
            Ok(Action::requeue(ctx.config.resync_period()))
        }
        Ok(ReconcileResult::RequeueAfter(after)) => {
            ctx.clear_error_requeue(&backoff_key(kind, resource));
            metrics::record_reconciliation_success(kind, start.elapsed());
            let reason = if after == requeue_immediate() {
                "conflict"
            } else {
                "dependency_wait"
            };
            metrics::record_reconciliation_requeue(kind, reason);
            Ok(Action::requeue(after))
        }
        Err(e) => {
            metrics::record_reconciliation_error(kind, start.elapsed());
            metrics::record_error(kind, e.metric_label());
            error!(
                kind = kind,
                namespace = %resource.namespace().unwrap_or_default(),
                name = %resource.name_any(),
                error = %e,
                "Failed to reconcile resource"
            );
            Err(e)
        }
    }
}

/// Error policy for both controllers
///
/// Consecutive failures of a resource back off exponentially.
fn error_policy<K: Resource<DynamicType = ()>>(
    resource: Arc<K>,
    err: &ReconcileError,
    ctx: Arc<ControllerContext>,
) -> Action {
    let kind = K::kind(&());
    let delay = ctx.next_error_requeue(&backoff_key(&kind, resource.as_ref()));
    warn!(
        kind = %kind,
        namespace = %resource.namespace().unwrap_or_default(),
        name = %resource.name_any(),
        error = %err,
        requeue = ?delay,
        "Requeueing after reconcile error"
    );
    Action::requeue(delay)
}

/// Serves the Prometheus registry.
async fn run_metrics_server(port: u16) -> Result<()> {
    let app = Router::new()
        .route(METRICS_SERVER_PATH, get(metrics_handler))
        .route("/healthz", get(|| async { StatusCode::OK }));

    let addr = format!("{METRICS_SERVER_BIND_ADDRESS}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Metrics server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        ),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                format!("Failed to encode metrics: {e}"),
            )
        }
    }
}
