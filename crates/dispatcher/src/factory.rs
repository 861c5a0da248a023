//! Backend factory - builds backend trees from configuration

use std::net::SocketAddr;

use contracts::{BackendConfig, BackendType, LogBackend, TelemetryBlueprint};
use coordinator::KvClient;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::{debug, instrument};

use crate::backends::{
    FanoutBackend, FileBackend, NetworkBackend, NetworkBackendConfig, OutOfProcessBackend,
    OutOfProcessConfig, TraceBackend,
};
use crate::DispatcherError;

/// Deployment facts backends need beyond their own params
#[derive(Debug, Clone)]
pub struct BackendContext {
    /// Broker frontend used by network backends without an `addr` param
    pub bus_frontend: SocketAddr,
    pub kv: Option<KvClient>,
    /// Session used by network backends without a `session` param
    pub session: String,
}

impl BackendContext {
    pub fn from_blueprint(blueprint: &TelemetryBlueprint) -> Self {
        Self {
            bus_frontend: blueprint.bus.frontend_addr,
            kv: Some(KvClient::from_config(&blueprint.coordinator)),
            session: blueprint.logger.session.clone(),
        }
    }
}

/// Build one backend and, recursively, its children
///
/// - `file`: a single child is forwarded to directly, several through a
///   fan-out
/// - `out_of_process`: children run on the worker thread
/// - `network` / `log`: children receive the same batches via a fan-out
pub fn create_backend<'a>(
    config: &'a BackendConfig,
    context: &'a BackendContext,
) -> BoxFuture<'a, Result<Box<dyn LogBackend>, DispatcherError>> {
    async move {
        let mut children = Vec::with_capacity(config.children.len());
        for child in &config.children {
            children.push(create_backend(child, context).await?);
        }
        debug!(
            backend = %config.name,
            backend_type = ?config.backend_type,
            children = children.len(),
            "Creating backend"
        );

        let backend: Box<dyn LogBackend> = match config.backend_type {
            BackendType::File => {
                let file = FileBackend::from_params(&config.name, &config.params)?;
                match combine(&config.name, children) {
                    Some(child) => Box::new(file.with_child(child)),
                    None => Box::new(file),
                }
            }
            BackendType::OutOfProcess => {
                let worker_config = OutOfProcessConfig::from_params(&config.name, &config.params)?;
                Box::new(OutOfProcessBackend::spawn(
                    &config.name,
                    worker_config,
                    children,
                )?)
            }
            BackendType::Network => {
                let network_config = NetworkBackendConfig::from_params(
                    &config.name,
                    &config.params,
                    context.bus_frontend,
                    &context.session,
                )?;
                let network =
                    NetworkBackend::connect(&config.name, network_config, context.kv.clone())
                        .await
                        .map_err(|e| DispatcherError::backend_creation(&config.name, e.to_string()))?;
                with_children(&config.name, Box::new(network), children)
            }
            BackendType::Log => {
                with_children(&config.name, Box::new(TraceBackend::new(&config.name)), children)
            }
        };
        Ok(backend)
    }
    .boxed()
}

/// Build every root backend; several roots are wrapped in a fan-out
#[instrument(name = "create_root_backend", skip_all, fields(roots = blueprint.backends.len()))]
pub async fn create_root_backend(
    blueprint: &TelemetryBlueprint,
    context: &BackendContext,
) -> Result<Box<dyn LogBackend>, DispatcherError> {
    let mut roots = Vec::with_capacity(blueprint.backends.len());
    for config in &blueprint.backends {
        roots.push(create_backend(config, context).await?);
    }
    match roots.len() {
        0 => Err(DispatcherError::backend_creation(
            "root",
            "no backends configured",
        )),
        1 => Ok(roots.remove(0)),
        _ => Ok(Box::new(FanoutBackend::new("root", roots))),
    }
}

fn combine(name: &str, mut children: Vec<Box<dyn LogBackend>>) -> Option<Box<dyn LogBackend>> {
    match children.len() {
        0 => None,
        1 => children.pop(),
        _ => Some(Box::new(FanoutBackend::new(
            format!("{name}-children"),
            children,
        ))),
    }
}

fn with_children(
    name: &str,
    parent: Box<dyn LogBackend>,
    children: Vec<Box<dyn LogBackend>>,
) -> Box<dyn LogBackend> {
    if children.is_empty() {
        return parent;
    }
    let mut all = Vec::with_capacity(children.len() + 1);
    all.push(parent);
    all.extend(children);
    Box::new(FanoutBackend::new(name, all))
}
