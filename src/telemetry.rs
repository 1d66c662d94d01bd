//! Logging setup for the binary and the task-local context of connection runs.

use std::sync::atomic::{AtomicBool, Ordering};

use log::LevelFilter;
use thiserror::Error;
use tokio::task_local;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::Layer,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};
use uuid::Uuid;

use crate::config::AppConfig;

/// Identifies one connection run, or one callback server request.
#[derive(Debug, Clone, Copy)]
pub struct RunContext {
    pub run_id: Uuid,
}

task_local! {
    static ACTIVE_RUN_CONTEXT: RunContext;
}

#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("could not forward `log` records to tracing: {0}")]
    LogTracer(#[from] log::SetLoggerError),
    #[error("could not install the tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install the global subscriber. `RUST_LOG` overrides `log_level`; `log_format`
/// picks `pretty` output, anything else logs JSON lines. Later calls are no-ops.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryInitError> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let output = if config.log_format == "pretty" {
        fmt::layer().pretty().boxed()
    } else {
        fmt::layer().json().boxed()
    };

    // reqwest and hyper log through the `log` facade.
    let installed = LogTracer::builder()
        .with_max_level(LevelFilter::Trace)
        .init()
        .map_err(TelemetryInitError::from)
        .and_then(|()| {
            tracing_subscriber::registry()
                .with(filter)
                .with(output)
                .try_init()
                .map_err(TelemetryInitError::from)
        });

    if installed.is_err() {
        INSTALLED.store(false, Ordering::SeqCst);
    }
    installed
}

/// Execute `future` with `context` available through task-local storage.
pub async fn with_run_context<Fut, R>(context: RunContext, future: Fut) -> R
where
    Fut: std::future::Future<Output = R>,
{
    ACTIVE_RUN_CONTEXT.scope(context, future).await
}

/// Run id of the sequencer run executing on the current task, if any.
pub fn current_run_id() -> Option<Uuid> {
    ACTIVE_RUN_CONTEXT.try_with(|ctx| ctx.run_id).ok()
}
