use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tracing::{error, warn};
use tracing::{level_filters::LevelFilter, Subscriber};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Logs an error with some context on its way up, without breaking the `?` chain.
pub trait LogMe<T> {
    fn log_warn<C: Display + Send + Sync + 'static>(self, context_msg: C) -> anyhow::Result<T>;
    fn log_error<C: Display + Send + Sync + 'static>(self, context_msg: C) -> anyhow::Result<T>;
}

// Logged as "{context_msg}: {cause}"
impl<T, Error: Into<anyhow::Error> + Display + Send + Sync + 'static> LogMe<T>
    for Result<T, Error>
{
    fn log_warn<C: Display + Send + Sync + 'static>(self, context_msg: C) -> anyhow::Result<T> {
        match self {
            Err(e) => {
                let ae: anyhow::Error = e.into();
                let ae = ae.context(context_msg);
                warn!("{:#}", ae);
                Err(ae)
            }
            Ok(t) => Ok(t),
        }
    }

    fn log_error<C: Display + Send + Sync + 'static>(self, context_msg: C) -> anyhow::Result<T> {
        match self {
            Err(e) => {
                let ae: anyhow::Error = e.into();
                let ae = ae.context(context_msg);
                error!("{:#}", ae);
                Err(ae)
            }
            Ok(t) => Ok(t),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TracingMode {
    /// Human readable lines, for local runs
    Full,
    /// One JSON object per event, for log collectors
    Json,
}

/// Setup tracing - stdout subscriber
/// Defaults to INFO. HTTP plumbing stays at INFO even if RUST_LOG asks for more, unless it
/// names hyper or reqwest explicitly.
pub fn setup_tracing(mode: TracingMode) -> Result<()> {
    let mut filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;

    let var = std::env::var("RUST_LOG").unwrap_or_default();
    if !var.contains("hyper") {
        filter = filter.add_directive("hyper=info".parse()?);
    }
    if !var.contains("reqwest") {
        filter = filter.add_directive("reqwest=info".parse()?);
    }

    // Can't use match inline because these are different return types
    match mode {
        TracingMode::Full => register_global_subscriber(filter, tracing_subscriber::fmt::layer()),
        TracingMode::Json => register_global_subscriber(
            filter,
            tracing_subscriber::fmt::layer().event_format(tracing_subscriber::fmt::format().json()),
        ),
    };

    Ok(())
}

fn register_global_subscriber<T, S>(filter: EnvFilter, fmt_layer: T)
where
    S: Subscriber,
    T: tracing_subscriber::Layer<S> + Send + Sync,
    tracing_subscriber::filter::Filtered<T, tracing_subscriber::EnvFilter, S>:
        tracing_subscriber::Layer<tracing_subscriber::Registry>,
{
    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(filter))
        .init();
}
