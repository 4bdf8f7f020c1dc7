//! Telemetry helpers: the fmt subscriber and an optional Chrome trace layer.

use std::path::{Path, PathBuf};

use tracing_subscriber::{
    filter::{EnvFilter, filter_fn},
    fmt,
    layer::SubscriberExt,
    prelude::*,
};

use crate::pipeline::config::TelemetryOptions;

/// Guard returned when a telemetry subscriber has been installed for the current thread.
///
/// Threads started through `handoff::spawn_thread` inherit it.
pub struct TelemetryGuard {
    _default_guard: tracing::subscriber::DefaultGuard,
    chrome_guard: Option<tracing_chrome::FlushGuard>,
    chrome_trace_path: Option<PathBuf>,
}

impl TelemetryGuard {
    pub fn chrome_trace_path(&self) -> Option<&Path> {
        self.chrome_trace_path.as_deref()
    }
}

fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }))
}

/// Install tracing subscribers for the run based on telemetry options.
pub fn enter_runtime(opts: &TelemetryOptions) -> TelemetryGuard {
    let env_filter = default_filter(opts.verbose);

    let (chrome_layer_opt, chrome_guard) = if let Some(path) = opts.chrome_trace_path.as_ref() {
        match build_chrome_layer(path) {
            Ok((layer, guard)) => (Some(layer), Some(guard)),
            Err(err) => {
                eprintln!(
                    "failed to initialise chrome trace writer at {}: {err}",
                    path.display()
                );
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    let span_only_filter = filter_fn(|metadata| metadata.is_span());

    let default_guard = match chrome_layer_opt {
        Some(chrome) => tracing::subscriber::set_default(
            tracing_subscriber::registry()
                .with(chrome.with_filter(span_only_filter))
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_timer(fmt::time::uptime())
                        .with_filter(env_filter),
                ),
        ),
        None => tracing::subscriber::set_default(
            tracing_subscriber::registry().with(
                fmt::layer()
                    .with_target(false)
                    .with_timer(fmt::time::uptime())
                    .with_filter(env_filter),
            ),
        ),
    };

    TelemetryGuard {
        _default_guard: default_guard,
        chrome_guard,
        chrome_trace_path: opts.chrome_trace_path.clone(),
    }
}

fn build_chrome_layer(
    path: &Path,
) -> Result<
    (
        tracing_chrome::ChromeLayer<tracing_subscriber::Registry>,
        tracing_chrome::FlushGuard,
    ),
    std::io::Error,
> {
    let file = std::fs::File::create(path)?;
    let (layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
        .writer(file)
        .include_args(true)
        .trace_style(tracing_chrome::TraceStyle::Threaded)
        .build();
    Ok((layer, guard))
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(guard) = self.chrome_guard.take() {
            guard.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chrome_trace_is_written_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.json");
        let guard = enter_runtime(&TelemetryOptions {
            chrome_trace_path: Some(path.clone()),
            verbose: false,
        });
        assert_eq!(guard.chrome_trace_path(), Some(path.as_path()));
        {
            let _span = tracing::info_span!("test.span").entered();
            tracing::info!("inside span");
        }
        drop(guard);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("test.span"), "{contents}");
    }

    #[test]
    fn unwritable_chrome_path_still_installs_fmt() {
        let guard = enter_runtime(&TelemetryOptions {
            chrome_trace_path: Some(PathBuf::from("/nonexistent-dir/trace.json")),
            verbose: true,
        });
        tracing::debug!("still logging");
        drop(guard);
    }
}
