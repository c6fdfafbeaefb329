use crate::answer::RetryPolicy;
use crate::dataset::Dataset;
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::path::Path;

/// Initialize the logger
///
/// Logs at `info` by default and `debug` when verbose; `RUST_LOG` overrides
/// both. Calling this twice is harmless.
pub fn init_logger(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let result = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_module_path(false)
        .try_init();

    if result.is_ok() {
        debug!("Logger initialized with level: {level:?}");
    }
}

/// Log what was loaded at startup
pub fn log_dataset_info(path: &Path, dataset: &Dataset) {
    info!(
        "Loaded {} student records from {} ({} columns)",
        dataset.len(),
        path.display(),
        dataset.headers().len()
    );
    debug!("Columns: {}", dataset.headers().join(", "));
}

/// Log the answer service settings
pub fn log_service_info(model: &str, policy: &RetryPolicy) {
    info!("Model: {model}");
    info!(
        "Retry: attempts={}, base_delay={}ms, max_delay={}s",
        policy.max_attempts,
        policy.base_delay.as_millis(),
        policy.max_delay.as_secs()
    );
}

/// Log where the server is reachable
pub fn log_listening(addr: SocketAddr) {
    info!("Listening on http://{addr}");
}

/// Warn about the development cookie secret
pub fn log_insecure_secret() {
    warn!("FLASK_SECRET is not set; using an insecure development secret for CSRF cookies");
}
