//! Dermascan: client-side scan capture-and-analysis pipeline.
//!
//! A frontend drives [`scan::ScanPipeline`] and renders the [`scan::ScanView`]
//! it returns. The remote inference backend sits behind
//! [`scan::ScanBackend`]. Authentication sits behind
//! [`session::SessionContext`].

pub mod config;
pub mod scan;
pub mod session;

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set, otherwise `config::default_log_filter()`.
/// Calling it again (or after the host installed its own) is a no-op.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
    }
}
