//! Logging setup for the acpctl CLI
//!
//! Structured logging through `tracing`, configured from the global
//! `--verbose` / `--quiet` flags. The env filter honors `RUST_LOG` when
//! set, so operators can raise individual targets without flags.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber.
///
/// Verbose enables debug-level output with targets; quiet raises the floor
/// to errors only. Initialization is best-effort: a second call (as happens
/// in tests) is a no-op.
pub fn init_tracing(verbose: bool, quiet: bool) {
    let default_filter = if quiet {
        "acpctl=error,error"
    } else if verbose {
        "acpctl=debug,info"
    } else {
        "acpctl=info,warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = fmt::layer()
        .with_target(verbose)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact();

    // try_init fails if a subscriber is already installed; that is fine.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init();
}
