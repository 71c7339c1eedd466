//! Tracing setup

use tracing_subscriber::EnvFilter;

/// Filter for a given number of `-v` flags; `RUST_LOG` wins when set
fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "yt_batch=warn",
        1 => "yt_batch=info",
        2 => "yt_batch=debug",
        _ => "yt_batch=trace",
    }
}

/// Log to stderr so stdout stays clean for the summary
pub fn init_tracing(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
