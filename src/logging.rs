//! Log output for the `reposearch` binary.
//!
//! Logs go to stderr so stdout stays parseable for scripts. `RUST_LOG`
//! overrides the level picked from `-v` flags.

use tracing_subscriber::EnvFilter;

pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "reposearch=warn",
        1 => "reposearch=info",
        2 => "reposearch=debug",
        _ => "reposearch=trace",
    }
}

pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    // A subscriber may already be installed (e.g. by an embedding program).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
