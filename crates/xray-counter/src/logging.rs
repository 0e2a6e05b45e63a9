use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing.
///
/// `RUST_LOG` wins when set; otherwise the crate logs at `info`, or `debug`
/// when verbose output was requested on the command line or in config.
pub fn init(verbose: bool) {
    let default_directive = if verbose {
        "xray_counter=debug"
    } else {
        "xray_counter=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}
