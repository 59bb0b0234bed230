use tracing_subscriber::EnvFilter;

/// Initialise logging from the CLI verbosity count: 0 maps to `info`,
/// 1 to `debug`, 2+ to `trace`. `RUST_LOG` overrides the computed level
/// when set.
pub fn init(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
