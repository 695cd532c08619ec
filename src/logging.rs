use tracing::level_filters::LevelFilter;

/// Maps `-v` repetitions and `--silent` to a log level. Warnings show by default.
pub fn derive_level(verbose: u8, silent: bool) -> LevelFilter {
    if silent {
        return LevelFilter::ERROR;
    }
    match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Installs the stderr subscriber. A second call is a no-op.
pub fn init_logging(level: LevelFilter) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
