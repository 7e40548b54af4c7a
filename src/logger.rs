use env_logger::Env;

/// Initializes logging: `info` by default, `debug` with `--verbose`; `RUST_LOG` wins when set.
pub fn init_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}
