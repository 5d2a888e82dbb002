use log::SetLoggerError;

/// Install `env_logger` with an `info` default, overridable via `RUST_LOG`.
/// A second call returns an error and leaves the first logger in place.
pub fn init() -> Result<(), SetLoggerError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init()
}
