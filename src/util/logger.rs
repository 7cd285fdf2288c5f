//! This module provides a built-in logger implementation.
//!
//! The built-in logger implementation uses the `env_logger` crate.  It is
//! enabled by the Cargo feature "builtin_env_logger" which is enabled by
//! default.  When enabled, it will be initialized when a
//! [`Collector`](crate::Collector) is created and will show logs of levels
//! INFO or lower (the lower, the more important).
//!
//! This provides a convenient out-of-the-box experience so embedders can see
//! what the collector is doing without configuration, and can adjust log
//! levels from environment variables.  An embedder that already routes `log`
//! records through its own framework can disable the Cargo feature
//! "builtin_env_logger" and register its own implementation with the `log`
//! crate before starting a collector.

/// Attempt to init a env_logger for the collector.
/// Does nothing if the "builtin_env_logger" feature is disabled.
pub(crate) fn try_init() {
    cfg_if::cfg_if! {
        if #[cfg(feature = "builtin_env_logger")] {
            let result = env_logger::try_init_from_env(
                // By default, show info level logging.
                env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
            );

            match result {
                Ok(()) => {
                    debug!("tlgc initialized the logger.");
                }
                Err(e) => {
                    // `log::SetLoggerError` is only raised when a logger has
                    // already been initialized, possibly by the embedder.
                    debug!("tlgc did not initialize the built-in env_logger: {e}");
                }
            }
        } else {
            debug!("tlgc didn't initialize the built-in env_logger.  The Cargo feature \"builtin_env_logger\" is not enabled.");
        }
    }
}
