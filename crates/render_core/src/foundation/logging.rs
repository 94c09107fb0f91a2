//! Logging setup and re-exported log macros

pub use log::{debug, error, info, trace, warn};

/// Initialize `env_logger` using `RUST_LOG`, or `default_level` when it is unset.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(default_level: &str) {
    let env = env_logger::Env::default().default_filter_or(default_level);
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}

/// Initialize logging for tests, capturing output per test.
#[cfg(test)]
pub fn init_for_tests() {
    let _ = env_logger::builder().is_test(true).try_init();
}
