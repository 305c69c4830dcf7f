pub mod mock;

#[cfg(test)]
mod add_tables;
#[cfg(test)]
mod snapshot;

/// Opt-in log output for tests run with `--nocapture`; repeated calls are
/// fine, only the first subscriber wins.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
