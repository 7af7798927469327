use anyhow::Error;
use tracing_subscriber::EnvFilter;

/// init_tracing installs the global fmt subscriber.
///
/// `RUST_LOG` wins over `default_filter` when it is set. Installing a second
/// global subscriber is reported as an error instead of panicking.
///
/// # Arguments
/// * `default_filter` - filter directive, e.g. `info` or `rs_gesture_pipeline=debug`
///
/// # Returns
/// * `Result<(), Error>`
pub fn init_tracing(default_filter: &str) -> Result<(), Error> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(Error::msg)
}

#[cfg(test)]
mod tests {
    use crate::utils::logging::init_tracing;

    #[test]
    fn test_init_tracing_twice_does_not_panic() {
        let _ = init_tracing("debug");
        assert!(init_tracing("debug").is_err());
    }
}
