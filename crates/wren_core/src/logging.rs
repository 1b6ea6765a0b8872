//! Logging Setup
//!
//! `RUST_LOG` wins over the default filter when it is set.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "wren=debug";

/// Install the fmt subscriber with the default filter
pub fn init() -> bool {
    init_with_filter(DEFAULT_FILTER)
}

/// Install the fmt subscriber
///
/// Returns false if a global subscriber was already installed.
pub fn init_with_filter(default: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init_with_filter("wren=info");
        assert!(!init());
    }
}
