//! Logging setup.
//!
//! The library only emits `tracing` events; hosts call [`init`] once (or
//! install their own subscriber).

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is not set
#[cfg(not(feature = "verbose-logging"))]
pub const DEFAULT_FILTER: &str = "hearth_core=info";

/// Default filter when `RUST_LOG` is not set
#[cfg(feature = "verbose-logging")]
pub const DEFAULT_FILTER: &str = "hearth_core=debug";

/// Install a fmt subscriber honouring `RUST_LOG`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let _ = init();
        assert!(!init());
    }
}
