//! Tracing setup and console status symbols.

use crate::config::Environment;
use tracing_subscriber::EnvFilter;

/// Symbol logged next to a successful lifecycle step.
pub const SUCCESS: &str = "✔";
/// Symbol logged next to a failed lifecycle step.
pub const FAILURE: &str = "✘";

pub fn status_symbol(ok: bool) -> &'static str {
    if ok {
        SUCCESS
    } else {
        FAILURE
    }
}

/// Default filter directive when `RUST_LOG` is not set.
fn default_directive(env: &Environment) -> &'static str {
    if env.debug {
        "warn,fixtures=debug"
    } else {
        "warn"
    }
}

/// Install a fmt subscriber writing through the test harness's capture.
///
/// `RUST_LOG` takes precedence; otherwise this crate logs at debug level when
/// the environment's debug flag is set. Safe to call from every test: only
/// the first call installs a subscriber.
pub fn init(env: &Environment) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directive(env))),
        )
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_raises_crate_level() {
        assert_eq!(default_directive(&Environment::default()), "warn");
        assert!(default_directive(&Environment::default().with_debug(true)).contains("fixtures=debug"));
    }

    #[test]
    fn init_twice_is_harmless() {
        init(&Environment::default());
        init(&Environment::default());
    }
}
