//! Shared helpers for flowdag's integration tests: tracing setup, a bounded
//! wait, workflow builders, a fake executor backend and a scripted handler.

pub mod builders;
pub mod fake_executor;
pub mod scripted;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use flowdag::logging::LOG_ENV_VAR;
use tracing_subscriber::{EnvFilter, fmt};

/// Upper bound for any single workflow run in the test suites.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

static INIT: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
///
/// The filter comes from `FLOWDAG_LOG` (e.g. `FLOWDAG_LOG=flowdag=debug`),
/// falling back to warnings only. Output is captured by the harness and shown
/// for failing tests.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = std::env::var(LOG_ENV_VAR)
            .ok()
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new("warn"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Await `f`, panicking if it takes longer than [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("test did not finish within {TEST_TIMEOUT:?}"),
    }
}
