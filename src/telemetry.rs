use std::sync::OnceLock;
use tracing_subscriber::{
    EnvFilter, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

static INIT: OnceLock<()> = OnceLock::new();

/// Install the global tracing subscriber.
///
/// The filter is read from `RUST_LOG` and defaults to `info`. Calling this more than once
/// (e.g. from several integration tests in the same binary) is harmless.
pub fn init_tracing() {
    let _ = INIT.get_or_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(env_filter)
            .try_init();
    });
}
