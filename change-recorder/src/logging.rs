use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// Debug builds log this crate at debug level and everything else at info;
/// `RUST_LOG` overrides either. Does nothing if a subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("change_recorder=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
