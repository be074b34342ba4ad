use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "retouch_core=debug,retouch_store=info,warn";

/// Install the global `tracing` subscriber (respects `RUST_LOG`).
///
/// Returns `false` if a subscriber was already installed, e.g. by the
/// embedding application.
pub fn init_tracing() -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init_tracing();
        assert!(!init_tracing());
    }
}
