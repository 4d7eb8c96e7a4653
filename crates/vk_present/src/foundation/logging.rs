//! Logging setup on top of the `log` facade

pub use log::{debug, error, info, trace, warn, LevelFilter};

/// Initialize the logging system with a default level.
///
/// `RUST_LOG` still wins for any module it names, so a quiet default can be
/// overridden per run without touching the config file.
pub fn init(default_level: LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .try_init();
}

/// Parse a level name from configuration, falling back to `Info`
#[must_use]
pub fn level_from_str(name: &str) -> LevelFilter {
    name.parse().unwrap_or(LevelFilter::Info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        assert_eq!(level_from_str("debug"), LevelFilter::Debug);
        assert_eq!(level_from_str("WARN"), LevelFilter::Warn);
        assert_eq!(level_from_str("not-a-level"), LevelFilter::Info);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init(LevelFilter::Debug);
        init(LevelFilter::Trace);
    }
}
