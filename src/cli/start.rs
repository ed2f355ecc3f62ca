use crate::cli::{actions::Action, commands, dispatch::handler, telemetry};
use anyhow::Result;

/// `-v` INFO, `-vv` DEBUG, `-vvv` and up TRACE; quiet by default.
const fn verbosity_level(count: u8) -> Option<tracing::Level> {
    match count {
        0 => None,
        1 => Some(tracing::Level::INFO),
        2 => Some(tracing::Level::DEBUG),
        _ => Some(tracing::Level::TRACE),
    }
}

/// Parse the command line, initialize telemetry and return the action to
/// run.
///
/// # Errors
///
/// Returns an error if telemetry initialization or argument handling
/// fails.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    telemetry::init(verbosity_level(matches.get_count("verbose")))?;

    handler(&matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_quiet_by_default() {
        assert_eq!(verbosity_level(0), None);
    }

    #[test]
    fn test_verbosity_steps() {
        assert_eq!(verbosity_level(1), Some(tracing::Level::INFO));
        assert_eq!(verbosity_level(2), Some(tracing::Level::DEBUG));
        assert_eq!(verbosity_level(3), Some(tracing::Level::TRACE));
    }

    #[test]
    fn test_verbosity_saturates_at_trace() {
        assert_eq!(verbosity_level(9), Some(tracing::Level::TRACE));
        assert_eq!(verbosity_level(u8::MAX), Some(tracing::Level::TRACE));
    }
}
