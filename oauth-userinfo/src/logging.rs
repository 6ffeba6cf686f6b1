//! Tracing subscriber setup.
//!
//! Logs go to stderr; stdout carries only the profile output.

use tracing_subscriber::EnvFilter;

use crate::cli::LogFormat;

/// Default filter directive for a `-v` count. `RUST_LOG` takes precedence.
pub fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Install the global subscriber.
pub fn init(format: LogFormat, verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "warn")]
    #[case(1, "info")]
    #[case(2, "debug")]
    #[case(7, "debug")]
    fn test_default_directive(#[case] verbose: u8, #[case] expected: &str) {
        assert_eq!(default_directive(verbose), expected);
    }
}
