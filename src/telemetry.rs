//! Tracing initialisation shared by the `chatforge` and `cfeval` binaries.
//!
//! Logs always go to stderr so stdout stays machine-readable.

use std::io::{self, IsTerminal};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// How much the process should log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Nothing but fatal errors, which the binaries print themselves.
    Quiet,
    /// `RUST_LOG`, or warnings when it is unset.
    #[default]
    Normal,
    /// Debug events from this crate.
    Verbose,
}

impl Verbosity {
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => Self::Quiet,
            (false, true) => Self::Verbose,
            (false, false) => Self::Normal,
        }
    }

    fn filter(self) -> EnvFilter {
        match self {
            Self::Quiet => EnvFilter::new("off"),
            Self::Verbose => EnvFilter::new("warn,chatforge=debug,cfeval=debug"),
            Self::Normal => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        }
    }
}

/// Installs the global subscriber. Later calls are ignored.
pub fn init_tracing(verbosity: Verbosity) {
    tracing_subscriber::registry()
        .with(verbosity.filter())
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(io::stderr().is_terminal())
                .with_target(false),
        )
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::Verbosity;

    #[test]
    fn quiet_wins_over_verbose() {
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(false, true), Verbosity::Quiet);
    }

    #[test]
    fn verbose_alone_enables_debug() {
        assert_eq!(Verbosity::from_flags(true, false), Verbosity::Verbose);
    }

    #[test]
    fn no_flags_mean_normal() {
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
    }
}
