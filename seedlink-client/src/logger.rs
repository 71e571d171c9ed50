/// Leveled log severity, mirroring the reference 0/1/2+ scheme
/// (normal / diagnostic / error).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Info,
    Diagnostic,
    Error,
}

/// Per-connection logger bound to a `verbosity` threshold, forwarding to
/// `tracing`. A process-wide default is available via [`Logger::default()`]
/// for callers that don't need per-connection prefixes.
#[derive(Clone, Debug)]
pub struct Logger {
    verbosity: u8,
    prefix: String,
}

impl Logger {
    pub fn new(prefix: impl Into<String>, verbosity: u8) -> Self {
        Self {
            verbosity,
            prefix: prefix.into(),
        }
    }

    pub fn set_verbosity(&mut self, verbosity: u8) {
        self.verbosity = verbosity;
    }

    /// Emit a leveled, verbosity-gated log line.
    ///
    /// `Info` always logs; `Diagnostic` only logs once `verbosity >= 1`;
    /// `Error` always logs regardless of verbosity.
    pub fn log(&self, level: LogLevel, verbosity: u8, message: &str) {
        match level {
            LogLevel::Error => tracing::error!(prefix = %self.prefix, "{message}"),
            LogLevel::Info => tracing::info!(prefix = %self.prefix, "{message}"),
            LogLevel::Diagnostic if verbosity <= self.verbosity => {
                tracing::debug!(prefix = %self.prefix, "{message}")
            }
            LogLevel::Diagnostic => {}
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new("seedlink", 0)
    }
}
