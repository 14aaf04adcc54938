use std::time::Duration;

use log::LevelFilter;

/// Levels at which catalog round trips are logged.
#[derive(Clone, Debug)]
pub struct LogSettings {
    pub statements_level: LevelFilter,
    pub slow_statements_level: LevelFilter,
    pub slow_statements_duration: Duration,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            statements_level: LevelFilter::Debug,
            slow_statements_level: LevelFilter::Warn,
            slow_statements_duration: Duration::from_secs(1),
        }
    }
}

impl LogSettings {
    pub fn log_statements(&mut self, level: LevelFilter) {
        self.statements_level = level;
    }

    pub fn log_slow_statements(&mut self, level: LevelFilter, duration: Duration) {
        self.slow_statements_level = level;
        self.slow_statements_duration = duration;
    }
}

/// Options for a [`TypeResolver`](crate::TypeResolver).
///
/// ```rust
/// use std::time::Duration;
/// use log::LevelFilter;
/// use pg_typegraph::ResolverOptions;
///
/// let options = ResolverOptions::new()
///     .log_statements(LevelFilter::Trace)
///     .log_slow_statements(LevelFilter::Info, Duration::from_millis(250));
/// ```
#[derive(Clone, Debug, Default)]
pub struct ResolverOptions {
    pub(crate) log_settings: LogSettings,
}

impl ResolverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log every catalog round trip at `level`.
    pub fn log_statements(mut self, level: LevelFilter) -> Self {
        self.log_settings.log_statements(level);
        self
    }

    /// Log catalog round trips that take longer than `duration` at `level`.
    pub fn log_slow_statements(mut self, level: LevelFilter, duration: Duration) -> Self {
        self.log_settings.log_slow_statements(level, duration);
        self
    }

    /// Turn off round trip logging entirely.
    pub fn disable_statement_logging(mut self) -> Self {
        self.log_settings.log_statements(LevelFilter::Off);
        self.log_settings
            .log_slow_statements(LevelFilter::Off, Duration::default());
        self
    }

    pub fn log_settings(&self) -> &LogSettings {
        &self.log_settings
    }
}
