use std::time::Instant;

use crate::options::LogSettings;

const TARGET: &str = "pg_typegraph::catalog";

// `tracing` does not support dynamic levels
// https://github.com/tokio-rs/tracing/issues/372
macro_rules! tracing_dynamic_enabled {
    (target: $target:expr, $level:expr) => {{
        use ::tracing::Level;

        match $level {
            Level::ERROR => ::tracing::enabled!(target: $target, Level::ERROR),
            Level::WARN => ::tracing::enabled!(target: $target, Level::WARN),
            Level::INFO => ::tracing::enabled!(target: $target, Level::INFO),
            Level::DEBUG => ::tracing::enabled!(target: $target, Level::DEBUG),
            Level::TRACE => ::tracing::enabled!(target: $target, Level::TRACE),
        }
    }};
}

macro_rules! tracing_dynamic_event {
    (target: $target:expr, $level:expr, $($args:tt)*) => {{
        use ::tracing::Level;

        match $level {
            Level::ERROR => ::tracing::event!(target: $target, Level::ERROR, $($args)*),
            Level::WARN => ::tracing::event!(target: $target, Level::WARN, $($args)*),
            Level::INFO => ::tracing::event!(target: $target, Level::INFO, $($args)*),
            Level::DEBUG => ::tracing::event!(target: $target, Level::DEBUG, $($args)*),
            Level::TRACE => ::tracing::event!(target: $target, Level::TRACE, $($args)*),
        }
    }};
}

fn level_filter_to_levels(filter: log::LevelFilter) -> Option<(tracing::Level, log::Level)> {
    let tracing_level = match filter {
        log::LevelFilter::Error => Some(tracing::Level::ERROR),
        log::LevelFilter::Warn => Some(tracing::Level::WARN),
        log::LevelFilter::Info => Some(tracing::Level::INFO),
        log::LevelFilter::Debug => Some(tracing::Level::DEBUG),
        log::LevelFilter::Trace => Some(tracing::Level::TRACE),
        log::LevelFilter::Off => None,
    };

    tracing_level.zip(filter.to_level())
}

/// Times one catalog round trip and logs it when dropped.
pub(crate) struct RoundTripLogger<'s> {
    lookup: &'static str,
    batch_size: usize,
    rows_returned: usize,
    start: Instant,
    settings: &'s LogSettings,
}

impl<'s> RoundTripLogger<'s> {
    pub(crate) fn new(lookup: &'static str, batch_size: usize, settings: &'s LogSettings) -> Self {
        Self {
            lookup,
            batch_size,
            rows_returned: 0,
            start: Instant::now(),
            settings,
        }
    }

    pub(crate) fn set_rows_returned(&mut self, n: usize) {
        self.rows_returned = n;
    }

    fn finish(&self) {
        let elapsed = self.start.elapsed();

        let was_slow = elapsed >= self.settings.slow_statements_duration;

        let lvl = if was_slow {
            self.settings.slow_statements_level
        } else {
            self.settings.statements_level
        };

        let Some((tracing_level, log_level)) = level_filter_to_levels(lvl) else {
            return;
        };

        // the level may be enabled from either the `tracing` or the `log` side
        let enabled = log::log_enabled!(target: TARGET, log_level)
            || tracing_dynamic_enabled!(target: TARGET, tracing_level);

        if !enabled {
            return;
        }

        if was_slow {
            tracing_dynamic_event!(
                target: TARGET,
                tracing_level,
                lookup = self.lookup,
                batch_size = self.batch_size,
                rows_returned = self.rows_returned,
                ?elapsed,
                elapsed_secs = elapsed.as_secs_f64(),
                slow_threshold = ?self.settings.slow_statements_duration,
                "slow catalog lookup: execution time exceeded alert threshold"
            );
        } else {
            tracing_dynamic_event!(
                target: TARGET,
                tracing_level,
                lookup = self.lookup,
                batch_size = self.batch_size,
                rows_returned = self.rows_returned,
                ?elapsed,
                elapsed_secs = elapsed.as_secs_f64(),
                "catalog lookup"
            );
        }
    }
}

impl Drop for RoundTripLogger<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}
