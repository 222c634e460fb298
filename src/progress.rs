//! Progress reporting for long-running operations.
//!
//! Components that iterate over whole experiments expose a
//! [`ProgressLogger`] whose behavior is selected with [`LogType`]. Reporting
//! must stay cheap and non-blocking; inside parallel sections callers either
//! disable it or confine updates to a single thread.
use std::io::Write;
use std::time::Instant;

/// Where progress events are routed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LogType {
    /// Discard all events.
    #[default]
    None,
    /// Write to standard output.
    Cout,
    /// Write to standard error.
    Cerr,
    /// Route through the `log` facade at `info` level.
    Progress,
}

#[derive(Debug, Default)]
pub struct ProgressLogger {
    log_type: LogType,
    label: String,
    total: u64,
    last_percent: i8,
    started: Option<Instant>,
}

impl ProgressLogger {
    pub fn new(log_type: LogType) -> Self {
        Self {
            log_type,
            last_percent: -1,
            ..Default::default()
        }
    }

    pub fn set_log_type(&mut self, log_type: LogType) {
        self.log_type = log_type;
    }

    pub fn log_type(&self) -> LogType {
        self.log_type
    }

    /// Begin a progress block of `total` steps.
    pub fn start_progress(&mut self, label: &str, total: u64) {
        self.label = label.to_string();
        self.total = total.max(1);
        self.last_percent = -1;
        self.started = Some(Instant::now());
        self.emit(&format!("{}: started", label));
    }

    /// Report that `current` of the announced steps have completed. Only
    /// whole-percent transitions produce output.
    pub fn set_progress(&mut self, current: u64) {
        let percent = ((current * 100) / self.total).min(100) as i8;
        if percent != self.last_percent {
            self.last_percent = percent;
            let label = self.label.clone();
            self.emit(&format!("{}: {}%", label, percent));
        }
    }

    pub fn end_progress(&mut self) {
        let elapsed = self
            .started
            .take()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or_default();
        let label = self.label.clone();
        self.emit(&format!("{}: done ({:.2} s)", label, elapsed));
    }

    fn emit(&self, message: &str) {
        match self.log_type {
            LogType::None => {}
            LogType::Cout => {
                let mut out = std::io::stdout().lock();
                let _ = writeln!(out, "{}", message);
            }
            LogType::Cerr => {
                let mut out = std::io::stderr().lock();
                let _ = writeln!(out, "{}", message);
            }
            LogType::Progress => log::info!("{}", message),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_progress_lifecycle() {
        let mut logger = ProgressLogger::new(LogType::None);
        logger.start_progress("scoring", 250);
        for i in 0..=250 {
            logger.set_progress(i);
        }
        assert_eq!(logger.last_percent, 100);
        logger.end_progress();
        assert!(logger.started.is_none());
    }

    #[test]
    fn test_zero_total_does_not_divide_by_zero() {
        let mut logger = ProgressLogger::new(LogType::None);
        logger.start_progress("empty", 0);
        logger.set_progress(0);
        logger.end_progress();
    }
}
