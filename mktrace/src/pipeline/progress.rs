// SPDX-License-Identifier: GPL-3.0-or-later

/// What a long running configure reports to its observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// The configure entered a new step.
    Status(String),
    /// A unit of work finished within the current step.
    Increment,
}

#[cfg_attr(test, mockall::automock)]
pub trait ProgressReporter {
    fn report(&self, progress: Progress);
}

/// Reports the progress into the log.
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report(&self, progress: Progress) {
        match progress {
            Progress::Status(message) => log::info!("{message}"),
            Progress::Increment => log::trace!("progress"),
        }
    }
}
