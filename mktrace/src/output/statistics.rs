// SPDX-License-Identifier: GPL-3.0-or-later

//! Statistics collection for the configure pipeline.
//!
//! The subphases update their own counters while the items flow through, the
//! pipeline logs the summary when the configure finishes.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters of a single configure.
///
/// # Fields by subphase
///
/// - **Preprocess**: `lines_scanned`
/// - **ParseForConfiguration**: `compile_units`, `source_files`
/// - **ParseForLaunchTargets**: `launch_targets`
/// - **ParseForBuildTargets**: `build_targets`
#[derive(Debug, Default)]
pub struct PipelineStatistics {
    /// Number of preprocessed trace lines.
    pub lines_scanned: AtomicUsize,

    /// Number of compile units extracted from the trace.
    pub compile_units: AtomicUsize,

    /// Number of source files with a configuration.
    pub source_files: AtomicUsize,

    /// Number of unique launch targets.
    pub launch_targets: AtomicUsize,

    /// Number of unique build targets.
    pub build_targets: AtomicUsize,
}

impl PipelineStatistics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Zeroes the counters, a new pass counts from the start.
    pub fn reset(&self) {
        for counter in [
            &self.lines_scanned,
            &self.compile_units,
            &self.source_files,
            &self.launch_targets,
            &self.build_targets,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl fmt::Display for PipelineStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Configure pipeline:")?;
        writeln!(f, "  lines scanned: {}", self.lines_scanned.load(Ordering::Relaxed))?;
        writeln!(f, "  compile units: {}", self.compile_units.load(Ordering::Relaxed))?;
        writeln!(f, "  configured files: {}", self.source_files.load(Ordering::Relaxed))?;
        writeln!(f, "  launch targets: {}", self.launch_targets.load(Ordering::Relaxed))?;
        write!(f, "  build targets: {}", self.build_targets.load(Ordering::Relaxed))
    }
}
