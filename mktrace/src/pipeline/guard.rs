// SPDX-License-Identifier: GPL-3.0-or-later

//! Mutual exclusion of the operations which run the build tool.
//!
//! Only one build tool process runs at a time: while any operation is in
//! flight, every other request fails fast (`Blocked`), the requests are not
//! queued.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

const IDLE: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Configure,
    Build,
    PreConfigure,
}

impl Operation {
    fn code(self) -> u8 {
        match self {
            Operation::Configure => 1,
            Operation::Build => 2,
            Operation::PreConfigure => 3,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Operation::Configure),
            2 => Some(Operation::Build),
            3 => Some(Operation::PreConfigure),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Configure => write!(f, "configure"),
            Operation::Build => write!(f, "build"),
            Operation::PreConfigure => write!(f, "pre-configure"),
        }
    }
}

/// The operation in flight, if any.
#[derive(Debug, Default)]
pub struct OperationGuards {
    running: AtomicU8,
}

impl OperationGuards {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the operation as in flight, or `None` when any operation already is.
    /// The operation is released when the returned guard is dropped.
    pub fn try_begin(&self, operation: Operation) -> Option<OperationGuard<'_>> {
        match self.running.compare_exchange(IDLE, operation.code(), Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => Some(OperationGuard { running: &self.running, operation }),
            Err(current) => {
                if let Some(current) = Operation::from_code(current) {
                    log::debug!("Operation {operation} refused, {current} is running.");
                }
                None
            }
        }
    }

    pub fn is_running(&self, operation: Operation) -> bool {
        self.running.load(Ordering::Acquire) == operation.code()
    }

    /// The operation in flight.
    pub fn current(&self) -> Option<Operation> {
        Operation::from_code(self.running.load(Ordering::Acquire))
    }
}

#[derive(Debug)]
pub struct OperationGuard<'a> {
    running: &'a AtomicU8,
    operation: Operation,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        log::debug!("Operation finished: {}", self.operation);
        self.running.store(IDLE, Ordering::Release);
    }
}
