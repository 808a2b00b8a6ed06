// SPDX-License-Identifier: GPL-3.0-or-later

//! Chunked and cancellable scanning of a trace.
//!
//! Traces of large projects have hundreds of thousands of lines. The parsers
//! process them in fixed-size chunks of lines: between two chunks the thread
//! yields, and the cancellation token is checked. A scan is exposed as an
//! iterator over the recognized items, so the consumer pulls the items lazily
//! and can stop at any time.
//!
//! The items found in a chunk are only released when the chunk completed and
//! no cancellation was requested meanwhile. When the cancellation is observed,
//! the items of the in-flight chunk are dropped and the iterator ends.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// The number of lines processed between two cancellation checks.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// A shared flag to request the cancellation of a long running operation.
///
/// Clones share the same flag. The flag can't be reset.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The underlying flag, for signal handlers to set it.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Returns `Err(Cancelled)` when the cancellation was requested.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() { Err(Cancelled) } else { Ok(()) }
    }
}

/// Marker error of an operation that stopped because of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation was cancelled")]
pub struct Cancelled;

/// A line oriented recognizer.
///
/// The scanner gets the lines of the trace in order, and pushes the recognized
/// items into the `found` buffer. A scanner may keep state between the lines
/// (like the current directory).
pub trait LineScanner {
    type Item;

    fn scan_line(&mut self, line: &str, found: &mut Vec<Self::Item>);

    /// Called once after the last line of the trace.
    fn finish(&mut self, _found: &mut Vec<Self::Item>) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Running,
    Finished,
    Cancelled,
}

/// Iterator over the items a `LineScanner` recognizes in a trace.
pub struct Scan<'a, S: LineScanner> {
    lines: std::str::Lines<'a>,
    scanner: S,
    cancel: CancellationToken,
    chunk_size: usize,
    ready: std::vec::IntoIter<S::Item>,
    state: ScanState,
    lines_scanned: usize,
}

impl<'a, S: LineScanner> Scan<'a, S> {
    pub fn new(trace: &'a str, scanner: S, cancel: &CancellationToken, chunk_size: usize) -> Self {
        Self {
            lines: trace.lines(),
            scanner,
            cancel: cancel.clone(),
            chunk_size: chunk_size.max(1),
            ready: Vec::new().into_iter(),
            state: ScanState::Running,
            lines_scanned: 0,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == ScanState::Cancelled
    }

    pub fn lines_scanned(&self) -> usize {
        self.lines_scanned
    }

    pub fn scanner(&self) -> &S {
        &self.scanner
    }

    /// Drains the scan, returns all items or the cancellation.
    pub fn complete(mut self) -> Result<Vec<S::Item>, Cancelled> {
        let items: Vec<S::Item> = self.by_ref().collect();
        if self.is_cancelled() { Err(Cancelled) } else { Ok(items) }
    }

    /// Scans the next chunk of lines. Returns false when there is nothing
    /// more to release.
    fn next_chunk(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            self.state = ScanState::Cancelled;
            return false;
        }

        let mut found = Vec::new();
        let mut count = 0;
        for line in self.lines.by_ref().take(self.chunk_size) {
            self.scanner.scan_line(line, &mut found);
            count += 1;
        }
        self.lines_scanned += count;
        if count < self.chunk_size {
            self.scanner.finish(&mut found);
            self.state = ScanState::Finished;
        }

        if self.cancel.is_cancelled() {
            log::debug!("Scan cancelled after {} lines", self.lines_scanned);
            self.state = ScanState::Cancelled;
            return false;
        }

        self.ready = found.into_iter();
        std::thread::yield_now();
        true
    }
}

impl<S: LineScanner> Iterator for Scan<'_, S> {
    type Item = S::Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.ready.next() {
                return Some(item);
            }
            if self.state != ScanState::Running || !self.next_chunk() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Recognizes the lines which are numbers.
    struct Numbers;

    impl LineScanner for Numbers {
        type Item = usize;

        fn scan_line(&mut self, line: &str, found: &mut Vec<usize>) {
            if let Ok(number) = line.trim().parse() {
                found.push(number);
            }
        }
    }

    /// Joins all lines into one item at the end.
    #[derive(Default)]
    struct Joiner {
        buffer: String,
    }

    impl LineScanner for Joiner {
        type Item = String;

        fn scan_line(&mut self, line: &str, _found: &mut Vec<String>) {
            self.buffer.push_str(line);
        }

        fn finish(&mut self, found: &mut Vec<String>) {
            found.push(std::mem::take(&mut self.buffer));
        }
    }

    fn numbered_trace(count: usize) -> String {
        (0..count).map(|n| n.to_string()).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn test_scan_yields_all_items() {
        let trace = "1\nfoo\n2\n3\nbar";
        let cancel = CancellationToken::new();
        let sut = Scan::new(trace, Numbers, &cancel, 2);

        assert_eq!(sut.complete(), Ok(vec![1, 2, 3]));
    }

    #[test]
    fn test_scan_empty_trace() {
        let cancel = CancellationToken::new();
        let mut sut = Scan::new("", Numbers, &cancel, 10);

        assert_eq!(sut.next(), None);
        assert_eq!(sut.state(), ScanState::Finished);
    }

    #[test]
    fn test_scan_calls_finish_once() {
        let cancel = CancellationToken::new();
        let sut = Scan::new("a\nb\nc\nd", Joiner::default(), &cancel, 2);

        assert_eq!(sut.complete(), Ok(vec!["abcd".to_string()]));
    }

    #[test]
    fn test_scan_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let sut = Scan::new("1\n2", Numbers, &cancel, 10);

        assert_eq!(sut.complete(), Err(Cancelled));
    }

    #[test]
    fn test_scan_cancelled_in_the_middle() {
        let trace = numbered_trace(10_000);
        let cancel = CancellationToken::new();
        let mut sut = Scan::new(&trace, Numbers, &cancel, 100);

        let mut received = Vec::new();
        for item in sut.by_ref() {
            received.push(item);
            if item == 4_321 {
                cancel.cancel();
            }
        }

        // the chunk in flight is released completely, nothing after
        assert!(sut.is_cancelled());
        assert_eq!(received.len(), 4_400);
        assert_eq!(received.last(), Some(&4_399));
        assert_eq!(sut.lines_scanned(), 4_400);
    }

    #[test]
    fn test_zero_chunk_size_is_usable() {
        let cancel = CancellationToken::new();
        let sut = Scan::new("1\n2", Numbers, &cancel, 0);

        assert_eq!(sut.complete(), Ok(vec![1, 2]));
    }

    #[test]
    fn test_token_clones_share_the_flag() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert_eq!(clone.check(), Ok(()));

        token.cancel();
        assert!(clone.is_cancelled());
        assert_eq!(clone.check(), Err(Cancelled));
    }
}
