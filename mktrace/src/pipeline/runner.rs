// SPDX-License-Identifier: GPL-3.0-or-later

//! Runs the build tool and streams its output.
//!
//! The output of the child process is read by one thread per stream, and
//! forwarded through a channel. The calling thread polls the channel, and
//! between two messages checks the cancellation token and the time since the
//! last output. A cancelled run terminates the child with all its
//! descendants.

use crate::trace::CancellationToken;
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::io::{self, BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use std::fmt;
use thiserror::Error;

/// The build tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
    pub program: PathBuf,
    pub arguments: Vec<String>,
    pub working_directory: PathBuf,
}

impl fmt::Display for BuildCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words: Vec<String> = std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.arguments.iter().cloned())
            .collect();
        write!(f, "{}", shell_words::join(words))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub pid: u32,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub cancelled: bool,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        !self.cancelled && self.exit_code == Some(0)
    }
}

/// Runs a command to completion, and passes every output line to the callback.
pub trait CommandRunner {
    fn run(
        &self,
        command: &BuildCommand,
        on_output: &mut dyn FnMut(Stream, &str),
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunnerError>;
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Executable not found: '{executable}'", executable = executable.display())]
    NotFound { executable: PathBuf },
    #[error("Failed to execute '{executable}': {source}", executable = executable.display())]
    Spawn {
        executable: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to wait for process '{executable}': {source}", executable = executable.display())]
    Wait {
        executable: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Runs the command as a child process.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    stall_timeout: Duration,
    poll_interval: Duration,
}

impl ProcessRunner {
    pub fn new(stall_timeout: Duration) -> Self {
        Self { stall_timeout, poll_interval: Duration::from_millis(100) }
    }
}

impl CommandRunner for ProcessRunner {
    fn run(
        &self,
        command: &BuildCommand,
        on_output: &mut dyn FnMut(Stream, &str),
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunnerError> {
        let executable = command.program.clone();
        let mut child = Command::new(&command.program)
            .args(&command.arguments)
            .current_dir(&command.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| match source.kind() {
                io::ErrorKind::NotFound => RunnerError::NotFound { executable: executable.clone() },
                _ => RunnerError::Spawn { executable: executable.clone(), source },
            })?;
        let pid = child.id();
        log::debug!("Process started [pid: {pid}]: {command}");

        let (sender, receiver) = crossbeam_channel::unbounded();
        let readers: Vec<JoinHandle<()>> = [
            child.stdout.take().map(|stdout| forward(stdout, Stream::Stdout, sender.clone())),
            child.stderr.take().map(|stderr| forward(stderr, Stream::Stderr, sender.clone())),
        ]
        .into_iter()
        .flatten()
        .collect();
        drop(sender);

        let mut cancelled = false;
        let mut stall_reported = false;
        let mut last_output = Instant::now();
        loop {
            if !cancelled && cancel.is_cancelled() {
                log::info!("Cancelled, terminating process {pid} and its descendants");
                terminate_tree(&mut child);
                cancelled = true;
            }
            match receiver.recv_timeout(self.poll_interval) {
                Ok((stream, line)) => {
                    last_output = Instant::now();
                    on_output(stream, &line);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if !stall_reported && last_output.elapsed() >= self.stall_timeout {
                        log::warn!(
                            "No output from '{command}' for {} seconds, still waiting",
                            self.stall_timeout.as_secs()
                        );
                        stall_reported = true;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        for reader in readers {
            if reader.join().is_err() {
                log::warn!("Output reader of process {pid} panicked");
            }
        }
        let status = child.wait().map_err(|source| RunnerError::Wait { executable, source })?;
        log::debug!("Process finished [pid: {pid}]: {status}");

        Ok(RunOutcome { pid, exit_code: status.code(), cancelled })
    }
}

fn forward<R>(source: R, stream: Stream, sender: Sender<(Stream, String)>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(source);
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buffer);
                    let line = line.trim_end_matches(['\n', '\r']).to_string();
                    if sender.send((stream, line)).is_err() {
                        break;
                    }
                }
                Err(error) => {
                    log::debug!("Failed to read the {stream:?} of the process: {error}");
                    break;
                }
            }
        }
    })
}

fn terminate_tree(child: &mut Child) {
    let descendants = process_tree::descendants(child.id());

    if let Err(error) = child.kill() {
        log::warn!("Failed to terminate process {}: {error}", child.id());
    }
    for pid in descendants {
        process_tree::kill(pid);
    }
}

#[cfg(target_os = "linux")]
mod process_tree {
    use std::collections::HashMap;
    use std::fs;

    /// The transitive children of the process, from the process table.
    pub fn descendants(root: u32) -> Vec<u32> {
        let Ok(entries) = fs::read_dir("/proc") else {
            return vec![];
        };
        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|name| name.parse::<u32>().ok()) else {
                continue;
            };
            let Ok(stat) = fs::read_to_string(entry.path().join("stat")) else {
                continue;
            };
            if let Some(parent) = parent_of(&stat) {
                children.entry(parent).or_default().push(pid);
            }
        }

        let mut result = vec![];
        let mut queue = vec![root];
        while let Some(pid) = queue.pop() {
            for child in children.get(&pid).into_iter().flatten() {
                result.push(*child);
                queue.push(*child);
            }
        }
        result
    }

    /// The parent pid from the content of `/proc/<pid>/stat`.
    ///
    /// The command name is in parentheses and may contain spaces.
    pub fn parent_of(stat: &str) -> Option<u32> {
        let (_, rest) = stat.rsplit_once(')')?;
        rest.split_whitespace().nth(1)?.parse().ok()
    }

    pub fn kill(pid: u32) {
        // SAFETY: the call has no memory safety requirements.
        let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };
        if result != 0 {
            log::warn!("Failed to terminate process {pid}: {}", std::io::Error::last_os_error());
        }
    }

    #[cfg(test)]
    mod test {
        use super::*;

        #[test]
        fn test_parent_of() {
            assert_eq!(parent_of("1234 (make) S 1200 1234 1200 0 -1"), Some(1200));
            assert_eq!(parent_of("1234 (my (weird) cc) R 42 1234"), Some(42));
            assert_eq!(parent_of("garbage"), None);
        }

        #[test]
        fn test_descendants_of_unknown_process() {
            assert!(descendants(u32::MAX).is_empty());
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod process_tree {
    pub fn descendants(_root: u32) -> Vec<u32> {
        vec![]
    }

    pub fn kill(pid: u32) {
        log::debug!("Process tree termination is not supported, process {pid} is left running");
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn command(program: &str, arguments: &[&str]) -> BuildCommand {
        BuildCommand {
            program: PathBuf::from(program),
            arguments: arguments.iter().map(|argument| argument.to_string()).collect(),
            working_directory: std::env::temp_dir(),
        }
    }

    #[test]
    fn test_display() {
        let sut = command("make", &["--dry-run", "CFLAGS=-O2 -g"]);

        assert_eq!(sut.to_string(), "make --dry-run 'CFLAGS=-O2 -g'");
    }

    #[test]
    fn test_not_found() {
        let sut = ProcessRunner::new(Duration::from_secs(30));

        let result = sut.run(&command("surely-not-there-make", &[]), &mut |_, _| {}, &CancellationToken::new());

        assert!(matches!(result, Err(RunnerError::NotFound { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_output_and_exit_code() {
        let sut = ProcessRunner::new(Duration::from_secs(30));
        let mut lines = vec![];

        let outcome = sut
            .run(
                &command("sh", &["-c", "echo one; echo two; echo oops 1>&2; exit 3"]),
                &mut |stream, line| lines.push((stream, line.to_string())),
                &CancellationToken::new(),
            )
            .unwrap();

        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.cancelled);
        assert!(!outcome.success());
        let stdout: Vec<_> = lines.iter().filter(|(s, _)| *s == Stream::Stdout).map(|(_, l)| l.as_str()).collect();
        assert_eq!(stdout, vec!["one", "two"]);
        assert!(lines.contains(&(Stream::Stderr, "oops".to_string())));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_cancel_terminates_the_process_tree() {
        let sut = ProcessRunner::new(Duration::from_secs(30));
        let cancel = CancellationToken::new();
        let canceller = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(300));
                cancel.cancel();
            })
        };

        let started = Instant::now();
        // The background sleep keeps the output pipes open after the shell is killed.
        let outcome = sut
            .run(&command("sh", &["-c", "sleep 60 & sleep 60; wait"]), &mut |_, _| {}, &cancel)
            .unwrap();
        canceller.join().unwrap();

        assert!(outcome.cancelled);
        assert!(started.elapsed() < Duration::from_secs(30));
    }
}
