use std::{
    io::{BufRead, BufReader, Read},
    path::PathBuf,
    process::{Command, ExitStatus, Stdio},
    thread,
};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{error, info};

/// What happens to the child's standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoPolicy {
    Inherit,
    Capture,
    Discard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub io: IoPolicy,
}

/// Lifecycle signals of a launched process. At most one is ever sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    StartError(String),
    Exit(i32),
}

pub struct ProcessHandle {
    pub pid: Option<u32>,
    pub events: Receiver<ProcessEvent>,
    pub output: Option<Receiver<String>>,
}

impl ProcessHandle {
    /// Handle for a process that never started.
    pub fn failed(cause: impl Into<String>) -> Self {
        let (sender, events) = bounded(1);
        let _ = sender.send(ProcessEvent::StartError(cause.into()));
        Self {
            pid: None,
            events,
            output: None,
        }
    }
}

pub trait ProcessLauncher: Send + Sync {
    /// Must not block until the process finishes.
    fn launch(&self, request: &LaunchRequest) -> ProcessHandle;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, request: &LaunchRequest) -> ProcessHandle {
        let mut command = Command::new(&request.program);
        command.args(&request.args);
        if let Some(dir) = &request.working_dir {
            command.current_dir(dir);
        }
        match request.io {
            IoPolicy::Inherit => {}
            IoPolicy::Capture => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
            IoPolicy::Discard => {
                command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to run {}: {}", request.program, e);
                return ProcessHandle::failed(e.to_string());
            }
        };

        let pid = child.id();
        info!("Started {} with pid {}.", request.program, pid);

        let output = if request.io == IoPolicy::Capture {
            let (sender, receiver) = unbounded();
            if let Some(stdout) = child.stdout.take() {
                forward_lines(stdout, "stdout", sender.clone());
            }
            if let Some(stderr) = child.stderr.take() {
                forward_lines(stderr, "stderr", sender);
            }
            Some(receiver)
        } else {
            None
        };

        let (sender, events) = bounded(1);
        thread::spawn(move || {
            let event = match child.wait() {
                Ok(status) => ProcessEvent::Exit(exit_code(status)),
                Err(e) => {
                    error!("Failed to wait for child process {}: {}", pid, e);
                    ProcessEvent::StartError(e.to_string())
                }
            };
            let _ = sender.send(event);
        });

        ProcessHandle {
            pid: Some(pid),
            events,
            output,
        }
    }
}

fn forward_lines<R: Read + Send + 'static>(stream: R, tag: &'static str, sender: Sender<String>) {
    thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines().map_while(Result::ok) {
            if sender.send(format!("[{}] {}", tag, line)).is_err() {
                break;
            }
        }
    });
}

/// Signal deaths are reported shell-style as `128 + signal`.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

/// Forcibly ends a running process. The exit still arrives through the
/// process's lifecycle channel.
#[cfg(unix)]
pub fn terminate(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    unsafe { libc::kill(pid, libc::SIGKILL) == 0 }
}

#[cfg(not(unix))]
pub fn terminate(_pid: u32) -> bool {
    false
}
