use std::{
    collections::VecDeque,
    fmt,
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
};

use crossbeam_channel::{Receiver, Sender};
use log::{error, info, warn};

use crate::config::Configuration;
use crate::error::TaskError;
use crate::imagej::command::Invocation;
use crate::worker::launcher::{ProcessEvent, ProcessHandle, ProcessLauncher};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Captured lines kept per task; older lines are dropped first.
pub const OUTPUT_LIMIT: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    MapCreation,
    ObjectDetection,
    HolesDetection,
    Crop,
    Interactive,
}

impl TaskKind {
    pub fn label(self) -> &'static str {
        match self {
            TaskKind::MapCreation => "Map Creator Task",
            TaskKind::ObjectDetection => "Object Detection Task",
            TaskKind::HolesDetection => "Holes Detection Task",
            TaskKind::Crop => "Crop Task",
            TaskKind::Interactive => "ImageJ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Errored,
}

/// Terminal outcome delivered to observers, exactly once per task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    Success,
    Fail { code: i32 },
    Error { cause: String },
}

impl fmt::Display for TaskEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskEvent::Success => write!(f, "completed"),
            TaskEvent::Fail { code } => write!(f, "failed (exit code {})", code),
            TaskEvent::Error { cause } => write!(f, "process error: {}", cause),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskNotification {
    pub id: u64,
    pub kind: TaskKind,
    pub description: String,
    pub event: TaskEvent,
}

impl TaskNotification {
    /// Alert text shown to the user.
    pub fn message(&self) -> String {
        let label = self.kind.label();
        match (&self.event, self.kind) {
            (TaskEvent::Success, TaskKind::Interactive) => "ImageJ closed".to_string(),
            (TaskEvent::Fail { code }, TaskKind::Interactive) => {
                format!("ImageJ closed (exit code {})", code)
            }
            (TaskEvent::Error { cause }, TaskKind::Interactive) => {
                format!("ImageJ exec error: {}", cause)
            }
            (TaskEvent::Success, _) => format!("{} completed, \n {}", label, self.description),
            (TaskEvent::Fail { code }, _) => {
                format!("{} failed, \n {} \n exit code {}", label, self.description, code)
            }
            (TaskEvent::Error { cause }, _) => {
                format!("{} process error, \n {} \n {}", label, self.description, cause)
            }
        }
    }
}

pub trait TaskObserver: Send {
    fn notify(&self, notification: &TaskNotification);
}

impl TaskObserver for Sender<TaskNotification> {
    fn notify(&self, notification: &TaskNotification) {
        if self.send(notification.clone()).is_err() {
            warn!("Observer of task {} went away.", notification.id);
        }
    }
}

pub struct Task {
    pub id: u64,
    pub description: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub pid: Option<u32>,
    pub output: VecDeque<String>,
    invocation: Invocation,
    observers: Vec<Box<dyn TaskObserver>>,
    handle: Option<ProcessHandle>,
    output_lines: Option<Receiver<String>>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("kind", &self.kind)
            .field("status", &self.status)
            .field("pid", &self.pid)
            .finish()
    }
}

impl Task {
    pub fn new(description: String, kind: TaskKind, invocation: Invocation) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            description,
            kind,
            status: TaskStatus::Pending,
            pid: None,
            output: VecDeque::new(),
            invocation,
            observers: vec![],
            handle: None,
            output_lines: None,
        }
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    pub fn subscribe(&mut self, observer: impl TaskObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Starts the task. Returns once the spawn has been requested; the
    /// outcome arrives later through [`Task::handle_event`].
    pub fn run(
        &mut self,
        configuration: &Configuration,
        macros_dir: &Path,
        launcher: &dyn ProcessLauncher,
    ) -> Result<(), TaskError> {
        if self.status != TaskStatus::Pending {
            warn!("Task '{}' already started, ignoring run.", self.id);
            return Err(TaskError::AlreadyStarted(self.id));
        }

        let request = match self.invocation().to_request(configuration, macros_dir) {
            Ok(request) => request,
            Err(e) => {
                error!("Task '{}' cannot start: {}", self.id, e);
                self.status = TaskStatus::Errored;
                self.emit(TaskEvent::Error { cause: e.to_string() });
                return Err(e);
            }
        };

        self.status = TaskStatus::Running;
        info!("Starting task '{}': {}", self.id, self.description);
        let mut handle = launcher.launch(&request);
        self.pid = handle.pid;
        self.output_lines = handle.output.take();
        self.handle = Some(handle);
        Ok(())
    }

    /// Lifecycle channel of the running process, for forwarding elsewhere.
    pub fn events(&self) -> Option<Receiver<ProcessEvent>> {
        self.handle.as_ref().map(|h| h.events.clone())
    }

    pub fn handle_event(&mut self, event: ProcessEvent) {
        if self.status != TaskStatus::Running {
            warn!("Task '{}' ignoring {:?} in state {:?}.", self.id, event, self.status);
            return;
        }
        self.drain_output();
        let (status, outcome) = match event {
            ProcessEvent::StartError(cause) => {
                error!("Task '{}': {}", self.id, TaskError::Launch(cause.clone()));
                (TaskStatus::Errored, TaskEvent::Error { cause })
            }
            ProcessEvent::Exit(0) => (TaskStatus::Succeeded, TaskEvent::Success),
            ProcessEvent::Exit(code) => (TaskStatus::Failed, TaskEvent::Fail { code }),
        };
        self.status = status;
        self.handle = None;
        info!("Task '{}' {}", self.id, outcome);
        self.emit(outcome);
    }

    /// Applies whatever the process has reported so far without blocking.
    #[cfg(test)]
    pub fn pump(&mut self) -> TaskStatus {
        self.drain_output();
        let event = self.handle.as_ref().and_then(|h| h.events.try_recv().ok());
        if let Some(event) = event {
            self.handle_event(event);
        }
        self.status
    }

    /// Blocks until the task reaches a terminal state.
    #[cfg(test)]
    pub fn wait(&mut self) -> TaskStatus {
        let event = self.handle.as_ref().and_then(|h| h.events.recv().ok());
        match event {
            Some(event) => self.handle_event(event),
            None if self.status == TaskStatus::Running => {
                self.handle_event(ProcessEvent::StartError("process monitor disconnected".to_string()))
            }
            None => {}
        }
        self.status
    }

    pub fn drain_output(&mut self) {
        let Some(lines) = &self.output_lines else {
            return;
        };
        for line in lines.try_iter() {
            if self.output.len() == OUTPUT_LIMIT {
                self.output.pop_front();
            }
            self.output.push_back(line);
        }
    }

    fn emit(&self, event: TaskEvent) {
        let notification = TaskNotification {
            id: self.id,
            kind: self.kind,
            description: self.description.clone(),
            event,
        };
        for observer in &self.observers {
            observer.notify(&notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imagej::environment::IMAGEJ_JAR;
    use crate::worker::launcher::fake::FakeLauncher;
    use crossbeam_channel::unbounded;
    use std::{fs, path::PathBuf};
    use tempfile::TempDir;

    fn installation() -> (TempDir, Configuration) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(IMAGEJ_JAR), b"jar").unwrap();
        let configuration = Configuration {
            path: Some(dir.path().to_path_buf()),
            memory: 1024,
            stack_memory: 64,
        };
        (dir, configuration)
    }

    fn observed_task() -> (Task, Receiver<TaskNotification>) {
        let mut task = Task::new(
            "Image: img.tif".to_string(),
            TaskKind::Crop,
            Invocation::batch("CropImage", "/x/img.tif".to_string()),
        );
        let (sender, receiver) = unbounded();
        task.subscribe(sender);
        (task, receiver)
    }

    fn macros() -> PathBuf {
        PathBuf::from("/macros")
    }

    #[test]
    fn nothing_fires_before_run() {
        let (task, receiver) = observed_task();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn exit_codes_map_to_outcomes() {
        for (code, status, event) in [
            (0, TaskStatus::Succeeded, TaskEvent::Success),
            (1, TaskStatus::Failed, TaskEvent::Fail { code: 1 }),
            (137, TaskStatus::Failed, TaskEvent::Fail { code: 137 }),
        ] {
            let (_dir, configuration) = installation();
            let launcher = FakeLauncher::replying(vec![Some(ProcessEvent::Exit(code))]);
            let (mut task, receiver) = observed_task();

            task.run(&configuration, &macros(), &launcher).unwrap();
            assert_eq!(task.status, TaskStatus::Running);
            assert_eq!(task.pump(), status);

            let notifications: Vec<_> = receiver.try_iter().collect();
            assert_eq!(notifications.len(), 1);
            assert_eq!(notifications[0].event, event);
        }
    }

    #[test]
    fn start_error_becomes_errored() {
        let (_dir, configuration) = installation();
        let launcher =
            FakeLauncher::replying(vec![Some(ProcessEvent::StartError("permission denied".to_string()))]);
        let (mut task, receiver) = observed_task();

        task.run(&configuration, &macros(), &launcher).unwrap();
        assert_eq!(task.wait(), TaskStatus::Errored);
        assert_eq!(
            receiver.try_iter().collect::<Vec<_>>()[0].event,
            TaskEvent::Error {
                cause: "permission denied".to_string()
            }
        );
    }

    #[test]
    fn invalid_installation_never_launches() {
        let configuration = Configuration {
            path: None,
            memory: 1024,
            stack_memory: 64,
        };
        let launcher = FakeLauncher::default();
        let (mut task, receiver) = observed_task();

        let result = task.run(&configuration, &macros(), &launcher);
        assert!(matches!(result, Err(TaskError::NotConfigured(_))));
        assert_eq!(task.status, TaskStatus::Errored);
        assert_eq!(launcher.call_count(), 0);

        let notifications: Vec<_> = receiver.try_iter().collect();
        assert_eq!(notifications.len(), 1);
        assert!(matches!(notifications[0].event, TaskEvent::Error { .. }));
    }

    #[test]
    fn second_run_is_rejected_without_events() {
        let (_dir, configuration) = installation();
        let launcher = FakeLauncher::replying(vec![Some(ProcessEvent::Exit(0)), Some(ProcessEvent::Exit(0))]);
        let (mut task, receiver) = observed_task();

        task.run(&configuration, &macros(), &launcher).unwrap();
        task.wait();
        assert!(matches!(
            task.run(&configuration, &macros(), &launcher),
            Err(TaskError::AlreadyStarted(_))
        ));
        task.pump();

        assert_eq!(launcher.call_count(), 1);
        assert_eq!(receiver.try_iter().count(), 1);
        assert_eq!(task.status, TaskStatus::Succeeded);
    }

    #[test]
    fn late_events_are_ignored() {
        let (_dir, configuration) = installation();
        let launcher = FakeLauncher::default();
        let (mut task, receiver) = observed_task();

        task.run(&configuration, &macros(), &launcher).unwrap();
        assert_eq!(task.pump(), TaskStatus::Running);

        task.handle_event(ProcessEvent::Exit(2));
        task.handle_event(ProcessEvent::Exit(0));
        task.handle_event(ProcessEvent::StartError("late".to_string()));

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(receiver.try_iter().count(), 1);
    }

    #[test]
    fn every_observer_hears_once() {
        let (_dir, configuration) = installation();
        let launcher = FakeLauncher::replying(vec![Some(ProcessEvent::Exit(0))]);
        let (mut task, first) = observed_task();
        let (sender, second) = unbounded();
        task.subscribe(sender);

        task.run(&configuration, &macros(), &launcher).unwrap();
        task.wait();

        assert_eq!(first.try_iter().count(), 1);
        assert_eq!(second.try_iter().count(), 1);
    }

    #[test]
    fn run_passes_command_to_launcher() {
        let (dir, configuration) = installation();
        let launcher = FakeLauncher::default();
        let (mut task, _receiver) = observed_task();

        task.run(&configuration, &macros(), &launcher).unwrap();

        let calls = launcher.calls.lock().unwrap();
        assert_eq!(calls[0].working_dir.as_deref(), Some(dir.path()));
        assert!(calls[0].args.contains(&"-Xmx1024m".to_string()));
        assert_eq!(task.pid, Some(4242));
    }

    #[test]
    fn output_keeps_only_latest_lines() {
        let (mut task, _receiver) = observed_task();
        let (sender, lines) = unbounded();
        task.output_lines = Some(lines);
        for n in 0..OUTPUT_LIMIT + 500 {
            sender.send(format!("[stdout] line {}", n)).unwrap();
        }

        task.drain_output();
        assert_eq!(task.output.len(), OUTPUT_LIMIT);
        assert_eq!(task.output.front().map(String::as_str), Some("[stdout] line 500"));
        assert_eq!(
            task.output.back().cloned(),
            Some(format!("[stdout] line {}", OUTPUT_LIMIT + 499))
        );
    }

    #[test]
    fn interactive_messages_never_report_failure() {
        let mut notification = TaskNotification {
            id: 7,
            kind: TaskKind::Interactive,
            description: "ImageJ".to_string(),
            event: TaskEvent::Fail { code: 1 },
        };
        assert_eq!(notification.message(), "ImageJ closed (exit code 1)");

        notification.event = TaskEvent::Success;
        assert_eq!(notification.message(), "ImageJ closed");

        notification.event = TaskEvent::Error {
            cause: "no java".to_string(),
        };
        assert_eq!(notification.message(), "ImageJ exec error: no java");
    }

    #[test]
    fn notification_messages_distinguish_outcomes() {
        let mut notification = TaskNotification {
            id: 1,
            kind: TaskKind::HolesDetection,
            description: "Folder: data".to_string(),
            event: TaskEvent::Success,
        };
        assert_eq!(notification.message(), "Holes Detection Task completed, \n Folder: data");

        notification.event = TaskEvent::Fail { code: 1 };
        assert!(notification.message().contains("failed"));

        notification.event = TaskEvent::Error {
            cause: "boom".to_string(),
        };
        assert!(notification.message().contains("process error"));
    }
}
