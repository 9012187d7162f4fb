use std::{
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
    thread::JoinHandle,
};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{info, warn};

use crate::config::Configuration;
use crate::error::TaskError;
use crate::imagej::{environment, factory::{self, TaskRequest}};
use crate::manager::registry::{lock, TaskRegistry};
use crate::models::message::TaskMessage;
use crate::models::task::{TaskKind, TaskNotification, TaskStatus};
use crate::worker::launcher::ProcessLauncher;
use crate::worker::worker::{forward_events, spawn_worker_thread, WorkerRelay};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSummary {
    pub id: u64,
    pub description: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub pid: Option<u32>,
}

pub struct TaskManager {
    registry: TaskRegistry,
    launcher: Arc<dyn ProcessLauncher>,
    configuration: Arc<Mutex<Configuration>>,
    macros_dir: PathBuf,
    notifications: Sender<TaskNotification>,
    sender: Sender<TaskMessage>,
    receiver: Receiver<TaskMessage>,
}

impl TaskManager {
    pub fn new(
        launcher: Arc<dyn ProcessLauncher>,
        configuration: Configuration,
        macros_dir: PathBuf,
        notifications: Sender<TaskNotification>,
    ) -> Self {
        let (sender, receiver) = unbounded();
        TaskManager {
            registry: TaskRegistry::new(),
            launcher,
            configuration: Arc::new(Mutex::new(configuration)),
            macros_dir,
            notifications,
            sender,
            receiver,
        }
    }

    pub fn start(&self) -> JoinHandle<()> {
        spawn_worker_thread(
            self.receiver.clone(),
            self.registry.clone(),
            self.notifications.clone(),
        )
    }

    pub fn shutdown(&self) {
        let _ = self.sender.send(TaskMessage::Shutdown);
    }

    pub fn configuration(&self) -> Configuration {
        self.configuration.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_configuration(&self, configuration: Configuration) {
        info!("Configuration updated: {:?}", configuration);
        *self.configuration.lock().unwrap_or_else(PoisonError::into_inner) = configuration;
    }

    pub fn is_imagej_valid(&self) -> bool {
        environment::is_valid(&self.configuration())
    }

    /// Builds, registers and starts a task. The task stays registered even
    /// when it could not start, so its error remains visible.
    pub fn submit(&self, request: TaskRequest) -> Result<u64, TaskError> {
        let mut task = factory::build(&request);
        task.subscribe(WorkerRelay(self.sender.clone()));
        let id = task.id;
        info!("Task '{}' created: {}", id, task.description);

        let task = self.registry.register(task);
        let configuration = self.configuration();
        lock(&task).run(&configuration, &self.macros_dir, self.launcher.as_ref())?;
        forward_events(task, self.sender.clone());
        Ok(id)
    }

    pub fn kill_task(&self, id: u64) -> Result<(), TaskError> {
        if self.registry.find(id).is_none() {
            return Err(TaskError::UnknownTask(id));
        }
        if self.sender.send(TaskMessage::Kill(id)).is_err() {
            warn!("Worker is not running, kill of '{}' dropped.", id);
        }
        Ok(())
    }

    pub fn dismiss(&self, id: u64) -> Result<(), TaskError> {
        let task = self.registry.find(id).ok_or(TaskError::UnknownTask(id))?;
        self.registry.remove(&task);
        info!("Task '{}' dismissed.", id);
        Ok(())
    }

    pub fn get_task_status(&self, id: u64) -> Option<TaskStatus> {
        self.registry.find(id).map(|task| lock(&task).status)
    }

    pub fn get_all_tasks(&self) -> Vec<TaskSummary> {
        self.registry
            .list()
            .iter()
            .map(|task| {
                let task = lock(task);
                TaskSummary {
                    id: task.id,
                    description: task.description.clone(),
                    kind: task.kind,
                    status: task.status,
                    pid: task.pid,
                }
            })
            .collect()
    }

    pub fn get_task_output(&self, id: u64) -> Vec<String> {
        self.registry
            .find(id)
            .map(|task| {
                let mut task = lock(&task);
                task.drain_output();
                task.output.iter().cloned().collect()
            })
            .unwrap_or_default()
    }
}
