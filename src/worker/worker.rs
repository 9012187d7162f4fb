use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use log::{error, info, warn};

use crate::manager::registry::{lock, TaskRef, TaskRegistry};
use crate::models::{
    message::TaskMessage,
    task::{TaskNotification, TaskObserver, TaskStatus},
};
use crate::worker::launcher::{self, ProcessEvent};

/// Task observer that hands notifications to the worker thread.
pub struct WorkerRelay(pub Sender<TaskMessage>);

impl TaskObserver for WorkerRelay {
    fn notify(&self, notification: &TaskNotification) {
        if self.0.send(TaskMessage::Notify(notification.clone())).is_err() {
            warn!("Worker is gone, dropping notification for task '{}'.", notification.id);
        }
    }
}

/// Single thread on which every task transition and notification happens.
pub fn spawn_worker_thread(
    receiver: Receiver<TaskMessage>,
    registry: TaskRegistry,
    notifications: Sender<TaskNotification>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match receiver.recv() {
            Ok(message) => match message {
                TaskMessage::Process(task, event) => handle_process_event(&task, event),
                TaskMessage::Kill(id) => handle_kill_task(id, &registry),
                TaskMessage::Notify(notification) => notifications.notify(&notification),
                TaskMessage::Shutdown => {
                    info!("Worker shutting down.");
                    break;
                }
            },
            Err(e) => {
                error!("Failed to receive message: {}", e);
                break;
            }
        }
    })
}

/// Relays the lifecycle signal of one process onto the worker channel.
pub fn forward_events(task: TaskRef, sender: Sender<TaskMessage>) {
    let Some(events) = lock(&task).events() else {
        return;
    };
    thread::spawn(move || {
        let event = events
            .recv()
            .unwrap_or_else(|_| ProcessEvent::StartError("process monitor disconnected".to_string()));
        if sender.send(TaskMessage::Process(task, event)).is_err() {
            warn!("Worker is gone, dropping process event.");
        }
    });
}

fn handle_process_event(task: &TaskRef, event: ProcessEvent) {
    lock(task).handle_event(event);
}

fn handle_kill_task(id: u64, registry: &TaskRegistry) {
    let Some(task) = registry.find(id) else {
        warn!("Kill requested for unknown task '{}'.", id);
        return;
    };
    let task = lock(&task);
    match (task.status, task.pid) {
        (TaskStatus::Running, Some(pid)) => {
            if launcher::terminate(pid) {
                info!("Task '{}' killed.", id);
            } else {
                warn!("Could not kill task '{}' (pid {}).", id, pid);
            }
        }
        (status, _) => info!("Task '{}' is {:?}, nothing to kill.", id, status),
    }
}
