use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::task::Task;

pub type TaskRef = Arc<Mutex<Task>>;

/// Ordered list of the tasks of one session.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<Mutex<Vec<TaskRef>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<TaskRef>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, task: Task) -> TaskRef {
        let task = Arc::new(Mutex::new(task));
        self.register_ref(task.clone());
        task
    }

    pub fn register_ref(&self, task: TaskRef) {
        self.guard().push(task);
    }

    /// Snapshot in insertion order.
    pub fn list(&self) -> Vec<TaskRef> {
        self.guard().clone()
    }

    /// Removes the first occurrence of `task`; absent tasks are ignored.
    pub fn remove(&self, task: &TaskRef) -> bool {
        let mut tasks = self.guard();
        match tasks.iter().position(|t| Arc::ptr_eq(t, task)) {
            Some(index) => {
                tasks.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn find(&self, id: u64) -> Option<TaskRef> {
        self.guard()
            .iter()
            .find(|t| lock(t).id == id)
            .cloned()
    }
}

pub fn lock(task: &TaskRef) -> MutexGuard<'_, Task> {
    task.lock().unwrap_or_else(PoisonError::into_inner)
}
