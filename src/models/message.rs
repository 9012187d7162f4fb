use crate::manager::registry::TaskRef;
use crate::models::task::TaskNotification;
use crate::worker::launcher::ProcessEvent;

#[derive(Debug)]
pub enum TaskMessage {
    Process(TaskRef, ProcessEvent),
    Kill(u64),
    Notify(TaskNotification),
    Shutdown,
}
