pub mod registry;
pub mod task_manager;
