pub mod launcher;
pub mod worker;
