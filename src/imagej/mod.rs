pub mod command;
pub mod environment;
pub mod factory;
