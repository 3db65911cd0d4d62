pub mod agent;
pub mod shell;
pub mod triggers;
