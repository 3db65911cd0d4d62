pub mod builtin;
pub mod registry;
pub mod sandbox;

pub use registry::ToolRegistry;
pub use sandbox::{CommandSandbox, RunOptions, RunResult};
