pub mod config;
pub mod error;
pub mod event;
pub mod security;
pub mod traits;
pub mod types;

pub use config::EngineConfig;
pub use error::{Result, WeftError};
pub use event::EventBus;
pub use types::*;
