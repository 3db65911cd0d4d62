pub mod bridge;
pub mod host;
pub mod protocol;

pub use bridge::register_provider_tools;
pub use host::{ProcessToolHost, ProviderCallResult, ProviderSource};
