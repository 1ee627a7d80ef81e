pub mod config;
pub mod interceptor;
pub mod journal;
pub mod orchestrator;

pub use config::*;
pub use interceptor::*;
pub use journal::*;
pub use orchestrator::*;
