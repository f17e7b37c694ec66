pub mod api;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod exec;
pub mod heartbeat;
pub mod process;
pub mod registry;
pub mod supervisor;

pub use error::AgentError;
