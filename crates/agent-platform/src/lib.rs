// Platform abstractions shared by the OS-specific crates and agent-core

pub mod command;
pub mod platform;
pub mod process;
pub mod service;
