// macOS platform implementations

pub mod service;
