// Windows platform implementations

// Command building only; compiled on every host.
pub mod service;

#[cfg(target_os = "windows")]
pub mod process;

#[cfg(target_os = "windows")]
pub mod service_host;
