// Linux platform implementations

// Command building only; compiled on every host.
pub mod service;
