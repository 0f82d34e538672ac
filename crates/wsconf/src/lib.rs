// lib.rs - Workspace configuration loader.
//
// Merges process-wide defaults with the configuration files in a workspace's
// settings folder and keeps the merged view current as those files change.
// The binary in main.rs is a thin command-line front end over this library.

pub mod config;
pub mod consolidate;
pub mod error;
pub mod events;
pub mod loader;
pub mod merge;
pub mod parser;
pub mod registry;
pub mod scheduler;
pub mod workspace;

pub use config::LoaderConfig;
pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, LoaderServices, PARSE_ERRORS_KEY};
pub use parser::JsonConfigParser;
pub use registry::DefaultsRegistry;
pub use scheduler::ReloadScheduler;
pub use workspace::{
    ConfigurationInspect, ConfigurationKeys, ConfigurationUpdate, FileChangeEvent, FileChangeType,
    MemoryFileSystem, MergedSnapshot,
};
