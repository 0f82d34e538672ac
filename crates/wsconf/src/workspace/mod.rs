//
// workspace/mod.rs
//
// Workspace files: data model, collaborator interfaces, the parsed-file
// cache, and disk/in-memory collaborator implementations
//

pub mod file_cache;
pub mod fs;
pub mod memory;
pub mod resolver;
pub mod types;

pub use file_cache::WorkspaceFileCache;
pub use fs::{FolderWorkspace, FsContentResolver, FsStatResolver, NotifyFileChangeSource};
pub use memory::MemoryFileSystem;
pub use resolver::{
    ConfigParser, ConfigSchemaRegistry, ContentResolver, DefaultValueSource, FileChangeSource,
    SchemaChange, StatResolver, WorkspaceContext,
};
pub use types::{
    ConfigurationInspect, ConfigurationKeys, ConfigurationUpdate, ConsolidatedConfig,
    FileChangeEvent, FileChangeType, FileContent, FileStat, GlobalDefaults, MergedSnapshot,
    ParsedFile,
};
