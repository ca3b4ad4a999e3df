// Library exports for the binary and integration tests
pub mod cli;
pub mod config_file;
pub mod gallery;
pub mod report;
pub mod server;
pub mod utils;

// Re-export commonly used types
pub use gallery::{
    ConvertOutcome, Gallery, GalleryError, ImageConverter, ImageFormat, ImageInfo, RenameReport,
    ScriptConverter, UsedStore,
};
pub use server::{create_router, run_server, ServerConfig};
