pub mod settings;

pub use settings::{AuthConfig, CacheConfig, LibraryConfig, LoggingConfig, ServerConfig, Settings};
