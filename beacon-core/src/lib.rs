pub mod address;
pub mod builder;
pub mod config;
pub mod digest;
pub mod manifest;
pub mod markdown;
pub mod site;
pub mod template;

// Re-export main types
pub use address::ContentAddress;
pub use builder::{BuildError, ManifestBuilder};
pub use config::{Config, ConfigError, ContentMapping, PageTemplate, SiteDefinition};
pub use digest::{ContentDigest, HashingWriter};
pub use manifest::{Endpoint, Manifest, ManifestError};
pub use site::site_dir_name;
pub use template::{TemplateError, TemplateRenderer};
