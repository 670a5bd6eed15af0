//! Exporter configuration: YAML model, loading with env overrides, validation.

mod loading;
mod types;
mod validation;


pub use loading::load_dotenv;
pub use types::{Config, GitlabConfig, OwnerKind, Project, Wildcard, WildcardOwner};
