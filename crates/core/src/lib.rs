pub mod config;
pub mod error;
pub mod params;

pub use config::{load_dotenv, Config, GitlabConfig, OwnerKind, Project, Wildcard, WildcardOwner};
pub use error::*;
pub use params::{EffectiveParameters, Parameters};
