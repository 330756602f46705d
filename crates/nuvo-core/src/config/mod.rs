//! Configuration for package sources and HTTP behaviour
//!
//! Loaded from `nuvo.toml` in the user's configuration directory. A missing
//! file is not an error: the public feed is used as the only source.

pub mod parser;
pub mod schema;
pub mod store;

pub use parser::{parse_nuvo_toml, parse_nuvo_toml_str, to_toml};
pub use schema::{
    DEFAULT_SOURCE_NAME, DEFAULT_SOURCE_URL, HttpSettings, NuvoConfig, SourceConfigEntry,
};
pub use store::ConfigStore;
