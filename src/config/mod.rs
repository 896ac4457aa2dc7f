pub mod loader;
pub mod schema;

pub use loader::{
    default_config_path, expand_tilde, load_from_path, load_from_str, parse_from_str,
    read_from_path, save_to_path, ConfigError, CONFIG_ENV,
};
pub use schema::{Indent, Settings, ValidationError, ValidationIssue};
