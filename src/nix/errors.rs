use thiserror::Error;

#[derive(Error, Debug)]
pub enum NixError {
    #[error("category '{category}' not found in configuration")]
    SectionNotFound { category: String },

    #[error("'{container}' section not found in configuration")]
    ContainerNotFound { container: String },

    #[error("malformed configuration: closing marker for '{section}' not found")]
    MalformedDocument { section: String },

    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("edit error: {0}")]
    Edit(#[from] crate::edit::EditError),
}
