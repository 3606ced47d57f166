use thiserror::Error;

/// Errors raised while loading or validating block definitions.
#[derive(Debug, Error)]
pub enum BlockConfigError {
    #[error("failed to read block config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse block config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("duplicate block name `{0}`")]
    DuplicateName(String),

    #[error("duplicate block id {id} (`{first}` and `{second}`)")]
    DuplicateId {
        id: u16,
        first: String,
        second: String,
    },

    #[error("block id 0 is reserved for empty space, found `{0}`")]
    ReservedId(String),

    #[error("emission of `{name}` exceeds 15: {value}")]
    EmissionOutOfRange { name: String, value: u8 },
}
