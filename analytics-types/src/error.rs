#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{source}")]
    SerdeJson {
        #[from]
        source: serde_json::Error,
    },
    #[error("{source}")]
    TomlDeError {
        #[from]
        source: toml::de::Error,
    },
    #[error("{source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("unknown topic template placeholder {0:?}")]
    UnknownPlaceholder(String),
    #[error("topic {topic:?} does not match template {template:?}")]
    TopicMismatch { topic: String, template: String },
    #[error("missing required config file at {0}")]
    MissingConfigFile(std::path::PathBuf),
}

pub type Result<T> = std::result::Result<T, Error>;
