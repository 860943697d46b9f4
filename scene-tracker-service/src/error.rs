#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{source}")]
    Config {
        #[from]
        source: analytics_types::Error,
    },
    #[error("{source}")]
    Transport {
        #[from]
        source: transport::Error,
    },
    #[error("{source}")]
    Join {
        #[from]
        source: tokio::task::JoinError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
