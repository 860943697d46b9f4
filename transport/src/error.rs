#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("mqtt client error: {source}")]
    Client {
        #[from]
        source: rumqttc::ClientError,
    },
    #[error("mqtt connection error: {source}")]
    Connection {
        #[from]
        source: rumqttc::ConnectionError,
    },
    #[error("not connected to broker")]
    NotConnected,
    #[error("unknown topic template placeholder {0:?}")]
    UnknownPlaceholder(String),
}

pub type Result<T> = std::result::Result<T, Error>;
