#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] analytics_types::Error),
    #[error(transparent)]
    Transport(#[from] transport::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
