#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no cluster with id {0}")]
    UnknownCluster(analytics_types::ClusterId),
}

pub type Result<T> = std::result::Result<T, Error>;
