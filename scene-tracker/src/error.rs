#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("category worker for {0:?} has exited")]
    WorkerGone(String),
}

pub type Result<T> = std::result::Result<T, Error>;
