use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("pool limit reached: all pool ids are in use")]
    PoolExhausted,

    #[error("arena refused to grow for a {requested} byte allocation")]
    OutOfMemory { requested: usize },
}
