use thiserror::Error;

#[derive(Error, Debug)]
pub enum CasFsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Cas(#[from] casfs_cas::CasError),

    #[error(transparent)]
    Codec(#[from] casfs_codec::CodecError),

    #[error("referenced blob missing from store: {0}")]
    MissingBlob(String),

    #[error("no such entry: {0}")]
    NoSuchEntry(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("name conflict on commit: {0}")]
    NameConflict(String),

    #[error("symlink chain exceeded hop limit or is otherwise invalid: {0}")]
    InvalidSymlink(String),

    #[error("cannot mutate the filesystem root directly")]
    RootMutation,
}

pub type Result<T> = std::result::Result<T, CasFsError>;
