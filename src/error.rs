use std::{io, path::PathBuf, result};

use thiserror::Error;

/// The global `Result` alias of the library.
pub type Result<T> = result::Result<T, Error>;

/// The global `Error` enum of the library.
///
/// A filesystem bridge maps variants back to errnos: [`Error::NotFoundError`]
/// is `ENOENT`, [`Error::DeleteDisabledError`] is `EPERM`,
/// [`Error::RenameAcrossQueriesError`], [`Error::RemoveNestedDirError`],
/// [`Error::ReservedNameError`] and [`Error::InvalidPathError`] are
/// `EINVAL`, everything else is `EIO`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot find {0}")]
    NotFoundError(String),
    #[error("cannot remove {0}: deletions are disabled")]
    DeleteDisabledError(String),
    #[error("cannot rename {0} to {1}: entries belong to different queries")]
    RenameAcrossQueriesError(String, String),
    #[error("cannot remove nested directory {0}")]
    RemoveNestedDirError(String),
    #[error("cannot use reserved name {0}")]
    ReservedNameError(String),
    #[error("invalid path {0}")]
    InvalidPathError(String),
    #[error("search for {0} failed with exit code {1}")]
    SearchError(String, i32),
    #[error("search for {0} was terminated by a signal")]
    SearchKilledError(String),
    #[error("cannot index the mail store before searching for {0}")]
    IndexError(String),
    #[error("cannot read broken entry {0}")]
    CorruptEntryError(PathBuf),
    #[error("cannot expand path {1}")]
    ExpandPathError(#[source] shellexpand_utils::Error, PathBuf),
    #[error(transparent)]
    IoError(#[from] io::Error),
}
