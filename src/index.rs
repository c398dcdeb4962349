use std::{
    fs,
    io::{self, ErrorKind},
    os::unix::fs::symlink,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::{Error, Result};

/// A multimap from real message path to the backing symlinks that
/// reference it.
///
/// The reverse index is the authoritative answer to "which views
/// currently reference this message?". Rename fans out through it, and
/// refresh keeps it in lockstep with the forward symlinks: every backing
/// symlink has exactly one entry here, and no entry exists without its
/// backing symlink.
pub trait ReverseIndex: Send + Sync {
    /// Records that `backing` points at `real`. An existing record for
    /// the pair is replaced.
    fn add(&self, real: &Path, backing: &Path) -> Result<()>;

    /// Forgets that `backing` points at `real`. Removing an absent
    /// record is [`Error::NotFoundError`].
    fn remove(&self, real: &Path, backing: &Path) -> Result<()>;

    /// Every backing path currently mapped from `real`.
    fn enumerate(&self, real: &Path) -> Result<Vec<PathBuf>>;
}

/// The on-disk [`ReverseIndex`]: a shadow tree of symlinks rooted at
/// `<backing>/_reverse`.
///
/// For each (real, backing) pair there is a symlink at
/// `_reverse/<real>/<query>/<cur|new>/<basename>` whose target is the
/// backing path. Using the filesystem as the index keeps it persistent
/// across restarts without a parallel memory/disk consistency protocol:
/// lookup is path resolution, enumeration is a three-level walk.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReverseTree {
    root: PathBuf,
}

impl ReverseTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The shadow path encoding a (real, backing) pair: the real path
    /// re-rooted under the sentinel, then the backing path's trailing
    /// `_<query>/<cur|new>/<basename>` components with the `_` dropped.
    fn key(&self, real: &Path, backing: &Path) -> Result<PathBuf> {
        let corrupt = || Error::CorruptEntryError(backing.to_owned());

        let mut tail = backing.iter().rev();
        let name = tail.next().ok_or_else(corrupt)?;
        let subdir = tail.next().ok_or_else(corrupt)?;
        let dir = tail.next().and_then(|dir| dir.to_str()).ok_or_else(corrupt)?;
        let query = dir.strip_prefix('_').unwrap_or(dir);

        let mut key = self.root.join(relative(real));
        key.push(query);
        key.push(subdir);
        key.push(name);

        Ok(key)
    }
}

impl ReverseIndex for ReverseTree {
    fn add(&self, real: &Path, backing: &Path) -> Result<()> {
        let key = self.key(real, backing)?;

        if let Some(parent) = key.parent() {
            fs::create_dir_all(parent)?;
        }

        if let Err(err) = symlink(backing, &key) {
            if err.kind() != ErrorKind::AlreadyExists {
                return Err(err.into());
            }
            warn!("reverse index: replacing entry {}", key.display());
            fs::remove_file(&key)?;
            symlink(backing, &key)?;
        }

        debug!("reverse index: {} -> {}", key.display(), backing.display());
        Ok(())
    }

    fn remove(&self, real: &Path, backing: &Path) -> Result<()> {
        let key = self.key(real, backing)?;

        fs::remove_file(&key).map_err(|err| match err.kind() {
            ErrorKind::NotFound => Error::NotFoundError(key.display().to_string()),
            _ => Error::from(err),
        })?;

        // reap empty parents, stopping at the sentinel root
        let mut dir = key.parent();
        while let Some(d) = dir {
            if d == self.root || fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }

        debug!("reverse index: removed {}", key.display());
        Ok(())
    }

    fn enumerate(&self, real: &Path) -> Result<Vec<PathBuf>> {
        let dir = self.root.join(relative(real));
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut backings = Vec::new();

        for entry in WalkDir::new(&dir).min_depth(3).max_depth(3) {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.path_is_symlink() {
                continue;
            }
            backings.push(fs::read_link(entry.path())?);
        }

        Ok(backings)
    }
}

/// Strips the leading `/` so an absolute real path can be re-rooted
/// under the sentinel.
fn relative(real: &Path) -> &Path {
    real.strip_prefix("/").unwrap_or(real)
}
