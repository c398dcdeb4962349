use std::path::{Path, PathBuf};

use crate::{views::MuViews, Error, Result};

/// Builder for [`MuViews`].
///
/// ```no_run
/// use mu_views::MuViewsBuilder;
///
/// let views = MuViewsBuilder::new()
///     .with_mu("~/.local/bin/mu")
///     .with_refresh_timeout(60)
///     .with_delete_remove(true)
///     .build("~/.cache/mu-views")
///     .unwrap();
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MuViewsBuilder {
    mu: PathBuf,
    mu_home: Option<PathBuf>,
    refresh_timeout: u64,
    delete_remove: bool,
    enable_indexing: bool,
    lenient_exit_codes: bool,
}

impl MuViewsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path to the mu executable.
    pub fn set_mu(&mut self, mu: impl Into<PathBuf>) {
        self.mu = mu.into();
    }

    pub fn with_mu(mut self, mu: impl Into<PathBuf>) -> Self {
        self.set_mu(mu);
        self
    }

    /// Forwarded to every mu call as `--muhome`.
    pub fn set_mu_home(&mut self, mu_home: impl Into<PathBuf>) {
        self.mu_home = Some(mu_home.into());
    }

    pub fn with_mu_home(mut self, mu_home: impl Into<PathBuf>) -> Self {
        self.set_mu_home(mu_home);
        self
    }

    /// Minimum age, in seconds, before a view is searched again on
    /// access.
    pub fn set_refresh_timeout(&mut self, secs: u64) {
        self.refresh_timeout = secs;
    }

    pub fn with_refresh_timeout(mut self, secs: u64) -> Self {
        self.set_refresh_timeout(secs);
        self
    }

    /// Whether unlinking a view entry deletes the real message. When
    /// unset, unlink fails instead of silently doing nothing.
    pub fn set_delete_remove(&mut self, delete_remove: bool) {
        self.delete_remove = delete_remove;
    }

    pub fn with_delete_remove(mut self, delete_remove: bool) -> Self {
        self.set_delete_remove(delete_remove);
        self
    }

    /// Whether to run `mu index` before every search.
    pub fn set_enable_indexing(&mut self, enable_indexing: bool) {
        self.enable_indexing = enable_indexing;
    }

    pub fn with_enable_indexing(mut self, enable_indexing: bool) -> Self {
        self.set_enable_indexing(enable_indexing);
        self
    }

    /// Whether the legacy "no matches" exit code of older mu releases
    /// counts as success.
    pub fn set_lenient_exit_codes(&mut self, lenient: bool) {
        self.lenient_exit_codes = lenient;
    }

    pub fn with_lenient_exit_codes(mut self, lenient: bool) -> Self {
        self.set_lenient_exit_codes(lenient);
        self
    }

    /// Expands the configured paths and opens the views rooted at
    /// `backing_dir`, creating the backing directory and the reverse
    /// index sentinel if missing.
    pub fn build(self, backing_dir: impl AsRef<Path>) -> Result<MuViews> {
        let options = Options {
            backing_dir: expand(backing_dir)?,
            mu: expand(self.mu)?,
            mu_home: self.mu_home.map(expand).transpose()?,
            refresh_timeout: self.refresh_timeout,
            delete_remove: self.delete_remove,
            enable_indexing: self.enable_indexing,
            lenient_exit_codes: self.lenient_exit_codes,
        };

        MuViews::open_with_options(options)
    }
}

impl Default for MuViewsBuilder {
    fn default() -> Self {
        Self {
            mu: PathBuf::from("mu"),
            mu_home: None,
            refresh_timeout: 30,
            delete_remove: false,
            enable_indexing: false,
            lenient_exit_codes: true,
        }
    }
}

/// Resolved configuration of a [`MuViews`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Options {
    pub backing_dir: PathBuf,
    pub mu: PathBuf,
    pub mu_home: Option<PathBuf>,
    pub refresh_timeout: u64,
    pub delete_remove: bool,
    pub enable_indexing: bool,
    pub lenient_exit_codes: bool,
}

fn expand(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    shellexpand_utils::expand::try_path(path)
        .map_err(|err| Error::ExpandPathError(err, path.to_owned()))
}
