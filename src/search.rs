use std::{
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use tracing::debug;

use crate::{options::Options, Error, Result};

/// Invoker for the external search tool.
///
/// `run` asks the tool to write its result set as symlinks into a
/// staging directory; it never parses tool output. On success the
/// staging directory contains `cur` and `new` populated with symlinks
/// whose targets are real message paths.
pub(crate) struct Search {
    mu: PathBuf,
    mu_home: Option<PathBuf>,
    enable_indexing: bool,
    lenient_exit_codes: bool,
}

impl Search {
    pub fn new(options: &Options) -> Self {
        Self {
            mu: options.mu.clone(),
            mu_home: options.mu_home.clone(),
            enable_indexing: options.enable_indexing,
            lenient_exit_codes: options.lenient_exit_codes,
        }
    }

    /// Runs `mu find` for the decoded `query`, materialising the result
    /// set in `staging`. When indexing is enabled the mail store is
    /// reindexed first, so searches see messages delivered since the
    /// previous run.
    pub fn run(&self, query: &str, staging: &Path) -> Result<()> {
        if self.enable_indexing {
            self.index(query)?;
        }

        let mut find = self.command();
        find.arg("find");
        if let Some(home) = &self.mu_home {
            find.arg(format!("--muhome={}", home.display()));
        }
        find.arg("--clearlinks")
            .arg("--format=links")
            .arg(format!("--linksdir={}", staging.display()))
            .arg(query);

        debug!("searching for {query:?}");
        let status = find.status()?;

        match status.code() {
            Some(code) if self.succeeded(code) => Ok(()),
            Some(code) => Err(Error::SearchError(query.to_owned(), code)),
            None => Err(Error::SearchKilledError(query.to_owned())),
        }
    }

    fn index(&self, query: &str) -> Result<()> {
        debug!("indexing the mail store");

        let mut index = self.command();
        index.arg("index");
        if let Some(home) = &self.mu_home {
            index.arg(format!("--muhome={}", home.display()));
        }

        if !index.status()?.success() {
            return Err(Error::IndexError(query.to_owned()));
        }

        Ok(())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.mu);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }

    /// Exit code 2 means "no matches", which is not an error. Older mu
    /// releases report the same condition as 4 (historically observed as
    /// raw wait status 1024); accepting it is gated behind the
    /// `lenient_exit_codes` option.
    fn succeeded(&self, code: i32) -> bool {
        code == 0 || code == 2 || (self.lenient_exit_codes && code == 4)
    }
}
