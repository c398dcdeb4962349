use std::{
    collections::HashMap,
    ffi::OsStr,
    fs::{self, File},
    io::{ErrorKind, Read, Seek, SeekFrom},
    os::unix::fs::symlink,
    path::Path,
    sync::{Arc, Mutex},
    time::SystemTime,
};

use tracing::{debug, warn};

use crate::{
    clock::RefreshClock,
    entry,
    error::{Error, Result},
    index::{ReverseIndex, ReverseTree},
    options::Options,
    path::{decode_query, Backing, PathKind, VirtualPath, CUR, NEW, STAGING_PREFIX},
    search::Search,
};

/// What a virtual path is, as reported by [`MuViews::getattr`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntryKind {
    Directory,
    File,
}

/// Attributes of a virtual path.
#[derive(Clone, Debug)]
pub struct Attr {
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// The main entry point for this library: a collection of Maildir views
/// materialised from mu search queries.
///
/// Every method is one of the filesystem callbacks a kernel bridge
/// forwards, addressed by virtual path. The views live in a backing
/// directory on disk; nothing is cached in memory, so several `MuViews`
/// (or several processes) over the same backing directory observe each
/// other's refreshes through the freshness markers.
pub struct MuViews {
    options: Options,
    backing: Backing,
    search: Search,
    index: Box<dyn ReverseIndex>,
    refresh_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MuViews {
    /// Opens the views rooted at `backing_dir` with default options.
    pub fn new(backing_dir: impl AsRef<Path>) -> Result<Self> {
        crate::MuViewsBuilder::new().build(backing_dir)
    }

    pub(crate) fn open_with_options(options: Options) -> Result<Self> {
        let backing = Backing::new(options.backing_dir.clone());
        fs::create_dir_all(backing.root())?;

        let index = ReverseTree::new(backing.reverse_root());
        fs::create_dir_all(index.root())?;

        let search = Search::new(&options);

        Ok(Self {
            options,
            backing,
            search,
            index: Box::new(index),
            refresh_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the path of the backing directory.
    pub fn path(&self) -> &Path {
        self.backing.root()
    }

    /// Lists the entries of a virtual directory.
    ///
    /// The root lists one entry per registered query, hiding everything
    /// the implementation owns. A query's directories list their backing
    /// counterparts, refreshing first if the query was never
    /// materialised.
    pub fn readdir(&self, path: impl AsRef<str>) -> Result<Vec<String>> {
        let path = VirtualPath::new(path);
        debug!("readdir: {path}");

        if path.is_root() {
            let mut names = Vec::new();
            for entry in fs::read_dir(self.backing.root())? {
                let entry = entry?;
                let Some(name) = entry.file_name().to_str().map(ToOwned::to_owned) else {
                    continue;
                };
                if name.starts_with('_') {
                    continue;
                }
                names.push(name);
            }
            return Ok(names);
        }

        let backing_path = match path.kind() {
            // bare reserved names stay hidden, but the internal
            // directories behind them are real on disk and resolve
            // verbatim, so the shadow tree remains introspectable
            PathKind::Reserved { .. } if path.depth() == 1 => {
                return Err(Error::NotFoundError(path.to_string()));
            }
            PathKind::Reserved { .. } => self.backing.literal(&path),
            _ => {
                let backing_path = self.backing.resolve(&path);
                if !backing_path.is_dir() {
                    if let Err(err) = self.refresh(path.as_str(), false) {
                        warn!("readdir: cannot refresh {path}: {err}");
                    }
                }
                backing_path
            }
        };

        if !backing_path.is_dir() {
            return Err(Error::NotFoundError(path.to_string()));
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&backing_path)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_owned());
            }
        }

        Ok(names)
    }

    /// Stats a virtual path.
    ///
    /// Result entries are stat'd through their symlink, so clients see
    /// the real message's size and times. Accessing a query's `cur` or
    /// `new` refreshes the view first when its freshness marker has
    /// expired.
    pub fn getattr(&self, path: impl AsRef<str>) -> Result<Attr> {
        let path = VirtualPath::new(path);
        debug!("getattr: {path}");

        match path.kind() {
            PathKind::Root => {
                return Ok(Attr {
                    kind: EntryKind::Directory,
                    size: 0,
                    modified: None,
                })
            }
            // reads on the refresh trigger must reach the read handler,
            // so it reports as a one-byte regular file
            PathKind::RefreshTrigger { .. } => {
                return Ok(Attr {
                    kind: EntryKind::File,
                    size: 1,
                    modified: None,
                })
            }
            // reserved names map 1:1 to internal directories and only
            // resolve verbatim, however deep
            PathKind::Reserved { .. } => {
                return self.stat(&self.backing.literal(&path), &path);
            }
            PathKind::QueryRoot { query } => {
                return self.stat(&self.backing.marker_dir(query), &path);
            }
            PathKind::Subdir { subdir, .. } if subdir == CUR || subdir == NEW => {
                if let Err(err) = self.refresh(path.as_str(), false) {
                    debug!("getattr: cannot refresh {path}: {err}");
                }
            }
            _ => (),
        }

        self.stat(&self.backing.resolve(&path), &path)
    }

    fn stat(&self, backing_path: &Path, path: &VirtualPath) -> Result<Attr> {
        let meta = fs::metadata(backing_path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => Error::NotFoundError(path.to_string()),
            _ => Error::from(err),
        })?;

        Ok(Attr {
            kind: if meta.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            },
            size: meta.len(),
            modified: meta.modified().ok(),
        })
    }

    /// Reads `size` bytes of a result entry at `offset`, following the
    /// backing symlink to the real message.
    ///
    /// Reading the `.refresh` trigger forces a refresh of its query
    /// regardless of freshness and yields a single newline byte.
    pub fn read(&self, path: impl AsRef<str>, offset: u64, size: usize) -> Result<Vec<u8>> {
        let path = VirtualPath::new(path);
        debug!("read: {path}");

        if let PathKind::RefreshTrigger { .. } = path.kind() {
            self.refresh(path.as_str(), true)?;
            return Ok(if offset == 0 && size > 0 {
                vec![b'\n']
            } else {
                Vec::new()
            });
        }

        let backing_path = self.backing.resolve(&path);
        let mut file = File::open(&backing_path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => Error::NotFoundError(path.to_string()),
            _ => Error::from(err),
        })?;

        file.seek(SeekFrom::Start(offset))?;

        let mut contents = Vec::with_capacity(size);
        file.take(size as u64).read_to_end(&mut contents)?;

        Ok(contents)
    }

    /// Registers a new query by creating its marker directory. The
    /// materialised `cur` and `new` appear on the next refresh.
    pub fn mkdir(&self, path: impl AsRef<str>) -> Result<()> {
        let path = VirtualPath::new(path);
        debug!("mkdir: {path}");

        match path.kind() {
            PathKind::Root => Err(Error::InvalidPathError(path.to_string())),
            PathKind::Reserved { name } => Err(Error::ReservedNameError(name.to_owned())),
            PathKind::QueryRoot { query } => {
                fs::create_dir(self.backing.marker_dir(query))?;
                Ok(())
            }
            _ => {
                fs::create_dir(self.backing.resolve(&path))?;
                Ok(())
            }
        }
    }

    /// Unregisters a query: detaches every entry from the reverse
    /// index, removes the materialised maildir, the marker directory
    /// and, best effort, the freshness marker.
    pub fn rmdir(&self, path: impl AsRef<str>) -> Result<()> {
        let path = VirtualPath::new(path);
        debug!("rmdir: {path}");

        let query = match path.kind() {
            PathKind::QueryRoot { query } => query,
            PathKind::Root => return Err(Error::InvalidPathError(path.to_string())),
            PathKind::Reserved { name } => return Err(Error::ReservedNameError(name.to_owned())),
            _ => return Err(Error::RemoveNestedDirError(path.to_string())),
        };

        let query_dir = self.backing.query_dir(query);

        if query_dir.is_dir() {
            for subdir in [CUR, NEW] {
                let subdir = query_dir.join(subdir);
                if !subdir.is_dir() {
                    continue;
                }
                for entry in fs::read_dir(&subdir)? {
                    let backing_path = entry?.path();
                    match fs::read_link(&backing_path) {
                        Ok(real) => {
                            if let Err(err) = self.index.remove(&real, &backing_path) {
                                debug!("rmdir: no reverse entry for {}: {err}", backing_path.display());
                            }
                        }
                        Err(err) => {
                            warn!("rmdir: cannot read {}: {err}", backing_path.display());
                        }
                    }
                    fs::remove_file(&backing_path)?;
                }
                fs::remove_dir(&subdir)?;
            }
            fs::remove_dir(&query_dir)?;
        }

        fs::remove_dir(self.backing.marker_dir(query)).map_err(|err| match err.kind() {
            ErrorKind::NotFound => Error::NotFoundError(path.to_string()),
            _ => Error::from(err),
        })?;

        if let Err(err) = fs::remove_file(self.backing.last_update(query)) {
            debug!("rmdir: cannot remove freshness marker of {query}: {err}");
        }

        Ok(())
    }

    /// Deletes the real message behind a result entry, then the entry
    /// itself. Fails unless deletions were enabled at build time, so
    /// clients do not believe a delete happened when nothing did.
    ///
    /// Entries of the same message in other views dangle until their
    /// next refresh evicts them.
    pub fn unlink(&self, path: impl AsRef<str>) -> Result<()> {
        let path = VirtualPath::new(path);
        debug!("unlink: {path}");

        if !self.options.delete_remove {
            return Err(Error::DeleteDisabledError(path.to_string()));
        }

        let backing_path = self.backing.resolve(&path);
        let real = fs::read_link(&backing_path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => Error::NotFoundError(path.to_string()),
            _ => Error::CorruptEntryError(backing_path.clone()),
        })?;

        if let Err(err) = self.index.remove(&real, &backing_path) {
            debug!("unlink: no reverse entry for {}: {err}", backing_path.display());
        }

        fs::remove_file(&real)?;
        fs::remove_file(&backing_path)?;

        Ok(())
    }

    /// Renames a result entry, which is how mail clients edit flags and
    /// move messages between `new` and `cur`.
    ///
    /// The real message file is renamed accordingly, then the change
    /// fans out through the reverse index to every view referencing it.
    /// Each other view keeps its own `cur`/`new` classification (a
    /// message may legitimately be `new` in one view and `cur` in
    /// another) and only inherits the new basename.
    pub fn rename(&self, from: impl AsRef<str>, to: impl AsRef<str>) -> Result<()> {
        let from = VirtualPath::new(from);
        let to = VirtualPath::new(to);
        debug!("rename: {from} to {to}");

        if from == to {
            return Ok(());
        }

        let PathKind::Entry {
            query: from_query,
            name: from_name,
            ..
        } = from.kind()
        else {
            return Err(Error::InvalidPathError(from.to_string()));
        };
        let PathKind::Entry {
            query: to_query,
            subdir: to_subdir,
            name: to_name,
        } = to.kind()
        else {
            return Err(Error::InvalidPathError(to.to_string()));
        };

        if from.depth() != 3 {
            return Err(Error::InvalidPathError(from.to_string()));
        }
        if to.depth() != 3 {
            return Err(Error::InvalidPathError(to.to_string()));
        }
        if from_query != to_query {
            return Err(Error::RenameAcrossQueriesError(
                from.to_string(),
                to.to_string(),
            ));
        }

        let from_backing = self.backing.resolve(&from);
        let from_real = fs::read_link(&from_backing).map_err(|err| match err.kind() {
            ErrorKind::NotFound => Error::NotFoundError(from.to_string()),
            _ => Error::CorruptEntryError(from_backing.clone()),
        })?;

        // the real destination: same maildir, the requested cur/new, and
        // either the existing id with the new flags spliced in (flag
        // edit) or the requested basename verbatim (move)
        let maildir = from_real
            .parent()
            .and_then(Path::parent)
            .ok_or_else(|| Error::CorruptEntryError(from_real.clone()))?;
        let from_real_name = from_real
            .file_name()
            .and_then(OsStr::to_str)
            .ok_or_else(|| Error::CorruptEntryError(from_real.clone()))?;

        let to_real_name = if entry::same_message(from_name, to_name) {
            entry::with_info(entry::id(from_real_name), entry::info(to_name))
        } else {
            to_name.to_owned()
        };
        let to_real = maildir.join(to_subdir).join(&to_real_name);

        let views = self.index.enumerate(&from_real)?;

        fs::rename(&from_real, &to_real)?;
        debug!(
            "rename: {} moved to {}",
            from_real.display(),
            to_real.display()
        );

        let to_backing = self.backing.resolve(&to);
        let mut saw_from = false;

        for backing_path in views {
            let next = if backing_path == from_backing {
                saw_from = true;
                to_backing.clone()
            } else {
                match backing_path.parent() {
                    Some(parent) => parent.join(&to_real_name),
                    None => {
                        warn!("rename: skipping odd view {}", backing_path.display());
                        continue;
                    }
                }
            };
            self.remap(&from_real, &backing_path, &to_real, &next)?;
        }

        if !saw_from {
            // the entry being renamed was missing from the reverse
            // index; remap it anyway so the client sees its rename
            warn!("rename: no reverse entry for {}", from_backing.display());
            if let Err(err) = fs::remove_file(&from_backing) {
                debug!("rename: cannot remove {}: {err}", from_backing.display());
            }
            replace_symlink(&to_real, &to_backing)?;
            self.index.add(&to_real, &to_backing)?;
        }

        Ok(())
    }

    /// Moves one view's entry from `backing_path` to `next`, retargeting
    /// it from `from_real` to `to_real`. Reverse-index removal precedes
    /// the forward unlink, and the new symlink exists before its
    /// reverse-index record.
    fn remap(
        &self,
        from_real: &Path,
        backing_path: &Path,
        to_real: &Path,
        next: &Path,
    ) -> Result<()> {
        if let Err(err) = self.index.remove(from_real, backing_path) {
            debug!("rename: no reverse entry for {}: {err}", backing_path.display());
        }
        if let Err(err) = fs::remove_file(backing_path) {
            warn!("rename: cannot remove {}: {err}", backing_path.display());
        }

        replace_symlink(to_real, next)?;
        self.index.add(to_real, next)?;

        Ok(())
    }

    /// Accepting no-op: reads go through [`MuViews::read`] directly.
    pub fn open(&self, path: impl AsRef<str>) -> Result<()> {
        let path = VirtualPath::new(path);
        debug!("open: {path}");
        Ok(())
    }

    /// Accepting no-op, the counterpart of [`MuViews::open`].
    pub fn release(&self, path: impl AsRef<str>) -> Result<()> {
        let path = VirtualPath::new(path);
        debug!("release: {path}");
        Ok(())
    }

    /// No-op, so clients rewriting files in place do not fail. Writes
    /// themselves are unsupported.
    pub fn truncate(&self, path: impl AsRef<str>, _size: u64) -> Result<()> {
        let path = VirtualPath::new(path);
        debug!("truncate: {path}");
        Ok(())
    }

    /// Re-runs the search behind `path`'s query and reconciles the
    /// materialised maildir with the new result set.
    ///
    /// Skips quietly when the path is not refreshable (the root or a
    /// reserved name) or when the view is still fresh and `force` is
    /// unset. At most one refresh per query runs at a time; a caller
    /// arriving during one blocks, then finds the view fresh and skips.
    pub fn refresh(&self, path: impl AsRef<str>, force: bool) -> Result<()> {
        let path = VirtualPath::new(path);
        debug!("refresh: {path}");

        let query = match path.kind() {
            PathKind::Root | PathKind::Reserved { .. } => {
                debug!("refresh: {path} cannot be refreshed");
                return Ok(());
            }
            PathKind::QueryRoot { query }
            | PathKind::Subdir { query, .. }
            | PathKind::RefreshTrigger { query }
            | PathKind::Entry { query, .. } => query,
        };

        let lock = self.refresh_lock(query);
        let _guard = lock.lock().unwrap();

        let clock = RefreshClock::new(self.backing.last_update(query), self.options.refresh_timeout);
        if !clock.due(force) {
            debug!("refresh: {path} is fresh");
            return Ok(());
        }

        if !self.backing.marker_dir(query).is_dir() {
            return Err(Error::NotFoundError(path.to_string()));
        }

        // dropping the staging directory removes whatever the search
        // tool left behind (emptied cur/new, its tmp, strays), on the
        // failure paths as much as on success
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(self.backing.root())?;

        self.search.run(&decode_query(query), staging.path())?;

        let query_dir = self.backing.query_dir(query);
        for subdir in [CUR, NEW] {
            fs::create_dir_all(query_dir.join(subdir))?;
        }
        for subdir in [CUR, NEW] {
            self.reconcile(&query_dir.join(subdir), &staging.path().join(subdir))?;
        }

        clock.stamp()?;

        debug!("refresh: {path} completed");
        Ok(())
    }

    /// Reconciles one maildir subdirectory against its staged result
    /// set.
    ///
    /// Pass 1 walks the backing directory: names present in both sets
    /// are the same message (maildir basenames encode a unique id), so
    /// the backing symlink is kept in place untouched and the staged
    /// copy dropped; everything else is evicted together with its
    /// reverse-index entry. Pass 2 moves the remaining staged entries
    /// in and indexes them. Observers therefore see unchanged entries
    /// preserved identically, and never a partially installed new set.
    fn reconcile(&self, backing_sub: &Path, staging_sub: &Path) -> Result<()> {
        for entry in fs::read_dir(backing_sub)? {
            let entry = entry?;
            let backing_path = entry.path();
            let staged = staging_sub.join(entry.file_name());
            let real = fs::read_link(&backing_path);

            if staged.symlink_metadata().is_ok() {
                if let Ok(real) = &real {
                    if fs::symlink_metadata(real).is_ok() {
                        fs::remove_file(&staged)?;
                        continue;
                    }
                    // the message vanished out of band: evict the entry
                    // and let pass 2 install the staged replacement
                    warn!(
                        "refresh: evicting {}, target {} vanished",
                        backing_path.display(),
                        real.display()
                    );
                }
            }

            match &real {
                Ok(real) => {
                    if let Err(err) = self.index.remove(real, &backing_path) {
                        debug!(
                            "refresh: no reverse entry for {}: {err}",
                            backing_path.display()
                        );
                    }
                }
                Err(err) => {
                    warn!(
                        "refresh: evicting unreadable entry {}: {err}",
                        backing_path.display()
                    );
                }
            }
            fs::remove_file(&backing_path)?;
        }

        if staging_sub.is_dir() {
            for entry in fs::read_dir(staging_sub)? {
                let entry = entry?;
                let dest = backing_sub.join(entry.file_name());
                fs::rename(entry.path(), &dest)?;
                let real = fs::read_link(&dest)?;
                self.index.add(&real, &dest)?;
            }
        }

        Ok(())
    }

    fn refresh_lock(&self, query: &str) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().unwrap();
        locks.entry(query.to_owned()).or_default().clone()
    }
}

fn replace_symlink(target: &Path, link: &Path) -> Result<()> {
    match symlink(target, link) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            fs::remove_file(link)?;
            symlink(target, link)?;
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
