use std::{
    fmt::{self, Display, Formatter},
    path::{Path, PathBuf},
};

pub(crate) const CUR: &str = "cur";
pub(crate) const NEW: &str = "new";

/// Prefix of the staging directories created during a refresh.
pub(crate) const STAGING_PREFIX: &str = "_tempdir.";

const REVERSE_DIR: &str = "_reverse";
const LAST_UPDATE_SUFFIX: &str = ".last-update";
const REFRESH_TRIGGER: &str = ".refresh";

/// Longest virtual path accepted by the surface. Paths come from the
/// kernel bridge, which enforces the platform maximum itself, so a longer
/// one is a caller bug.
const PATH_MAX: usize = 4096;

/// An absolute path as presented by the virtual filesystem.
///
/// Construction asserts the two invariants every operation relies on
/// (leading slash, bounded length), so the rest of the crate can slice
/// segments without re-checking.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct VirtualPath {
    inner: String,
}

impl VirtualPath {
    pub fn new(path: impl AsRef<str>) -> Self {
        let path = path.as_ref();

        assert!(
            path.len() <= PATH_MAX,
            "virtual path too long: {} bytes",
            path.len()
        );
        assert!(path.starts_with('/'), "virtual path not absolute: {path}");

        Self {
            inner: path.to_owned(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    pub fn is_root(&self) -> bool {
        self.segments().next().is_none()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.inner.split('/').filter(|segment| !segment.is_empty())
    }

    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// The head segment, which names the query this path belongs to.
    pub fn query(&self) -> Option<&str> {
        self.segments().next()
    }

    pub fn kind(&self) -> PathKind<'_> {
        let segments: Vec<&str> = self.segments().collect();

        match segments[..] {
            [] => PathKind::Root,
            [name, ..] if name.starts_with('_') => PathKind::Reserved { name },
            [query] => PathKind::QueryRoot { query },
            [query, .., name] if name == REFRESH_TRIGGER => PathKind::RefreshTrigger { query },
            [query, subdir] => PathKind::Subdir { query, subdir },
            [query, subdir, .., name] => PathKind::Entry {
                query,
                subdir,
                name,
            },
        }
    }
}

impl Display for VirtualPath {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        self.inner.fmt(f)
    }
}

/// Classification of a virtual path, used by the operation surface to
/// pick the matching backing-tree location.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PathKind<'a> {
    /// The mount root.
    Root,
    /// A name owned by the implementation (leading `_`).
    Reserved { name: &'a str },
    /// `/<query>`.
    QueryRoot { query: &'a str },
    /// `/<query>/<cur|new>`.
    Subdir { query: &'a str, subdir: &'a str },
    /// A path whose final component is `.refresh`.
    RefreshTrigger { query: &'a str },
    /// `/<query>/<cur|new>/<basename>`.
    Entry {
        query: &'a str,
        subdir: &'a str,
        name: &'a str,
    },
}

/// Substitutes `+` with `/` so that tag hierarchies can be expressed in
/// a single path segment (`maildir:+archive+2024` searches
/// `maildir:/archive/2024`).
///
/// The substitution is not reversible: a query that legitimately
/// contains `+` cannot be represented as a view name.
pub(crate) fn decode_query(name: &str) -> String {
    name.replace('+', "/")
}

/// The on-disk area owned by the implementation.
///
/// Precomputed joins over the backing directory, one method per kind of
/// path the layout defines: the `<query>` marker directory that registers
/// a query, the `_<query>` materialised maildir, the `_<query>.last-update`
/// freshness marker and the `_reverse` shadow tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Backing {
    root: PathBuf,
}

impl Backing {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Marker directory whose presence means the query is registered.
    pub fn marker_dir(&self, query: &str) -> PathBuf {
        self.root.join(query)
    }

    /// The query's materialised maildir.
    pub fn query_dir(&self, query: &str) -> PathBuf {
        self.root.join(format!("_{query}"))
    }

    pub fn last_update(&self, query: &str) -> PathBuf {
        self.root.join(format!("_{query}{LAST_UPDATE_SUFFIX}"))
    }

    pub fn reverse_root(&self) -> PathBuf {
        self.root.join(REVERSE_DIR)
    }

    /// Maps `/<query>/…` to `<backing>/_<query>/…`.
    pub fn resolve(&self, path: &VirtualPath) -> PathBuf {
        self.root.join(format!("_{}", &path.as_str()[1..]))
    }

    /// Maps a virtual path to the backing tree verbatim, without the `_`
    /// substitution. Reserved names only resolve this way.
    pub fn literal(&self, path: &VirtualPath) -> PathBuf {
        self.root.join(&path.as_str()[1..])
    }
}
