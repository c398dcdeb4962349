#![allow(dead_code)]

use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use mu_views::{MuViews, MuViewsBuilder};
use tempfile::TempDir;

/// A fake `mu` that materialises symlinks from per-query manifest rows
/// (`<query> <cur|new> <real path>`) found under `--muhome`, and appends
/// every invocation to `calls.log` so tests can count searches. No rows
/// for a query means "no matches", reported with exit code 2 the way mu
/// does.
const FAKE_MU: &str = r#"#!/bin/sh
cmd=; home=; links=; query=
for arg in "$@"; do
    case "$arg" in
        find|index) cmd="$arg" ;;
        --clearlinks|--format=links) ;;
        --muhome=*) home="${arg#--muhome=}" ;;
        --linksdir=*) links="${arg#--linksdir=}" ;;
        *) query="$arg" ;;
    esac
done
[ -n "$home" ] || exit 1
echo "$cmd${query:+ $query}" >> "$home/calls.log"
[ "$cmd" = find ] || exit 0
mkdir -p "$links/cur" "$links/new" "$links/tmp"
[ -f "$home/manifest" ] || exit 2
matched=2
while IFS=' ' read -r q sub real; do
    [ "$q" = "$query" ] || continue
    matched=0
    ln -sf "$real" "$links/$sub/${real##*/}"
done < "$home/manifest"
exit $matched
"#;

/// Scratch environment for one test: a real maildir store, a backing
/// directory and a fake mu driven by manifest rows.
pub struct Fixture {
    root: TempDir,
    pub maildir: PathBuf,
    pub backing: PathBuf,
    pub mu_home: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let maildir = root.path().join("maildir");
        let backing = root.path().join("backing");
        let mu_home = root.path().join("muhome");

        for subdir in ["cur", "new", "tmp"] {
            fs::create_dir_all(maildir.join(subdir)).unwrap();
        }
        fs::create_dir_all(&mu_home).unwrap();

        let mu = root.path().join("mu");
        fs::write(&mu, FAKE_MU).unwrap();
        let mut perms = fs::metadata(&mu).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&mu, perms).unwrap();

        Self {
            root,
            maildir,
            backing,
            mu_home,
        }
    }

    pub fn builder(&self) -> MuViewsBuilder {
        MuViewsBuilder::new()
            .with_mu(self.root.path().join("mu"))
            .with_mu_home(&self.mu_home)
            .with_refresh_timeout(0)
    }

    pub fn views(&self) -> MuViews {
        self.builder().build(&self.backing).unwrap()
    }

    /// Writes a message file into the real maildir and returns its path.
    pub fn message(&self, subdir: &str, name: &str) -> PathBuf {
        let path = self.maildir.join(subdir).join(name);
        fs::write(&path, "Subject: hello\n\nHello, world!\n").unwrap();
        path
    }

    /// Registers a manifest row: `query` matches `real` under `subdir`.
    pub fn matches(&self, query: &str, subdir: &str, real: &Path) {
        let mut manifest = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.mu_home.join("manifest"))
            .unwrap();
        writeln!(manifest, "{query} {subdir} {}", real.display()).unwrap();
    }

    pub fn clear_manifest(&self) {
        fs::write(self.mu_home.join("manifest"), "").unwrap();
    }

    /// The fake mu invocations so far, one `<command> <query>` per line.
    pub fn calls(&self) -> Vec<String> {
        match fs::read_to_string(self.mu_home.join("calls.log")) {
            Ok(log) => log.lines().map(ToOwned::to_owned).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Backdates a query's freshness marker by `secs`.
    pub fn age_marker(&self, query: &str, secs: u64) {
        let marker = self.backing.join(format!("_{query}.last-update"));
        let marker = File::options().write(true).open(marker).unwrap();
        marker
            .set_modified(SystemTime::now() - Duration::from_secs(secs))
            .unwrap();
    }

    pub fn backing_entry(&self, query: &str, subdir: &str, name: &str) -> PathBuf {
        self.backing.join(format!("_{query}")).join(subdir).join(name)
    }

    pub fn reverse_root(&self) -> PathBuf {
        self.backing.join("_reverse")
    }

    /// Names under a directory, sorted, for stable assertions.
    pub fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}
