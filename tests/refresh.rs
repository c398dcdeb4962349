mod common;

use std::{fs, os::unix::fs::MetadataExt};

use common::Fixture;
use mu_views::{Error, ReverseIndex, ReverseTree};

#[test]
fn empty_query_materialises_an_empty_view() {
    let fx = Fixture::new();
    let views = fx.views();

    views.mkdir("/work").unwrap();

    assert_eq!(views.readdir("/work/cur").unwrap(), Vec::<String>::new());
    assert!(fx.backing.join("_work/cur").is_dir());
    assert!(fx.backing.join("_work/new").is_dir());

    // nothing referenced: the reverse index is just the sentinel, and
    // the staging directory is gone
    assert_eq!(Fixture::names(&fx.reverse_root()), Vec::<String>::new());
    assert!(Fixture::names(&fx.backing)
        .iter()
        .all(|name| !name.starts_with("_tempdir.")));
}

#[test]
fn two_queries_share_a_message() {
    let fx = Fixture::new();
    let views = fx.views();

    let real = fx.message("cur", "m1:2,");
    fx.matches("tagA", "cur", &real);
    fx.matches("tagB", "new", &real);
    views.mkdir("/tagA").unwrap();
    views.mkdir("/tagB").unwrap();

    views.refresh("/tagA/cur", false).unwrap();
    views.refresh("/tagB/new", false).unwrap();

    let a = fx.backing_entry("tagA", "cur", "m1:2,");
    let b = fx.backing_entry("tagB", "new", "m1:2,");
    assert_eq!(fs::read_link(&a).unwrap(), real);
    assert_eq!(fs::read_link(&b).unwrap(), real);

    let index = ReverseTree::new(fx.reverse_root());
    let mut mapped = index.enumerate(&real).unwrap();
    mapped.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(mapped, expected);
}

#[test]
fn refresh_preserves_overlapping_entries() {
    let fx = Fixture::new();
    let views = fx.views();

    let real1 = fx.message("cur", "m1:2,S");
    fx.matches("work", "cur", &real1);
    views.mkdir("/work").unwrap();
    views.refresh("/work/cur", false).unwrap();

    let kept = fx.backing_entry("work", "cur", "m1:2,S");
    let ino = fs::symlink_metadata(&kept).unwrap().ino();

    let real2 = fx.message("cur", "m2:2,");
    fx.matches("work", "cur", &real2);
    views.refresh("/work/cur", true).unwrap();

    // the overlapping symlink survived in place, byte-identical
    assert_eq!(fs::symlink_metadata(&kept).unwrap().ino(), ino);
    assert_eq!(
        Fixture::names(&fx.backing.join("_work/cur")),
        ["m1:2,S", "m2:2,"]
    );
}

#[test]
fn refresh_evicts_entries_no_longer_matching() {
    let fx = Fixture::new();
    let views = fx.views();

    let real1 = fx.message("cur", "m1:2,");
    let real2 = fx.message("cur", "m2:2,");
    fx.matches("work", "cur", &real1);
    fx.matches("work", "cur", &real2);
    views.mkdir("/work").unwrap();
    views.refresh("/work/cur", false).unwrap();

    fx.clear_manifest();
    fx.matches("work", "cur", &real2);
    views.refresh("/work/cur", true).unwrap();

    assert_eq!(Fixture::names(&fx.backing.join("_work/cur")), ["m2:2,"]);

    let index = ReverseTree::new(fx.reverse_root());
    assert!(index.enumerate(&real1).unwrap().is_empty());
    assert_eq!(index.enumerate(&real2).unwrap().len(), 1);
}

#[test]
fn forced_refresh_twice_is_idempotent() {
    let fx = Fixture::new();
    let views = fx.views();

    let real = fx.message("new", "m1");
    fx.matches("work", "new", &real);
    views.mkdir("/work").unwrap();

    views.refresh("/work/new", true).unwrap();
    let entry = fx.backing_entry("work", "new", "m1");
    let ino = fs::symlink_metadata(&entry).unwrap().ino();

    views.refresh("/work/new", true).unwrap();
    assert_eq!(fs::symlink_metadata(&entry).unwrap().ino(), ino);
    assert_eq!(fs::read_link(&entry).unwrap(), real);
    assert_eq!(Fixture::names(&fx.backing.join("_work/new")), ["m1"]);
}

#[test]
fn refresh_replaces_entries_whose_target_vanished() {
    let fx = Fixture::new();
    let views = fx.views();

    let real = fx.message("cur", "m1:2,");
    fx.matches("work", "cur", &real);
    views.mkdir("/work").unwrap();
    views.refresh("/work/cur", false).unwrap();

    let entry = fx.backing_entry("work", "cur", "m1:2,");
    let ino = fs::symlink_metadata(&entry).unwrap().ino();

    // the message disappears out of band while the search still
    // reports it: the broken link is evicted and the staged copy
    // installed in its stead
    fs::remove_file(&real).unwrap();
    views.refresh("/work/cur", true).unwrap();

    assert_ne!(fs::symlink_metadata(&entry).unwrap().ino(), ino);
    assert_eq!(fs::read_link(&entry).unwrap(), real);

    let index = ReverseTree::new(fx.reverse_root());
    assert_eq!(index.enumerate(&real).unwrap(), vec![entry]);
}

#[test]
fn staleness_clock_gates_searches() {
    let fx = Fixture::new();
    let views = fx
        .builder()
        .with_refresh_timeout(30)
        .build(&fx.backing)
        .unwrap();

    views.mkdir("/work").unwrap();

    views.refresh("/work/cur", false).unwrap();
    assert_eq!(fx.calls().len(), 1);

    // still fresh: no new search
    views.refresh("/work/cur", false).unwrap();
    assert_eq!(fx.calls().len(), 1);

    // the trigger forces one regardless
    assert_eq!(views.read("/work/.refresh", 0, 4096).unwrap(), vec![b'\n']);
    assert_eq!(fx.calls().len(), 2);

    // past the timeout the next access searches again
    fx.age_marker("work", 60);
    views.refresh("/work/cur", false).unwrap();
    assert_eq!(fx.calls().len(), 3);
}

#[test]
fn refresh_requires_a_registered_query() {
    let fx = Fixture::new();
    let views = fx.views();

    let err = views.refresh("/nope/cur", true).unwrap_err();
    assert!(matches!(err, Error::NotFoundError(_)));
}

#[test]
fn root_and_reserved_paths_are_not_refreshable() {
    let fx = Fixture::new();
    let views = fx.views();

    views.refresh("/", true).unwrap();
    views.refresh("/_reverse", true).unwrap();

    assert!(fx.calls().is_empty());
}

#[test]
fn plus_decodes_to_slash_in_queries() {
    let fx = Fixture::new();
    let views = fx.views();

    let real = fx.message("cur", "m1:2,");
    fx.matches("maildir:/archive", "cur", &real);
    views.mkdir("/maildir:+archive").unwrap();
    views.refresh("/maildir:+archive/cur", false).unwrap();

    assert_eq!(fx.calls(), ["find maildir:/archive"]);
    assert_eq!(
        fs::read_link(fx.backing_entry("maildir:+archive", "cur", "m1:2,")).unwrap(),
        real
    );
}

#[test]
fn indexing_runs_before_searching_when_enabled() {
    let fx = Fixture::new();
    let views = fx
        .builder()
        .with_enable_indexing(true)
        .build(&fx.backing)
        .unwrap();

    views.mkdir("/work").unwrap();
    views.refresh("/work/cur", false).unwrap();

    assert_eq!(fx.calls(), ["index", "find work"]);
}
