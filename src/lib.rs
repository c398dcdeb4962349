//! Rust library to materialise [mu] search queries as Maildir views.
//!
//! A view is a directory named after a saved search query. Reading it
//! triggers (or reuses) an on-disk materialisation of the result set as
//! a regular [Maildir], whose `cur` and `new` subdirectories contain
//! symlinks into the real maildir store. Renaming an entry, which is how
//! mail clients change message flags or move messages between `cur` and
//! `new`, rewrites the real message file and updates every view that
//! references it through a persistent reverse index.
//!
//! The kernel filesystem bridge is not part of this crate: [`MuViews`]
//! exposes the filesystem callbacks (`readdir`, `getattr`, `read`,
//! `rename`, `mkdir`, `rmdir`, `unlink`…) as plain methods, so any FUSE
//! binding can forward operations to it and map [`Error`] variants back
//! to errnos.
//!
//! [mu]: https://www.djcbsoftware.nl/code/mu/
//! [Maildir]: https://en.wikipedia.org/wiki/Maildir

mod clock;
mod entry;
mod error;
mod index;
mod options;
mod path;
mod search;
mod views;

#[doc(inline)]
pub use crate::{
    error::{Error, Result},
    index::{ReverseIndex, ReverseTree},
    options::MuViewsBuilder,
    path::{PathKind, VirtualPath},
    views::{Attr, EntryKind, MuViews},
};
