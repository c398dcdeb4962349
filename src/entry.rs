//! Basename algebra for maildir entries.
//!
//! A maildir basename is `<id>[:2,<flags>]`: a unique id, optionally
//! followed by an info suffix carrying the message flags. Renames that
//! keep the id are flag edits; renames that change it move the message.
//! The flags themselves stay opaque here, no operation interprets them
//! individually, they are only spliced from one basename into another.

/// The id ←→ info separator. The crate only targets unix, where `:` is
/// the standard separator.
const INFO_SEP: char = ':';

/// The unique-id part of a basename, without the info suffix.
pub(crate) fn id(name: &str) -> &str {
    match name.rsplit_once(INFO_SEP) {
        Some((id, _)) => id,
        None => name,
    }
}

/// The info suffix of a basename, separator included (`":2,S"`), or
/// `None` when the basename is a bare id.
pub(crate) fn info(name: &str) -> Option<&str> {
    name.rfind(INFO_SEP).map(|at| &name[at..])
}

/// Splices an info suffix onto an id.
pub(crate) fn with_info(id: &str, info: Option<&str>) -> String {
    format!("{id}{}", info.unwrap_or_default())
}

/// Whether two basenames name the same message, i.e. differ at most in
/// their info suffix.
pub(crate) fn same_message(a: &str, b: &str) -> bool {
    id(a) == id(b)
}
