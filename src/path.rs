//! Slash-separated relative path helpers.
//!
//! Every location handled by the crate (original locations in the ledger,
//! internal storage paths, trash-area paths) is a relative path using `/`
//! as separator, with no leading or trailing slash. The empty string is the
//! root.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

/// Suffix marker between an item name and its deletion time.
const DELETED_MARKER: &str = ".d";

static TRASH_ENTRY_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)\.d(\d+)$").expect("valid trash entry regex"));

/// Collapse duplicate, leading and trailing slashes and drop `.` segments.
pub fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Number of segments; the root has depth 0.
pub fn depth(path: &str) -> usize {
    segments(path).count()
}

/// Parent location, `""` for top-level items.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

pub fn join(base: &str, child: &str) -> String {
    match (base.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}/{child}"),
    }
}

/// First segment and the remainder (possibly empty).
pub fn split_first(path: &str) -> (&str, &str) {
    match path.find('/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => (path, ""),
    }
}

/// True when `path` equals `prefix` or lies below it. Everything is under the root.
pub fn is_at_or_under(path: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || path == prefix
        || (path.len() > prefix.len()
            && path.starts_with(prefix)
            && path.as_bytes()[prefix.len()] == b'/')
}

/// The part of `path` below `prefix`, or `None` if `path` is not at or under it.
pub fn relative_to<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(path);
    }
    if path == prefix {
        return Some("");
    }
    if is_at_or_under(path, prefix) {
        return Some(&path[prefix.len() + 1..]);
    }
    None
}

/// `<name>.d<deletedTime>`
pub fn trash_entry_name(name: &str, deleted_time: i64) -> String {
    format!("{name}{DELETED_MARKER}{deleted_time}")
}

/// Split a trash-area entry name back into `(name, deleted_time)`.
pub fn parse_trash_entry_name(entry: &str) -> Option<(&str, i64)> {
    let caps = TRASH_ENTRY_NAME.captures(entry)?;
    let name = caps.get(1)?.as_str();
    let time = caps.get(2)?.as_str().parse().ok()?;
    Some((name, time))
}

/// Location of a trashed item's node relative to its folder's trash root.
///
/// The first segment of the original location carries the deletion-time
/// suffix and the rest of the path is mirrored below it, so `a/b/c.txt`
/// deleted at 10 lives at `a.d10/b/c.txt`.
pub fn record_node_path(original_location: &str, deleted_time: i64) -> String {
    let (first, rest) = split_first(original_location);
    join(&trash_entry_name(first, deleted_time), rest)
}

/// Append ` (n)` before the extension of the last segment.
pub fn numbered_name(path: &str, n: u32) -> String {
    let name = basename(path);
    let as_path = Path::new(name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| name.to_string());
    let ext = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    join(parent(path), &format!("{stem} ({n}){ext}"))
}

/// First of `path`, `name (1).ext`, `name (2).ext`, ... for which `taken` is false.
pub fn first_free_name(path: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(path) {
        return path.to_string();
    }
    let mut counter = 1;
    loop {
        let candidate = numbered_name(path, counter);
        if !taken(&candidate) {
            break candidate;
        }
        counter += 1;
    }
}
