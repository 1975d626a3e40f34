//! Pure path operations for the virtual filesystem.
//!
//! Every path handed to the VFS goes through [`normalize`] first, so the
//! storage keyspace only ever contains absolute, `/`-separated paths with no
//! `.`/`..` segments and no trailing slash (except the root itself).

/// Normalize a path to absolute POSIX form.
///
/// Empty input becomes `/`. Backslashes are treated as separators, relative
/// paths are anchored at the root, `.` segments are dropped, and `..` pops
/// the previous segment (stopping at the root).
pub fn normalize(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let path = path.replace('\\', "/");
    let mut stack: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }

    if stack.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", stack.join("/"))
    }
}

/// Parent directory of a normalized path. The parent of the root is the root.
pub fn parent(path: &str) -> String {
    let path = normalize(path);
    if path == "/" {
        return path;
    }
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

/// Leaf name of a normalized path. The name of the root is `/`.
pub fn name(path: &str) -> String {
    let path = normalize(path);
    if path == "/" {
        return path;
    }
    match path.rfind('/') {
        Some(idx) => path[idx + 1..].to_string(),
        None => path,
    }
}

/// Extension of the leaf name, including the leading dot. Empty if none.
pub fn extension(path: &str) -> String {
    let leaf = name(path);
    match leaf.rfind('.') {
        Some(idx) => leaf[idx..].to_string(),
        None => String::new(),
    }
}

/// Join path segments, normalizing the result.
///
/// A later segment that starts with `/` or `\` resets the accumulator, the
/// same way `Path::join` restarts at an absolute component.
pub fn combine<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut acc = String::new();
    for segment in segments {
        let segment = segment.as_ref();
        if segment.is_empty() {
            continue;
        }
        if segment.starts_with('/') || segment.starts_with('\\') {
            acc = segment.to_string();
        } else if acc.is_empty() {
            acc = segment.to_string();
        } else {
            acc = format!("{}/{}", acc, segment);
        }
    }
    normalize(&acc)
}

/// Whether `child` lives strictly below `parent`. Both are normalized first.
pub fn is_child_of(child: &str, parent_path: &str) -> bool {
    let child = normalize(child);
    let parent_path = normalize(parent_path);
    if parent_path == "/" {
        return child != "/";
    }
    child.starts_with(&format!("{}/", parent_path))
}
