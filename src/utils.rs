use std::path::{Component, Path};

/// Joins `name` onto `dir` unless `name` is already absolute.
pub fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() || is_absolute(name) {
        return name.to_string();
    }
    if name.is_empty() {
        return dir.to_string();
    }
    Path::new(dir).join(name).to_string_lossy().into_owned()
}

fn is_absolute(path: &str) -> bool {
    // Windows drive paths show up in DWARF from cross builds.
    let bytes = path.as_bytes();
    path.starts_with('/')
        || path.starts_with('\\')
        || (bytes.len() > 2 && bytes[1] == b':' && (bytes[2] == b'\\' || bytes[2] == b'/'))
}

/// True when the trailing components of `path` equal all components of `suffix`.
pub fn paths_match(path: &str, suffix: &str) -> bool {
    let path = normalise(path);
    let suffix = normalise(suffix);
    let lhs: Vec<Component<'_>> = Path::new(&path).components().collect();
    let rhs: Vec<Component<'_>> = Path::new(&suffix)
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();

    if rhs.is_empty() || rhs.len() > lhs.len() {
        return false;
    }
    if Path::new(&suffix).is_absolute() {
        return lhs == rhs;
    }

    let start = lhs.len() - rhs.len();
    lhs[start..] == rhs[..]
}

fn normalise(path: &str) -> String {
    path.replace('\\', "/")
}
