//! Pure path helpers, grounded on the original `io.cpp`'s
//! `is_lexical_sub_path`/`lexically_relative_symlink_target`.

use std::path::{Component, Path, PathBuf};

/// Lexically normalize: resolve `.`/`..` components without touching the
/// filesystem. Leading `..` components past the start are kept (so a path
/// can still be detected as escaping a base via [`is_lexical_sub_path`]).
pub fn lexically_normal(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                match out.components().next_back() {
                    Some(Component::Normal(_)) => {
                        out.pop();
                    }
                    _ => out.push(".."),
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Lexically express `path` relative to `base`, without filesystem access.
pub fn lexically_relative(path: &Path, base: &Path) -> PathBuf {
    let path = lexically_normal(path);
    let base = lexically_normal(base);
    let mut path_components = path.components().peekable();
    let mut base_components = base.components().peekable();
    while let (Some(p), Some(b)) = (path_components.peek(), base_components.peek()) {
        if p == b {
            path_components.next();
            base_components.next();
        } else {
            break;
        }
    }
    let mut out = PathBuf::new();
    for _ in base_components {
        out.push("..");
    }
    for p in path_components {
        out.push(p.as_os_str());
    }
    out
}

/// True iff normalizing `path` relative to `base` does not start with `..`.
pub fn is_lexical_sub_path(path: &Path, base: &Path) -> bool {
    let relative = lexically_relative(path, base);
    !matches!(relative.components().next(), Some(Component::ParentDir))
}

/// Rewrite a symlink target so it reads the same after the repository
/// root moves: absolute targets that lie lexically inside `base` are
/// rewritten relative to `link`'s parent directory; everything else
/// (relative targets, or absolute targets outside `base`) is returned
/// unchanged.
pub fn lexically_relative_symlink_target(link: &Path, target: &Path, base: &Path) -> PathBuf {
    if target.is_relative() || !is_lexical_sub_path(target, base) {
        return target.to_path_buf();
    }
    let parent = link.parent().unwrap_or(link);
    lexically_relative(&lexically_normal(target), parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_path_within_base() {
        assert!(is_lexical_sub_path(
            Path::new("/repo/subject/file"),
            Path::new("/repo")
        ));
    }

    #[test]
    fn sub_path_escaping_base() {
        assert!(!is_lexical_sub_path(
            Path::new("/repo/../outside"),
            Path::new("/repo")
        ));
    }

    #[test]
    fn relative_target_is_unchanged() {
        let target = Path::new("../sibling/file");
        let out =
            lexically_relative_symlink_target(Path::new("/repo/a/link"), target, Path::new("/repo"));
        assert_eq!(out, target);
    }

    #[test]
    fn absolute_target_outside_base_is_unchanged() {
        let target = Path::new("/elsewhere/file");
        let out =
            lexically_relative_symlink_target(Path::new("/repo/a/link"), target, Path::new("/repo"));
        assert_eq!(out, target);
    }

    #[test]
    fn absolute_target_inside_base_is_rewritten() {
        let out = lexically_relative_symlink_target(
            Path::new("/repo/a/link"),
            Path::new("/repo/b/file"),
            Path::new("/repo"),
        );
        assert_eq!(out, Path::new("../b/file"));
    }
}
