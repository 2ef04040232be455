//! Virtual-path normalization.
//!
//! Every catalog lookup and every inode assignment operates on the canonical
//! form produced by [`normalize`]: absolute, no `.`/`..` components, no
//! repeated or trailing slashes (except the root itself).

/// Normalize a virtual path to canonical form.
///
/// Empty or whitespace-only input becomes `/`. Relative input is anchored at
/// the root. `.` and empty components are dropped, `..` pops the previous
/// component (never escaping the root).
pub fn normalize(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return "/".to_string();
    }

    let mut components: Vec<&str> = Vec::new();
    for component in trimmed.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            other => components.push(other),
        }
    }

    if components.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", components.join("/"))
    }
}

/// Parent directory of a normalized path. The root is its own parent.
pub fn parent_of(path: &str) -> String {
    if path == "/" {
        return "/".to_string();
    }
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

/// Final component of a normalized path. Returns `/` for the root.
pub fn basename(path: &str) -> &str {
    if path == "/" {
        return "/";
    }
    path.rsplit('/').next().unwrap_or("/")
}

/// Join a child name onto a directory path and normalize the result.
///
/// Used by `lookup`, where the kernel hands us arbitrary names; `..` and
/// friends collapse away rather than escaping the tree.
pub fn join_child(dir: &str, name: &str) -> String {
    if dir == "/" {
        normalize(&format!("/{}", name))
    } else {
        normalize(&format!("{}/{}", dir, name))
    }
}

/// Component-wise prefixes of a normalized path, shortest first, excluding
/// the root. `/a/b/c` yields `/a`, `/a/b`, `/a/b/c`.
pub fn ancestor_chain(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    if path == "/" {
        return out;
    }
    let mut acc = String::new();
    for component in path.trim_start_matches('/').split('/') {
        acc.push('/');
        acc.push_str(component);
        out.push(acc.clone());
    }
    out
}

/// Escape `%`, `_`, and the escape character itself for a SQL LIKE pattern
/// using `\` as the escape character.
pub fn escape_like(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basics() {
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("   "), "/");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("movies"), "/movies");
        assert_eq!(normalize("/movies/"), "/movies");
        assert_eq!(normalize("//movies///a.mkv"), "/movies/a.mkv");
        assert_eq!(normalize(" /movies/a.mkv "), "/movies/a.mkv");
    }

    #[test]
    fn test_normalize_dot_components() {
        assert_eq!(normalize("/movies/./a.mkv"), "/movies/a.mkv");
        assert_eq!(normalize("/movies/../shows"), "/shows");
        assert_eq!(normalize("/../.."), "/");
        assert_eq!(normalize("/movies/A/../../shows/B"), "/shows/B");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in [
            "",
            "/",
            "movies",
            "/movies//A/./b.mkv",
            "/a/../b/c/",
            " /x/y ",
        ] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_normalized_form_invariants() {
        for raw in ["/a/./b", "a//b/../c", "/a/b/", "  x/../y  "] {
            let n = normalize(raw);
            assert!(n.starts_with('/'));
            assert!(!n.contains("//"));
            assert!(n == "/" || !n.ends_with('/'));
            for comp in n.trim_start_matches('/').split('/') {
                assert_ne!(comp, ".");
                assert_ne!(comp, "..");
            }
        }
    }

    #[test]
    fn test_parent_of() {
        assert_eq!(parent_of("/"), "/");
        assert_eq!(parent_of("/movies"), "/");
        assert_eq!(parent_of("/movies/A"), "/movies");
        assert_eq!(parent_of("/movies/A/a.mkv"), "/movies/A");
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("/"), "/");
        assert_eq!(basename("/movies"), "movies");
        assert_eq!(basename("/movies/A/a.mkv"), "a.mkv");
    }

    #[test]
    fn test_join_child() {
        assert_eq!(join_child("/", "movies"), "/movies");
        assert_eq!(join_child("/movies", "A"), "/movies/A");
        assert_eq!(join_child("/movies/A", ".."), "/movies");
        assert_eq!(join_child("/movies", "a b.mkv"), "/movies/a b.mkv");
    }

    #[test]
    fn test_ancestor_chain() {
        assert!(ancestor_chain("/").is_empty());
        assert_eq!(ancestor_chain("/movies"), vec!["/movies"]);
        assert_eq!(
            ancestor_chain("/movies/A/a.mkv"),
            vec!["/movies", "/movies/A", "/movies/A/a.mkv"]
        );
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("/movies/A"), "/movies/A");
        assert_eq!(escape_like("/a_b"), "/a\\_b");
        assert_eq!(escape_like("/100%"), "/100\\%");
        assert_eq!(escape_like("/a\\b"), "/a\\\\b");
    }
}
