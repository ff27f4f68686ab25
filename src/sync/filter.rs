//! Pure in-scope predicates. An empty filter list matches everything.

use std::path::{Path, PathBuf};

/// Resolve a configured folder against the destination root, ignoring
/// leading and trailing separators on the configured value.
fn resolve(root: &Path, folder: &str) -> PathBuf {
    let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
    root.join(folder.trim_matches('/'))
}

fn is_unfiltered(folders: &[String], root: &Path, candidate: &Path) -> bool {
    folders.is_empty() || root.as_os_str().is_empty() || candidate.as_os_str().is_empty()
}

/// Whether a file path ends with one of the extensions, ignoring case.
pub fn file_wanted(extensions: &[String], path: &Path) -> bool {
    if extensions.is_empty() {
        return true;
    }
    let lowered = path.to_string_lossy().to_lowercase();
    if extensions
        .iter()
        .any(|ext| lowered.ends_with(&ext.to_lowercase()))
    {
        return true;
    }
    tracing::debug!("Skipping the unwanted file {}", path.display());
    false
}

/// Whether a folder lies on the way to, inside, or at a configured folder.
///
/// Ancestors are wanted so that traversal can reach a nested configured
/// folder; files directly inside them are gated separately by
/// [`parent_folder_wanted`].
pub fn folder_wanted(folders: &[String], root: &Path, candidate: &Path) -> bool {
    if is_unfiltered(folders, root, candidate) {
        return true;
    }
    folders.iter().any(|folder| {
        let wanted = resolve(root, folder);
        candidate.starts_with(&wanted) || wanted.starts_with(candidate)
    })
}

/// Whether a folder is a configured folder or lies inside one.
pub fn parent_folder_wanted(folders: &[String], root: &Path, candidate: &Path) -> bool {
    if is_unfiltered(folders, root, candidate) {
        return true;
    }
    folders
        .iter()
        .any(|folder| candidate.starts_with(resolve(root, folder)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_filters_want_everything() {
        let none: Vec<String> = Vec::new();
        let root = Path::new("/dest");
        for p in ["/dest/a.txt", "/elsewhere/b", "relative/c.md"] {
            assert!(file_wanted(&none, Path::new(p)));
            assert!(folder_wanted(&none, root, Path::new(p)));
            assert!(parent_folder_wanted(&none, root, Path::new(p)));
        }
    }

    #[test]
    fn extension_match_ignores_case() {
        let exts = list(&[".txt"]);
        assert!(file_wanted(&exts, Path::new("a/b/FILE.TXT")));
        assert!(file_wanted(&exts, Path::new("a/b/file.txt")));
        assert!(!file_wanted(&exts, Path::new("a/b/file.md")));
    }

    #[test]
    fn extension_without_dot_is_a_suffix() {
        let exts = list(&["pdf", "JPG"]);
        assert!(file_wanted(&exts, Path::new("/d/report.pdf")));
        assert!(file_wanted(&exts, Path::new("/d/photo.jpg")));
        assert!(!file_wanted(&exts, Path::new("/d/photo.jpeg")));
    }

    #[test]
    fn folder_filter_accepts_descendants() {
        let folders = list(&["Photos"]);
        let root = Path::new("/dest");
        assert!(folder_wanted(&folders, root, Path::new("/dest/Photos")));
        assert!(folder_wanted(&folders, root, Path::new("/dest/Photos/2024")));
        assert!(!folder_wanted(&folders, root, Path::new("/dest/Docs")));
    }

    #[test]
    fn folder_filter_accepts_ancestors() {
        let folders = list(&["/Work/Projects/Alpha/"]);
        let root = Path::new("/dest");
        assert!(folder_wanted(&folders, root, Path::new("/dest/Work")));
        assert!(folder_wanted(&folders, root, Path::new("/dest/Work/Projects")));
        assert!(!folder_wanted(&folders, root, Path::new("/dest/Work/Other")));
    }

    #[test]
    fn folder_filter_is_component_wise() {
        let folders = list(&["Photos"]);
        let root = Path::new("/dest");
        assert!(!folder_wanted(&folders, root, Path::new("/dest/PhotosOld")));
    }

    #[test]
    fn parent_folder_filter_is_one_directional() {
        let folders = list(&["Work/Projects"]);
        let root = Path::new("/dest");
        assert!(parent_folder_wanted(&folders, root, Path::new("/dest/Work/Projects")));
        assert!(parent_folder_wanted(&folders, root, Path::new("/dest/Work/Projects/A")));
        assert!(!parent_folder_wanted(&folders, root, Path::new("/dest/Work")));
        assert!(!parent_folder_wanted(&folders, root, Path::new("/dest")));
    }

    #[test]
    fn any_configured_folder_suffices() {
        let folders = list(&["Docs", "Photos"]);
        let root = Path::new("/dest");
        assert!(parent_folder_wanted(&folders, root, Path::new("/dest/Photos/x")));
        assert!(folder_wanted(&folders, root, Path::new("/dest/Docs")));
    }
}
