use std::path::{Path, PathBuf};

/// Check whether a file name is legal as a single path component.
///
/// Rejects empty names, path separators, NUL bytes and the `.`/`..`
/// pseudo-entries.
pub fn check_file_name_legally(file_name: &str) -> bool {
    if file_name.is_empty() || file_name == "." || file_name == ".." {
        return false;
    }

    !file_name
        .chars()
        .any(|c| c == '/' || c == '\\' || c == '\0')
}

/// Join a file name onto a base directory path.
pub fn join_file_name(base: &Path, file_name: &str) -> PathBuf {
    base.join(file_name)
}

/// Combine a list of file names with a base path into full path strings.
///
/// Pure string work, no filesystem access.
pub fn convert_full_paths(files: &[String], base: &Path) -> Vec<String> {
    files
        .iter()
        .map(|name| base.join(name).to_string_lossy().into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_legal_file_names() {
        assert!(check_file_name_legally("notes.txt"));
        assert!(check_file_name_legally("archive-2024.tar.gz"));
        assert!(check_file_name_legally(".hidden"));
    }

    #[test]
    fn test_illegal_file_names() {
        assert!(!check_file_name_legally(""));
        assert!(!check_file_name_legally("."));
        assert!(!check_file_name_legally(".."));
        assert!(!check_file_name_legally("a/b.txt"));
        assert!(!check_file_name_legally("a\\b.txt"));
        assert!(!check_file_name_legally("nul\0byte"));
    }

    #[test]
    fn test_convert_full_paths() {
        let files = vec!["a.txt".to_string(), "b.txt".to_string()];
        let full = convert_full_paths(&files, Path::new("/data"));
        assert_eq!(full, vec!["/data/a.txt", "/data/b.txt"]);
    }

    #[test]
    fn test_join_file_name() {
        let joined = join_file_name(Path::new("/tmp/work"), "out.log");
        assert_eq!(joined, PathBuf::from("/tmp/work/out.log"));
    }
}
