//! Append-only log files shared between one writer and tail readers.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Pick a path that does not collide with an existing file.
///
/// `key.txt` is returned as-is when free; otherwise `key_1.txt`, `key_2.txt`
/// and so on are tried in order.
pub fn unique_log_path(base: &Path) -> PathBuf {
    if !base.exists() {
        return base.to_path_buf();
    }

    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "log".to_string());
    let extension = base.extension().map(|e| e.to_string_lossy().into_owned());
    let parent = base.parent().unwrap_or_else(|| Path::new(""));

    let mut counter: u32 = 1;
    loop {
        let name = match &extension {
            Some(ext) => format!("{stem}_{counter}.{ext}"),
            None => format!("{stem}_{counter}"),
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Append `text` to `path` in a single write, creating the file if needed.
pub fn append_text(path: &Path, text: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(text.as_bytes())?;
    file.flush()
}

/// Read the last `n` lines of `path` as it stands right now.
///
/// The file is opened independently of its writer and read up to the current
/// end, so a concurrent append is either fully visible or not at all for the
/// lines that matter. Invalid UTF-8 is replaced rather than rejected.
pub fn tail_lines(path: &Path, n: usize) -> io::Result<Vec<String>> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);

    let mut lines: Vec<String> = text.lines().rev().take(n).map(str::to_string).collect();
    lines.reverse();
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_path_when_free() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("key.txt");
        assert_eq!(unique_log_path(&base), base);
    }

    #[test]
    fn test_unique_path_suffix_search() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("key.txt");

        std::fs::write(&base, "old run").unwrap();
        assert_eq!(unique_log_path(&base), dir.path().join("key_1.txt"));

        std::fs::write(dir.path().join("key_1.txt"), "older run").unwrap();
        assert_eq!(unique_log_path(&base), dir.path().join("key_2.txt"));

        // The base file is never touched.
        assert_eq!(std::fs::read_to_string(&base).unwrap(), "old run");
    }

    #[test]
    fn test_unique_path_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("keylog");
        std::fs::write(&base, "").unwrap();
        assert_eq!(unique_log_path(&base), dir.path().join("keylog_1"));
    }

    #[test]
    fn test_append_and_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");

        for i in 0..100 {
            append_text(&path, &format!("line {i}\n")).unwrap();
        }

        let tail = tail_lines(&path, 3).unwrap();
        assert_eq!(tail, vec!["line 97", "line 98", "line 99"]);

        let all = tail_lines(&path, 500).unwrap();
        assert_eq!(all.len(), 100);
        assert_eq!(all[0], "line 0");
    }

    #[test]
    fn test_tail_of_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(tail_lines(&dir.path().join("missing.txt"), 5).is_err());
    }
}
