//! File collaborator: text file I/O and note discovery

use std::io;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

/// Read a UTF-8 text file. I/O errors are returned unmodified.
pub fn read_text_file(path: &Path) -> io::Result<String> {
    std::fs::read_to_string(path)
}

/// Write a text file, creating parent directories as needed
pub fn write_text_file(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)
}

/// Check if a path names a markdown file
pub fn is_markdown(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext == "md" || ext == "markdown")
        .unwrap_or(false)
}

fn is_skipped(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    // Hidden entries and common non-content directories
    name.starts_with('.') || (entry.file_type().is_dir() && (name == "node_modules" || name == "target"))
}

/// Get all markdown files in a directory recursively, sorted by path
pub fn get_markdown_files(path: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_markdown(e.path()))
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}
