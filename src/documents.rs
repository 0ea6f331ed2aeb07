// Local document discovery and mime type lookup for uploads.

use mime::Mime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_EXTENSIONS: &[&str] = &["txt", "pdf", "md"];

/// Files in `dir` whose extension is in `extensions`, grouped in the order
/// the extensions are given and sorted by name within a group.
///
/// Returns `Ok(None)` when `dir` does not exist or is not a directory.
pub fn discover_documents(dir: &Path, extensions: &[String]) -> io::Result<Option<Vec<PathBuf>>> {
    if !dir.is_dir() {
        return Ok(None);
    }

    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            candidates.push(path);
        }
    }
    candidates.sort();

    let mut found = Vec::new();
    for ext in extensions {
        let ext = ext.trim_start_matches('.');
        found.extend(
            candidates
                .iter()
                .filter(|p| {
                    p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
                })
                .cloned(),
        );
    }
    Ok(Some(found))
}

/// Mime type announced to the upload endpoint for `path`.
pub fn mime_for(path: &Path) -> Mime {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("txt") => mime::TEXT_PLAIN,
        Some("md" | "markdown") => "text/markdown".parse().unwrap_or(mime::TEXT_PLAIN),
        Some("pdf") => mime::APPLICATION_PDF,
        Some("html" | "htm") => mime::TEXT_HTML,
        Some("csv") => mime::TEXT_CSV,
        Some("json") => mime::APPLICATION_JSON,
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}
