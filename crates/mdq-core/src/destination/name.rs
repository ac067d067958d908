//! Filename derivation from a source locator.

use std::path::Path;

use super::sanitize::sanitize_filename_for_linux;

/// Default filename when the source yields nothing usable.
const DEFAULT_FILENAME: &str = "download.bin";

/// Last path segment of a URL, or file name of a plain path, sanitized.
pub fn filename_from_source(source: &str) -> String {
    let raw = match url::Url::parse(source) {
        Ok(url) => last_segment(url.path()),
        Err(_) => Path::new(source)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned()),
    };
    let sanitized = raw
        .map(|r| sanitize_filename_for_linux(&r))
        .unwrap_or_default();
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        DEFAULT_FILENAME.to_string()
    } else {
        sanitized
    }
}

fn last_segment(path: &str) -> Option<String> {
    let segment = path.split('/').filter(|s| !s.is_empty()).last()?;
    if segment == "." || segment == ".." {
        return None;
    }
    Some(segment.to_string())
}
