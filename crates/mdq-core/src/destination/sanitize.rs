//! Linux-safe filename sanitization.

/// Sanitizes a candidate filename for safe use on Linux.
///
/// - Replaces NUL, `/`, `\`, and control characters with `_`
/// - Collapses consecutive underscores and whitespace runs
/// - Trims leading/trailing spaces, dots and underscores
/// - Limits length to 255 bytes (Linux NAME_MAX)
///
/// Single spaces are kept; media file names are usually human-readable.
pub fn sanitize_filename_for_linux(name: &str) -> String {
    const NAME_MAX: usize = 255;

    let mut out = String::with_capacity(name.len());
    let mut prev = None::<char>;

    for c in name.chars() {
        let replacement = if c == ' ' || c == '\t' {
            ' '
        } else if c == '\0' || c == '/' || c == '\\' || c.is_control() {
            '_'
        } else {
            c
        };
        if (replacement == '_' || replacement == ' ') && prev == Some(replacement) {
            continue;
        }
        out.push(replacement);
        prev = Some(replacement);
    }

    let trimmed = out.trim_matches(|c| c == ' ' || c == '.' || c == '_');

    if trimmed.len() > NAME_MAX {
        let mut take = NAME_MAX;
        while take > 0 && !trimmed.is_char_boundary(take) {
            take -= 1;
        }
        trimmed[..take].to_string()
    } else {
        trimmed.to_string()
    }
}
