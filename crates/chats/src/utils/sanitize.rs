//! Sanitizers applied to untrusted client input before it is stored.

/// Longest display filename kept for an upload, in characters.
pub const MAX_FILENAME_CHARS: usize = 255;

/// Escape angle brackets so stored text cannot inject markup into clients.
pub fn escape_markup(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Reduce a client-supplied filename to a display label.
///
/// Directory components are stripped (both separators), control characters
/// removed, markup escaped and the result truncated. Empty names become
/// `"upload"`.
pub fn display_filename(raw: &str) -> String {
    let base = raw
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_FILENAME_CHARS)
        .collect();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return "upload".to_string();
    }

    escape_markup(&cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_angle_brackets_only() {
        assert_eq!(
            escape_markup("<script>alert('x') & co</script>"),
            "&lt;script&gt;alert('x') & co&lt;/script&gt;"
        );
        assert_eq!(escape_markup("plain text"), "plain text");
    }

    #[test]
    fn display_filename_strips_directories() {
        assert_eq!(display_filename("../../etc/passwd"), "passwd");
        assert_eq!(display_filename(r"C:\Users\me\notes.txt"), "notes.txt");
        assert_eq!(display_filename("photo.png"), "photo.png");
    }

    #[test]
    fn display_filename_falls_back_for_empty_names() {
        assert_eq!(display_filename(""), "upload");
        assert_eq!(display_filename("dir/"), "upload");
        assert_eq!(display_filename(".."), "upload");
    }

    #[test]
    fn display_filename_escapes_and_truncates() {
        assert_eq!(display_filename("<b>.txt"), "&lt;b&gt;.txt");
        let long = "a".repeat(400);
        assert_eq!(display_filename(&long).chars().count(), MAX_FILENAME_CHARS);
    }
}
