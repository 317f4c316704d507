//! Request-path sanitization shared by the serve and download handlers.
//!
//! Grounded on `net/http`'s `ServeFile`, which refuses any request path
//! containing a `..` element after cleaning rather than resolving it:
//! this resolves the percent-decoded path, rejects `..` traversal and
//! absolute components, and returns a root-relative path safe to join
//! onto `serve_dir`.

use percent_encoding::percent_decode_str;

/// Resolve `request_path` (e.g. `/a/b.txt`) to a path relative to
/// `serve_dir`, refusing any path that would escape it via `..` or
/// null bytes. Returns `None` if the path is unsafe.
pub fn sanitize(request_path: &str) -> Option<String> {
    let decoded = percent_decode_str(request_path).decode_utf8().ok()?;
    if decoded.contains('\0') {
        return None;
    }

    let mut components: Vec<&str> = Vec::new();
    for part in decoded.split('/') {
        match part {
            "" | "." => continue,
            ".." => return None,
            other => components.push(other),
        }
    }

    Some(components.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_path_passes_through() {
        assert_eq!(sanitize("/a/b.txt").as_deref(), Some("a/b.txt"));
    }

    #[test]
    fn parent_traversal_is_rejected() {
        assert_eq!(sanitize("/../etc/passwd"), None);
        assert_eq!(sanitize("/a/../../etc/passwd"), None);
    }

    #[test]
    fn encoded_traversal_is_rejected() {
        assert_eq!(sanitize("/a/%2e%2e/secret"), None);
    }

    #[test]
    fn redundant_slashes_and_dot_segments_are_collapsed() {
        assert_eq!(sanitize("//a//./b.txt").as_deref(), Some("a/b.txt"));
    }

    #[test]
    fn null_byte_is_rejected() {
        assert_eq!(sanitize("/a%00b"), None);
    }
}
