//! Request path resolution module
//!
//! Turns the path component of a request target into a location under the
//! served root. Resolution is purely lexical; the caller still checks the
//! canonical result against the canonical root to catch symlinks.

use std::fmt;
use std::path::{Path, PathBuf};

/// Why a request path could not be resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Percent-decoding produced invalid UTF-8 or a NUL byte
    Malformed,
    /// A `..` segment climbed above the root, or a segment smuggled a separator
    Traversal,
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed request path"),
            Self::Traversal => write!(f, "path escapes the served root"),
        }
    }
}

impl std::error::Error for PathError {}

/// A decoded, normalized request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPath {
    segments: Vec<String>,
    trailing_slash: bool,
}

impl RequestPath {
    /// Parse the path part of a request target
    ///
    /// Query string and fragment are dropped, percent-escapes decoded, empty
    /// and `.` segments skipped, and `..` applied.
    ///
    /// # Examples
    /// ```
    /// use coiserve::http::path::{PathError, RequestPath};
    ///
    /// let p = RequestPath::parse("/a/./b/../c%20d.txt?v=1").unwrap();
    /// assert_eq!(p.display(), "/a/c d.txt");
    ///
    /// assert_eq!(RequestPath::parse("/../etc/passwd"), Err(PathError::Traversal));
    /// ```
    pub fn parse(target: &str) -> Result<Self, PathError> {
        let path = target
            .split(['?', '#'])
            .next()
            .unwrap_or_default();

        let decoded = percent_decode(path)?;
        let trailing_slash = decoded.ends_with('/');

        let mut segments: Vec<String> = Vec::new();
        for segment in decoded.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(PathError::Traversal);
                    }
                }
                s if s.contains('\\') => return Err(PathError::Traversal),
                s => segments.push(s.to_string()),
            }
        }

        Ok(Self {
            segments,
            trailing_slash,
        })
    }

    /// Whether the request named the served root itself
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether the original path ended with `/`
    pub const fn has_trailing_slash(&self) -> bool {
        self.trailing_slash
    }

    /// Normalized, decoded form used in listings and logs (always starts with `/`)
    pub fn display(&self) -> String {
        let mut out = String::from("/");
        out.push_str(&self.segments.join("/"));
        if self.trailing_slash && !self.segments.is_empty() {
            out.push('/');
        }
        out
    }

    /// Normalized path re-encoded for use in a URL (always starts with a
    /// single `/`, so it can never be read as a network-path reference)
    pub fn url_path(&self) -> String {
        let encoded: Vec<String> = self
            .segments
            .iter()
            .map(|s| percent_encode_segment(s))
            .collect();
        let mut out = format!("/{}", encoded.join("/"));
        if self.trailing_slash && !self.segments.is_empty() {
            out.push('/');
        }
        out
    }

    /// Location of this path under `root`
    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(&self.segments);
        path
    }
}

/// Decode `%XX` escapes; invalid escapes are kept as-is
pub fn percent_decode(input: &str) -> Result<String, PathError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    if out.contains(&0) {
        return Err(PathError::Malformed);
    }
    String::from_utf8(out).map_err(|_| PathError::Malformed)
}

/// Encode a single path segment for use in an `href`
pub fn percent_encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for b in segment.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(char::from(b));
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

const fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root() {
        let p = RequestPath::parse("/").unwrap();
        assert!(p.is_root());
        assert_eq!(p.display(), "/");
        assert_eq!(p.to_fs_path(Path::new("/srv")), PathBuf::from("/srv"));
    }

    #[test]
    fn test_simple_file() {
        let p = RequestPath::parse("/js/module.mjs").unwrap();
        assert!(!p.has_trailing_slash());
        assert_eq!(
            p.to_fs_path(Path::new("/srv")),
            PathBuf::from("/srv/js/module.mjs")
        );
    }

    #[test]
    fn test_query_and_fragment_dropped() {
        let p = RequestPath::parse("/index.html?cache=bust#top").unwrap();
        assert_eq!(p.display(), "/index.html");
    }

    #[test]
    fn test_dot_segments() {
        let p = RequestPath::parse("//a/./b/../c/").unwrap();
        assert_eq!(p.display(), "/a/c/");
        assert!(p.has_trailing_slash());
    }

    #[test]
    fn test_url_path() {
        let p = RequestPath::parse("//evil.example").unwrap();
        assert_eq!(p.url_path(), "/evil.example");

        let p = RequestPath::parse("/docs/./my%20notes/").unwrap();
        assert_eq!(p.url_path(), "/docs/my%20notes/");

        assert_eq!(RequestPath::parse("/").unwrap().url_path(), "/");
    }

    #[test]
    fn test_traversal_rejected() {
        assert_eq!(
            RequestPath::parse("/../../etc/passwd"),
            Err(PathError::Traversal)
        );
        assert_eq!(RequestPath::parse("/a/../../b"), Err(PathError::Traversal));
        assert_eq!(
            RequestPath::parse("/%2e%2e/%2E%2E/etc/passwd"),
            Err(PathError::Traversal)
        );
        assert_eq!(
            RequestPath::parse("/a%2f..%2f..%2fsecret"),
            Err(PathError::Traversal)
        );
        assert_eq!(RequestPath::parse("/..%5c..%5cwin.ini"), Err(PathError::Traversal));
    }

    #[test]
    fn test_malformed() {
        assert_eq!(RequestPath::parse("/a%00b"), Err(PathError::Malformed));
        assert_eq!(RequestPath::parse("/%ff%fe"), Err(PathError::Malformed));
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("a%20b").unwrap(), "a b");
        assert_eq!(percent_decode("%E2%9C%93").unwrap(), "\u{2713}");
        // incomplete or invalid escapes are kept literally
        assert_eq!(percent_decode("100%").unwrap(), "100%");
        assert_eq!(percent_decode("%zz").unwrap(), "%zz");
        assert_eq!(percent_decode("%4").unwrap(), "%4");
    }

    #[test]
    fn test_percent_encode_segment() {
        assert_eq!(percent_encode_segment("plain-name_1.txt"), "plain-name_1.txt");
        assert_eq!(percent_encode_segment("a b&c"), "a%20b%26c");
        assert_eq!(percent_encode_segment("\u{2713}"), "%E2%9C%93");
    }
}
