//! MIME type detection module
//!
//! Returns the Content-Type for a served file based on its extension.
//! The system table comes from `mime_guess`; a small set of overrides is
//! layered on top so module scripts and WebAssembly get the types browsers
//! insist on.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Fallback for unknown or missing extensions
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Overrides that always apply, before any user configuration
pub const BUILTIN_OVERRIDES: [(&str, &str); 2] =
    [("mjs", "text/javascript"), ("wasm", "application/wasm")];

/// Immutable extension -> Content-Type lookup
#[derive(Debug, Clone)]
pub struct MimeTable {
    overrides: HashMap<String, String>,
}

impl MimeTable {
    /// Build the table from the built-in overrides plus `extra`.
    ///
    /// Keys may carry a leading dot and are matched case-insensitively;
    /// entries in `extra` replace built-in ones.
    pub fn new(extra: &BTreeMap<String, String>) -> Self {
        let overrides = BUILTIN_OVERRIDES
            .iter()
            .map(|(ext, ty)| ((*ext).to_string(), (*ty).to_string()))
            .chain(
                extra
                    .iter()
                    .map(|(ext, ty)| (normalize_extension(ext), ty.clone())),
            )
            .collect();

        Self { overrides }
    }

    /// Content-Type for `path`
    ///
    /// # Examples
    /// ```
    /// use coiserve::http::mime::MimeTable;
    /// use std::path::Path;
    ///
    /// let table = MimeTable::new(&Default::default());
    /// assert_eq!(table.content_type(Path::new("worker.wasm")), "application/wasm");
    /// assert_eq!(table.content_type(Path::new("module.mjs")), "text/javascript");
    /// assert_eq!(table.content_type(Path::new("LICENSE")), "application/octet-stream");
    /// ```
    pub fn content_type(&self, path: &Path) -> &str {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return DEFAULT_CONTENT_TYPE;
        };
        self.content_type_for_extension(ext)
    }

    /// Content-Type for a bare extension (with or without the leading dot)
    pub fn content_type_for_extension(&self, ext: &str) -> &str {
        let ext = normalize_extension(ext);
        if let Some(ty) = self.overrides.get(&ext) {
            return ty;
        }
        mime_guess::from_ext(&ext)
            .first_raw()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
    }
}

impl Default for MimeTable {
    fn default() -> Self {
        Self::new(&BTreeMap::new())
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_overrides() {
        let table = MimeTable::default();
        assert_eq!(table.content_type(Path::new("a/module.mjs")), "text/javascript");
        assert_eq!(table.content_type(Path::new("worker.wasm")), "application/wasm");
    }

    #[test]
    fn test_system_types() {
        let table = MimeTable::default();
        assert_eq!(table.content_type(Path::new("index.html")), "text/html");
        assert_eq!(table.content_type(Path::new("style.css")), "text/css");
        assert_eq!(table.content_type(Path::new("logo.png")), "image/png");
        assert_eq!(table.content_type(Path::new("notes.txt")), "text/plain");
    }

    #[test]
    fn test_case_insensitive() {
        let table = MimeTable::default();
        assert_eq!(table.content_type(Path::new("WORKER.WASM")), "application/wasm");
        assert_eq!(table.content_type(Path::new("Index.HTML")), "text/html");
    }

    #[test]
    fn test_unknown_extension() {
        let table = MimeTable::default();
        assert_eq!(table.content_type(Path::new("data.xyzzy")), DEFAULT_CONTENT_TYPE);
        assert_eq!(table.content_type(Path::new("Makefile")), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_user_overrides() {
        let mut extra = BTreeMap::new();
        extra.insert(".glsl".to_string(), "text/x-glsl".to_string());
        extra.insert("WASM".to_string(), "application/x-custom".to_string());
        let table = MimeTable::new(&extra);

        assert_eq!(table.content_type(Path::new("shader.glsl")), "text/x-glsl");
        assert_eq!(table.content_type(Path::new("w.wasm")), "application/x-custom");
        assert_eq!(table.content_type_for_extension(".mjs"), "text/javascript");
    }
}
