//! Directory listing module
//!
//! Renders the HTML index for directories that have no index file.

use std::io;
use std::path::Path;
use tokio::fs;

use crate::http::path::percent_encode_segment;

/// One row of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub is_dir: bool,
    pub is_symlink: bool,
}

impl ListingEntry {
    fn href(&self) -> String {
        let mut href = percent_encode_segment(&self.name);
        if self.is_dir {
            href.push('/');
        }
        href
    }

    fn label(&self) -> String {
        let mut label = self.name.clone();
        if self.is_dir {
            label.push('/');
        }
        if self.is_symlink {
            label.push('@');
        }
        label
    }
}

/// Read `dir` and return its entries sorted case-insensitively by name
pub async fn read_entries(dir: &Path) -> io::Result<Vec<ListingEntry>> {
    let mut read_dir = fs::read_dir(dir).await?;
    let mut entries = Vec::new();

    while let Some(entry) = read_dir.next_entry().await? {
        let is_symlink = entry
            .file_type()
            .await
            .map(|t| t.is_symlink())
            .unwrap_or(false);
        // follows symlinks, so a link to a directory lists as a directory
        let is_dir = fs::metadata(entry.path())
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);

        entries.push(ListingEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir,
            is_symlink,
        });
    }

    entries.sort_by_cached_key(|e| e.name.to_lowercase());
    Ok(entries)
}

/// Render the listing page for `display_path` (the decoded request path)
pub fn render(display_path: &str, entries: &[ListingEntry]) -> String {
    let title = format!("Directory listing for {}", html_escape(display_path));

    let mut html = String::with_capacity(256 + entries.len() * 64);
    html.push_str("<!DOCTYPE HTML>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{title}</title>\n"));
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!("<h1>{title}</h1>\n<hr>\n<ul>\n"));
    for entry in entries {
        html.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>\n",
            html_escape(&entry.href()),
            html_escape(&entry.label())
        ));
    }
    html.push_str("</ul>\n<hr>\n</body>\n</html>\n");
    html
}

fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, is_dir: bool) -> ListingEntry {
        ListingEntry {
            name: name.to_string(),
            is_dir,
            is_symlink: false,
        }
    }

    #[test]
    fn test_render() {
        let html = render("/pkg/", &[entry("wasm", true), entry("ort.mjs", false)]);
        assert!(html.contains("<title>Directory listing for /pkg/</title>"));
        assert!(html.contains("<li><a href=\"wasm/\">wasm/</a></li>"));
        assert!(html.contains("<li><a href=\"ort.mjs\">ort.mjs</a></li>"));
    }

    #[test]
    fn test_render_escapes_names() {
        let html = render("/<x>/", &[entry("a b&<c>.txt", false)]);
        assert!(html.contains("Directory listing for /&lt;x&gt;/"));
        assert!(html.contains("href=\"a%20b%26%3Cc%3E.txt\""));
        assert!(html.contains(">a b&amp;&lt;c&gt;.txt</a>"));
    }

    #[test]
    fn test_symlink_label() {
        let link = ListingEntry {
            name: "latest".to_string(),
            is_dir: true,
            is_symlink: true,
        };
        assert_eq!(link.label(), "latest/@");
        assert_eq!(link.href(), "latest/");
    }

    #[tokio::test]
    async fn test_read_entries_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("A.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("c")).unwrap();

        let entries = read_entries(dir.path()).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A.txt", "b.txt", "c"]);
        assert!(entries[2].is_dir);
        assert!(!entries[0].is_dir);
    }
}
