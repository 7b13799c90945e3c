//! Generated-file helpers: the format→MIME map and owner-scoped paths.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Formats `create_file` accepts.
pub const FORMATS: [&str; 6] = ["txt", "md", "csv", "html", "json", "ics"];

pub fn mime_for(format: &str) -> Option<&'static str> {
    match format {
        "txt" => Some("text/plain; charset=utf-8"),
        "md" => Some("text/markdown; charset=utf-8"),
        "csv" => Some("text/csv; charset=utf-8"),
        "html" => Some("text/html; charset=utf-8"),
        "json" => Some("application/json"),
        "ics" => Some("text/calendar; charset=utf-8"),
        _ => None,
    }
}

/// What the client needs to offer a download.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedFile {
    pub filename: String,
    pub url: String,
    pub format: String,
    pub size: usize,
}

/// Make a user-supplied name safe for an object key and give it the
/// format's extension.
pub fn sanitize_filename(name: &str, format: &str) -> String {
    let mut stem: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let suffix = format!(".{format}");
    if stem.to_ascii_lowercase().ends_with(&suffix) {
        stem.truncate(stem.len() - suffix.len());
    }
    let stem = stem.trim_matches(|c| c == '-' || c == '.');
    let stem = if stem.is_empty() { "file" } else { stem };
    let stem: String = stem.chars().take(80).collect();
    format!("{stem}.{format}")
}

/// `<owner>/<yyyy-mm-dd>/<unique>-<filename>`. The owner prefix keeps every
/// object inside the owner's namespace.
pub fn object_path(owner: &str, filename: &str, now: DateTime<Utc>) -> String {
    let unique = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{owner}/{}/{}-{filename}",
        now.format("%Y-%m-%d"),
        &unique[..8]
    )
}
