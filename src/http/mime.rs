//! Content-Type selection: a fixed extension table for static files and a
//! crude sniff for handler-generated bodies.

/// Content-Type for a file path, by extension.
pub fn from_extension(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "xml" => "application/xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// Guesses a Content-Type from handler output: an `<HTML>` tag means HTML,
/// a `{` means JSON, anything else is plain text. Applied only when the
/// handler did not set one itself.
pub fn sniff(body: &[u8]) -> &'static str {
    if contains_ignore_case(body, b"<html>") {
        "text/html"
    } else if body.contains(&b'{') {
        "application/json"
    } else {
        "text/plain"
    }
}

fn contains_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|w| w.eq_ignore_ascii_case(needle))
}
