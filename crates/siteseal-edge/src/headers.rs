//! Security and content-type headers for verified responses.
//!
//! The gate delegates header construction here: the collaborator receives a
//! header map and the served filename, mutates the map in place, and
//! returns nothing. Only verified responses get site headers; generic
//! failure bodies carry none of these.

use axum::http::header::{HeaderMap, HeaderValue};

/// Content Security Policy for a fully static, script-free site.
const CSP: &str = "default-src 'none'; style-src 'self'; img-src 'self' data:; \
                   form-action 'none'; frame-ancestors 'none'; base-uri 'none'";

/// Set security headers and a content type derived from the filename.
pub fn apply_security_headers(headers: &mut HeaderMap, path: &str) {
    headers.insert("content-security-policy", HeaderValue::from_static(CSP));
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));
    headers.insert(
        "permissions-policy",
        HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
    );
    headers.insert("content-type", HeaderValue::from_static(content_type_for(path)));
}

/// Map a filename extension to a content type. Unknown extensions get the
/// generic byte type rather than a guess.
#[must_use]
pub fn content_type_for(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or_default() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        "xml" => "application/xml",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type_for("index.html"), "text/html; charset=utf-8");
        assert_eq!(content_type_for("css/site.css"), "text/css; charset=utf-8");
        assert_eq!(content_type_for("logo.svg"), "image/svg+xml");
        assert_eq!(content_type_for("blob"), "application/octet-stream");
        assert_eq!(content_type_for("archive.tar.gz"), "application/octet-stream");
    }

    #[test]
    fn security_headers_are_all_present() {
        let mut headers = HeaderMap::new();
        apply_security_headers(&mut headers, "index.html");
        for name in [
            "content-security-policy",
            "x-content-type-options",
            "x-frame-options",
            "referrer-policy",
            "permissions-policy",
            "content-type",
        ] {
            assert!(headers.contains_key(name), "missing header {name}");
        }
        assert_eq!(headers["content-security-policy"], CSP);
    }
}
