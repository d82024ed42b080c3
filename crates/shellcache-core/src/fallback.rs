//! Synthetic responses for when neither the network nor a store can help.
//! None of these are ever written to a cache store.

use crate::classify::ResourceClass;
use crate::models::Response;

const PLACEHOLDER_SVG: &str = concat!(
    r##"<svg width="280" height="200" viewBox="0 0 280 200" fill="none" xmlns="http://www.w3.org/2000/svg">"##,
    r##"<rect width="280" height="200" fill="#f8f6f0"/>"##,
    r##"<path d="M140 100L120 80L160 80L140 100Z" fill="#ccc"/>"##,
    r##"</svg>"##,
);


/// Placeholder for an unavailable resource of the given class. Only images
/// have one.
pub fn placeholder_for(class: ResourceClass) -> Option<Response> {
    match class {
        ResourceClass::Image => Some(
            Response::new(200, PLACEHOLDER_SVG)
                .with_header("content-type", "image/svg+xml")
                .with_header("cache-control", "no-cache"),
        ),
        ResourceClass::Shell | ResourceClass::Default => None,
    }
}

/// Served in place of the shell-root document when it cannot be fetched.
pub fn offline_document(app_name: &str) -> Response {
    let name = escape_html(app_name);
    let body = format!(
        "<!DOCTYPE html><html><head><title>{name} - Offline</title></head>\
         <body><h1>{name}</h1><p>You are offline. Please check your connection.</p></body></html>"
    );
    Response::new(200, body).with_header("content-type", "text/html; charset=utf-8")
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn service_unavailable() -> Response {
    Response::new(503, "Offline").with_header("content-type", "text/plain; charset=utf-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_placeholder() {
        let resp = placeholder_for(ResourceClass::Image).unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_type(), Some("image/svg+xml"));
        assert_eq!(resp.header("cache-control"), Some("no-cache"));
        assert!(resp.body.starts_with(b"<svg"));
    }

    #[test]
    fn test_placeholder_is_deterministic() {
        assert_eq!(
            placeholder_for(ResourceClass::Image),
            placeholder_for(ResourceClass::Image)
        );
    }

    #[test]
    fn test_no_placeholder_for_other_classes() {
        assert!(placeholder_for(ResourceClass::Shell).is_none());
        assert!(placeholder_for(ResourceClass::Default).is_none());
    }

    #[test]
    fn test_offline_and_unavailable() {
        let doc = offline_document("Spice Affair");
        assert_eq!(doc.status, 200);
        assert!(doc.content_type().unwrap().starts_with("text/html"));
        let html = String::from_utf8(doc.body).unwrap();
        assert!(html.contains("<title>Spice Affair - Offline</title>"));
        assert!(html.contains("<h1>Spice Affair</h1>"));

        let unavailable = service_unavailable();
        assert_eq!(unavailable.status, 503);
        assert_eq!(unavailable.body, b"Offline");
    }

    #[test]
    fn test_offline_document_escapes_name() {
        let doc = offline_document("Fish & <Chips>");
        let html = String::from_utf8(doc.body).unwrap();
        assert!(html.contains("<h1>Fish &amp; &lt;Chips&gt;</h1>"));
    }
}
