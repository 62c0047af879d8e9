// Request serving - answer test runner file requests from the bundles

use crate::bundle::BundlesView;
use crate::path_key::{compute_key, force_js_extension, normalize_separators};
use std::collections::BTreeMap;

pub const NOT_FOUND_BODY: &str = "Not found";
pub const NOT_FOUND_STATUS: &str = "404 Not found";

/// What the `serve` hook hands back to the test runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeResponse {
    /// Bundle source; the host wraps it with a JavaScript content type
    Body(String),

    /// A full response with explicit headers
    Response {
        body: String,
        headers: BTreeMap<String, String>,
    },
}

impl ServeResponse {
    /// The response for files that are not part of the bundle output
    ///
    /// Unrelated static assets end up here; the host falls through to its
    /// own handling.
    pub fn not_found() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("status".to_string(), NOT_FOUND_STATUS.to_string());
        ServeResponse::Response {
            body: NOT_FOUND_BODY.to_string(),
            headers,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            ServeResponse::Body(_) => false,
            ServeResponse::Response { headers, .. } => {
                headers.get("status").map(String::as_str) == Some(NOT_FOUND_STATUS)
            }
        }
    }

    pub fn body(&self) -> &str {
        match self {
            ServeResponse::Body(body) | ServeResponse::Response { body, .. } => body,
        }
    }
}

/// Bundle name a requested file is served from
///
/// The key hashes the request path with its original extension, then swaps
/// that extension for `.js`: `test/a.ts` becomes `a.<sha256("test/a.ts")>.js`,
/// matching the `<entry key>.js` webpack emits for the same file.
pub fn bundle_name(request_path: &str) -> String {
    let normalized = normalize_separators(request_path);
    force_js_extension(&compute_key(&normalized, true))
}

/// Look up the bundle for `request_path`
pub fn serve(bundles: &BundlesView, request_path: &str) -> ServeResponse {
    let name = bundle_name(request_path);

    match bundles.get(&name) {
        Some(content) => {
            tracing::debug!(path = request_path, bundle = %name, "Serving bundle");
            ServeResponse::Body(content)
        }
        None => ServeResponse::not_found(),
    }
}
