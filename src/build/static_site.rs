// ABOUTME: Minimal web-server images for static sites.
// ABOUTME: Either copies the checkout directly or copies build output from an intermediate image.

use super::context::join_path;

const DOCUMENT_ROOT: &str = "/usr/share/nginx/html";

/// Dockerfile serving files from the build context.
pub fn from_context(static_image: &str, publish_directory: Option<&str>) -> String {
    let source = join_path(".", publish_directory.unwrap_or("/"));
    format!(
        "FROM {static_image}\nWORKDIR {DOCUMENT_ROOT}/\nCOPY {source}/ .\n"
    )
}

/// Dockerfile serving build output from an intermediate image.
pub fn from_build_image(
    static_image: &str,
    build_image: &str,
    publish_directory: Option<&str>,
) -> String {
    let source = join_path("/app", publish_directory.unwrap_or("/"));
    format!(
        "FROM {static_image}\nWORKDIR {DOCUMENT_ROOT}/\nCOPY --from={build_image} {source}/ .\n"
    )
}
