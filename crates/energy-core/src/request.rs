// Request path helpers

/// Normalise a request path and query into a cache key.
///
/// The path is lowercased with trailing slashes removed, and query pairs are
/// sorted so that `?a=1&b=2` and `?b=2&a=1` share an entry.
pub fn normalize_request_key(path: &str, query: Option<&str>) -> String {
    let path = path.trim_end_matches('/').to_lowercase();

    let mut pairs: Vec<&str> = query
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .collect();
    pairs.sort_unstable();

    if pairs.is_empty() {
        path
    } else {
        format!("{}?{}", path, pairs.join("&"))
    }
}

/// Split the remainder of a path into non-empty segments.
pub fn path_segments(rest: &str) -> Vec<&str> {
    rest.split('/').filter(|segment| !segment.is_empty()).collect()
}
