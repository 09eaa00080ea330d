//! Minimalist glob path matcher shared by all pipeline stages.
//!
//! - `*` or `**` matches any path.
//! - A pattern ending in `/*` or `/**` matches any path beginning with the
//!   pattern's prefix (case-insensitive).
//! - Anything else is case-insensitive exact equality.
//! - A `?query=...` suffix is stripped from the path before matching.
//! - An empty pattern never matches.

/// Strip a `?query` suffix from a path, if present.
pub fn strip_query(path: &str) -> &str {
    match path.find('?') {
        Some(idx) => &path[..idx],
        None => path,
    }
}

/// Check whether `path` matches `pattern` under the rules above.
pub fn matches(pattern: &str, path: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }

    let path = strip_query(path);

    if pattern == "*" || pattern == "**" {
        return true;
    }

    if let Some(prefix) = pattern.strip_suffix("/**") {
        return path_has_prefix(prefix, path);
    }
    if let Some(prefix) = pattern.strip_suffix("/*") {
        return path_has_prefix(prefix, path);
    }

    pattern.eq_ignore_ascii_case(path)
}

fn path_has_prefix(prefix: &str, path: &str) -> bool {
    let prefix_lower = prefix.to_ascii_lowercase();
    let path_lower = path.to_ascii_lowercase();
    path_lower.starts_with(&prefix_lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_anything() {
        assert!(matches("*", "/anything/at/all"));
        assert!(matches("**", "/other"));
    }

    #[test]
    fn prefix_patterns_are_prefix_match() {
        assert!(matches("/api/*", "/api/v1/ping"));
        assert!(matches("/api/**", "/api/v1/ping"));
        assert!(!matches("/api/*", "/other"));
    }

    #[test]
    fn exact_match_is_case_insensitive() {
        assert!(matches("/Health", "/health"));
        assert!(!matches("/health", "/healthcheck"));
    }

    #[test]
    fn query_string_is_stripped_before_matching() {
        assert!(matches("/api/users", "/api/users?id=1"));
        assert!(matches("/api/*", "/api/users?id=1"));
    }

    #[test]
    fn empty_pattern_never_matches() {
        assert!(!matches("", "/anything"));
        assert!(!matches("", ""));
    }

    #[test]
    fn prefix_match_is_case_insensitive() {
        assert!(matches("/API/*", "/api/users"));
    }
}
