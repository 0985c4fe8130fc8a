//! Single route pattern matching
//!
//! Patterns are `/`-separated segments: literals, `:name` parameters and a
//! trailing `*` that captures the rest of the path as `splat`.

use std::fmt;

/// Parameter name a trailing `*` captures into.
pub const SPLAT: &str = "splat";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
    Splat,
}

/// A parsed route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    /// Parse `pattern`.
    ///
    /// # Errors
    ///
    /// Returns error if a parameter has no name or `*` is not the last segment.
    pub fn parse(pattern: &str) -> Result<Self, RouteError> {
        let parts: Vec<&str> = split_path(pattern).collect();
        let mut segments = Vec::with_capacity(parts.len());

        for (idx, part) in parts.iter().enumerate() {
            let segment = if *part == "*" {
                if idx + 1 != parts.len() {
                    return Err(RouteError::SplatNotLast(pattern.to_string()));
                }
                Segment::Splat
            } else if let Some(name) = part.strip_prefix(':') {
                if name.is_empty() {
                    return Err(RouteError::EmptyParam(pattern.to_string()));
                }
                Segment::Param(name.to_string())
            } else {
                Segment::Static((*part).to_string())
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// Match `path`, returning captured `(name, value)` pairs in pattern order.
    ///
    /// A trailing `*` matches zero or more segments; an empty remainder
    /// captures an empty `splat`.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<Vec<(String, String)>> {
        let parts: Vec<&str> = split_path(path).collect();
        let mut params = Vec::new();

        for (idx, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Splat => {
                    let rest = parts.get(idx..).unwrap_or_default().join("/");
                    params.push((SPLAT.to_string(), rest));
                    return Some(params);
                }
                Segment::Static(literal) => {
                    if parts.get(idx) != Some(&literal.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = parts.get(idx)?;
                    params.push((name.clone(), (*value).to_string()));
                }
            }
        }

        (parts.len() == self.segments.len()).then_some(params)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("route '{0}' has a parameter without a name")]
    EmptyParam(String),
    #[error("route '{0}' has '*' before the last segment")]
    SplatNotLast(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn static_route_matches_exactly() {
        let route = RoutePattern::parse("/health").unwrap();
        assert_eq!(route.matches("/health"), Some(vec![]));
        assert_eq!(route.matches("/health/extra"), None);
        assert_eq!(route.matches("/other"), None);
    }

    #[test]
    fn named_params_are_captured() {
        let route = RoutePattern::parse("/users/:id/posts/:post").unwrap();
        assert_eq!(
            route.matches("/users/42/posts/7"),
            Some(pairs(&[("id", "42"), ("post", "7")]))
        );
        assert_eq!(route.matches("/users/42"), None);
    }

    #[test]
    fn splat_captures_remainder() {
        let route = RoutePattern::parse("/files/*").unwrap();
        assert_eq!(
            route.matches("/files/a/b/c.txt"),
            Some(pairs(&[("splat", "a/b/c.txt")]))
        );
        assert_eq!(route.matches("/files"), Some(pairs(&[("splat", "")])));
    }

    #[test]
    fn invalid_patterns_rejected() {
        assert_eq!(
            RoutePattern::parse("/a/*/b"),
            Err(RouteError::SplatNotLast("/a/*/b".into()))
        );
        assert_eq!(
            RoutePattern::parse("/a/:"),
            Err(RouteError::EmptyParam("/a/:".into()))
        );
    }

    proptest! {
        #[test]
        fn splat_joins_any_tail(tail in proptest::collection::vec("[a-z0-9]{1,6}", 0..5)) {
            let route = RoutePattern::parse("/static/*").unwrap();
            let path = format!("/static/{}", tail.join("/"));
            let captured = route.matches(&path).unwrap();
            prop_assert_eq!(captured, vec![(SPLAT.to_string(), tail.join("/"))]);
        }
    }
}
