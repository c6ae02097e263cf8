//! # Route Metadata
//!
//! Compiled path templates and the immutable [`Route`] records that the
//! router owns once registration is complete.

use crate::error::{Error, Result};
use crate::hooks::ComposedHandler;
use crate::negotiation::{Consumes, Produces};
use crate::router::{Method, TrailingSlash};
use crate::types::{convert_param, parse_capture, ParamType, ParamValue};
use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;

/// Index of a route in the router's table
pub type RouteId = usize;

/// One segment of a compiled template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Must equal the request segment exactly
    Literal(String),
    /// Bound to `name` when the request segment converts to `kind`
    Capture {
        /// Parameter name
        name: String,
        /// Declared converter
        kind: ParamType,
    },
}

/// Parsed path template such as `/users/<int:id>/files/<path:rest>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
    trailing_slash: bool,
}

impl PathTemplate {
    /// Compile a template.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` when the template does not start
    /// with `/`, contains a malformed capture, repeats a capture name, or
    /// places a `path` capture anywhere but last.
    pub fn parse(template: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidRoutePattern {
            pattern: template.to_string(),
            reason,
        };

        let Some(body) = template.strip_prefix('/') else {
            return Err(invalid("template must start with '/'".to_string()));
        };

        let trailing_slash = !body.is_empty() && body.ends_with('/');
        let body = body.strip_suffix('/').unwrap_or(body);

        let mut segments = Vec::new();
        let mut names = HashSet::new();
        if !body.is_empty() {
            for part in body.split('/') {
                if part.is_empty() {
                    return Err(invalid("empty segment".to_string()));
                }
                match parse_capture(part) {
                    None => segments.push(Segment::Literal(part.to_string())),
                    Some(Err(reason)) => return Err(invalid(reason)),
                    Some(Ok((name, kind))) => {
                        if !names.insert(name.clone()) {
                            return Err(invalid(format!("capture '{name}' appears twice")));
                        }
                        segments.push(Segment::Capture { name, kind });
                    }
                }
            }
        }

        let greedy_before_end = segments
            .iter()
            .rev()
            .skip(1)
            .any(|s| matches!(s, Segment::Capture { kind, .. } if kind.is_greedy()));
        if greedy_before_end {
            return Err(invalid("'path' capture must be the last segment".to_string()));
        }

        Ok(Self {
            raw: template.to_string(),
            segments,
            trailing_slash,
        })
    }

    /// The template as written
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Compiled segments
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether the template was written with a trailing slash
    #[must_use]
    pub const fn has_trailing_slash(&self) -> bool {
        self.trailing_slash
    }

    /// Number of typed captures
    #[must_use]
    pub fn capture_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Capture { .. }))
            .count()
    }

    /// Number of literal segments
    #[must_use]
    pub fn literal_count(&self) -> usize {
        self.segments.len() - self.capture_count()
    }

    /// Whether the template ends in a `path` capture
    #[must_use]
    pub fn is_greedy(&self) -> bool {
        matches!(
            self.segments.last(),
            Some(Segment::Capture { kind, .. }) if kind.is_greedy()
        )
    }

    /// Pattern identity used for duplicate detection.
    ///
    /// Capture names are dropped (`/users/<int:id>` and `/users/<int:uid>`
    /// compile to the same `/users/<int>`); the trailing slash only counts
    /// under the strict policy.
    #[must_use]
    pub fn canonical(&self, policy: TrailingSlash) -> String {
        let mut out = String::from("/");
        let parts: Vec<Cow<'_, str>> = self
            .segments
            .iter()
            .map(|s| match s {
                Segment::Literal(lit) => Cow::Borrowed(lit.as_str()),
                Segment::Capture { kind, .. } => Cow::Owned(format!("<{kind}>")),
            })
            .collect();
        out.push_str(&parts.join("/"));
        if self.trailing_slash && policy == TrailingSlash::Strict {
            out.push('/');
        }
        out
    }

    /// Sort key: fewer captures first, then more literals, then non-greedy
    /// before greedy. Registration order breaks the remaining ties.
    #[must_use]
    pub fn specificity(&self) -> (usize, std::cmp::Reverse<usize>, bool) {
        (
            self.capture_count(),
            std::cmp::Reverse(self.literal_count()),
            self.is_greedy(),
        )
    }

    /// Match split request segments, still percent-encoded.
    ///
    /// Literals compare against the raw text, so `/us%65rs` never matches
    /// `/users`; only capture values are decoded. Returns the converted
    /// captures in template order, or `None` when the shape differs, a
    /// literal differs, or a capture fails to decode or convert.
    #[must_use]
    pub fn matches(&self, request: &[&str]) -> Option<Vec<(String, ParamValue)>> {
        if self.is_greedy() {
            if request.len() < self.segments.len() {
                return None;
            }
        } else if request.len() != self.segments.len() {
            return None;
        }

        let mut params = Vec::with_capacity(self.capture_count());
        for (idx, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(lit) => {
                    if request[idx] != lit.as_str() {
                        return None;
                    }
                }
                Segment::Capture { name, kind } if kind.is_greedy() => {
                    let joined = request[idx..].join("/");
                    let rest = decode_segment(&joined)?;
                    params.push((name.clone(), convert_param(&rest, *kind)?));
                }
                Segment::Capture { name, kind } => {
                    let value = decode_segment(request[idx])?;
                    params.push((name.clone(), convert_param(&value, *kind)?));
                }
            }
        }
        Some(params)
    }
}

/// Percent-decode a capture; `None` when the result is not UTF-8
fn decode_segment(raw: &str) -> Option<Cow<'_, str>> {
    percent_decode_str(raw).decode_utf8().ok()
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A registered route. Never mutated after registration.
pub struct Route {
    /// Position in the router table
    pub id: RouteId,
    /// HTTP method
    pub method: Method,
    /// Compiled template
    pub template: PathTemplate,
    /// Optional endpoint name for logs
    pub name: Option<String>,
    /// Request media-type contract
    pub consumes: Option<Consumes>,
    /// Response media-type contract
    pub produces: Option<Produces>,
    /// Handler wrapped in its hook chain
    pub handler: ComposedHandler,
}

impl Route {
    /// Label used in log lines
    #[must_use]
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{} {}", self.method, self.template),
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("template", &self.template.as_str())
            .field("name", &self.name)
            .field("consumes", &self.consumes)
            .field("produces", &self.produces)
            .field("hooks", &self.handler.hook_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(path: &str) -> Vec<&str> {
        path.trim_start_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect()
    }

    #[test]
    fn test_parse_static() {
        let t = PathTemplate::parse("/users").unwrap();
        assert_eq!(t.segments(), &[Segment::Literal("users".to_string())]);
        assert_eq!(t.capture_count(), 0);
        assert!(!t.has_trailing_slash());
    }

    #[test]
    fn test_parse_root() {
        let t = PathTemplate::parse("/").unwrap();
        assert!(t.segments().is_empty());
        assert_eq!(t.canonical(TrailingSlash::Strict), "/");
        assert!(t.matches(&[]).is_some());
    }

    #[test]
    fn test_parse_typed() {
        let t = PathTemplate::parse("/users/<int:user_id>/posts/<slug>").unwrap();
        assert_eq!(t.capture_count(), 2);
        assert_eq!(t.literal_count(), 2);
        assert_eq!(t.canonical(TrailingSlash::Strict), "/users/<int>/posts/<string>");
    }

    #[test]
    fn test_parse_errors() {
        assert!(PathTemplate::parse("users").is_err());
        assert!(PathTemplate::parse("/users//x").is_err());
        assert!(PathTemplate::parse("/<int:id>/<int:id>").is_err());
        assert!(PathTemplate::parse("/<path:p>/tail").is_err());
        assert!(PathTemplate::parse("/<uuid:id>").is_err());
        assert!(PathTemplate::parse("/a<b").is_err());
    }

    #[test]
    fn test_canonical_trailing_slash() {
        let t = PathTemplate::parse("/users/").unwrap();
        assert!(t.has_trailing_slash());
        assert_eq!(t.canonical(TrailingSlash::Strict), "/users/");
        assert_eq!(t.canonical(TrailingSlash::Lenient), "/users");
    }

    #[test]
    fn test_matches_converts() {
        let t = PathTemplate::parse("/users/<int:id>").unwrap();
        let params = t.matches(&segs("/users/42")).unwrap();
        assert_eq!(params, vec![("id".to_string(), ParamValue::Int(42))]);
        assert!(t.matches(&segs("/users/abc")).is_none());
        assert!(t.matches(&segs("/users/42/extra")).is_none());
    }

    #[test]
    fn test_matches_greedy_path() {
        let t = PathTemplate::parse("/static/<path:file>").unwrap();
        let params = t.matches(&segs("/static/css/site/main.css")).unwrap();
        assert_eq!(
            params,
            vec![("file".to_string(), ParamValue::Path("css/site/main.css".to_string()))]
        );
        assert!(t.matches(&segs("/static")).is_none());
    }

    #[test]
    fn test_matches_decodes_captures_only() {
        let t = PathTemplate::parse("/users/<name>").unwrap();
        let params = t.matches(&segs("/users/ann%20lee")).unwrap();
        assert_eq!(params, vec![("name".to_string(), ParamValue::String("ann lee".to_string()))]);

        assert!(t.matches(&segs("/us%65rs/ann")).is_none());
        assert!(t.matches(&segs("/users/%FF")).is_none());
    }

    #[test]
    fn test_specificity_order() {
        let literal = PathTemplate::parse("/users/me").unwrap();
        let typed = PathTemplate::parse("/users/<int:id>").unwrap();
        let greedy = PathTemplate::parse("/users/<path:rest>").unwrap();
        assert!(literal.specificity() < typed.specificity());
        assert!(typed.specificity() < greedy.specificity());
    }
}
