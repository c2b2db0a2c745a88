//! Path pattern matching.
//!
//! # Responsibilities
//! - Compile registered path strings into segment patterns
//! - Match request paths exactly (endpoints) or by scope (filters)
//! - Extract `:param` values
//!
//! # Design Decisions
//! - Segments split on `/`, empty segments ignored: `""` and `/` are root
//! - Literal segments are case-sensitive
//! - `*` is a whole segment and matches zero or more segments
//! - No regex; backtracking only on wildcards, memoized per position

use thiserror::Error;

use crate::http::PathParams;

/// Pattern that matches every path.
pub const ALL_PATHS: &str = "*";

/// Reasons a path string is not a valid pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("path must be empty, '*', or start with '/'")]
    MissingLeadingSlash,

    #[error("path must not contain whitespace")]
    ContainsWhitespace,

    #[error("path parameter at segment {0} has no name")]
    EmptyParamName(usize),

    #[error("path parameter ':{0}' appears more than once")]
    DuplicateParam(String),

    #[error("wildcard '*' must be a whole segment, found '{0}'")]
    MisplacedWildcard(String),
}

/// Options that change how request paths are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOptions {
    /// Treat `/users/` like `/users`.
    pub ignore_trailing_slashes: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            ignore_trailing_slashes: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard,
}

/// A compiled path pattern such as `/users/:id/*`.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
    trailing_slash: bool,
}

impl PathPattern {
    /// Compile a pattern, rejecting malformed paths.
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        if !(raw.is_empty() || raw == ALL_PATHS || raw.starts_with('/')) {
            return Err(PatternError::MissingLeadingSlash);
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(PatternError::ContainsWhitespace);
        }

        let mut segments = Vec::new();
        let mut seen_params: Vec<&str> = Vec::new();
        for (index, segment) in split_segments(raw).into_iter().enumerate() {
            if segment == ALL_PATHS {
                segments.push(Segment::Wildcard);
            } else if segment.contains('*') {
                return Err(PatternError::MisplacedWildcard(segment.to_owned()));
            } else if let Some(name) = segment.strip_prefix(':') {
                if name.is_empty() {
                    return Err(PatternError::EmptyParamName(index));
                }
                if seen_params.contains(&name) {
                    return Err(PatternError::DuplicateParam(name.to_owned()));
                }
                seen_params.push(name);
                segments.push(Segment::Param(name.to_owned()));
            } else {
                segments.push(Segment::Literal(segment.to_owned()));
            }
        }

        Ok(Self {
            raw: raw.to_owned(),
            segments,
            trailing_slash: has_trailing_slash(raw),
        })
    }

    /// The pattern exactly as registered.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match the whole request path.
    pub fn match_path(&self, path: &str, options: MatchOptions) -> Option<PathParams> {
        if !options.ignore_trailing_slashes
            && !self.ends_with_wildcard()
            && has_trailing_slash(path) != self.trailing_slash
        {
            return None;
        }
        let path_segments = split_segments(path);
        let mut params = PathParams::new();
        match_segments(&self.segments, &path_segments, &mut params, false).then_some(params)
    }

    /// Match when the pattern covers the whole path or a leading run of its
    /// segments. Used for filters, which apply to everything under their
    /// scope.
    pub fn match_scope(&self, path: &str) -> Option<PathParams> {
        let path_segments = split_segments(path);
        let mut params = PathParams::new();
        match_segments(&self.segments, &path_segments, &mut params, true).then_some(params)
    }

    fn ends_with_wildcard(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Wildcard))
    }
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for PathPattern {}

fn split_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn has_trailing_slash(path: &str) -> bool {
    path.len() > 1 && path.ends_with('/')
}

fn match_segments(pattern: &[Segment], path: &[&str], params: &mut PathParams, prefix: bool) -> bool {
    SegmentMatch {
        pattern,
        path,
        prefix,
        failed: vec![false; (pattern.len() + 1) * (path.len() + 1)],
    }
    .at(0, 0, params)
}

/// Backtracking matcher. Whether the rest of the pattern matches the rest
/// of the path depends only on the two positions, so failed positions are
/// remembered and each is explored once.
struct SegmentMatch<'a> {
    pattern: &'a [Segment],
    path: &'a [&'a str],
    prefix: bool,
    failed: Vec<bool>,
}

impl SegmentMatch<'_> {
    fn at(&mut self, segment: usize, position: usize, params: &mut PathParams) -> bool {
        let (pattern, path) = (self.pattern, self.path);
        let key = segment * (path.len() + 1) + position;
        if self.failed[key] {
            return false;
        }

        let matched = match pattern.get(segment) {
            None => self.prefix || position == path.len(),
            Some(Segment::Wildcard) => (position..=path.len()).any(|next| self.at(segment + 1, next, params)),
            Some(Segment::Literal(literal)) => {
                path.get(position).is_some_and(|value| *value == literal.as_str())
                    && self.at(segment + 1, position + 1, params)
            }
            Some(Segment::Param(name)) => match path.get(position) {
                Some(value) => {
                    params.insert(name.clone(), (*value).to_owned());
                    let matched = self.at(segment + 1, position + 1, params);
                    if !matched {
                        params.remove(name);
                    }
                    matched
                }
                None => false,
            },
        };

        if !matched {
            self.failed[key] = true;
        }
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict() -> MatchOptions {
        MatchOptions {
            ignore_trailing_slashes: false,
        }
    }

    #[test]
    fn test_literal_and_param_match() {
        let pattern = PathPattern::parse("/users/:id").unwrap();

        let params = pattern.match_path("/users/42", MatchOptions::default()).unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("42"));

        assert!(pattern.match_path("/users", MatchOptions::default()).is_none());
        assert!(pattern.match_path("/users/42/posts", MatchOptions::default()).is_none());
        assert!(pattern.match_path("/Users/42", MatchOptions::default()).is_none());
    }

    #[test]
    fn test_trailing_slash_handling() {
        let pattern = PathPattern::parse("/users").unwrap();
        assert!(pattern.match_path("/users/", MatchOptions::default()).is_some());
        assert!(pattern.match_path("/users/", strict()).is_none());
        assert!(pattern.match_path("/users", strict()).is_some());
    }

    #[test]
    fn test_root_patterns() {
        for raw in ["", "/"] {
            let pattern = PathPattern::parse(raw).unwrap();
            assert!(pattern.match_path("/", MatchOptions::default()).is_some());
            assert!(pattern.match_path("/a", MatchOptions::default()).is_none());
        }
    }

    #[test]
    fn test_wildcard_matches_any_depth() {
        let pattern = PathPattern::parse("/static/*").unwrap();
        assert!(pattern.match_path("/static/css/site.css", MatchOptions::default()).is_some());
        assert!(pattern.match_path("/static", MatchOptions::default()).is_some());
        assert!(pattern.match_path("/other/x", MatchOptions::default()).is_none());

        let middle = PathPattern::parse("/files/*/raw").unwrap();
        assert!(middle.match_path("/files/a/b/raw", MatchOptions::default()).is_some());
        assert!(middle.match_path("/files/a/b", MatchOptions::default()).is_none());

        let all = PathPattern::parse(ALL_PATHS).unwrap();
        assert!(all.match_path("/anything/at/all", strict()).is_some());
    }

    #[test]
    fn test_many_wildcards_fail_fast_on_long_paths() {
        let pattern = PathPattern::parse("/*/a/*/a/*/a/*/a/*/b").unwrap();
        let path = "/a".repeat(400);

        assert!(pattern.match_path(&path, MatchOptions::default()).is_none());
        assert!(pattern.match_path(&format!("{path}/b"), MatchOptions::default()).is_some());
    }

    #[test]
    fn test_params_survive_wildcard_backtracking() {
        let pattern = PathPattern::parse("/*/:name/end").unwrap();
        let params = pattern.match_path("/x/y/z/end", MatchOptions::default()).unwrap();
        assert_eq!(params.get("name").map(String::as_str), Some("z"));
    }

    #[test]
    fn test_scope_match() {
        let scope = PathPattern::parse("/api").unwrap();
        assert!(scope.match_scope("/api").is_some());
        assert!(scope.match_scope("/api/v1/users").is_some());
        assert!(scope.match_scope("/apix").is_none());
        assert!(scope.match_scope("/").is_none());

        let root = PathPattern::parse("").unwrap();
        assert!(root.match_scope("/anything").is_some());

        let with_param = PathPattern::parse("/orgs/:org").unwrap();
        let params = with_param.match_scope("/orgs/acme/members").unwrap();
        assert_eq!(params.get("org").map(String::as_str), Some("acme"));
    }

    #[test]
    fn test_rejects_malformed_patterns() {
        assert_eq!(PathPattern::parse("users").unwrap_err(), PatternError::MissingLeadingSlash);
        assert_eq!(PathPattern::parse("/a b").unwrap_err(), PatternError::ContainsWhitespace);
        assert_eq!(PathPattern::parse("/a/:").unwrap_err(), PatternError::EmptyParamName(1));
        assert_eq!(
            PathPattern::parse("/:id/x/:id").unwrap_err(),
            PatternError::DuplicateParam("id".into())
        );
        assert_eq!(
            PathPattern::parse("/a*").unwrap_err(),
            PatternError::MisplacedWildcard("a*".into())
        );
    }
}
