//! URL pattern matching.
//!
//! The dispatch engine only depends on the [`Matcher`] trait. [`UrlPattern`]
//! is the bundled implementation, compiled from a [`PatternSpec`]:
//!
//! - `/users` - literal path
//! - `/users/:id` - named segment (one path segment)
//! - `/files/*` - wildcard (rest of the path, captured as group `"0"`)
//! - `*` or `/*` - every path

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use url::Url;

use crate::error::{MatchError, Result, RouterError};

/// Pattern used when a registration omits one.
pub const MATCH_ALL: &str = "/*";

/// A compiled pattern that can be evaluated against a request URL.
///
/// Implement this to plug in a custom matching engine; pass it to the
/// router as [`PatternSpec::Compiled`].
pub trait Matcher: Send + Sync + fmt::Debug {
    /// Returns the match result, or `None` if the URL does not match.
    ///
    /// An `Err` is reported to the error fallback as
    /// [`DispatchError::Match`](crate::DispatchError::Match).
    fn exec(&self, url: &Url) -> std::result::Result<Option<PatternMatch>, MatchError>;
}

/// A pattern specification as accepted by route registration.
#[derive(Debug, Clone)]
pub enum PatternSpec {
    /// A pathname pattern string.
    Path(String),
    /// A structured pattern with per-component patterns.
    Init(PatternInit),
    /// An already compiled matcher, used as-is.
    Compiled(Arc<dyn Matcher>),
}

impl PatternSpec {
    /// Normalizes the specification into a single matcher representation.
    pub fn compile(self) -> Result<Arc<dyn Matcher>> {
        match self {
            Self::Path(path) => Ok(Arc::new(UrlPattern::path(&path)?)),
            Self::Init(init) => Ok(Arc::new(UrlPattern::new(&init)?)),
            Self::Compiled(matcher) => Ok(matcher),
        }
    }
}

impl Default for PatternSpec {
    fn default() -> Self {
        Self::Path(MATCH_ALL.to_string())
    }
}

impl From<&str> for PatternSpec {
    fn from(path: &str) -> Self {
        Self::Path(path.to_string())
    }
}

impl From<String> for PatternSpec {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

impl From<PatternInit> for PatternSpec {
    fn from(init: PatternInit) -> Self {
        Self::Init(init)
    }
}

impl From<Arc<dyn Matcher>> for PatternSpec {
    fn from(matcher: Arc<dyn Matcher>) -> Self {
        Self::Compiled(matcher)
    }
}

impl From<UrlPattern> for PatternSpec {
    fn from(pattern: UrlPattern) -> Self {
        Self::Compiled(Arc::new(pattern))
    }
}

/// Structured pattern input. A missing component matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternInit {
    /// Pattern for the URL path.
    pub pathname: Option<String>,
    /// Pattern for the URL host.
    pub hostname: Option<String>,
}

impl PatternInit {
    /// Creates an empty init that matches every URL.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pathname pattern.
    #[must_use]
    pub fn pathname(mut self, pattern: impl Into<String>) -> Self {
        self.pathname = Some(pattern.into());
        self
    }

    /// Sets the hostname pattern.
    #[must_use]
    pub fn hostname(mut self, pattern: impl Into<String>) -> Self {
        self.hostname = Some(pattern.into());
        self
    }
}

/// Captured groups for one URL component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentMatch {
    input: String,
    groups: Vec<(String, String)>,
}

impl ComponentMatch {
    /// The component text that was matched.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Gets a captured group by name (or index, for wildcards).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates over captured groups in pattern order.
    pub fn groups(&self) -> impl Iterator<Item = (&str, &str)> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// The result of a successful match.
///
/// Read-only: it is built once per matched route and has no mutators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternMatch {
    input: String,
    pathname: ComponentMatch,
    hostname: ComponentMatch,
}

impl PatternMatch {
    /// Builds a match result. Intended for custom [`Matcher`]s.
    pub fn new(
        url: &Url,
        pathname: impl IntoIterator<Item = (String, String)>,
        hostname: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self {
            input: url.to_string(),
            pathname: ComponentMatch {
                input: url.path().to_string(),
                groups: pathname.into_iter().collect(),
            },
            hostname: ComponentMatch {
                input: url.host_str().unwrap_or_default().to_string(),
                groups: hostname.into_iter().collect(),
            },
        }
    }

    /// The full URL that was matched.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Groups captured from the path.
    pub fn pathname(&self) -> &ComponentMatch {
        &self.pathname
    }

    /// Groups captured from the host.
    pub fn hostname(&self) -> &ComponentMatch {
        &self.hostname
    }

    /// Gets a parameter, looking in the path first, then the host.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.pathname
            .get(name)
            .or_else(|| self.hostname.get(name))
    }

    /// Iterates over every captured group: path groups, then host groups.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pathname.groups().chain(self.hostname.groups())
    }

    /// Parses a parameter as a specific type.
    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.param(name).and_then(|v| v.parse().ok())
    }
}

/// A compiled pattern for a single URL component.
#[derive(Debug, Clone)]
struct ComponentPattern {
    regex: Regex,
    group_names: Vec<String>,
}

impl ComponentPattern {
    /// Compiles `pattern`, using `separator` to bound named segments.
    fn compile(pattern: &str, separator: char, trailing_separator: bool) -> Result<Self> {
        let invalid = |reason: String| RouterError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };

        let mut group_names: Vec<String> = Vec::new();
        let mut wildcards = 0_usize;
        let mut regex_str = String::from("^");
        let mut chars = pattern.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                ':' => {
                    let mut name = String::new();
                    while let Some(&next) = chars.peek() {
                        if next.is_ascii_alphanumeric() || next == '_' {
                            name.push(next);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if name.is_empty() {
                        return Err(invalid("missing parameter name after `:`".to_string()));
                    }
                    if group_names.contains(&name) {
                        return Err(invalid(format!("duplicate parameter name `{name}`")));
                    }
                    regex_str.push_str(&format!("([^{}]+)", regex::escape(&separator.to_string())));
                    group_names.push(name);
                }
                '*' => {
                    regex_str.push_str("(.*)");
                    group_names.push(wildcards.to_string());
                    wildcards += 1;
                }
                literal => regex_str.push_str(&regex::escape(&literal.to_string())),
            }
        }

        if trailing_separator && !pattern.ends_with(['*', separator]) {
            regex_str.push_str(&regex::escape(&separator.to_string()));
            regex_str.push('?');
        }
        regex_str.push('$');

        let regex = Regex::new(&regex_str).map_err(|e| invalid(e.to_string()))?;
        Ok(Self { regex, group_names })
    }

    fn captures(&self, input: &str) -> Option<Vec<(String, String)>> {
        let caps = self.regex.captures(input)?;
        Some(
            self.group_names
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let value = caps.get(i + 1).map_or("", |m| m.as_str());
                    (name.clone(), value.to_string())
                })
                .collect(),
        )
    }
}

/// The bundled [`Matcher`]: per-component compiled patterns.
///
/// # Example
///
/// ```
/// use oxide_dispatch::{Matcher, UrlPattern};
///
/// let pattern = UrlPattern::path("/posts/:id/comments/:comment_id").unwrap();
/// let url = url::Url::parse("http://localhost/posts/123/comments/456").unwrap();
/// let matched = pattern.exec(&url).unwrap().unwrap();
/// assert_eq!(matched.param("id"), Some("123"));
/// assert_eq!(matched.param("comment_id"), Some("456"));
/// ```
#[derive(Debug, Clone)]
pub struct UrlPattern {
    source: String,
    pathname: Option<ComponentPattern>,
    hostname: Option<ComponentPattern>,
}

impl UrlPattern {
    /// Compiles a structured pattern.
    pub fn new(init: &PatternInit) -> Result<Self> {
        let pathname = init
            .pathname
            .as_deref()
            .map(compile_pathname)
            .transpose()?;
        let hostname = init
            .hostname
            .as_deref()
            .map(|host| {
                if host.is_empty() {
                    return Err(RouterError::InvalidPattern {
                        pattern: host.to_string(),
                        reason: "empty hostname pattern".to_string(),
                    });
                }
                ComponentPattern::compile(host, '.', false)
            })
            .transpose()?;
        Ok(Self {
            source: format!(
                "{}{}",
                init.hostname.as_deref().unwrap_or_default(),
                init.pathname.as_deref().unwrap_or("*")
            ),
            pathname,
            hostname,
        })
    }

    /// Compiles a pathname-only pattern.
    pub fn path(pattern: &str) -> Result<Self> {
        Ok(Self {
            source: pattern.to_string(),
            pathname: Some(compile_pathname(pattern)?),
            hostname: None,
        })
    }

    /// Returns the pattern text this was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

fn compile_pathname(pattern: &str) -> Result<ComponentPattern> {
    if !pattern.starts_with(['/', '*']) {
        return Err(RouterError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "pathname must start with `/` or `*`".to_string(),
        });
    }
    ComponentPattern::compile(pattern, '/', true)
}

impl Matcher for UrlPattern {
    fn exec(&self, url: &Url) -> std::result::Result<Option<PatternMatch>, MatchError> {
        let captures = |pattern: &Option<ComponentPattern>, input: &str| match pattern {
            Some(p) => p.captures(input),
            None => Some(Vec::new()),
        };
        let Some(pathname) = captures(&self.pathname, url.path()) else {
            return Ok(None);
        };
        let Some(hostname) = captures(&self.hostname, url.host_str().unwrap_or_default()) else {
            return Ok(None);
        };
        Ok(Some(PatternMatch::new(url, pathname, hostname)))
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn exec(pattern: &str, target: &str) -> Option<PatternMatch> {
        UrlPattern::path(pattern).unwrap().exec(&url(target)).unwrap()
    }

    #[test]
    fn test_literal_path() {
        assert!(exec("/users", "http://localhost/users").is_some());
        assert!(exec("/users", "http://localhost/users/").is_some());
        assert!(exec("/users", "http://localhost/posts").is_none());
        assert!(exec("/users", "http://localhost/users/1").is_none());
    }

    #[test]
    fn test_single_param() {
        let matched = exec("/items/:id", "http://localhost/items/42").unwrap();
        assert_eq!(matched.param("id"), Some("42"));
        assert_eq!(matched.parse::<u32>("id"), Some(42));
        assert_eq!(matched.pathname().input(), "/items/42");
    }

    #[test]
    fn test_multiple_params() {
        let matched = exec(
            "/posts/:post_id/comments/:comment_id",
            "http://localhost/posts/42/comments/7",
        )
        .unwrap();
        let groups: Vec<_> = matched.pathname().groups().collect();
        assert_eq!(groups, vec![("post_id", "42"), ("comment_id", "7")]);
    }

    #[test]
    fn test_wildcard() {
        let matched = exec("/files/*", "http://localhost/files/docs/readme.md").unwrap();
        assert_eq!(matched.param("0"), Some("docs/readme.md"));
    }

    #[test]
    fn test_match_all() {
        for target in ["http://localhost/", "http://localhost/a/b/c", "https://x.io/"] {
            assert!(exec(MATCH_ALL, target).is_some(), "{target}");
            assert!(exec("*", target).is_some(), "{target}");
        }
    }

    #[test]
    fn test_hostname_component() {
        let init = PatternInit::new().hostname(":tenant.example.com").pathname("/api/*");
        let pattern = UrlPattern::new(&init).unwrap();

        let matched = pattern
            .exec(&url("https://acme.example.com/api/users"))
            .unwrap()
            .unwrap();
        assert_eq!(matched.param("tenant"), Some("acme"));
        assert_eq!(matched.hostname().input(), "acme.example.com");
        let params: Vec<_> = matched.params().collect();
        assert_eq!(params, vec![("0", "users"), ("tenant", "acme")]);
        assert!(pattern.exec(&url("https://example.com/api/users")).unwrap().is_none());
        assert!(pattern.exec(&url("https://acme.example.com/web")).unwrap().is_none());
    }

    #[test]
    fn test_empty_init_matches_everything() {
        let pattern = UrlPattern::new(&PatternInit::new()).unwrap();
        assert!(pattern.exec(&url("http://anything.test/at/all")).unwrap().is_some());
    }

    #[test]
    fn test_literal_metacharacters_are_escaped() {
        assert!(exec("/a.b", "http://localhost/a.b").is_some());
        assert!(exec("/a.b", "http://localhost/axb").is_none());
    }

    #[test]
    fn test_invalid_patterns() {
        for bad in ["", "users", "/users/:", "/a/:id/b/:id"] {
            let err = UrlPattern::path(bad).unwrap_err();
            assert!(
                matches!(err, RouterError::InvalidPattern { ref pattern, .. } if pattern == bad),
                "{bad}: {err}"
            );
        }
        assert!(UrlPattern::new(&PatternInit::new().hostname("")).is_err());
    }

    #[test]
    fn test_spec_compile() {
        assert!(PatternSpec::from("/ok").compile().is_ok());
        assert!(PatternSpec::from("bad").compile().is_err());
        assert!(PatternSpec::default().compile().is_ok());

        let compiled: Arc<dyn Matcher> = Arc::new(UrlPattern::path("/x").unwrap());
        let again = PatternSpec::from(Arc::clone(&compiled)).compile().unwrap();
        assert!(Arc::ptr_eq(&compiled, &again));
    }
}
