//! Named, typed URL patterns.
//!
//! A pattern is written relative to its module's prefix, for example
//! `<slug:slug>/attendees/<int:pk>/`. The same pattern is used three ways:
//! rendered into an axum route, matched against a request path
//! ([`UrlPattern::matches`]) and filled in with arguments
//! ([`UrlPattern::reverse`]).

use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
    routing::MethodRouter,
};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use url::Url;

use crate::{sitemodule::RegistryError, state::AppState, util_resp::FailureResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Converter {
    /// `[0-9]+`
    Int,
    /// `[-a-zA-Z0-9_]+`
    Slug,
    /// `[^/]+`
    Str,
}

impl Converter {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(Converter::Int),
            "slug" => Some(Converter::Slug),
            "str" => Some(Converter::Str),
            _ => None,
        }
    }

    pub fn accepts(&self, value: &str) -> bool {
        !value.is_empty()
            && match self {
                Converter::Int => value.chars().all(|c| c.is_ascii_digit()),
                Converter::Slug => value
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
                Converter::Str => !value.contains('/'),
            }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param { name: String, conv: Converter },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPattern {
    raw: String,
    segments: Vec<Segment>,
    trailing_slash: bool,
}

impl UrlPattern {
    pub fn parse(raw: &str) -> Result<Self, RegistryError> {
        let invalid = |reason: &'static str| RegistryError::InvalidPattern {
            pattern: raw.to_string(),
            reason,
        };

        if raw.starts_with('/') {
            return Err(invalid("patterns are relative to the module prefix"));
        }

        let trailing_slash = raw.ends_with('/');
        let body = raw.strip_suffix('/').unwrap_or(raw);

        let mut segments = Vec::new();
        if !body.is_empty() {
            for part in body.split('/') {
                if part.is_empty() {
                    return Err(invalid("empty path segment"));
                }

                let segment = match part
                    .strip_prefix('<')
                    .and_then(|p| p.strip_suffix('>'))
                {
                    Some(inner) => {
                        let (conv, name) = match inner.split_once(':') {
                            Some((conv, name)) => (
                                Converter::from_name(conv)
                                    .ok_or_else(|| invalid("unknown converter"))?,
                                name,
                            ),
                            None => (Converter::Str, inner),
                        };
                        if name.is_empty()
                            || !name
                                .chars()
                                .all(|c| c.is_ascii_alphanumeric() || c == '_')
                        {
                            return Err(invalid("invalid parameter name"));
                        }
                        Segment::Param {
                            name: name.to_string(),
                            conv,
                        }
                    }
                    None if part.contains(['<', '>', ':']) => {
                        return Err(invalid(
                            "parameters must span a whole path segment",
                        ));
                    }
                    None => Segment::Literal(part.to_string()),
                };
                segments.push(segment);
            }
        }

        let mut seen = Vec::new();
        for segment in &segments {
            if let Segment::Param { name, .. } = segment {
                if seen.contains(&name) {
                    return Err(invalid("duplicate parameter name"));
                }
                seen.push(name);
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
            trailing_slash,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn arity(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Param { .. }))
            .count()
    }

    /// The axum route for this pattern when mounted under `/<prefix>/`.
    pub fn axum_route(&self, prefix: &str) -> String {
        let mut route = format!("/{prefix}/");
        let parts = self
            .segments
            .iter()
            .map(|s| match s {
                Segment::Literal(l) => l.clone(),
                Segment::Param { name, .. } => format!(":{name}"),
            })
            .collect::<Vec<_>>();
        route.push_str(&parts.join("/"));
        if self.trailing_slash && !parts.is_empty() {
            route.push('/');
        }
        route
    }

    /// Matches a path relative to the module prefix (i.e. what follows
    /// `/<label>/`), returning the captured arguments by name.
    pub fn matches(&self, rest: &str) -> Option<IndexMap<String, String>> {
        let body = if self.segments.is_empty() {
            if rest.is_empty() {
                return Some(IndexMap::new());
            }
            return None;
        } else if self.trailing_slash {
            rest.strip_suffix('/')?
        } else if rest.ends_with('/') {
            return None;
        } else {
            rest
        };

        let parts = body.split('/').collect::<Vec<_>>();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut kwargs = IndexMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(l) if l == part => {}
                Segment::Literal(_) => return None,
                Segment::Param { name, conv } => {
                    if !conv.accepts(part) {
                        return None;
                    }
                    kwargs.insert(name.clone(), part.to_string());
                }
            }
        }
        Some(kwargs)
    }

    /// Substitutes positional arguments into the pattern. Returns `None` when
    /// the number of arguments is wrong or an argument is rejected by its
    /// converter.
    pub fn reverse<S: AsRef<str>>(
        &self,
        prefix: &str,
        args: &[S],
    ) -> Option<String> {
        if args.len() != self.arity() {
            return None;
        }

        let mut args = args.iter();
        let mut parts = Vec::with_capacity(self.segments.len() + 2);
        parts.push(prefix.to_string());
        for segment in &self.segments {
            match segment {
                Segment::Literal(l) => parts.push(l.clone()),
                Segment::Param { conv, .. } => {
                    let arg = args.next()?.as_ref();
                    if !conv.accepts(arg) {
                        return None;
                    }
                    parts.push(arg.to_string());
                }
            }
        }
        if self.trailing_slash || self.segments.is_empty() {
            parts.push(String::new());
        }

        let mut url = Url::parse("http://localhost/").ok()?;
        url.path_segments_mut().ok()?.extend(parts);
        Some(url.path().to_string())
    }
}

/// A single named route contributed by a site module.
pub struct UrlConf {
    pub route: &'static str,
    pub name: &'static str,
    pub view: MethodRouter<AppState>,
}

pub fn path(
    route: &'static str,
    view: MethodRouter<AppState>,
    name: &'static str,
) -> UrlConf {
    UrlConf { route, name, view }
}

/// The outcome of [`crate::sitemodule::ModuleRegistry::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverMatch {
    pub module: &'static str,
    pub url_name: &'static str,
    pub kwargs: IndexMap<String, String>,
}

impl ResolverMatch {
    /// The fully qualified url name, `<label>:<url_name>`.
    pub fn view_name(&self) -> String {
        format!("{}:{}", self.module, self.url_name)
    }
}

/// The arguments captured by a pattern. An argument its converter rejects
/// (`<int:pk>` given `abc`) is a 404, like a path no pattern matches.
#[derive(Debug)]
pub struct Kwargs<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for Kwargs<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = FailureResponse;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(kwargs)) => Ok(Kwargs(kwargs)),
            Err(e) => {
                tracing::debug!(path = %parts.uri.path(), "no match: {e}");
                Err(FailureResponse::NotFound(()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_typed_segments() {
        let p = UrlPattern::parse("<slug:slug>/attendees/<int:pk>/").unwrap();
        assert_eq!(p.arity(), 2);
        assert_eq!(p.axum_route("meets"), "/meets/:slug/attendees/:pk/");
    }

    #[test]
    fn root_pattern_routes_to_prefix() {
        let p = UrlPattern::parse("").unwrap();
        assert_eq!(p.axum_route("teams"), "/teams/");
        assert_eq!(p.reverse::<&str>("teams", &[]).unwrap(), "/teams/");
        assert!(p.matches("").is_some());
        assert!(p.matches("create/").is_none());
    }

    #[test]
    fn rejects_malformed_patterns() {
        assert!(UrlPattern::parse("/leading").is_err());
        assert!(UrlPattern::parse("<float:x>/").is_err());
        assert!(UrlPattern::parse("a//b").is_err());
        assert!(UrlPattern::parse("<int:pk>.json").is_err());
        assert!(UrlPattern::parse("<int:pk>/<slug:pk>/").is_err());
    }

    #[test]
    fn untyped_parameter_is_a_string() {
        let p = UrlPattern::parse("attendance/<token>/update").unwrap();
        let kwargs = p.matches("attendance/abc123/update").unwrap();
        assert_eq!(kwargs["token"], "abc123");
        assert!(p.matches("attendance/abc123/update/").is_none());
    }

    #[test]
    fn reverse_validates_converters_and_arity() {
        let p = UrlPattern::parse("<slug:slug>/attendees/<int:pk>/").unwrap();
        assert_eq!(
            p.reverse("meets", &["friday-game", "3"]).unwrap(),
            "/meets/friday-game/attendees/3/"
        );
        assert!(p.reverse("meets", &["friday-game", "x"]).is_none());
        assert!(p.reverse("meets", &["friday game", "3"]).is_none());
        assert!(p.reverse("meets", &["friday-game"]).is_none());
    }

    #[test]
    fn matches_captures_by_name() {
        let p = UrlPattern::parse("api/<int:pk>/calendar/<int:year>/<int:month>/")
            .unwrap();
        let kwargs = p.matches("api/4/calendar/2024/12/").unwrap();
        assert_eq!(
            kwargs.into_iter().collect::<Vec<_>>(),
            vec![
                ("pk".to_string(), "4".to_string()),
                ("year".to_string(), "2024".to_string()),
                ("month".to_string(), "12".to_string()),
            ]
        );
        assert!(p.matches("api/x/calendar/2024/12/").is_none());
    }
}
