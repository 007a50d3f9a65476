//! Path templates.
//!
//! Templates are split on `/`; a `{name}` segment captures one path segment.
//! Empty segments are ignored, so `/v1/` and `/v1` are the same route.

use std::collections::HashMap;

use http::Method;

/// Path parameters captured by a matched template.
///
/// Inserted into the request's extensions before a REST handler runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(HashMap<String, String>);

impl PathParams {
    /// Returns a captured parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Returns `true` if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

fn parse(pattern: &str) -> Vec<Segment> {
    pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => Segment::Param(name.to_string()),
            None => Segment::Literal(s.to_string()),
        })
        .collect()
}

fn capture(segments: &[Segment], path: &str) -> Option<PathParams> {
    let actual: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if actual.len() != segments.len() {
        return None;
    }

    let mut params = HashMap::new();
    for (segment, value) in segments.iter().zip(actual) {
        match segment {
            Segment::Literal(expected) if expected == value => {}
            Segment::Literal(_) => return None,
            Segment::Param(name) => {
                params.insert(name.clone(), value.to_string());
            }
        }
    }
    Some(PathParams(params))
}

/// Result of looking a request up in a [`RouteTable`].
#[derive(Debug)]
pub(crate) enum Lookup<'a, H> {
    /// Method and path matched.
    Found(&'a H, PathParams),
    /// The path exists but not for this method.
    MethodNotAllowed,
    /// No template matches the path.
    NotFound,
}

/// Ordered method + template table; the first registered match wins.
#[derive(Debug)]
pub(crate) struct RouteTable<H> {
    routes: Vec<(Method, Vec<Segment>, H)>,
}

impl<H> Default for RouteTable<H> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<H> RouteTable<H> {
    pub(crate) fn insert(&mut self, method: Method, pattern: &str, handler: H) {
        self.routes.push((method, parse(pattern), handler));
    }

    pub(crate) fn len(&self) -> usize {
        self.routes.len()
    }

    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Lookup<'_, H> {
        let mut path_known = false;
        for (route_method, segments, handler) in &self.routes {
            if let Some(params) = capture(segments, path) {
                if route_method == method {
                    return Lookup::Found(handler, params);
                }
                path_known = true;
            }
        }
        if path_known {
            Lookup::MethodNotAllowed
        } else {
            Lookup::NotFound
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable<&'static str> {
        let mut table = RouteTable::default();
        table.insert(Method::GET, "/v1/", "index");
        table.insert(Method::GET, "/v1/items/{id}", "get_item");
        table.insert(Method::DELETE, "/v1/items/{id}", "delete_item");
        table
    }

    #[test]
    fn test_trailing_slash_is_ignored() {
        let table = table();
        assert!(matches!(table.lookup(&Method::GET, "/v1"), Lookup::Found(&"index", _)));
        assert!(matches!(table.lookup(&Method::GET, "/v1/"), Lookup::Found(&"index", _)));
    }

    #[test]
    fn test_params_are_captured() {
        let table = table();
        match table.lookup(&Method::DELETE, "/v1/items/42") {
            Lookup::Found(handler, params) => {
                assert_eq!(*handler, "delete_item");
                assert_eq!(params.get("id"), Some("42"));
            }
            other => panic!("unexpected lookup: {other:?}"),
        }
    }

    #[test]
    fn test_wrong_method_and_unknown_path() {
        let table = table();
        assert!(matches!(
            table.lookup(&Method::POST, "/v1/items/42"),
            Lookup::MethodNotAllowed
        ));
        assert!(matches!(table.lookup(&Method::GET, "/v2/"), Lookup::NotFound));
        assert!(matches!(table.lookup(&Method::GET, "/"), Lookup::NotFound));
        assert_eq!(table.len(), 3);
    }
}
