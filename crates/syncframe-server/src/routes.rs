//! File-based route discovery and matching.
//!
//! Every `.html` file under the routes root is a route. Directories become
//! path segments, `+` in a file name introduces a parameter
//! (`docs+name.html` serves `/docs/:name`), and `index.html` also answers
//! for its parent directory. Files and directories whose names start with
//! `_` are layouts, partials and error pages, never routes.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A parsed endpoint such as `/docs/:name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    endpoint: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    /// Parse an endpoint. `:name` segments capture a parameter.
    pub fn parse(endpoint: &str) -> Self {
        let segments = endpoint
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(s.to_string()),
            })
            .collect();
        Self { endpoint: endpoint.to_string(), segments }
    }

    /// The endpoint as written.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// `true` if the pattern has no parameters.
    pub fn is_literal(&self) -> bool {
        self.segments.iter().all(|s| matches!(s, Segment::Literal(_)))
    }

    /// Match a request path, returning the captured parameters.
    pub fn matches(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = BTreeMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {},
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), part.to_string());
                },
            }
        }
        Some(params)
    }
}

/// One servable endpoint.
///
/// An `index.html` produces two entries sharing the same file and primary
/// endpoint, so both compile to the same cached route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    /// Pattern this entry answers to.
    pub pattern: RoutePattern,
    /// Route file relative to the routes root.
    pub file: String,
    /// Endpoint derived from the file name; cache and module key.
    pub endpoint: String,
}

/// A request path resolved to a route.
#[derive(Debug, Clone)]
pub struct RouteMatch<'a> {
    /// The matched entry.
    pub entry: &'a RouteEntry,
    /// Captured `:name` parameters.
    pub params: BTreeMap<String, String>,
}

/// All discovered routes in discovery order.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    /// Build the table from a sorted file listing.
    pub fn discover<S: AsRef<str>>(files: &[S]) -> Self {
        let mut entries = Vec::new();

        for file in files {
            let file = file.as_ref();
            let Some(stem) = file.strip_suffix(".html") else { continue };
            if file.split('/').any(|segment| segment.starts_with('_')) {
                continue;
            }

            let endpoint = format!("/{stem}").replace('+', "/:").replace("//", "/");
            entries.push(RouteEntry {
                pattern: RoutePattern::parse(&endpoint),
                file: file.to_string(),
                endpoint: endpoint.clone(),
            });

            if file == "index.html" || file.ends_with("/index.html") {
                let alias = endpoint.strip_suffix("/index").unwrap_or(&endpoint);
                let alias = if alias.is_empty() { "/" } else { alias };
                entries.push(RouteEntry {
                    pattern: RoutePattern::parse(alias),
                    file: file.to_string(),
                    endpoint: endpoint.clone(),
                });
            }
        }

        Self { entries }
    }

    /// Resolve a request path. Literal routes win over parameterised ones;
    /// otherwise the first discovered match wins.
    pub fn resolve(&self, path: &str) -> Option<RouteMatch<'_>> {
        let mut fallback = None;
        for entry in &self.entries {
            let Some(params) = entry.pattern.matches(path) else { continue };
            if entry.pattern.is_literal() {
                return Some(RouteMatch { entry, params });
            }
            if fallback.is_none() {
                fallback = Some(RouteMatch { entry, params });
            }
        }
        fallback
    }

    /// Entry serving `endpoint` exactly, as written at discovery.
    pub fn entry(&self, endpoint: &str) -> Option<&RouteEntry> {
        self.entries.iter().find(|e| e.endpoint == endpoint)
    }

    /// All entries, aliases included.
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// Number of entries, aliases included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no route was discovered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints(table: &RouteTable) -> Vec<&str> {
        table.entries().iter().map(|e| e.pattern.endpoint()).collect()
    }

    #[test]
    fn underscore_files_and_directories_are_skipped() {
        let table = RouteTable::discover(&[
            "_layout.html",
            "_partials/nav.html",
            "about.html",
            "home/_404.html",
            "notes.txt",
        ]);

        assert_eq!(endpoints(&table), vec!["/about"]);
    }

    #[test]
    fn index_serves_parent_path() {
        let table = RouteTable::discover(&["home/index.html", "index.html"]);

        assert_eq!(endpoints(&table), vec!["/home/index", "/home", "/index", "/"]);
        let home = table.resolve("/home").unwrap();
        assert_eq!(home.entry.endpoint, "/home/index");
        assert_eq!(table.resolve("/").unwrap().entry.file, "index.html");
    }

    #[test]
    fn plus_becomes_parameter() {
        let table = RouteTable::discover(&["docs+name.html"]);

        let found = table.resolve("/docs/intro").unwrap();
        assert_eq!(found.entry.endpoint, "/docs/:name");
        assert_eq!(found.params.get("name").map(String::as_str), Some("intro"));
        assert!(table.resolve("/docs").is_none());
        assert!(table.resolve("/docs/a/b").is_none());
    }

    #[test]
    fn literal_route_wins_over_parameter() {
        let table = RouteTable::discover(&["docs+name.html", "docs/new.html"]);

        assert_eq!(table.resolve("/docs/new").unwrap().entry.file, "docs/new.html");
        assert_eq!(table.resolve("/docs/old").unwrap().entry.file, "docs+name.html");
    }

    #[test]
    fn trailing_slash_matches() {
        let table = RouteTable::discover(&["about.html"]);
        assert!(table.resolve("/about/").is_some());
    }
}
