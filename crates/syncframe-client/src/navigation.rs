//! Morph navigation: which links qualify, URL resolution and history.

/// Redirects followed by one navigation before giving up.
pub const MAX_REDIRECT_HOPS: usize = 8;

/// `true` if an anchor's attributes allow morph navigation.
///
/// The link must stay on this origin, open in the same window, not be a
/// download, and point at a route rather than a file.
pub fn is_morphable(href: &str, target: Option<&str>, download: bool) -> bool {
    if target.is_some() || download {
        return false;
    }
    if href.starts_with("http://") || href.starts_with("https://") || has_scheme(href) {
        return false;
    }
    let path = without_query(without_fragment(href));
    let last = path.rsplit('/').next().unwrap_or("");
    !last.contains('.')
}

/// `mailto:`, `javascript:` and the like.
fn has_scheme(href: &str) -> bool {
    let head = href.split(['/', '?', '#']).next().unwrap_or("");
    head.contains(':')
}

/// The URL without its `#fragment`.
pub fn without_fragment(url: &str) -> &str {
    url.split_once('#').map_or(url, |(head, _)| head)
}

/// The `#fragment` of a URL, without the `#`. Empty fragments count as none.
pub fn fragment(url: &str) -> Option<&str> {
    url.split_once('#').map(|(_, tail)| tail).filter(|tail| !tail.is_empty())
}

fn without_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(head, _)| head)
}

/// Resolve `href` against the current location.
///
/// Absolute paths replace the location, `?query` and `#fragment` hrefs
/// keep the current path, and relative paths resolve against the current
/// directory with `.` and `..` segments collapsed.
pub fn resolve(base: &str, href: &str) -> String {
    if href.is_empty() {
        return without_fragment(base).to_string();
    }
    if href.starts_with('#') {
        return format!("{}{href}", without_fragment(base));
    }
    if href.starts_with('?') {
        return format!("{}{href}", without_query(without_fragment(base)));
    }

    let (path, rest) = split_path(href);
    let joined = if path.starts_with('/') {
        path.to_string()
    } else {
        let base_path = without_query(without_fragment(base));
        let dir = base_path.rsplit_once('/').map_or("", |(dir, _)| dir);
        format!("{dir}/{path}")
    };
    format!("{}{rest}", normalize(&joined))
}

fn split_path(href: &str) -> (&str, &str) {
    match href.find(['?', '#']) {
        Some(index) => href.split_at(index),
        None => (href, ""),
    }
}

fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    let trailing = path.ends_with('/') || path.ends_with("/.") || path.ends_with("/..");
    for segment in path.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                segments.pop();
            },
            other => segments.push(other),
        }
    }
    let mut out = format!("/{}", segments.join("/"));
    if trailing && out.len() > 1 {
        out.push('/');
    }
    out
}

/// Session history as a stack with a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
    entries: Vec<String>,
    index: usize,
}

impl History {
    /// History holding only the initial page.
    pub fn new(url: impl Into<String>) -> Self {
        Self { entries: vec![url.into()], index: 0 }
    }

    /// Current entry.
    pub fn current(&self) -> &str {
        &self.entries[self.index]
    }

    /// Push a new entry, dropping everything forward of the cursor.
    pub fn push(&mut self, url: impl Into<String>) {
        self.entries.truncate(self.index + 1);
        self.entries.push(url.into());
        self.index = self.entries.len() - 1;
    }

    /// Step back. `None` at the oldest entry.
    pub fn back(&mut self) -> Option<&str> {
        self.index = self.index.checked_sub(1)?;
        Some(self.current())
    }

    /// Step forward. `None` at the newest entry.
    pub fn forward(&mut self) -> Option<&str> {
        if self.index + 1 >= self.entries.len() {
            return None;
        }
        self.index += 1;
        Some(self.current())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false`: history holds at least the initial page.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cursor position.
    pub fn index(&self) -> usize {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn morphable_links() {
        assert!(is_morphable("/blog/post", None, false));
        assert!(is_morphable("about", None, false));
        assert!(is_morphable("/", None, false));
        assert!(is_morphable("/docs?page=2#top", None, false));

        assert!(!is_morphable("https://example.com/", None, false));
        assert!(!is_morphable("http://example.com/page", None, false));
        assert!(!is_morphable("mailto:someone@example.com", None, false));
        assert!(!is_morphable("/page", Some("_blank"), false));
        assert!(!is_morphable("/page", None, true));
        assert!(!is_morphable("/files/report.pdf", None, false));
    }

    #[test]
    fn resolves_relative_hrefs() {
        assert_eq!(resolve("/blog/post", "/about"), "/about");
        assert_eq!(resolve("/blog/post", "other"), "/blog/other");
        assert_eq!(resolve("/blog/post", "../about"), "/about");
        assert_eq!(resolve("/blog/post?x=1#a", "#b"), "/blog/post?x=1#b");
        assert_eq!(resolve("/blog/post?x=1", "?y=2"), "/blog/post?y=2");
        assert_eq!(resolve("/blog/", "./post#c"), "/blog/post#c");
    }

    #[test]
    fn fragments() {
        assert_eq!(fragment("/page#top"), Some("top"));
        assert_eq!(fragment("/page#"), None);
        assert_eq!(fragment("/page"), None);
        assert_eq!(without_fragment("/page?q=1#top"), "/page?q=1");
    }

    #[test]
    fn history_push_truncates_forward_entries() {
        let mut history = History::new("/a");
        history.push("/b");
        history.push("/c");

        assert_eq!(history.back(), Some("/b"));
        assert_eq!(history.back(), Some("/a"));
        assert_eq!(history.back(), None);
        assert_eq!(history.forward(), Some("/b"));

        history.push("/d");
        assert_eq!(history.len(), 3);
        assert_eq!(history.forward(), None);
        assert_eq!(history.current(), "/d");
    }
}
