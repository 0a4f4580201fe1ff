//! Tolerant HTML parser.
//!
//! Never fails: malformed input degrades to text. Template tags (`<% ... %>`)
//! survive untouched, both between elements (as text) and inside start tags
//! (as bare attribute chunks or embedded in quoted values).

use super::{Attribute, Document, NodeId, NodeKind};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// `true` for elements that never have children or a closing tag.
pub(crate) fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// Open elements that a new `tag` implicitly closes.
fn implied_end(tag: &str) -> &'static [&'static str] {
    match tag {
        "li" => &["li"],
        "option" => &["option"],
        "dt" | "dd" => &["dt", "dd"],
        "tr" => &["td", "th", "tr"],
        "td" | "th" => &["td", "th"],
        "p" | "div" | "ul" | "ol" | "table" | "form" | "section" | "h1" | "h2" | "h3" | "h4"
        | "h5" | "h6" => &["p"],
        _ => &[],
    }
}

/// Parse markup into a new document. Top-level nodes become children of
/// the root, so both full documents and fragments are accepted.
pub fn parse_document(input: &str) -> Document {
    let mut parser = Parser { input, pos: 0, doc: Document::new(), stack: Vec::new() };
    parser.run();
    parser.doc
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    doc: Document,
    stack: Vec<NodeId>,
}

impl Parser<'_> {
    fn rest(&self) -> &str {
        &self.input[self.pos..]
    }

    fn parent(&self) -> NodeId {
        self.stack.last().copied().unwrap_or_else(|| self.doc.root())
    }

    fn run(&mut self) {
        while self.pos < self.input.len() {
            let rest = self.rest();
            if rest.starts_with("<%") {
                let end = rest.find("%>").map_or(rest.len(), |i| i + 2);
                self.push_text(end);
            } else if rest.starts_with("<!--") {
                self.comment();
            } else if rest.starts_with("<!") {
                self.doctype();
            } else if rest.starts_with("</") && rest[2..].starts_with(|c: char| c.is_ascii_alphabetic()) {
                self.end_tag();
            } else if rest.starts_with('<') && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
                self.start_tag();
            } else {
                // Plain text up to the next '<' (a stray '<' is text too).
                let first = rest.chars().next().map_or(1, char::len_utf8);
                let end = rest[first..].find('<').map_or(rest.len(), |i| i + first);
                self.push_text(end);
            }
        }
    }

    /// Append `len` bytes of input as text, merging with a preceding text node.
    fn push_text(&mut self, len: usize) {
        let text = &self.input[self.pos..self.pos + len];
        self.pos += len;
        let parent = self.parent();
        if let Some(&last) = self.doc.children(parent).last() {
            if let NodeKind::Text(existing) = self.doc.kind_mut(last) {
                existing.push_str(text);
                return;
            }
        }
        let node = self.doc.create_text(text);
        self.doc.append_child(parent, node);
    }

    fn comment(&mut self) {
        let body_start = self.pos + 4;
        let (body_end, next) = match self.input[body_start..].find("-->") {
            Some(i) => (body_start + i, body_start + i + 3),
            None => (self.input.len(), self.input.len()),
        };
        let node = self.doc.create_comment(&self.input[body_start..body_end]);
        let parent = self.parent();
        self.doc.append_child(parent, node);
        self.pos = next;
    }

    fn doctype(&mut self) {
        let body_start = self.pos + 2;
        let (body_end, next) = match self.input[body_start..].find('>') {
            Some(i) => (body_start + i, body_start + i + 1),
            None => (self.input.len(), self.input.len()),
        };
        let node = self.doc.create_doctype(&self.input[body_start..body_end]);
        let parent = self.parent();
        self.doc.append_child(parent, node);
        self.pos = next;
    }

    fn end_tag(&mut self) {
        let rest = &self.input[self.pos + 2..];
        let name_len = rest.find(|c: char| !is_name_char(c)).unwrap_or(rest.len());
        let name = rest[..name_len].to_ascii_lowercase();
        let close = rest.find('>').map_or(rest.len(), |i| i + 1);
        self.pos += 2 + close;

        if let Some(depth) = self.stack.iter().rposition(|&open| self.doc.tag(open) == Some(name.as_str())) {
            self.stack.truncate(depth);
        }
    }

    fn start_tag(&mut self) {
        self.pos += 1;
        let name_len = self.rest().find(|c: char| !is_name_char(c)).unwrap_or(self.rest().len());
        let tag = self.rest()[..name_len].to_ascii_lowercase();
        self.pos += name_len;

        let (attrs, self_closing) = self.attributes();

        let ends = implied_end(&tag);
        while let Some(&open) = self.stack.last() {
            match self.doc.tag(open) {
                Some(open_tag) if ends.contains(&open_tag) => {
                    self.stack.pop();
                },
                _ => break,
            }
        }

        let element = self.doc.create_element(&tag, attrs);
        let parent = self.parent();
        self.doc.append_child(parent, element);

        if self_closing || is_void(&tag) {
            return;
        }
        if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
            self.raw_text(element, &tag);
            return;
        }
        self.stack.push(element);
    }

    fn raw_text(&mut self, element: NodeId, tag: &str) {
        let closing = format!("</{tag}");
        let input = self.input;
        let rest = &input[self.pos..];
        let end = rest.to_ascii_lowercase().find(&closing).unwrap_or(rest.len());
        if end > 0 {
            let text = self.doc.create_text(&rest[..end]);
            self.doc.append_child(element, text);
        }
        let after = &rest[end..];
        let close = after.find('>').map_or(after.len(), |i| i + 1);
        self.pos += end + close;
        if tag == "textarea" {
            self.doc.reset_live_state(element);
        }
    }

    /// Parse attributes up to and including the closing `>` or `/>`.
    fn attributes(&mut self) -> (Vec<Attribute>, bool) {
        let mut attrs = Vec::new();
        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.is_empty() {
                return (attrs, false);
            }
            if rest.starts_with("/>") {
                self.pos += 2;
                return (attrs, true);
            }
            if rest.starts_with('>') {
                self.pos += 1;
                return (attrs, false);
            }
            if rest.starts_with("<%") {
                let end = rest.find("%>").map_or(rest.len(), |i| i + 2);
                attrs.push(Attribute::bare(&rest[..end]));
                self.pos += end;
                continue;
            }

            let name_len = rest
                .find(|c: char| c.is_whitespace() || c == '=' || c == '>' || c == '/' || c == '<')
                .unwrap_or(rest.len());
            if name_len == 0 {
                // Stray '/', '=' or '<': skip one character.
                self.pos += rest.chars().next().map_or(1, char::len_utf8);
                continue;
            }
            let name = rest[..name_len].to_ascii_lowercase();
            self.pos += name_len;

            self.skip_whitespace();
            if !self.rest().starts_with('=') {
                attrs.push(Attribute::bare(name));
                continue;
            }
            self.pos += 1;
            self.skip_whitespace();
            let value = self.attribute_value();
            attrs.push(Attribute { name, value: Some(value) });
        }
    }

    fn attribute_value(&mut self) -> String {
        let rest = self.rest();
        let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'');
        let body = if quote.is_some() { &rest[1..] } else { rest };

        let mut i = 0;
        while i < body.len() {
            let tail = &body[i..];
            if tail.starts_with("<%") {
                i += tail.find("%>").map_or(tail.len(), |j| j + 2);
                continue;
            }
            let Some(c) = tail.chars().next() else { break };
            let stop = match quote {
                Some(q) => c == q,
                None => c.is_whitespace() || c == '>',
            };
            if stop {
                break;
            }
            i += c.len_utf8();
        }

        let value = body[..i].to_string();
        let consumed = if quote.is_some() { 1 + i + usize::from(i < body.len()) } else { i };
        self.pos += consumed;
        value
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == ':' || c == '_'
}
