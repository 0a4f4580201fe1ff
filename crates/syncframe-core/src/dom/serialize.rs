//! Markup serialization.

use super::parse::is_void;
use super::{Attribute, Document, NodeId, NodeKind};

enum Step {
    Open(NodeId),
    Close(NodeId),
}

impl Document {
    /// Serialize the whole document.
    pub fn to_html(&self) -> String {
        self.inner_html(self.root())
    }

    /// Serialize a node including its own tag.
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    /// Serialize the children of a node.
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for &child in self.children(id) {
            self.write_node(child, &mut out);
        }
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let mut stack = vec![Step::Open(id)];
        while let Some(step) = stack.pop() {
            match step {
                Step::Open(node) => match &self.node(node).kind {
                    NodeKind::Root => {
                        stack.extend(self.children(node).iter().rev().map(|&c| Step::Open(c)));
                    },
                    NodeKind::Doctype(text) => {
                        out.push_str("<!");
                        out.push_str(text);
                        out.push('>');
                    },
                    NodeKind::Comment(text) => {
                        out.push_str("<!--");
                        out.push_str(text);
                        out.push_str("-->");
                    },
                    NodeKind::Text(text) => out.push_str(text),
                    NodeKind::Element(element) => {
                        out.push('<');
                        out.push_str(&element.tag);
                        for attr in &element.attrs {
                            write_attribute(attr, out);
                        }
                        out.push('>');
                        if !is_void(&element.tag) {
                            stack.push(Step::Close(node));
                            stack.extend(self.children(node).iter().rev().map(|&c| Step::Open(c)));
                        }
                    },
                },
                Step::Close(node) => {
                    if let Some(tag) = self.tag(node) {
                        out.push_str("</");
                        out.push_str(tag);
                        out.push('>');
                    }
                },
            }
        }
    }
}

fn write_attribute(attr: &Attribute, out: &mut String) {
    out.push(' ');
    out.push_str(&attr.name);
    let Some(value) = &attr.value else { return };
    out.push('=');

    // Template tags are opaque to the tokenizer, so only quotes outside them count.
    let outside = |quote: char| segments(value).any(|(text, tag)| !tag && text.contains(quote));
    let quote = match (outside('"'), outside('\'')) {
        (true, false) => '\'',
        _ => '"',
    };

    out.push(quote);
    for (text, tag) in segments(value) {
        if tag || quote == '\'' {
            out.push_str(text);
        } else {
            out.push_str(&text.replace('"', "&quot;"));
        }
    }
    out.push(quote);
}

/// Split an attribute value into plain text and `<% ... %>` tags. An
/// unterminated tag runs to the end of the value.
fn segments(value: &str) -> impl Iterator<Item = (&str, bool)> {
    let mut rest = value;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let (segment, tag) = match rest.find("<%") {
            Some(0) => (&rest[..rest.find("%>").map_or(rest.len(), |end| end + 2)], true),
            Some(start) => (&rest[..start], false),
            None => (rest, false),
        };
        rest = &rest[segment.len()..];
        Some((segment, tag))
    })
}

/// Insert `name="value"` into the first `<html>` start tag of `markup`.
///
/// Returns the markup unchanged if it has no `<html>` element.
pub fn stamp_root_attribute(markup: &str, name: &str, value: &str) -> String {
    let lower = markup.to_ascii_lowercase();
    let mut search = 0;
    while let Some(found) = lower[search..].find("<html") {
        let at = search + found + "<html".len();
        let boundary = lower[at..].chars().next();
        if matches!(boundary, Some(c) if c.is_whitespace() || c == '>' || c == '/') {
            let mut out = String::with_capacity(markup.len() + name.len() + value.len() + 4);
            out.push_str(&markup[..at]);
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(value);
            out.push('"');
            out.push_str(&markup[at..]);
            return out;
        }
        search = at;
    }
    markup.to_string()
}
