//! Render-time template language.
//!
//! | tag | meaning |
//! |---|---|
//! | `<%= expr %>` | HTML-escaped output |
//! | `<%- expr %>` | raw output |
//! | `<% if expr %>` / `<% else if expr %>` / `<% else %>` | conditional |
//! | `<% for item in expr %>` / `<% for item, i in expr %>` | loop over an array |
//! | `<% end %>` | closes `if` and `for` |
//! | `<%# ... %>` | comment |
//! | `<%%` | literal `<%` |
//!
//! Templates are parsed once and rendered many times against a [`Scope`].
//! Rendering cannot fail.

mod expr;

use serde_json::{Map, Value};

pub use self::expr::{display, truthy};
use self::expr::{Expr, Lookup};
use crate::error::TemplateError;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Output { expr: Expr, escape: bool },
    If { branches: Vec<(Expr, Vec<Segment>)>, otherwise: Vec<Segment> },
    For { binding: String, index: Option<String>, iterable: Expr, body: Vec<Segment> },
}

enum Token {
    Segment(Segment),
    If(Expr),
    ElseIf(Expr),
    Else,
    For { binding: String, index: Option<String>, iterable: Expr },
    End,
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parse template source.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let tokens = tokenize(source)?;
        let mut tokens = tokens.into_iter();
        let (segments, terminator) = parse_body(&mut tokens)?;
        match terminator {
            None => Ok(Self { segments }),
            Some(Terminator::End) => Err(invalid("end", "no open block")),
            Some(Terminator::Else | Terminator::ElseIf(_)) => Err(invalid("else", "outside of an if block")),
        }
    }

    /// Render against a scope.
    pub fn render(&self, scope: &Scope) -> String {
        let mut renderer = Renderer { scope, locals: Vec::new(), out: String::new() };
        renderer.segments(&self.segments);
        renderer.out
    }

    /// `true` if the template contains no tags at all.
    pub fn is_static(&self) -> bool {
        self.segments.iter().all(|segment| matches!(segment, Segment::Text(_)))
    }
}

fn invalid(tag: &str, reason: &'static str) -> TemplateError {
    TemplateError::InvalidControl { tag: tag.to_string(), reason }
}

fn tokenize(source: &str) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut pos = 0;

    while let Some(found) = source[pos..].find("<%") {
        let open = pos + found;
        text.push_str(&source[pos..open]);

        if source[open + 2..].starts_with('%') {
            text.push_str("<%");
            pos = open + 3;
            continue;
        }

        let close = source[open + 2..]
            .find("%>")
            .map(|i| open + 2 + i)
            .ok_or(TemplateError::UnterminatedTag { offset: open })?;
        let body = &source[open + 2..close];
        pos = close + 2;

        if !text.is_empty() {
            tokens.push(Token::Segment(Segment::Text(std::mem::take(&mut text))));
        }
        if let Some(token) = tag_token(body)? {
            tokens.push(token);
        }
    }

    text.push_str(&source[pos..]);
    if !text.is_empty() {
        tokens.push(Token::Segment(Segment::Text(text)));
    }
    Ok(tokens)
}

fn tag_token(body: &str) -> Result<Option<Token>, TemplateError> {
    if let Some(rest) = body.strip_prefix('=') {
        return Ok(Some(Token::Segment(Segment::Output { expr: expr::parse(rest)?, escape: true })));
    }
    if let Some(rest) = body.strip_prefix('-') {
        return Ok(Some(Token::Segment(Segment::Output { expr: expr::parse(rest)?, escape: false })));
    }
    if body.starts_with('#') {
        return Ok(None);
    }

    let trimmed = body.trim();
    let keyword_rest = |keyword: &str| {
        trimmed
            .strip_prefix(keyword)
            .filter(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace) || rest.starts_with('('))
    };

    if trimmed == "end" {
        return Ok(Some(Token::End));
    }
    if trimmed == "else" {
        return Ok(Some(Token::Else));
    }
    if let Some(rest) = trimmed.strip_prefix("else").and_then(|r| r.trim_start().strip_prefix("if")) {
        if rest.trim().is_empty() {
            return Err(invalid(trimmed, "missing condition"));
        }
        return Ok(Some(Token::ElseIf(expr::parse(rest)?)));
    }
    if let Some(rest) = keyword_rest("if") {
        if rest.trim().is_empty() {
            return Err(invalid(trimmed, "missing condition"));
        }
        return Ok(Some(Token::If(expr::parse(rest)?)));
    }
    if let Some(rest) = keyword_rest("for") {
        let (head, iterable) = rest
            .split_once(" in ")
            .ok_or_else(|| invalid(trimmed, "expected `for item in expr`"))?;
        let mut names = head.split(',').map(str::trim);
        let binding = names.next().filter(|name| is_identifier(name));
        let index = names.next();
        let (Some(binding), None) = (binding, names.next()) else {
            return Err(invalid(trimmed, "expected `for item in expr`"));
        };
        if index.is_some_and(|name| !is_identifier(name)) {
            return Err(invalid(trimmed, "invalid index name"));
        }
        return Ok(Some(Token::For {
            binding: binding.to_string(),
            index: index.map(str::to_string),
            iterable: expr::parse(iterable)?,
        }));
    }

    Err(invalid(trimmed, "unknown control tag"))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

enum Terminator {
    ElseIf(Expr),
    Else,
    End,
}

fn parse_body(
    tokens: &mut impl Iterator<Item = Token>,
) -> Result<(Vec<Segment>, Option<Terminator>), TemplateError> {
    let mut segments = Vec::new();
    while let Some(token) = tokens.next() {
        match token {
            Token::Segment(segment) => segments.push(segment),
            Token::End => return Ok((segments, Some(Terminator::End))),
            Token::Else => return Ok((segments, Some(Terminator::Else))),
            Token::ElseIf(condition) => return Ok((segments, Some(Terminator::ElseIf(condition)))),
            Token::If(condition) => segments.push(parse_if(tokens, condition)?),
            Token::For { binding, index, iterable } => {
                let (body, terminator) = parse_body(tokens)?;
                match terminator {
                    Some(Terminator::End) => {},
                    Some(_) => return Err(invalid("else", "inside a for block")),
                    None => return Err(TemplateError::UnclosedBlock("for")),
                }
                segments.push(Segment::For { binding, index, iterable, body });
            },
        }
    }
    Ok((segments, None))
}

fn parse_if(tokens: &mut impl Iterator<Item = Token>, condition: Expr) -> Result<Segment, TemplateError> {
    let mut branches = Vec::new();
    let mut condition = condition;
    loop {
        let (body, terminator) = parse_body(tokens)?;
        branches.push((condition, body));
        match terminator {
            Some(Terminator::ElseIf(next)) => condition = next,
            Some(Terminator::Else) => {
                let (otherwise, terminator) = parse_body(tokens)?;
                return match terminator {
                    Some(Terminator::End) => Ok(Segment::If { branches, otherwise }),
                    Some(_) => Err(invalid("else", "after else")),
                    None => Err(TemplateError::UnclosedBlock("if")),
                };
            },
            Some(Terminator::End) => return Ok(Segment::If { branches, otherwise: Vec::new() }),
            None => return Err(TemplateError::UnclosedBlock("if")),
        }
    }
}

/// Variables visible to a render.
///
/// Unknown names evaluate to `null`.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    vars: Map<String, Value>,
}

impl Scope {
    /// Empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variable binding.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set(name, value);
        self
    }

    /// Bind a variable.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Bound value, if any.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }
}

struct Renderer<'a> {
    scope: &'a Scope,
    locals: Vec<(String, Value)>,
    out: String,
}

impl Lookup for Renderer<'_> {
    fn lookup(&self, name: &str) -> Value {
        self.locals
            .iter()
            .rev()
            .find(|(local, _)| local == name)
            .map(|(_, value)| value.clone())
            .or_else(|| self.scope.get(name).cloned())
            .unwrap_or(Value::Null)
    }
}

impl Renderer<'_> {
    fn segments(&mut self, segments: &[Segment]) {
        for segment in segments {
            match segment {
                Segment::Text(text) => self.out.push_str(text),
                Segment::Output { expr, escape } => {
                    let value = display(&expr.eval(self));
                    if *escape {
                        escape_html(&value, &mut self.out);
                    } else {
                        self.out.push_str(&value);
                    }
                },
                Segment::If { branches, otherwise } => {
                    let chosen = branches
                        .iter()
                        .find(|(condition, _)| truthy(&condition.eval(self)))
                        .map_or(otherwise.as_slice(), |(_, body)| body.as_slice());
                    self.segments(chosen);
                },
                Segment::For { binding, index, iterable, body } => {
                    let items = match iterable.eval(self) {
                        Value::Array(items) => items,
                        Value::Null => Vec::new(),
                        other => {
                            tracing::debug!("for-loop over non-array value {other}");
                            Vec::new()
                        },
                    };
                    for (i, item) in items.into_iter().enumerate() {
                        let depth = self.locals.len();
                        self.locals.push((binding.clone(), item));
                        if let Some(index) = index {
                            self.locals.push((index.clone(), Value::from(i)));
                        }
                        self.segments(body);
                        self.locals.truncate(depth);
                    }
                },
            }
        }
    }
}

/// Escape text for inclusion in markup.
pub fn escape_html(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn render(source: &str, scope: &Scope) -> String {
        Template::parse(source).unwrap().render(scope)
    }

    #[test]
    fn escaped_and_raw_output() {
        let scope = Scope::new().with("$", json!({"html": "<b>&</b>"}));
        assert_eq!(render("<%= $.html %>|<%- $.html %>", &scope), "&lt;b&gt;&amp;&lt;/b&gt;|<b>&</b>");
    }

    #[test]
    fn if_else_chain() {
        let source = "<% if n > 1 %>many<% else if n == 1 %>one<% else %>none<% end %>";
        assert_eq!(render(source, &Scope::new().with("n", json!(3))), "many");
        assert_eq!(render(source, &Scope::new().with("n", json!(1))), "one");
        assert_eq!(render(source, &Scope::new()), "none");
    }

    #[test]
    fn for_loop_with_index_shadows_globals() {
        let scope = Scope::new().with("item", json!("outer")).with("items", json!(["a", "b"]));
        let source = "<% for item, i in items %>[<%= i %>:<%= item %>]<% end %><%= item %>";
        assert_eq!(render(source, &scope), "[0:a][1:b]outer");
    }

    #[test]
    fn comments_and_literal_open_tag() {
        assert_eq!(render("a<%# hidden %>b <%% c", &Scope::new()), "ab <% c");
    }

    #[test]
    fn missing_values_render_empty() {
        assert_eq!(render("[<%= nope.deep.deeper %>]", &Scope::new()), "[]");
    }

    #[test]
    fn structural_errors() {
        assert!(matches!(Template::parse("<%= a"), Err(TemplateError::UnterminatedTag { offset: 0 })));
        assert!(matches!(Template::parse("<% if a %>x"), Err(TemplateError::UnclosedBlock("if"))));
        assert!(matches!(Template::parse("<% for x in xs %>"), Err(TemplateError::UnclosedBlock("for"))));
        assert!(matches!(Template::parse("<% end %>"), Err(TemplateError::InvalidControl { .. })));
        assert!(matches!(Template::parse("<% while x %>"), Err(TemplateError::InvalidControl { .. })));
        assert!(matches!(Template::parse("<% for 1 in xs %><% end %>"), Err(TemplateError::InvalidControl { .. })));
    }

    #[test]
    fn static_templates_are_detected() {
        assert!(Template::parse("<p>plain</p>").unwrap().is_static());
        assert!(!Template::parse("<p><%= x %></p>").unwrap().is_static());
    }
}
