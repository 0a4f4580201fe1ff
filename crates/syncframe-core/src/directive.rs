//! Conditional-class directives.
//!
//! Directives are rewritten into template output tags inside the element's
//! `class` attribute, so the class toggles every time the template renders:
//!
//! - `s-class="name | expr"`: `name` is present iff `expr` is truthy
//! - `s-active="expr"`: shorthand for `s-class="active | expr"`
//! - `s-active-path="/path"`: `active` while the current path starts with
//!   `/path` (falls back to the element's `href`)

use tracing::warn;

use crate::dom::{Document, NodeId};

/// Attribute for `name | expr` class toggles.
pub const CLASS_DIRECTIVE: &str = "s-class";
/// Attribute toggling `active` on a condition.
pub const ACTIVE_DIRECTIVE: &str = "s-active";
/// Attribute toggling `active` on a path prefix.
pub const ACTIVE_PATH_DIRECTIVE: &str = "s-active-path";

/// Expand every directive in `doc`. Returns the number of directives
/// rewritten; malformed ones are left in place and logged.
pub fn expand_directives(doc: &mut Document) -> usize {
    let mut expanded = 0;

    for node in doc.elements_with_attr(CLASS_DIRECTIVE) {
        let raw = doc.attr(node, CLASS_DIRECTIVE).unwrap_or_default().to_string();
        let Some((name, condition)) = raw.split_once('|') else {
            warn!("unable to parse s-class=\"{raw}\" (missing pipe character)");
            continue;
        };
        apply(doc, node, CLASS_DIRECTIVE, name.trim(), condition.trim());
        expanded += 1;
    }

    for node in doc.elements_with_attr(ACTIVE_DIRECTIVE) {
        let condition = doc.attr(node, ACTIVE_DIRECTIVE).unwrap_or_default().trim().to_string();
        apply(doc, node, ACTIVE_DIRECTIVE, "active", &condition);
        expanded += 1;
    }

    for node in doc.elements_with_attr(ACTIVE_PATH_DIRECTIVE) {
        let path = doc
            .attr(node, ACTIVE_PATH_DIRECTIVE)
            .filter(|path| !path.is_empty())
            .or_else(|| doc.attr(node, "href"))
            .unwrap_or_default();
        let condition = format!("env.path.startsWith('{}')", path.replace('\\', "\\\\").replace('\'', "\\'"));
        apply(doc, node, ACTIVE_PATH_DIRECTIVE, "active", &condition);
        expanded += 1;
    }

    expanded
}

fn apply(doc: &mut Document, node: NodeId, directive: &str, class: &str, condition: &str) {
    let current = doc.attr(node, "class").unwrap_or_default().to_string();
    let toggled = if current.is_empty() {
        format!("<%= ({condition}) ? '{class}' : '' %>")
    } else {
        format!("{current}<%= ({condition}) ? ' {class}' : '' %>")
    };
    doc.remove_attr(node, directive);
    doc.set_attr(node, "class", toggled.trim());
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dom::parse_document;
    use crate::template::{Scope, Template};

    fn expand(markup: &str) -> (String, usize) {
        let mut doc = parse_document(markup);
        let count = expand_directives(&mut doc);
        (doc.to_html(), count)
    }

    fn render(markup: &str, scope: &Scope) -> String {
        let (expanded, _) = expand(markup);
        Template::parse(&expanded).unwrap().render(scope)
    }

    #[test]
    fn class_toggle_follows_condition() {
        let markup = r#"<li class="item" s-class="done | $.done">x</li>"#;
        assert_eq!(render(markup, &Scope::new().with("$", json!({"done": true}))), r#"<li class="item done">x</li>"#);
        assert_eq!(render(markup, &Scope::new().with("$", json!({"done": false}))), r#"<li class="item">x</li>"#);
    }

    #[test]
    fn class_toggle_without_existing_class() {
        let markup = r#"<p s-class="hot | n > 3"></p>"#;
        assert_eq!(render(markup, &Scope::new().with("n", json!(5))), r#"<p class="hot"></p>"#);
    }

    #[test]
    fn missing_pipe_leaves_markup_untouched() {
        let markup = r#"<p s-class="hot"></p>"#;
        assert_eq!(expand(markup), (markup.to_string(), 0));
    }

    #[test]
    fn active_path_falls_back_to_href() {
        let markup = r#"<a href="/docs" s-active-path>Docs</a>"#;
        let on = Scope::new().with("env", json!({"path": "/docs/intro"}));
        let off = Scope::new().with("env", json!({"path": "/blog"}));
        assert_eq!(render(markup, &on), r#"<a href="/docs" class="active">Docs</a>"#);
        assert_eq!(render(markup, &off), r#"<a href="/docs" class="">Docs</a>"#);
    }

    #[test]
    fn active_shorthand() {
        let markup = r#"<button s-active="$.tab === 'a'">A</button>"#;
        let scope = Scope::new().with("$", json!({"tab": "a"}));
        assert_eq!(render(markup, &scope), r#"<button class="active">A</button>"#);
    }
}
