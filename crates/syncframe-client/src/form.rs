//! Form serialization and trigger descriptors.
//!
//! [`form_data`] follows browser `FormData` rules: controls need a `name`,
//! disabled controls (or controls inside a disabled fieldset) are skipped,
//! unchecked checkboxes and radios are omitted and checked ones send their
//! value or `"on"`, selects send their selected option. Later entries with
//! the same name overwrite earlier ones.

use serde_json::{Map, Value};
use syncframe_core::{Document, Element, NodeId};
use syncframe_proto::Trigger;

/// Input types that never contribute a form entry without a submitter.
const SKIPPED_INPUT_TYPES: [&str; 5] = ["submit", "button", "reset", "image", "file"];

/// Serialize the controls of `form` into an object payload.
pub fn form_data(doc: &Document, form: NodeId) -> Map<String, Value> {
    let mut data = Map::new();
    for node in doc.descendants(form) {
        let Some(element) = doc.element(node) else { continue };
        if !matches!(element.tag.as_str(), "input" | "select" | "textarea") {
            continue;
        }
        let Some(name) = element.attr("name").filter(|name| !name.is_empty()) else { continue };
        if is_disabled(doc, node, form) {
            continue;
        }
        let value = match element.tag.as_str() {
            "input" => input_entry(element),
            "select" => selected_option(doc, node).map(|option| option_value(doc, option)),
            _ => Some(element.live.value.clone()),
        };
        if let Some(value) = value {
            data.insert(name.to_string(), Value::String(value));
        }
    }
    data
}

fn input_entry(element: &Element) -> Option<String> {
    let kind = input_type(element);
    if SKIPPED_INPUT_TYPES.contains(&kind.as_str()) {
        return None;
    }
    if element.is_checkable() {
        return element.live.checked.then(|| checkable_value(element));
    }
    Some(element.live.value.clone())
}

fn input_type(element: &Element) -> String {
    element.attr("type").unwrap_or("text").to_ascii_lowercase()
}

fn checkable_value(element: &Element) -> String {
    element.attr("value").unwrap_or("on").to_string()
}

fn is_disabled(doc: &Document, node: NodeId, form: NodeId) -> bool {
    if doc.element(node).is_some_and(|element| element.live.disabled) {
        return true;
    }
    doc.ancestors(node)
        .take_while(|&ancestor| ancestor != form)
        .any(|ancestor| doc.tag(ancestor) == Some("fieldset") && doc.attr(ancestor, "disabled").is_some())
}

/// Options of a select in document order.
fn options(doc: &Document, select: NodeId) -> Vec<NodeId> {
    doc.descendants(select).into_iter().filter(|&node| doc.tag(node) == Some("option")).collect()
}

/// The option a single select submits: the first selected one, else the
/// first enabled one.
fn selected_option(doc: &Document, select: NodeId) -> Option<NodeId> {
    let options = options(doc, select);
    let enabled = |&&option: &&NodeId| doc.element(option).is_some_and(|e| !e.has_attr("disabled"));
    options
        .iter()
        .find(|&&option| doc.element(option).is_some_and(|e| e.live.selected))
        .filter(enabled)
        .or_else(|| options.iter().find(enabled))
        .copied()
}

fn option_value(doc: &Document, option: NodeId) -> String {
    match doc.attr(option, "value") {
        Some(value) => value.to_string(),
        None => doc.text_content(option).trim().to_string(),
    }
}

/// The `value` property of an element as script would read it.
pub fn control_value(doc: &Document, node: NodeId) -> String {
    let Some(element) = doc.element(node) else { return String::new() };
    match element.tag.as_str() {
        "input" if element.is_checkable() => checkable_value(element),
        "input" | "textarea" => element.live.value.clone(),
        "select" => selected_option(doc, node).map(|option| option_value(doc, option)).unwrap_or_default(),
        "option" => option_value(doc, node),
        "button" | "li" | "data" | "meter" | "progress" | "param" => {
            element.attr("value").unwrap_or("").to_string()
        },
        _ => String::new(),
    }
}

/// Descriptor of the element an event was dispatched to.
pub fn trigger(doc: &Document, node: NodeId) -> Trigger {
    let attr = |name: &str| doc.attr(node, name).unwrap_or("").to_string();
    Trigger { id: attr("id"), name: attr("name"), value: control_value(doc, node) }
}

/// The form a click on `target` would submit, if any.
///
/// Only submit buttons (`<button>` without a type or with `type=submit`,
/// and `<input type=submit|image>`) inside a form qualify.
pub fn submitted_form(doc: &Document, target: NodeId) -> Option<NodeId> {
    let button = std::iter::once(target).chain(doc.ancestors(target)).find(|&node| {
        doc.element(node).is_some_and(|element| match element.tag.as_str() {
            "button" => matches!(element.attr("type").map(str::to_ascii_lowercase).as_deref(), None | Some("submit")),
            "input" => matches!(input_type(element).as_str(), "submit" | "image"),
            _ => false,
        })
    })?;
    if doc.element(button).is_some_and(|element| element.live.disabled) {
        return None;
    }
    closest_form(doc, button)
}

/// `target` itself if it is a form, else its nearest form ancestor.
pub fn closest_form(doc: &Document, target: NodeId) -> Option<NodeId> {
    std::iter::once(target).chain(doc.ancestors(target)).find(|&node| doc.tag(node) == Some("form"))
}
