//! Class and attribute mutations queued by a handler.
//!
//! Targets and class names are checked lexically before they are queued. An
//! entry that fails its pattern is dropped with a warning; the rest of the
//! call still applies.

use std::{collections::BTreeMap, sync::LazyLock};

use regex::Regex;
use syncframe_proto::Instructions;
use tracing::warn;

#[allow(clippy::expect_used)]
static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[A-Za-z][\w\-:.]*$").expect("static pattern"));

#[allow(clippy::expect_used)]
static CLASS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\.?-?[A-Za-z_][\w-]*$").expect("static pattern"));

/// `true` if `id` is a `#id` reference. Logs a warning otherwise.
pub fn is_valid_id(id: &str) -> bool {
    let valid = ID_PATTERN.is_match(id);
    if !valid {
        warn!("invalid id reference `{id}` used in route handler");
    }
    valid
}

/// `true` if `class` is a class name, optionally `.`-prefixed. Logs a
/// warning otherwise.
pub fn is_valid_class(class: &str) -> bool {
    let valid = CLASS_PATTERN.is_match(class);
    if !valid {
        warn!("invalid CSS class reference `{class}` used in route handler");
    }
    valid
}

/// Mutations accumulated between renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingMutations {
    add: BTreeMap<String, Vec<String>>,
    remove: BTreeMap<String, Vec<String>>,
    set: BTreeMap<String, BTreeMap<String, String>>,
    unset: BTreeMap<String, Vec<String>>,
}

impl PendingMutations {
    /// Queue classes for addition to `id`.
    pub fn add_classes(&mut self, id: &str, classes: &[&str]) {
        queue_classes(&mut self.add, id, classes);
    }

    /// Queue classes for removal from `id`.
    pub fn remove_classes(&mut self, id: &str, classes: &[&str]) {
        queue_classes(&mut self.remove, id, classes);
    }

    /// Queue `name="value"` on `id`. `None` sets an empty value.
    pub fn set_attribute(&mut self, id: &str, name: &str, value: Option<&str>) {
        if !is_valid_id(id) {
            return;
        }
        self.set
            .entry(id.to_string())
            .or_default()
            .insert(name.to_string(), value.unwrap_or_default().to_string());
    }

    /// Queue attributes for removal from `id`.
    pub fn remove_attributes(&mut self, id: &str, names: &[&str]) {
        if !is_valid_id(id) {
            return;
        }
        let queued = self.unset.entry(id.to_string()).or_default();
        for name in names {
            if !queued.iter().any(|q| q == name) {
                queued.push((*name).to_string());
            }
        }
    }

    /// `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty() && self.set.is_empty() && self.unset.is_empty()
    }

    /// Move everything queued into `instructions`.
    pub fn drain_into(&mut self, instructions: &mut Instructions) {
        instructions.css_classes_to_add = std::mem::take(&mut self.add);
        instructions.css_classes_to_remove = std::mem::take(&mut self.remove);
        instructions.attributes_to_set = std::mem::take(&mut self.set);
        instructions.attributes_to_remove = std::mem::take(&mut self.unset);
    }
}

fn queue_classes(queue: &mut BTreeMap<String, Vec<String>>, id: &str, classes: &[&str]) {
    if !is_valid_id(id) {
        return;
    }
    let queued = queue.entry(id.to_string()).or_default();
    for class in classes {
        if is_valid_class(class) && !queued.iter().any(|q| q == class) {
            queued.push((*class).to_string());
        }
    }
}
