//! Index-addressed DOM arena.
//!
//! A [`Document`] owns every node in a flat `Vec`; nodes refer to each other
//! by [`NodeId`]. Detached nodes stay in the arena (ids are never reused), so
//! a stale id can never alias a different node.
//!
//! Markup text is kept verbatim: the parser does not decode entities and the
//! serializer does not re-encode them. This keeps template tags such as
//! `<%= a && b %>` intact through a parse/serialize round trip.
//!
//! Form controls carry a [`LiveState`] next to their attributes, modelling
//! the properties a user can change without touching markup (`checked`,
//! `value`, `selected`).

mod parse;
mod serialize;

pub use parse::parse_document;
pub use serialize::stamp_root_attribute;

/// Handle to a node inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Position of the node in the arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A single attribute. `value` is `None` for bare attributes (`<input
/// checked>`) and for template chunks written in attribute position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name (lowercased unless it is a template chunk).
    pub name: String,
    /// Attribute value without quotes.
    pub value: Option<String>,
}

impl Attribute {
    /// Attribute with a value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: Some(value.into()) }
    }

    /// Bare attribute.
    pub fn bare(name: impl Into<String>) -> Self {
        Self { name: name.into(), value: None }
    }
}

/// Live properties of form controls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveState {
    /// `checked` property of checkboxes and radios.
    pub checked: bool,
    /// `selected` property of options.
    pub selected: bool,
    /// `disabled` property.
    pub disabled: bool,
    /// Current value of inputs and textareas.
    pub value: String,
    /// The user changed `checked`; the `checked` attribute no longer applies.
    pub dirty_checked: bool,
    /// The user changed `value`; the `value` attribute no longer applies.
    pub dirty_value: bool,
}

/// An element node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lowercased tag name.
    pub tag: String,
    /// Attributes in source order.
    pub attrs: Vec<Attribute>,
    /// Live control properties.
    pub live: LiveState,
}

impl Element {
    /// Attribute value; bare attributes read as `""`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_deref().unwrap_or(""))
    }

    /// `true` if the attribute is present.
    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|attr| attr.name == name)
    }

    /// Set or replace an attribute value.
    ///
    /// Reflected attributes update the live state: `disabled` always,
    /// `checked` and `value` only while the user has not changed the control.
    pub fn set_attr(&mut self, name: &str, value: Option<String>) {
        match self.attrs.iter_mut().find(|attr| attr.name == name) {
            Some(attr) => attr.value = value,
            None => self.attrs.push(Attribute { name: name.to_string(), value }),
        }
        self.reflect(name);
    }

    /// Remove an attribute. Returns `true` if it was present.
    pub fn remove_attr(&mut self, name: &str) -> bool {
        let before = self.attrs.len();
        self.attrs.retain(|attr| attr.name != name);
        self.reflect(name);
        self.attrs.len() != before
    }

    fn reflect(&mut self, name: &str) {
        match name {
            "disabled" => self.live.disabled = self.has_attr("disabled"),
            "checked" if self.is_checkable() && !self.live.dirty_checked => {
                self.live.checked = self.has_attr("checked");
            },
            "value" if self.tag == "input" && !self.live.dirty_value => {
                self.live.value = self.attr("value").unwrap_or("").to_string();
            },
            _ => {},
        }
    }

    /// The `id` attribute, if non-empty.
    pub fn id(&self) -> Option<&str> {
        self.attr("id").filter(|id| !id.is_empty())
    }

    /// Whitespace-separated class names.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }

    /// `true` for checkbox and radio inputs.
    pub fn is_checkable(&self) -> bool {
        self.tag == "input"
            && matches!(self.attr("type").map(str::to_ascii_lowercase).as_deref(), Some("checkbox" | "radio"))
    }

    /// Live state implied by the markup alone.
    pub(crate) fn default_live(&self) -> LiveState {
        LiveState {
            checked: self.has_attr("checked"),
            selected: self.has_attr("selected"),
            disabled: self.has_attr("disabled"),
            value: if self.tag == "input" {
                self.attr("value").unwrap_or("").to_string()
            } else {
                String::new()
            },
            dirty_checked: false,
            dirty_value: false,
        }
    }
}

/// Node payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Document root; parent of top-level nodes.
    Root,
    /// `<!DOCTYPE ...>`, stored without the surrounding `<!` and `>`.
    Doctype(String),
    /// Element node.
    Element(Element),
    /// Text node (verbatim markup text, including template tags).
    Text(String),
    /// Comment node, stored without `<!--` and `-->`.
    Comment(String),
}

/// Arena slot.
#[derive(Debug, Clone)]
pub struct Node {
    /// Payload.
    pub kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    /// Element payload, if this is an element.
    pub fn as_element(&self) -> Option<&Element> {
        match &self.kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }
}

/// A DOM tree stored as an arena.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Empty document containing only the root.
    pub fn new() -> Self {
        Self { nodes: vec![Node { kind: NodeKind::Root, parent: None, children: Vec::new() }] }
    }

    /// The root node.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of arena slots, detached nodes included.
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { kind, parent: None, children: Vec::new() });
        id
    }

    /// Create a detached element. Live state starts from the attributes.
    pub fn create_element(&mut self, tag: &str, attrs: Vec<Attribute>) -> NodeId {
        let mut element = Element { tag: tag.to_ascii_lowercase(), attrs, live: LiveState::default() };
        element.live = element.default_live();
        self.alloc(NodeKind::Element(element))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Text(text.into()))
    }

    /// Create a detached comment node.
    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Comment(text.into()))
    }

    /// Create a detached doctype node.
    pub fn create_doctype(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Doctype(text.into()))
    }

    /// Node by id.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Mutable payload by id.
    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.index()].kind
    }

    /// Element payload, if `id` is an element.
    pub fn element(&self, id: NodeId) -> Option<&Element> {
        self.node(id).as_element()
    }

    /// Mutable element payload, if `id` is an element.
    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.index()].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Lowercased tag name, if `id` is an element.
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|element| element.tag.as_str())
    }

    /// Attribute of an element.
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|element| element.attr(name))
    }

    /// Set an attribute on an element. No-op for other node kinds.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        if let Some(element) = self.element_mut(id) {
            element.set_attr(name, Some(value.into()));
        }
    }

    /// Remove an attribute from an element.
    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> bool {
        self.element_mut(id).is_some_and(|element| element.remove_attr(name))
    }

    /// Parent of a node, `None` for the root and detached nodes.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Children in order.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// First child.
    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).first().copied()
    }

    /// Following sibling.
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let position = siblings.iter().position(|&child| child == id)?;
        siblings.get(position + 1).copied()
    }

    /// Detach a node from its parent. Its subtree stays intact.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.index()].parent.take() {
            self.nodes[parent.index()].children.retain(|&child| child != id);
        }
    }

    /// Append `child` to `parent`, detaching it first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Insert `child` into `parent` before `reference` (append if `None` or
    /// if `reference` is not a child of `parent`).
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        debug_assert!(child != parent, "node cannot be its own child");
        self.detach(child);
        let siblings = &mut self.nodes[parent.index()].children;
        let position = reference
            .and_then(|reference| siblings.iter().position(|&sibling| sibling == reference))
            .unwrap_or(siblings.len());
        siblings.insert(position, child);
        self.nodes[child.index()].parent = Some(parent);
    }

    /// Replace `old` with `new` in `old`'s parent.
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        if let Some(parent) = self.parent(old) {
            let next = self.next_sibling(old);
            self.detach(old);
            self.insert_before(parent, new, next);
        }
    }

    /// Descendants of `id` in document order, `id` excluded.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev());
        }
        out
    }

    /// `true` if `id` is `ancestor` or lies below it.
    pub fn is_inclusive_descendant(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(node) = cursor {
            if node == ancestor {
                return true;
            }
            cursor = self.parent(node);
        }
        false
    }

    /// `true` if the node is reachable from the root.
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.is_inclusive_descendant(id, self.root())
    }

    /// Ancestors of `id` starting with its parent.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), |&node| self.parent(node))
    }

    /// First connected element with the given id attribute.
    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|&node| self.element(node).and_then(Element::id) == Some(id))
    }

    /// Connected elements carrying the given attribute, in document order.
    pub fn elements_with_attr(&self, name: &str) -> Vec<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .filter(|&node| self.element(node).is_some_and(|element| element.has_attr(name)))
            .collect()
    }

    /// Connected elements with the given tag, in document order.
    pub fn elements_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .filter(|&node| self.tag(node) == Some(tag))
            .collect()
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        if let NodeKind::Text(text) = &self.node(id).kind {
            return text.clone();
        }
        self.descendants(id)
            .into_iter()
            .filter_map(|node| match &self.node(node).kind {
                NodeKind::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Add a class to an element's `class` attribute.
    pub fn add_class(&mut self, id: NodeId, class: &str) {
        let Some(element) = self.element_mut(id) else { return };
        if element.classes().any(|existing| existing == class) {
            return;
        }
        let joined = match element.attr("class").map(str::trim) {
            Some(current) if !current.is_empty() => format!("{current} {class}"),
            _ => class.to_string(),
        };
        element.set_attr("class", Some(joined));
    }

    /// Remove a class from an element's `class` attribute.
    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        let Some(element) = self.element_mut(id) else { return };
        if !element.has_attr("class") {
            return;
        }
        let kept: Vec<&str> = element.classes().filter(|existing| *existing != class).collect();
        let joined = kept.join(" ");
        element.set_attr("class", Some(joined));
    }

    /// Reset the live state of an element to what its markup declares.
    ///
    /// Textareas take their value from their text content.
    pub fn reset_live_state(&mut self, id: NodeId) {
        let text = (self.tag(id) == Some("textarea")).then(|| self.text_content(id));
        if let Some(element) = self.element_mut(id) {
            element.live = element.default_live();
            if let Some(text) = text {
                element.live.value = text;
            }
        }
    }

    /// Deep-copy `source_id` from `source` into this arena. The copy is
    /// detached; live state is taken from the copied markup.
    pub fn import(&mut self, source: &Document, source_id: NodeId) -> NodeId {
        let top = self.alloc(source.node(source_id).kind.clone());
        let mut stack = vec![(source_id, top)];
        while let Some((from, to)) = stack.pop() {
            for &child in source.children(from) {
                let copy = self.alloc(source.node(child).kind.clone());
                self.append_child(to, copy);
                stack.push((child, copy));
            }
        }
        for node in std::iter::once(top).chain(self.descendants(top)) {
            if self.element(node).is_some() {
                self.reset_live_state(node);
            }
        }
        top
    }
}
