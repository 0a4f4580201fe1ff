//! Structural reconciliation of a live document against fresh markup.
//!
//! [`reconcile`] mutates a subtree of the live [`Document`] until it matches
//! a subtree of a source document, reusing live nodes where possible so that
//! element identity (and therefore listeners and focus) survives re-renders.
//!
//! # Matching
//!
//! Children are matched in source order:
//!
//! 1. A source element with an `id` claims the live element with the same
//!    `id` anywhere under the target, moving it into position.
//! 2. Otherwise the next compatible unkeyed live sibling is reused. Keyed
//!    live siblings are stepped over; incompatible unkeyed ones in between
//!    are discarded.
//! 3. Otherwise a deep copy of the source node is inserted.
//!
//! Live siblings left over after the last source child are discarded.
//!
//! # Live controls
//!
//! After an element's children are patched its [`LiveState`] is reset from
//! the source markup: checkbox and radio `checked`, `disabled`, input and
//! textarea `value`, and the selected option of a `select`. Whatever the
//! user did locally is overwritten by the server's view.
//!
//! # Traversal
//!
//! The tree walk is an explicit worklist. Each matched pair is pushed as a
//! `Patch`, and a `Finalize` entry for the same pair is pushed beneath its
//! children so that control state is applied after the subtree settles.
//!
//! [`LiveState`]: crate::dom::LiveState

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::dom::{Document, Element, LiveState, NodeId, NodeKind};

/// Callbacks for nodes entering and leaving the live document.
pub trait ReconcileObserver {
    /// A deep copy of a source node was inserted.
    fn on_added(&mut self, _doc: &Document, _node: NodeId) {}

    /// A live node (and its subtree) was removed for good.
    fn on_discarded(&mut self, _doc: &Document, _node: NodeId) {}
}

/// Observer that ignores every callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ReconcileObserver for NoopObserver {}

/// Summary of one reconciliation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    /// The node now standing where the target was. Differs from the target
    /// only if the target had to be replaced wholesale.
    pub root: Option<NodeId>,
    /// Subtrees inserted from the source.
    pub added: usize,
    /// Subtrees removed from the live document.
    pub discarded: usize,
    /// Nodes whose attributes or text changed in place.
    pub updated: usize,
    /// Subtrees left untouched because they already matched.
    pub skipped: usize,
}

enum Work {
    Patch(NodeId, NodeId),
    Finalize(NodeId, NodeId),
}

/// Reconcile `target` in `live` against `source_node` in `source`.
pub fn reconcile(
    live: &mut Document,
    target: NodeId,
    source: &Document,
    source_node: NodeId,
    observer: &mut dyn ReconcileObserver,
) -> Reconciliation {
    let mut summary = Reconciliation::default();

    if !compatible(live, target, source, source_node) {
        if live.parent(target).is_none() {
            trace!("reconcile target {target:?} is detached and incompatible with source");
            summary.root = None;
            return summary;
        }
        let replacement = live.import(source, source_node);
        live.replace(target, replacement);
        observer.on_discarded(live, target);
        observer.on_added(live, replacement);
        summary.root = Some(replacement);
        summary.added = 1;
        summary.discarded = 1;
        return summary;
    }

    let mut state = Reconciler::new(live, target, source);
    state.claimed.insert(target);
    let mut work = vec![Work::Patch(target, source_node)];
    while let Some(item) = work.pop() {
        match item {
            Work::Patch(l, s) => state.patch(l, s, &mut work, observer),
            Work::Finalize(l, s) => state.finalize(l, s),
        }
    }

    let Reconciler { live, removed, mut summary_counts, .. } = state;
    for node in removed {
        if live.parent(node).is_none() && node != target {
            summary_counts.discarded += 1;
            observer.on_discarded(live, node);
        }
    }
    summary_counts.root = Some(target);
    summary_counts
}

struct Reconciler<'a> {
    live: &'a mut Document,
    source: &'a Document,
    keyed: HashMap<String, NodeId>,
    claimed: HashSet<NodeId>,
    removed: Vec<NodeId>,
    summary_counts: Reconciliation,
}

impl<'a> Reconciler<'a> {
    fn new(live: &'a mut Document, target: NodeId, source: &'a Document) -> Self {
        let mut keyed = HashMap::new();
        for node in live.descendants(target) {
            if let Some(id) = live.element(node).and_then(Element::id) {
                keyed.entry(id.to_string()).or_insert(node);
            }
        }
        Self {
            live,
            source,
            keyed,
            claimed: HashSet::new(),
            removed: Vec::new(),
            summary_counts: Reconciliation::default(),
        }
    }

    fn is_keyed(&self, node: NodeId) -> bool {
        self.live.element(node).and_then(Element::id).is_some_and(|id| self.keyed.get(id) == Some(&node))
    }

    fn discard(&mut self, node: NodeId) {
        self.live.detach(node);
        self.removed.push(node);
    }

    fn patch(&mut self, l: NodeId, s: NodeId, work: &mut Vec<Work>, observer: &mut dyn ReconcileObserver) {
        if identical(self.live, l, self.source, s) {
            self.summary_counts.skipped += 1;
            for node in self.live.descendants(l) {
                if self.is_keyed(node) {
                    self.claimed.insert(node);
                }
            }
            return;
        }

        if self.sync_node(l, s) {
            self.summary_counts.updated += 1;
        }

        work.push(Work::Finalize(l, s));

        let source = self.source;
        let mut pairs = Vec::new();
        let mut cursor = self.live.first_child(l);
        for &child in source.children(s) {
            let matched = match source.element(child).and_then(Element::id) {
                Some(key) => self.claim_keyed(l, key, child),
                None => self.claim_unkeyed(&mut cursor, child),
            };
            match matched {
                Some(node) => {
                    if Some(node) == cursor {
                        cursor = self.live.next_sibling(node);
                    } else {
                        self.live.insert_before(l, node, cursor);
                    }
                    pairs.push((node, child));
                },
                None => {
                    let copy = self.live.import(source, child);
                    self.live.insert_before(l, copy, cursor);
                    self.summary_counts.added += 1;
                    observer.on_added(self.live, copy);
                },
            }
        }

        while let Some(leftover) = cursor {
            cursor = self.live.next_sibling(leftover);
            self.discard(leftover);
        }

        work.extend(pairs.into_iter().rev().map(|(node, child)| Work::Patch(node, child)));
    }

    fn claim_keyed(&mut self, parent: NodeId, key: &str, child: NodeId) -> Option<NodeId> {
        let node = *self.keyed.get(key)?;
        if self.claimed.contains(&node)
            || !compatible(self.live, node, self.source, child)
            || self.live.is_inclusive_descendant(parent, node)
        {
            return None;
        }
        self.claimed.insert(node);
        Some(node)
    }

    /// Find the next compatible unkeyed sibling at or after `cursor`.
    /// Incompatible unkeyed siblings passed over are discarded, and `cursor`
    /// is moved to the first sibling still in place.
    fn claim_unkeyed(&mut self, cursor: &mut Option<NodeId>, child: NodeId) -> Option<NodeId> {
        let mut scanned = Vec::new();
        let mut scan = *cursor;
        while let Some(node) = scan {
            scan = self.live.next_sibling(node);
            if self.is_keyed(node) {
                scanned.push((node, false));
                continue;
            }
            if compatible(self.live, node, self.source, child) {
                let mut kept = None;
                for (passed, incompatible) in scanned {
                    if incompatible {
                        self.discard(passed);
                    } else if kept.is_none() {
                        kept = Some(passed);
                    }
                }
                *cursor = kept.or(Some(node));
                return Some(node);
            }
            scanned.push((node, true));
        }
        None
    }

    /// Copy attributes or text from the source node. Returns `true` if
    /// anything changed.
    fn sync_node(&mut self, l: NodeId, s: NodeId) -> bool {
        match (self.live.kind_mut(l), &self.source.node(s).kind) {
            (NodeKind::Element(live), NodeKind::Element(source)) => {
                let mut changed = false;
                let before = live.attrs.len();
                live.attrs.retain(|attr| source.has_attr(&attr.name));
                changed |= live.attrs.len() != before;
                for attr in &source.attrs {
                    let current = live.attrs.iter().find(|existing| existing.name == attr.name);
                    if current.map(|existing| &existing.value) != Some(&attr.value) {
                        live.set_attr(&attr.name, attr.value.clone());
                        changed = true;
                    }
                }
                changed
            },
            (NodeKind::Text(live), NodeKind::Text(source))
            | (NodeKind::Comment(live), NodeKind::Comment(source))
            | (NodeKind::Doctype(live), NodeKind::Doctype(source)) => {
                if live == source {
                    false
                } else {
                    live.clone_from(source);
                    true
                }
            },
            _ => false,
        }
    }

    fn finalize(&mut self, l: NodeId, s: NodeId) {
        let Some(tag) = self.live.tag(l).map(str::to_string) else { return };
        if let Some(expected) = expected_live(self.source, s) {
            if let Some(element) = self.live.element_mut(l) {
                element.live = expected;
            }
        }
        if tag == "select" {
            let live_options = self.live.descendants(l).into_iter().filter(|&n| self.live.tag(n) == Some("option"));
            let live_options: Vec<NodeId> = live_options.collect();
            let source_options: Vec<NodeId> =
                self.source.descendants(s).into_iter().filter(|&n| self.source.tag(n) == Some("option")).collect();
            let selected = source_options
                .iter()
                .position(|&option| self.source.element(option).is_some_and(|e| e.has_attr("selected")));
            for (i, option) in live_options.into_iter().enumerate() {
                if let Some(element) = self.live.element_mut(option) {
                    element.live.selected = Some(i) == selected;
                }
            }
        }
    }
}

/// Live state the source markup implies for an element.
fn expected_live(source: &Document, s: NodeId) -> Option<LiveState> {
    let element = source.element(s)?;
    let mut live = element.default_live();
    if element.tag == "textarea" {
        live.value = source.text_content(s);
    }
    Some(live)
}

fn compatible(live: &Document, l: NodeId, source: &Document, s: NodeId) -> bool {
    match (&live.node(l).kind, &source.node(s).kind) {
        (NodeKind::Element(a), NodeKind::Element(b)) => a.tag == b.tag,
        (NodeKind::Root, NodeKind::Root)
        | (NodeKind::Text(_), NodeKind::Text(_))
        | (NodeKind::Comment(_), NodeKind::Comment(_))
        | (NodeKind::Doctype(_), NodeKind::Doctype(_)) => true,
        _ => false,
    }
}

/// Structural equality including live control state, without recursion.
fn identical(live: &Document, l: NodeId, source: &Document, s: NodeId) -> bool {
    let mut stack = vec![(l, s)];
    let mut selects = Vec::new();
    while let Some((a, b)) = stack.pop() {
        let same = match (&live.node(a).kind, &source.node(b).kind) {
            (NodeKind::Element(x), NodeKind::Element(y)) => {
                x.tag == y.tag
                    && x.attrs.len() == y.attrs.len()
                    && x.attrs.iter().all(|attr| y.attrs.contains(attr))
                    && expected_live(source, b).is_some_and(|expected| live_matches(x, &expected))
            },
            (x, y) => x == y,
        };
        if !same || live.children(a).len() != source.children(b).len() {
            return false;
        }
        if live.tag(a) == Some("select") {
            selects.push((a, b));
        }
        stack.extend(live.children(a).iter().copied().zip(source.children(b).iter().copied()));
    }
    selects.into_iter().all(|(a, b)| {
        let selected_live = live.descendants(a).into_iter().filter(|&n| live.tag(n) == Some("option")).position(|n| {
            live.element(n).is_some_and(|e| e.live.selected)
        });
        let selected_source = source
            .descendants(b)
            .into_iter()
            .filter(|&n| source.tag(n) == Some("option"))
            .position(|n| source.element(n).is_some_and(|e| e.has_attr("selected")));
        selected_live == selected_source
    })
}

/// Options are compared at the select level, where only the first selected
/// option counts.
fn live_matches(element: &Element, expected: &LiveState) -> bool {
    if element.tag == "option" {
        return element.live.checked == expected.checked
            && element.live.disabled == expected.disabled
            && element.live.value == expected.value;
    }
    element.live == *expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_document;

    #[derive(Default)]
    struct Recorder {
        added: Vec<String>,
        discarded: Vec<String>,
    }

    impl ReconcileObserver for Recorder {
        fn on_added(&mut self, doc: &Document, node: NodeId) {
            self.added.push(doc.outer_html(node));
        }

        fn on_discarded(&mut self, doc: &Document, node: NodeId) {
            self.discarded.push(doc.outer_html(node));
        }
    }

    fn morph(live: &str, next: &str) -> (Document, Reconciliation, Recorder) {
        let mut doc = parse_document(live);
        let source = parse_document(next);
        let mut recorder = Recorder::default();
        let root = doc.root();
        let summary = reconcile(&mut doc, root, &source, source.root(), &mut recorder);
        (doc, summary, recorder)
    }

    #[test]
    fn result_matches_source_markup() {
        let next = r#"<ul><li id="b">B!</li><li>new</li><li id="a">A</li></ul><p class="x">t</p>"#;
        let (doc, _, _) = morph(r#"<ul><li id="a">A</li><li id="b">B</li></ul><p>t</p><span></span>"#, next);
        assert_eq!(doc.to_html(), next);
    }

    #[test]
    fn keyed_nodes_keep_identity_when_moved() {
        let mut doc = parse_document(r#"<ul><li id="a">A</li><li id="b">B</li></ul>"#);
        let b = doc.get_element_by_id("b").unwrap();
        let source = parse_document(r#"<ul><li id="b">B</li><li id="a">A</li></ul>"#);
        let root = doc.root();

        reconcile(&mut doc, root, &source, source.root(), &mut NoopObserver);

        assert_eq!(doc.get_element_by_id("b"), Some(b));
        let ul = doc.elements_by_tag("ul")[0];
        assert_eq!(doc.first_child(ul), Some(b));
    }

    #[test]
    fn callbacks_report_added_and_discarded() {
        let (_, summary, recorder) = morph("<div><p>old</p></div>", "<div><span>new</span></div>");
        assert_eq!(recorder.added, vec!["<span>new</span>"]);
        assert_eq!(recorder.discarded, vec!["<p>old</p>"]);
        assert_eq!((summary.added, summary.discarded), (1, 1));
    }

    #[test]
    fn passed_over_siblings_are_discarded() {
        let mut doc = parse_document("<div><span>a</span><p>b</p></div>");
        let p = doc.elements_by_tag("p")[0];
        let source = parse_document("<div><p>b</p><i>c</i></div>");
        let root = doc.root();

        reconcile(&mut doc, root, &source, source.root(), &mut NoopObserver);

        assert_eq!(doc.to_html(), "<div><p>b</p><i>c</i></div>");
        assert_eq!(doc.elements_by_tag("p"), vec![p]);
    }

    #[test]
    fn unclaimed_keyed_node_is_discarded() {
        let (doc, _, recorder) = morph(r#"<div id="gone"></div><p>x</p>"#, "<p>x</p>");
        assert!(doc.get_element_by_id("gone").is_none());
        assert_eq!(recorder.discarded, vec![r#"<div id="gone"></div>"#]);
    }

    #[test]
    fn identical_subtrees_are_skipped() {
        let (_, summary, recorder) = morph("<div><p>same</p></div>", "<div><p>same</p></div>");
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.updated, 0);
        assert!(recorder.added.is_empty());
    }

    #[test]
    fn server_checked_state_overrides_user_toggle() {
        let mut doc = parse_document(r#"<form><input id="c" type="checkbox" checked></form>"#);
        let checkbox = doc.get_element_by_id("c").unwrap();
        doc.element_mut(checkbox).unwrap().live.checked = false;

        let source = parse_document(r#"<form><input id="c" type="checkbox" checked></form>"#);
        let root = doc.root();
        let summary = reconcile(&mut doc, root, &source, source.root(), &mut NoopObserver);

        assert!(doc.element(checkbox).unwrap().live.checked);
        assert_eq!(summary.skipped, 0);
    }

    #[test]
    fn textarea_and_input_values_follow_markup() {
        let mut doc = parse_document(r#"<input id="i" value="a"><textarea id="t">one</textarea>"#);
        let input = doc.get_element_by_id("i").unwrap();
        let textarea = doc.get_element_by_id("t").unwrap();
        doc.element_mut(input).unwrap().live.value = "typed".into();

        let source = parse_document(r#"<input id="i" value="b"><textarea id="t">two</textarea>"#);
        let root = doc.root();
        reconcile(&mut doc, root, &source, source.root(), &mut NoopObserver);

        assert_eq!(doc.element(input).unwrap().live.value, "b");
        assert_eq!(doc.element(textarea).unwrap().live.value, "two");
    }

    #[test]
    fn select_uses_first_selected_option() {
        let mut doc = parse_document("<select id=s><option>a<option selected>b</select>");
        let source = parse_document("<select id=s><option selected>a<option selected>b</select>");
        let root = doc.root();
        reconcile(&mut doc, root, &source, source.root(), &mut NoopObserver);

        let options = doc.elements_by_tag("option");
        let selected: Vec<bool> = options.iter().map(|&o| doc.element(o).unwrap().live.selected).collect();
        assert_eq!(selected, vec![true, false]);
    }

    #[test]
    fn incompatible_target_is_replaced() {
        let mut doc = parse_document(r#"<main><div id="t">x</div></main>"#);
        let target = doc.get_element_by_id("t").unwrap();
        let source = parse_document(r#"<section id="t">y</section>"#);
        let fragment = source.first_child(source.root()).unwrap();

        let summary = reconcile(&mut doc, target, &source, fragment, &mut NoopObserver);

        let replacement = summary.root.unwrap();
        assert_ne!(replacement, target);
        assert_eq!(doc.to_html(), r#"<main><section id="t">y</section></main>"#);
    }
}
