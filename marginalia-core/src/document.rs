//! Arena-backed document tree the comment overlay anchors into.
//!
//! The host renders a page into a [`Document`]; the core only reads text
//! content and inserts or removes marker wrappers. Node handles are plain
//! indices into the arena, so they stay valid for the lifetime of the
//! document even after a node is detached. Detached nodes are never reused.

use std::cmp::Ordering;
use std::collections::HashMap;

/// Handle to a node inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Arena index of this node.
    pub fn index(self) -> usize {
        self.0
    }
}

/// An element's tag name and attributes, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
}

impl Element {
    /// Creates an element with no attributes. The tag is lowercased.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attrs: Vec::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Sets `name` to `value`, replacing an existing value in place.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name, value)),
        }
    }

    /// Returns `true` if the whitespace-separated `class` attribute contains `class`.
    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|v| v.split_whitespace().any(|c| c == class))
    }

    /// Adds or removes `class` from the `class` attribute.
    pub fn toggle_class(&mut self, class: &str, on: bool) {
        let mut classes: Vec<String> = self
            .attr("class")
            .map(|v| v.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_default();
        let present = classes.iter().any(|c| c == class);
        if on && !present {
            classes.push(class.to_owned());
        } else if !on && present {
            classes.retain(|c| c != class);
        } else {
            return;
        }
        self.set_attr("class", classes.join(" "));
    }
}

/// Payload of a node: an element or a run of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

/// Rejected tree mutation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    #[error("node {0:?} is not a text node")]
    NotText(NodeId),
    #[error("node {0:?} is not an element")]
    NotElement(NodeId),
    #[error("range {start}..{end} cannot be surrounded in a {len}-byte text node")]
    BadRange { start: usize, end: usize, len: usize },
    #[error("node {0:?} has no parent")]
    Detached(NodeId),
}

/// A selection boundary point, DOM-style.
///
/// For text nodes `offset` is a byte offset into the text; for elements it is
/// a child index (`children.len()` means "after the last child").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub node: NodeId,
    pub offset: usize,
}

impl Boundary {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// The document tree. Always has a root element.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Creates an empty document whose root is a `body` element.
    pub fn new() -> Self {
        Self::with_root(Element::new("body"))
    }

    pub fn with_root(root: Element) -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                data: NodeData::Element(root),
            }],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes ever allocated, attached or not.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0].data
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].data {
            NodeData::Text(t) => Some(t),
            NodeData::Element(_) => None,
        }
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].data {
            NodeData::Element(e) => Some(e),
            NodeData::Text(_) => None,
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.tag.as_str())
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.attr(name))
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id).is_some_and(|e| e.has_class(class))
    }

    /// Concatenated text of every text node under `id`, in document order.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for n in self.descendants(id) {
            if let Some(t) = self.text(n) {
                out.push_str(t);
            }
        }
        out
    }

    /// Pre-order traversal of `id` and everything below it.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            doc: self,
            stack: vec![id],
        }
    }

    /// All text nodes under `id`, in document order.
    pub fn text_nodes(&self, id: NodeId) -> Vec<NodeId> {
        self.descendants(id)
            .filter(|n| self.text(*n).is_some())
            .collect()
    }

    /// Parents of `id`, nearest first. Does not include `id` itself.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |n| self.parent(*n))
    }

    /// Nearest element, starting at `id` itself, for which `pred` holds.
    pub fn closest<F>(&self, id: NodeId, pred: F) -> Option<NodeId>
    where
        F: Fn(&Element) -> bool,
    {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|n| self.element(*n).is_some_and(&pred))
    }

    /// `true` if `id` is the root or reachable from it through parent links.
    pub fn is_attached(&self, id: NodeId) -> bool {
        id == self.root || self.ancestors(id).any(|n| n == self.root)
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    pub fn create_element(&mut self, element: Element) -> NodeId {
        self.alloc(NodeData::Element(element))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeData::Text(text.into()))
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            data,
        });
        id
    }

    /// Moves `child` to the end of `parent`'s children.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        if self.element(parent).is_none() {
            return Err(DomError::NotElement(parent));
        }
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        Ok(())
    }

    /// Moves `child` into `parent` immediately before `reference`.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: NodeId,
    ) -> Result<(), DomError> {
        if self.element(parent).is_none() {
            return Err(DomError::NotElement(parent));
        }
        self.detach(child);
        let idx = self
            .child_index(parent, reference)
            .ok_or(DomError::Detached(reference))?;
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(idx, child);
        Ok(())
    }

    /// Removes `id` from its parent. The node and its subtree stay in the arena.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
    }

    fn child_index(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.nodes[parent.0].children.iter().position(|c| *c == child)
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        match &mut self.nodes[id.0].data {
            NodeData::Element(e) => {
                e.set_attr(name, value);
                Ok(())
            }
            NodeData::Text(_) => Err(DomError::NotElement(id)),
        }
    }

    pub fn toggle_class(&mut self, id: NodeId, class: &str, on: bool) -> Result<(), DomError> {
        match &mut self.nodes[id.0].data {
            NodeData::Element(e) => {
                e.toggle_class(class, on);
                Ok(())
            }
            NodeData::Text(_) => Err(DomError::NotElement(id)),
        }
    }

    /// Appends `text` to the end of text node `id`.
    pub fn push_str(&mut self, id: NodeId, text: &str) -> Result<(), DomError> {
        match &mut self.nodes[id.0].data {
            NodeData::Text(t) => {
                t.push_str(text);
                Ok(())
            }
            NodeData::Element(_) => Err(DomError::NotText(id)),
        }
    }

    /// Splits text node `id` at byte `offset`; the tail becomes a new sibling
    /// inserted right after `id`, which is returned.
    pub fn split_text(&mut self, id: NodeId, offset: usize) -> Result<NodeId, DomError> {
        let text = self.text(id).ok_or(DomError::NotText(id))?;
        if offset > text.len() || !text.is_char_boundary(offset) {
            return Err(DomError::BadRange {
                start: offset,
                end: offset,
                len: text.len(),
            });
        }
        let parent = self.parent(id).ok_or(DomError::Detached(id))?;
        let tail = text[offset..].to_owned();
        if let NodeData::Text(t) = &mut self.nodes[id.0].data {
            t.truncate(offset);
        }
        let new = self.create_text(tail);
        let idx = self.child_index(parent, id).ok_or(DomError::Detached(id))?;
        self.nodes[new.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(idx + 1, new);
        Ok(new)
    }

    /// Surrounds bytes `start..end` of text node `id` with a new `wrapper`
    /// element and returns the wrapper.
    ///
    /// Text outside the range is split off into sibling text nodes; the
    /// concatenated text of the parent is unchanged.
    pub fn wrap_text_range(
        &mut self,
        id: NodeId,
        start: usize,
        end: usize,
        wrapper: Element,
    ) -> Result<NodeId, DomError> {
        let text = self.text(id).ok_or(DomError::NotText(id))?;
        let len = text.len();
        if start >= end
            || end > len
            || !text.is_char_boundary(start)
            || !text.is_char_boundary(end)
        {
            return Err(DomError::BadRange { start, end, len });
        }
        let parent = self.parent(id).ok_or(DomError::Detached(id))?;

        if end < len {
            self.split_text(id, end)?;
        }
        let middle = if start > 0 {
            self.split_text(id, start)?
        } else {
            id
        };

        let wrapper = self.create_element(wrapper);
        self.insert_before(parent, wrapper, middle)?;
        self.append_child(wrapper, middle)?;
        Ok(wrapper)
    }

    /// Surrounds node `id` (typically an image) with a new `wrapper` element.
    pub fn wrap_node(&mut self, id: NodeId, wrapper: Element) -> Result<NodeId, DomError> {
        let parent = self.parent(id).ok_or(DomError::Detached(id))?;
        let wrapper = self.create_element(wrapper);
        self.insert_before(parent, wrapper, id)?;
        self.append_child(wrapper, id)?;
        Ok(wrapper)
    }

    /// Replaces element `id` with its children, then merges adjacent text
    /// nodes in the parent so the earlier text runs are restored.
    pub fn unwrap(&mut self, id: NodeId) -> Result<(), DomError> {
        if self.element(id).is_none() {
            return Err(DomError::NotElement(id));
        }
        let parent = self.parent(id).ok_or(DomError::Detached(id))?;
        let idx = self.child_index(parent, id).ok_or(DomError::Detached(id))?;

        let children = std::mem::take(&mut self.nodes[id.0].children);
        for child in &children {
            self.nodes[child.0].parent = Some(parent);
        }
        let siblings = &mut self.nodes[parent.0].children;
        siblings.splice(idx..=idx, children);
        self.nodes[id.0].parent = None;

        self.normalize(parent);
        Ok(())
    }

    /// Merges adjacent text children of `id` and drops empty ones.
    pub fn normalize(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.nodes[id.0].children);
        let mut kept: Vec<NodeId> = Vec::with_capacity(children.len());
        for child in children {
            let Some(text) = self.text(child).map(str::to_owned) else {
                kept.push(child);
                continue;
            };
            let prev_text = kept.last().copied().filter(|p| self.text(*p).is_some());
            match prev_text {
                Some(prev) => {
                    if let NodeData::Text(t) = &mut self.nodes[prev.0].data {
                        t.push_str(&text);
                    }
                    self.nodes[child.0].parent = None;
                }
                None if text.is_empty() => {
                    self.nodes[child.0].parent = None;
                }
                None => kept.push(child),
            }
        }
        self.nodes[id.0].children = kept;
    }

    // -----------------------------------------------------------------------
    // Ranges
    // -----------------------------------------------------------------------

    /// Pre-order index of every node attached under the root.
    fn order(&self) -> HashMap<NodeId, usize> {
        self.descendants(self.root)
            .enumerate()
            .map(|(i, n)| (n, i))
            .collect()
    }

    /// Maps a boundary to a totally ordered `(pre-order index, byte offset)` point.
    fn point(&self, order: &HashMap<NodeId, usize>, b: Boundary) -> Option<(usize, usize)> {
        let idx = *order.get(&b.node)?;
        if self.text(b.node).is_some() {
            return Some((idx, b.offset));
        }
        let children = self.children(b.node);
        match children.get(b.offset) {
            Some(child) => order.get(child).map(|i| (*i, 0)),
            None => Some((idx + self.descendants(b.node).count(), 0)),
        }
    }

    /// Resolves a boundary pair to ordered points, or `None` if collapsed,
    /// reversed, or not attached.
    fn range_points(
        &self,
        start: Boundary,
        end: Boundary,
    ) -> Option<(Vec<NodeId>, (usize, usize), (usize, usize))> {
        let order = self.order();
        let s = self.point(&order, start)?;
        let e = self.point(&order, end)?;
        if s >= e {
            return None;
        }
        let nodes: Vec<NodeId> = self.descendants(self.root).collect();
        Some((nodes, s, e))
    }

    /// Document order of two boundaries, `None` if either is not attached.
    pub fn compare_boundaries(&self, a: Boundary, b: Boundary) -> Option<Ordering> {
        let order = self.order();
        let a = self.point(&order, a)?;
        let b = self.point(&order, b)?;
        Some(a.cmp(&b))
    }

    /// Text covered by the range `start..end`, concatenated across nodes.
    pub fn range_text(&self, start: Boundary, end: Boundary) -> String {
        let Some((nodes, (si, so), (ei, eo))) = self.range_points(start, end) else {
            return String::new();
        };
        let mut out = String::new();
        for (i, n) in nodes.iter().enumerate().take(ei + 1).skip(si) {
            let Some(text) = self.text(*n) else { continue };
            let from = if i == si { so.min(text.len()) } else { 0 };
            let to = if i == ei { eo.min(text.len()) } else { text.len() };
            if from < to {
                if let Some(slice) = text.get(from..to) {
                    out.push_str(slice);
                }
            }
        }
        out
    }

    /// Elements with tag `tag` that start inside the range `start..end`.
    pub fn elements_in_range(&self, start: Boundary, end: Boundary, tag: &str) -> Vec<NodeId> {
        let Some((nodes, (si, so), (ei, _))) = self.range_points(start, end) else {
            return Vec::new();
        };
        nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| (*i > si || (*i == si && so == 0)) && *i < ei)
            .map(|(_, n)| *n)
            .filter(|n| self.tag(*n) == Some(tag))
            .collect()
    }
}

/// Pre-order iterator returned by [`Document::descendants`].
pub struct Descendants<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.doc.children(id).iter().rev().copied());
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `<body><p>say hello world today</p></body>`
    fn paragraph() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new();
        let p = doc.create_element(Element::new("p"));
        let t = doc.create_text("say hello world today");
        doc.append_child(doc.root(), p).unwrap();
        doc.append_child(p, t).unwrap();
        (doc, p, t)
    }

    #[test]
    fn wrap_then_unwrap_restores_text() {
        let (mut doc, p, t) = paragraph();
        let mark = doc
            .wrap_text_range(t, 4, 15, Element::new("mark"))
            .unwrap();

        assert_eq!(doc.children(p).len(), 3);
        assert_eq!(doc.text_content(mark), "hello world");
        assert_eq!(doc.text_content(p), "say hello world today");

        doc.unwrap(mark).unwrap();
        assert_eq!(doc.children(p), &[t]);
        assert_eq!(doc.text(t), Some("say hello world today"));
        assert!(!doc.is_attached(mark));
    }

    #[test]
    fn wrap_whole_node_allocates_only_the_wrapper() {
        let (mut doc, p, t) = paragraph();
        let before = doc.node_count();
        let mark = doc.wrap_text_range(t, 0, 21, Element::new("mark")).unwrap();
        assert_eq!(doc.node_count(), before + 1);
        assert_eq!(doc.children(p), &[mark]);
        assert_eq!(doc.children(mark), &[t]);
    }

    #[test]
    fn wrap_rejects_bad_ranges() {
        let (mut doc, p, t) = paragraph();
        assert!(matches!(
            doc.wrap_text_range(t, 5, 5, Element::new("mark")),
            Err(DomError::BadRange { .. })
        ));
        assert!(matches!(
            doc.wrap_text_range(t, 0, 99, Element::new("mark")),
            Err(DomError::BadRange { .. })
        ));
        assert!(matches!(
            doc.wrap_text_range(p, 0, 1, Element::new("mark")),
            Err(DomError::NotText(_))
        ));
    }

    #[test]
    fn wrap_rejects_split_inside_a_character() {
        let mut doc = Document::new();
        let t = doc.create_text("café au lait");
        doc.append_child(doc.root(), t).unwrap();
        // 'é' occupies bytes 3..5.
        assert!(doc.wrap_text_range(t, 4, 8, Element::new("mark")).is_err());
        assert_eq!(doc.text(t), Some("café au lait"));
    }

    #[test]
    fn closest_includes_self() {
        let (doc, p, t) = paragraph();
        assert_eq!(doc.closest(t, |e| e.tag == "p"), Some(p));
        assert_eq!(doc.closest(p, |e| e.tag == "p"), Some(p));
        assert_eq!(doc.closest(t, |e| e.tag == "section"), None);
    }

    #[test]
    fn range_text_spans_nodes() {
        let mut doc = Document::new();
        let p = doc.create_element(Element::new("p"));
        let a = doc.create_text("one two ");
        let em = doc.create_element(Element::new("em"));
        let b = doc.create_text("three");
        let c = doc.create_text(" four");
        doc.append_child(doc.root(), p).unwrap();
        doc.append_child(p, a).unwrap();
        doc.append_child(p, em).unwrap();
        doc.append_child(em, b).unwrap();
        doc.append_child(p, c).unwrap();

        assert_eq!(
            doc.range_text(Boundary::new(a, 4), Boundary::new(c, 2)),
            "two three f"
        );
        assert_eq!(doc.range_text(Boundary::new(a, 4), Boundary::new(a, 4)), "");
        assert_eq!(doc.range_text(Boundary::new(c, 1), Boundary::new(a, 0)), "");
    }

    #[test]
    fn elements_in_range_uses_child_offsets() {
        let mut doc = Document::new();
        let text = doc.create_text("before");
        let img = doc.create_element(Element::new("img").with_attr("alt", "diagram"));
        doc.append_child(doc.root(), text).unwrap();
        doc.append_child(doc.root(), img).unwrap();
        let root = doc.root();

        assert_eq!(
            doc.elements_in_range(Boundary::new(root, 1), Boundary::new(root, 2), "img"),
            vec![img]
        );
        assert!(doc
            .elements_in_range(Boundary::new(text, 0), Boundary::new(root, 1), "img")
            .is_empty());
    }

    #[test]
    fn toggle_class_is_idempotent() {
        let mut el = Element::new("mark").with_attr("class", "comment-highlight");
        el.toggle_class("active", true);
        el.toggle_class("active", true);
        assert_eq!(el.attr("class"), Some("comment-highlight active"));
        el.toggle_class("active", false);
        assert_eq!(el.attr("class"), Some("comment-highlight"));
    }
}
