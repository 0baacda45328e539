//! In-memory document model rendered by the application under test.
//!
//! Nodes live in an arena indexed by [`NodeId`]. Detached nodes stay in the
//! arena so that a handle pointing at them can be detected as stale instead of
//! silently aliasing a different element.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Index of an element inside a [`Document`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    /// Arena index
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// A rendered element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl Element {
    /// Lower-case tag name
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Attribute value, if present
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// All attributes in name order
    #[must_use]
    pub const fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Whitespace-separated entries of the `class` attribute
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attribute("class").unwrap_or("").split_whitespace()
    }

    /// Check for a class
    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    /// Text owned directly by this element (not its children)
    #[must_use]
    pub fn own_text(&self) -> &str {
        &self.text
    }

    /// Child element ids in document order
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Parent element id
    #[must_use]
    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    fn hides_itself(&self) -> bool {
        if self.attributes.contains_key("hidden") {
            return true;
        }
        self.attribute("style").is_some_and(|style| {
            let compact: String = style.chars().filter(|c| !c.is_whitespace()).collect();
            compact.contains("display:none") || compact.contains("visibility:hidden")
        })
    }
}

/// Builder for element subtrees
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct El {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    children: Vec<El>,
}

impl El {
    /// Start an element with the given tag
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    /// Set an attribute
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Append a class
    #[must_use]
    pub fn class(mut self, class: &str) -> Self {
        let entry = self.attributes.entry("class".to_string()).or_default();
        if !entry.is_empty() {
            entry.push(' ');
        }
        entry.push_str(class);
        self
    }

    /// Set the `id` attribute
    #[must_use]
    pub fn id(self, id: impl Into<String>) -> Self {
        self.attr("id", id)
    }

    /// Set the element's own text
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Mark the element hidden
    #[must_use]
    pub fn hidden(self) -> Self {
        self.attr("hidden", "")
    }

    /// Append a child
    #[must_use]
    pub fn child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    /// Append several children
    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = Self>) -> Self {
        self.children.extend(children);
        self
    }
}

/// A rendered document generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    nodes: Vec<Element>,
    root: NodeId,
    generation: u64,
}

impl Document {
    /// Build a document from a root element tree
    #[must_use]
    pub fn new(root: El) -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            generation: 0,
        };
        doc.root = doc.insert(root, None);
        doc
    }

    /// Generation stamp assigned by the session
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    /// Root element
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Look up an element in the arena (attached or not)
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Element> {
        self.nodes.get(id.0)
    }

    /// Whether the node is still reachable from the root
    #[must_use]
    pub fn is_attached(&self, id: NodeId) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        let mut current = id;
        loop {
            if current == self.root {
                return true;
            }
            match self.get(current).and_then(Element::parent) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Ancestors from the parent upwards
    #[must_use]
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.get(id).and_then(Element::parent);
        while let Some(parent) = current {
            out.push(parent);
            current = self.get(parent).and_then(Element::parent);
        }
        out
    }

    /// Descendants of `id` in document order, excluding `id` itself
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self
            .get(id)
            .map(|e| e.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Some(el) = self.get(next) {
                stack.extend(el.children.iter().rev().copied());
            }
        }
        out
    }

    /// Every attached element in document order, root first
    #[must_use]
    pub fn walk(&self) -> Vec<NodeId> {
        let mut out = vec![self.root];
        out.extend(self.descendants(self.root));
        out
    }

    /// Concatenated text of the element and its descendants
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        let mut text = String::new();
        if let Some(el) = self.get(id) {
            text.push_str(&el.text);
        }
        for node in self.descendants(id) {
            if let Some(el) = self.get(node) {
                text.push_str(&el.text);
            }
        }
        text
    }

    /// Rendered and not hidden by itself or an ancestor
    #[must_use]
    pub fn is_visible(&self, id: NodeId) -> bool {
        if !self.is_attached(id) {
            return false;
        }
        std::iter::once(id)
            .chain(self.ancestors(id))
            .filter_map(|n| self.get(n))
            .all(|el| !el.hides_itself())
    }

    /// Nearest element (self first) satisfying `pred`
    pub fn closest(&self, id: NodeId, pred: impl Fn(&Element) -> bool) -> Option<NodeId> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|n| self.get(*n).is_some_and(&pred))
    }

    /// First descendant (document order) satisfying `pred`
    pub fn find_descendant(&self, id: NodeId, pred: impl Fn(&Element) -> bool) -> Option<NodeId> {
        self.descendants(id)
            .into_iter()
            .find(|n| self.get(*n).is_some_and(&pred))
    }

    /// Append a subtree under `parent`
    pub fn append(&mut self, parent: NodeId, child: El) -> Option<NodeId> {
        self.get(parent)?;
        let id = self.insert(child, Some(parent));
        self.nodes[parent.0].children.push(id);
        Some(id)
    }

    /// Move an attached node to the end of `new_parent`'s children
    pub fn move_node(&mut self, node: NodeId, new_parent: NodeId) -> bool {
        if self.get(node).is_none() || self.get(new_parent).is_none() || node == self.root {
            return false;
        }
        // A node cannot become its own descendant.
        if new_parent == node || self.ancestors(new_parent).contains(&node) {
            return false;
        }
        self.detach(node);
        self.nodes[node.0].parent = Some(new_parent);
        self.nodes[new_parent.0].children.push(node);
        true
    }

    /// Remove a node from its parent; the subtree becomes unreachable
    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.get(node).and_then(Element::parent) {
            self.nodes[parent.0].children.retain(|c| *c != node);
            self.nodes[node.0].parent = None;
        }
    }

    /// Replace every child of `parent` with freshly built subtrees
    pub fn replace_children(&mut self, parent: NodeId, children: Vec<El>) {
        if self.get(parent).is_none() {
            return;
        }
        let old = std::mem::take(&mut self.nodes[parent.0].children);
        for child in old {
            self.nodes[child.0].parent = None;
        }
        for child in children {
            let id = self.insert(child, Some(parent));
            self.nodes[parent.0].children.push(id);
        }
    }

    /// Set an attribute on an element
    pub fn set_attribute(&mut self, node: NodeId, name: impl Into<String>, value: impl Into<String>) {
        if let Some(el) = self.nodes.get_mut(node.0) {
            el.attributes.insert(name.into(), value.into());
        }
    }

    /// Set the element's own text
    pub fn set_text(&mut self, node: NodeId, text: impl Into<String>) {
        if let Some(el) = self.nodes.get_mut(node.0) {
            el.text = text.into();
        }
    }

    fn insert(&mut self, el: El, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Element {
            tag: el.tag,
            attributes: el.attributes,
            text: el.text,
            children: Vec::new(),
            parent,
        });
        let children: Vec<NodeId> = el
            .children
            .into_iter()
            .map(|child| self.insert(child, Some(id)))
            .collect();
        self.nodes[id.0].children = children;
        id
    }
}
