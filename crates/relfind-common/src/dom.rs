//! In-memory page snapshot the engine runs against.
//!
//! A `PageSnapshot` is the relation-finding analogue of a scanner scan result:
//! an arena of `DomNode`s with parent/child links, produced by whatever driver
//! owns the live page. All structural queries the engine needs (xpaths, suffix
//! paths, ancestor walks, document-order scans) are answered here, so the rest
//! of the engine never touches a live DOM.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One element of the snapshot arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomNode {
    pub id: NodeId,
    pub tag: String,
    pub elem_id: Option<String>,
    pub class: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub styles: HashMap<String, String>,
    pub own_text: Option<String>,
    #[serde(default)]
    pub rect: Rect,
    pub frame: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    pub parent: Option<NodeId>,
    #[serde(default)]
    pub children: Vec<NodeId>,
}

/// A structural step relative to some anchor node: the tag of a child plus its
/// 1-based ordinal among same-tag siblings, i.e. one `tag[index]` xpath step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathStep {
    pub tag: String,
    pub index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    nodes: Vec<DomNode>,
}

impl PageSnapshot {
    pub fn node(&self, id: NodeId) -> Option<&DomNode> {
        self.nodes.get(id)
    }

    pub fn root(&self) -> Option<NodeId> {
        self.nodes.iter().find(|n| n.parent.is_none()).map(|n| n.id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node ids in document (preorder) order.
    pub fn document_order(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        if let Some(root) = self.root() {
            self.collect_preorder(root, &mut out);
        }
        out
    }

    fn collect_preorder(&self, id: NodeId, out: &mut Vec<NodeId>) {
        out.push(id);
        if let Some(node) = self.node(id) {
            for &child in &node.children {
                self.collect_preorder(child, out);
            }
        }
    }

    /// Descendants of `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if let Some(node) = self.node(id) {
            for &child in &node.children {
                self.collect_preorder(child, &mut out);
            }
        }
        out
    }

    /// Document-order list of nodes with the given tag.
    pub fn by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.document_order()
            .into_iter()
            .filter(|&id| self.node(id).is_some_and(|n| n.tag == tag))
            .collect()
    }

    /// Ancestor chain of `id`, nearest first, excluding `id`.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.node(id).and_then(|n| n.parent);
        while let Some(p) = cur {
            out.push(p);
            cur = self.node(p).and_then(|n| n.parent);
        }
        out
    }

    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).len()
    }

    /// True when `desc` is `anc` or lies below it.
    pub fn contains(&self, anc: NodeId, desc: NodeId) -> bool {
        desc == anc || self.ancestors(desc).contains(&anc)
    }

    /// Nearest ancestor-or-self of `id` with the given tag.
    pub fn closest(&self, id: NodeId, tag: &str) -> Option<NodeId> {
        if self.node(id)?.tag == tag {
            return Some(id);
        }
        self.ancestors(id)
            .into_iter()
            .find(|&a| self.node(a).is_some_and(|n| n.tag == tag))
    }

    /// Deepest node that is an ancestor-or-self of every given node.
    /// A single node is its own common ancestor.
    pub fn common_ancestor(&self, ids: &[NodeId]) -> Option<NodeId> {
        let (&first, rest) = ids.split_first()?;
        let mut chain = vec![first];
        chain.extend(self.ancestors(first));
        chain
            .into_iter()
            .find(|&c| rest.iter().all(|&n| self.contains(c, n)))
    }

    /// 1-based ordinal of `id` among its same-tag siblings.
    fn tag_ordinal(&self, id: NodeId) -> usize {
        let node = match self.node(id) {
            Some(n) => n,
            None => return 1,
        };
        let siblings = match node.parent.and_then(|p| self.node(p)) {
            Some(parent) => &parent.children,
            None => return 1,
        };
        let mut ordinal = 0;
        for &sib in siblings {
            if self.node(sib).is_some_and(|n| n.tag == node.tag) {
                ordinal += 1;
            }
            if sib == id {
                break;
            }
        }
        ordinal.max(1)
    }

    /// Absolute xpath of a node, e.g. `/html[1]/body[1]/div[2]`.
    pub fn xpath(&self, id: NodeId) -> String {
        let mut steps = vec![id];
        steps.extend(self.ancestors(id));
        steps.reverse();
        let mut out = String::new();
        for step in steps {
            if let Some(node) = self.node(step) {
                out.push('/');
                out.push_str(&node.tag);
                out.push('[');
                out.push_str(&self.tag_ordinal(step).to_string());
                out.push(']');
            }
        }
        out
    }

    /// Resolve an absolute xpath produced by [`PageSnapshot::xpath`].
    pub fn resolve_xpath(&self, xpath: &str) -> Option<NodeId> {
        let mut steps = xpath.trim_start_matches('/').split('/');
        let root = self.root()?;
        let first = parse_step(steps.next()?)?;
        if self.node(root)?.tag != first.tag || first.index != 1 {
            return None;
        }
        let mut cur = root;
        for raw in steps {
            let step = parse_step(raw)?;
            cur = self.child_at(cur, &step)?;
        }
        Some(cur)
    }

    fn child_at(&self, parent: NodeId, step: &PathStep) -> Option<NodeId> {
        let mut ordinal = 0;
        for &child in &self.node(parent)?.children {
            if self.node(child).is_some_and(|n| n.tag == step.tag) {
                ordinal += 1;
                if ordinal == step.index {
                    return Some(child);
                }
            }
        }
        None
    }

    /// Path of steps from `anc` down to `desc`; empty when they coincide.
    /// `None` when `anc` is not an ancestor-or-self of `desc`.
    pub fn suffix_from(&self, anc: NodeId, desc: NodeId) -> Option<Vec<PathStep>> {
        if !self.contains(anc, desc) {
            return None;
        }
        let mut steps = Vec::new();
        let mut cur = desc;
        while cur != anc {
            let node = self.node(cur)?;
            steps.push(PathStep {
                tag: node.tag.clone(),
                index: self.tag_ordinal(cur),
            });
            cur = node.parent?;
        }
        steps.reverse();
        Some(steps)
    }

    /// Resolve a suffix path against a row anchor.
    pub fn resolve_suffix(&self, row: NodeId, steps: &[PathStep]) -> Option<NodeId> {
        let mut cur = row;
        self.node(cur)?;
        for step in steps {
            cur = self.child_at(cur, step)?;
        }
        Some(cur)
    }

    /// Concatenated text of a node's subtree, document order.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        let mut ids = vec![id];
        ids.extend(self.descendants(id));
        for n in ids {
            if let Some(text) = self.node(n).and_then(|node| node.own_text.as_deref()) {
                out.push_str(text);
            }
        }
        out
    }

    fn adjacent_sibling(&self, id: NodeId, offset: isize) -> Option<NodeId> {
        let parent = self.node(id)?.parent?;
        let siblings = &self.node(parent)?.children;
        let pos = siblings.iter().position(|&s| s == id)?;
        let target = pos as isize + offset;
        if target < 0 {
            return None;
        }
        siblings.get(target as usize).copied()
    }

    pub fn preceding_sibling_text(&self, id: NodeId) -> Option<String> {
        self.adjacent_sibling(id, -1).map(|s| self.text_content(s))
    }

    pub fn following_sibling_text(&self, id: NodeId) -> Option<String> {
        self.adjacent_sibling(id, 1).map(|s| self.text_content(s))
    }

    /// Siblings of `id` (same parent), excluding `id`, in document order.
    pub fn siblings(&self, id: NodeId) -> Vec<NodeId> {
        match self.node(id).and_then(|n| n.parent).and_then(|p| self.node(p)) {
            Some(parent) => parent.children.iter().copied().filter(|&s| s != id).collect(),
            None => Vec::new(),
        }
    }

    /// Replace a node's own text. Drivers use this to mirror observed
    /// mutations into a held snapshot.
    pub fn set_own_text(&mut self, id: NodeId, text: &str) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.own_text = Some(text.to_string());
        }
    }
}

fn parse_step(raw: &str) -> Option<PathStep> {
    if raw.is_empty() {
        return None;
    }
    match raw.split_once('[') {
        Some((tag, rest)) => {
            let index: usize = rest.strip_suffix(']')?.parse().ok()?;
            Some(PathStep { tag: tag.to_string(), index })
        }
        None => Some(PathStep { tag: raw.to_string(), index: 1 }),
    }
}

/// Builds snapshots node by node. Tests and drivers share it.
#[derive(Debug)]
pub struct PageBuilder {
    url: String,
    nodes: Vec<DomNode>,
}

impl PageBuilder {
    /// Starts a page with an `html` root node.
    pub fn new(url: &str) -> Self {
        let root = DomNode {
            id: 0,
            tag: "html".to_string(),
            elem_id: None,
            class: None,
            attributes: HashMap::new(),
            styles: HashMap::new(),
            own_text: None,
            rect: Rect::default(),
            frame: None,
            disabled: false,
            parent: None,
            children: Vec::new(),
        };
        Self { url: url.to_string(), nodes: vec![root] }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn child(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(DomNode {
            id,
            tag: tag.to_string(),
            elem_id: None,
            class: None,
            attributes: HashMap::new(),
            styles: HashMap::new(),
            own_text: None,
            rect: Rect::default(),
            frame: None,
            disabled: false,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }

    pub fn text_child(&mut self, parent: NodeId, tag: &str, text: &str) -> NodeId {
        let id = self.child(parent, tag);
        self.nodes[id].own_text = Some(text.to_string());
        id
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) {
        self.nodes[id].own_text = Some(text.to_string());
    }

    pub fn set_elem_id(&mut self, id: NodeId, value: &str) {
        self.nodes[id].elem_id = Some(value.to_string());
    }

    pub fn set_class(&mut self, id: NodeId, value: &str) {
        self.nodes[id].class = Some(value.to_string());
    }

    pub fn set_attr(&mut self, id: NodeId, key: &str, value: &str) {
        self.nodes[id].attributes.insert(key.to_string(), value.to_string());
    }

    pub fn set_style(&mut self, id: NodeId, prop: &str, value: &str) {
        self.nodes[id].styles.insert(prop.to_string(), value.to_string());
    }

    pub fn set_rect(&mut self, id: NodeId, rect: Rect) {
        self.nodes[id].rect = rect;
    }

    pub fn set_frame(&mut self, id: NodeId, frame: &str) {
        self.nodes[id].frame = Some(frame.to_string());
    }

    pub fn set_disabled(&mut self, id: NodeId, disabled: bool) {
        self.nodes[id].disabled = disabled;
    }

    pub fn build(self) -> PageSnapshot {
        PageSnapshot { url: self.url, nodes: self.nodes }
    }
}
