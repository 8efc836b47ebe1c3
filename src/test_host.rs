// In-memory page for unit tests: a small element tree, a manual clock and a
// record of every load, binding and timer the controller asked for.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use crate::host::Host;
use crate::resource::{Requested, ResourceLoader};
use crate::types::{Locator, RegionId, TimerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct NodeId(usize);

#[derive(Debug, Default)]
struct Element {
    tag: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: HashMap<String, String>,
    classes: BTreeSet<String>,
    detached: bool,
}

#[derive(Debug)]
pub(crate) struct MemoryHost {
    elements: Vec<Element>,
    pub scripts_requested: Vec<Locator>,
    pub styles_requested: Vec<Locator>,
    /// Scripts the loader refuses synchronously.
    pub blocked: BTreeSet<Locator>,
    pub bindings: Vec<(NodeId, RegionId)>,
    pub unbindings: Vec<(NodeId, RegionId)>,
    timers: BTreeMap<TimerId, u64>,
    next_timer: u64,
    now_ms: u64,
}

impl MemoryHost {
    pub fn new() -> Self {
        MemoryHost {
            elements: vec![Element {
                tag: "body".to_string(),
                ..Default::default()
            }],
            scripts_requested: Vec::new(),
            styles_requested: Vec::new(),
            blocked: BTreeSet::new(),
            bindings: Vec::new(),
            unbindings: Vec::new(),
            timers: BTreeMap::new(),
            next_timer: 0,
            now_ms: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let id = NodeId(self.elements.len());
        self.elements.push(Element {
            tag: tag.to_string(),
            parent: Some(parent),
            ..Default::default()
        });
        self.elements[parent.0].children.push(id);
        id
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        self.elements[node.0]
            .attributes
            .insert(name.to_string(), value.to_string());
    }

    /// A gallery card with its preview container.
    pub fn card(&mut self, parent: NodeId, effect: &str) -> (NodeId, NodeId) {
        let card = self.element(parent, "article");
        self.set_attribute(card, "data-effect", effect);
        let preview = self.element(card, "div");
        self.elements[preview.0].classes.insert("card-preview".to_string());
        (card, preview)
    }

    /// Child element carrying `class`.
    pub fn child_with_class(&mut self, parent: NodeId, class: &str) -> NodeId {
        let node = self.element(parent, "div");
        self.elements[node.0].classes.insert(class.to_string());
        node
    }

    /// Detach `node` and its subtree, as a re-render would.
    pub fn remove(&mut self, node: NodeId) {
        if let Some(parent) = self.elements[node.0].parent.take() {
            self.elements[parent.0].children.retain(|c| *c != node);
        }
        let mut stack = vec![node];
        while let Some(next) = stack.pop() {
            self.elements[next.0].detached = true;
            stack.extend(self.elements[next.0].children.iter().copied());
        }
    }

    pub fn classes(&self, node: NodeId) -> &BTreeSet<String> {
        &self.elements[node.0].classes
    }

    pub fn armed_timers(&self) -> usize {
        self.timers.len()
    }

    /// Move the clock forward and return the timers that expired, in order.
    /// Expired timers stay registered until the controller clears them.
    pub fn advance(&mut self, by: Duration) -> Vec<TimerId> {
        let from = self.now_ms;
        self.now_ms += by.as_millis() as u64;
        let mut due: Vec<(u64, TimerId)> = self
            .timers
            .iter()
            .filter(|(_, deadline)| **deadline > from && **deadline <= self.now_ms)
            .map(|(id, deadline)| (*deadline, *id))
            .collect();
        due.sort();
        due.into_iter().map(|(_, id)| id).collect()
    }

    fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.elements[node.0].children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.elements[next.0].children.iter().rev().copied());
        }
        out
    }

    fn matches(&self, node: NodeId, selector: &str) -> bool {
        let element = &self.elements[node.0];
        if let Some(class) = selector.strip_prefix('.') {
            element.classes.contains(class)
        } else if let Some(id) = selector.strip_prefix('#') {
            element.attributes.get("id").map(String::as_str) == Some(id)
        } else {
            element.tag == selector
        }
    }
}

impl ResourceLoader for MemoryHost {
    fn load_script(&mut self, locator: &Locator) -> Result<Requested, String> {
        self.scripts_requested.push(locator.clone());
        if self.blocked.contains(locator) {
            return Err("blocked by test".to_string());
        }
        Ok(Requested::Pending)
    }

    fn load_style(&mut self, locator: &Locator) -> Result<(), String> {
        self.styles_requested.push(locator.clone());
        Ok(())
    }
}

impl Host for MemoryHost {
    type Node = NodeId;

    fn find_all(&self, root: &NodeId, attribute: &str) -> Vec<NodeId> {
        self.descendants(*root)
            .into_iter()
            .filter(|n| self.elements[n.0].attributes.contains_key(attribute))
            .collect()
    }

    fn attribute(&self, node: &NodeId, name: &str) -> Option<String> {
        self.elements[node.0].attributes.get(name).cloned()
    }

    fn query(&self, node: &NodeId, selector: &str) -> Option<NodeId> {
        self.descendants(*node)
            .into_iter()
            .find(|n| self.matches(*n, selector))
    }

    fn contains(&self, ancestor: &NodeId, node: &NodeId) -> bool {
        let mut current = Some(*node);
        while let Some(next) = current {
            if next == *ancestor {
                return true;
            }
            current = self.elements[next.0].parent;
        }
        false
    }

    fn is_connected(&self, node: &NodeId) -> bool {
        !self.elements[node.0].detached
    }

    fn add_class(&mut self, node: &NodeId, class: &str) {
        self.elements[node.0].classes.insert(class.to_string());
    }

    fn remove_class(&mut self, node: &NodeId, class: &str) {
        self.elements[node.0].classes.remove(class);
    }

    fn has_class(&self, node: &NodeId, class: &str) -> bool {
        self.elements[node.0].classes.contains(class)
    }

    fn bind(&mut self, card: &NodeId, region: RegionId) {
        self.bindings.push((*card, region));
    }

    fn unbind(&mut self, card: &NodeId, region: RegionId) {
        self.unbindings.push((*card, region));
    }

    fn set_timer(&mut self, delay: Duration) -> TimerId {
        let id = TimerId::new(self.next_timer);
        self.next_timer += 1;
        self.timers.insert(id, self.now_ms + delay.as_millis() as u64);
        id
    }

    fn clear_timer(&mut self, timer: TimerId) {
        self.timers.remove(&timer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_matches_class_id_and_tag() {
        let mut host = MemoryHost::new();
        let root = host.root();
        let (card, preview) = host.card(root, "webgl-rotating-triangle");
        let canvas = host.element(preview, "canvas");
        host.set_attribute(canvas, "id", "glcanvas");

        assert_eq!(host.query(&card, ".card-preview"), Some(preview));
        assert_eq!(host.query(&card, "#glcanvas"), Some(canvas));
        assert_eq!(host.query(&card, "canvas"), Some(canvas));
        assert_eq!(host.query(&card, ".missing"), None);
    }

    #[test]
    fn removal_disconnects_subtree() {
        let mut host = MemoryHost::new();
        let root = host.root();
        let (card, preview) = host.card(root, "parallax-cards");
        host.remove(card);
        assert!(!host.is_connected(&card));
        assert!(!host.is_connected(&preview));
        assert!(host.find_all(&root, "data-effect").is_empty());
    }

    #[test]
    fn timers_fire_in_deadline_order() {
        let mut host = MemoryHost::new();
        let late = host.set_timer(Duration::from_millis(500));
        let early = host.set_timer(Duration::from_millis(100));
        assert!(host.advance(Duration::from_millis(50)).is_empty());
        assert_eq!(host.advance(Duration::from_millis(500)), vec![early, late]);
    }
}
