// The page as the controller sees it. The browser implementation lives in `web`;
// everything else in the crate only talks to this trait.

use std::fmt::Debug;
use std::time::Duration;

use crate::resource::ResourceLoader;
use crate::types::{RegionId, TimerId};

/// DOM-like environment hosting the gallery.
///
/// Inbound events (pointer/focus triggers, resource completions, timer
/// expiry) are delivered by the host back into the controller; the host never
/// calls the controller synchronously from inside one of these methods.
pub trait Host: ResourceLoader + 'static {
    type Node: Clone + PartialEq + Debug + 'static;

    /// Every element under `root` carrying `attribute`, in document order.
    fn find_all(&self, root: &Self::Node, attribute: &str) -> Vec<Self::Node>;

    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;

    /// First descendant of `node` matching `selector`.
    fn query(&self, node: &Self::Node, selector: &str) -> Option<Self::Node>;

    /// True when `node` is `ancestor` or one of its descendants.
    fn contains(&self, ancestor: &Self::Node, node: &Self::Node) -> bool;

    fn is_connected(&self, node: &Self::Node) -> bool;

    fn add_class(&mut self, node: &Self::Node, class: &str);

    fn remove_class(&mut self, node: &Self::Node, class: &str);

    fn has_class(&self, node: &Self::Node, class: &str) -> bool;

    /// Start forwarding enter/leave events on `card` as triggers for `region`.
    fn bind(&mut self, card: &Self::Node, region: RegionId);

    fn unbind(&mut self, card: &Self::Node, region: RegionId);

    fn set_timer(&mut self, delay: Duration) -> TimerId;

    /// Cancel a timer. Also called after a timer fired so the host can release it.
    fn clear_timer(&mut self, timer: TimerId);
}
