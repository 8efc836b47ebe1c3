// Strong typing over strings. Newtypes for effect ids, locators, regions and timers.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Stable key of one registered effect (the value of the card's effect attribute).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectId(String);

impl EffectId {
    pub fn new(id: impl Into<String>) -> Self {
        EffectId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EffectId {
    fn from(id: &str) -> Self {
        EffectId::new(id)
    }
}

/// Path of a script or stylesheet. Opaque to the controller.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    pub fn new(path: impl Into<String>) -> Self {
        Locator(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Locator {
    fn from(path: &str) -> Self {
        Locator::new(path)
    }
}

/// Controller-assigned identity of one bound activation region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionId(u32);

impl RegionId {
    pub fn new(raw: u32) -> Self {
        RegionId(raw)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}

/// Host-assigned identity of one armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimerId(u64);

impl TimerId {
    pub fn new(raw: u64) -> Self {
        TimerId(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// A page resource an effect needs before it can start.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    Script(Locator),
    /// Requested once, never awaited.
    Style(Locator),
}

impl Resource {
    pub fn locator(&self) -> &Locator {
        match self {
            Resource::Script(locator) | Resource::Style(locator) => locator,
        }
    }
}

/// Inbound pointer/focus event for one region.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger<N> {
    PointerEnter,
    PointerLeave,
    FocusIn,
    /// `related` is the element receiving focus, if any.
    FocusOut { related: Option<N> },
}

impl<N> Trigger<N> {
    pub fn is_entry(&self) -> bool {
        matches!(self, Trigger::PointerEnter | Trigger::FocusIn)
    }
}

/// Lifecycle state of a region, as seen from outside the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionState {
    /// No handle, nothing in flight.
    Idle,
    /// Resources requested, start not yet attempted.
    Loading,
    /// Started. May or may not hold a runtime handle.
    Active,
    /// Exit seen, teardown timer armed.
    PendingStop,
}

/// Element whose class marks an effect as visibly "open".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenMarker {
    pub selector: String,
    pub class: String,
}

/// How an effect is torn down after the pointer or focus leaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TeardownPolicy {
    #[default]
    Immediate,
    /// Stop after `delay_ms`. With a marker, only while the marker is open.
    Deferred {
        delay_ms: u64,
        #[serde(default)]
        while_open: Option<OpenMarker>,
    },
}

impl TeardownPolicy {
    pub fn deferred(delay: Duration) -> Self {
        TeardownPolicy::Deferred {
            delay_ms: delay.as_millis() as u64,
            while_open: None,
        }
    }

    pub fn deferred_while_open(
        delay: Duration,
        selector: impl Into<String>,
        class: impl Into<String>,
    ) -> Self {
        TeardownPolicy::Deferred {
            delay_ms: delay.as_millis() as u64,
            while_open: Some(OpenMarker {
                selector: selector.into(),
                class: class.into(),
            }),
        }
    }
}

/// Markup conventions shared with the gallery renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSettings {
    /// Attribute carrying the effect id on each card.
    #[serde(default = "default_effect_attribute")]
    pub effect_attribute: String,
    /// Selector of the preview container nested in each card.
    #[serde(default = "default_preview_selector")]
    pub preview_selector: String,
    /// Class toggled on the preview while the region is entered.
    #[serde(default = "default_active_class")]
    pub active_class: String,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        ControllerSettings {
            effect_attribute: default_effect_attribute(),
            preview_selector: default_preview_selector(),
            active_class: default_active_class(),
        }
    }
}

fn default_effect_attribute() -> String {
    "data-effect".to_string()
}

fn default_preview_selector() -> String {
    ".card-preview".to_string()
}

fn default_active_class() -> String {
    "active-preview".to_string()
}
