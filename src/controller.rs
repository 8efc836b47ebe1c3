// Embed controller: discovers activation regions under a root and drives each
// one through ensure -> start -> stop in response to pointer and focus triggers.
// Per-region state lives here, never on the host's nodes.

use std::collections::{BTreeMap, BTreeSet};
use std::mem;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::effect::RuntimeHandle;
use crate::host::Host;
use crate::registry::EffectRegistry;
use crate::resource::Readiness;
use crate::types::{
    ControllerSettings, EffectId, Locator, OpenMarker, RegionId, RegionState, TeardownPolicy,
    TimerId, Trigger,
};

enum Slot<H: Host> {
    Idle,
    Loading {
        waiting: BTreeSet<Locator>,
    },
    Active {
        handle: Option<RuntimeHandle<H>>,
    },
    PendingStop {
        handle: Option<RuntimeHandle<H>>,
        timer: TimerId,
    },
}

impl<H: Host> Slot<H> {
    fn state(&self) -> RegionState {
        match self {
            Slot::Idle => RegionState::Idle,
            Slot::Loading { .. } => RegionState::Loading,
            Slot::Active { .. } => RegionState::Active,
            Slot::PendingStop { .. } => RegionState::PendingStop,
        }
    }

    fn has_handle(&self) -> bool {
        matches!(
            self,
            Slot::Active { handle: Some(_) } | Slot::PendingStop { handle: Some(_), .. }
        )
    }
}

struct Region<H: Host> {
    effect: EffectId,
    card: H::Node,
    preview: H::Node,
    slot: Slot<H>,
}

pub struct EmbedController<H: Host> {
    settings: ControllerSettings,
    registry: EffectRegistry<H>,
    host: H,
    regions: BTreeMap<RegionId, Region<H>>,
    next_region: u32,
}

impl<H: Host> EmbedController<H> {
    pub fn new(settings: ControllerSettings, registry: EffectRegistry<H>, host: H) -> Self {
        EmbedController {
            settings,
            registry,
            host,
            regions: BTreeMap::new(),
            next_region: 0,
        }
    }

    /// Bind every card under `root` that is not bound yet.
    ///
    /// Safe to call after each re-render: regions whose card left the page
    /// are released first, and cards already bound are skipped. Returns the
    /// number of newly bound regions.
    pub fn attach(&mut self, root: &H::Node) -> usize {
        self.release_detached();

        let mut bound = 0;
        for card in self.host.find_all(root, &self.settings.effect_attribute) {
            if self.region_for(&card).is_some() {
                continue;
            }
            let Some(effect) = self.host.attribute(&card, &self.settings.effect_attribute) else {
                continue;
            };
            let effect = EffectId::new(effect);
            let Some(preview) = self.host.query(&card, &self.settings.preview_selector) else {
                debug!(%effect, "card has no preview container, skipping");
                continue;
            };
            if !self.registry.contains(&effect) {
                debug!(%effect, "no registered behaviour, class toggling only");
            }

            let id = RegionId::new(self.next_region);
            self.next_region += 1;
            self.host.bind(&card, id);
            self.regions.insert(
                id,
                Region {
                    effect,
                    card,
                    preview,
                    slot: Slot::Idle,
                },
            );
            bound += 1;
        }

        info!(bound, total = self.regions.len(), "embed controller attached");
        bound
    }

    /// Process one pointer/focus trigger for `region`.
    pub fn handle(&mut self, region: RegionId, trigger: Trigger<H::Node>) {
        if !self.regions.contains_key(&region) {
            debug!(%region, "trigger for unknown region");
            return;
        }
        if trigger.is_entry() {
            self.enter(region);
        } else {
            self.leave(region, &trigger);
        }
    }

    /// Completion of a script load the host was asked for.
    pub fn resource_settled(&mut self, locator: &Locator, outcome: Result<(), String>) {
        if !self.registry.settle(locator, outcome.clone()) {
            return;
        }
        if let Err(reason) = &outcome {
            warn!(%locator, %reason, "resource failed to load");
        }

        let waiting: Vec<RegionId> = self
            .regions
            .iter()
            .filter(|(_, r)| matches!(&r.slot, Slot::Loading { waiting } if waiting.contains(locator)))
            .map(|(id, _)| *id)
            .collect();

        for id in waiting {
            let Some(region) = self.regions.get_mut(&id) else {
                continue;
            };
            let ready = match &mut region.slot {
                Slot::Loading { waiting } => {
                    waiting.remove(locator);
                    waiting.is_empty()
                }
                _ => continue,
            };
            if outcome.is_err() {
                region.slot = Slot::Idle;
                warn!(effect = %region.effect, region = %id, "start skipped, resources unavailable");
                continue;
            }
            if ready {
                self.start(id);
            }
        }
    }

    /// Expiry of a deferred-teardown timer.
    pub fn timer_fired(&mut self, timer: TimerId) {
        self.host.clear_timer(timer);

        let found = self.regions.iter().find_map(|(id, r)| match r.slot {
            Slot::PendingStop { timer: armed, .. } if armed == timer => Some(*id),
            _ => None,
        });
        let Some(id) = found else {
            debug!(timer = timer.as_u64(), "ignoring stale timer");
            return;
        };
        let Some(region) = self.regions.get_mut(&id) else {
            return;
        };
        let Slot::PendingStop { handle, .. } = mem::replace(&mut region.slot, Slot::Idle) else {
            return;
        };

        if let Some(TeardownPolicy::Deferred {
            while_open: Some(marker),
            ..
        }) = self.registry.teardown(&region.effect)
        {
            if let Some(node) = self.host.query(&region.preview, &marker.selector) {
                self.host.remove_class(&node, &marker.class);
            }
        }
        self.run_stop(id, handle);
    }

    /// Stop `region` now, whatever it is doing, and clear its presentation
    /// class. An idle region may still carry the class (class-only cards,
    /// failed start or ensure), so the class goes in every case.
    pub fn stop(&mut self, region: RegionId) {
        let Some(entry) = self.regions.get_mut(&region) else {
            return;
        };
        let slot = mem::replace(&mut entry.slot, Slot::Idle);
        match slot {
            Slot::Idle | Slot::Loading { .. } => {}
            Slot::Active { handle } => self.run_stop(region, handle),
            Slot::PendingStop { handle, timer } => {
                self.host.clear_timer(timer);
                self.run_stop(region, handle);
            }
        }
        if let Some(entry) = self.regions.get(&region) {
            self.host.remove_class(&entry.preview, &self.settings.active_class);
        }
    }

    pub fn stop_all(&mut self) {
        let ids: Vec<RegionId> = self.regions.keys().copied().collect();
        for id in ids {
            self.stop(id);
        }
    }

    /// Stop every region, unbind its card and forget it.
    pub fn detach_all(&mut self) {
        self.stop_all();
        for (id, region) in mem::take(&mut self.regions) {
            self.host.unbind(&region.card, id);
        }
        info!("embed controller detached");
    }

    pub fn region_state(&self, region: RegionId) -> Option<RegionState> {
        self.regions.get(&region).map(|r| r.slot.state())
    }

    pub fn has_handle(&self, region: RegionId) -> bool {
        self.regions.get(&region).is_some_and(|r| r.slot.has_handle())
    }

    pub fn region_for(&self, card: &H::Node) -> Option<RegionId> {
        self.regions
            .iter()
            .find(|(_, r)| r.card == *card)
            .map(|(id, _)| *id)
    }

    pub fn effect_of(&self, region: RegionId) -> Option<&EffectId> {
        self.regions.get(&region).map(|r| &r.effect)
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn registry(&self) -> &EffectRegistry<H> {
        &self.registry
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    fn enter(&mut self, id: RegionId) {
        let Some(region) = self.regions.get_mut(&id) else {
            return;
        };
        self.host.add_class(&region.preview, &self.settings.active_class);

        match region.slot.state() {
            RegionState::Loading | RegionState::Active => {
                debug!(region = %id, "already entered, ignoring");
                return;
            }
            RegionState::PendingStop => {
                if let Slot::PendingStop { handle, timer } = mem::replace(&mut region.slot, Slot::Idle) {
                    self.host.clear_timer(timer);
                    region.slot = Slot::Active { handle };
                }
                debug!(region = %id, "re-entered, deferred stop cancelled");
                return;
            }
            RegionState::Idle => {}
        }

        if !self.registry.contains(&region.effect) {
            return;
        }
        match self.registry.ensure(&region.effect, &mut self.host) {
            Ok(Readiness::Ready) => self.start(id),
            Ok(Readiness::Pending(waiting)) => {
                debug!(effect = %region.effect, region = %id, pending = waiting.len(), "waiting for resources");
                region.slot = Slot::Loading { waiting };
            }
            Err(err) => {
                warn!(effect = %region.effect, region = %id, %err, "start skipped, resources unavailable");
            }
        }
    }

    fn leave(&mut self, id: RegionId, trigger: &Trigger<H::Node>) {
        let Some(region) = self.regions.get_mut(&id) else {
            return;
        };
        if let Trigger::FocusOut { related: Some(next) } = trigger {
            if self.host.contains(&region.card, next) {
                debug!(region = %id, "focus moved inside card");
                return;
            }
        }
        self.host.remove_class(&region.preview, &self.settings.active_class);

        match mem::replace(&mut region.slot, Slot::Idle) {
            Slot::Idle => {}
            Slot::Loading { .. } => {
                debug!(region = %id, "left while loading, start will be skipped");
            }
            pending @ Slot::PendingStop { .. } => region.slot = pending,
            Slot::Active { handle } => {
                let policy = self.registry.teardown(&region.effect);
                match deferral(&self.host, policy, &region.preview) {
                    Some(delay) => {
                        let timer = self.host.set_timer(delay);
                        debug!(region = %id, delay_ms = delay.as_millis() as u64, "teardown deferred");
                        region.slot = Slot::PendingStop { handle, timer };
                    }
                    None => self.run_stop(id, handle),
                }
            }
        }
    }

    fn start(&mut self, id: RegionId) {
        let Some(region) = self.regions.get_mut(&id) else {
            return;
        };
        region.slot = match self.registry.start(&region.effect, &mut self.host, &region.preview) {
            Ok(handle) => {
                debug!(effect = %region.effect, region = %id, handle = handle.is_some(), "effect started");
                Slot::Active { handle }
            }
            Err(err) => {
                error!(effect = %region.effect, region = %id, %err, "effect failed to start");
                Slot::Idle
            }
        };
    }

    /// Caller has already moved the region to `Idle`.
    fn run_stop(&mut self, id: RegionId, handle: Option<RuntimeHandle<H>>) {
        let Some(region) = self.regions.get(&id) else {
            return;
        };
        match self
            .registry
            .stop(&region.effect, &mut self.host, &region.preview, handle)
        {
            Ok(()) => debug!(effect = %region.effect, region = %id, "effect stopped"),
            Err(err) => error!(effect = %region.effect, region = %id, %err, "effect failed to stop"),
        }
    }

    fn release_detached(&mut self) {
        let detached: Vec<RegionId> = self
            .regions
            .iter()
            .filter(|(_, r)| !self.host.is_connected(&r.card))
            .map(|(id, _)| *id)
            .collect();

        for id in detached {
            self.stop(id);
            if let Some(region) = self.regions.remove(&id) {
                self.host.unbind(&region.card, id);
                debug!(effect = %region.effect, region = %id, "released detached region");
            }
        }
    }
}

fn deferral<H: Host>(host: &H, policy: Option<&TeardownPolicy>, preview: &H::Node) -> Option<Duration> {
    match policy? {
        TeardownPolicy::Immediate => None,
        TeardownPolicy::Deferred {
            delay_ms,
            while_open,
        } => {
            let open = match while_open {
                Some(marker) => marker_open(host, preview, marker),
                None => true,
            };
            open.then(|| Duration::from_millis(*delay_ms))
        }
    }
}

fn marker_open<H: Host>(host: &H, preview: &H::Node, marker: &OpenMarker) -> bool {
    host.query(preview, &marker.selector)
        .is_some_and(|node| host.has_class(&node, &marker.class))
}
