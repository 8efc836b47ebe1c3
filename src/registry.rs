// Effect registry: the id -> descriptor table plus the shared resource cache.
// Built once at startup and handed to the controller.

use std::collections::BTreeMap;

use crate::catalog::{EffectManifest, EntryPoint};
use crate::effect::{Effect, RuntimeHandle, StyleOnly};
use crate::error::{EmbedError, Phase};
use crate::host::Host;
use crate::resource::{Readiness, ResourceCache, ResourceLoader};
use crate::types::{EffectId, Locator, Resource, TeardownPolicy};

/// Everything the controller needs to drive one effect.
pub struct EffectDescriptor<H: Host> {
    id: EffectId,
    resources: Vec<Resource>,
    teardown: TeardownPolicy,
    behaviour: Box<dyn Effect<H>>,
}

impl<H: Host> EffectDescriptor<H> {
    pub fn new(id: impl Into<EffectId>, behaviour: impl Effect<H> + 'static) -> Self {
        EffectDescriptor {
            id: id.into(),
            resources: Vec::new(),
            teardown: TeardownPolicy::Immediate,
            behaviour: Box::new(behaviour),
        }
    }

    pub fn style_only(id: impl Into<EffectId>) -> Self {
        Self::new(id, StyleOnly)
    }

    pub fn with_resources(mut self, resources: Vec<Resource>) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_teardown(mut self, teardown: TeardownPolicy) -> Self {
        self.teardown = teardown;
        self
    }

    pub fn id(&self) -> &EffectId {
        &self.id
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn teardown(&self) -> &TeardownPolicy {
        &self.teardown
    }
}

pub struct EffectRegistry<H: Host> {
    descriptors: BTreeMap<EffectId, EffectDescriptor<H>>,
    cache: ResourceCache,
}

impl<H: Host> Default for EffectRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Host> EffectRegistry<H> {
    pub fn new() -> Self {
        EffectRegistry {
            descriptors: BTreeMap::new(),
            cache: ResourceCache::new(),
        }
    }

    /// Build from manifests. `resolve` supplies the behaviour of every
    /// scripted entry; `EntryPoint::None` becomes a style-only effect.
    pub fn from_manifests<F>(manifests: &[EffectManifest], mut resolve: F) -> Result<Self, EmbedError>
    where
        F: FnMut(&EffectManifest) -> Result<Box<dyn Effect<H>>, EmbedError>,
    {
        let mut registry = Self::new();
        for manifest in manifests {
            let behaviour: Box<dyn Effect<H>> = match manifest.entry {
                EntryPoint::None => Box::new(StyleOnly),
                _ => resolve(manifest)?,
            };
            registry.register(EffectDescriptor {
                id: manifest.id.clone(),
                resources: manifest.resources(),
                teardown: manifest.teardown.clone(),
                behaviour,
            })?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, descriptor: EffectDescriptor<H>) -> Result<(), EmbedError> {
        if self.descriptors.contains_key(&descriptor.id) {
            return Err(EmbedError::InvalidConfig(format!(
                "effect \"{}\" registered twice",
                descriptor.id
            )));
        }
        self.descriptors.insert(descriptor.id.clone(), descriptor);
        Ok(())
    }

    pub fn contains(&self, id: &EffectId) -> bool {
        self.descriptors.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &EffectId> {
        self.descriptors.keys()
    }

    pub fn teardown(&self, id: &EffectId) -> Option<&TeardownPolicy> {
        self.descriptors.get(id).map(EffectDescriptor::teardown)
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// Make sure every resource of `id` is loaded or in flight.
    pub fn ensure<L>(&mut self, id: &EffectId, loader: &mut L) -> Result<Readiness, EmbedError>
    where
        L: ResourceLoader + ?Sized,
    {
        let descriptor = self
            .descriptors
            .get(id)
            .ok_or_else(|| EmbedError::UnknownEffect(id.clone()))?;
        self.cache.ensure(&descriptor.resources, loader)
    }

    pub fn settle(&mut self, locator: &Locator, outcome: Result<(), String>) -> bool {
        self.cache.settle(locator, outcome)
    }

    pub fn start(
        &self,
        id: &EffectId,
        host: &mut H,
        preview: &H::Node,
    ) -> Result<Option<RuntimeHandle<H>>, EmbedError> {
        let descriptor = self.descriptor(id)?;
        descriptor
            .behaviour
            .start(host, preview)
            .map_err(|err| EmbedError::Effect {
                effect: id.clone(),
                phase: Phase::Start,
                message: err.to_string(),
            })
    }

    /// Run the descriptor's stop, then the handle's teardown. Both run even if
    /// the first fails; the first error is returned.
    pub fn stop(
        &self,
        id: &EffectId,
        host: &mut H,
        preview: &H::Node,
        handle: Option<RuntimeHandle<H>>,
    ) -> Result<(), EmbedError> {
        let descriptor = self.descriptor(id)?;
        let descriptor_result = descriptor.behaviour.stop(host, preview);
        let handle_result = match handle {
            Some(handle) => handle.stop(host),
            None => Ok(()),
        };
        descriptor_result
            .and(handle_result)
            .map_err(|err| EmbedError::Effect {
                effect: id.clone(),
                phase: Phase::Stop,
                message: err.to_string(),
            })
    }

    fn descriptor(&self, id: &EffectId) -> Result<&EffectDescriptor<H>, EmbedError> {
        self.descriptors
            .get(id)
            .ok_or_else(|| EmbedError::UnknownEffect(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::catalog::default_catalog;
    use crate::effect::Mounted;
    use crate::error::EffectError;
    use crate::test_host::MemoryHost;

    struct Noisy {
        log: Rc<RefCell<Vec<&'static str>>>,
        fail_stop: bool,
    }

    impl Effect<MemoryHost> for Noisy {
        fn start(
            &self,
            _host: &mut MemoryHost,
            _preview: &<MemoryHost as Host>::Node,
        ) -> Result<Option<RuntimeHandle<MemoryHost>>, EffectError> {
            self.log.borrow_mut().push("start");
            let log = self.log.clone();
            Ok(Some(RuntimeHandle::from_fn(move |_| {
                log.borrow_mut().push("handle");
                Ok(())
            })))
        }

        fn stop(
            &self,
            _host: &mut MemoryHost,
            _preview: &<MemoryHost as Host>::Node,
        ) -> Result<(), EffectError> {
            self.log.borrow_mut().push("stop");
            if self.fail_stop {
                return Err(EffectError::new("listener already gone"));
            }
            Ok(())
        }
    }

    #[test]
    fn builds_default_catalog() {
        let registry = EffectRegistry::<MemoryHost>::from_manifests(&default_catalog(), |_| {
            Ok(Box::new(Mounted::<MemoryHost>::new(None, |_, _| Ok(None))))
        })
        .unwrap();
        assert_eq!(registry.len(), 13);
        assert!(registry.contains(&EffectId::new("expanding-search-bar")));
        assert!(matches!(
            registry.teardown(&EffectId::new("expanding-search-bar")),
            Some(TeardownPolicy::Deferred { delay_ms: 750, .. })
        ));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut registry = EffectRegistry::<MemoryHost>::new();
        registry.register(EffectDescriptor::style_only("radiant-hover-cards")).unwrap();
        let err = registry
            .register(EffectDescriptor::style_only("radiant-hover-cards"))
            .unwrap_err();
        assert!(matches!(err, EmbedError::InvalidConfig(_)));
    }

    #[test]
    fn ensure_unknown_effect_errors() {
        let mut registry = EffectRegistry::<MemoryHost>::new();
        let mut host = MemoryHost::new();
        let err = registry.ensure(&EffectId::new("missing"), &mut host).unwrap_err();
        assert!(matches!(err, EmbedError::UnknownEffect(_)));
    }

    #[test]
    fn stop_runs_descriptor_then_handle_even_on_failure() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut registry = EffectRegistry::<MemoryHost>::new();
        registry
            .register(EffectDescriptor::new(
                "like-dislike-widget",
                Noisy {
                    log: log.clone(),
                    fail_stop: true,
                },
            ))
            .unwrap();

        let mut host = MemoryHost::new();
        let root = host.root();
        let (_, preview) = host.card(root, "like-dislike-widget");
        let id = EffectId::new("like-dislike-widget");

        let handle = registry.start(&id, &mut host, &preview).unwrap();
        let err = registry.stop(&id, &mut host, &preview, handle).unwrap_err();

        assert!(matches!(err, EmbedError::Effect { phase: Phase::Stop, .. }));
        assert_eq!(*log.borrow(), vec!["start", "stop", "handle"]);
    }

    #[test]
    fn stop_without_handle_is_noop_for_style_only() {
        let mut registry = EffectRegistry::<MemoryHost>::new();
        registry.register(EffectDescriptor::style_only("liquid-gradient-wave")).unwrap();
        let mut host = MemoryHost::new();
        let root = host.root();
        let (_, preview) = host.card(root, "liquid-gradient-wave");

        registry
            .stop(&EffectId::new("liquid-gradient-wave"), &mut host, &preview, None)
            .unwrap();
    }
}
