// Effect contract: what every gallery effect implements, and the stoppable
// handle that unifies the different cleanup conventions effects come with.

use std::fmt;

use crate::error::EffectError;
use crate::host::Host;

/// Runtime behaviour of one effect.
pub trait Effect<H: Host> {
    /// Activate inside `preview`. Missing markup is not an error: return `Ok(None)`.
    fn start(&self, host: &mut H, preview: &H::Node) -> Result<Option<RuntimeHandle<H>>, EffectError>;

    /// Descriptor-level deactivation, run before the handle's own teardown.
    fn stop(&self, _host: &mut H, _preview: &H::Node) -> Result<(), EffectError> {
        Ok(())
    }
}

/// Anything that can reverse what a `start` did.
pub trait Stoppable<H: Host> {
    fn stop(self: Box<Self>, host: &mut H) -> Result<(), EffectError>;
}

struct FnHandle<F>(F);

impl<H, F> Stoppable<H> for FnHandle<F>
where
    H: Host,
    F: FnOnce(&mut H) -> Result<(), EffectError>,
{
    fn stop(self: Box<Self>, host: &mut H) -> Result<(), EffectError> {
        (self.0)(host)
    }
}

/// Opaque handle produced by `start`, owned by the region until `stop`.
pub struct RuntimeHandle<H: Host>(Box<dyn Stoppable<H>>);

impl<H: Host> RuntimeHandle<H> {
    pub fn new(handle: impl Stoppable<H> + 'static) -> Self {
        RuntimeHandle(Box::new(handle))
    }

    /// Wrap a cleanup callable.
    pub fn from_fn(cleanup: impl FnOnce(&mut H) -> Result<(), EffectError> + 'static) -> Self {
        RuntimeHandle(Box::new(FnHandle(cleanup)))
    }

    pub fn stop(self, host: &mut H) -> Result<(), EffectError> {
        self.0.stop(host)
    }
}

impl<H: Host> fmt::Debug for RuntimeHandle<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RuntimeHandle(..)")
    }
}

/// Effect whose behaviour is entirely declarative (stylesheet transitions).
#[derive(Debug, Clone, Copy, Default)]
pub struct StyleOnly;

impl<H: Host> Effect<H> for StyleOnly {
    fn start(&self, _host: &mut H, _preview: &H::Node) -> Result<Option<RuntimeHandle<H>>, EffectError> {
        Ok(None)
    }
}

type Launcher<H> =
    Box<dyn Fn(&mut H, &<H as Host>::Node) -> Result<Option<RuntimeHandle<H>>, EffectError>>;

/// Effect launched on a mount element inside the preview.
///
/// Without a mount selector the preview itself is the target. When the
/// selector matches nothing the effect does no work.
pub struct Mounted<H: Host> {
    mount: Option<String>,
    launch: Launcher<H>,
}

impl<H: Host> Mounted<H> {
    pub fn new(
        mount: Option<String>,
        launch: impl Fn(&mut H, &H::Node) -> Result<Option<RuntimeHandle<H>>, EffectError> + 'static,
    ) -> Self {
        Mounted {
            mount,
            launch: Box::new(launch),
        }
    }
}

impl<H: Host> Effect<H> for Mounted<H> {
    fn start(&self, host: &mut H, preview: &H::Node) -> Result<Option<RuntimeHandle<H>>, EffectError> {
        let target = match &self.mount {
            Some(selector) => match host.query(preview, selector) {
                Some(node) => node,
                None => return Ok(None),
            },
            None => preview.clone(),
        };
        (self.launch)(host, &target)
    }
}
