// Load-once cache for effect scripts and stylesheets, keyed by locator.
// Never evicts: a resource stays in the page once it has loaded.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::error::EmbedError;
use crate::types::{Locator, Resource};

/// Outcome of asking the page for a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requested {
    /// Completion will be reported through `ResourceCache::settle`.
    Pending,
    /// Already present in the page.
    Complete,
}

/// Issues the actual page loads. Implemented by the host.
pub trait ResourceLoader {
    fn load_script(&mut self, locator: &Locator) -> Result<Requested, String>;
    fn load_style(&mut self, locator: &Locator) -> Result<(), String>;
}

/// Cache entry for one locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Pending,
    Loaded,
    /// Re-requested by the next `ensure`.
    Failed(String),
}

/// Result of `ensure` when nothing failed synchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Scripts still in flight.
    Pending(BTreeSet<Locator>),
}

#[derive(Debug, Default)]
pub struct ResourceCache {
    entries: HashMap<Locator, LoadState>,
    requests_issued: usize,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request every resource not already loaded or in flight.
    ///
    /// Repeated calls observe the same in-flight entry instead of issuing
    /// a second load. A failure reported synchronously by the loader is
    /// recorded and returned; the next call retries it.
    pub fn ensure<L>(&mut self, resources: &[Resource], loader: &mut L) -> Result<Readiness, EmbedError>
    where
        L: ResourceLoader + ?Sized,
    {
        let mut pending = BTreeSet::new();

        for resource in resources {
            let locator = resource.locator();
            match self.entries.get(locator) {
                Some(LoadState::Loaded) => continue,
                Some(LoadState::Pending) => {
                    pending.insert(locator.clone());
                    continue;
                }
                Some(LoadState::Failed(reason)) => {
                    debug!(%locator, %reason, "retrying failed resource");
                }
                None => {}
            }

            self.requests_issued += 1;
            let state = match resource {
                Resource::Style(_) => match loader.load_style(locator) {
                    Ok(()) => LoadState::Loaded,
                    Err(reason) => LoadState::Failed(reason),
                },
                Resource::Script(_) => match loader.load_script(locator) {
                    Ok(Requested::Pending) => {
                        pending.insert(locator.clone());
                        LoadState::Pending
                    }
                    Ok(Requested::Complete) => LoadState::Loaded,
                    Err(reason) => LoadState::Failed(reason),
                },
            };

            if let LoadState::Failed(reason) = &state {
                warn!(%locator, %reason, "resource request failed");
                let err = EmbedError::ResourceLoad {
                    locator: locator.clone(),
                    reason: reason.clone(),
                };
                self.entries.insert(locator.clone(), state);
                return Err(err);
            }
            self.entries.insert(locator.clone(), state);
        }

        if pending.is_empty() {
            Ok(Readiness::Ready)
        } else {
            Ok(Readiness::Pending(pending))
        }
    }

    /// Record the completion of an in-flight script.
    /// Returns false for completions nobody is waiting on.
    pub fn settle(&mut self, locator: &Locator, outcome: Result<(), String>) -> bool {
        match self.entries.get_mut(locator) {
            Some(entry) if *entry == LoadState::Pending => {
                *entry = match outcome {
                    Ok(()) => LoadState::Loaded,
                    Err(reason) => LoadState::Failed(reason),
                };
                true
            }
            _ => {
                debug!(%locator, "ignoring stale resource completion");
                false
            }
        }
    }

    pub fn state(&self, locator: &Locator) -> Option<&LoadState> {
        self.entries.get(locator)
    }

    /// Number of loads handed to the loader so far, retries included.
    pub fn requests_issued(&self) -> usize {
        self.requests_issued
    }
}
