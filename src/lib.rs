// gallery_embed: effect lifecycle controller for the effects gallery.
// The controller core is host-agnostic; `web` binds it to the browser DOM.

mod catalog;
mod config;
mod controller;
mod effect;
mod error;
mod host;
mod registry;
mod resource;
mod types;

#[cfg(target_arch = "wasm32")]
mod web;

#[cfg(test)]
mod test_host;

use wasm_bindgen::prelude::*;

pub use catalog::{default_catalog, EffectManifest, EntryPoint, SEARCH_CLOSE_DELAY};
pub use config::EmbedConfig;
pub use controller::EmbedController;
pub use effect::{Effect, Mounted, RuntimeHandle, Stoppable, StyleOnly};
pub use error::{EffectError, EmbedError, Phase};
pub use host::Host;
pub use registry::{EffectDescriptor, EffectRegistry};
pub use resource::{LoadState, Readiness, Requested, ResourceCache, ResourceLoader};
pub use types::*;

#[cfg(target_arch = "wasm32")]
pub use web::{attach_embed_controller, EmbedRuntime};

/// Initialize panic hook for better error messages in browser console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// The stock effect catalog as JSON, a starting point for custom configs.
#[wasm_bindgen]
pub fn default_catalog_json() -> Result<String, JsValue> {
    serde_json::to_string(&default_catalog())
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_json_feeds_config() {
        let catalog = serde_json::to_string(&default_catalog()).unwrap();
        let config = EmbedConfig::from_json(&format!(r#"{{"effects":{catalog}}}"#)).unwrap();
        assert_eq!(config.effects, default_catalog());
    }
}
