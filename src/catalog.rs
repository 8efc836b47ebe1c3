// Data form of the effect table: which resources each gallery effect needs,
// how it is launched and how it is torn down.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{EffectId, Locator, Resource, TeardownPolicy};

/// How a scripted effect is launched from the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryPoint {
    /// Declarative effect; nothing to run.
    #[default]
    None,
    /// Global function returning a cleanup callable.
    Cleanup {
        global: String,
        #[serde(default)]
        mount: Option<String>,
    },
    /// Global function returning an object with `start`/`stop`.
    Controller {
        global: String,
        #[serde(default)]
        mount: Option<String>,
    },
    /// Global function returning a mounted instance with `unmount`.
    Instance {
        global: String,
        #[serde(default)]
        mount: Option<String>,
    },
}

/// One entry of the effect table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectManifest {
    pub id: EffectId,
    #[serde(default)]
    pub styles: Vec<Locator>,
    #[serde(default)]
    pub scripts: Vec<Locator>,
    #[serde(default)]
    pub entry: EntryPoint,
    #[serde(default)]
    pub teardown: TeardownPolicy,
}

impl EffectManifest {
    fn new(id: &str, entry: EntryPoint) -> Self {
        EffectManifest {
            id: EffectId::new(id),
            styles: Vec::new(),
            scripts: Vec::new(),
            entry,
            teardown: TeardownPolicy::Immediate,
        }
    }

    fn style(mut self, path: &str) -> Self {
        self.styles.push(Locator::new(path));
        self
    }

    fn script(mut self, path: &str) -> Self {
        self.scripts.push(Locator::new(path));
        self
    }

    fn teardown(mut self, policy: TeardownPolicy) -> Self {
        self.teardown = policy;
        self
    }

    /// Stylesheets first, then scripts, in declaration order.
    pub fn resources(&self) -> Vec<Resource> {
        self.styles
            .iter()
            .cloned()
            .map(Resource::Style)
            .chain(self.scripts.iter().cloned().map(Resource::Script))
            .collect()
    }
}

fn cleanup(global: &str) -> EntryPoint {
    EntryPoint::Cleanup {
        global: global.to_string(),
        mount: None,
    }
}

/// Search bar stays open this long after the pointer leaves.
pub const SEARCH_CLOSE_DELAY: Duration = Duration::from_millis(750);

/// The gallery's built-in effects.
pub fn default_catalog() -> Vec<EffectManifest> {
    vec![
        EffectManifest::new("parallax-cards", cleanup("initParallax"))
            .script("effects/parallax-cards/script.js"),
        EffectManifest::new(
            "webgl-rotating-triangle",
            EntryPoint::Controller {
                global: "createTriangle".to_string(),
                mount: Some("#glcanvas".to_string()),
            },
        )
        .style("effects/webgl-rotating-triangle/style.css")
        .script("effects/webgl-rotating-triangle/script.js"),
        EffectManifest::new(
            "react-pulse-button",
            EntryPoint::Cleanup {
                global: "mountPulse".to_string(),
                mount: Some("#react-root".to_string()),
            },
        )
        .style("effects/react-pulse-button/style.css")
        .script("effects/react-pulse-button/PulseButton.jsx"),
        EffectManifest::new(
            "vue-flip-card",
            EntryPoint::Instance {
                global: "mountFlip".to_string(),
                mount: Some("#vue-root".to_string()),
            },
        )
        .style("effects/vue-flip-card/style.css")
        .script("effects/vue-flip-card/flipcard.js"),
        EffectManifest::new("liquid-gradient-wave", EntryPoint::None)
            .style("effects/liquid-gradient-wave/style.css"),
        EffectManifest::new("radiant-hover-cards", EntryPoint::None)
            .style("effects/radiant-hover-cards/style.css"),
        EffectManifest::new("cursor-particle-trail", cleanup("initParticleTrail"))
            .style("effects/js/cursor-particle-trail/style.css")
            .script("effects/js/cursor-particle-trail/script.js"),
        EffectManifest::new("magnetic-hover-effect", cleanup("initMagneticHoverEffect")),
        EffectManifest::new("confetti-burst-effect", cleanup("initConfettiBurstEffect")),
        EffectManifest::new("typewriter-text-effect", cleanup("initTypewriterTextEffect")),
        EffectManifest::new("expanding-search-bar", cleanup("initExpandingSearchBar")).teardown(
            TeardownPolicy::deferred_while_open(SEARCH_CLOSE_DELAY, ".search-box", "active"),
        ),
        EffectManifest::new("like-dislike-widget", cleanup("initLikeDislikeWidget")),
        EffectManifest::new("glitch-text-effect", cleanup("initGlitchText")),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn catalog_ids_are_unique() {
        let catalog = default_catalog();
        let ids: HashSet<_> = catalog.iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids.len(), catalog.len());
        assert_eq!(catalog.len(), 13);
    }

    #[test]
    fn resources_list_styles_before_scripts() {
        let catalog = default_catalog();
        let triangle = catalog
            .iter()
            .find(|m| m.id.as_str() == "webgl-rotating-triangle")
            .unwrap();
        let resources = triangle.resources();
        assert!(matches!(resources[0], Resource::Style(_)));
        assert!(matches!(resources[1], Resource::Script(_)));
    }

    #[test]
    fn only_search_bar_defers_teardown() {
        let deferred: Vec<_> = default_catalog()
            .into_iter()
            .filter(|m| m.teardown != TeardownPolicy::Immediate)
            .map(|m| m.id)
            .collect();
        assert_eq!(deferred, vec![EffectId::new("expanding-search-bar")]);
    }

    #[test]
    fn manifest_defaults_from_minimal_json() {
        let manifest: EffectManifest = serde_json::from_str(r#"{"id":"plain"}"#).unwrap();
        assert_eq!(manifest.entry, EntryPoint::None);
        assert_eq!(manifest.teardown, TeardownPolicy::Immediate);
        assert!(manifest.resources().is_empty());
    }

    #[test]
    fn entry_point_parses_kind_tag() {
        let entry: EntryPoint =
            serde_json::from_str(r##"{"kind":"controller","global":"createTriangle","mount":"#glcanvas"}"##)
                .unwrap();
        assert!(matches!(entry, EntryPoint::Controller { ref global, .. } if global == "createTriangle"));
    }
}
