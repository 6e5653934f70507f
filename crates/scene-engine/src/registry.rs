//! Scene registry and derived indices
//!
//! The registry is pure data. It is built wholesale from the listed scene
//! objects and thrown away on reload; nothing in here touches timers or the
//! store.

use indexmap::IndexMap;
use scene_config::EngineSettings;
use serde_json::Value;
use tracing::{debug, warn};

use crate::scene::{Scene, SceneDefinition};

/// Which point subscriptions the loaded scenes need
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubscriptionPlan {
    /// Nothing loaded yet
    #[default]
    None,
    /// Too many distinct points: subscribe to every point
    All,
    /// The listed points plus the scene namespace pattern
    Points(Vec<String>),
}

/// Loaded scenes plus the point indices derived from them
#[derive(Debug, Clone, Default)]
pub struct Registry {
    scenes: IndexMap<String, Scene>,
    point_to_scenes: IndexMap<String, Vec<String>>,
    point_to_triggers: IndexMap<String, Vec<String>>,
    plan: SubscriptionPlan,
}

impl Registry {
    /// Build a registry from `(id, object)` pairs listed from the store
    ///
    /// Keeps definitions that are enabled, have at least one member, and
    /// name `settings.authority()` as their engine.
    pub fn build(objects: Vec<(String, Value)>, settings: &EngineSettings) -> Self {
        let authority = settings.authority();
        let mut registry = Self::default();

        for (id, object) in objects {
            let definition = match SceneDefinition::from_object(&id, &object) {
                Ok(definition) => definition,
                Err(e) => {
                    warn!(scene_id = %id, error = %e, "Skipping malformed scene definition");
                    continue;
                }
            };

            if definition.native.members.is_empty() {
                debug!(scene_id = %id, "Skipping scene without members");
                continue;
            }
            if !definition.common.enabled {
                debug!(scene_id = %id, "Skipping disabled scene");
                continue;
            }
            if definition.common.engine.as_deref() != Some(authority.as_str()) {
                debug!(scene_id = %id, engine = ?definition.common.engine, "Skipping scene of another engine");
                continue;
            }

            let scene = Scene::from_definition(&id, definition);
            registry.scenes.insert(id, scene);
        }

        registry.build_indices(settings.subscribe_all_threshold);
        registry
    }

    fn build_indices(&mut self, threshold: usize) {
        let mut points: Vec<String> = Vec::new();

        for scene in self.scenes.values() {
            for member in &scene.members {
                push_unique(&mut points, &member.id);
                push_unique(
                    self.point_to_scenes.entry(member.id.clone()).or_default(),
                    &scene.id,
                );
            }

            for on_true in [true, false] {
                if let Some(trigger) = scene.side(on_true).and_then(|s| s.trigger.as_ref()) {
                    push_unique(&mut points, &trigger.point_id);
                    push_unique(
                        self.point_to_triggers
                            .entry(trigger.point_id.clone())
                            .or_default(),
                        &scene.id,
                    );
                }
            }
        }

        self.plan = if points.len() > threshold {
            SubscriptionPlan::All
        } else if self.scenes.is_empty() {
            SubscriptionPlan::None
        } else {
            SubscriptionPlan::Points(points)
        };
    }

    pub fn get(&self, scene_id: &str) -> Option<&Scene> {
        self.scenes.get(scene_id)
    }

    pub fn get_mut(&mut self, scene_id: &str) -> Option<&mut Scene> {
        self.scenes.get_mut(scene_id)
    }

    pub fn contains(&self, scene_id: &str) -> bool {
        self.scenes.contains_key(scene_id)
    }

    /// Loaded scenes in load order
    pub fn scenes(&self) -> impl Iterator<Item = &Scene> {
        self.scenes.values()
    }

    pub fn scenes_mut(&mut self) -> impl Iterator<Item = &mut Scene> {
        self.scenes.values_mut()
    }

    pub fn scene_ids(&self) -> Vec<String> {
        self.scenes.keys().cloned().collect()
    }

    /// Scenes having `point_id` as a member
    pub fn scenes_for_point(&self, point_id: &str) -> &[String] {
        self.point_to_scenes
            .get(point_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Scenes with an enabled trigger on `point_id`
    pub fn triggers_for_point(&self, point_id: &str) -> &[String] {
        self.point_to_triggers
            .get(point_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn plan(&self) -> &SubscriptionPlan {
        &self.plan
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

fn push_unique(list: &mut Vec<String>, id: &str) {
    if !list.iter().any(|existing| existing == id) {
        list.push(id.to_string());
    }
}
