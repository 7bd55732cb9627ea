//! Scene bookkeeping for headless runs.
//!
//! Entities, meshes and nodes are kept by identifier so that the latest
//! state of each is available; deletions remove entities.

use std::collections::BTreeMap;

use hotspot_core::{SceneKind, SceneSink, SceneUpdate};
use hotspot_types::{Message, Value};
use tracing::debug;

/// Field identifying a scene object.
pub const ID_FIELD: &str = "id";

/// Latest known scene objects.
#[derive(Debug, Default)]
pub struct SceneState {
    entities: BTreeMap<String, Message>,
    meshes: BTreeMap<String, Message>,
    nodes: BTreeMap<String, Message>,
}

impl SceneState {
    /// Known entities.
    pub fn entities(&self) -> &BTreeMap<String, Message> {
        &self.entities
    }

    /// Known meshes.
    pub fn meshes(&self) -> &BTreeMap<String, Message> {
        &self.meshes
    }

    /// Known nodes.
    pub fn nodes(&self) -> &BTreeMap<String, Message> {
        &self.nodes
    }

    /// Forget everything, e.g. after a stream switch.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.meshes.clear();
        self.nodes.clear();
    }
}

/// Object identifier: the `id` field if present, otherwise the channel.
fn object_id(update: &SceneUpdate) -> String {
    match update.message.get(ID_FIELD) {
        Some(Value::Int(id)) => id.to_string(),
        Some(Value::Text(id)) => id.clone(),
        _ => update.channel.clone(),
    }
}

impl SceneSink for SceneState {
    fn apply(&mut self, update: SceneUpdate) {
        let id = object_id(&update);
        debug!(kind = ?update.kind, id = id.as_str(), schema = update.schema.as_str(), "Scene update");
        match update.kind {
            SceneKind::Entity => {
                self.entities.insert(id, update.message);
            }
            SceneKind::EntityDeleted => {
                self.entities.remove(&id);
            }
            SceneKind::Mesh => {
                self.meshes.insert(id, update.message);
            }
            SceneKind::Node => {
                self.nodes.insert(id, update.message);
            }
        }
    }
}
