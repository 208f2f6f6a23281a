use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    scene::{ScenesGroup, MAX_GROUP_DEPTH},
    Result, ShowGenError,
};

/// Contiguous run of channel values starting at a fixture address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSegment {
    pub address: u16,
    pub values: Vec<u8>,
}

/// Read-only lookup tables consulted while generating a show.
///
/// Maps are ordered so that iterating them never changes which random draws
/// a generation makes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Libraries {
    /// Scene name to the channel segments it sets.
    scenes: BTreeMap<String, Vec<ChannelSegment>>,
    /// Audio library key to the number of tracks it holds.
    audio: BTreeMap<String, usize>,
    /// Projection input key to its candidate strings.
    projection: BTreeMap<String, Vec<String>>,
    /// Named alternation groups over scene names.
    groups: BTreeMap<String, ScenesGroup>,
}

impl Libraries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON library document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let libraries: Self = serde_json::from_str(json)?;
        libraries.validate()?;
        Ok(libraries)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn register_scene(&mut self, name: impl Into<String>, segments: Vec<ChannelSegment>) {
        self.scenes.insert(name.into(), segments);
    }

    pub fn register_audio(&mut self, key: impl Into<String>, track_count: usize) {
        self.audio.insert(key.into(), track_count);
    }

    pub fn register_projection(&mut self, key: impl Into<String>, inputs: Vec<String>) {
        self.projection.insert(key.into(), inputs);
    }

    pub fn register_group(&mut self, name: impl Into<String>, group: ScenesGroup) {
        self.groups.insert(name.into(), group);
    }

    pub fn scene(&self, name: &str) -> Result<&[ChannelSegment]> {
        self.scenes
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| ShowGenError::SceneNotFound(name.to_string()))
    }

    pub fn scene_names(&self) -> impl Iterator<Item = &str> {
        self.scenes.keys().map(String::as_str)
    }

    pub fn track_count(&self, key: &str) -> Result<usize> {
        self.audio
            .get(key)
            .copied()
            .ok_or_else(|| ShowGenError::AudioLibraryNotFound(key.to_string()))
    }

    pub fn projection_inputs(&self, key: &str) -> Result<&[String]> {
        self.projection
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| ShowGenError::ProjectionInputNotFound(key.to_string()))
    }

    pub fn group(&self, name: &str) -> Result<&ScenesGroup> {
        self.groups
            .get(name)
            .ok_or_else(|| ShowGenError::SceneGroupNotFound(name.to_string()))
    }

    /// Checks that every group is well formed and only names known scenes.
    pub fn validate(&self) -> Result<()> {
        for (name, group) in &self.groups {
            if group.depth() > MAX_GROUP_DEPTH {
                return Err(ShowGenError::invalid(format!(
                    "scene group `{name}` nests deeper than {MAX_GROUP_DEPTH} levels"
                )));
            }
            if group.has_empty_group() {
                return Err(ShowGenError::no_candidates(format!("group:{name}")));
            }
            for scene in group.scenes() {
                self.scene(scene)?;
            }
        }
        Ok(())
    }
}

/// Small but complete library set used by the unit tests across the crate.
#[cfg(test)]
pub(crate) fn sample_libraries() -> Libraries {
    let json = serde_json::json!({
        "scenes": {
            "wash-blue": [{ "address": 1, "values": [0, 0, 255] }],
            "wash-amber": [{ "address": 1, "values": [255, 140, 0] }],
            "accent-left": [{ "address": 10, "values": [255] }],
            "accent-right": [{ "address": 11, "values": [255] }],
            "chase-1": [{ "address": 20, "values": [255, 0, 0] }],
            "chase-2": [{ "address": 20, "values": [0, 255, 0] }],
            "chase-3": [{ "address": 20, "values": [0, 0, 255] }],
            "strobe-all": [{ "address": 30, "values": [255, 255] }],
            "house": [{ "address": 40, "values": [180] }],
            "stage-warm": [{ "address": 41, "values": [200, 120] }]
        },
        "audio": { "ambient": 6, "rhythmic": 4, "lobby": 3 },
        "projection": { "quotes": ["breathe", "listen", "look up", "stay"] },
        "groups": {
            "wash": ["wash-blue", "wash-amber"],
            "accent": ["accent-left", ["accent-right", "accent-left"]],
            "chase": ["chase-1", "chase-2", "chase-3"],
            "strobe": "strobe-all"
        }
    });
    let libraries: Libraries = serde_json::from_value(json).expect("sample libraries parse");
    libraries.validate().expect("sample libraries are valid");
    libraries
}
