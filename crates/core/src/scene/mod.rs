use serde::{Deserialize, Serialize};

use crate::{
    assets::ChannelSegment,
    envelope::KeyFrame,
    provider::{Collection, ProviderItem},
};

mod context;

pub use context::SceneContext;

/// Deepest nesting accepted for a [`ScenesGroup`].
pub const MAX_GROUP_DEPTH: usize = 16;

/// Concrete data produced by one scene template for one slot of the show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneData {
    pub template_name: String,
    pub duration: f64,
    #[serde(default)]
    pub info: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lighting: Option<Vec<LightingCue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<Vec<AudioCue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<Vec<ProjectionCue>>,
}

impl SceneData {
    pub fn new(template_name: impl Into<String>, duration: f64) -> Self {
        Self {
            template_name: template_name.into(),
            duration,
            info: String::new(),
            lighting: None,
            audio: None,
            projection: None,
        }
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = info.into();
        self
    }

    pub fn push_lighting(&mut self, cue: LightingCue) {
        self.lighting.get_or_insert_with(Vec::new).push(cue);
    }

    pub fn push_audio(&mut self, cue: AudioCue) {
        self.audio.get_or_insert_with(Vec::new).push(cue);
    }

    pub fn push_projection(&mut self, cue: ProjectionCue) {
        self.projection.get_or_insert_with(Vec::new).push(cue);
    }

    pub fn lighting_cues(&self) -> &[LightingCue] {
        self.lighting.as_deref().unwrap_or_default()
    }

    pub fn audio_cues(&self) -> &[AudioCue] {
        self.audio.as_deref().unwrap_or_default()
    }

    pub fn projection_cues(&self) -> &[ProjectionCue] {
        self.projection.as_deref().unwrap_or_default()
    }
}

/// A lighting scene driven by an envelope, with the channel values it sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightingCue {
    pub scene_ref: String,
    pub amplitude: f64,
    pub envelope: Vec<KeyFrame>,
    pub raw_channel_segments: Vec<ChannelSegment>,
}

/// Reference to one track of an audio library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackRef {
    pub library: String,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioCue {
    pub track: TrackRef,
    pub start_time: f64,
    pub duration: f64,
    pub amplitude: f64,
    pub volume_envelope: Vec<KeyFrame>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProjectionCue {
    Text {
        text: String,
        start_time: f64,
        duration: f64,
        fade: Vec<KeyFrame>,
    },
    Timer {
        start_time: f64,
        duration: f64,
    },
}

impl ProjectionCue {
    pub fn start_time(&self) -> f64 {
        match self {
            Self::Text { start_time, .. } | Self::Timer { start_time, .. } => *start_time,
        }
    }
}

/// Alternation tree of scene ids.
///
/// In JSON a leaf is a string and a group an array, so
/// `["a", ["b", "c"]]` alternates between `a` and the pair `b`/`c`.
/// Walks recurse only into `Group` children, so every walk ends at a
/// `Scene` leaf or an empty group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScenesGroup {
    Scene(String),
    Group(Vec<ScenesGroup>),
}

impl ScenesGroup {
    /// Every scene id reachable from this node, in declaration order.
    pub fn scenes(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_scenes(&mut out);
        out
    }

    fn collect_scenes<'g>(&'g self, out: &mut Vec<&'g str>) {
        match self {
            Self::Scene(id) => out.push(id),
            Self::Group(children) => {
                for child in children {
                    child.collect_scenes(out);
                }
            }
        }
    }

    /// Number of nested `Group` levels; a bare scene has depth zero.
    pub fn depth(&self) -> usize {
        match self {
            Self::Scene(_) => 0,
            Self::Group(children) => 1 + children.iter().map(Self::depth).max().unwrap_or(0),
        }
    }

    pub fn has_empty_group(&self) -> bool {
        match self {
            Self::Scene(_) => false,
            Self::Group(children) => {
                children.is_empty() || children.iter().any(Self::has_empty_group)
            }
        }
    }

    /// Provider collection rooted at `id`. Nested groups get the id
    /// `"{id}/{index}"` so that every level keeps its own anti-repeat memory.
    /// Entries are non-chaining unless they are alone in their collection.
    pub fn to_collection(&self, id: &str) -> Collection<String> {
        let mut items = match self {
            Self::Scene(scene) => vec![Self::leaf(scene)],
            Self::Group(children) => children
                .iter()
                .enumerate()
                .map(|(index, child)| match child {
                    Self::Scene(scene) => Self::leaf(scene),
                    Self::Group(_) => {
                        let child_id = format!("{id}/{index}");
                        let nested = child.to_collection(&child_id);
                        ProviderItem::nested(child_id, 1.0, nested).non_chaining()
                    }
                })
                .collect(),
        };
        if let [only] = items.as_mut_slice() {
            only.can_chain = true;
        }
        Collection::new(id, items)
    }

    fn leaf(scene: &str) -> ProviderItem<String> {
        ProviderItem::leaf(scene, 1.0, scene.to_string()).non_chaining()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderValue, WeightedProvider};
    use crate::random::seeded;

    fn nested_group() -> ScenesGroup {
        serde_json::from_value(serde_json::json!(["a", ["b", ["c", "d"]], "e"])).unwrap()
    }

    #[test]
    fn deserializes_strings_and_arrays() {
        let group = nested_group();
        assert_eq!(group.scenes(), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(group.depth(), 3);
        assert!(!group.has_empty_group());

        let leaf: ScenesGroup = serde_json::from_str(r#""solo""#).unwrap();
        assert_eq!(leaf, ScenesGroup::Scene("solo".to_string()));
        assert_eq!(leaf.depth(), 0);
    }

    #[test]
    fn detects_empty_groups() {
        let group: ScenesGroup = serde_json::from_str(r#"["a", []]"#).unwrap();
        assert!(group.has_empty_group());
    }

    #[test]
    fn collection_ids_follow_the_path() {
        let collection = nested_group().to_collection("wash");
        assert_eq!(collection.id, "wash");
        assert_eq!(collection.items.len(), 3);
        match &collection.items[1].value {
            ProviderValue::Nested(inner) => {
                assert_eq!(inner.id, "wash/1");
                match &inner.items[1].value {
                    ProviderValue::Nested(deepest) => assert_eq!(deepest.id, "wash/1/1"),
                    other => panic!("expected nested collection, got {other:?}"),
                }
            }
            other => panic!("expected nested collection, got {other:?}"),
        }
        assert!(collection.items.iter().all(|item| !item.can_chain));
    }

    #[test]
    fn selecting_from_a_group_alternates() {
        let group: ScenesGroup = serde_json::from_str(r#"["x", "y"]"#).unwrap();
        let collection = group.to_collection("pair");
        let mut provider = WeightedProvider::new();
        let mut rng = seeded(17);
        let picks: Vec<String> = (0..10)
            .map(|_| provider.select(&collection, &mut rng).unwrap().clone())
            .collect();
        for pair in picks.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn lone_entries_may_repeat_without_exclusion() {
        let leaf = ScenesGroup::Scene("strobe-all".to_string());
        let collection = leaf.to_collection("group:strobe");
        assert!(collection.items[0].can_chain);

        let mut provider = WeightedProvider::new();
        let mut rng = seeded(2);
        for _ in 0..5 {
            assert_eq!(provider.select(&collection, &mut rng).unwrap(), "strobe-all");
            assert_eq!(provider.excluded("group:strobe"), None);
        }

        let wrapped: ScenesGroup = serde_json::from_str(r#"[["a", "b"]]"#).unwrap();
        let collection = wrapped.to_collection("wrapped");
        assert!(collection.items[0].can_chain);
        match &collection.items[0].value {
            ProviderValue::Nested(inner) => assert!(inner.items.iter().all(|i| !i.can_chain)),
            other => panic!("expected nested collection, got {other:?}"),
        }
    }

    #[test]
    fn absent_payloads_are_omitted_from_json() {
        let mut data = SceneData::new("wash", 30.0);
        data.push_projection(ProjectionCue::Timer {
            start_time: 0.0,
            duration: 30.0,
        });
        let value = serde_json::to_value(&data).unwrap();
        assert!(value.get("lighting").is_none());
        assert!(value.get("audio").is_none());
        assert_eq!(value["projection"][0]["kind"], "timer");
        assert!(data.lighting_cues().is_empty());
    }
}
