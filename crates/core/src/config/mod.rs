use std::{collections::BTreeMap, path::Path};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{random::Range, Result, ShowGenError};

/// Feature gates by name. Missing names count as disabled.
pub type FeatureSet = BTreeMap<String, bool>;

/// A duration given either as a literal number of seconds or as a range
/// sampled once when generation starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationSpec {
    Fixed(f64),
    Ranged(Range),
}

impl DurationSpec {
    pub fn resolve<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Self::Fixed(value) => *value,
            Self::Ranged(range) => range.sample(rng),
        }
    }

    fn validate(&self, what: &str) -> Result<()> {
        let lowest = match self {
            Self::Fixed(value) => *value,
            Self::Ranged(range) => range.min(),
        };
        if !lowest.is_finite() || lowest < 0.0 {
            return Err(ShowGenError::invalid(format!(
                "{what} must be a non-negative duration"
            )));
        }
        Ok(())
    }
}

impl From<f64> for DurationSpec {
    fn from(value: f64) -> Self {
        Self::Fixed(value)
    }
}

impl From<Range> for DurationSpec {
    fn from(value: Range) -> Self {
        Self::Ranged(value)
    }
}

/// Top-level input of one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateShowArgs {
    pub show: ShowConfig,
    pub blackout: BlackoutConfig,
    #[serde(default)]
    pub preshow: FillerConfig,
    #[serde(default)]
    pub postshow: FillerConfig,
    pub intro: BookendConfig,
    pub outro: BookendConfig,
    #[serde(default)]
    pub features: FeatureSet,
    /// Scenes that stay lit for the whole show.
    #[serde(default)]
    pub static_scenes: Vec<String>,
    /// Catalog templates that must not be selected.
    #[serde(default)]
    pub disabled_templates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowConfig {
    pub total_duration: DurationSpec,
    #[serde(default)]
    pub lighting_plan_ref: String,
    #[serde(default)]
    pub show_name_ref: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlackoutConfig {
    pub duration: DurationSpec,
    #[serde(default)]
    pub fade: Option<f64>,
}

/// Pre-show or post-show filler block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillerConfig {
    pub fade: f64,
    pub count: usize,
    pub duration: DurationSpec,
    /// Scenes to rotate through; empty means every library scene.
    pub scenes: Vec<String>,
    pub audio_library: Option<String>,
}

impl Default for FillerConfig {
    fn default() -> Self {
        Self {
            fade: 5.0,
            count: 3,
            duration: DurationSpec::Fixed(300.0),
            scenes: Vec::new(),
            audio_library: None,
        }
    }
}

/// Intro or outro.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookendConfig {
    pub duration: DurationSpec,
    pub scene: String,
    pub fade: f64,
    #[serde(default)]
    pub audio_library: Option<String>,
    #[serde(default)]
    pub tail: Option<TailConfig>,
}

/// Extra lighting appended after an intro or outro body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailConfig {
    pub duration: DurationSpec,
    pub scene: String,
    /// Defaults to the fade of the owning bookend.
    #[serde(default)]
    pub fade: Option<f64>,
}

/// Numbers the ranged inputs resolved to for one generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedValues {
    pub total_duration: f64,
    pub blackout_duration: f64,
    pub blackout_fade: f64,
    pub intro_duration: f64,
    pub intro_tail_duration: f64,
    pub outro_duration: f64,
    pub outro_tail_duration: f64,
    pub preshow_duration: f64,
    pub postshow_duration: f64,
}

impl GenerateShowArgs {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let args: Self = serde_json::from_str(json)?;
        args.validate()?;
        Ok(args)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn feature_enabled(&self, name: &str) -> bool {
        self.features.get(name).copied().unwrap_or(false)
    }

    pub fn validate(&self) -> Result<()> {
        self.show.total_duration.validate("show.total_duration")?;
        self.blackout.duration.validate("blackout.duration")?;
        self.preshow.duration.validate("preshow.duration")?;
        self.postshow.duration.validate("postshow.duration")?;
        self.intro.duration.validate("intro.duration")?;
        self.outro.duration.validate("outro.duration")?;
        if let Some(tail) = &self.intro.tail {
            tail.duration.validate("intro.tail.duration")?;
        }
        if let Some(tail) = &self.outro.tail {
            tail.duration.validate("outro.tail.duration")?;
        }

        let tail_fade = |tail: &Option<TailConfig>| tail.as_ref().and_then(|tail| tail.fade);
        let fades = [
            ("blackout.fade", self.blackout.fade.unwrap_or(0.0)),
            ("preshow.fade", self.preshow.fade),
            ("postshow.fade", self.postshow.fade),
            ("intro.fade", self.intro.fade),
            ("outro.fade", self.outro.fade),
            ("intro.tail.fade", tail_fade(&self.intro.tail).unwrap_or(0.0)),
            ("outro.tail.fade", tail_fade(&self.outro.tail).unwrap_or(0.0)),
        ];
        for (what, fade) in fades {
            if !fade.is_finite() || fade < 0.0 {
                return Err(ShowGenError::invalid(format!(
                    "{what} must be a non-negative number of seconds"
                )));
            }
        }
        Ok(())
    }

    /// Samples every ranged value once, in a fixed order.
    pub fn resolve<R: Rng + ?Sized>(&self, rng: &mut R) -> ResolvedValues {
        let tail = |tail: &Option<TailConfig>, rng: &mut R| {
            tail.as_ref().map_or(0.0, |tail| tail.duration.resolve(rng))
        };
        ResolvedValues {
            total_duration: self.show.total_duration.resolve(rng),
            blackout_duration: self.blackout.duration.resolve(rng),
            blackout_fade: self.blackout.fade.unwrap_or(0.0),
            intro_duration: self.intro.duration.resolve(rng),
            intro_tail_duration: tail(&self.intro.tail, rng),
            outro_duration: self.outro.duration.resolve(rng),
            outro_tail_duration: tail(&self.outro.tail, rng),
            preshow_duration: self.preshow.duration.resolve(rng),
            postshow_duration: self.postshow.duration.resolve(rng),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_args() -> GenerateShowArgs {
    serde_json::from_value(serde_json::json!({
        "show": {
            "total_duration": 1200.0,
            "lighting_plan_ref": "plan-a",
            "show_name_ref": "evening"
        },
        "blackout": { "duration": 3.0, "fade": 1.0 },
        "intro": { "duration": 60.0, "scene": "house", "fade": 5.0, "audio_library": "lobby" },
        "outro": {
            "duration": { "min": 40.0, "max": 60.0 },
            "scene": "stage-warm",
            "fade": 5.0,
            "tail": { "duration": 20.0, "scene": "house" }
        },
        "preshow": { "count": 2, "duration": 120.0, "audio_library": "lobby" },
        "features": { "stroboscopes": true, "projection": true }
    }))
    .expect("sample args parse")
}
