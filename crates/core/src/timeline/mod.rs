//! Show assembly: intro, the main scene loop, outro and the filler blocks.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use rand::{seq::SliceRandom, RngCore};
use serde::{Deserialize, Serialize};

use crate::{
    assets::{ChannelSegment, Libraries},
    catalog::Catalog,
    config::{BookendConfig, FillerConfig, GenerateShowArgs, ResolvedValues},
    envelope::{standard_level, standard_level_at, KeyFrame},
    provider::WeightedProvider,
    scene::{AudioCue, LightingCue, SceneContext, SceneData, TrackRef},
    template::{select_next, GenerationState, History, SceneTemplate},
    Result, ShowGenError,
};

/// Cooperative cancellation shared between a generation and its caller.
///
/// Checked once per main-loop iteration, between scene selections.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One named entry of a show: a bookend, a main scene or a filler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowScene {
    pub name: String,
    pub display_name: String,
    /// Absolute start on the block this scene belongs to, in seconds.
    pub start_time: f64,
    /// Master level applied on top of every cue of a scene that is followed
    /// by a blackout. It drops to zero over the final `blackout.fade` seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_envelope: Option<Vec<KeyFrame>>,
    #[serde(flatten)]
    pub data: SceneData,
}

impl ShowScene {
    fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        start_time: f64,
        data: SceneData,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            start_time,
            master_envelope: None,
            data,
        }
    }

    fn fading_into_blackout(mut self, fade: f64) -> Self {
        self.master_envelope = Some(blackout_fade_envelope(self.data.duration, fade));
        self
    }
}

/// Full level for `duration`, except a linear drop to zero over the last
/// `fade` seconds. The fade is clamped to the duration.
pub fn blackout_fade_envelope(duration: f64, fade: f64) -> Vec<KeyFrame> {
    let fade = fade.clamp(0.0, duration.max(0.0));
    vec![
        KeyFrame::new(0.0, 1.0),
        KeyFrame::new(duration - fade, 1.0),
        KeyFrame::new(duration, 0.0),
    ]
}

/// Lighting that stays on for the whole show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticElement {
    pub scene_ref: String,
    pub amplitude: f64,
    pub raw_channel_segments: Vec<ChannelSegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationInfo {
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub args: GenerateShowArgs,
    pub resolved: ResolvedValues,
}

/// A generated show, ready for persistence or playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Show {
    pub generation_info: GenerationInfo,
    #[serde(rename = "static")]
    pub static_elements: Vec<StaticElement>,
    pub preshow: Vec<ShowScene>,
    pub postshow: Vec<ShowScene>,
    /// `Intro`, `Scene-01`, ..., `Outro`, in playback order.
    pub scenes: Vec<ShowScene>,
}

impl Show {
    /// Main-loop scenes only, without the bookends.
    pub fn main_scenes(&self) -> &[ShowScene] {
        match self.scenes.len() {
            0..=2 => &[],
            len => &self.scenes[1..len - 1],
        }
    }

    /// End of the outro on the main timeline.
    pub fn end_time(&self) -> f64 {
        self.scenes
            .last()
            .map_or(0.0, |scene| scene.start_time + scene.data.duration)
    }
}

/// Builds shows from one catalog against one set of libraries.
///
/// The generator holds no per-show state: every [`ShowGenerator::generate`]
/// call gets its own provider memory and history.
#[derive(Debug, Clone)]
pub struct ShowGenerator<'a> {
    catalog: &'a Catalog,
    libraries: &'a Libraries,
    cancel: CancelFlag,
    timestamp: Option<u64>,
    seed: Option<u64>,
}

impl<'a> ShowGenerator<'a> {
    pub fn new(catalog: &'a Catalog, libraries: &'a Libraries) -> Self {
        Self {
            catalog,
            libraries,
            cancel: CancelFlag::new(),
            timestamp: None,
            seed: None,
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Pins the recorded timestamp, for reproducible output.
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Seed to record in the generation info. It does not seed `rng`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Runs one full generation. Any failure aborts it without a show.
    #[tracing::instrument(skip_all, fields(catalog = self.catalog.name(), seed = ?self.seed))]
    pub fn generate(&self, args: &GenerateShowArgs, rng: &mut dyn RngCore) -> Result<Show> {
        args.validate()?;
        self.libraries.validate()?;
        for name in &args.disabled_templates {
            self.catalog.get(name)?;
        }

        let resolved = args.resolve(&mut *rng);
        tracing::info!(
            total_duration = resolved.total_duration,
            blackout = resolved.blackout_duration,
            "generating show"
        );

        let mut provider = WeightedProvider::new();
        let static_elements = self.static_elements(args)?;
        let preshow = self.fillers(
            "Preshow",
            &args.preshow,
            resolved.preshow_duration,
            &mut *rng,
        )?;
        let scenes = self.assemble_timeline(args, &resolved, &mut provider, &mut *rng)?;
        let postshow = self.fillers(
            "Postshow",
            &args.postshow,
            resolved.postshow_duration,
            &mut *rng,
        )?;

        let timestamp = self.timestamp.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or_default()
        });
        let show = Show {
            generation_info: GenerationInfo {
                timestamp,
                seed: self.seed,
                args: args.clone(),
                resolved,
            },
            static_elements,
            preshow,
            postshow,
            scenes,
        };
        tracing::info!(
            scenes = show.main_scenes().len(),
            end_time = show.end_time(),
            "show generated"
        );
        Ok(show)
    }

    /// Intro, the selected main scenes and the outro, with absolute start
    /// times.
    ///
    /// The main loop keeps its own clock starting at zero: it runs while that
    /// clock is below `resolved.total_duration`, so the last scene may
    /// overshoot. Scenes are never truncated.
    pub fn assemble_timeline(
        &self,
        args: &GenerateShowArgs,
        resolved: &ResolvedValues,
        provider: &mut WeightedProvider,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<ShowScene>> {
        let disabled: HashSet<&str> =
            args.disabled_templates.iter().map(String::as_str).collect();
        let templates: Vec<&SceneTemplate> = self
            .catalog
            .iter()
            .filter(|template| !disabled.contains(template.name.as_str()))
            .collect();
        let blackout = resolved.blackout_duration;
        let blackout_fade = resolved.blackout_fade;

        let mut scenes = Vec::new();
        let intro = self.bookend(
            "intro",
            &args.intro,
            resolved.intro_duration,
            resolved.intro_tail_duration,
            args,
            provider,
            &mut *rng,
        )?;
        let mut offset = intro.duration + blackout;
        let intro = ShowScene::new("Intro", "Intro", 0.0, intro);
        scenes.push(intro.fading_into_blackout(blackout_fade));

        let total = resolved.total_duration;
        let mut history = History::new();
        let mut elapsed = 0.0;
        let mut scene_index = 0;
        while elapsed < total {
            if self.cancel.is_cancelled() {
                tracing::info!(scenes_built = scene_index, "generation cancelled");
                return Err(ShowGenError::Cancelled {
                    scenes_built: scene_index,
                });
            }

            let state = GenerationState::new(total, scene_index, elapsed, &history);
            let chosen =
                select_next(templates.iter().copied(), &args.features, &state, &mut *rng)?;
            let duration = chosen.duration_range.sample(&mut *rng);
            let data = {
                let mut ctx = SceneContext::new(
                    &mut *rng,
                    &mut *provider,
                    self.libraries,
                    &args.features,
                    duration,
                );
                chosen.build(&state, &mut ctx)?
            };

            let step = data.duration + blackout;
            if !(step > 0.0) {
                return Err(format!(
                    "template `{}` produced a scene that does not advance the show",
                    chosen.name()
                )
                .into());
            }
            tracing::debug!(
                index = scene_index,
                template = chosen.name(),
                duration = data.duration,
                elapsed,
                "scene selected"
            );

            scene_index += 1;
            let template = chosen.template;
            history.record(&template.name, data.duration);
            let name = format!("Scene-{scene_index:02}");
            scenes.push(
                ShowScene::new(name, template.label(), offset, data)
                    .fading_into_blackout(blackout_fade),
            );
            offset += step;
            elapsed += step;
        }

        let outro = self.bookend(
            "outro",
            &args.outro,
            resolved.outro_duration,
            resolved.outro_tail_duration,
            args,
            provider,
            &mut *rng,
        )?;
        scenes.push(ShowScene::new("Outro", "Outro", offset, outro));
        Ok(scenes)
    }

    #[allow(clippy::too_many_arguments)]
    fn bookend(
        &self,
        kind: &str,
        config: &BookendConfig,
        duration: f64,
        tail_duration: f64,
        args: &GenerateShowArgs,
        provider: &mut WeightedProvider,
        rng: &mut dyn RngCore,
    ) -> Result<SceneData> {
        let mut ctx = SceneContext::new(rng, provider, self.libraries, &args.features, duration);
        let mut data = SceneData::new(kind, duration + tail_duration);

        let fade = config.fade.min(duration / 2.0);
        let envelope = standard_level(duration, fade, fade).to_vec();
        data.push_lighting(ctx.lighting(&config.scene, 1.0, envelope)?);

        if let Some(library) = &config.audio_library {
            let envelope = standard_level(duration, fade, fade).to_vec();
            let cue = ctx.audio(library, 0.0, duration, 1.0, envelope)?;
            data.push_audio(cue);
        }

        if let Some(tail) = &config.tail {
            let tail_fade = tail.fade.unwrap_or(config.fade).min(tail_duration / 2.0);
            let envelope = standard_level_at(tail_duration, tail_fade, tail_fade, duration, 1.0);
            data.push_lighting(ctx.lighting(&tail.scene, 1.0, envelope.to_vec())?);
        }

        tracing::debug!(kind, duration, tail_duration, "bookend built");
        Ok(data.with_info(format!("{kind} on {}", config.scene)))
    }

    fn static_elements(&self, args: &GenerateShowArgs) -> Result<Vec<StaticElement>> {
        args.static_scenes
            .iter()
            .map(|scene_ref| {
                Ok(StaticElement {
                    scene_ref: scene_ref.clone(),
                    amplitude: 1.0,
                    raw_channel_segments: self.libraries.scene(scene_ref)?.to_vec(),
                })
            })
            .collect()
    }

    /// `config.count` back-to-back filler scenes named `{label}-NN`.
    ///
    /// Scenes and tracks are shuffled once, then handed out round-robin.
    fn fillers(
        &self,
        label: &str,
        config: &FillerConfig,
        duration: f64,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<ShowScene>> {
        if config.count == 0 {
            return Ok(Vec::new());
        }

        let mut pool: Vec<String> = if config.scenes.is_empty() {
            self.libraries.scene_names().map(str::to_string).collect()
        } else {
            config.scenes.clone()
        };
        if pool.is_empty() {
            return Err(ShowGenError::no_candidates(label.to_lowercase()));
        }
        pool.shuffle(&mut *rng);

        let mut tracks = Vec::new();
        if let Some(library) = &config.audio_library {
            let count = self.libraries.track_count(library)?;
            if count == 0 {
                return Err(ShowGenError::no_candidates(format!("audio:{library}")));
            }
            tracks = (0..count)
                .map(|index| TrackRef {
                    library: library.clone(),
                    index,
                })
                .collect();
            tracks.shuffle(&mut *rng);
        }

        let fade = config.fade.min(duration / 2.0);
        let mut scenes = Vec::with_capacity(config.count);
        for i in 0..config.count {
            let scene_ref = &pool[i % pool.len()];
            let mut data = SceneData::new(label.to_lowercase(), duration);
            data.push_lighting(LightingCue {
                scene_ref: scene_ref.clone(),
                amplitude: 1.0,
                envelope: standard_level(duration, fade, fade).to_vec(),
                raw_channel_segments: self.libraries.scene(scene_ref)?.to_vec(),
            });
            if let Some(track) = tracks.get(i % tracks.len().max(1)) {
                data.push_audio(AudioCue {
                    track: track.clone(),
                    start_time: 0.0,
                    duration,
                    amplitude: 1.0,
                    volume_envelope: standard_level(duration, fade, fade).to_vec(),
                });
            }
            let info = format!("{label} filler on {scene_ref}");
            scenes.push(ShowScene::new(
                format!("{label}-{:02}", i + 1),
                label,
                i as f64 * duration,
                data.with_info(info),
            ));
        }
        tracing::debug!(label, count = scenes.len(), duration, "fillers built");
        Ok(scenes)
    }
}
