//! Template catalogs.
//!
//! The built-in catalog refers to library entries by role rather than by
//! literal scene name: scene groups `wash`, `accent`, `chase` and `strobe`,
//! audio libraries `ambient` and `rhythmic`, projection inputs `quotes`.
//! Which scenes and tracks fill those roles is up to the loaded libraries.

use std::collections::HashSet;

use crate::{
    envelope::{
        periodic_events, pulse_key_frames, random_durations, standard_level, standard_level_at,
    },
    packing::{pack_intervals, PackingParams},
    random::Range,
    scene::{ProjectionCue, SceneContext, SceneData},
    template::{GenerationState, Param, SceneTemplate},
    Result, ShowGenError,
};

pub const STROBE_FEATURE: &str = "stroboscopes";
pub const PROJECTION_FEATURE: &str = "projection";

/// Remaining show time below which the finale takes over.
const FINALE_WINDOW: f64 = 180.0;
const MAX_STROBES: usize = 3;

/// An immutable, uniquely named set of templates.
#[derive(Debug, Clone)]
pub struct Catalog {
    name: String,
    templates: Vec<SceneTemplate>,
}

impl Catalog {
    pub fn new(name: impl Into<String>, templates: Vec<SceneTemplate>) -> Result<Self> {
        let mut seen = HashSet::new();
        for template in &templates {
            if !seen.insert(template.name.as_str()) {
                return Err(ShowGenError::msg(format!(
                    "template `{}` is defined twice",
                    template.name
                )));
            }
        }
        Ok(Self {
            name: name.into(),
            templates,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, name: &str) -> Result<&SceneTemplate> {
        self.templates
            .iter()
            .find(|template| template.name == name)
            .ok_or_else(|| ShowGenError::TemplateNotFound(name.to_string()))
    }

    pub fn templates(&self) -> &[SceneTemplate] {
        &self.templates
    }

    pub fn iter(&self) -> impl Iterator<Item = &SceneTemplate> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// The stock catalog: wash, accents, chase, strobe, projection and finale.
pub fn default_catalog() -> Result<Catalog> {
    Catalog::new(
        "default",
        vec![
            wash()?,
            accents()?,
            chase()?,
            strobe()?,
            projection()?,
            finale()?,
        ],
    )
}

fn fade_for(duration: f64, wanted: f64) -> f64 {
    wanted.min(duration / 4.0)
}

/// Full-length cue from the `wash` group at `amplitude`.
fn base_wash(ctx: &mut SceneContext<'_>, data: &mut SceneData, amplitude: f64) -> Result<String> {
    let duration = ctx.duration;
    let scene = ctx.pick_scene("wash")?;
    let fade = fade_for(duration, 8.0);
    let envelope = standard_level(duration, fade, fade).to_vec();
    data.push_lighting(ctx.lighting(&scene, amplitude, envelope)?);
    Ok(scene)
}

/// Back-to-back tracks of `library` covering the whole scene.
fn audio_bed(
    ctx: &mut SceneContext<'_>,
    data: &mut SceneData,
    library: &str,
    lengths: Range,
) -> Result<()> {
    let durations = random_durations(ctx.duration, lengths, &mut *ctx.rng)?;
    let mut start_time = 0.0;
    for duration in durations {
        let fade = fade_for(duration, 2.0);
        let envelope = standard_level(duration, fade, fade).to_vec();
        let cue = ctx.audio(library, start_time, duration, 0.8, envelope)?;
        data.push_audio(cue);
        start_time += duration;
    }
    Ok(())
}

fn wash() -> Result<SceneTemplate> {
    let lengths = Range::new(20.0, 45.0)?;
    Ok(SceneTemplate::new("wash", move |_, ctx| {
        let mut data = SceneData::new("wash", ctx.duration);
        let scene = base_wash(ctx, &mut data, 1.0)?;
        audio_bed(ctx, &mut data, "ambient", lengths)?;
        Ok(data.with_info(format!("slow wash on {scene}")))
    })
    .display_name("Wash")
    .weight(3.0)
    .duration(Range::new(60.0, 120.0)?))
}

fn accents() -> Result<SceneTemplate> {
    let flash = Range::new(2.0, 6.0)?;
    let lengths = Range::new(20.0, 40.0)?;
    Ok(SceneTemplate::new("accents", move |_, ctx| {
        let mut data = SceneData::new("accents", ctx.duration);
        base_wash(ctx, &mut data, 0.6)?;

        let params = PackingParams::new(ctx.duration, flash, 8)
            .margins(5.0, 5.0)
            .spacing(4.0);
        let hits = pack_intervals(&params, &mut *ctx.rng)?;
        for hit in &hits {
            let scene = ctx.pick_scene("accent")?;
            let envelope = standard_level_at(hit.duration, 0.5, 0.5, hit.start_time, 1.0);
            data.push_lighting(ctx.lighting(&scene, 0.8, envelope.to_vec())?);
        }
        audio_bed(ctx, &mut data, "ambient", lengths)?;
        Ok(data.with_info(format!("{} accents over a wash", hits.len())))
    })
    .display_name("Accents")
    .weight(2.0)
    .duration(Range::new(45.0, 90.0)?))
}

fn chase() -> Result<SceneTemplate> {
    Ok(SceneTemplate::new("chase", |_, ctx| {
        let duration = ctx.duration;
        let mut data = SceneData::new("chase", duration);
        let steps = periodic_events(duration, 8.0, 4.0, 0.0)?;
        for step in &steps {
            let scene = ctx.pick_scene("chase")?;
            let envelope = standard_level_at(step.duration, 1.0, 1.0, step.start_time, 1.0);
            data.push_lighting(ctx.lighting(&scene, 1.0, envelope.to_vec())?);
        }
        let fade = fade_for(duration, 3.0);
        let envelope = standard_level(duration, fade, fade).to_vec();
        let cue = ctx.audio("rhythmic", 0.0, duration, 1.0, envelope)?;
        data.push_audio(cue);
        Ok(data.with_info(format!("{}-step chase", steps.len())))
    })
    .display_name("Chase")
    .weight(2.0)
    .duration(Range::new(30.0, 75.0)?))
}

fn strobe() -> Result<SceneTemplate> {
    let levels = Range::new(0.0, 1.0)?;
    Ok(SceneTemplate::new("strobe", move |_, ctx| {
        let duration = ctx.duration;
        let mut data = SceneData::new("strobe", duration);
        base_wash(ctx, &mut data, 0.3)?;
        let scene = ctx.pick_scene("strobe")?;
        let envelope = pulse_key_frames(duration, 0.5, 0.05, levels, &mut *ctx.rng)?;
        data.push_lighting(ctx.lighting(&scene, 1.0, envelope)?);
        let envelope = standard_level(duration, 0.5, 0.5).to_vec();
        let cue = ctx.audio("rhythmic", 0.0, duration, 1.0, envelope)?;
        data.push_audio(cue);
        Ok(data.with_info(format!("strobe burst on {scene}")))
    })
    .display_name("Strobe")
    .requires(STROBE_FEATURE)
    .weight(Param::computed(|state| 0.5 + 2.0 * state.progress))
    .enabled(Param::computed(|state| {
        let previous_was_strobe = state
            .history
            .last()
            .is_some_and(|last| last.template_name == "strobe");
        state.history.count("strobe") < MAX_STROBES && !previous_was_strobe
    }))
    .duration(Range::new(15.0, 30.0)?))
}

fn projection() -> Result<SceneTemplate> {
    let lines = Range::new(6.0, 10.0)?;
    let lengths = Range::new(25.0, 40.0)?;
    Ok(SceneTemplate::new("projection", move |_, ctx| {
        let duration = ctx.duration;
        let mut data = SceneData::new("projection", duration);
        base_wash(ctx, &mut data, 0.5)?;

        let params = PackingParams::new(duration, lines, 4)
            .margins(3.0, 3.0)
            .spacing(5.0);
        for slot in pack_intervals(&params, &mut *ctx.rng)? {
            let text = ctx.pick_projection_text("quotes")?;
            data.push_projection(ProjectionCue::Text {
                text,
                start_time: slot.start_time,
                duration: slot.duration,
                fade: standard_level_at(slot.duration, 1.0, 1.0, slot.start_time, 1.0).to_vec(),
            });
        }
        data.push_projection(ProjectionCue::Timer {
            start_time: 0.0,
            duration,
        });
        audio_bed(ctx, &mut data, "ambient", lengths)?;
        Ok(data.with_info("projected texts over a wash"))
    })
    .display_name("Projection")
    .requires(PROJECTION_FEATURE)
    .weight(1.5)
    .duration(Range::new(40.0, 80.0)?))
}

fn finale_due(state: &GenerationState<'_>) -> bool {
    state.history.count("finale") == 0 && state.remaining <= FINALE_WINDOW
}

fn finale() -> Result<SceneTemplate> {
    let strobe_levels = Range::new(0.2, 1.0)?;
    Ok(SceneTemplate::new("finale", move |_, ctx| {
        let duration = ctx.duration;
        let mut data = SceneData::new("finale", duration);
        base_wash(ctx, &mut data, 1.0)?;
        for step in periodic_events(duration, 4.0, 2.0, 0.0)? {
            let scene = ctx.pick_scene("chase")?;
            let envelope = standard_level_at(step.duration, 0.5, 0.5, step.start_time, 1.0);
            data.push_lighting(ctx.lighting(&scene, 1.0, envelope.to_vec())?);
        }
        if ctx.feature(STROBE_FEATURE) {
            let scene = ctx.pick_scene("strobe")?;
            let envelope = pulse_key_frames(duration, 0.25, 0.0, strobe_levels, &mut *ctx.rng)?;
            data.push_lighting(ctx.lighting(&scene, 0.7, envelope)?);
        }
        let fade = fade_for(duration, 10.0);
        let envelope = standard_level(duration, fade, fade).to_vec();
        let cue = ctx.audio("rhythmic", 0.0, duration, 1.0, envelope)?;
        data.push_audio(cue);
        Ok(data.with_info("finale"))
    })
    .display_name("Finale")
    .priority(Param::computed(finale_due))
    .enabled(Param::computed(finale_due))
    .weight(0.0)
    .duration(Range::new(90.0, 150.0)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assets::sample_libraries,
        config::FeatureSet,
        envelope::value_at,
        provider::WeightedProvider,
        random::seeded,
        template::{instantiate, History},
    };

    fn build(name: &str, features: &FeatureSet, seed: u64) -> SceneData {
        let catalog = default_catalog().unwrap();
        let libraries = sample_libraries();
        let mut provider = WeightedProvider::new();
        let mut rng = seeded(seed);
        let history = History::new();
        let state = GenerationState::new(600.0, 0, 0.0, &history);
        let chosen = instantiate(catalog.get(name).unwrap(), &state);
        let duration = chosen.duration_range.sample(&mut rng);
        let mut ctx = SceneContext::new(&mut rng, &mut provider, &libraries, features, duration);
        chosen.build(&state, &mut ctx).unwrap()
    }

    #[test]
    fn default_catalog_has_unique_names() {
        let catalog = default_catalog().unwrap();
        assert_eq!(catalog.len(), 6);
        assert!(catalog.get("wash").is_ok());
        assert!(matches!(
            catalog.get("fireworks"),
            Err(ShowGenError::TemplateNotFound(ref name)) if name == "fireworks"
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let a = SceneTemplate::new("same", |_, ctx| Ok(SceneData::new("same", ctx.duration)));
        let b = a.clone();
        let err = Catalog::new("dupes", vec![a, b]).unwrap_err();
        assert!(matches!(err, ShowGenError::Message(ref m) if m.contains("`same`")));
    }

    #[test]
    fn every_template_builds_against_the_sample_libraries() {
        let features: FeatureSet = [(STROBE_FEATURE, true), (PROJECTION_FEATURE, true)]
            .into_iter()
            .map(|(name, on)| (name.to_string(), on))
            .collect();
        let catalog = default_catalog().unwrap();
        for template in catalog.iter() {
            for seed in 0..20 {
                let data = build(&template.name, &features, seed);
                assert_eq!(data.template_name, template.name);
                assert!(data.duration > 0.0);
                assert!(!data.lighting_cues().is_empty());
            }
        }
    }

    #[test]
    fn audio_bed_covers_the_scene() {
        let data = build("wash", &FeatureSet::new(), 3);
        let total: f64 = data.audio_cues().iter().map(|cue| cue.duration).sum();
        assert!((total - data.duration).abs() < 1e-6);
        for pair in data.audio_cues().windows(2) {
            assert!((pair[0].start_time + pair[0].duration - pair[1].start_time).abs() < 1e-6);
            assert_ne!(pair[0].track, pair[1].track);
        }
    }

    #[test]
    fn accent_hits_stay_inside_the_scene() {
        for seed in 0..20 {
            let data = build("accents", &FeatureSet::new(), seed);
            for cue in data.lighting_cues().iter().skip(1) {
                let last = cue.envelope.last().unwrap();
                assert!(last.time <= data.duration - 5.0 + 1e-9);
                assert_eq!(value_at(&cue.envelope, last.time + 1.0), 0.0);
            }
        }
    }

    #[test]
    fn projection_texts_come_from_the_library() {
        let data = build("projection", &FeatureSet::new(), 4);
        let quotes = sample_libraries().projection_inputs("quotes").unwrap().to_vec();
        let mut texts = 0;
        for cue in data.projection_cues() {
            if let ProjectionCue::Text { text, .. } = cue {
                assert!(quotes.contains(text));
                texts += 1;
            }
        }
        assert!(texts >= 1);
        assert!(matches!(
            data.projection_cues().last(),
            Some(ProjectionCue::Timer { .. })
        ));
    }

    #[test]
    fn finale_adds_strobes_only_when_enabled() {
        let plain = build("finale", &FeatureSet::new(), 6);
        assert!(plain
            .lighting_cues()
            .iter()
            .all(|cue| cue.scene_ref != "strobe-all"));

        let mut strobes = FeatureSet::new();
        strobes.insert(STROBE_FEATURE.to_string(), true);
        let loud = build("finale", &strobes, 6);
        assert!(loud
            .lighting_cues()
            .iter()
            .any(|cue| cue.scene_ref == "strobe-all"));
    }

    #[test]
    fn finale_becomes_priority_near_the_end() {
        let catalog = default_catalog().unwrap();
        let finale = catalog.get("finale").unwrap();
        let mut history = History::new();

        let early = instantiate(finale, &GenerationState::new(1000.0, 2, 100.0, &history));
        assert!(!early.enabled && !early.is_priority);

        let late = instantiate(finale, &GenerationState::new(1000.0, 9, 900.0, &history));
        assert!(late.enabled && late.is_priority);

        history.record("finale", 120.0);
        let after = instantiate(finale, &GenerationState::new(1000.0, 10, 950.0, &history));
        assert!(!after.enabled);
    }

    #[test]
    fn strobe_never_follows_itself() {
        let catalog = default_catalog().unwrap();
        let strobe = catalog.get("strobe").unwrap();
        let mut history = History::new();
        history.record("strobe", 20.0);
        let state = GenerationState::new(1000.0, 1, 23.0, &history);
        assert!(!instantiate(strobe, &state).enabled);
    }
}
