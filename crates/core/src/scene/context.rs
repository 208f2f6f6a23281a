use rand::RngCore;

use crate::{
    assets::Libraries,
    config::FeatureSet,
    envelope::KeyFrame,
    provider::{Collection, ProviderItem, WeightedProvider},
    Result, ShowGenError,
};

use super::{AudioCue, LightingCue, TrackRef};

/// Everything a template body may draw on while building its [`SceneData`].
///
/// The context borrows the generation's random source and provider, so the
/// anti-repeat memory spans every scene of one show.
///
/// [`SceneData`]: super::SceneData
pub struct SceneContext<'a> {
    pub rng: &'a mut dyn RngCore,
    pub provider: &'a mut WeightedProvider,
    pub libraries: &'a Libraries,
    pub features: &'a FeatureSet,
    /// Duration sampled for the scene under construction, in seconds.
    pub duration: f64,
}

impl<'a> SceneContext<'a> {
    pub fn new(
        rng: &'a mut dyn RngCore,
        provider: &'a mut WeightedProvider,
        libraries: &'a Libraries,
        features: &'a FeatureSet,
        duration: f64,
    ) -> Self {
        Self {
            rng,
            provider,
            libraries,
            features,
            duration,
        }
    }

    pub fn feature(&self, name: &str) -> bool {
        self.features.get(name).copied().unwrap_or(false)
    }

    /// Picks a scene id from the named scene group.
    pub fn pick_scene(&mut self, group: &str) -> Result<String> {
        let collection = self
            .libraries
            .group(group)?
            .to_collection(&format!("group:{group}"));
        let scene = self.provider.select(&collection, &mut *self.rng)?;
        Ok(scene.clone())
    }

    /// Picks a track of the named audio library, avoiding an immediate repeat.
    pub fn pick_track(&mut self, library: &str) -> Result<TrackRef> {
        let count = self.libraries.track_count(library)?;
        let collection = Collection::new(
            format!("audio:{library}"),
            (0..count)
                .map(|index| {
                    ProviderItem::leaf(format!("{library}#{index}"), 1.0, index).non_chaining()
                })
                .collect(),
        );
        let index = *self.provider.select(&collection, &mut *self.rng)?;
        Ok(TrackRef {
            library: library.to_string(),
            index,
        })
    }

    /// Picks one of the candidate strings registered under `key`.
    pub fn pick_projection_text(&mut self, key: &str) -> Result<String> {
        let inputs = self.libraries.projection_inputs(key)?;
        let collection = Collection::new(
            format!("projection:{key}"),
            inputs
                .iter()
                .map(|text| ProviderItem::leaf(text.as_str(), 1.0, text.clone()).non_chaining())
                .collect(),
        );
        let text = self.provider.select(&collection, &mut *self.rng)?;
        Ok(text.clone())
    }

    /// Lighting cue for `scene_ref` carrying the scene's channel segments.
    pub fn lighting(
        &self,
        scene_ref: &str,
        amplitude: f64,
        envelope: Vec<KeyFrame>,
    ) -> Result<LightingCue> {
        let segments = self.libraries.scene(scene_ref)?;
        Ok(LightingCue {
            scene_ref: scene_ref.to_string(),
            amplitude,
            envelope,
            raw_channel_segments: segments.to_vec(),
        })
    }

    /// Audio cue playing a freshly picked track of `library`.
    pub fn audio(
        &mut self,
        library: &str,
        start_time: f64,
        duration: f64,
        amplitude: f64,
        volume_envelope: Vec<KeyFrame>,
    ) -> Result<AudioCue> {
        if duration < 0.0 {
            return Err(ShowGenError::invalid(format!(
                "audio cue duration must not be negative, got {duration}"
            )));
        }
        let track = self.pick_track(library)?;
        Ok(AudioCue {
            track,
            start_time,
            duration,
            amplitude,
            volume_envelope,
        })
    }
}

impl std::fmt::Debug for SceneContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneContext")
            .field("provider", &self.provider)
            .field("features", &self.features)
            .field("duration", &self.duration)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::sample_libraries;
    use crate::random::seeded;

    #[test]
    fn picks_scenes_tracks_and_texts_from_the_libraries() {
        let libraries = sample_libraries();
        let features = FeatureSet::new();
        let mut provider = WeightedProvider::new();
        let mut rng = seeded(12);
        let mut ctx = SceneContext::new(&mut rng, &mut provider, &libraries, &features, 30.0);

        let scene = ctx.pick_scene("wash").unwrap();
        assert!(libraries.scene(&scene).is_ok());

        let track = ctx.pick_track("ambient").unwrap();
        assert!(track.index < libraries.track_count("ambient").unwrap());

        let text = ctx.pick_projection_text("quotes").unwrap();
        assert!(libraries.projection_inputs("quotes").unwrap().contains(&text));

        let cue = ctx.lighting(&scene, 0.5, Vec::new()).unwrap();
        assert_eq!(cue.raw_channel_segments, libraries.scene(&scene).unwrap());
    }

    #[test]
    fn consecutive_tracks_never_repeat() {
        let libraries = sample_libraries();
        let features = FeatureSet::new();
        let mut provider = WeightedProvider::new();
        let mut rng = seeded(5);
        let mut ctx = SceneContext::new(&mut rng, &mut provider, &libraries, &features, 30.0);

        let mut previous = None;
        for _ in 0..50 {
            let track = ctx.pick_track("ambient").unwrap();
            assert_ne!(Some(track.index), previous);
            previous = Some(track.index);
        }
    }

    #[test]
    fn unknown_references_name_the_offender() {
        let libraries = sample_libraries();
        let features = FeatureSet::new();
        let mut provider = WeightedProvider::new();
        let mut rng = seeded(0);
        let mut ctx = SceneContext::new(&mut rng, &mut provider, &libraries, &features, 30.0);

        let err = ctx.lighting("ghost", 1.0, Vec::new()).unwrap_err();
        assert!(err.to_string().contains("ghost"));
        assert!(matches!(
            ctx.pick_track("silence"),
            Err(ShowGenError::AudioLibraryNotFound(_))
        ));
        assert!(matches!(
            ctx.pick_scene("nowhere"),
            Err(ShowGenError::SceneGroupNotFound(_))
        ));
    }
}
