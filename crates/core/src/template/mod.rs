//! Scene templates and their resolution against the generation state.
//!
//! A template's selection fields are [`Param`]s: either constants or pure
//! functions of the [`GenerationState`]. Instantiation resolves all of them
//! at once; it has no side effects, so every template can be instantiated on
//! every loop iteration.

use std::{collections::HashMap, fmt, sync::Arc};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    config::FeatureSet,
    provider::weighted_index,
    random::Range,
    scene::{SceneContext, SceneData},
    Result, ShowGenError,
};

/// One entry of the generation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryElement {
    pub template_name: String,
    pub duration: f64,
}

/// What the main loop has produced so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    elements: Vec<HistoryElement>,
    counts: HashMap<String, usize>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, template_name: &str, duration: f64) {
        self.elements.push(HistoryElement {
            template_name: template_name.to_string(),
            duration,
        });
        *self.counts.entry(template_name.to_string()).or_insert(0) += 1;
    }

    /// How many times `template_name` has been placed.
    pub fn count(&self, template_name: &str) -> usize {
        self.counts.get(template_name).copied().unwrap_or(0)
    }

    pub fn elements(&self) -> &[HistoryElement] {
        &self.elements
    }

    pub fn last(&self) -> Option<&HistoryElement> {
        self.elements.last()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Read-only snapshot handed to every parametric field.
#[derive(Debug, Clone, Copy)]
pub struct GenerationState<'h> {
    pub total_duration: f64,
    pub scene_index: usize,
    pub elapsed: f64,
    pub remaining: f64,
    /// `elapsed / total_duration`, clamped to `[0, 1]`.
    pub progress: f64,
    pub history: &'h History,
}

impl<'h> GenerationState<'h> {
    pub fn new(
        total_duration: f64,
        scene_index: usize,
        elapsed: f64,
        history: &'h History,
    ) -> Self {
        let progress = if total_duration > 0.0 {
            (elapsed / total_duration).clamp(0.0, 1.0)
        } else {
            1.0
        };
        Self {
            total_duration,
            scene_index,
            elapsed,
            remaining: (total_duration - elapsed).max(0.0),
            progress,
            history,
        }
    }
}

pub type ParamFn<T> = dyn Fn(&GenerationState<'_>) -> T + Send + Sync;

/// A template field: fixed, or computed from the generation state.
pub enum Param<T> {
    Constant(T),
    Computed(Arc<ParamFn<T>>),
}

impl<T: Clone> Param<T> {
    pub fn computed(f: impl Fn(&GenerationState<'_>) -> T + Send + Sync + 'static) -> Self {
        Self::Computed(Arc::new(f))
    }

    pub fn resolve(&self, state: &GenerationState<'_>) -> T {
        match self {
            Self::Constant(value) => value.clone(),
            Self::Computed(f) => f(state),
        }
    }
}

impl<T> From<T> for Param<T> {
    fn from(value: T) -> Self {
        Self::Constant(value)
    }
}

impl<T: Clone> Clone for Param<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Constant(value) => Self::Constant(value.clone()),
            Self::Computed(f) => Self::Computed(Arc::clone(f)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Param<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

pub type SceneFn =
    dyn Fn(&GenerationState<'_>, &mut SceneContext<'_>) -> Result<SceneData> + Send + Sync;

/// Named recipe for one kind of scene.
#[derive(Clone)]
pub struct SceneTemplate {
    pub name: String,
    pub display_name: Option<String>,
    pub is_priority: Param<bool>,
    pub enabled: Param<bool>,
    pub weight: Param<f64>,
    /// Every listed feature must be enabled for the template to be eligible.
    pub required_features: Vec<String>,
    pub duration_range: Param<Range>,
    pub value: Arc<SceneFn>,
}

impl SceneTemplate {
    /// Enabled, non-priority template of weight 1 lasting one minute.
    pub fn new(
        name: impl Into<String>,
        value: impl Fn(&GenerationState<'_>, &mut SceneContext<'_>) -> Result<SceneData>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            is_priority: Param::Constant(false),
            enabled: Param::Constant(true),
            weight: Param::Constant(1.0),
            required_features: Vec::new(),
            duration_range: Param::Constant(Range::fixed(60.0)),
            value: Arc::new(value),
        }
    }

    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn priority(mut self, is_priority: impl Into<Param<bool>>) -> Self {
        self.is_priority = is_priority.into();
        self
    }

    pub fn enabled(mut self, enabled: impl Into<Param<bool>>) -> Self {
        self.enabled = enabled.into();
        self
    }

    pub fn weight(mut self, weight: impl Into<Param<f64>>) -> Self {
        self.weight = weight.into();
        self
    }

    pub fn requires(mut self, feature: impl Into<String>) -> Self {
        self.required_features.push(feature.into());
        self
    }

    pub fn duration(mut self, duration_range: impl Into<Param<Range>>) -> Self {
        self.duration_range = duration_range.into();
        self
    }

    /// Name shown to operators; falls back to the template name.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn is_available(&self, features: &FeatureSet) -> bool {
        self.required_features
            .iter()
            .all(|feature| features.get(feature).copied().unwrap_or(false))
    }
}

impl fmt::Debug for SceneTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneTemplate")
            .field("name", &self.name)
            .field("display_name", &self.display_name)
            .field("is_priority", &self.is_priority)
            .field("enabled", &self.enabled)
            .field("weight", &self.weight)
            .field("required_features", &self.required_features)
            .field("duration_range", &self.duration_range)
            .finish_non_exhaustive()
    }
}

/// A template with every selection field resolved for one state.
#[derive(Debug, Clone)]
pub struct InstantiatedTemplate<'t> {
    pub template: &'t SceneTemplate,
    pub is_priority: bool,
    pub enabled: bool,
    pub weight: f64,
    pub duration_range: Range,
}

impl InstantiatedTemplate<'_> {
    pub fn name(&self) -> &str {
        &self.template.name
    }

    /// Runs the template body.
    pub fn build(
        &self,
        state: &GenerationState<'_>,
        ctx: &mut SceneContext<'_>,
    ) -> Result<SceneData> {
        (self.template.value)(state, ctx)
    }
}

pub fn instantiate<'t>(
    template: &'t SceneTemplate,
    state: &GenerationState<'_>,
) -> InstantiatedTemplate<'t> {
    InstantiatedTemplate {
        template,
        is_priority: template.is_priority.resolve(state),
        enabled: template.enabled.resolve(state),
        weight: template.weight.resolve(state),
        duration_range: template.duration_range.resolve(state),
    }
}

/// Picks the template for the next slot.
///
/// Templates missing a required feature or disabled for `state` drop out.
/// A single priority template wins outright; two or more are a catalog bug.
/// Otherwise the winner is drawn by weight.
pub fn select_next<'t, I, R>(
    templates: I,
    features: &FeatureSet,
    state: &GenerationState<'_>,
    rng: &mut R,
) -> Result<InstantiatedTemplate<'t>>
where
    I: IntoIterator<Item = &'t SceneTemplate>,
    R: Rng + ?Sized,
{
    let mut candidates: Vec<InstantiatedTemplate<'t>> = templates
        .into_iter()
        .filter(|template| template.is_available(features))
        .map(|template| instantiate(template, state))
        .filter(|candidate| candidate.enabled)
        .collect();
    if candidates.is_empty() {
        return Err(ShowGenError::NoTemplatesRemaining);
    }

    let priorities: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, candidate)| candidate.is_priority)
        .map(|(index, _)| index)
        .collect();
    match priorities.as_slice() {
        [] => {}
        [only] => return Ok(candidates.swap_remove(*only)),
        many => {
            return Err(ShowGenError::MultiplePriorities {
                templates: many
                    .iter()
                    .map(|&index| candidates[index].name().to_string())
                    .collect(),
            })
        }
    }

    let weights: Vec<f64> = candidates.iter().map(|candidate| candidate.weight).collect();
    let index = weighted_index(&weights, rng).ok_or(ShowGenError::NoTemplateFound)?;
    Ok(candidates.swap_remove(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::seeded;

    fn template(name: &'static str) -> SceneTemplate {
        SceneTemplate::new(name, move |_, ctx| Ok(SceneData::new(name, ctx.duration)))
    }

    fn features(enabled: &[&str]) -> FeatureSet {
        enabled.iter().map(|name| (name.to_string(), true)).collect()
    }

    #[test]
    fn state_derives_progress_and_remaining() {
        let history = History::new();
        let state = GenerationState::new(200.0, 3, 50.0, &history);
        assert_eq!(state.remaining, 150.0);
        assert_eq!(state.progress, 0.25);

        let overshoot = GenerationState::new(200.0, 9, 250.0, &history);
        assert_eq!(overshoot.remaining, 0.0);
        assert_eq!(overshoot.progress, 1.0);
    }

    #[test]
    fn history_counts_occurrences() {
        let mut history = History::new();
        history.record("wash", 60.0);
        history.record("chase", 30.0);
        history.record("wash", 45.0);
        assert_eq!(history.count("wash"), 2);
        assert_eq!(history.count("strobe"), 0);
        assert_eq!(history.len(), 3);
        assert_eq!(history.last().unwrap().duration, 45.0);
    }

    #[test]
    fn instantiate_resolves_computed_fields() {
        let late_only = template("late")
            .enabled(Param::computed(|state| state.progress > 0.5))
            .weight(Param::computed(|state| 1.0 + state.scene_index as f64))
            .duration(Param::computed(|state| Range::fixed(state.remaining / 2.0)));

        let history = History::new();
        let early = instantiate(&late_only, &GenerationState::new(100.0, 0, 10.0, &history));
        assert!(!early.enabled);
        assert_eq!(early.weight, 1.0);
        assert_eq!(early.duration_range, Range::fixed(45.0));

        let late = instantiate(&late_only, &GenerationState::new(100.0, 4, 80.0, &history));
        assert!(late.enabled);
        assert_eq!(late.weight, 5.0);
        assert!(!late.is_priority);
    }

    #[test]
    fn disabled_templates_are_never_selected() {
        let templates = vec![template("off").enabled(false), template("on").weight(1.0)];
        let history = History::new();
        let state = GenerationState::new(100.0, 0, 0.0, &history);
        let mut rng = seeded(21);
        for _ in 0..1_000 {
            let chosen = select_next(&templates, &FeatureSet::new(), &state, &mut rng).unwrap();
            assert_eq!(chosen.name(), "on");
        }
    }

    #[test]
    fn feature_gates_filter_templates() {
        let templates = vec![template("strobe").requires("stroboscopes")];
        let history = History::new();
        let state = GenerationState::new(100.0, 0, 0.0, &history);
        let mut rng = seeded(0);

        let err = select_next(&templates, &FeatureSet::new(), &state, &mut rng).unwrap_err();
        assert!(matches!(err, ShowGenError::NoTemplatesRemaining));

        let mut off = FeatureSet::new();
        off.insert("stroboscopes".to_string(), false);
        assert!(select_next(&templates, &off, &state, &mut rng).is_err());

        let enabled = features(&["stroboscopes"]);
        let chosen = select_next(&templates, &enabled, &state, &mut rng).unwrap();
        assert_eq!(chosen.name(), "strobe");
    }

    #[test]
    fn a_single_priority_bypasses_weights() {
        let templates = vec![
            template("heavy").weight(1_000.0),
            template("urgent").priority(true).weight(0.0),
        ];
        let history = History::new();
        let state = GenerationState::new(100.0, 0, 0.0, &history);
        let mut rng = seeded(2);
        for _ in 0..100 {
            let chosen = select_next(&templates, &FeatureSet::new(), &state, &mut rng).unwrap();
            assert_eq!(chosen.name(), "urgent");
        }
    }

    #[test]
    fn multiple_priorities_are_rejected() {
        let templates = vec![
            template("first").priority(true),
            template("second").priority(true),
            template("quiet"),
        ];
        let history = History::new();
        let state = GenerationState::new(100.0, 0, 0.0, &history);
        let mut rng = seeded(0);
        match select_next(&templates, &FeatureSet::new(), &state, &mut rng) {
            Err(ShowGenError::MultiplePriorities { templates }) => {
                assert_eq!(templates, vec!["first".to_string(), "second".to_string()]);
            }
            other => panic!("expected MultiplePriorities, got {other:?}"),
        }
    }

    #[test]
    fn weightless_pool_reports_no_template_found() {
        let templates = vec![template("a").weight(0.0), template("b").weight(0.0)];
        let history = History::new();
        let state = GenerationState::new(100.0, 0, 0.0, &history);
        let mut rng = seeded(0);
        assert!(matches!(
            select_next(&templates, &FeatureSet::new(), &state, &mut rng),
            Err(ShowGenError::NoTemplateFound)
        ));
    }

    #[test]
    fn weighted_draw_tracks_weights() {
        let templates = vec![template("rare").weight(1.0), template("common").weight(3.0)];
        let history = History::new();
        let state = GenerationState::new(100.0, 0, 0.0, &history);
        let mut rng = seeded(77);
        let trials = 10_000;
        let common = (0..trials)
            .filter(|_| {
                select_next(&templates, &FeatureSet::new(), &state, &mut rng)
                    .unwrap()
                    .name()
                    == "common"
            })
            .count();
        let ratio = common as f64 / trials as f64;
        assert!((ratio - 0.75).abs() < 0.02, "observed {ratio}");
    }
}
