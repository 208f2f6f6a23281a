//! Core library for the show generator.
//!
//! A show is assembled from a catalog of scene templates and a set of
//! read-only libraries (lighting scenes, audio tracks, projection texts).
//! Each module owns one stage of that pipeline: sampling primitives,
//! envelopes, interval packing, weighted selection, template resolution and
//! finally the timeline assembler that strings everything together.

pub mod assets;
pub mod catalog;
pub mod config;
pub mod envelope;
pub mod error;
pub mod packing;
pub mod provider;
pub mod random;
pub mod scene;
pub mod template;
pub mod timeline;

pub use assets::{ChannelSegment, Libraries};
pub use catalog::{default_catalog, Catalog};
pub use config::{FeatureSet, GenerateShowArgs, ResolvedValues};
pub use envelope::{KeyFrame, StartAndDuration};
pub use error::{Result, ShowGenError};
pub use packing::{pack_intervals, PackingParams};
pub use provider::{Collection, ProviderItem, WeightedProvider};
pub use random::Range;
pub use scene::{SceneContext, SceneData, ScenesGroup};
pub use template::{GenerationState, History, Param, SceneTemplate};
pub use timeline::{CancelFlag, Show, ShowGenerator, ShowScene};
