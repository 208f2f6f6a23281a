/// Result alias that carries the custom [`ShowGenError`] type.
pub type Result<T> = std::result::Result<T, ShowGenError>;

/// Common error type for the core crate.
///
/// Every failure aborts the generation call that raised it; there is no
/// partial show. Callers that want another attempt simply generate again.
#[derive(Debug, thiserror::Error)]
pub enum ShowGenError {
    /// Free-form message for conditions that have no dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Malformed primitive input such as an inverted range.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// More than one enabled template claimed priority for the same slot.
    #[error("multiple priority templates enabled at once: {}", .templates.join(", "))]
    MultiplePriorities { templates: Vec<String> },
    #[error("scene `{0}` not found in the scene library")]
    SceneNotFound(String),
    #[error("scene group `{0}` not found in the scene library")]
    SceneGroupNotFound(String),
    #[error("template `{0}` not found in the catalog")]
    TemplateNotFound(String),
    #[error("audio library `{0}` not found")]
    AudioLibraryNotFound(String),
    #[error("projection input `{0}` not found")]
    ProjectionInputNotFound(String),

    /// Feature gates and `enabled` flags filtered out every template.
    #[error("no templates remaining after filtering")]
    NoTemplatesRemaining,
    /// A weighted selection ran over an empty or zero-weight pool.
    #[error("no candidates to select from in collection `{collection}`")]
    NoCandidates { collection: String },
    #[error("weighted template draw did not land on any template")]
    NoTemplateFound,

    /// The interval packer could not place an event it had already counted.
    #[error(
        "packing invariant violated at event {index}: lower bound {lower_bound} > upper bound {upper_bound}"
    )]
    PackingInvariant {
        index: usize,
        lower_bound: f64,
        upper_bound: f64,
    },

    #[error("generation cancelled after {scenes_built} scenes")]
    Cancelled { scenes_built: usize },

    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl ShowGenError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn invalid<T: Into<String>>(msg: T) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub(crate) fn no_candidates(collection: impl Into<String>) -> Self {
        Self::NoCandidates {
            collection: collection.into(),
        }
    }
}

impl From<String> for ShowGenError {
    fn from(value: String) -> Self {
        Self::msg(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiple_priorities_names_every_template() {
        let err = ShowGenError::MultiplePriorities {
            templates: vec!["finale".to_string(), "opener".to_string()],
        };
        let text = err.to_string();
        assert!(text.contains("finale"));
        assert!(text.contains("opener"));
    }

    #[test]
    fn converts_from_strings() {
        let err: ShowGenError = String::from("boom").into();
        assert!(matches!(err, ShowGenError::Message(ref m) if m == "boom"));
    }
}
