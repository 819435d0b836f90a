/// Result alias that carries the custom [`ShowGenError`] type.
pub type Result<T> = std::result::Result<T, ShowGenError>;

/// Common error type for the show generation engine.
///
/// Every domain variant is terminal: causes are deterministic properties of the
/// input data, so nothing in the pipeline retries on them.
#[derive(Debug, thiserror::Error)]
pub enum ShowGenError {
    /// The audio analysis payload failed boundary validation.
    #[error("invalid analysis: {0}")]
    InvalidAnalysis(String),
    /// Two fixtures claim overlapping DMX channels in the same universe.
    #[error("fixture conflict: {0}")]
    FixtureConflict(String),
    /// A single fixture entry is malformed on its own.
    #[error("invalid fixture: {0}")]
    InvalidFixture(String),
    /// The color palette is empty, malformed, or misses a referenced color.
    #[error("invalid palette: {0}")]
    InvalidPalette(String),
    /// The cue scheduler produced nothing to build a show from.
    #[error("no cues were scheduled; the analysis contains no beats")]
    EmptyCueSet,
    /// The assembled workspace is internally inconsistent or cannot be parsed.
    #[error("serialization error: {0}")]
    SerializationError(String),
    /// Internal consistency failure outside the serializer.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around JSON payload errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Wrapper around XML reader and writer errors.
    #[error("{0}")]
    Xml(#[from] quick_xml::Error),
}

impl ShowGenError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Stable name of the error kind, used in log fields and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidAnalysis(_) => "InvalidAnalysis",
            Self::FixtureConflict(_) => "FixtureConflict",
            Self::InvalidFixture(_) => "InvalidFixture",
            Self::InvalidPalette(_) => "InvalidPalette",
            Self::EmptyCueSet => "EmptyCueSet",
            Self::SerializationError(_) => "SerializationError",
            Self::Message(_) => "Message",
            Self::Io(_) => "Io",
            Self::Json(_) => "Json",
            Self::Xml(_) => "Xml",
        }
    }
}

impl From<quick_xml::events::attributes::AttrError> for ShowGenError {
    fn from(value: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml(value.into())
    }
}

impl From<&str> for ShowGenError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for ShowGenError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
