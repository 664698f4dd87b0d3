use crate::types::BackendKind;

/// Failures surfaced by the carousel. Only `InitializationFailure` is fatal;
/// everything else is logged, emitted as an error event, and recovered.
#[derive(Debug, thiserror::Error)]
pub enum CarouselError {
    #[error("no rendering backend could be initialised: {0}")]
    InitializationFailure(String),
    #[error("{backend} backend failed to initialise: {message}")]
    BackendUnavailable { backend: BackendKind, message: String },
    #[error("shader compilation failed for effect '{effect}': {message}")]
    ShaderCompileFailure { effect: String, message: String },
    #[error("shader link failed for effect '{effect}': {message}")]
    ShaderLinkFailure { effect: String, message: String },
    #[error("failed to decode image '{url}': {message}")]
    ImageDecodeFailure { url: String, message: String },
    #[error("effect '{effect}' needs capabilities the {backend} backend lacks; using '{fallback}'")]
    UnsupportedEffectCapability {
        effect: String,
        backend: BackendKind,
        fallback: String,
    },
    #[error("draw failed during transition {from} -> {to}: {message}")]
    DrawTimeFailure {
        from: usize,
        to: usize,
        message: String,
    },
    #[error("surface error: {0}")]
    Surface(String),
    #[error(transparent)]
    Effect(#[from] effects::EffectError),
}

impl CarouselError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, CarouselError::InitializationFailure(_))
    }
}

pub type Result<T, E = CarouselError> = std::result::Result<T, E>;
