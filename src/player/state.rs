//! Pipeline state management

/// Public state of the media pipeline.
///
/// Owned exclusively by the lifecycle controller; mutated only in response to
/// bus events or explicit stop/play requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No state pending yet
    Void,
    /// Torn down to idle
    Null,
    /// Built and able to accept a render target
    Ready,
    Paused,
    Playing,
    Error,
}

impl PipelineState {
    /// Numeric code reported through the host callback interface.
    ///
    /// 0 = unknown/pending, 1 = stopped, 2 = ready, 3 = paused, 4 = playing,
    /// -1 = unknown.
    pub fn code(&self) -> i32 {
        match self {
            PipelineState::Void => 0,
            PipelineState::Null => 1,
            PipelineState::Ready => 2,
            PipelineState::Paused => 3,
            PipelineState::Playing => 4,
            PipelineState::Error => -1,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PipelineState::Void => "Void",
            PipelineState::Null => "Null",
            PipelineState::Ready => "Ready",
            PipelineState::Paused => "Paused",
            PipelineState::Playing => "Playing",
            PipelineState::Error => "Error",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}
