//! Error classification shared by the controller and the UI layer.

/// Broad error category, one per failure origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Token,
    Media,
    Signaling,
    Channel,
    Parse,
    Validation,
    Timeout,
    Configuration,
    Network,
    Search,
    State,
    Internal,
}

/// What the caller can do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Press connect again once the cause is fixed.
    Reconnect,
    /// Grant microphone access or plug in a device.
    CheckMicrophone,
    /// Fix the input (modalities, query) and try again.
    FixInput,
    /// Check backend URLs and credentials.
    CheckConfiguration,
    /// Nothing to do; the stream keeps going.
    Ignore,
}
