use std::fmt;

/// The kind of consent a flow asks the payer to authorise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    /// One payment of a fixed amount.
    Single,
    /// Recurring arrangement that can be drawn down many times.
    Enduring,
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => f.write_str("single"),
            Self::Enduring => f.write_str("enduring"),
        }
    }
}

/// The consent currently being processed.
///
/// Only a successful consent creation produces one, and at most one is live
/// at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowIdentity {
    pub consent_id: String,
    pub kind: FlowKind,
}

impl FlowIdentity {
    pub fn new(consent_id: impl Into<String>, kind: FlowKind) -> Self {
        Self {
            consent_id: consent_id.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowPhase {
    #[default]
    Idle,
    CreatingConsent,
    AwaitingRedirect,
    Verifying,
    Error,
}

impl fmt::Display for FlowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::CreatingConsent => "creating_consent",
            Self::AwaitingRedirect => "awaiting_redirect",
            Self::Verifying => "verifying",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of the flow handed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlowSnapshot {
    pub phase: FlowPhase,
    pub identity: Option<FlowIdentity>,
    /// User-facing message, set only in [`FlowPhase::Error`].
    pub error: Option<String>,
}

/// Notifications emitted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    StateChanged(FlowSnapshot),
    UserMessage { success: bool, message: String },
}

/// "The user has returned", as delivered by a deep link.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResumeSignal {
    pub consent_id: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl ResumeSignal {
    pub fn for_consent(consent_id: impl Into<String>) -> Self {
        Self {
            consent_id: Some(consent_id.into()),
            ..Self::default()
        }
    }

    pub fn with_error(mut self, error: impl Into<String>, description: Option<String>) -> Self {
        self.error = Some(error.into());
        self.error_description = description;
        self
    }
}
