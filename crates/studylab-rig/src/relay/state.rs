use serde::Serialize;
use strum::{AsRefStr, Display};

/// Lifecycle of a [`StreamRelay`](super::StreamRelay).
///
/// ```text
/// Init -> Streaming -> Finalizing -> Done
///   \________\______________\-----> Error
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RelayState {
    /// No event received yet.
    #[default]
    Init,
    /// Translating agent events.
    Streaming,
    /// Emitting enrichments, usage and `end`.
    Finalizing,
    /// Finished normally.
    Done,
    /// Failed; an `error` chunk was emitted.
    Error,
}

impl RelayState {
    /// Returns true for [`Done`](Self::Done) and [`Error`](Self::Error).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Returns whether `next` may follow this state.
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Self::Error) => true,
            (Self::Init, Self::Streaming | Self::Finalizing) => true,
            (Self::Streaming, Self::Streaming | Self::Finalizing) => true,
            (Self::Finalizing, Self::Done) => true,
            _ => false,
        }
    }
}
