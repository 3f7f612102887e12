//! Relay session identity and lifecycle state.

use std::fmt;

/// Lifecycle of a relay session.
///
/// `Starting -> Streaming -> {Completed | Aborted}`, plus `Starting -> Aborted`
/// when the client is gone before streaming begins. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Starting,
    Streaming,
    Completed,
    Aborted,
}

impl RelayState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Starting, Self::Streaming | Self::Aborted)
                | (Self::Streaming, Self::Completed | Self::Aborted)
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One forwarding operation: an id, its state and the chunk counter.
#[derive(Debug)]
pub struct RelaySession {
    id: String,
    conversation_id: Option<String>,
    state: RelayState,
    sequence_index: u64,
}

impl RelaySession {
    /// New session with a random id.
    pub fn new(conversation_id: Option<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), conversation_id)
    }

    pub const fn with_id(id: String, conversation_id: Option<String>) -> Self {
        Self {
            id,
            conversation_id,
            state: RelayState::Starting,
            sequence_index: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub const fn state(&self) -> RelayState {
        self.state
    }

    /// Number of chunk frames issued so far.
    pub const fn sequence_index(&self) -> u64 {
        self.sequence_index
    }

    /// Move to `next`. Returns `false` and leaves the state untouched when the
    /// transition is not allowed.
    pub fn advance(&mut self, next: RelayState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        true
    }

    /// Claim the index for the next chunk frame (first chunk is 1).
    pub const fn next_index(&mut self) -> u64 {
        self.sequence_index += 1;
        self.sequence_index
    }
}
