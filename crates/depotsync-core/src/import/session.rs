// Import session lifecycle as an explicit state machine.
//
// `SessionState::apply` is the only place transitions happen. It performs
// no I/O: side effects come back as an `Effect` for the caller to carry out,
// followed by `Created` or `Cleared` once they are done.

/// Lifecycle of the remote import session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No live session; the next `Ensure` creates one.
    #[default]
    NoSession,
    /// A session this client created.
    Active { session_id: String },
    /// A session supplied from outside. Never created, never restarted.
    BackgroundActive { session_id: String },
    /// A restart is draining; the close event goes to `recovery_id`.
    RestartRequested { recovery_id: Option<String> },
}

/// Inputs to the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    /// A live session is wanted.
    Ensure,
    /// The backend created a session with this id.
    Created(String),
    /// Start the wizard over with a fresh session.
    Restart,
    /// The close event for a restart has been sent.
    Cleared,
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    CreateSession,
    EmitClose { recovery_id: Option<String> },
}

/// Result of applying one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: SessionState,
    pub effect: Option<Effect>,
}

impl Transition {
    fn stay(state: SessionState) -> Self {
        Self {
            next: state,
            effect: None,
        }
    }
}

impl SessionState {
    /// Id for normal sends, if a session is live.
    pub fn live_id(&self) -> Option<&str> {
        match self {
            Self::Active { session_id } | Self::BackgroundActive { session_id } => {
                Some(session_id)
            }
            Self::NoSession | Self::RestartRequested { .. } => None,
        }
    }

    pub fn apply(self, input: SessionInput) -> Transition {
        use SessionInput as In;

        match (self, input) {
            // Creation is requested but the state only moves once the id is known.
            (Self::NoSession, In::Ensure) => Transition {
                next: Self::NoSession,
                effect: Some(Effect::CreateSession),
            },
            (Self::NoSession | Self::Active { .. }, In::Created(session_id)) => {
                Transition::stay(Self::Active { session_id })
            }

            (Self::Active { session_id }, In::Restart) => {
                let recovery_id = Some(session_id);
                Transition {
                    next: Self::RestartRequested {
                        recovery_id: recovery_id.clone(),
                    },
                    effect: Some(Effect::EmitClose { recovery_id }),
                }
            }
            (Self::NoSession, In::Restart) => Transition {
                next: Self::RestartRequested { recovery_id: None },
                effect: Some(Effect::EmitClose { recovery_id: None }),
            },
            (Self::RestartRequested { .. }, In::Cleared) => Transition::stay(Self::NoSession),

            // Background sessions are owned elsewhere.
            (state @ Self::BackgroundActive { .. }, _) => Transition::stay(state),

            // A creation that lands while a restart drains belongs to the old run.
            (state @ Self::RestartRequested { .. }, In::Created(_)) => Transition::stay(state),

            (state, _) => Transition::stay(state),
        }
    }
}
