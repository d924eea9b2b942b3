//! Per-connection state machine:
//!
//! ```text
//! Disconnected -> HelloSent -> HelloAcked -> Ready -> Draining -> Closed
//!                                   |                      |
//!                                Rejected               Faulted
//! ```

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SessionState {
    Disconnected,
    HelloSent,
    HelloAcked,
    Ready,
    Draining,
    Closed,
    Rejected,
    Faulted,
}

/// An attempted move that the state machine does not allow. This
/// indicates a logic bug in the caller, not a peer fault, so callers
/// treat it as fatal rather than recoverable.
#[derive(Debug)]
pub struct IllegalTransition {
    pub from: SessionState,
    pub to: SessionState,
}

impl std::fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "illegal session transition {:?} -> {:?}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Validates and applies moves against the diagram above.
#[derive(Debug)]
pub struct Transition {
    state: SessionState,
}

impl Transition {
    pub fn new() -> Self {
        Transition { state: SessionState::Disconnected }
    }

    pub fn current(&self) -> SessionState {
        self.state
    }

    pub fn apply(&mut self, to: SessionState) -> Result<(), IllegalTransition> {
        use SessionState::*;
        let legal = matches!(
            (self.state, to),
            (Disconnected, HelloSent)
                | (HelloSent, HelloAcked)
                | (HelloSent, Rejected)
                | (HelloAcked, Ready)
                | (Ready, Draining)
                | (Ready, Faulted)
                | (Draining, Closed)
                | (Faulted, Closed)
                | (Rejected, Closed)
                // a session may always be torn down, from any live state
                | (Disconnected, Closed)
                | (HelloSent, Closed)
                | (HelloAcked, Closed)
                | (Ready, Closed)
        );
        if legal {
            self.state = to;
            Ok(())
        } else {
            Err(IllegalTransition { from: self.state, to })
        }
    }
}

impl Default for Transition {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    #[test]
    fn happy_path_reaches_ready() {
        let mut t = Transition::new();
        t.apply(HelloSent).unwrap();
        t.apply(HelloAcked).unwrap();
        t.apply(Ready).unwrap();
        assert_eq!(t.current(), Ready);
    }

    #[test]
    fn rejected_hello_cannot_reach_ready() {
        let mut t = Transition::new();
        t.apply(HelloSent).unwrap();
        t.apply(Rejected).unwrap();
        assert!(t.apply(Ready).is_err());
    }

    #[test]
    fn two_decode_failures_drive_faulted_from_ready() {
        let mut t = Transition::new();
        t.apply(HelloSent).unwrap();
        t.apply(HelloAcked).unwrap();
        t.apply(Ready).unwrap();
        t.apply(Faulted).unwrap();
        t.apply(Closed).unwrap();
        assert_eq!(t.current(), Closed);
    }

    #[test]
    fn skipping_hello_acked_is_illegal() {
        let mut t = Transition::new();
        t.apply(HelloSent).unwrap();
        let err = t.apply(Ready).unwrap_err();
        assert_eq!(err.from, HelloSent);
        assert_eq!(err.to, Ready);
    }
}
