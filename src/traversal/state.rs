use serde::{Deserialize, Serialize};

/// The three-state stackless traversal automaton (Hapala et al.), plus
/// `None` meaning "no traversal in progress" (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutomatonState {
    None,
    FromParent,
    FromSibling,
    FromChild,
}

/// A suspended traversal's resumption token: which node we were at, and
/// which automaton state to resume in. Carried inside a `FatRay` so it is
/// serializable across the network (`spec.md` §9: "the token must be
/// serialisable").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalState {
    pub current: u32,
    pub state: AutomatonState,
}

impl Default for TraversalState {
    fn default() -> Self {
        Self {
            current: 0,
            state: AutomatonState::None,
        }
    }
}

impl TraversalState {
    pub fn is_in_progress(&self) -> bool {
        self.state != AutomatonState::None
    }

    pub fn start() -> Self {
        Self {
            current: 0,
            state: AutomatonState::FromParent,
        }
    }
}
