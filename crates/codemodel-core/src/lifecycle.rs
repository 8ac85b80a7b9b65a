//! Per-node lifecycle: lazy population and irreversible freezing.
//!
//! Population follows `New -> Initializing -> Initialized`. A population hook
//! that fails moves the node to `Failed`, which is terminal: later attempts
//! report [`ModelError::IllegalState`] instead of retrying. The frozen flag is
//! orthogonal and monotonic.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Population state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitState {
    /// Not yet populated. Only external views start here.
    New,
    /// The population hook is running.
    Initializing,
    /// Fully materialized.
    Initialized,
    /// The population hook raised; the node is unusable.
    Failed,
}

/// Lifecycle controller embedded in every node and container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lifecycle {
    state: InitState,
    frozen: bool,
}

impl Lifecycle {
    /// A lifecycle that still has to run its population hook.
    pub fn pending() -> Self {
        Lifecycle {
            state: InitState::New,
            frozen: false,
        }
    }

    /// A lifecycle with nothing to populate (authored nodes and copies).
    pub fn ready() -> Self {
        Lifecycle {
            state: InitState::Initialized,
            frozen: false,
        }
    }

    pub fn state(&self) -> InitState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state == InitState::Initialized
    }

    /// Enters population.
    ///
    /// Returns `Ok(true)` when the caller must run the population hook and
    /// then call [`finish`](Self::finish) or [`fail`](Self::fail),
    /// `Ok(false)` when the node is already initialized.
    pub fn begin(&mut self) -> Result<bool, ModelError> {
        match self.state {
            InitState::Initialized => Ok(false),
            InitState::New => {
                self.state = InitState::Initializing;
                Ok(true)
            }
            InitState::Initializing => Err(ModelError::illegal_state(
                "re-entrant initialization: node accessed from its own population hook",
            )),
            InitState::Failed => Err(ModelError::illegal_state(
                "initialization previously failed; node is unusable",
            )),
        }
    }

    pub fn finish(&mut self) -> Result<(), ModelError> {
        if self.state != InitState::Initializing {
            return Err(ModelError::illegal_state(format!(
                "finish called in state {:?}",
                self.state
            )));
        }
        self.state = InitState::Initialized;
        Ok(())
    }

    pub fn fail(&mut self) {
        self.state = InitState::Failed;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Sets the frozen flag. Freezing data that was never loaded is refused.
    pub fn freeze(&mut self) -> Result<(), ModelError> {
        if self.state != InitState::Initialized {
            return Err(ModelError::illegal_state(format!(
                "cannot freeze before data is loaded (state {:?})",
                self.state
            )));
        }
        self.frozen = true;
        Ok(())
    }
}
