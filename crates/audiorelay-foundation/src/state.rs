use crate::error::AppError;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;

/// Lifecycle of one capture session.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureState {
    Idle,
    Initializing,
    Capturing,
    Stopped,
}

pub struct StateManager {
    state: Arc<RwLock<CaptureState>>,
    state_tx: Sender<CaptureState>,
    state_rx: Receiver<CaptureState>,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StateManager {
    pub fn new() -> Self {
        let (state_tx, state_rx) = crossbeam_channel::unbounded();
        Self {
            state: Arc::new(RwLock::new(CaptureState::Idle)),
            state_tx,
            state_rx,
        }
    }

    pub fn transition(&self, new_state: CaptureState) -> Result<(), AppError> {
        let mut current = self.state.write();

        let valid = matches!(
            (&*current, &new_state),
            (CaptureState::Idle, CaptureState::Initializing)
                | (CaptureState::Initializing, CaptureState::Capturing)
                | (CaptureState::Initializing, CaptureState::Stopped)
                | (CaptureState::Capturing, CaptureState::Stopped)
        );

        if !valid {
            return Err(AppError::Fatal(format!(
                "Invalid state transition: {:?} -> {:?}",
                *current, new_state
            )));
        }

        tracing::info!("State transition: {:?} -> {:?}", *current, new_state);
        *current = new_state.clone();
        let _ = self.state_tx.send(new_state);
        Ok(())
    }

    pub fn current(&self) -> CaptureState {
        self.state.read().clone()
    }

    pub fn subscribe(&self) -> Receiver<CaptureState> {
        self.state_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_lifecycle_is_valid() {
        let mgr = StateManager::new();
        assert_eq!(mgr.current(), CaptureState::Idle);
        mgr.transition(CaptureState::Initializing).unwrap();
        mgr.transition(CaptureState::Capturing).unwrap();
        mgr.transition(CaptureState::Stopped).unwrap();
        assert_eq!(mgr.current(), CaptureState::Stopped);
    }

    #[test]
    fn failed_init_can_stop() {
        let mgr = StateManager::new();
        mgr.transition(CaptureState::Initializing).unwrap();
        mgr.transition(CaptureState::Stopped).unwrap();
    }

    #[test]
    fn skipping_states_is_rejected() {
        let mgr = StateManager::new();
        assert!(mgr.transition(CaptureState::Capturing).is_err());
        assert!(mgr.transition(CaptureState::Stopped).is_err());
        assert_eq!(mgr.current(), CaptureState::Idle);
    }

    #[test]
    fn subscribers_observe_transitions() {
        let mgr = StateManager::new();
        let rx = mgr.subscribe();
        mgr.transition(CaptureState::Initializing).unwrap();
        mgr.transition(CaptureState::Capturing).unwrap();
        assert_eq!(rx.try_recv().unwrap(), CaptureState::Initializing);
        assert_eq!(rx.try_recv().unwrap(), CaptureState::Capturing);
    }
}
