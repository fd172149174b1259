//! Lifecycle state of a supervised process.
//!
//! `NotStarted -> Running -> {Exited(code) | Killed}`. The terminal state is
//! recorded once and never changes afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use verdict_common::{ProcessError, ProcessResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    NotStarted,
    Running,
    /// Exited on its own. Negative codes are the terminating signal on Unix.
    Exited(i32),
    /// Stopped by the supervisor.
    Killed,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::NotStarted => write!(f, "not_started"),
            ProcessState::Running => write!(f, "running"),
            ProcessState::Exited(code) => write!(f, "exited({})", code),
            ProcessState::Killed => write!(f, "killed"),
        }
    }
}

impl ProcessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Exited(_) | ProcessState::Killed)
    }
}

/// A recorded transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: ProcessState,
    pub to_state: ProcessState,
    pub timestamp: DateTime<Utc>,
}

/// Guards the lifecycle of one process.
#[derive(Debug, Clone)]
pub struct ProcessStateMachine {
    process_id: String,
    current_state: ProcessState,
    history: Vec<StateTransition>,
}

impl ProcessStateMachine {
    pub fn new(process_id: &str) -> Self {
        Self {
            process_id: process_id.to_string(),
            current_state: ProcessState::NotStarted,
            history: Vec::new(),
        }
    }

    pub fn current_state(&self) -> ProcessState {
        self.current_state
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    pub fn is_valid_transition(&self, target: ProcessState) -> bool {
        matches!(
            (self.current_state, target),
            (ProcessState::NotStarted, ProcessState::Running)
                | (ProcessState::Running, ProcessState::Exited(_))
                | (ProcessState::Running, ProcessState::Killed)
        )
    }

    pub fn transition_to(&mut self, target: ProcessState) -> ProcessResult<()> {
        if !self.is_valid_transition(target) {
            return Err(ProcessError::invalid_state(
                &self.process_id,
                target.to_string(),
                self.current_state.to_string(),
            ));
        }

        self.history.push(StateTransition {
            from_state: self.current_state,
            to_state: target,
            timestamp: Utc::now(),
        });
        tracing::debug!(
            "Process {} transitioned from {} to {}",
            self.process_id,
            self.current_state,
            target
        );
        self.current_state = target;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_lifecycle() {
        let mut machine = ProcessStateMachine::new("server");
        assert_eq!(machine.current_state(), ProcessState::NotStarted);

        machine.transition_to(ProcessState::Running).unwrap();
        machine.transition_to(ProcessState::Exited(3)).unwrap();

        assert_eq!(machine.current_state(), ProcessState::Exited(3));
        assert_eq!(machine.history().len(), 2);
        assert!(machine.current_state().is_terminal());
    }

    #[test]
    fn test_terminal_state_is_set_once() {
        let mut machine = ProcessStateMachine::new("server");
        machine.transition_to(ProcessState::Running).unwrap();
        machine.transition_to(ProcessState::Killed).unwrap();

        let err = machine.transition_to(ProcessState::Exited(0)).unwrap_err();
        assert!(matches!(err, ProcessError::InvalidState { .. }));
        assert!(machine.transition_to(ProcessState::Killed).is_err());
        assert_eq!(machine.current_state(), ProcessState::Killed);
    }

    #[test]
    fn test_cannot_exit_before_running() {
        let mut machine = ProcessStateMachine::new("server");
        assert!(!machine.is_valid_transition(ProcessState::Exited(0)));
        assert!(machine.transition_to(ProcessState::Killed).is_err());
    }
}
