//! Per-orchestrator action state.
//!
//! Each orchestrator owns one [`ActionSlot`]. Transitions are pure functions on
//! [`ActionState`]; the slot only serializes them. At most one attempt is in
//! flight per slot, and a success stays put until [`ActionSlot::reset`].

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::FlowError;

/// Message recorded when an in-flight action is dropped before finishing.
pub const ABANDONED: &str = "action abandoned before completion";

/// Where an orchestrator's action stands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ActionState<T> {
    /// Nothing has run, or the last result was reset.
    #[default]
    Idle,
    /// An attempt is in flight.
    Pending,
    /// The last attempt succeeded.
    Succeeded(T),
    /// The last attempt failed with this message. A new attempt may start.
    Failed(String),
}

impl<T> ActionState<T> {
    /// The state a new attempt moves to, or why it may not start.
    ///
    /// # Errors
    ///
    /// [`FlowError::Busy`] while pending, [`FlowError::AlreadyCompleted`] after success.
    pub fn begin(&self) -> Result<Self, FlowError> {
        match self {
            Self::Idle | Self::Failed(_) => Ok(Self::Pending),
            Self::Pending => Err(FlowError::Busy),
            Self::Succeeded(_) => Err(FlowError::AlreadyCompleted),
        }
    }

    /// The state an attempt with `outcome` leaves behind.
    #[must_use]
    pub fn complete(outcome: &Result<T, FlowError>) -> Self
    where
        T: Clone,
    {
        match outcome {
            Ok(value) => Self::Succeeded(value.clone()),
            Err(err) => Self::Failed(err.to_string()),
        }
    }

    /// The state after an explicit reset.
    ///
    /// # Errors
    ///
    /// [`FlowError::Busy`] while pending; an in-flight attempt cannot be reset.
    pub fn reset(&self) -> Result<Self, FlowError> {
        match self {
            Self::Pending => Err(FlowError::Busy),
            _ => Ok(Self::Idle),
        }
    }

    /// Whether an attempt is in flight.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// The successful result, if any.
    #[must_use]
    pub const fn result(&self) -> Option<&T> {
        match self {
            Self::Succeeded(value) => Some(value),
            _ => None,
        }
    }

    /// The failure message, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed(message) => Some(message),
            _ => None,
        }
    }
}

/// Owns one orchestrator's [`ActionState`].
#[derive(Debug)]
pub struct ActionSlot<T> {
    state: Mutex<ActionState<T>>,
}

impl<T: Clone> Default for ActionSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> ActionSlot<T> {
    /// Creates an idle slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ActionState::Idle),
        }
    }

    /// A snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> ActionState<T> {
        self.lock().clone()
    }

    /// Clears a finished result so a new attempt may start.
    ///
    /// # Errors
    ///
    /// [`FlowError::Busy`] while an attempt is in flight.
    pub fn reset(&self) -> Result<(), FlowError> {
        let mut state = self.lock();
        *state = state.reset()?;
        Ok(())
    }

    /// Runs `action` as this slot's single in-flight attempt.
    ///
    /// The slot is marked pending before `action` is first polled and records
    /// the outcome when it finishes. Dropping the returned future early marks
    /// the slot failed, never leaving it pending.
    ///
    /// # Errors
    ///
    /// [`FlowError::Busy`] or [`FlowError::AlreadyCompleted`] if the attempt may
    /// not start; otherwise whatever `action` returns.
    pub async fn run<F>(&self, action: F) -> Result<T, FlowError>
    where
        F: Future<Output = Result<T, FlowError>>,
    {
        let guard = self.begin()?;
        let outcome = action.await;
        guard.finish(&outcome);
        outcome
    }

    fn begin(&self) -> Result<PendingGuard<'_, T>, FlowError> {
        let mut state = self.lock();
        *state = state.begin()?;
        Ok(PendingGuard {
            slot: self,
            finished: false,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ActionState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct PendingGuard<'a, T: Clone> {
    slot: &'a ActionSlot<T>,
    finished: bool,
}

impl<T: Clone> PendingGuard<'_, T> {
    fn finish(mut self, outcome: &Result<T, FlowError>) {
        *self.slot.lock() = ActionState::complete(outcome);
        self.finished = true;
    }
}

impl<T: Clone> Drop for PendingGuard<'_, T> {
    fn drop(&mut self) {
        if !self.finished {
            *self.slot.lock() = ActionState::Failed(ABANDONED.to_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_transitions() {
        let idle: ActionState<u8> = ActionState::Idle;
        assert_eq!(idle.begin().unwrap(), ActionState::Pending);
        assert!(matches!(ActionState::<u8>::Pending.begin(), Err(FlowError::Busy)));
        assert!(matches!(
            ActionState::Succeeded(1u8).begin(),
            Err(FlowError::AlreadyCompleted)
        ));
        assert_eq!(
            ActionState::<u8>::Failed("x".into()).begin().unwrap(),
            ActionState::Pending
        );
        assert_eq!(ActionState::complete(&Ok(3u8)), ActionState::Succeeded(3));
        assert_eq!(
            ActionState::<u8>::complete(&Err(FlowError::Validation("bad".into()))).error(),
            Some("invalid input: bad")
        );
        assert!(ActionState::<u8>::Pending.reset().is_err());
    }

    #[tokio::test]
    async fn test_success_is_kept_until_reset() {
        let slot = ActionSlot::new();
        assert_eq!(slot.run(async { Ok(5u8) }).await.unwrap(), 5);
        assert_eq!(slot.state().result(), Some(&5));
        assert!(matches!(
            slot.run(async { Ok(6u8) }).await,
            Err(FlowError::AlreadyCompleted)
        ));

        slot.reset().unwrap();
        assert_eq!(slot.state(), ActionState::Idle);
        assert_eq!(slot.run(async { Ok(6u8) }).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_failure_allows_a_fresh_attempt() {
        let slot: ActionSlot<u8> = ActionSlot::new();
        let err = slot
            .run(async { Err(FlowError::Validation("empty name".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Validation(_)));
        assert!(slot.state().error().is_some());
        assert_eq!(slot.run(async { Ok(1) }).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_attempt_is_rejected() {
        let slot: ActionSlot<u8> = ActionSlot::new();
        let (release, wait) = tokio::sync::oneshot::channel::<()>();

        let first = slot.run(async {
            wait.await.ok();
            Ok(1)
        });
        let second = async {
            tokio::task::yield_now().await;
            let busy = slot.run(async { Ok(2) }).await;
            release.send(()).ok();
            busy
        };
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first.unwrap(), 1);
        assert!(matches!(second, Err(FlowError::Busy)));
    }

    #[tokio::test]
    async fn test_abandoned_attempt_is_recoverable() {
        let slot: ActionSlot<u8> = ActionSlot::new();
        let hung = slot.run(std::future::pending());
        assert!(
            tokio::time::timeout(Duration::from_millis(10), hung)
                .await
                .is_err()
        );

        assert_eq!(slot.state().error(), Some(ABANDONED));
        assert_eq!(slot.run(async { Ok(9) }).await.unwrap(), 9);
    }
}
