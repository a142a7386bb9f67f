//! Per-call execution context: deadline, cancellation, and request values.

use std::time::{Duration, Instant};

use hashbrown::HashMap;
use tokio_util::sync::CancellationToken;

use crate::persist::DriverError;

/// Carries deadline and cancellation state through one pipeline run.
///
/// Hooks and drivers receive it by reference and must not retain it.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    /// Tokens inherited from every ancestor; any one cancels the context.
    cancel: Vec<CancellationToken>,
    values: HashMap<String, String>,
}

impl Context {
    /// A context with no deadline that is never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    /// Returns a copy that expires after `timeout`.
    ///
    /// An existing earlier deadline is kept.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            deadline: Some(deadline),
            ..self.clone()
        }
    }

    /// Returns a copy that is also cancelled by `token`.
    ///
    /// Cancelling this context's ancestors still cancels the copy.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        let mut cancel = self.cancel.clone();
        cancel.push(token);
        Self {
            cancel,
            ..self.clone()
        }
    }

    /// Returns a copy with `key` bound to `value`.
    pub fn with_value(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut values = self.values.clone();
        values.insert(key.into(), value.into());
        Self {
            values,
            ..self.clone()
        }
    }

    /// Value bound to `key` by this context or an ancestor.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Earliest deadline along the ancestry, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// True once any inherited token is cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.iter().any(CancellationToken::is_cancelled)
    }

    /// Reports why the context is no longer usable, if it is not.
    pub fn err(&self) -> Option<DriverError> {
        if self.is_cancelled() {
            return Some(DriverError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(DriverError::DeadlineExceeded),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_copied_not_shared() {
        let base = Context::background().with_value("actor", "alice");
        let child = base.with_value("actor", "bob").with_value("trace", "t1");

        assert_eq!(base.value("actor"), Some("alice"));
        assert_eq!(base.value("trace"), None);
        assert_eq!(child.value("actor"), Some("bob"));
        assert_eq!(child.value("trace"), Some("t1"));
    }

    #[test]
    fn earlier_deadline_wins() {
        let short = Context::background().with_timeout(Duration::from_millis(10));
        let long = short.with_timeout(Duration::from_secs(60));
        assert_eq!(long.deadline(), short.deadline());

        let expired = Context::background().with_timeout(Duration::ZERO);
        assert!(matches!(expired.err(), Some(DriverError::DeadlineExceeded)));
        assert_eq!(expired.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn cancellation_is_reported_before_deadline() {
        let token = CancellationToken::new();
        let ctx = Context::background()
            .with_timeout(Duration::ZERO)
            .with_cancellation(token.clone());
        token.cancel();
        assert!(matches!(ctx.err(), Some(DriverError::Cancelled)));
        assert!(Context::background().err().is_none());
    }

    #[test]
    fn parent_cancellation_reaches_derived_contexts() {
        let parent_token = CancellationToken::new();
        let parent = Context::background().with_cancellation(parent_token.clone());
        let own = CancellationToken::new();
        let child = parent.with_cancellation(own.clone()).with_value("k", "v");

        parent_token.cancel();
        assert!(child.is_cancelled());
        assert!(matches!(child.err(), Some(DriverError::Cancelled)));
    }

    #[test]
    fn child_cancellation_stays_below_the_parent() {
        let parent = Context::background().with_cancellation(CancellationToken::new());
        let own = CancellationToken::new();
        let child = parent.with_cancellation(own.clone());

        own.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }
}
