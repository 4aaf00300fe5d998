use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;

/// Why a scope fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The scope's own guard was cancelled.
    Explicit,
    /// The scope's deadline elapsed.
    Timeout,
    /// An ancestor scope fired.
    Parent,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CancelReason::Explicit => "cancel requested",
            CancelReason::Timeout => "deadline expired",
            CancelReason::Parent => "parent scope cancelled",
        };
        write!(f, "{text}")
    }
}

/// Observer half of a cancellation signal.
///
/// Clone freely: every clone observes the same signal, and
/// [`cancelled`](Self::cancelled) is built for `tokio::select!` arms.
/// The signal is one-shot and monotonic; once fired it stays fired and the
/// recorded [`CancelReason`] never changes.
///
/// # Example
///
/// ```ignore
/// let (scope, guard) = CancelScope::new();
/// tokio::select! {
///     _ = scope.cancelled() => { /* wind down */ }
///     item = queue.pop() => { /* normal path */ }
/// }
/// ```
#[derive(Clone)]
pub struct CancelScope {
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
    _timer: Option<Arc<AbortOnDropHandle<()>>>,
}

/// Authority half of a cancellation signal.
///
/// Firing is idempotent: the first cause (an explicit `cancel`, the
/// deadline, or an ancestor) wins, and later calls change nothing.
pub struct CancelGuard {
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
    _timer: Option<Arc<AbortOnDropHandle<()>>>,
}

impl CancelScope {
    /// Creates a root scope and the guard that fires it.
    pub fn new() -> (CancelScope, CancelGuard) {
        Self::build(CancellationToken::new(), None)
    }

    /// Creates a root scope that fires on its own after `timeout`.
    ///
    /// Must be called within a Tokio runtime; the deadline runs as a
    /// background task that is aborted once scope and guard are dropped.
    pub fn with_timeout(timeout: Duration) -> (CancelScope, CancelGuard) {
        Self::build(CancellationToken::new(), Some(timeout))
    }

    /// Creates a scope that also fires whenever `self` fires.
    pub fn child(&self) -> (CancelScope, CancelGuard) {
        Self::build(self.token.child_token(), None)
    }

    /// Creates a child scope with its own deadline.
    ///
    /// The child fires at whichever comes first: its deadline, its own
    /// guard, or the parent firing.
    pub fn child_with_timeout(&self, timeout: Duration) -> (CancelScope, CancelGuard) {
        Self::build(self.token.child_token(), Some(timeout))
    }

    fn build(token: CancellationToken, timeout: Option<Duration>) -> (CancelScope, CancelGuard) {
        let reason: Arc<OnceLock<CancelReason>> = Arc::new(OnceLock::new());
        let timer = timeout.map(|timeout| {
            let token = token.clone();
            let reason = reason.clone();
            Arc::new(AbortOnDropHandle::new(tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        // Record the reason before firing the token so an
                        // observer woken by the token always finds it.
                        let _ = reason.set(CancelReason::Timeout);
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            })))
        });
        let scope = CancelScope {
            token: token.clone(),
            reason: reason.clone(),
            _timer: timer.clone(),
        };
        let guard = CancelGuard {
            token,
            reason,
            _timer: timer,
        };
        (scope, guard)
    }

    /// Completes when the scope fires.
    ///
    /// Cancel-safe and reusable; if the scope already fired it completes
    /// immediately.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Returns whether the scope has fired.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns why the scope fired, or `None` while it is live.
    ///
    /// A scope fired through an ancestor reports [`CancelReason::Parent`].
    pub fn reason(&self) -> Option<CancelReason> {
        if let Some(reason) = self.reason.get() {
            return Some(*reason);
        }
        if self.token.is_cancelled() {
            return Some(CancelReason::Parent);
        }
        None
    }
}

impl fmt::Debug for CancelScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelScope")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

impl CancelGuard {
    /// Fires the scope.
    ///
    /// Idempotent: a scope that already fired (explicitly, by deadline, or
    /// through an ancestor) keeps its original reason and this call is a
    /// no-op.
    pub fn cancel(&self) {
        if self.token.is_cancelled() {
            // Fired before we got here; pin down the inferred reason so
            // later reads stay stable.
            let _ = self.reason.set(CancelReason::Parent);
            return;
        }
        let _ = self.reason.set(CancelReason::Explicit);
        self.token.cancel();
    }

    /// Returns whether the scope has fired.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl fmt::Debug for CancelGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelGuard")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_explicit_cancel() {
        let (scope, guard) = CancelScope::new();
        assert!(!scope.is_cancelled());
        assert_eq!(scope.reason(), None);

        guard.cancel();

        assert!(scope.is_cancelled());
        assert_eq!(scope.reason(), Some(CancelReason::Explicit));
        timeout(Duration::from_secs(1), scope.cancelled())
            .await
            .expect("cancelled() should complete once fired");
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let (scope, guard) = CancelScope::new();
        guard.cancel();
        guard.cancel();
        assert_eq!(scope.reason(), Some(CancelReason::Explicit));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires_on_its_own() {
        let (scope, _guard) = CancelScope::with_timeout(Duration::from_millis(100));
        assert!(!scope.is_cancelled());

        scope.cancelled().await;

        assert_eq!(scope.reason(), Some(CancelReason::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_cancel_keeps_deadline_reason() {
        let (scope, guard) = CancelScope::with_timeout(Duration::from_millis(10));
        scope.cancelled().await;

        guard.cancel();

        assert_eq!(scope.reason(), Some(CancelReason::Timeout));
    }

    #[tokio::test]
    async fn test_parent_fires_children() {
        let (parent, parent_guard) = CancelScope::new();
        let (child, _child_guard) = parent.child();
        let (grandchild, _grandchild_guard) = child.child();

        parent_guard.cancel();

        assert_eq!(parent.reason(), Some(CancelReason::Explicit));
        assert_eq!(child.reason(), Some(CancelReason::Parent));
        assert_eq!(grandchild.reason(), Some(CancelReason::Parent));
        timeout(Duration::from_secs(1), grandchild.cancelled())
            .await
            .expect("descendants observe the parent firing");
    }

    #[tokio::test]
    async fn test_child_cancel_leaves_parent_live() {
        let (parent, _parent_guard) = CancelScope::new();
        let (child, child_guard) = parent.child();

        child_guard.cancel();

        assert!(child.is_cancelled());
        assert_eq!(child.reason(), Some(CancelReason::Explicit));
        assert!(!parent.is_cancelled());
        assert_eq!(parent.reason(), None);
    }

    #[tokio::test]
    async fn test_guard_cancel_after_parent_reports_parent() {
        let (parent, parent_guard) = CancelScope::new();
        let (child, child_guard) = parent.child();

        parent_guard.cancel();
        child_guard.cancel();

        assert_eq!(child.reason(), Some(CancelReason::Parent));
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_deadline_beats_idle_parent() {
        let (parent, _parent_guard) = CancelScope::new();
        let (child, _child_guard) = parent.child_with_timeout(Duration::from_millis(50));

        child.cancelled().await;

        assert_eq!(child.reason(), Some(CancelReason::Timeout));
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_clones_share_the_signal() {
        let (scope, guard) = CancelScope::new();
        let observer = scope.clone();
        let waiter = tokio::spawn(async move { observer.cancelled().await });

        guard.cancel();

        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("clone observes the signal")
            .unwrap();
    }
}
