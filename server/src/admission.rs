//! Bounded admission control with cooperative shutdown
//!
//! The [`AdmissionGate`] limits how many clients are served at once. Callers
//! that find no free permit wait inside [`AdmissionGate::acquire`] until one
//! is released, their optional timeout elapses, or the gate is shut down.
//!
//! Shutdown closes the underlying semaphore, which wakes every pending waiter
//! at once; no polling interval is involved. Permits are owned values, so a
//! permit can only be released once and is returned even if the holder
//! unwinds.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Why an admission request did not produce a permit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Shutdown,
    TimedOut,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::Shutdown => write!(f, "server shutdown"),
            DenyReason::TimedOut => write!(f, "admission timeout"),
        }
    }
}

/// Result of [`AdmissionGate::acquire`]
#[derive(Debug)]
pub enum Admission {
    Granted(AdmissionPermit),
    Denied(DenyReason),
}

impl Admission {
    pub fn is_granted(&self) -> bool {
        matches!(self, Admission::Granted(_))
    }
}

/// One slot of server capacity
///
/// Dropping the permit releases it; [`AdmissionPermit::release`] does the
/// same thing explicitly.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionPermit {
    pub fn release(self) {}
}

/// Counting gate limiting concurrently admitted clients
#[derive(Debug)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    waiting: AtomicUsize,
}

/// Keeps the waiting counter honest on every exit path, including a
/// cancelled acquire future
struct WaitingGuard<'a> {
    waiting: &'a AtomicUsize,
}

impl<'a> WaitingGuard<'a> {
    fn enter(waiting: &'a AtomicUsize) -> Self {
        waiting.fetch_add(1, Ordering::SeqCst);
        Self { waiting }
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.waiting.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AdmissionGate {
    /// Creates a gate with `capacity` permits
    ///
    /// The capacity is clamped to `1..=Semaphore::MAX_PERMITS`; a gate that
    /// can never admit anyone would turn every connection into a waiter.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            waiting: AtomicUsize::new(0),
        }
    }

    /// Waits for a permit
    ///
    /// Resolves to [`Admission::Denied`] if the gate is shut down before or
    /// during the wait, or if `timeout` elapses first.
    pub async fn acquire(&self, timeout: Option<Duration>) -> Admission {
        if self.is_shutdown() {
            return Admission::Denied(DenyReason::Shutdown);
        }
        // A free permit is taken without counting the caller as a waiter
        if let Some(permit) = self.try_acquire() {
            return Admission::Granted(permit);
        }

        let _waiting = WaitingGuard::enter(&self.waiting);
        let acquire = Arc::clone(&self.semaphore).acquire_owned();

        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, acquire).await {
                Ok(result) => result,
                Err(_) => return Admission::Denied(DenyReason::TimedOut),
            },
            None => acquire.await,
        };

        match result {
            // Shutdown may have raced with the grant; it wins
            Ok(_) if self.is_shutdown() => Admission::Denied(DenyReason::Shutdown),
            Ok(permit) => Admission::Granted(AdmissionPermit { _permit: permit }),
            Err(_) => Admission::Denied(DenyReason::Shutdown),
        }
    }

    /// Takes a permit only if one is free right now
    pub fn try_acquire(&self) -> Option<AdmissionPermit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| AdmissionPermit { _permit: permit })
    }

    /// Denies all current and future acquire calls; idempotent
    pub fn shutdown(&self) {
        self.semaphore.close();
    }

    pub fn is_shutdown(&self) -> bool {
        self.semaphore.is_closed()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Number of permits currently held
    pub fn active(&self) -> usize {
        self.capacity.saturating_sub(self.available_permits())
    }

    /// Snapshot of callers blocked in `acquire`; for observability only
    pub fn waiting_count(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::{sleep, Instant};
    use tokio_test::{assert_pending, assert_ready, task};

    async fn wait_for_waiters(gate: &AdmissionGate, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while gate.waiting_count() != count {
            assert!(Instant::now() < deadline, "waiters never reached {}", count);
            sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn test_gate_creation() {
        let gate = AdmissionGate::new(3);
        assert_eq!(gate.capacity(), 3);
        assert_eq!(gate.available_permits(), 3);
        assert_eq!(gate.active(), 0);
        assert_eq!(gate.waiting_count(), 0);
        assert!(!gate.is_shutdown());
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let gate = AdmissionGate::new(0);
        assert_eq!(gate.capacity(), 1);
    }

    #[test]
    fn test_oversized_capacity_is_clamped() {
        let gate = AdmissionGate::new(usize::MAX);
        assert_eq!(gate.capacity(), Semaphore::MAX_PERMITS);
        assert_eq!(gate.available_permits(), Semaphore::MAX_PERMITS);
    }

    #[test]
    fn test_free_permit_is_granted_without_waiting() {
        let gate = AdmissionGate::new(1);

        let mut acquire = task::spawn(gate.acquire(None));
        let admission = assert_ready!(acquire.poll());
        assert!(admission.is_granted());
        assert_eq!(gate.waiting_count(), 0);
        assert!(gate.try_acquire().is_none());
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let gate = AdmissionGate::new(2);

        let first = gate.acquire(None).await;
        assert!(first.is_granted());
        assert_eq!(gate.available_permits(), 1);
        assert_eq!(gate.active(), 1);

        if let Admission::Granted(permit) = first {
            permit.release();
        }
        assert_eq!(gate.available_permits(), 2);
        assert_eq!(gate.waiting_count(), 0);
    }

    #[test]
    fn test_acquire_blocks_until_release() {
        let gate = AdmissionGate::new(1);
        let held = gate.try_acquire().unwrap();

        let mut waiter = task::spawn(gate.acquire(None));
        assert_pending!(waiter.poll());
        assert_eq!(gate.waiting_count(), 1);

        held.release();
        assert!(waiter.is_woken());

        let admission = assert_ready!(waiter.poll());
        assert!(admission.is_granted());
        assert_eq!(gate.waiting_count(), 0);
        assert_eq!(gate.available_permits(), 0);

        drop(admission);
        assert_eq!(gate.available_permits(), 1);
    }

    #[test]
    fn test_dropped_acquire_decrements_waiting() {
        let gate = AdmissionGate::new(1);
        let _held = gate.try_acquire().unwrap();

        let mut waiter = task::spawn(gate.acquire(None));
        assert_pending!(waiter.poll());
        assert_eq!(gate.waiting_count(), 1);

        drop(waiter);
        assert_eq!(gate.waiting_count(), 0);
    }

    #[test]
    fn test_shutdown_wakes_pending_waiter() {
        let gate = AdmissionGate::new(1);
        let _held = gate.try_acquire().unwrap();

        let mut waiter = task::spawn(gate.acquire(None));
        assert_pending!(waiter.poll());

        gate.shutdown();
        assert!(waiter.is_woken());

        let admission = assert_ready!(waiter.poll());
        assert!(matches!(admission, Admission::Denied(DenyReason::Shutdown)));
        assert_eq!(gate.waiting_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shutdown_denies_all_waiters() {
        let gate = Arc::new(AdmissionGate::new(1));
        let held = gate.try_acquire().unwrap();

        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                tokio::spawn(async move { gate.acquire(None).await })
            })
            .collect();

        wait_for_waiters(&gate, 8).await;
        gate.shutdown();

        for waiter in waiters {
            let admission = tokio::time::timeout(Duration::from_millis(200), waiter)
                .await
                .expect("waiter not released by shutdown")
                .unwrap();
            assert!(matches!(admission, Admission::Denied(DenyReason::Shutdown)));
        }

        assert_eq!(gate.waiting_count(), 0);

        // Releasing after shutdown must not let anyone in
        held.release();
        assert!(gate.try_acquire().is_none());
        assert!(matches!(
            gate.acquire(None).await,
            Admission::Denied(DenyReason::Shutdown)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let gate = AdmissionGate::new(2);
        gate.shutdown();
        gate.shutdown();
        assert!(gate.is_shutdown());
        assert!(!gate.acquire(None).await.is_granted());
        assert_eq!(gate.waiting_count(), 0);
    }

    #[tokio::test]
    async fn test_acquire_timeout() {
        let gate = AdmissionGate::new(1);
        let _held = gate.try_acquire().unwrap();

        let started = Instant::now();
        let admission = gate.acquire(Some(Duration::from_millis(50))).await;
        assert!(matches!(admission, Admission::Denied(DenyReason::TimedOut)));
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(gate.waiting_count(), 0);
    }

    #[tokio::test]
    async fn test_acquire_with_timeout_succeeds_when_free() {
        let gate = AdmissionGate::new(1);
        let admission = gate.acquire(Some(Duration::from_millis(50))).await;
        assert!(admission.is_granted());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_capacity_never_exceeded() {
        let capacity = 3;
        let gate = Arc::new(AdmissionGate::new(capacity));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..40)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    if let Admission::Granted(permit) = gate.acquire(None).await {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        sleep(Duration::from_millis(2)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        permit.release();
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= capacity);
        assert_eq!(gate.available_permits(), capacity);
        assert_eq!(gate.waiting_count(), 0);
    }
}
