//
// scheduler.rs
//
// Debounced reload trigger
//

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// The deferred work a [`ReloadScheduler`] runs when it fires
pub type ReloadAction = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Collapses bursts of triggers into a single deferred action.
///
/// The first `trigger` arms a timer; further triggers while armed are
/// no-ops and do not push the deadline back. When the timer fires the
/// scheduler disarms and then runs the action once, so a trigger that
/// arrives while the action is running arms the next cycle.
pub struct ReloadScheduler {
    delay: Duration,
    action: ReloadAction,
    armed: Arc<Mutex<Option<CancellationToken>>>,
}

impl ReloadScheduler {
    pub fn new(delay: Duration, action: ReloadAction) -> Self {
        Self {
            delay,
            action,
            armed: Arc::new(Mutex::new(None)),
        }
    }

    pub fn from_fn<F, Fut>(delay: Duration, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::new(delay, Arc::new(move || Box::pin(f())))
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arm the timer unless it is already armed. Returns whether this call armed it.
    pub fn trigger(&self) -> bool {
        let token = {
            let Ok(mut armed) = self.armed.lock() else {
                return false;
            };
            if armed.is_some() {
                log::trace!("Reload already scheduled; coalescing trigger");
                return false;
            }
            let token = CancellationToken::new();
            *armed = Some(token.clone());
            token
        };

        let slot = self.armed.clone();
        let action = self.action.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => { return; }
                _ = tokio::time::sleep(delay) => {}
            }

            // Disarm under the lock so a concurrent cancel either wins or sees nothing armed
            {
                let Ok(mut armed) = slot.lock() else {
                    return;
                };
                if token.is_cancelled() {
                    return;
                }
                *armed = None;
            }

            log::trace!("Reload debounce elapsed; running reload");
            action().await;
        });

        log::trace!("Reload scheduled in {:?}", self.delay);
        true
    }

    /// Discard an armed-but-not-fired action. Returns whether one was armed.
    pub fn cancel(&self) -> bool {
        let token = self.armed.lock().ok().and_then(|mut armed| armed.take());
        match token {
            Some(token) => {
                token.cancel();
                log::trace!("Cancelled scheduled reload");
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.lock().map(|a| a.is_some()).unwrap_or(false)
    }
}

impl Drop for ReloadScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_scheduler(delay_ms: u64) -> (ReloadScheduler, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let scheduler = ReloadScheduler::from_fn(Duration::from_millis(delay_ms), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        (scheduler, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_delay() {
        let (scheduler, fired) = counting_scheduler(50);
        assert!(scheduler.trigger());
        assert!(scheduler.is_armed());

        tokio::time::sleep(Duration::from_millis(49)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_without_extending_deadline() {
        let (scheduler, fired) = counting_scheduler(50);
        assert!(scheduler.trigger());
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert!(!scheduler.trigger());
        }

        // First trigger at t=0 decides the fire time, not the last one at t=40
        tokio::time::sleep(Duration::from_millis(11)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearms_after_firing() {
        let (scheduler, fired) = counting_scheduler(50);
        scheduler.trigger();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(scheduler.trigger());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_pending_action() {
        let (scheduler, fired) = counting_scheduler(50);
        scheduler.trigger();
        assert!(scheduler.cancel());
        assert!(!scheduler.cancel());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        // Cancelled scheduler can be armed again
        assert!(scheduler.trigger());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let (scheduler, fired) = counting_scheduler(50);
        scheduler.trigger();
        drop(scheduler);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_during_action_arms_next_cycle() {
        let fired = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Arc<ReloadScheduler>>>> = Arc::new(Mutex::new(None));

        let counter = fired.clone();
        let weak_slot = slot.clone();
        let scheduler = Arc::new(ReloadScheduler::from_fn(
            Duration::from_millis(50),
            move || {
                let counter = counter.clone();
                let slot = weak_slot.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        let scheduler = slot.lock().unwrap().clone();
                        if let Some(scheduler) = scheduler {
                            assert!(scheduler.trigger());
                        }
                    }
                }
            },
        ));
        *slot.lock().unwrap() = Some(scheduler.clone());

        scheduler.trigger();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        slot.lock().unwrap().take();
    }
}
