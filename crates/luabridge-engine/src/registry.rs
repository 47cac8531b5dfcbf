//! Instance registry: VM instance handle → host-side context
//!
//! Every VM instance is registered here when it is created and removed when
//! it is dropped. Callbacks coming out of the VM carry only the
//! [`InstanceId`]; the registry is how they find the host state they
//! belong to.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use luabridge_sdk::InstanceId;
use parking_lot::{Mutex, RwLock};

use crate::error::Abort;

/// Host observer of VM steps: `(instance, step count after the step)`
pub type StepObserver = Arc<dyn Fn(InstanceId, u64) + Send + Sync>;

/// Host observer of fatal VM errors: `(instance, message)`
pub type PanicObserver = Arc<dyn Fn(InstanceId, &str) + Send + Sync>;

/// Handle that stops a running script at its next hooked step.
///
/// Can be cloned and sent to other threads.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    /// Request cancellation
    pub fn abort(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested
    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Host-side state of one VM instance
pub struct InstanceContext {
    id: InstanceId,
    step: AtomicU64,
    limit: AtomicU64,
    deadline: Mutex<Option<Instant>>,
    cancelled: Arc<AtomicBool>,
    aborted: Mutex<Option<Abort>>,
    step_observer: RwLock<Option<StepObserver>>,
    panic_observer: RwLock<Option<PanicObserver>>,
}

impl InstanceContext {
    fn new(id: InstanceId, limit: u64, timeout: Option<Duration>) -> Self {
        Self {
            id,
            step: AtomicU64::new(0),
            limit: AtomicU64::new(limit),
            deadline: Mutex::new(timeout.map(|t| Instant::now() + t)),
            cancelled: Arc::new(AtomicBool::new(false)),
            aborted: Mutex::new(None),
            step_observer: RwLock::new(None),
            panic_observer: RwLock::new(None),
        }
    }

    /// Instance handle
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Steps executed since the last `set_limit`
    pub fn step(&self) -> u64 {
        self.step.load(Ordering::Relaxed)
    }

    /// Overwrite the step counter
    pub fn set_step(&self, step: u64) {
        self.step.store(step, Ordering::Relaxed);
    }

    /// Current step limit (0 = unlimited)
    pub fn limit(&self) -> u64 {
        self.limit.load(Ordering::Relaxed)
    }

    /// Set a new step limit and reset the counter
    pub fn set_limit(&self, limit: u64) {
        self.step.store(0, Ordering::Relaxed);
        self.limit.store(limit, Ordering::Relaxed);
    }

    /// Restart the deadline clock (`None` removes the deadline)
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        *self.deadline.lock() = timeout.map(|t| Instant::now() + t);
    }

    /// Handle that cancels this instance
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            flag: Arc::clone(&self.cancelled),
        }
    }

    /// Mark the instance cancelled; every later step aborts
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether the instance is cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Install the step observer
    pub fn set_step_observer(&self, observer: Option<StepObserver>) {
        *self.step_observer.write() = observer;
    }

    /// Install the panic observer
    pub fn set_panic_observer(&self, observer: Option<PanicObserver>) {
        *self.panic_observer.write() = observer;
    }

    /// Fail if the instance may not run any more (cancelled or past its deadline)
    pub fn check_runnable(&self) -> Result<(), Abort> {
        if self.is_cancelled() {
            return Err(Abort::Cancelled);
        }
        if let Some(deadline) = *self.deadline.lock() {
            if Instant::now() >= deadline {
                return Err(Abort::Timeout);
            }
        }
        Ok(())
    }

    /// Account one hooked VM step.
    ///
    /// Checks cancellation and the deadline first, then the step budget;
    /// only a step that passes every check is counted and reported to the
    /// step observer. A failed check cancels the instance and records the
    /// abort, so a script that catches the raised error still ends with it.
    pub fn on_step(&self) -> Result<(), Abort> {
        if let Err(abort) = self.check_runnable() {
            return Err(self.latch(abort));
        }

        let limit = self.limit();
        let step = self.step();
        if limit > 0 && step >= limit {
            return Err(self.latch(Abort::StepLimit { step, limit }));
        }
        let step = step + 1;
        self.step.store(step, Ordering::Relaxed);

        let observer = self.step_observer.read().clone();
        if let Some(observer) = observer {
            observer(self.id, step);
        }
        Ok(())
    }

    fn latch(&self, abort: Abort) -> Abort {
        self.cancel();
        self.aborted.lock().get_or_insert_with(|| abort.clone());
        abort
    }

    /// Take the first abort raised by the step hook since the last call
    pub fn take_abort(&self) -> Option<Abort> {
        self.aborted.lock().take()
    }

    /// Forward a fatal error message to the panic observer
    pub fn notify_panic(&self, message: &str) {
        let observer = self.panic_observer.read().clone();
        if let Some(observer) = observer {
            observer(self.id, message);
        }
    }
}

impl std::fmt::Debug for InstanceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceContext")
            .field("id", &self.id)
            .field("step", &self.step())
            .field("limit", &self.limit())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Registry of live VM instances
#[derive(Debug)]
pub struct InstanceRegistry {
    next_id: AtomicU64,
    instances: DashMap<InstanceId, Arc<InstanceContext>>,
}

impl InstanceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            instances: DashMap::new(),
        }
    }

    /// Allocate a handle and register a fresh context for it
    pub fn register(&self, limit: u64, timeout: Option<Duration>) -> Arc<InstanceContext> {
        let id = InstanceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let context = Arc::new(InstanceContext::new(id, limit, timeout));
        self.instances.insert(id, Arc::clone(&context));
        context
    }

    /// Look up the context of a live instance
    pub fn get(&self, id: InstanceId) -> Option<Arc<InstanceContext>> {
        self.instances.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove an instance (at teardown)
    pub fn remove(&self, id: InstanceId) -> Option<Arc<InstanceContext>> {
        self.instances.remove(&id).map(|(_, context)| context)
    }

    /// Whether `id` is registered
    pub fn contains(&self, id: InstanceId) -> bool {
        self.instances.contains_key(&id)
    }

    /// Number of live instances
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether no instance is live
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
