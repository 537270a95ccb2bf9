//! Interrupt binding and delivery.
//!
//! [`InterruptManager`] binds one dispatcher to either a set of MSI-X
//! vectors or the shared legacy line. The dispatcher checks that the
//! adapter is the one asserting the interrupt, then hands it to a
//! [`DeliveryPolicy`]: serviced inline in hard-interrupt context, or
//! deferred to a single-threaded bottom half.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use sashba_core::id::IrqVector;
use sashba_core::sync::SpinLock;
use sashba_driver_api::{BottomHalf, InterruptHandler, IrqFlags, IrqReturn};

use crate::error::HbaError;
use crate::hba::HbaShared;
use crate::params::InterruptDelivery;

/// Current interrupt binding of an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IrqBinding {
    /// Nothing registered.
    #[default]
    Unbound,
    /// Handler on the shared INTx line.
    Legacy {
        /// The legacy vector.
        vector: IrqVector,
    },
    /// Handler on every granted MSI-X vector.
    Msix {
        /// Granted vectors, in table order.
        vectors: Vec<IrqVector>,
    },
}

/// How a recognised interrupt reaches [`ChipOps::service_interrupt`].
///
/// [`ChipOps::service_interrupt`]: crate::chip::ChipOps::service_interrupt
pub trait DeliveryPolicy: Send + Sync {
    /// Delivers one interrupt already claimed by the adapter.
    fn deliver(&self, shared: &HbaShared) -> IrqReturn;

    /// Stops further delivery and waits for any in-flight delivery.
    fn quiesce(&self) {}
}

/// Services the chip directly from the hard-interrupt handler.
#[derive(Debug, Default)]
pub struct InlineDelivery;

impl DeliveryPolicy for InlineDelivery {
    fn deliver(&self, shared: &HbaShared) -> IrqReturn {
        shared.chip().service_interrupt(&shared.hw())
    }
}

// ---------------------------------------------------------------------------
// Deferred delivery
// ---------------------------------------------------------------------------

/// Single-threaded bottom half. At most one instance is queued at a time and
/// it never runs concurrently with itself.
struct Tasklet {
    shared: SpinLock<Option<Arc<HbaShared>>>,
    scheduled: AtomicBool,
    running: AtomicBool,
    killed: AtomicBool,
}

impl Tasklet {
    fn new(shared: Arc<HbaShared>) -> Self {
        Self {
            shared: SpinLock::named("tasklet", Some(shared)),
            scheduled: AtomicBool::new(false),
            running: AtomicBool::new(false),
            killed: AtomicBool::new(false),
        }
    }

    /// Runs any bottom half that is still pending, then stops future runs
    /// and drops the adapter reference. Waits for a run in progress first.
    fn kill(&self) {
        while self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        if self.scheduled.swap(false, Ordering::SeqCst) && !self.killed.load(Ordering::SeqCst) {
            self.service();
        }
        self.killed.store(true, Ordering::SeqCst);
        self.shared.lock().take();
        self.running.store(false, Ordering::SeqCst);
    }

    fn service(&self) {
        let shared = self.shared.lock().clone();
        if let Some(shared) = shared {
            io_dbg!(shared.log_mask(), "{}: bottom half", shared.name());
            shared.chip().service_interrupt(&shared.hw());
        }
    }
}

impl BottomHalf for Tasklet {
    /// A run that finds another one in progress returns at once; the active
    /// run picks up its pending mark before it lets go of `running`.
    fn run(&self) {
        loop {
            if self
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
                .is_err()
            {
                return;
            }
            while self.scheduled.swap(false, Ordering::SeqCst) {
                if !self.killed.load(Ordering::SeqCst) {
                    self.service();
                }
            }
            self.running.store(false, Ordering::SeqCst);
            if !self.scheduled.load(Ordering::SeqCst) {
                return;
            }
        }
    }
}

/// Schedules a [`Tasklet`] through the platform and returns at once.
pub struct DeferredDelivery {
    tasklet: Arc<Tasklet>,
}

impl DeferredDelivery {
    /// Creates the bottom half for `shared`.
    #[must_use]
    pub fn new(shared: Arc<HbaShared>) -> Self {
        Self {
            tasklet: Arc::new(Tasklet::new(shared)),
        }
    }
}

impl DeliveryPolicy for DeferredDelivery {
    fn deliver(&self, shared: &HbaShared) -> IrqReturn {
        if !self.tasklet.killed.load(Ordering::SeqCst)
            && !self.tasklet.scheduled.swap(true, Ordering::SeqCst)
        {
            let work: Arc<dyn BottomHalf> = self.tasklet.clone();
            shared.services().schedule_bottom_half(work);
        }
        IrqReturn::Handled
    }

    fn quiesce(&self) {
        self.tasklet.kill();
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// The handler registered on every bound vector.
struct IrqDispatcher {
    shared: Arc<HbaShared>,
    policy: Arc<dyn DeliveryPolicy>,
}

impl InterruptHandler for IrqDispatcher {
    fn handle(&self, vector: IrqVector) -> IrqReturn {
        let shared = &*self.shared;
        if !shared.chip().owns_pending_interrupt(&shared.hw()) {
            return IrqReturn::None;
        }
        io_dbg!(shared.log_mask(), "{}: irq on vector {}", shared.name(), vector.as_u32());
        self.policy.deliver(shared)
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Owns an adapter's interrupt registration.
#[derive(Default)]
pub struct InterruptManager {
    binding: IrqBinding,
    policy: Option<Arc<dyn DeliveryPolicy>>,
}

impl InterruptManager {
    /// Creates an unbound manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the dispatcher for `shared`.
    ///
    /// MSI-X is tried first when the function supports it, with up to
    /// `max_vectors` vectors. If enabling MSI-X or requesting any vector
    /// fails, the granted vectors are freed, MSI-X is disabled and the shared
    /// legacy line is used instead. Fails with
    /// [`HbaError::InterruptBindFailure`] only if that also fails, in which
    /// case nothing stays registered.
    pub fn bind(
        &mut self,
        shared: &Arc<HbaShared>,
        delivery: InterruptDelivery,
        max_vectors: usize,
    ) -> Result<(), HbaError> {
        if self.binding != IrqBinding::Unbound {
            return Err(HbaError::InvalidState);
        }

        let policy: Arc<dyn DeliveryPolicy> = match delivery {
            InterruptDelivery::Inline => Arc::new(InlineDelivery),
            InterruptDelivery::Deferred => Arc::new(DeferredDelivery::new(Arc::clone(shared))),
        };
        let handler: Arc<dyn InterruptHandler> = Arc::new(IrqDispatcher {
            shared: Arc::clone(shared),
            policy: Arc::clone(&policy),
        });

        let services = shared.services();
        let pci = shared.pci();
        let mask = shared.log_mask();

        if services.msix_capable(pci) {
            match Self::bind_msix(shared, &handler, max_vectors) {
                Ok(vectors) => {
                    init_dbg!(mask, "{}: {} MSI-X vector(s) bound", shared.name(), vectors.len());
                    self.binding = IrqBinding::Msix { vectors };
                    self.policy = Some(policy);
                    return Ok(());
                }
                Err(()) => {
                    fail_dbg!(mask, "{}: MSI-X unavailable, using INTx", shared.name());
                }
            }
        }

        let vector = services.legacy_vector(pci);
        match services.request_irq(vector, IrqFlags::SHARED, shared.name(), handler) {
            Ok(()) => {
                init_dbg!(mask, "{}: INTx vector {} bound", shared.name(), vector.as_u32());
                self.binding = IrqBinding::Legacy { vector };
                self.policy = Some(policy);
                Ok(())
            }
            Err(err) => {
                fail_dbg!(mask, "{}: INTx request failed: {err}", shared.name());
                policy.quiesce();
                Err(HbaError::InterruptBindFailure)
            }
        }
    }

    /// Enables MSI-X and requests every granted vector, undoing everything
    /// on failure.
    fn bind_msix(
        shared: &HbaShared,
        handler: &Arc<dyn InterruptHandler>,
        max_vectors: usize,
    ) -> Result<Vec<IrqVector>, ()> {
        let services = shared.services();
        let pci = shared.pci();
        let vectors = services.enable_msix(pci, max_vectors).map_err(|_| ())?;
        if vectors.is_empty() {
            services.disable_msix(pci);
            return Err(());
        }

        for (done, &vector) in vectors.iter().enumerate() {
            if services
                .request_irq(vector, IrqFlags::empty(), shared.name(), Arc::clone(handler))
                .is_err()
            {
                for &granted in &vectors[..done] {
                    services.free_irq(granted);
                }
                services.disable_msix(pci);
                return Err(());
            }
        }
        Ok(vectors)
    }

    /// Releases the binding: waits out running handlers, frees every vector,
    /// disables MSI-X if it was used and stops deferred delivery. Does
    /// nothing when unbound.
    pub fn unbind(&mut self, shared: &HbaShared) {
        let services = shared.services();
        match core::mem::take(&mut self.binding) {
            IrqBinding::Unbound => {}
            IrqBinding::Legacy { vector } => {
                services.synchronize_irq(vector);
                services.free_irq(vector);
            }
            IrqBinding::Msix { vectors } => {
                for &vector in &vectors {
                    services.synchronize_irq(vector);
                    services.free_irq(vector);
                }
                services.disable_msix(shared.pci());
            }
        }
        if let Some(policy) = self.policy.take() {
            policy.quiesce();
        }
    }

    /// Current binding.
    #[must_use]
    pub fn binding(&self) -> &IrqBinding {
        &self.binding
    }

    /// Number of bindings in place (0 or 1).
    #[must_use]
    pub fn bind_count(&self) -> usize {
        usize::from(self.binding != IrqBinding::Unbound)
    }

    /// Vectors currently registered.
    #[must_use]
    pub fn vectors(&self) -> Vec<IrqVector> {
        match &self.binding {
            IrqBinding::Unbound => Vec::new(),
            IrqBinding::Legacy { vector } => alloc::vec![*vector],
            IrqBinding::Msix { vectors } => vectors.clone(),
        }
    }
}

impl core::fmt::Debug for InterruptManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InterruptManager")
            .field("binding", &self.binding)
            .finish_non_exhaustive()
    }
}
