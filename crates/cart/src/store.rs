//! Cart Reconciliation Store.
//!
//! Holds the locally renderable cart and keeps it equal to the backend cart
//! of the current identity.
//!
//! # Consistency model
//!
//! - The backend is authoritative. Every successful mutation is followed by
//!   a full [`CartStore::refresh`]; the store never derives a snapshot from
//!   its own bookkeeping.
//! - A failed gateway call leaves the snapshot untouched.
//! - Each refresh is tagged with the identity epoch it was issued under.
//!   Identity changes and [`CartStore::reset_local`] bump the epoch, so a late
//!   response for a previous identity is dropped instead of applied.
//! - Each round trip, a mutation together with its refresh, counts as in
//!   flight from before its gateway call until it settles. Listeners hear
//!   when syncing starts and when it settles.
//! - Listeners are notified after the snapshot has been replaced and the
//!   state lock released.
//!
//! Calls without an identity are silent no-ops and never reach the gateway,
//! except [`CartStore::clear_cart`], which still empties local state.

use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use atelier_core::{CartSnapshot, Identity, LineId, SourceKind, SubjectId, TargetId};
use tracing::{debug, info, instrument, warn};

use crate::bus::{Subscription, SubscriptionBus};
use crate::error::CartError;
use crate::gateway::{AddLine, CartGateway, CheckoutReceipt};

/// What happened to the snapshot after a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The fetched cart replaced the snapshot.
    Applied,
    /// Identity changed while the fetch was in flight; the result was dropped.
    Superseded,
    /// No identity, nothing was fetched.
    NoIdentity,
}

#[derive(Debug, Default)]
struct StoreState {
    identity: Option<Identity>,
    epoch: u64,
    snapshot: CartSnapshot,
    in_flight: usize,
}

impl StoreState {
    /// Drop the snapshot and invalidate every pending refresh.
    fn reset(&mut self) {
        self.epoch += 1;
        self.snapshot = CartSnapshot::empty();
    }
}

/// Single owner of the cart snapshot.
///
/// Create one per session scope and share it by reference or `Arc`.
pub struct CartStore {
    gateway: Arc<dyn CartGateway>,
    state: Mutex<StoreState>,
    bus: SubscriptionBus,
}

impl std::fmt::Debug for CartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("CartStore")
            .field("identity", &state.identity)
            .field("epoch", &state.epoch)
            .field("lines", &state.snapshot.line_count())
            .field("in_flight", &state.in_flight)
            .finish_non_exhaustive()
    }
}

/// One round trip counted by [`CartStore::is_syncing`].
///
/// Settled through [`CartStore::settle`]; a guard dropped with its future
/// still decrements the counter.
struct InFlight<'a> {
    store: &'a CartStore,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.store.state();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
    }
}

impl CartStore {
    /// Create a store with no identity and an empty cart.
    #[must_use]
    pub fn new(gateway: Arc<dyn CartGateway>) -> Self {
        Self {
            gateway,
            state: Mutex::new(StoreState::default()),
            bus: SubscriptionBus::new(),
        }
    }

    // =========================================================================
    // Identity lifecycle
    // =========================================================================

    /// Adopt `identity` and load its cart.
    ///
    /// A different identity first empties the snapshot, so the previous
    /// identity's lines are gone before the first fetch completes. Adopting
    /// the current identity again only refreshes.
    ///
    /// # Errors
    ///
    /// Returns the fetch error. The identity stays adopted.
    #[instrument(skip(self), fields(subject = %identity.subject, kind = %identity.kind))]
    pub async fn identify(&self, identity: Identity) -> Result<SyncOutcome, CartError> {
        let changed = {
            let mut state = self.state();
            if state.identity == Some(identity) {
                false
            } else {
                state.identity = Some(identity);
                state.reset();
                true
            }
        };

        if changed {
            info!("Cart identity changed");
            self.bus.notify();
        }

        self.refresh().await
    }

    /// Drop the identity and empty the cart, without any network call.
    ///
    /// Returns the identity that was signed out.
    pub fn sign_out(&self) -> Option<Identity> {
        let previous = self.state().identity.take();
        if let Some(identity) = previous {
            info!(subject = %identity.subject, kind = %identity.kind, "Cart identity cleared");
        }
        self.reset_local();
        previous
    }

    /// Sign out, then abandon the server cart of a guest session.
    ///
    /// The server clear is best effort: the local cart is already gone and a
    /// failure is only logged.
    #[instrument(skip(self))]
    pub async fn end_session(&self) {
        let Some(identity) = self.sign_out() else {
            return;
        };

        if identity.is_guest()
            && let Err(e) = self.gateway.clear(identity.subject).await
        {
            warn!(
                subject = %identity.subject,
                error = %e,
                "Failed to clear guest cart on logout"
            );
        }
    }

    /// Empty the snapshot synchronously and invalidate pending refreshes.
    ///
    /// Listeners are always notified.
    pub fn reset_local(&self) {
        self.state().reset();
        self.bus.notify();
    }

    // =========================================================================
    // Synchronization
    // =========================================================================

    /// Replace the snapshot with the backend cart of the current identity.
    ///
    /// # Errors
    ///
    /// Returns the fetch error and keeps the last known snapshot. A failure
    /// that arrives after the identity changed is reported as
    /// [`SyncOutcome::Superseded`] instead.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<SyncOutcome, CartError> {
        if self.subject().is_none() {
            debug!("No identity, skipping cart refresh");
            return Ok(SyncOutcome::NoIdentity);
        }
        let in_flight = self.begin_sync();
        self.fetch_and_apply(in_flight).await
    }

    /// Fetch the cart of the identity current at call time and settle
    /// `in_flight` with it.
    async fn fetch_and_apply(&self, in_flight: InFlight<'_>) -> Result<SyncOutcome, CartError> {
        let current = {
            let state = self.state();
            state.identity.map(|identity| (identity.subject, state.epoch))
        };
        let Some((subject, epoch)) = current else {
            self.settle(in_flight, None);
            return Ok(SyncOutcome::NoIdentity);
        };

        match self.gateway.fetch(subject).await {
            Ok(snapshot) => {
                if self.settle(in_flight, Some((epoch, snapshot))) {
                    Ok(SyncOutcome::Applied)
                } else {
                    debug!(subject = %subject, "Dropping cart fetched for a previous identity");
                    Ok(SyncOutcome::Superseded)
                }
            }
            Err(e) => {
                let stale = self.state().epoch != epoch;
                self.settle(in_flight, None);
                if stale {
                    debug!(
                        subject = %subject,
                        error = %e,
                        "Dropping fetch failure for a previous identity"
                    );
                    Ok(SyncOutcome::Superseded)
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Count a round trip and notify listeners if the store just started
    /// syncing.
    fn begin_sync(&self) -> InFlight<'_> {
        let started = {
            let mut state = self.state();
            state.in_flight += 1;
            state.in_flight == 1
        };
        if started {
            self.bus.notify();
        }
        InFlight {
            store: self,
            armed: true,
        }
    }

    /// End a round trip, replacing the snapshot with `replacement` if its
    /// epoch is still current.
    ///
    /// Listeners are notified once if the snapshot changed or the store went
    /// idle. Returns whether the replacement was applied.
    fn settle(
        &self,
        mut in_flight: InFlight<'_>,
        replacement: Option<(u64, CartSnapshot)>,
    ) -> bool {
        in_flight.armed = false;
        let (applied, idle) = {
            let mut state = self.state();
            state.in_flight = state.in_flight.saturating_sub(1);
            let applied = match replacement {
                Some((epoch, snapshot)) if epoch == state.epoch => {
                    state.snapshot = snapshot;
                    true
                }
                _ => false,
            };
            (applied, state.in_flight == 0)
        };
        if applied || idle {
            self.bus.notify();
        }
        applied
    }

    /// Run a gateway mutation followed by a refresh as one round trip.
    async fn mutate<F>(&self, call: F) -> Result<(), CartError>
    where
        F: Future<Output = Result<(), CartError>> + Send,
    {
        let in_flight = self.begin_sync();
        if let Err(e) = call.await {
            self.settle(in_flight, None);
            return Err(e);
        }
        self.fetch_and_apply(in_flight).await?;
        Ok(())
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add `quantity` units of a target, then refresh.
    ///
    /// A quantity of zero does nothing.
    ///
    /// # Errors
    ///
    /// Returns the gateway error; the snapshot is left unchanged.
    #[instrument(skip(self), fields(target = %target_id, source = %source))]
    pub async fn add_item(
        &self,
        target_id: TargetId,
        source: SourceKind,
        quantity: u32,
    ) -> Result<(), CartError> {
        let Some(subject) = self.subject() else {
            debug!("No identity, ignoring add");
            return Ok(());
        };
        let Some(quantity) = NonZeroU32::new(quantity) else {
            debug!("Zero quantity, ignoring add");
            return Ok(());
        };

        let request = AddLine {
            target_id,
            source_kind: source,
            quantity,
            subject,
        };
        self.mutate(self.gateway.add(&request)).await
    }

    /// Change a line's quantity by `delta`, then refresh.
    ///
    /// Lines missing from the current snapshot and a zero delta are ignored.
    /// The backend removes a line whose quantity drops to zero.
    ///
    /// # Errors
    ///
    /// Returns the gateway error; the snapshot is left unchanged.
    #[instrument(skip(self), fields(line = %line_id))]
    pub async fn change_quantity(&self, line_id: &LineId, delta: i32) -> Result<(), CartError> {
        let known = {
            let state = self.state();
            state.identity.is_some() && state.snapshot.find_line(line_id).is_some()
        };
        if !known {
            debug!("Unknown line or no identity, ignoring quantity change");
            return Ok(());
        }
        if delta == 0 {
            return Ok(());
        }

        self.mutate(self.gateway.change_quantity(line_id, delta)).await
    }

    /// Remove a line, then refresh.
    ///
    /// # Errors
    ///
    /// Returns the gateway error; the snapshot is left unchanged.
    #[instrument(skip(self), fields(line = %line_id))]
    pub async fn remove_line(&self, line_id: &LineId) -> Result<(), CartError> {
        if self.subject().is_none() {
            debug!("No identity, ignoring remove");
            return Ok(());
        }

        self.mutate(self.gateway.remove(line_id)).await
    }

    /// Empty the cart.
    ///
    /// With an identity the backend cart is cleared and the local snapshot is
    /// emptied whether or not that call succeeded. Without one only local
    /// state is emptied.
    ///
    /// # Errors
    ///
    /// Returns the gateway error after the local cart has been emptied.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self) -> Result<(), CartError> {
        let current = {
            let state = self.state();
            state.identity.map(|identity| (identity.subject, state.epoch))
        };
        let Some((subject, epoch)) = current else {
            self.reset_local();
            return Ok(());
        };

        let in_flight = self.begin_sync();
        let result = self.gateway.clear(subject).await;
        self.settle(in_flight, Some((epoch, CartSnapshot::empty())));

        result
    }

    /// Turn the cart into an order, then refresh.
    ///
    /// Returns `None` without contacting the backend when there is no
    /// identity or the cart is empty.
    ///
    /// # Errors
    ///
    /// Returns the checkout error. A refresh failure after a successful
    /// checkout is only logged, so the receipt is never lost.
    #[instrument(skip(self))]
    pub async fn checkout(&self) -> Result<Option<CheckoutReceipt>, CartError> {
        let subject = {
            let state = self.state();
            match state.identity {
                Some(identity) if !state.snapshot.is_empty() => identity.subject,
                _ => {
                    debug!("No identity or empty cart, skipping checkout");
                    return Ok(None);
                }
            }
        };

        let in_flight = self.begin_sync();
        let receipt = match self.gateway.checkout(subject).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.settle(in_flight, None);
                return Err(e);
            }
        };
        info!(order = %receipt.order_id, total = %receipt.total_amount, "Checkout completed");

        if let Err(e) = self.fetch_and_apply(in_flight).await {
            warn!(error = %e, "Failed to refresh cart after checkout");
        }
        Ok(Some(receipt))
    }

    // =========================================================================
    // Read access
    // =========================================================================

    /// Current snapshot. Cheap to clone and never changes under the caller.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.state().snapshot.clone()
    }

    /// Current identity.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.state().identity
    }

    /// Returns true while at least one round trip is in flight.
    ///
    /// Covers mutations from before their gateway call through the refresh
    /// that follows, as well as standalone refreshes.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.state().in_flight > 0
    }

    /// Register a listener called after every snapshot replacement and
    /// whenever [`CartStore::is_syncing`] changes.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.bus.subscribe(listener)
    }

    fn subject(&self) -> Option<SubjectId> {
        self.state().identity.map(|identity| identity.subject)
    }

    // Never held across an await or while listeners run.
    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
