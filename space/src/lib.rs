//! Promise space: a registry of named single-resolution futures.
//!
//! Slots are created lazily the first time a name is referenced, by either
//! [`PromiseSpace::produce`] or [`PromiseSpace::consume`], and the same name
//! denotes the same slot for the lifetime of the space. A slot settles exactly
//! once, with a value or a rejection; a second settlement is an error rather
//! than an overwrite.
//!
//! Consumers never block: [`Consumer`] is a future that completes as soon as
//! the slot settles, however many consumers subscribed first. There is no
//! timeout. A slot that nobody produces leaves its consumers pending forever.

use std::collections::BTreeMap;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use keystone_types::Capability;
use thiserror::Error;
use tokio::sync::watch;

/// Future returned by [`Consumer`].
pub type Pending = Pin<Box<dyn Future<Output = Result<Capability, SpaceError>> + Send + 'static>>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpaceError {
    #[error("'{name}' was already settled; a name may only be produced once")]
    DoubleResolution { name: String },
    #[error("'{name}' was rejected: {reason}")]
    Rejected { name: String, reason: String },
}

type Settlement = Result<Capability, String>;

struct Slot {
    name: String,
    state: watch::Sender<Option<Settlement>>,
}

impl Slot {
    fn new(name: &str) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            name: name.to_string(),
            state,
        }
    }

    fn settle(&self, outcome: Settlement) -> Result<(), SpaceError> {
        let accepted = self.state.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(outcome);
            true
        });
        if accepted {
            Ok(())
        } else {
            tracing::debug!(name = %self.name, "rejected second settlement");
            Err(SpaceError::DoubleResolution {
                name: self.name.clone(),
            })
        }
    }

    fn is_settled(&self) -> bool {
        self.state.borrow().is_some()
    }

    fn to_result(&self, settlement: &Settlement) -> Result<Capability, SpaceError> {
        settlement.clone().map_err(|reason| SpaceError::Rejected {
            name: self.name.clone(),
            reason,
        })
    }
}

/// Registry of named single-resolution futures for one bootstrap run.
#[derive(Default)]
pub struct PromiseSpace {
    slots: Mutex<BTreeMap<String, Arc<Slot>>>,
}

impl PromiseSpace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, name: &str) -> Arc<Slot> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            slots
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Slot::new(name))),
        )
    }

    /// Producer handle for `name`, creating the slot if needed.
    pub fn produce(&self, name: &str) -> Producer {
        Producer {
            slot: self.slot(name),
        }
    }

    /// Consumer handle for `name`, creating the slot if needed.
    pub fn consume(&self, name: &str) -> Consumer {
        Consumer {
            slot: self.slot(name),
        }
    }

    /// Whether `name` has been referenced yet.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Names referenced so far that have not settled, sorted.
    #[must_use]
    pub fn pending_names(&self) -> Vec<String> {
        self.names_where(|slot| !slot.is_settled())
    }

    /// Names that have settled, sorted.
    #[must_use]
    pub fn settled_names(&self) -> Vec<String> {
        self.names_where(Slot::is_settled)
    }

    fn names_where(&self, keep: impl Fn(&Slot) -> bool) -> Vec<String> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|&slot| keep(slot))
            .map(|slot| slot.name.clone())
            .collect()
    }
}

impl std::fmt::Debug for PromiseSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromiseSpace")
            .field("settled", &self.settled_names())
            .field("pending", &self.pending_names())
            .finish()
    }
}

/// Write side of a slot.
#[derive(Clone)]
pub struct Producer {
    slot: Arc<Slot>,
}

impl Producer {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.slot.name
    }

    pub fn resolve(&self, value: Capability) -> Result<(), SpaceError> {
        self.slot.settle(Ok(value))?;
        tracing::debug!(name = %self.slot.name, "resolved");
        Ok(())
    }

    pub fn reject(&self, reason: impl Into<String>) -> Result<(), SpaceError> {
        let reason = reason.into();
        self.slot.settle(Err(reason.clone()))?;
        tracing::debug!(name = %self.slot.name, %reason, "rejected");
        Ok(())
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.slot.is_settled()
    }
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Producer").field(&self.slot.name).finish()
    }
}

/// Read side of a slot. Await it (or call [`Consumer::wait`]) for the value.
#[derive(Clone)]
pub struct Consumer {
    slot: Arc<Slot>,
}

impl Consumer {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.slot.name
    }

    /// The settlement, if there is one already.
    #[must_use]
    pub fn peek(&self) -> Option<Result<Capability, SpaceError>> {
        self.slot
            .state
            .borrow()
            .as_ref()
            .map(|settlement| self.slot.to_result(settlement))
    }

    /// Future that completes when the slot settles.
    #[must_use]
    pub fn wait(&self) -> Pending {
        let slot = Arc::clone(&self.slot);
        Box::pin(async move {
            let mut rx = slot.state.subscribe();
            let settled = match rx.wait_for(Option::is_some).await {
                Ok(state) => (*state).clone(),
                Err(_) => None,
            };
            match settled {
                Some(settlement) => slot.to_result(&settlement),
                // The sender lives in `slot`, so the channel never closes.
                None => std::future::pending().await,
            }
        })
    }
}

impl IntoFuture for Consumer {
    type Output = Result<Capability, SpaceError>;
    type IntoFuture = Pending;

    fn into_future(self) -> Self::IntoFuture {
        self.wait()
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Consumer").field(&self.slot.name).finish()
    }
}
