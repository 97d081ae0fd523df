//! Per-address capability bundles.
//!
//! The [`ClientManager`] keeps an append-only log of property makers; each
//! maker turns a client address into a partial [`Bundle`]. A [`ClientFacet`]
//! folds the log for its address in registration order, later keys winning.
//! Facets read the shared log, so a facet created before a maker was assigned
//! still picks up that maker's contribution.

use std::sync::{Arc, Mutex, PoisonError};

use keystone_types::Bundle;
use tokio::sync::watch;

/// Turns a client address into part of that client's bundle.
pub type PropertyMaker = Arc<dyn Fn(&str) -> Bundle + Send + Sync>;

pub fn property_maker(make: impl Fn(&str) -> Bundle + Send + Sync + 'static) -> PropertyMaker {
    Arc::new(make)
}

type MakerLog = Arc<watch::Sender<Vec<PropertyMaker>>>;

/// Create the manager and its creator over one shared maker log.
#[must_use]
pub fn make_client_manager() -> (ClientManager, ClientCreator) {
    let (log, _) = watch::channel(Vec::new());
    let log: MakerLog = Arc::new(log);
    (
        ClientManager {
            log: Arc::clone(&log),
        },
        ClientCreator { log },
    )
}

/// Write side: appends property makers.
#[derive(Clone)]
pub struct ClientManager {
    log: MakerLog,
}

impl ClientManager {
    /// Append `makers` and notify every facet.
    pub fn assign_bundle(&self, makers: impl IntoIterator<Item = PropertyMaker>) {
        let mut added = 0;
        self.log.send_modify(|log| {
            let before = log.len();
            log.extend(makers);
            added = log.len() - before;
        });
        tracing::debug!(added, "property makers assigned");
    }

    #[must_use]
    pub fn maker_count(&self) -> usize {
        self.log.borrow().len()
    }
}

impl std::fmt::Debug for ClientManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientManager")
            .field("makers", &self.maker_count())
            .finish()
    }
}

/// Creates facets over the manager's log.
#[derive(Clone)]
pub struct ClientCreator {
    log: MakerLog,
}

impl ClientCreator {
    pub fn create_client_facet(
        &self,
        nickname: &str,
        address: &str,
        power_flags: &[String],
    ) -> ClientFacet {
        tracing::info!(nickname, address, ?power_flags, "client facet created");
        ClientFacet {
            inner: Arc::new(FacetInner {
                nickname: nickname.to_string(),
                address: address.to_string(),
                power_flags: power_flags.to_vec(),
                log: Arc::clone(&self.log),
                home: Mutex::new(FoldedHome::default()),
            }),
        }
    }

    /// The folded bundle for `address`, without keeping the facet.
    pub fn create_user_bundle(
        &self,
        nickname: &str,
        address: &str,
        power_flags: &[String],
    ) -> Bundle {
        self.create_client_facet(nickname, address, power_flags)
            .bundle()
    }
}

impl std::fmt::Debug for ClientCreator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCreator").finish_non_exhaustive()
    }
}

#[derive(Default)]
struct FoldedHome {
    applied: usize,
    home: Bundle,
}

struct FacetInner {
    nickname: String,
    address: String,
    power_flags: Vec<String>,
    log: MakerLog,
    home: Mutex<FoldedHome>,
}

/// A snapshot of one client's configuration.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub client_address: String,
    pub client_home: Bundle,
}

/// One client's view of the maker log.
#[derive(Clone)]
pub struct ClientFacet {
    inner: Arc<FacetInner>,
}

impl ClientFacet {
    #[must_use]
    pub fn nickname(&self) -> &str {
        &self.inner.nickname
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    #[must_use]
    pub fn power_flags(&self) -> &[String] {
        &self.inner.power_flags
    }

    /// The current fold of every maker assigned so far.
    #[must_use]
    pub fn bundle(&self) -> Bundle {
        let mut folded = self
            .inner
            .home
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Clone the tail so makers run without the log borrowed.
        let fresh: Vec<PropertyMaker> = self.inner.log.borrow()[folded.applied..].to_vec();
        for make in &fresh {
            folded.home.merge(make(&self.inner.address));
        }
        folded.applied += fresh.len();
        folded.home.clone()
    }

    #[must_use]
    pub fn configuration(&self) -> Configuration {
        Configuration {
            client_address: self.inner.address.clone(),
            client_home: self.bundle(),
        }
    }

    /// Subscribe to configuration updates.
    #[must_use]
    pub fn live_bundle(&self) -> LiveBundle {
        LiveBundle {
            facet: self.clone(),
            updates: self.inner.log.subscribe(),
        }
    }
}

impl std::fmt::Debug for ClientFacet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientFacet")
            .field("nickname", &self.inner.nickname)
            .field("address", &self.inner.address)
            .finish_non_exhaustive()
    }
}

/// A stream of configurations, one per `assign_bundle`.
pub struct LiveBundle {
    facet: ClientFacet,
    updates: watch::Receiver<Vec<PropertyMaker>>,
}

impl LiveBundle {
    #[must_use]
    pub fn current(&self) -> Configuration {
        self.facet.configuration()
    }

    /// Wait for the next assignment and return the refolded configuration.
    ///
    /// Assignments that land between two calls are coalesced.
    pub async fn changed(&mut self) -> Option<Configuration> {
        self.updates.changed().await.ok()?;
        Some(self.facet.configuration())
    }
}
