//! Bootstrap sequencing.
//!
//! A run takes a [`Manifest`], looks every entry up in a [`BehaviorRegistry`],
//! attenuates the power tree for it and drives all behaviors concurrently on
//! the calling task. Order among behaviors is whatever their data dependencies
//! make it: a behavior that consumes a name simply waits until another
//! produces it. The first failure ends the run and drops the rest.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{FuturesUnordered, StreamExt};
use keystone_types::{Capability, Manifest};
use tracing::Instrument;
use uuid::Uuid;

use crate::attenuate::{PowerTree, Powers, WeakPowerTree, attenuate};
use crate::error::{BehaviorError, BootstrapError};

/// Future returned by [`Behavior::run`].
pub type BehaviorFut = Pin<Box<dyn Future<Output = Result<(), BehaviorError>> + Send + 'static>>;

/// Resource name under which a run exposes its [`BehaviorRunner`].
pub const RUN_BEHAVIORS: &str = "runBehaviors";

/// One named initialization step.
pub trait Behavior: Send + Sync {
    fn name(&self) -> &'static str;
    fn run(&self, powers: Powers) -> BehaviorFut;
}

/// A behavior backed by an async function.
pub struct FnBehavior<F> {
    name: &'static str,
    body: F,
}

pub fn behavior_fn<F, Fut>(name: &'static str, body: F) -> FnBehavior<F>
where
    F: Fn(Powers) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BehaviorError>> + Send + 'static,
{
    FnBehavior { name, body }
}

impl<F, Fut> Behavior for FnBehavior<F>
where
    F: Fn(Powers) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BehaviorError>> + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn run(&self, powers: Powers) -> BehaviorFut {
        Box::pin((self.body)(powers))
    }
}

/// Behaviors available to manifests, by name.
#[derive(Default, Clone)]
pub struct BehaviorRegistry {
    behaviors: BTreeMap<String, Arc<dyn Behavior>>,
}

impl BehaviorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, behavior: impl Behavior + 'static) -> Result<(), BootstrapError> {
        let name = behavior.name().to_string();
        if self.behaviors.contains_key(&name) {
            return Err(BootstrapError::DuplicateBehavior { name });
        }
        self.behaviors.insert(name, Arc::new(behavior));
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Behavior>, BootstrapError> {
        self.behaviors
            .get(name)
            .cloned()
            .ok_or_else(|| BootstrapError::UnknownBehavior {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.behaviors.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }
}

impl std::fmt::Debug for BehaviorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

// ============================================================================
// Runs
// ============================================================================

/// Identifies one run in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(Uuid);

impl RunId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BehaviorOutcome {
    pub name: String,
    pub elapsed: Duration,
}

/// Summary of a successful run. Behaviors are listed in completion order.
#[derive(Debug, Clone)]
pub struct BootstrapReport {
    pub run_id: RunId,
    pub behaviors: Vec<BehaviorOutcome>,
    pub elapsed: Duration,
}

impl BootstrapReport {
    pub fn completed(&self) -> impl Iterator<Item = &str> {
        self.behaviors.iter().map(|outcome| outcome.name.as_str())
    }
}

/// Run every behavior in `manifest` against `tree`.
///
/// Every manifest entry must be registered; an unknown name fails the run
/// before any behavior starts.
pub async fn run_behaviors(
    registry: &BehaviorRegistry,
    tree: &PowerTree,
    manifest: &Manifest,
) -> Result<BootstrapReport, BootstrapError> {
    let run_id = RunId::new();
    let span = tracing::info_span!("bootstrap", run_id = %run_id, behaviors = manifest.len());
    drive(registry, tree, manifest, run_id).instrument(span).await
}

async fn drive(
    registry: &BehaviorRegistry,
    tree: &PowerTree,
    manifest: &Manifest,
    run_id: RunId,
) -> Result<BootstrapReport, BootstrapError> {
    let started = Instant::now();
    let mut planned = Vec::with_capacity(manifest.len());
    for (name, permit) in manifest.iter() {
        let behavior = registry.lookup(name)?;
        planned.push((name.to_string(), behavior, attenuate(name, permit, tree)));
    }

    let mut running: FuturesUnordered<_> = planned
        .into_iter()
        .map(|(name, behavior, powers)| {
            tracing::info!(behavior = %name, "behavior starting");
            let fut = behavior.run(powers);
            async move {
                let began = Instant::now();
                let result = fut.await;
                (name, began.elapsed(), result)
            }
        })
        .collect();

    let mut behaviors = Vec::with_capacity(running.len());
    while let Some((name, elapsed, result)) = running.next().await {
        match result {
            Ok(()) => {
                tracing::info!(
                    behavior = %name,
                    elapsed_ms = elapsed.as_millis(),
                    "behavior finished"
                );
                behaviors.push(BehaviorOutcome { name, elapsed });
            }
            Err(source) => {
                tracing::error!(behavior = %name, error = %source, "behavior failed");
                return Err(BootstrapError::BehaviorFailed {
                    behavior: name,
                    source,
                });
            }
        }
    }

    let elapsed = started.elapsed();
    tracing::info!(elapsed_ms = elapsed.as_millis(), "bootstrap complete");
    Ok(BootstrapReport {
        run_id,
        behaviors,
        elapsed,
    })
}

/// Runs further manifests against the same registry and power tree.
///
/// This is the `runBehaviors` capability: whoever holds it can start another
/// run after bootstrap, sharing the same promise space. The runner is stored
/// inside the tree it runs against, so it holds the tree weakly; once the
/// owning [`Sequencer`] and every other handle are gone, runs fail with
/// [`BootstrapError::TreeReleased`].
#[derive(Clone)]
pub struct BehaviorRunner {
    registry: Arc<BehaviorRegistry>,
    tree: WeakPowerTree,
}

impl BehaviorRunner {
    pub fn new(registry: Arc<BehaviorRegistry>, tree: &PowerTree) -> Self {
        Self {
            registry,
            tree: tree.downgrade(),
        }
    }

    pub fn run(
        &self,
        manifest: Manifest,
    ) -> Pin<Box<dyn Future<Output = Result<BootstrapReport, BootstrapError>> + Send + 'static>>
    {
        let runner = self.clone();
        Box::pin(async move {
            let tree = runner.tree().ok_or(BootstrapError::TreeReleased)?;
            run_behaviors(&runner.registry, &tree, &manifest).await
        })
    }

    /// The tree runs go against, while something else still owns it.
    #[must_use]
    pub fn tree(&self) -> Option<PowerTree> {
        self.tree.upgrade()
    }
}

impl std::fmt::Debug for BehaviorRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviorRunner")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Owns the registry and power tree for a process's bootstrap.
#[derive(Debug, Clone)]
pub struct Sequencer {
    registry: Arc<BehaviorRegistry>,
    tree: PowerTree,
}

impl Sequencer {
    /// Build a sequencer and publish its runner as the `runBehaviors` resource.
    pub fn new(registry: BehaviorRegistry, tree: PowerTree) -> Self {
        let registry = Arc::new(registry);
        let runner = BehaviorRunner::new(Arc::clone(&registry), &tree);
        tree.insert_resource(RUN_BEHAVIORS, Capability::new(runner));
        Self { registry, tree }
    }

    #[must_use]
    pub fn tree(&self) -> &PowerTree {
        &self.tree
    }

    #[must_use]
    pub fn runner(&self) -> BehaviorRunner {
        BehaviorRunner::new(Arc::clone(&self.registry), &self.tree)
    }

    pub async fn run(&self, manifest: &Manifest) -> Result<BootstrapReport, BootstrapError> {
        run_behaviors(&self.registry, &self.tree, manifest).await
    }

    /// Like [`Sequencer::run`], but give up after `limit`.
    ///
    /// On timeout the run is dropped and the error lists the root names still
    /// waiting for a producer.
    pub async fn run_within(
        &self,
        manifest: &Manifest,
        limit: Duration,
    ) -> Result<BootstrapReport, BootstrapError> {
        if let Ok(result) = tokio::time::timeout(limit, self.run(manifest)).await {
            return result;
        }
        let pending = self.tree.space().pending_names();
        tracing::error!(?pending, limit_ms = limit.as_millis(), "bootstrap did not finish");
        Err(BootstrapError::TimedOut { limit, pending })
    }
}
