//! Batched detect → plan → apply passes over a document subtree.
//!
//! A pass collects every element under the root that matches a configured
//! selector group, then works through them in document order, `batch_size`
//! elements at a time, yielding to the event loop between batches. The
//! document is borrowed only for the duration of one batch.

use std::cell::Cell;
use std::collections::HashSet;
use std::ops::AddAssign;
use std::rc::Rc;
use std::time::Duration;

use ego_tree::NodeId;
use futures::future::LocalBoxFuture;
use scraper::Selector;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::detect::detect;
use crate::disposable::Disposable;
use crate::dom::{parse_selector, Document, SharedDocument};
use crate::error::Result;
use crate::mutation::added_roots;
use crate::planner::{GateMask, StyleMutationPlanner};
use crate::responsive::Intensity;
use crate::transform::{ApplyOutcome, ElementTransformer};

/// Suspension point between batches.
pub trait Yielder {
    fn yield_now(&self) -> LocalBoxFuture<'_, ()>;
}

/// Yields back to the tokio scheduler.
pub struct TaskYield;

impl Yielder for TaskYield {
    fn yield_now(&self) -> LocalBoxFuture<'_, ()> {
        Box::pin(tokio::task::yield_now())
    }
}

/// Counters for one or more passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Elements a plan was applied to.
    pub transformed: usize,
    pub hebrew_detected: usize,
    /// Elements left as they were: already up to date, or nothing to change.
    pub unchanged: usize,
    /// Elements dropped mid-pass (detached or unreadable).
    pub skipped: usize,
    pub batches: usize,
}

impl AddAssign for Stats {
    fn add_assign(&mut self, other: Self) {
        self.transformed += other.transformed;
        self.hebrew_detected += other.hebrew_detected;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.batches += other.batches;
    }
}

#[derive(Clone)]
pub struct TransformationScheduler {
    document: SharedDocument,
    groups: Rc<Vec<(&'static str, Selector)>>,
    planner: Rc<StyleMutationPlanner>,
    transformer: ElementTransformer,
    batch_size: usize,
    throttle: Duration,
    yielder: Rc<dyn Yielder>,
    totals: Rc<Cell<Stats>>,
    passes: Rc<Cell<usize>>,
}

impl TransformationScheduler {
    pub fn new(
        document: SharedDocument,
        config: &EngineConfig,
        yielder: Rc<dyn Yielder>,
    ) -> Result<Self> {
        let mut groups = Vec::new();
        for (name, selectors) in config.selectors.groups() {
            if !selectors.is_empty() {
                groups.push((name, parse_selector(&selectors.join(", "))?));
            }
        }
        Ok(Self {
            document,
            groups: Rc::new(groups),
            planner: Rc::new(StyleMutationPlanner::new(config)?),
            transformer: ElementTransformer,
            batch_size: config.batch_size.max(1),
            throttle: Duration::from_millis(config.throttle_delay_ms),
            yielder,
            totals: Rc::new(Cell::new(Stats::default())),
            passes: Rc::new(Cell::new(0)),
        })
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    /// Stats summed over every pass since construction or [`reset_totals`](Self::reset_totals).
    pub fn totals(&self) -> Stats {
        self.totals.get()
    }

    pub fn passes(&self) -> usize {
        self.passes.get()
    }

    pub fn reset_totals(&self) {
        self.totals.set(Stats::default());
        self.passes.set(0);
    }

    /// Elements under `root` matched by any selector group, in document order.
    pub fn targets(&self, doc: &Document, root: NodeId) -> Vec<NodeId> {
        self.collect_targets(doc, root).0
    }

    /// Targets plus the names of groups that matched nothing.
    fn collect_targets(&self, doc: &Document, root: NodeId) -> (Vec<NodeId>, Vec<&'static str>) {
        let mut found = HashSet::new();
        let mut empty = Vec::new();
        for (name, selector) in self.groups.iter() {
            let matched = doc.select_within(root, selector);
            if matched.is_empty() {
                empty.push(*name);
            }
            found.extend(matched);
        }
        let targets = doc
            .elements_within(root)
            .into_iter()
            .filter(|id| found.contains(id))
            .collect();
        (targets, empty)
    }

    /// Transform every targeted element under `root`.
    pub async fn run(&self, root: NodeId, intensity: Intensity) -> Stats {
        let (targets, empty) = self.collect_targets(&self.document.borrow(), root);
        for group in empty {
            info!(group = group, "selector group matched no elements");
        }
        debug!(targets = targets.len(), intensity = intensity.value(), "starting pass");
        let stats = self.process(targets, intensity).await;
        info!(
            transformed = stats.transformed,
            hebrew = stats.hebrew_detected,
            unchanged = stats.unchanged,
            skipped = stats.skipped,
            batches = stats.batches,
            "pass complete"
        );
        self.record(stats);
        stats
    }

    /// Watch `root` for inserted nodes and transform only those, at whatever
    /// intensity `intensity` holds when the burst is processed.
    pub fn observe(&self, root: NodeId, intensity: watch::Receiver<Intensity>) -> Disposable {
        let mut records = self.document.borrow_mut().subscribe();
        let scheduler = self.clone();

        Disposable::spawn_local(async move {
            while let Some(first) = records.recv().await {
                tokio::time::sleep(scheduler.throttle).await;
                let mut burst = vec![first];
                while let Ok(record) = records.try_recv() {
                    burst.push(record);
                }

                let targets = {
                    let doc = scheduler.document.borrow();
                    let roots = added_roots(&doc, root, &burst);
                    scheduler.targets_within(&doc, &roots)
                };
                debug!(records = burst.len(), targets = targets.len(), "mutation burst");
                if targets.is_empty() {
                    continue;
                }

                let current = *intensity.borrow();
                let stats = scheduler.process(targets, current).await;
                info!(transformed = stats.transformed, "processed inserted nodes");
                scheduler.record(stats);
            }
        })
    }

    fn targets_within(&self, doc: &Document, roots: &[NodeId]) -> Vec<NodeId> {
        roots
            .iter()
            .flat_map(|root| doc.elements_within(*root))
            .filter(|id| self.groups.iter().any(|(_, s)| doc.matches(*id, s)))
            .collect()
    }

    async fn process(&self, targets: Vec<NodeId>, intensity: Intensity) -> Stats {
        let gates = self.planner.gates(intensity);
        let mut stats = Stats::default();

        for batch in targets.chunks(self.batch_size) {
            {
                let mut doc = self.document.borrow_mut();
                for &id in batch {
                    self.process_element(&mut doc, id, intensity, gates, &mut stats);
                }
            }
            stats.batches += 1;
            debug!(batch = stats.batches, size = batch.len(), "batch done");
            self.yielder.yield_now().await;
        }
        stats
    }

    fn process_element(
        &self,
        doc: &mut Document,
        id: NodeId,
        intensity: Intensity,
        gates: GateMask,
        stats: &mut Stats,
    ) {
        if !doc.is_attached(id) {
            debug!(node = ?id, "skipping detached element");
            stats.skipped += 1;
            return;
        }

        let detection = detect(&doc.text_content(id));
        if detection.is_rtl {
            stats.hebrew_detected += 1;
        }

        match self.transformer.applied_state(doc, id) {
            Ok(Some(state)) if state.gates == gates => {
                stats.unchanged += 1;
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "discarding malformed transform state");
                if self.transformer.discard_marker(doc, id).is_err() {
                    stats.skipped += 1;
                    return;
                }
            }
        }

        let Some(plan) = self.planner.plan(doc, id, &detection, intensity) else {
            stats.skipped += 1;
            return;
        };
        match self.transformer.apply(doc, id, &plan) {
            Ok(ApplyOutcome::Applied) => stats.transformed += 1,
            Ok(ApplyOutcome::Unchanged | ApplyOutcome::Empty) => stats.unchanged += 1,
            Err(e) => {
                debug!(error = %e, "skipping element");
                stats.skipped += 1;
            }
        }
    }

    fn record(&self, stats: Stats) {
        let mut totals = self.totals.get();
        totals += stats;
        self.totals.set(totals);
        self.passes.set(self.passes.get() + 1);
    }
}
