//! Engine entry point.
//!
//! [`transform`] runs the initial pass over a root element and returns an
//! [`EngineHandle`] that keeps the document up to date: inserted nodes are
//! transformed as they arrive, and a change of viewport tier re-runs the pass
//! at the new intensity. Dropping or disposing the handle stops both.

use std::rc::Rc;

use ego_tree::NodeId;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::detect::detect;
use crate::disposable::Disposable;
use crate::dom::SharedDocument;
use crate::error::{Error, Result};
use crate::responsive::{Intensity, ResponsiveIntensityController};
use crate::scheduler::{Stats, TaskYield, TransformationScheduler, Yielder};
use crate::transform::ElementTransformer;

/// Snapshot returned by [`EngineHandle::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    /// Elements under the root currently carrying the marker.
    pub transformed: usize,
    /// Targeted elements under the root whose text is detected as RTL,
    /// whether or not their plan changed anything.
    pub hebrew_detected: usize,
    pub passes: usize,
    /// Counters summed over every pass since start or the last reinitialize.
    pub totals: Stats,
}

/// Transform `root` and keep it transformed. Must be awaited inside a
/// `LocalSet`.
pub async fn transform(
    document: SharedDocument,
    root: NodeId,
    config: EngineConfig,
) -> Result<EngineHandle> {
    EngineHandle::start(document, root, config, Rc::new(TaskYield)).await
}

pub struct EngineHandle {
    scheduler: TransformationScheduler,
    controller: ResponsiveIntensityController,
    root: NodeId,
    observer: Disposable,
    viewport: Disposable,
}

impl EngineHandle {
    /// Like [`transform`], with a custom suspension point between batches.
    pub async fn start(
        document: SharedDocument,
        root: NodeId,
        config: EngineConfig,
        yielder: Rc<dyn Yielder>,
    ) -> Result<Self> {
        config.validate()?;
        {
            let doc = document.borrow();
            if doc.element(root).is_none() || !doc.is_attached(root) {
                return Err(Error::DetachedNode);
            }
        }

        let config = Rc::new(config);
        let scheduler = TransformationScheduler::new(document, &config, yielder)?;
        let controller = ResponsiveIntensityController::new(config.clone());

        let intensity = controller.current_intensity();
        info!(intensity = intensity.value(), width = config.viewport_width, "starting engine");
        scheduler.run(root, intensity).await;

        let observer = scheduler.observe(root, controller.subscribe());
        let rerun = scheduler.clone();
        let viewport = controller.on_viewport_change(move |intensity| {
            let scheduler = rerun.clone();
            async move {
                scheduler.run(root, intensity).await;
            }
        });

        Ok(Self {
            scheduler,
            controller,
            root,
            observer,
            viewport,
        })
    }

    pub fn document(&self) -> &SharedDocument {
        self.scheduler.document()
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn current_intensity(&self) -> Intensity {
        self.controller.current_intensity()
    }

    /// Report a new viewport width. The pass re-runs once the debounce
    /// settles, and only if the intensity changed.
    pub fn viewport_resized(&self, width: u32) {
        self.controller.viewport_resized(width);
    }

    pub fn stats(&self) -> EngineStats {
        let transformer = ElementTransformer;
        let doc = self.document().borrow();
        let transformed = doc
            .elements_within(self.root)
            .into_iter()
            .filter(|id| transformer.is_transformed(&doc, *id))
            .count();
        let hebrew_detected = self
            .scheduler
            .targets(&doc, self.root)
            .into_iter()
            .filter(|id| detect(&doc.text_content(*id)).is_rtl)
            .count();
        EngineStats {
            transformed,
            hebrew_detected,
            passes: self.scheduler.passes(),
            totals: self.scheduler.totals(),
        }
    }

    /// Undo every transformation under the root. Returns the number of
    /// elements reverted.
    pub fn revert_all(&self) -> usize {
        revert_subtree(self.document(), self.root)
    }

    /// Revert everything and run a fresh pass at the current intensity.
    pub async fn reinitialize(&self) -> Stats {
        let reverted = self.revert_all();
        self.scheduler.reset_totals();
        info!(reverted = reverted, "reinitializing");
        self.scheduler.run(self.root, self.current_intensity()).await
    }

    /// Stop observing insertions and viewport changes. The document keeps its
    /// current transformations.
    pub fn dispose(self) {
        self.observer.dispose();
        self.viewport.dispose();
        info!("engine disposed");
    }
}

/// Revert every marked element under `root`. Elements whose snapshot cannot
/// be decoded lose their marker but keep their styling.
pub fn revert_subtree(document: &SharedDocument, root: NodeId) -> usize {
    let transformer = ElementTransformer;
    let mut doc = document.borrow_mut();
    let marked: Vec<NodeId> = doc
        .elements_within(root)
        .into_iter()
        .filter(|id| transformer.is_transformed(&doc, *id))
        .collect();

    let mut reverted = 0;
    // Deepest first, so each element is restored under the ancestors it was
    // planned against.
    for id in marked.into_iter().rev() {
        match transformer.revert(&mut doc, id) {
            Ok(true) => reverted += 1,
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "dropping unreadable transform marker");
                if let Err(e) = transformer.discard_marker(&mut doc, id) {
                    debug!(error = %e, "marker could not be discarded");
                }
            }
        }
    }
    reverted
}
