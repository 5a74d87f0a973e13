//! Apply and undo mutation plans on single elements.
//!
//! A transformed element carries two attributes: `data-rtl-transformed`, the
//! marker external tooling looks for, and `data-rtl-state`, a JSON snapshot of
//! everything the transformer changed. Revert reads only the snapshot, so a
//! document written to disk after transforming can be reverted later.

use ego_tree::NodeId;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dom::Document;
use crate::error::{Error, Result};
use crate::planner::{AttributeChange, GateMask, MutationPlan, PropertyChange};

pub const MARKER_ATTR: &str = "data-rtl-transformed";
pub const STATE_ATTR: &str = "data-rtl-state";

/// Snapshot stored on a transformed element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedState {
    pub gates: GateMask,
    pub rtl: bool,
    pub changes: Vec<PropertyChange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<AttributeChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_style: Option<String>,
}

impl AppliedState {
    fn from_plan(plan: &MutationPlan) -> Self {
        Self {
            gates: plan.gates,
            rtl: plan.detection.is_rtl,
            changes: plan.changes.clone(),
            attributes: plan.attributes.clone(),
            previous_style: plan.previous_style.clone(),
        }
    }

    /// Whether applying `plan` would produce exactly this state's result.
    pub fn produces_same_result(&self, plan: &MutationPlan) -> bool {
        let same_changes = self.changes.len() == plan.changes.len()
            && self
                .changes
                .iter()
                .zip(&plan.changes)
                .all(|(a, b)| a.property == b.property && a.to == b.to);
        let same_attrs = self.attributes.len() == plan.attributes.len()
            && self
                .attributes
                .iter()
                .zip(&plan.attributes)
                .all(|(a, b)| a.name == b.name && a.value == b.value);
        self.gates == plan.gates && same_changes && same_attrs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The element already carries the result of an identical plan.
    Unchanged,
    /// The plan had nothing to change; no marker is written.
    Empty,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ElementTransformer;

impl ElementTransformer {
    pub fn is_transformed(&self, doc: &Document, id: NodeId) -> bool {
        doc.attr(id, MARKER_ATTR).is_some()
    }

    pub fn applied_state(&self, doc: &Document, id: NodeId) -> Result<Option<AppliedState>> {
        match doc.attr(id, STATE_ATTR) {
            Some(json) => serde_json::from_str(json)
                .map(Some)
                .map_err(|e| Error::State(e.to_string())),
            None => Ok(None),
        }
    }

    /// Apply `plan` and mark the element.
    ///
    /// Re-applying the plan that produced the current state is a no-op, as is
    /// a fresh plan for the same gates since the planner reads a marked
    /// element's recorded originals. A different plan first reverts the
    /// element, then applies.
    pub fn apply(
        &self,
        doc: &mut Document,
        id: NodeId,
        plan: &MutationPlan,
    ) -> Result<ApplyOutcome> {
        if !doc.is_attached(id) {
            return Err(Error::DetachedNode);
        }

        if let Some(state) = self.applied_state(doc, id)? {
            if state.produces_same_result(plan) {
                return Ok(ApplyOutcome::Unchanged);
            }
            self.revert(doc, id)?;
        }

        if plan.is_empty() {
            return Ok(ApplyOutcome::Empty);
        }

        for change in &plan.changes {
            doc.set_inline_property(id, change.property.name(), Some(&change.to))?;
        }
        for attr in &plan.attributes {
            doc.set_attr(id, &attr.name, &attr.value)?;
        }

        let state = serde_json::to_string(&AppliedState::from_plan(plan))
            .map_err(|e| Error::State(e.to_string()))?;
        doc.set_attr(id, STATE_ATTR, &state)?;
        doc.set_attr(id, MARKER_ATTR, "true")?;

        debug!(
            tag = doc.tag_name(id).unwrap_or_default(),
            changes = plan.changes.len(),
            attributes = plan.attributes.len(),
            "applied plan"
        );
        Ok(ApplyOutcome::Applied)
    }

    /// Restore the element to its pre-transform state and clear the marker.
    ///
    /// Returns `Ok(false)` (and logs) when the element was never transformed.
    pub fn revert(&self, doc: &mut Document, id: NodeId) -> Result<bool> {
        let Some(state) = self.applied_state(doc, id)? else {
            warn!(
                tag = doc.tag_name(id).unwrap_or_default(),
                "revert requested for untransformed element"
            );
            return Ok(false);
        };

        doc.restore_attr(id, "style", state.previous_style.as_deref())?;
        for attr in state.attributes.iter().rev() {
            doc.restore_attr(id, &attr.name, attr.previous.as_deref())?;
        }
        doc.remove_attr(id, STATE_ATTR)?;
        doc.remove_attr(id, MARKER_ATTR)?;
        Ok(true)
    }

    /// Drop a marker whose snapshot cannot be decoded. The element keeps its
    /// current styling since the original values are unknown.
    pub fn discard_marker(&self, doc: &mut Document, id: NodeId) -> Result<()> {
        doc.remove_attr(id, STATE_ATTR)?;
        doc.remove_attr(id, MARKER_ATTR)
    }
}
