//! DOM mutation records for incremental re-transformation.
//!
//! Structural edits made through [`Document`](crate::dom::Document) are
//! published to subscribers as records. Observers collect a burst of records
//! and re-run the pipeline only over the nodes those records added, never
//! over the whole tree.

use std::collections::HashSet;

use ego_tree::NodeId;

use crate::dom::Document;

/// One structural change under `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

/// Reduce a burst of records to the distinct subtree roots worth visiting.
///
/// Keeps added nodes that are still attached and inside `scope`, drops nodes
/// already covered by another added ancestor, and preserves arrival order.
pub fn added_roots(doc: &Document, scope: NodeId, records: &[MutationRecord]) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    let candidates: Vec<NodeId> = records
        .iter()
        .flat_map(|r| r.added.iter().copied())
        .filter(|id| seen.insert(*id))
        .filter(|id| doc.is_attached(*id) && doc.contains(scope, *id))
        .collect();

    candidates
        .iter()
        .copied()
        .filter(|id| {
            !candidates
                .iter()
                .any(|other| other != id && doc.contains(*other, *id))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Document, NodeId, NodeId) {
        let d = Document::parse(
            "<html><body><main id=scope><div id=inner></div></main><aside id=out></aside></body></html>",
        );
        let scope = d.query("#scope").unwrap().unwrap();
        let out = d.query("#out").unwrap().unwrap();
        (d, scope, out)
    }

    #[test]
    fn keeps_only_nodes_inside_scope() {
        let (mut d, scope, out) = setup();
        let inner = d.query("#inner").unwrap().unwrap();
        let a = d.append_html(inner, "<p>a</p>").unwrap();
        let b = d.append_html(out, "<p>b</p>").unwrap();
        let records = vec![
            MutationRecord { target: inner, added: a.clone(), removed: vec![] },
            MutationRecord { target: out, added: b, removed: vec![] },
        ];
        assert_eq!(added_roots(&d, scope, &records), a);
    }

    #[test]
    fn drops_descendants_of_other_added_nodes() {
        let (mut d, scope, _) = setup();
        let outer = d.append_html(scope, "<section></section>").unwrap();
        let nested = d.append_html(outer[0], "<p>x</p>").unwrap();
        let records = vec![
            MutationRecord { target: scope, added: outer.clone(), removed: vec![] },
            MutationRecord { target: outer[0], added: nested, removed: vec![] },
        ];
        assert_eq!(added_roots(&d, scope, &records), outer);
    }

    #[test]
    fn drops_nodes_detached_before_delivery() {
        let (mut d, scope, _) = setup();
        let added = d.append_html(scope, "<p>x</p><p>y</p>").unwrap();
        d.detach(added[0]).unwrap();
        let records = vec![MutationRecord { target: scope, added: added.clone(), removed: vec![] }];
        assert_eq!(added_roots(&d, scope, &records), vec![added[1]]);
    }

    #[test]
    fn duplicate_ids_collapse() {
        let (mut d, scope, _) = setup();
        let added = d.append_html(scope, "<p>x</p>").unwrap();
        let r = MutationRecord { target: scope, added: added.clone(), removed: vec![] };
        assert_eq!(added_roots(&d, scope, &[r.clone(), r]), added);
    }
}
