//! Post-transform verification.
//!
//! Re-reads computed style for every marked element and compares it with what
//! the marker snapshot says was applied. Code blocks are checked separately:
//! none of them may end up right-to-left.

use std::fmt;

use ego_tree::NodeId;
use scraper::Selector;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::dom::{parse_selector, Document};
use crate::error::Result;
use crate::style::CssProperty;
use crate::transform::ElementTransformer;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    #[serde(skip)]
    pub node: NodeId,
    pub tag: String,
    /// CSS property or `@attribute` name.
    pub property: String,
    pub expected: String,
    pub actual: String,
    pub passed: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationReport {
    pub elements: usize,
    pub checks: Vec<Check>,
}

impl VerificationReport {
    pub fn passed(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.checks.len() - self.passed()
    }

    pub fn is_clean(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    fn check(
        &mut self,
        doc: &Document,
        node: NodeId,
        property: String,
        expected: &str,
        actual: Option<&str>,
    ) {
        let actual = actual.unwrap_or("(unset)");
        self.checks.push(Check {
            node,
            tag: doc.tag_name(node).unwrap_or_default().to_string(),
            property,
            expected: expected.to_string(),
            actual: actual.to_string(),
            passed: expected == actual,
        });
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in &self.checks {
            let mark = if c.passed { '✓' } else { '✗' };
            write!(f, "{mark} <{}> {}: {}", c.tag, c.property, c.actual)?;
            if !c.passed {
                write!(f, " (expected {})", c.expected)?;
            }
            writeln!(f)?;
        }
        write!(
            f,
            "{} transformed elements, {} checks: {} passed, {} failed",
            self.elements,
            self.checks.len(),
            self.passed(),
            self.failed()
        )
    }
}

pub struct VerificationReporter {
    preserve_ltr: Option<Selector>,
}

impl VerificationReporter {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let preserve_ltr = if config.selectors.preserve_ltr.is_empty() {
            None
        } else {
            Some(parse_selector(&config.selectors.preserve_ltr.join(", "))?)
        };
        Ok(Self { preserve_ltr })
    }

    pub fn verify(&self, doc: &Document, root: NodeId) -> VerificationReport {
        let transformer = ElementTransformer;
        let mut report = VerificationReport::default();

        for id in doc.elements_within(root) {
            if let Some(preserve) = &self.preserve_ltr {
                if doc.matches(id, preserve) {
                    let direction = doc
                        .computed_style(id)
                        .map(|s| s.get(CssProperty::Direction).to_string());
                    let actual = direction.as_deref();
                    // ltr is the only acceptable value here
                    report.check(doc, id, "direction".to_string(), "ltr", actual);
                }
            }

            if !transformer.is_transformed(doc, id) {
                continue;
            }
            report.elements += 1;

            let state = match transformer.applied_state(doc, id) {
                Ok(Some(state)) => state,
                Ok(None) => {
                    report.check(doc, id, state_property(), "snapshot", None);
                    continue;
                }
                Err(e) => {
                    let err = e.to_string();
                    report.check(doc, id, state_property(), "snapshot", Some(&err));
                    continue;
                }
            };

            let Some(style) = doc.computed_style(id) else {
                continue;
            };
            for change in &state.changes {
                let actual = style.get(change.property);
                let property = change.property.name().to_string();
                report.check(doc, id, property, &change.to, Some(actual));
            }
            for attr in &state.attributes {
                let actual = doc.attr(id, &attr.name);
                report.check(doc, id, format!("@{}", attr.name), &attr.value, actual);
            }
        }
        report
    }
}

fn state_property() -> String {
    format!("@{}", crate::transform::STATE_ATTR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::detect;
    use crate::planner::StyleMutationPlanner;
    use crate::responsive::Intensity;

    fn transformed(body: &str) -> (Document, NodeId) {
        let mut d = Document::parse(&format!("<html><head></head><body>{body}</body></html>"));
        let planner = StyleMutationPlanner::new(&EngineConfig::default()).unwrap();
        let root = d.body().unwrap();
        for id in d.elements_within(root) {
            if d.tag_name(id) == Some("body") {
                continue;
            }
            let plan = planner
                .plan(&d, id, &detect(&d.text_content(id)), Intensity::new(100).unwrap())
                .unwrap();
            ElementTransformer.apply(&mut d, id, &plan).unwrap();
        }
        (d, root)
    }

    #[test]
    fn freshly_transformed_document_is_clean() {
        let (d, root) = transformed(r#"<div style="float: left; margin-left: 8px"><p>שלום</p><pre>let x = 1;</pre></div>"#);
        let report = VerificationReporter::new(&EngineConfig::default()).unwrap().verify(&d, root);
        assert!(report.is_clean(), "{report}");
        assert_eq!(report.elements, 3);
        assert!(report.checks.iter().any(|c| c.tag == "pre" && c.property == "direction"));
    }

    #[test]
    fn tampered_style_is_reported() {
        let (mut d, root) = transformed(r#"<p style="float: left">שלום</p>"#);
        let p = d.query("p").unwrap().unwrap();
        d.set_inline_property(p, "float", Some("left")).unwrap();

        let report = VerificationReporter::new(&EngineConfig::default()).unwrap().verify(&d, root);
        assert_eq!(report.failed(), 1);
        let failed = report.checks.iter().find(|c| !c.passed).unwrap();
        assert_eq!(failed.property, "float");
        assert_eq!(failed.expected, "right");
        assert_eq!(failed.actual, "left");
        assert!(report.to_string().contains("✗ <p> float: left (expected right)"));
    }

    #[test]
    fn report_serializes_to_json() {
        let (d, root) = transformed("<p>שלום</p>");
        let report = VerificationReporter::new(&EngineConfig::default()).unwrap().verify(&d, root);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["elements"], 1);
        assert_eq!(json["checks"][0]["tag"], "p");
    }
}
