//! Decide which CSS properties to flip for one element.
//!
//! The planner reads the element's computed style once and produces a
//! [`MutationPlan`]: the property and attribute changes that mirror it, each
//! paired with the value it replaces so the plan can always be undone.

use std::collections::BTreeMap;

use ego_tree::NodeId;
use scraper::Selector;
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, GroupThresholds};
use crate::detect::DetectionResult;
use crate::dom::{parse_selector, Document};
use crate::error::Result;
use crate::responsive::Intensity;
use crate::style::{is_trivial, ComputedStyle, CssProperty};
use crate::transform::{AppliedState, ElementTransformer};

/// Property families switched on and off by intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyGroup {
    /// `direction`, `text-align`
    Text,
    /// horizontal margins and paddings
    Spacing,
    Float,
    /// `flex-direction` on flex containers
    Flex,
    /// border radii
    Corners,
}

impl PropertyGroup {
    pub const ALL: [PropertyGroup; 5] =
        [Self::Text, Self::Spacing, Self::Float, Self::Flex, Self::Corners];

    fn bit(self) -> u8 {
        match self {
            Self::Text => 1,
            Self::Spacing => 1 << 1,
            Self::Float => 1 << 2,
            Self::Flex => 1 << 3,
            Self::Corners => 1 << 4,
        }
    }

    pub fn threshold(self, thresholds: &GroupThresholds) -> u8 {
        match self {
            Self::Text => thresholds.text,
            Self::Spacing => thresholds.spacing,
            Self::Float => thresholds.float,
            Self::Flex => thresholds.flex,
            Self::Corners => thresholds.corners,
        }
    }
}

/// The set of property groups enabled at some intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GateMask(u8);

impl GateMask {
    pub fn for_intensity(intensity: Intensity, thresholds: &GroupThresholds) -> Self {
        let bits = PropertyGroup::ALL
            .into_iter()
            .filter(|g| intensity.value() >= g.threshold(thresholds))
            .fold(0, |acc, g| acc | g.bit());
        Self(bits)
    }

    pub fn allows(self, group: PropertyGroup) -> bool {
        self.0 & group.bit() != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyChange {
    pub property: CssProperty,
    /// Computed value before the change.
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub name: String,
    pub previous: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationPlan {
    pub detection: DetectionResult,
    pub gates: GateMask,
    pub changes: Vec<PropertyChange>,
    pub attributes: Vec<AttributeChange>,
    /// The inline `style` attribute the changes are written over.
    pub previous_style: Option<String>,
}

impl MutationPlan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.attributes.is_empty()
    }

    pub fn get(&self, property: CssProperty) -> Option<&str> {
        self.changes
            .iter()
            .find(|c| c.property == property)
            .map(|c| c.to.as_str())
    }

    /// Computed values of every planned property before the plan is applied.
    pub fn previous_values(&self) -> BTreeMap<CssProperty, &str> {
        self.changes.iter().map(|c| (c.property, c.from.as_str())).collect()
    }

    fn change(&mut self, style: &ComputedStyle, property: CssProperty, to: &str) {
        self.changes.push(PropertyChange {
            property,
            from: style.get(property).to_string(),
            to: to.to_string(),
        });
    }

    fn attribute(&mut self, original: &Original<'_>, name: &str, value: &str) {
        let previous = original.attr(name);
        if previous != Some(value) {
            self.attributes.push(AttributeChange {
                name: name.to_string(),
                previous: previous.map(String::from),
                value: value.to_string(),
            });
        }
    }

    /// Swap a left/right pair. Equal sides, or two sides that are both
    /// `auto`/`0px`/`none`, would produce a no-op and are skipped.
    fn swap_pair(&mut self, style: &ComputedStyle, left: CssProperty, right: CssProperty) {
        let (l, r) = (style.get(left).to_string(), style.get(right).to_string());
        if l == r || (is_trivial(&l) && is_trivial(&r)) {
            return;
        }
        self.change(style, left, &r);
        self.change(style, right, &l);
    }
}

/// An element's own attributes as they were before the transformation
/// recorded on it, if any.
struct Original<'a> {
    doc: &'a Document,
    id: NodeId,
    state: Option<AppliedState>,
}

impl<'a> Original<'a> {
    fn read(doc: &'a Document, id: NodeId) -> Self {
        let state = ElementTransformer.applied_state(doc, id).ok().flatten();
        Self { doc, id, state }
    }

    fn attr(&self, name: &str) -> Option<&str> {
        let recorded = self
            .state
            .as_ref()
            .and_then(|s| s.attributes.iter().find(|a| a.name == name));
        match recorded {
            Some(change) => change.previous.as_deref(),
            None => self.doc.attr(self.id, name),
        }
    }

    fn style(&self) -> Option<&str> {
        match &self.state {
            Some(state) => state.previous_style.as_deref(),
            None => self.doc.attr(self.id, "style"),
        }
    }
}

pub struct StyleMutationPlanner {
    thresholds: GroupThresholds,
    preserve_ltr: Option<Selector>,
    language: String,
}

impl StyleMutationPlanner {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let preserve_ltr = if config.selectors.preserve_ltr.is_empty() {
            None
        } else {
            Some(parse_selector(&config.selectors.preserve_ltr.join(", "))?)
        };
        Ok(Self {
            thresholds: config.thresholds,
            preserve_ltr,
            language: config.language.clone(),
        })
    }

    pub fn gates(&self, intensity: Intensity) -> GateMask {
        GateMask::for_intensity(intensity, &self.thresholds)
    }

    /// Code and preformatted elements keep left-to-right layout.
    pub fn is_preserved(&self, doc: &Document, id: NodeId) -> bool {
        self.preserve_ltr.as_ref().is_some_and(|s| doc.matches(id, s))
    }

    /// Plan the mirroring of one element. Returns `None` if `id` is not an
    /// element of `doc`.
    ///
    /// An element that already carries a transformation is planned from its
    /// recorded original `style`, `dir` and `lang`, so the plan describes
    /// the untransformed element in its current context.
    pub fn plan(
        &self,
        doc: &Document,
        id: NodeId,
        detection: &DetectionResult,
        intensity: Intensity,
    ) -> Option<MutationPlan> {
        let original = Original::read(doc, id);
        let style = doc.computed_style_with(id, original.attr("dir"), original.style())?;
        let mut plan = MutationPlan {
            detection: *detection,
            gates: self.gates(intensity),
            changes: Vec::new(),
            attributes: Vec::new(),
            previous_style: original.style().map(String::from),
        };

        if self.is_preserved(doc, id) {
            let text = plan.gates.allows(PropertyGroup::Text);
            if text && style.get(CssProperty::Direction) == "rtl" {
                plan.change(&style, CssProperty::Direction, "ltr");
                if matches!(style.get(CssProperty::TextAlign), "start" | "right") {
                    plan.change(&style, CssProperty::TextAlign, "left");
                }
                plan.attribute(&original, "dir", "ltr");
            }
            return Some(plan);
        }

        if !detection.is_rtl {
            return Some(plan);
        }

        if plan.gates.allows(PropertyGroup::Text) {
            if style.get(CssProperty::Direction) != "rtl" {
                plan.change(&style, CssProperty::Direction, "rtl");
            }
            let align = style.get(CssProperty::TextAlign);
            let target = if style.is_specified(CssProperty::TextAlign) {
                match align {
                    "left" => Some("right"),
                    "right" => Some("left"),
                    _ => None,
                }
            } else {
                matches!(align, "start" | "left").then_some("right")
            };
            if let Some(to) = target {
                plan.change(&style, CssProperty::TextAlign, to);
            }
            plan.attribute(&original, "dir", "rtl");
            plan.attribute(&original, "lang", &self.language);
        }

        if plan.gates.allows(PropertyGroup::Spacing) {
            plan.swap_pair(&style, CssProperty::MarginLeft, CssProperty::MarginRight);
            plan.swap_pair(&style, CssProperty::PaddingLeft, CssProperty::PaddingRight);
        }

        if plan.gates.allows(PropertyGroup::Float) {
            match style.get(CssProperty::Float) {
                "left" => plan.change(&style, CssProperty::Float, "right"),
                "right" => plan.change(&style, CssProperty::Float, "left"),
                _ => {}
            }
        }

        if plan.gates.allows(PropertyGroup::Flex)
            && style.is_flex_container()
            && style.get(CssProperty::FlexDirection) == "row"
        {
            plan.change(&style, CssProperty::FlexDirection, "row-reverse");
        }

        if plan.gates.allows(PropertyGroup::Corners) {
            plan.swap_pair(
                &style,
                CssProperty::BorderTopLeftRadius,
                CssProperty::BorderTopRightRadius,
            );
            plan.swap_pair(
                &style,
                CssProperty::BorderBottomLeftRadius,
                CssProperty::BorderBottomRightRadius,
            );
        }

        Some(plan)
    }
}
