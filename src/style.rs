//! CSS values the engine reads and writes.
//!
//! Only the closed set of properties that matter for mirroring a layout is
//! modelled. Inline `style` attributes are kept verbatim as ordered
//! declarations so that unrelated properties survive a rewrite untouched.

use std::collections::{HashMap, HashSet};
use std::fmt;

use cssparser::{Delimiter, ParseError, Parser, ParserInput, Token};
use scraper::Selector;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CssProperty {
    Direction,
    TextAlign,
    MarginLeft,
    MarginRight,
    PaddingLeft,
    PaddingRight,
    Float,
    Display,
    FlexDirection,
    BorderTopLeftRadius,
    BorderTopRightRadius,
    BorderBottomLeftRadius,
    BorderBottomRightRadius,
}

impl CssProperty {
    pub const ALL: [CssProperty; 13] = [
        CssProperty::Direction,
        CssProperty::TextAlign,
        CssProperty::MarginLeft,
        CssProperty::MarginRight,
        CssProperty::PaddingLeft,
        CssProperty::PaddingRight,
        CssProperty::Float,
        CssProperty::Display,
        CssProperty::FlexDirection,
        CssProperty::BorderTopLeftRadius,
        CssProperty::BorderTopRightRadius,
        CssProperty::BorderBottomLeftRadius,
        CssProperty::BorderBottomRightRadius,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Direction => "direction",
            Self::TextAlign => "text-align",
            Self::MarginLeft => "margin-left",
            Self::MarginRight => "margin-right",
            Self::PaddingLeft => "padding-left",
            Self::PaddingRight => "padding-right",
            Self::Float => "float",
            Self::Display => "display",
            Self::FlexDirection => "flex-direction",
            Self::BorderTopLeftRadius => "border-top-left-radius",
            Self::BorderTopRightRadius => "border-top-right-radius",
            Self::BorderBottomLeftRadius => "border-bottom-left-radius",
            Self::BorderBottomRightRadius => "border-bottom-right-radius",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn is_inherited(self) -> bool {
        matches!(self, Self::Direction | Self::TextAlign)
    }

    /// Initial value. `display` has no single initial value here; the
    /// document supplies a per-tag default instead.
    pub fn initial(self) -> &'static str {
        match self {
            Self::Direction => "ltr",
            Self::TextAlign => "start",
            Self::Float => "none",
            Self::Display => "inline",
            Self::FlexDirection => "row",
            _ => "0px",
        }
    }
}

impl fmt::Display for CssProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a value leaves layout unaffected enough that mirroring it is churn.
pub fn is_trivial(value: &str) -> bool {
    matches!(value, "auto" | "0px" | "none")
}

/// Normalize a raw declaration value for comparison: keywords and units
/// lowercased, no `!important`, unitless zero spelled `0px`.
pub fn normalize_value(raw: &str) -> String {
    components(raw).join(" ")
}

/// Expand a declaration into the modelled longhands it sets.
///
/// Shorthands (`margin`, `padding`, `border-radius`) expand by the usual
/// one-to-four value rules. Properties outside the modelled set expand to
/// nothing.
pub fn expand(name: &str, value: &str) -> Vec<(CssProperty, String)> {
    let parts = components(value);
    if parts.is_empty() {
        return Vec::new();
    }
    match name {
        "margin" => horizontal_sides(&parts)
            .map(|(l, r)| vec![(CssProperty::MarginLeft, l), (CssProperty::MarginRight, r)])
            .unwrap_or_default(),
        "padding" => horizontal_sides(&parts)
            .map(|(l, r)| vec![(CssProperty::PaddingLeft, l), (CssProperty::PaddingRight, r)])
            .unwrap_or_default(),
        "border-radius" => corners(&parts)
            .map(|[tl, tr, br, bl]| {
                vec![
                    (CssProperty::BorderTopLeftRadius, tl),
                    (CssProperty::BorderTopRightRadius, tr),
                    (CssProperty::BorderBottomRightRadius, br),
                    (CssProperty::BorderBottomLeftRadius, bl),
                ]
            })
            .unwrap_or_default(),
        other => CssProperty::from_name(other)
            .map(|p| vec![(p, parts.join(" "))])
            .unwrap_or_default(),
    }
}

enum Component {
    Zero,
    Keyword,
    Block,
    Verbatim,
}

/// Top-level component values of a declaration value. Functions and blocks
/// such as `calc(1px + 2px)` stay whole; `!important` ends the list.
fn components(raw: &str) -> Vec<String> {
    let mut input = ParserInput::new(raw);
    let mut parser = Parser::new(&mut input);
    let mut out = Vec::new();

    loop {
        parser.skip_whitespace();
        let start = parser.position();
        let kind = match parser.next() {
            Err(_) | Ok(Token::Delim('!')) => break,
            Ok(Token::Number { value, .. }) if *value == 0.0 => Component::Zero,
            Ok(Token::Ident(_) | Token::Dimension { .. } | Token::Percentage { .. }) => {
                Component::Keyword
            }
            Ok(
                Token::Function(_)
                | Token::ParenthesisBlock
                | Token::SquareBracketBlock
                | Token::CurlyBracketBlock,
            ) => Component::Block,
            Ok(_) => Component::Verbatim,
        };
        if matches!(kind, Component::Block) && parser.parse_nested_block(skip_rest).is_err() {
            break;
        }
        let text = parser.slice_from(start).trim();
        out.push(match kind {
            Component::Zero => "0px".to_string(),
            Component::Keyword => text.to_ascii_lowercase(),
            Component::Block | Component::Verbatim => text.to_string(),
        });
    }
    out
}

fn skip_rest<'i>(parser: &mut Parser<'i, '_>) -> Result<(), ParseError<'i, ()>> {
    while parser.next().is_ok() {}
    Ok(())
}

/// (left, right) from `margin`/`padding` shorthand components.
fn horizontal_sides(t: &[String]) -> Option<(String, String)> {
    match t.len() {
        1 => Some((t[0].clone(), t[0].clone())),
        2 | 3 => Some((t[1].clone(), t[1].clone())),
        4 => Some((t[3].clone(), t[1].clone())),
        _ => None,
    }
}

/// [top-left, top-right, bottom-right, bottom-left] from `border-radius`.
/// Only the horizontal radii (before any `/`) are considered.
fn corners(parts: &[String]) -> Option<[String; 4]> {
    let t = parts.split(|p| p == "/").next().unwrap_or(parts);
    match t.len() {
        1 => Some([t[0].clone(), t[0].clone(), t[0].clone(), t[0].clone()]),
        2 => Some([t[0].clone(), t[1].clone(), t[0].clone(), t[1].clone()]),
        3 => Some([t[0].clone(), t[1].clone(), t[2].clone(), t[1].clone()]),
        4 => Some([t[0].clone(), t[1].clone(), t[2].clone(), t[3].clone()]),
        _ => None,
    }
}

/// Declarations up to the end of `parser`'s input, in source order. A
/// declaration that fails to parse is dropped up to its `;`.
fn parse_declaration_list(parser: &mut Parser<'_, '_>) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    while !parser.is_exhausted() {
        match parser.parse_until_after(Delimiter::Semicolon, parse_declaration) {
            Ok((name, value)) if !value.is_empty() => entries.push((name, value)),
            Ok(_) => {}
            Err(e) => debug!(error = ?e, "skipping malformed declaration"),
        }
    }
    entries
}

fn parse_declaration<'i>(
    parser: &mut Parser<'i, '_>,
) -> Result<(String, String), ParseError<'i, ()>> {
    let ident = parser.expect_ident()?;
    let name = if ident.starts_with("--") {
        ident.to_string()
    } else {
        ident.to_ascii_lowercase()
    };
    parser.expect_colon()?;
    parser.skip_whitespace();
    let start = parser.position();
    while parser.next().is_ok() {}
    Ok((name, parser.slice_from(start).trim().to_string()))
}

fn parse_declaration_block<'i>(
    parser: &mut Parser<'i, '_>,
) -> Result<Vec<(String, String)>, ParseError<'i, ()>> {
    Ok(parse_declaration_list(parser))
}

/// Declarations of an inline `style` attribute, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleDeclarations {
    entries: Vec<(String, String)>,
}

impl StyleDeclarations {
    pub fn parse(css: &str) -> Self {
        let mut input = ParserInput::new(css);
        let mut parser = Parser::new(&mut input);
        Self {
            entries: parse_declaration_list(&mut parser),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set a declaration. Any earlier declaration of the same name is removed
    /// and the new one is appended, so it wins over preceding shorthands.
    pub fn set(&mut self, name: &str, value: &str) {
        self.remove(name);
        self.entries.push((name.to_string(), value.to_string()));
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| n != name);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Modelled longhands in cascade order (later entries win).
    pub fn longhands(&self) -> Vec<(CssProperty, String)> {
        self.iter().flat_map(|(n, v)| expand(n, v)).collect()
    }

    pub fn to_css_text(&self) -> String {
        self.entries
            .iter()
            .map(|(n, v)| format!("{n}: {v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Resolved values of the modelled properties for one element.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedStyle {
    values: HashMap<CssProperty, String>,
    specified: HashSet<CssProperty>,
}

impl ComputedStyle {
    pub(crate) fn new(
        values: HashMap<CssProperty, String>,
        specified: HashSet<CssProperty>,
    ) -> Self {
        Self { values, specified }
    }

    pub fn get(&self, property: CssProperty) -> &str {
        self.values
            .get(&property)
            .map(String::as_str)
            .unwrap_or_else(|| property.initial())
    }

    /// True when the value was set on the element itself rather than
    /// inherited or left at its initial value.
    pub fn is_specified(&self, property: CssProperty) -> bool {
        self.specified.contains(&property)
    }

    pub fn is_flex_container(&self) -> bool {
        matches!(self.get(CssProperty::Display), "flex" | "inline-flex")
    }
}

#[derive(Debug, Clone)]
pub struct StyleRule {
    pub selector: Selector,
    pub declarations: Vec<(CssProperty, String)>,
}

/// Rules collected from a document's `<style>` elements.
///
/// Only plain `selector { declarations }` rules are understood. At-rule
/// blocks such as `@media` are skipped whole, and rules are applied in source
/// order without specificity.
#[derive(Debug, Clone, Default)]
pub struct StyleSheet {
    pub rules: Vec<StyleRule>,
}

enum Step {
    Block,
    AtKeyword,
    Semicolon,
    Other,
    End,
}

impl StyleSheet {
    pub fn parse(css: &str) -> Self {
        let mut input = ParserInput::new(css);
        let mut parser = Parser::new(&mut input);
        let mut rules = Vec::new();

        while !parser.is_exhausted() {
            parser.skip_whitespace();
            let start = parser.position();
            let mut prelude_end = start;
            let mut at_rule = false;
            let mut first = true;

            let has_block = loop {
                let before = parser.position();
                let step = match parser.next() {
                    Ok(Token::CurlyBracketBlock) => Step::Block,
                    Ok(Token::AtKeyword(_)) => Step::AtKeyword,
                    Ok(Token::Semicolon) => Step::Semicolon,
                    Ok(_) => Step::Other,
                    Err(_) => Step::End,
                };
                match step {
                    Step::Block => {
                        prelude_end = before;
                        break true;
                    }
                    Step::End => break false,
                    Step::Semicolon if at_rule => break false,
                    Step::AtKeyword if first => at_rule = true,
                    _ => {}
                }
                first = false;
            };
            if !has_block {
                continue;
            }

            let prelude = parser.slice(start..prelude_end).trim();
            if at_rule {
                debug!(rule = %prelude, "skipping at-rule block");
                if let Err(e) = parser.parse_nested_block(skip_rest) {
                    debug!(error = ?e, "unterminated at-rule block");
                }
                continue;
            }

            let declarations = match parser.parse_nested_block(parse_declaration_block) {
                Ok(entries) => entries
                    .iter()
                    .flat_map(|(n, v)| expand(n, v))
                    .collect::<Vec<_>>(),
                Err(e) => {
                    debug!(selector = %prelude, error = ?e, "skipping malformed rule body");
                    continue;
                }
            };
            match Selector::parse(prelude) {
                Ok(selector) if !declarations.is_empty() => rules.push(StyleRule {
                    selector,
                    declarations,
                }),
                Ok(_) => {}
                Err(e) => {
                    debug!(selector = %prelude, error = ?e, "skipping unparsable stylesheet rule")
                }
            }
        }

        Self { rules }
    }

    pub fn extend(&mut self, other: StyleSheet) {
        self.rules.extend(other.rules);
    }
}
