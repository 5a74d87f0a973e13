//! In-memory HTML document the engine annotates.
//!
//! The parsed `scraper` tree is kept as-is; attributes written after parsing
//! live in an overlay keyed by node id and shadow the parsed ones on every
//! read. Selector matching runs against the parsed attributes, so engine
//! bookkeeping (markers, `dir`, `style`) never changes which elements a
//! configured selector picks.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use ego_tree::{NodeId, NodeRef, Tree};
use scraper::{ElementRef, Html, Node, Selector};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::mutation::MutationRecord;
use crate::style::{normalize_value, ComputedStyle, CssProperty, StyleDeclarations, StyleSheet};

/// Single-threaded shared handle. Borrows must not be held across `.await`.
pub type SharedDocument = Rc<RefCell<Document>>;

/// Tags rendered as blocks by the user-agent stylesheet.
const BLOCK_TAGS: &[&str] = &[
    "html", "body", "div", "p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "dl", "dt", "dd",
    "section", "article", "header", "footer", "nav", "main", "aside", "form", "fieldset",
    "blockquote", "pre", "figure", "figcaption", "address", "details", "summary", "hr",
];

const HIDDEN_TAGS: &[&str] = &[
    "head", "script", "style", "template", "noscript", "meta", "link", "title",
];

pub fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| Error::InvalidConfig(format!("invalid selector {css:?}: {e:?}")))
}

fn ua_display(tag: &str) -> &'static str {
    if BLOCK_TAGS.contains(&tag) {
        "block"
    } else if HIDDEN_TAGS.contains(&tag) {
        "none"
    } else {
        match tag {
            "li" => "list-item",
            "table" => "table",
            "tr" => "table-row",
            "td" | "th" => "table-cell",
            _ => "inline",
        }
    }
}

type AttrOverlay = BTreeMap<String, Option<String>>;

pub struct Document {
    html: Html,
    overlay: HashMap<NodeId, AttrOverlay>,
    sheet: StyleSheet,
    subscribers: Vec<mpsc::UnboundedSender<MutationRecord>>,
}

impl Document {
    pub fn parse(source: &str) -> Self {
        let html = Html::parse_document(source);
        let mut sheet = StyleSheet::default();
        collect_styles(html.tree.root(), &mut sheet);
        debug!(html_len = source.len(), rules = sheet.rules.len(), "parsed document");
        Self {
            html,
            overlay: HashMap::new(),
            sheet,
            subscribers: Vec::new(),
        }
    }

    pub fn into_shared(self) -> SharedDocument {
        Rc::new(RefCell::new(self))
    }

    pub(crate) fn tree(&self) -> &Tree<Node> {
        &self.html.tree
    }

    /// The `<html>` element.
    pub fn root(&self) -> NodeId {
        self.html.root_element().id()
    }

    pub fn body(&self) -> Option<NodeId> {
        self.html
            .root_element()
            .children()
            .filter_map(ElementRef::wrap)
            .find(|e| e.value().name() == "body")
            .map(|e| e.id())
    }

    pub fn element(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.html.tree.get(id).and_then(ElementRef::wrap)
    }

    pub fn query(&self, css: &str) -> Result<Option<NodeId>> {
        let selector = parse_selector(css)?;
        Ok(self.html.select(&selector).next().map(|e| e.id()))
    }

    pub fn query_all(&self, css: &str) -> Result<Vec<NodeId>> {
        let selector = parse_selector(css)?;
        Ok(self.html.select(&selector).map(|e| e.id()).collect())
    }

    /// Every element in the subtree rooted at `root`, root included, in
    /// document order.
    pub fn elements_within(&self, root: NodeId) -> Vec<NodeId> {
        match self.html.tree.get(root) {
            Some(node) => node
                .descendants()
                .filter(|n| n.value().is_element())
                .map(|n| n.id())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Elements under `root` (root included) matching `selector`.
    pub fn select_within(&self, root: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.elements_within(root)
            .into_iter()
            .filter(|id| self.matches(*id, selector))
            .collect()
    }

    pub fn matches(&self, id: NodeId, selector: &Selector) -> bool {
        self.element(id).is_some_and(|e| selector.matches(&e))
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.value().name())
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        if let Some(value) = self.overlay.get(&id).and_then(|o| o.get(name)) {
            return value.as_deref();
        }
        self.element(id).and_then(|e| e.value().attr(name))
    }

    /// Attributes with overlay writes applied, in name order.
    pub fn attrs(&self, id: NodeId) -> Vec<(String, String)> {
        let Some(el) = self.element(id) else {
            return Vec::new();
        };
        let mut merged: BTreeMap<String, String> = el
            .value()
            .attrs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        for (k, v) in self.overlay.get(&id).into_iter().flatten() {
            match v {
                Some(v) => merged.insert(k.clone(), v.clone()),
                None => merged.remove(k),
            };
        }
        merged.into_iter().collect()
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> Result<()> {
        self.ensure_element(id)?;
        self.overlay
            .entry(id)
            .or_default()
            .insert(name.to_string(), Some(value.to_string()));
        Ok(())
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Result<()> {
        self.ensure_element(id)?;
        self.overlay.entry(id).or_default().insert(name.to_string(), None);
        Ok(())
    }

    /// Set an attribute to `Some` value or remove it with `None`.
    pub fn restore_attr(&mut self, id: NodeId, name: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(v) => self.set_attr(id, name, v),
            None => self.remove_attr(id, name),
        }
    }

    pub fn inline_style(&self, id: NodeId) -> StyleDeclarations {
        self.attr(id, "style").map(StyleDeclarations::parse).unwrap_or_default()
    }

    pub fn set_inline_property(
        &mut self,
        id: NodeId,
        property: &str,
        value: Option<&str>,
    ) -> Result<()> {
        let mut decls = self.inline_style(id);
        match value {
            Some(v) => decls.set(property, v),
            None => decls.remove(property),
        }
        if decls.is_empty() {
            self.remove_attr(id, "style")
        } else {
            self.set_attr(id, "style", &decls.to_css_text())
        }
    }

    pub fn text_content(&self, id: NodeId) -> String {
        self.element(id).map(|e| e.text().collect()).unwrap_or_default()
    }

    /// Whether the node is still reachable from the document root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let root = self.html.tree.root().id();
        match self.html.tree.get(id) {
            Some(node) => node.id() == root || node.ancestors().any(|a| a.id() == root),
            None => false,
        }
    }

    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        match self.html.tree.get(node) {
            Some(n) => n.id() == ancestor || n.ancestors().any(|a| a.id() == ancestor),
            None => false,
        }
    }

    /// Parse `fragment` and append its top-level nodes to `parent`.
    ///
    /// Subscribers receive one record listing the appended nodes.
    pub fn append_html(&mut self, parent: NodeId, fragment: &str) -> Result<Vec<NodeId>> {
        if !self.is_attached(parent) {
            return Err(Error::DetachedNode);
        }
        let parsed = Html::parse_fragment(fragment);
        let mut added = Vec::new();
        for child in parsed.root_element().children() {
            let id = copy_subtree(&mut self.html.tree, parent, child).ok_or(Error::DetachedNode)?;
            added.push(id);
        }
        collect_styles(parsed.tree.root(), &mut self.sheet);

        debug!(added = added.len(), "appended fragment");
        self.notify(MutationRecord {
            target: parent,
            added: added.clone(),
            removed: Vec::new(),
        });
        Ok(added)
    }

    /// Remove a node (and its subtree) from the document.
    pub fn detach(&mut self, id: NodeId) -> Result<()> {
        let parent = self
            .html
            .tree
            .get(id)
            .and_then(|n| n.parent())
            .map(|p| p.id())
            .ok_or(Error::DetachedNode)?;
        self.html.tree.get_mut(id).ok_or(Error::DetachedNode)?.detach();
        self.notify(MutationRecord {
            target: parent,
            added: Vec::new(),
            removed: vec![id],
        });
        Ok(())
    }

    /// Receive a record for every structural change made through this document.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<MutationRecord> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    fn notify(&mut self, record: MutationRecord) {
        self.subscribers.retain(|tx| tx.send(record.clone()).is_ok());
    }

    fn ensure_element(&self, id: NodeId) -> Result<()> {
        if self.element(id).is_some() {
            Ok(())
        } else {
            Err(Error::DetachedNode)
        }
    }

    /// Resolve the modelled properties for an element.
    ///
    /// Cascade, lowest first: user-agent defaults, the `dir` attribute,
    /// `<style>` rules in source order, then the inline `style` attribute.
    /// `direction` and `text-align` inherit when not set on the element.
    pub fn computed_style(&self, id: NodeId) -> Option<ComputedStyle> {
        self.computed_style_with(id, self.attr(id, "dir"), self.attr(id, "style"))
    }

    /// Like [`computed_style`](Self::computed_style), with the element's own
    /// `dir` and `style` attributes replaced by `dir` and `style`. Ancestors
    /// resolve as they currently are.
    pub fn computed_style_with(
        &self,
        id: NodeId,
        dir: Option<&str>,
        style: Option<&str>,
    ) -> Option<ComputedStyle> {
        let el = self.element(id)?;
        let parent = el
            .parent()
            .and_then(ElementRef::wrap)
            .and_then(|p| self.computed_style(p.id()));

        let mut values: HashMap<CssProperty, String> = HashMap::new();
        let mut specified: HashSet<CssProperty> = HashSet::new();
        values.insert(CssProperty::Display, ua_display(el.value().name()).to_string());

        if let Some(dir) = dir.map(normalize_value) {
            if dir == "rtl" || dir == "ltr" {
                values.insert(CssProperty::Direction, dir);
                specified.insert(CssProperty::Direction);
            }
        }

        let cascaded = self
            .sheet
            .rules
            .iter()
            .filter(|rule| rule.selector.matches(&el))
            .flat_map(|rule| rule.declarations.iter().cloned())
            .chain(style.map(StyleDeclarations::parse).unwrap_or_default().longhands());
        for (property, value) in cascaded {
            if property == CssProperty::Display || value != "inherit" {
                values.insert(property, value);
                specified.insert(property);
            } else if let Some(p) = &parent {
                values.insert(property, p.get(property).to_string());
                specified.remove(&property);
            }
        }

        if let Some(p) = &parent {
            for property in CssProperty::ALL {
                if property.is_inherited() && !values.contains_key(&property) {
                    values.insert(property, p.get(property).to_string());
                }
            }
        }

        Some(ComputedStyle::new(values, specified))
    }
}

fn collect_styles(root: NodeRef<'_, Node>, sheet: &mut StyleSheet) {
    for node in root.descendants() {
        let Some(el) = ElementRef::wrap(node) else { continue };
        if el.value().name() == "style" {
            let css: String = el.text().collect();
            sheet.extend(StyleSheet::parse(&css));
        }
    }
}

fn copy_subtree(
    tree: &mut Tree<Node>,
    parent: NodeId,
    source: NodeRef<'_, Node>,
) -> Option<NodeId> {
    let id = tree.get_mut(parent)?.append(source.value().clone()).id();
    for child in source.children() {
        copy_subtree(tree, id, child)?;
    }
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> Document {
        Document::parse(&format!("<html><head></head><body>{body}</body></html>"))
    }

    fn first(d: &Document, css: &str) -> NodeId {
        d.query(css).unwrap().unwrap()
    }

    #[test]
    fn overlay_shadows_parsed_attributes() {
        let mut d = doc(r#"<p id="x" class="a" dir="ltr">hi</p>"#);
        let p = first(&d, "#x");
        d.set_attr(p, "dir", "rtl").unwrap();
        d.set_attr(p, "lang", "he").unwrap();
        d.remove_attr(p, "class").unwrap();
        assert_eq!(d.attr(p, "dir"), Some("rtl"));
        assert_eq!(d.attr(p, "class"), None);
        assert_eq!(
            d.attrs(p),
            vec![
                ("dir".to_string(), "rtl".to_string()),
                ("id".to_string(), "x".to_string()),
                ("lang".to_string(), "he".to_string()),
            ]
        );
    }

    #[test]
    fn selectors_see_parsed_attributes_only() {
        let mut d = doc(r#"<p class="a">hi</p>"#);
        let p = first(&d, "p");
        d.remove_attr(p, "class").unwrap();
        assert_eq!(d.query_all(".a").unwrap(), vec![p]);
    }

    #[test]
    fn inline_property_round_trip() {
        let mut d = doc(r#"<p style="color: red">hi</p>"#);
        let p = first(&d, "p");
        d.set_inline_property(p, "float", Some("right")).unwrap();
        assert_eq!(d.attr(p, "style"), Some("color: red; float: right"));
        d.set_inline_property(p, "float", None).unwrap();
        d.set_inline_property(p, "color", None).unwrap();
        assert_eq!(d.attr(p, "style"), None);
    }

    #[test]
    fn computed_style_cascade_order() {
        let d = Document::parse(
            r#"<html><head><style>p { float: left; margin: 0 4px } .r { float: right }</style></head>
               <body><p class="r" style="margin-left: 9px">x</p></body></html>"#,
        );
        let p = first(&d, "p");
        let cs = d.computed_style(p).unwrap();
        assert_eq!(cs.get(CssProperty::Float), "right");
        assert_eq!(cs.get(CssProperty::MarginLeft), "9px");
        assert_eq!(cs.get(CssProperty::MarginRight), "4px");
        assert_eq!(cs.get(CssProperty::Display), "block");
        assert!(cs.is_specified(CssProperty::Float));
        assert!(!cs.is_specified(CssProperty::PaddingLeft));
    }

    #[test]
    fn string_with_brace_does_not_swallow_next_rule() {
        let d = Document::parse(
            r#"<html><head><style>.x::before { content: "}" } .icon { float: left }</style></head>
               <body><span class="icon">*</span></body></html>"#,
        );
        let icon = first(&d, ".icon");
        assert_eq!(d.computed_style(icon).unwrap().get(CssProperty::Float), "left");
    }

    #[test]
    fn inline_edit_keeps_data_urls_intact() {
        let mut d =
            doc(r#"<p style="background-image: url(data:image/png;base64,AAAA); float: left">x</p>"#);
        let p = first(&d, "p");
        d.set_inline_property(p, "float", Some("right")).unwrap();
        assert_eq!(
            d.attr(p, "style"),
            Some("background-image: url(data:image/png;base64,AAAA); float: right")
        );
    }

    #[test]
    fn computed_style_with_substitutes_own_attributes() {
        let d = doc(
            r#"<div dir="rtl" style="float: right"><p dir="rtl" style="float: left">x</p></div>"#,
        );
        let p = first(&d, "p");
        let cs = d.computed_style_with(p, None, Some("margin-left: 3px")).unwrap();
        assert_eq!(cs.get(CssProperty::Direction), "rtl");
        assert!(!cs.is_specified(CssProperty::Direction));
        assert_eq!(cs.get(CssProperty::Float), "none");
        assert_eq!(cs.get(CssProperty::MarginLeft), "3px");
    }

    #[test]
    fn direction_inherits_from_dir_attribute() {
        let d = doc(r#"<div dir="rtl"><span>x</span><pre style="direction: ltr">y</pre></div>"#);
        let span = first(&d, "span");
        let pre = first(&d, "pre");
        let span_cs = d.computed_style(span).unwrap();
        assert_eq!(span_cs.get(CssProperty::Direction), "rtl");
        assert!(!span_cs.is_specified(CssProperty::Direction));
        assert_eq!(d.computed_style(pre).unwrap().get(CssProperty::Direction), "ltr");
    }

    #[test]
    fn inherit_keyword_takes_parent_value() {
        let d = doc(r#"<div style="text-align: right"><p style="text-align: inherit">x</p></div>"#);
        let p = first(&d, "p");
        let cs = d.computed_style(p).unwrap();
        assert_eq!(cs.get(CssProperty::TextAlign), "right");
        assert!(!cs.is_specified(CssProperty::TextAlign));
    }

    #[test]
    fn non_inherited_properties_use_initial_values() {
        let d = doc(r#"<div style="float: left"><span>x</span></div>"#);
        let span = first(&d, "span");
        let cs = d.computed_style(span).unwrap();
        assert_eq!(cs.get(CssProperty::Float), "none");
        assert_eq!(cs.get(CssProperty::TextAlign), "start");
    }

    #[tokio::test]
    async fn append_and_detach_emit_records() {
        let mut d = doc(r#"<div id="host"></div>"#);
        let host = first(&d, "#host");
        let mut rx = d.subscribe();

        let added = d.append_html(host, "<p>שלום</p><span>x</span>").unwrap();
        assert_eq!(added.len(), 2);
        assert!(added.iter().all(|id| d.is_attached(*id)));
        assert_eq!(d.text_content(host), "שלוםx");

        let record = rx.recv().await.unwrap();
        assert_eq!(record.target, host);
        assert_eq!(record.added, added);

        d.detach(added[0]).unwrap();
        assert!(!d.is_attached(added[0]));
        let record = rx.recv().await.unwrap();
        assert_eq!(record.removed, vec![added[0]]);
    }

    #[test]
    fn appending_to_detached_parent_fails() {
        let mut d = doc(r#"<div id="host"><p>x</p></div>"#);
        let host = first(&d, "#host");
        d.detach(host).unwrap();
        assert!(matches!(d.append_html(host, "<p>y</p>"), Err(Error::DetachedNode)));
    }

    #[test]
    fn appended_styles_join_the_sheet() {
        let mut d = doc(r#"<div id="host"></div>"#);
        let host = first(&d, "#host");
        let added = d
            .append_html(host, r#"<style>.late { float: left }</style><p class="late">x</p>"#)
            .unwrap();
        let cs = d.computed_style(added[1]).unwrap();
        assert_eq!(cs.get(CssProperty::Float), "left");
    }

    #[test]
    fn elements_within_is_document_order() {
        let d = doc("<div id=a><p id=b><span id=c></span></p><p id=d></p></div>");
        let a = first(&d, "#a");
        let tags: Vec<_> = d
            .elements_within(a)
            .into_iter()
            .map(|id| d.attr(id, "id").unwrap().to_string())
            .collect();
        assert_eq!(tags, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn contains_and_body() {
        let d = doc("<div id=a><p id=b></p></div>");
        let body = d.body().unwrap();
        let b = first(&d, "#b");
        assert!(d.contains(body, b));
        assert!(!d.contains(b, body));
        assert_eq!(d.tag_name(body), Some("body"));
    }

    #[test]
    fn invalid_query_is_config_error() {
        let d = doc("");
        assert!(matches!(d.query("!!"), Err(Error::InvalidConfig(_))));
    }
}
