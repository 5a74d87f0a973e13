use ego_tree::NodeId;
use scraper::Node;

use crate::dom::Document;

/// Elements with no closing tag.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose text children are written verbatim.
const RAW_TEXT_TAGS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "noscript",
];

impl Document {
    /// Serialize the whole document, attribute overlay included.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        let root = self.tree().root();
        for child in root.children() {
            self.write_node(child.id(), false, &mut out);
        }
        out
    }

    /// Serialize one node and its subtree.
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, false, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, raw_text: bool, out: &mut String) {
        let Some(node) = self.tree().get(id) else {
            return;
        };
        match node.value() {
            Node::Doctype(doctype) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(doctype.name());
                out.push('>');
            }
            Node::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->");
            }
            Node::Text(text) => {
                if raw_text {
                    out.push_str(text);
                } else {
                    escape_into(text, false, out);
                }
            }
            Node::Element(el) => {
                let name = el.name();
                out.push('<');
                out.push_str(name);
                for (key, value) in self.attrs(id) {
                    out.push(' ');
                    out.push_str(&key);
                    out.push_str("=\"");
                    escape_into(&value, true, out);
                    out.push('"');
                }
                out.push('>');
                if VOID_TAGS.contains(&name) {
                    return;
                }
                let raw = RAW_TEXT_TAGS.contains(&name);
                for child in node.children() {
                    self.write_node(child.id(), raw, out);
                }
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
            _ => {
                for child in node.children() {
                    self.write_node(child.id(), raw_text, out);
                }
            }
        }
    }
}

fn escape_into(s: &str, attribute: bool, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            '"' if attribute => out.push_str("&quot;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_document_serializes_back() {
        let src = r#"<!DOCTYPE html><html><head><style>p > a { color: red }</style></head><body><p class="a">x &amp; y</p><br><!-- note --></body></html>"#;
        assert_eq!(Document::parse(src).to_html(), src);
    }

    #[test]
    fn overlay_writes_are_serialized() {
        let mut d = Document::parse(
            r#"<html><head></head><body><p title="a &quot;b&quot;">שלום</p></body></html>"#,
        );
        let p = d.query("p").unwrap().unwrap();
        d.set_attr(p, "dir", "rtl").unwrap();
        d.set_attr(p, "data-rtl-state", r#"{"rtl":true}"#).unwrap();
        assert_eq!(
            d.outer_html(p),
            r#"<p data-rtl-state="{&quot;rtl&quot;:true}" dir="rtl" title="a &quot;b&quot;">שלום</p>"#
        );
    }

    #[test]
    fn removed_attributes_are_dropped() {
        let mut d = Document::parse(
            r#"<html><head></head><body><p style="float: left">x</p></body></html>"#,
        );
        let p = d.query("p").unwrap().unwrap();
        d.remove_attr(p, "style").unwrap();
        assert_eq!(d.outer_html(p), "<p>x</p>");
    }

    #[test]
    fn reparsing_serialized_output_keeps_attributes() {
        let mut d = Document::parse(r#"<html><head></head><body><p>a < b</p></body></html>"#);
        let p = d.query("p").unwrap().unwrap();
        d.set_attr(p, "lang", "he").unwrap();
        let again = Document::parse(&d.to_html());
        let p2 = again.query("p").unwrap().unwrap();
        assert_eq!(again.attr(p2, "lang"), Some("he"));
        assert_eq!(again.text_content(p2), "a < b");
    }
}
