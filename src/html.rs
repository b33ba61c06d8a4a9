//! Small DOM helpers over `scraper` snapshots.

use scraper::node::Node;
use scraper::{ElementRef, Selector};
use url::Url;

const LINE_BREAKS: &[&str] = &["br", "p", "div", "tr", "table", "li"];
const CELL_BREAKS: &[&str] = &["td", "th"];
const HIDDEN: &[&str] = &["script", "style", "head"];

pub fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Approximates what a browser shows for the element: whitespace collapsed,
/// one entry per visual line, empty lines dropped.
pub fn inner_text(el: ElementRef<'_>) -> String {
    let mut raw = String::new();
    for node in el.descendants() {
        match node.value() {
            Node::Text(t) => {
                let hidden = node
                    .parent()
                    .and_then(|p| p.value().as_element())
                    .is_some_and(|p| HIDDEN.contains(&p.name()));
                if !hidden {
                    raw.push_str(t);
                }
            }
            Node::Element(e) if LINE_BREAKS.contains(&e.name()) => raw.push('\n'),
            Node::Element(e) if CELL_BREAKS.contains(&e.name()) => raw.push(' '),
            _ => {}
        }
    }
    normalize_lines(&raw)
}

/// Text nodes that are direct children of `el`, collapsed.
pub fn own_text(el: ElementRef<'_>) -> String {
    let raw: String = el
        .children()
        .filter_map(|c| match c.value() {
            Node::Text(t) => Some(&**t),
            _ => None,
        })
        .collect();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn normalize_lines(raw: &str) -> String {
    raw.lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn children_named<'a>(el: ElementRef<'a>, name: &'a str) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    el.children()
        .filter_map(ElementRef::wrap)
        .filter(move |c| c.value().name() == name)
}

pub fn descendants_named<'a>(el: ElementRef<'a>, name: &'a str) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    el.descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .filter(move |c| c.value().name() == name)
}

pub fn nearest_ancestor<'a>(el: ElementRef<'a>, name: &str) -> Option<ElementRef<'a>> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == name)
}

pub fn next_sibling_named<'a>(el: ElementRef<'a>, name: &str) -> Option<ElementRef<'a>> {
    el.next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|s| s.value().name() == name)
}

/// The `class` attribute equals `class` exactly.
pub fn class_is(el: ElementRef<'_>, class: &str) -> bool {
    el.value().attr("class").map(str::trim) == Some(class)
}

/// `class` is one of the element's class tokens.
pub fn has_class(el: ElementRef<'_>, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

/// Absolute form of `href` relative to `base`; unresolvable hrefs are returned as-is.
pub fn absolute(base: Option<&Url>, href: &str) -> String {
    let href = href.trim();
    match base.and_then(|b| b.join(href).ok()) {
        Some(u) => u.to_string(),
        None => href.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn first<'a>(doc: &'a Html, css: &str) -> ElementRef<'a> {
        doc.select(&selector(css).unwrap()).next().unwrap()
    }

    #[test]
    fn inner_text_breaks_lines_and_skips_scripts() {
        let doc = Html::parse_document(
            "<div id='x'>  Votación   económica<br>Resultado: Aprobado <script>var a = 1;</script><p></p></div>",
        );
        assert_eq!(
            inner_text(first(&doc, "#x")),
            "Votación económica\nResultado: Aprobado"
        );
    }

    #[test]
    fn own_text_ignores_nested_elements() {
        let doc = Html::parse_document(
            "<table><tr><td id='h'> ASUNTOS <b>ATENDIDOS</b></td></tr></table>",
        );
        assert_eq!(own_text(first(&doc, "#h")), "ASUNTOS");
        assert_eq!(inner_text(first(&doc, "#h")), "ASUNTOS ATENDIDOS");
    }

    #[test]
    fn class_matching() {
        let doc = Html::parse_document("<p id='a' class='simpletextmayor2 big'>x</p>");
        let el = first(&doc, "#a");
        assert!(has_class(el, "big"));
        assert!(!class_is(el, "simpletextmayor2"));
        assert!(class_is(first(&Html::parse_document("<p id='b' class=' t '>"), "#b"), "t"));
    }

    #[test]
    fn hrefs_are_resolved_against_the_page() {
        let base = Url::parse("https://sil.example/portal/Reporte/Sesion").unwrap();
        assert_eq!(
            absolute(Some(&base), "Detalle?id=3"),
            "https://sil.example/portal/Reporte/Detalle?id=3"
        );
        assert_eq!(absolute(None, " doc.pdf "), "doc.pdf");
    }
}
