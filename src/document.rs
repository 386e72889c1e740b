//! Document access over `scraper`
//!
//! A [`Selection`] is a read-only handle to zero or more elements of a parsed
//! [`Html`] document. The hydration engine only ever talks to documents
//! through it.

use std::collections::HashSet;
use std::io::Read;

use scraper::{ElementRef, Html, Selector};

/// Read an HTML document from `reader`.
///
/// Parsing itself never fails; the only error is an unreadable (or non UTF-8)
/// source.
pub fn parse_document<R: Read>(mut reader: R) -> std::io::Result<Html> {
    let mut html = String::new();
    reader.read_to_string(&mut html)?;
    Ok(Html::parse_document(&html))
}

/// Ordered, de-duplicated set of elements in one document.
#[derive(Clone)]
pub struct Selection<'a> {
    document: &'a Html,
    nodes: Vec<ElementRef<'a>>,
    /// The document itself rather than a set of elements.
    root: bool,
}

impl<'a> Selection<'a> {
    /// Selection over the whole document.
    pub fn root(document: &'a Html) -> Self {
        Self {
            document,
            nodes: vec![document.root_element()],
            root: true,
        }
    }

    fn with_nodes(&self, nodes: Vec<ElementRef<'a>>) -> Self {
        Self {
            document: self.document,
            nodes,
            root: false,
        }
    }

    /// Descendants of the selection matching `selector`, in document order.
    pub fn find(&self, selector: &Selector) -> Selection<'a> {
        if self.root {
            return self.with_nodes(self.document.select(selector).collect());
        }

        let mut seen = HashSet::new();
        let nodes = self
            .nodes
            .iter()
            .flat_map(|node| node.select(selector))
            .filter(|el| seen.insert(el.id()))
            .collect();
        self.with_nodes(nodes)
    }

    /// Whether any element of the selection itself matches `selector`.
    pub fn is(&self, selector: &Selector) -> bool {
        !self.root && self.nodes.iter().any(|node| selector.matches(node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// One single-element selection per element.
    pub fn each(&self) -> Vec<Selection<'a>> {
        self.nodes
            .iter()
            .map(|node| self.with_nodes(vec![*node]))
            .collect()
    }

    pub fn first(&self) -> Option<ElementRef<'a>> {
        self.nodes.first().copied()
    }

    pub fn elements(&self) -> &[ElementRef<'a>] {
        &self.nodes
    }

    /// Combined text of every element, untrimmed.
    pub fn text(&self) -> String {
        self.nodes.iter().flat_map(|node| node.text()).collect()
    }

    /// Inner markup of the first element. For the document root this is the
    /// whole `<html>` element.
    pub fn markup(&self) -> String {
        match self.first() {
            Some(node) if self.root => node.html(),
            Some(node) => node.inner_html(),
            None => String::new(),
        }
    }

    /// Attribute of the first element.
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.first().and_then(|node| node.value().attr(name))
    }
}

impl std::fmt::Debug for Selection<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selection")
            .field("root", &self.root)
            .field(
                "nodes",
                &self
                    .nodes
                    .iter()
                    .map(|node| node.value().name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
