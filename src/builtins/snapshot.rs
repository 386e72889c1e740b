//! Owned snapshots of the matched context.
//!
//! Parsed documents borrow from the hydration run, so schema fields that want
//! to keep part of the document hold one of these instead.

use scraper::{Html, Selector};
use serde::Serialize;

use crate::document::Selection;

/// Every node of the matched context, as outer markup plus text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Fragment {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Node {
    pub html: String,
    pub text: String,
}

crate::opaque!(Fragment, Element);

impl Fragment {
    pub fn capture(ctx: &Selection<'_>) -> Self {
        let nodes = ctx
            .elements()
            .iter()
            .map(|node| Node {
                html: node.html(),
                text: node.text().collect(),
            })
            .collect();
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Outer markup of all nodes, concatenated.
    pub fn html(&self) -> String {
        self.nodes.iter().map(|node| node.html.as_str()).collect()
    }

    pub fn text(&self) -> String {
        self.nodes.iter().map(|node| node.text.as_str()).collect()
    }

    /// Re-parse the snapshot for further querying.
    pub fn document(&self) -> Html {
        Html::parse_fragment(&self.html())
    }

    /// Trimmed text of every element of the snapshot matching `selector`.
    pub fn select_text(&self, selector: &Selector) -> Vec<String> {
        self.document()
            .select(selector)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .collect()
    }
}

/// The first node of the matched context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub inner_html: String,
    pub text: String,
}

impl Element {
    pub fn capture(ctx: &Selection<'_>) -> Option<Self> {
        let node = ctx.first()?;
        let value = node.value();

        Some(Self {
            name: value.name().to_string(),
            attributes: value
                .attrs()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            inner_html: node.inner_html(),
            text: node.text().collect(),
        })
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}
