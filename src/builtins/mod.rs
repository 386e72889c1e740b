//! Functions and constructors registered in [`Registry::new`].
//!
//! | name | kind |
//! |---|---|
//! | `regexp(pattern)`, `strip(pattern)` | transform |
//! | `append(s)`, `prepend(s)`, `path.append(s)`, `path.prepend(s)` | transform |
//! | `time(layout)`, `ago` | terminal, `DateTime<Utc>` |
//! | `url::Url`, [`Fragment`], [`Element`], [`Script`], [`Stylesheet`] | type constructor |

pub mod script;
pub mod snapshot;
pub mod stylesheet;
pub mod time;
pub mod transforms;

use url::Url;

use crate::document::Selection;
use crate::error::BoxError;
use crate::registry::Registry;

pub use script::{Script, ScriptError};
pub use snapshot::{Element, Fragment, Node};
pub use stylesheet::{AtRule, Declaration, Rule, StyleRule, Stylesheet, StylesheetError};
pub use transforms::NoRegexpMatch;

crate::opaque!(@constructed Url);

pub(crate) fn register(registry: &mut Registry) {
    transforms::register(registry);
    time::register(registry);

    registry
        .register_type::<Url, _, _>(|_, text: &str| Url::parse(text))
        .register_type::<Fragment, _, _>(|ctx, _: &str| Ok::<_, BoxError>(Fragment::capture(ctx)))
        .register_type::<Element, _, _>(|ctx, _: &str| {
            Element::capture(ctx).ok_or_else(|| BoxError::from("empty selection"))
        })
        .register_type::<Script, _, _>(|ctx, text: &str| Script::parse(&source(ctx, text)))
        .register_type::<Stylesheet, _, _>(|ctx, text: &str| Stylesheet::parse(&source(ctx, text)));

    tracing::debug!("registered built-ins");
}

/// Extracted text, or the node text when nothing was extracted.
fn source(ctx: &Selection<'_>, text: &str) -> String {
    if text.is_empty() {
        ctx.text()
    } else {
        text.to_string()
    }
}
