//! Declarative HTML extraction into typed Rust values
//!
//! Schema fields carry annotations describing where their content lives:
//!
//! ```
//! use sq::scrape;
//!
//! sq::schema! {
//!     #[derive(Debug, Default)]
//!     pub struct Page {
//!         pub title: String = "title | text",
//!         pub links: Vec<url::Url> = "a[href] | attribute(href)",
//!         pub comments: u32 = "(optional) span.comments | text",
//!     }
//! }
//!
//! let html = r#"<html><head><title>Home</title></head>
//!     <body><a href="https://example.com/">x</a></body></html>"#;
//!
//! let mut page = Page::default();
//! let errors = scrape(&mut page, html.as_bytes());
//!
//! assert!(errors.is_empty());
//! assert_eq!(page.title, "Home");
//! assert_eq!(page.links.len(), 1);
//! assert_eq!(page.comments, 0);
//! ```
//!
//! Annotations are compiled against a [`Registry`] of transforms, terminal
//! constructors and type constructors. [`scrape`] uses the built-in registry;
//! build your own with [`Registry::new`] to add functions.

pub mod builtins;
pub mod coerce;
pub mod document;
pub mod error;
pub mod hydrate;
pub mod plan;
pub mod registry;
mod schema;

pub use builtins::{Element, Fragment, Script, Stylesheet};
pub use coerce::{coerce, CoerceError, FromScalar, Scalar, ScalarKind};
pub use document::{parse_document, Selection};
pub use error::{BoxError, CompileError, Error};
pub use hydrate::{hydrate_fields, Composite, Field, Hydrate, Kind, Slot};
pub use plan::{compile, Accessor, Plan, Step};
pub use registry::{scrape, Registry, TerminalFn, TransformFn, TypeConstructorFn};
