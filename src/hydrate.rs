//! Hydration engine
//!
//! Walks a schema value in lockstep with a document [`Selection`]. For every
//! slot the engine:
//!
//! 1. resolves `Option`/`Box` indirection, allocating absent storage,
//! 2. narrows the selection with the plan's selector unless the selection
//!    already matches it,
//! 3. runs the plan's terminal constructor, if any,
//! 4. otherwise runs the type-directed constructor registered for the slot's
//!    type, if any,
//! 5. otherwise dispatches on the slot's structural [`Kind`].
//!
//! Errors are collected per field and element and never stop sibling work.

use std::any::{type_name, Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::coerce::{coerce, CoerceError, FromScalar, ScalarKind};
use crate::document::Selection;
use crate::error::{BoxError, Error};
use crate::plan::{Accessor, Plan};
use crate::registry::Registry;

/// Structural kind of a schema type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Composite,
    Sequence,
    Bytes,
    Scalar(ScalarKind),
    /// Produced only by constructors.
    Opaque,
    Map,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Composite => write!(f, "composite"),
            Kind::Sequence => write!(f, "sequence"),
            Kind::Bytes => write!(f, "bytes"),
            Kind::Scalar(kind) => write!(f, "{kind}"),
            Kind::Opaque => write!(f, "opaque"),
            Kind::Map => write!(f, "map"),
        }
    }
}

/// A type that can be filled from a document.
///
/// Composite types implement this through [`crate::schema!`], constructor-only
/// leaf types through [`crate::opaque!`].
pub trait Hydrate: Sized + 'static {
    fn kind() -> Kind;

    /// Zero value used when storage has to be allocated, or `None` when the
    /// type can only be produced by a constructor.
    ///
    /// A sequence element without a zero value whose constructor fails is left
    /// out, so a `Vec<T>` of such a type can be shorter than the match count.
    /// Use `Vec<Option<T>>` to keep indices aligned with the matched nodes.
    fn allocate() -> Option<Self>;

    /// Structural dispatch, reached when no constructor applies.
    fn hydrate_structure(
        &mut self,
        ctx: &Selection<'_>,
        plan: Option<&Plan>,
        registry: &Registry,
    ) -> Vec<Error>;

    fn hydrate(
        &mut self,
        ctx: &Selection<'_>,
        plan: Option<&Plan>,
        registry: &Registry,
    ) -> Vec<Error> {
        hydrate_value(self, ctx, plan, registry)
    }
}

/// Object-safe view of a [`Hydrate`] value, used by field tables.
pub trait Slot {
    fn hydrate_slot(
        &mut self,
        ctx: &Selection<'_>,
        plan: Option<&Plan>,
        registry: &Registry,
    ) -> Vec<Error>;
}

impl<T: Hydrate> Slot for T {
    fn hydrate_slot(
        &mut self,
        ctx: &Selection<'_>,
        plan: Option<&Plan>,
        registry: &Registry,
    ) -> Vec<Error> {
        self.hydrate(ctx, plan, registry)
    }
}

/// One entry of a composite's field table.
pub struct Field<S> {
    pub name: &'static str,
    /// Empty when the field carries no annotation.
    pub annotation: &'static str,
    pub public: bool,
    pub access: Option<fn(&mut S) -> &mut dyn Slot>,
}

/// Types with named fields, described by a static table.
pub trait Composite: Hydrate {
    fn fields() -> &'static [Field<Self>];
}

/// Hydrate every annotated field of `target` against `ctx`, in declaration order.
pub fn hydrate_fields<S: Composite>(
    target: &mut S,
    ctx: &Selection<'_>,
    registry: &Registry,
) -> Vec<Error> {
    let mut errors = Vec::new();

    for field in S::fields() {
        let plan = match registry.plan(field.annotation) {
            Ok(Some(plan)) => plan,
            Ok(None) => continue,
            Err(source) => {
                errors.push(Error::Compile {
                    field: field.name,
                    source,
                });
                continue;
            }
        };

        if !field.public {
            errors.push(Error::Visibility { field: field.name });
            continue;
        }

        let Some(access) = field.access else {
            continue;
        };

        tracing::trace!(field = field.name, selector = plan.selector(), "hydrating field");
        errors.extend(access(target).hydrate_slot(ctx, Some(&*plan), registry));
    }

    errors
}

enum Resolved<'a, T> {
    Done(Vec<Error>),
    Produced(T),
    Descend(Selection<'a>),
}

fn hydrate_value<T: Hydrate>(
    target: &mut T,
    ctx: &Selection<'_>,
    plan: Option<&Plan>,
    registry: &Registry,
) -> Vec<Error> {
    match resolve::<T>(ctx, plan, registry) {
        Resolved::Done(errors) => errors,
        Resolved::Produced(value) => {
            *target = value;
            Vec::new()
        }
        Resolved::Descend(ctx) => target.hydrate_structure(&ctx, plan, registry),
    }
}

/// Fill a slot that has no storage yet.
fn hydrate_absent<T: Hydrate>(
    ctx: &Selection<'_>,
    plan: Option<&Plan>,
    registry: &Registry,
) -> (Option<T>, Vec<Error>) {
    if let Some(mut value) = T::allocate() {
        let errors = value.hydrate(ctx, plan, registry);
        return (Some(value), errors);
    }

    match resolve::<T>(ctx, plan, registry) {
        Resolved::Done(errors) => (None, errors),
        Resolved::Produced(value) => (Some(value), Vec::new()),
        Resolved::Descend(_) => (None, vec![unsupported::<T>()]),
    }
}

/// Steps 2 to 4: narrow, then try the terminal and type constructors.
fn resolve<'a, T: Hydrate>(
    ctx: &Selection<'a>,
    plan: Option<&Plan>,
    registry: &Registry,
) -> Resolved<'a, T> {
    let mut ctx = ctx.clone();

    if let Some(plan) = plan {
        if let Some(selector) = plan.narrowing() {
            if !ctx.is(selector) {
                ctx = ctx.find(selector);
                tracing::trace!(selector = plan.selector(), matched = ctx.len(), "narrowed");

                if ctx.is_empty() {
                    if plan.is_optional() {
                        return Resolved::Done(Vec::new());
                    }
                    return Resolved::Done(vec![Error::SelectorUnmatched {
                        selector: plan.selector().to_string(),
                    }]);
                }
            }
        }
    }

    // sequences hand constructors to their elements
    if T::kind() == Kind::Sequence {
        return Resolved::Descend(ctx);
    }

    if let Some(terminal) = plan.and_then(Plan::terminal) {
        return construct(&ctx, plan, &terminal.name, |ctx, text| {
            (terminal.func)(ctx, text, &terminal.arg)
        });
    }

    if let Some(constructor) = registry.type_constructor::<T>() {
        return construct(&ctx, plan, constructor.type_name, |ctx, text| {
            (constructor.func)(ctx, text)
        });
    }

    Resolved::Descend(ctx)
}

fn construct<'a, T: 'static, F>(
    ctx: &Selection<'a>,
    plan: Option<&Plan>,
    function: &str,
    build: F,
) -> Resolved<'a, T>
where
    F: FnOnce(&Selection<'a>, &str) -> Result<Box<dyn Any>, BoxError>,
{
    let text = match pipe(ctx, plan) {
        Ok(text) => text,
        Err(err) => return Resolved::Done(vec![err]),
    };

    let failure = |message: String| Error::Constructor {
        selector: selector_of(plan),
        function: function.to_string(),
        message,
    };

    match build(ctx, &text) {
        Ok(value) => match unwrap_value::<T>(value) {
            Some(value) => Resolved::Produced(value),
            None => Resolved::Done(vec![failure(format!(
                "constructed value is not a {}",
                type_name::<T>()
            ))]),
        },
        Err(err) => Resolved::Done(vec![failure(err.to_string())]),
    }
}

/// Accept `T`, `Box<T>` or `Some(T)` from a constructor.
fn unwrap_value<T: 'static>(value: Box<dyn Any>) -> Option<T> {
    let value = match value.downcast::<T>() {
        Ok(value) => return Some(*value),
        Err(value) => value,
    };
    let value = match value.downcast::<Box<T>>() {
        Ok(value) => return Some(**value),
        Err(value) => value,
    };
    value.downcast::<Option<T>>().ok().and_then(|value| *value)
}

fn selector_of(plan: Option<&Plan>) -> String {
    plan.map_or_else(|| ".".to_string(), |plan| plan.selector().to_string())
}

fn unsupported<T: Hydrate>() -> Error {
    Error::UnsupportedKind {
        kind: T::kind(),
        type_name: type_name::<T>(),
    }
}

/// Pull raw content out of `ctx` with the plan's accessor.
pub(crate) fn extract(ctx: &Selection<'_>, plan: Option<&Plan>) -> Result<String, Error> {
    let Some(plan) = plan else {
        return Ok(String::new());
    };

    match plan.accessor() {
        Accessor::None => Ok(String::new()),
        Accessor::Text => Ok(ctx.text().trim().to_string()),
        Accessor::Markup => Ok(ctx.markup().trim().to_string()),
        Accessor::Attribute(name) => ctx
            .attr(name)
            .map(|value| value.trim().to_string())
            .ok_or_else(|| Error::AttributeNotFound {
                selector: plan.selector().to_string(),
                name: name.clone(),
            }),
    }
}

/// Extract, then run the transform pipeline in order.
pub(crate) fn pipe(ctx: &Selection<'_>, plan: Option<&Plan>) -> Result<String, Error> {
    let mut text = extract(ctx, plan)?;

    for step in plan.map(Plan::pipeline).unwrap_or_default() {
        text = (step.func)(&text, &step.arg).map_err(|err| Error::Pipeline {
            selector: selector_of(plan),
            function: step.name.clone(),
            message: err.to_string(),
        })?;
        tracing::trace!(step = %step.name, "applied transform");
    }

    Ok(text)
}

fn hydrate_scalar<T: FromScalar>(
    target: &mut T,
    ctx: &Selection<'_>,
    plan: Option<&Plan>,
) -> Vec<Error> {
    let text = match pipe(ctx, plan) {
        Ok(text) => text,
        Err(err) => return vec![err],
    };

    let mismatch = |source| Error::TypeMismatch {
        selector: selector_of(plan),
        source,
    };

    match coerce(&text, T::KIND) {
        Ok(scalar) => match T::from_scalar(scalar) {
            Some(value) => {
                *target = value;
                Vec::new()
            }
            None => vec![mismatch(CoerceError::Range {
                kind: T::KIND,
                text,
            })],
        },
        Err(err) => vec![mismatch(err)],
    }
}

macro_rules! scalar {
    ($($ty:ty),* $(,)?) => {$(
        impl Hydrate for $ty {
            fn kind() -> Kind {
                Kind::Scalar(<$ty as FromScalar>::KIND)
            }

            fn allocate() -> Option<Self> {
                Some(<$ty>::default())
            }

            fn hydrate_structure(
                &mut self,
                ctx: &Selection<'_>,
                plan: Option<&Plan>,
                _registry: &Registry,
            ) -> Vec<Error> {
                hydrate_scalar(self, ctx, plan)
            }
        }
    )*};
}

scalar!(
    bool, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, String,
    serde_json::Value,
);

fn is_byte<T: 'static>() -> bool {
    TypeId::of::<T>() == TypeId::of::<u8>()
}

impl<T: Hydrate> Hydrate for Vec<T> {
    fn kind() -> Kind {
        if is_byte::<T>() {
            Kind::Bytes
        } else {
            Kind::Sequence
        }
    }

    fn allocate() -> Option<Self> {
        Some(Vec::new())
    }

    fn hydrate_structure(
        &mut self,
        ctx: &Selection<'_>,
        plan: Option<&Plan>,
        registry: &Registry,
    ) -> Vec<Error> {
        if let Some(bytes) = (&mut *self as &mut dyn Any).downcast_mut::<Vec<u8>>() {
            return match extract(ctx, plan) {
                Ok(text) => {
                    *bytes = text.into_bytes();
                    Vec::new()
                }
                Err(err) => vec![err],
            };
        }

        let mut errors = Vec::new();
        let mut items = Vec::with_capacity(ctx.len());
        for node in ctx.each() {
            let (item, item_errors) = hydrate_absent::<T>(&node, plan, registry);
            errors.extend(item_errors);
            items.extend(item);
        }
        *self = items;
        errors
    }
}

impl<T: Hydrate, const N: usize> Hydrate for [T; N] {
    fn kind() -> Kind {
        if is_byte::<T>() {
            Kind::Bytes
        } else {
            Kind::Sequence
        }
    }

    fn allocate() -> Option<Self> {
        let items = (0..N).map(|_| T::allocate()).collect::<Option<Vec<T>>>()?;
        items.try_into().ok()
    }

    fn hydrate_structure(
        &mut self,
        ctx: &Selection<'_>,
        plan: Option<&Plan>,
        registry: &Registry,
    ) -> Vec<Error> {
        if let Some(bytes) = (&mut *self as &mut dyn Any).downcast_mut::<[u8; N]>() {
            return match extract(ctx, plan) {
                Ok(text) => {
                    let n = N.min(text.len());
                    bytes[..n].copy_from_slice(&text.as_bytes()[..n]);
                    Vec::new()
                }
                Err(err) => vec![err],
            };
        }

        // extra matches are dropped, missing ones leave the slot untouched
        let mut errors = Vec::new();
        for (slot, node) in self.iter_mut().zip(ctx.each()) {
            errors.extend(slot.hydrate(&node, plan, registry));
        }
        errors
    }
}

impl<T: Hydrate> Hydrate for Option<T> {
    fn kind() -> Kind {
        T::kind()
    }

    fn allocate() -> Option<Self> {
        Some(None)
    }

    fn hydrate_structure(
        &mut self,
        ctx: &Selection<'_>,
        plan: Option<&Plan>,
        registry: &Registry,
    ) -> Vec<Error> {
        self.hydrate(ctx, plan, registry)
    }

    fn hydrate(
        &mut self,
        ctx: &Selection<'_>,
        plan: Option<&Plan>,
        registry: &Registry,
    ) -> Vec<Error> {
        if let Some(inner) = self {
            return inner.hydrate(ctx, plan, registry);
        }
        let (value, errors) = hydrate_absent::<T>(ctx, plan, registry);
        *self = value;
        errors
    }
}

impl<T: Hydrate> Hydrate for Box<T> {
    fn kind() -> Kind {
        T::kind()
    }

    fn allocate() -> Option<Self> {
        T::allocate().map(Box::new)
    }

    fn hydrate_structure(
        &mut self,
        ctx: &Selection<'_>,
        plan: Option<&Plan>,
        registry: &Registry,
    ) -> Vec<Error> {
        (**self).hydrate(ctx, plan, registry)
    }

    fn hydrate(
        &mut self,
        ctx: &Selection<'_>,
        plan: Option<&Plan>,
        registry: &Registry,
    ) -> Vec<Error> {
        (**self).hydrate(ctx, plan, registry)
    }
}

impl<K: 'static, V: 'static> Hydrate for HashMap<K, V> {
    fn kind() -> Kind {
        Kind::Map
    }

    fn allocate() -> Option<Self> {
        Some(HashMap::new())
    }

    fn hydrate_structure(
        &mut self,
        _: &Selection<'_>,
        _: Option<&Plan>,
        _: &Registry,
    ) -> Vec<Error> {
        vec![unsupported::<Self>()]
    }
}

impl<K: 'static, V: 'static> Hydrate for BTreeMap<K, V> {
    fn kind() -> Kind {
        Kind::Map
    }

    fn allocate() -> Option<Self> {
        Some(BTreeMap::new())
    }

    fn hydrate_structure(
        &mut self,
        _: &Selection<'_>,
        _: Option<&Plan>,
        _: &Registry,
    ) -> Vec<Error> {
        vec![unsupported::<Self>()]
    }
}

/// Structural fallback for opaque types; used by [`crate::opaque!`].
#[doc(hidden)]
pub fn unsupported_opaque<T: Hydrate>() -> Vec<Error> {
    vec![unsupported::<T>()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    const HTML: &str = r#"
    <html><body>
        <p class="n">1</p><p class="n">2</p><p class="n">3</p>
        <a href=" https://example.com/x ">link</a>
        <p class="word">true</p>
    </body></html>
    "#;

    fn run<T: Hydrate>(target: &mut T, annotation: &str) -> Vec<Error> {
        let registry = Registry::new();
        let document = Html::parse_document(HTML);
        let plan = registry.plan(annotation).unwrap().unwrap();
        target.hydrate(&Selection::root(&document), Some(&*plan), &registry)
    }

    #[test]
    fn test_vec_length_follows_matches() {
        let mut numbers: Vec<u32> = vec![9; 10];
        assert!(run(&mut numbers, "p.n | text").is_empty());
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_array_keeps_first_matches() {
        let mut pair = [0u16; 2];
        assert!(run(&mut pair, "p.n | text").is_empty());
        assert_eq!(pair, [1, 2]);

        let mut wide = [7i64; 5];
        assert!(run(&mut wide, "p.n | text").is_empty());
        assert_eq!(wide, [1, 2, 3, 7, 7]);
    }

    #[test]
    fn test_bytes_are_copied() {
        let mut bytes: Vec<u8> = Vec::new();
        assert!(run(&mut bytes, "a | text").is_empty());
        assert_eq!(bytes, b"link");

        let mut fixed = [b'-'; 6];
        assert!(run(&mut fixed, "a | text").is_empty());
        assert_eq!(&fixed, b"link--");

        let mut short = [0u8; 2];
        assert!(run(&mut short, "a | text").is_empty());
        assert_eq!(&short, b"li");
    }

    #[test]
    fn test_option_is_allocated() {
        let mut value: Option<u8> = None;
        assert!(run(&mut value, "p.n:first-child | text").is_empty());
        assert_eq!(value, Some(1));

        let mut missing: Option<u8> = None;
        let errors = run(&mut missing, "blink | text");
        assert_eq!(errors.len(), 1);
        assert_eq!(missing, Some(0));
    }

    #[test]
    fn test_constructor_only_option_stays_empty_on_failure() {
        let mut url: Option<url::Url> = None;
        let errors = run(&mut url, "p.word | text");
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], Error::Constructor { .. }));
        assert!(url.is_none());

        let mut url: Option<url::Url> = None;
        assert!(run(&mut url, "a | attribute(href)").is_empty());
        assert_eq!(url.unwrap().as_str(), "https://example.com/x");
    }

    #[test]
    fn test_scalar_mismatch_names_selector() {
        let mut n = 0i32;
        let errors = run(&mut n, "p.word | text");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].selector(), Some("p.word"));
        assert_eq!(
            errors[0].to_string(),
            r#"p.word: parsing "true" as int32: invalid syntax"#
        );
        assert_eq!(n, 0);
    }

    #[test]
    fn test_optional_suppresses_only_unmatched() {
        let mut n = 5u8;
        assert!(run(&mut n, "(optional) blink | text").is_empty());
        assert_eq!(n, 5);

        let errors = run(&mut n, "(optional) p.word | text");
        assert!(matches!(errors[0], Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_maps_are_unsupported() {
        let mut map: HashMap<String, String> = HashMap::new();
        let errors = run(&mut map, "p.n");
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0],
            Error::UnsupportedKind { kind: Kind::Map, .. }
        ));
    }

    #[test]
    fn test_unwrap_value_dereferences() {
        assert_eq!(unwrap_value::<u8>(Box::new(3u8)), Some(3));
        assert_eq!(unwrap_value::<u8>(Box::new(Box::new(4u8))), Some(4));
        assert_eq!(unwrap_value::<u8>(Box::new(Some(5u8))), Some(5));
        assert_eq!(unwrap_value::<u8>(Box::new("x")), None);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(<Vec<u8>>::kind(), Kind::Bytes);
        assert_eq!(<[u8; 4]>::kind(), Kind::Bytes);
        assert_eq!(<Vec<String>>::kind(), Kind::Sequence);
        assert_eq!(<Option<i16>>::kind(), Kind::Scalar(ScalarKind::Int(16)));
        assert_eq!(<url::Url>::kind(), Kind::Opaque);
        assert_eq!(Kind::Scalar(ScalarKind::Uint(8)).to_string(), "uint8");
    }
}
