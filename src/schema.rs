//! Declaration macros for schema types.

/// Declare a composite schema: a struct whose fields carry annotations.
///
/// ```
/// sq::schema! {
///     #[derive(Debug, Default)]
///     pub struct Product {
///         pub name: String = "h1.title | text",
///         pub price: f64 = "span.price | text | regexp([0-9.]+)",
///         pub tags: Vec<String> = "ul.tags li | text",
///         pub notes: String,
///     }
/// }
/// ```
///
/// Fields without `= "annotation"` are left alone. Annotated fields must be
/// `pub`; a private annotated field is reported, never filled. The struct must
/// implement `Default`, which is used when it has to be allocated.
#[macro_export]
macro_rules! schema {
    (@field $name:ident $field:ident [] $fvis:vis) => {
        $crate::Field::<$name> {
            name: ::core::stringify!($field),
            annotation: "",
            public: false,
            access: ::core::option::Option::None,
        }
    };

    (@field $name:ident $field:ident [$ann:literal] $fvis:vis) => {
        $crate::Field::<$name> {
            name: ::core::stringify!($field),
            annotation: $ann,
            public: !::core::stringify!($fvis).is_empty(),
            access: ::core::option::Option::Some({
                fn access(s: &mut $name) -> &mut dyn $crate::Slot {
                    &mut s.$field
                }
                access
            }),
        }
    };

    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident : $fty:ty $(= $ann:literal)?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $fvis $field: $fty,
            )*
        }

        impl $crate::Composite for $name {
            fn fields() -> &'static [$crate::Field<Self>] {
                static FIELDS: &[$crate::Field<$name>] = &[
                    $($crate::schema!(@field $name $field [$($ann)?] $fvis),)*
                ];
                FIELDS
            }
        }

        impl $crate::Hydrate for $name {
            fn kind() -> $crate::Kind {
                $crate::Kind::Composite
            }

            fn allocate() -> ::core::option::Option<Self> {
                ::core::option::Option::Some(<Self as ::core::default::Default>::default())
            }

            fn hydrate_structure(
                &mut self,
                ctx: &$crate::Selection<'_>,
                _plan: ::core::option::Option<&$crate::Plan>,
                registry: &$crate::Registry,
            ) -> ::std::vec::Vec<$crate::Error> {
                $crate::hydrate_fields(self, ctx, registry)
            }
        }
    };
}

/// Declare leaf types that are only ever produced by a constructor.
///
/// `opaque!(Type, ...)` allocates absent values with `Default`;
/// `opaque!(@constructed Type, ...)` for types without a zero value. Failed
/// elements of a `Vec` of such a type are skipped; hold them as
/// `Vec<Option<Type>>` when positions matter.
#[macro_export]
macro_rules! opaque {
    (@constructed $($ty:ty),+ $(,)?) => {$(
        $crate::opaque!(@impl $ty, ::core::option::Option::None);
    )+};

    (@impl $ty:ty, $allocate:expr) => {
        impl $crate::Hydrate for $ty {
            fn kind() -> $crate::Kind {
                $crate::Kind::Opaque
            }

            fn allocate() -> ::core::option::Option<Self> {
                $allocate
            }

            fn hydrate_structure(
                &mut self,
                _ctx: &$crate::Selection<'_>,
                _plan: ::core::option::Option<&$crate::Plan>,
                _registry: &$crate::Registry,
            ) -> ::std::vec::Vec<$crate::Error> {
                $crate::hydrate::unsupported_opaque::<Self>()
            }
        }
    };

    ($($ty:ty),+ $(,)?) => {$(
        $crate::opaque!(
            @impl $ty,
            ::core::option::Option::Some(<$ty as ::core::default::Default>::default())
        );
    )+};
}

#[cfg(test)]
mod tests {
    use crate::{Composite, Hydrate, Kind, Registry};

    crate::schema! {
        #[derive(Debug, Default, PartialEq)]
        pub struct Card {
            pub title: String = "h2 | text",
            pub count: u32 = "span.count | text",
            hidden: String = "h2 | text",
            pub untouched: String,
        }
    }

    #[derive(Debug, Default, PartialEq)]
    struct Token(String);

    crate::opaque!(Token);

    #[test]
    fn test_field_table() {
        let fields = Card::fields();
        let names: Vec<_> = fields.iter().map(|f| f.name).collect();
        assert_eq!(names, ["title", "count", "hidden", "untouched"]);

        assert!(fields[0].public);
        assert!(!fields[2].public);
        assert_eq!(fields[3].annotation, "");
        assert!(fields[3].access.is_none());
        assert_eq!(Card::kind(), Kind::Composite);
    }

    #[test]
    fn test_hydrate_card() {
        let document = scraper::Html::parse_document(
            r#"<h2> Hello </h2><span class="count">3</span>"#,
        );
        let mut card = Card {
            untouched: "keep".to_string(),
            ..Default::default()
        };
        let errors = Registry::new().hydrate(&mut card, &document);

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), r#"private field with annotation: "hidden""#);
        assert_eq!(card.title, "Hello");
        assert_eq!(card.count, 3);
        assert_eq!(card.hidden, "");
        assert_eq!(card.untouched, "keep");
    }

    #[test]
    fn test_opaque_without_constructor() {
        assert_eq!(Token::kind(), Kind::Opaque);
        assert_eq!(Token::allocate(), Some(Token::default()));
    }
}
