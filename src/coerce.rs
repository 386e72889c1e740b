//! Scalar coercion of extracted text into built-in scalar kinds.

use std::fmt;
use std::num::IntErrorKind;

use serde::Serialize;
use thiserror::Error;

/// Target kind of a scalar leaf, with its bit width where relevant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScalarKind {
    Bool,
    Int(u32),
    Uint(u32),
    Float(u32),
    Text,
    /// Untyped value, stored as text.
    Any,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarKind::Bool => write!(f, "bool"),
            ScalarKind::Int(bits) => write!(f, "int{bits}"),
            ScalarKind::Uint(bits) => write!(f, "uint{bits}"),
            ScalarKind::Float(bits) => write!(f, "float{bits}"),
            ScalarKind::Text => write!(f, "string"),
            ScalarKind::Any => write!(f, "any"),
        }
    }
}

/// A coerced scalar, widened to the largest representation of its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i128),
    Uint(u128),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoerceError {
    #[error("parsing {text:?} as {kind}: invalid syntax")]
    Syntax { kind: ScalarKind, text: String },

    #[error("parsing {text:?} as {kind}: value out of range")]
    Range { kind: ScalarKind, text: String },
}

impl CoerceError {
    pub fn kind(&self) -> ScalarKind {
        match self {
            CoerceError::Syntax { kind, .. } | CoerceError::Range { kind, .. } => *kind,
        }
    }
}

/// Convert `text` into a scalar of `kind`, honouring the kind's bit width.
///
/// Booleans accept only literals (`true`, `True`, `TRUE`, `t`, `T` and the
/// `false` equivalents); numeric text is rejected. Integers are base 10.
pub fn coerce(text: &str, kind: ScalarKind) -> Result<Scalar, CoerceError> {
    let syntax = || CoerceError::Syntax {
        kind,
        text: text.to_string(),
    };
    let range = || CoerceError::Range {
        kind,
        text: text.to_string(),
    };

    match kind {
        ScalarKind::Bool => match text {
            "true" | "True" | "TRUE" | "t" | "T" => Ok(Scalar::Bool(true)),
            "false" | "False" | "FALSE" | "f" | "F" => Ok(Scalar::Bool(false)),
            _ => Err(syntax()),
        },
        ScalarKind::Int(bits) => {
            let n = text.parse::<i128>().map_err(|e| match e.kind() {
                IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => range(),
                _ => syntax(),
            })?;
            if bits < 128 {
                let max = (1i128 << (bits - 1)) - 1;
                let min = -max - 1;
                if n < min || n > max {
                    return Err(range());
                }
            }
            Ok(Scalar::Int(n))
        }
        ScalarKind::Uint(bits) => {
            let n = text.parse::<u128>().map_err(|e| match e.kind() {
                IntErrorKind::PosOverflow => range(),
                _ => syntax(),
            })?;
            if bits < 128 && n >> bits != 0 {
                return Err(range());
            }
            Ok(Scalar::Uint(n))
        }
        ScalarKind::Float(32) => {
            let n = text.parse::<f32>().map_err(|_| syntax())?;
            if n.is_infinite() && !is_infinity_literal(text) {
                return Err(range());
            }
            Ok(Scalar::Float(n as f64))
        }
        ScalarKind::Float(_) => {
            let n = text.parse::<f64>().map_err(|_| syntax())?;
            if n.is_infinite() && !is_infinity_literal(text) {
                return Err(range());
            }
            Ok(Scalar::Float(n))
        }
        ScalarKind::Text | ScalarKind::Any => Ok(Scalar::Text(text.to_string())),
    }
}

fn is_infinity_literal(text: &str) -> bool {
    let digits = text.trim_start_matches(['+', '-']).to_ascii_lowercase();
    digits == "inf" || digits == "infinity"
}

/// Rust types that are filled from a [`Scalar`].
pub trait FromScalar: Sized {
    const KIND: ScalarKind;

    /// Narrow a scalar already checked against [`Self::KIND`].
    fn from_scalar(scalar: Scalar) -> Option<Self>;
}

macro_rules! int_from_scalar {
    ($($ty:ty => $variant:ident($kind:ident)),* $(,)?) => {$(
        impl FromScalar for $ty {
            const KIND: ScalarKind = ScalarKind::$kind(<$ty>::BITS);

            fn from_scalar(scalar: Scalar) -> Option<Self> {
                match scalar {
                    Scalar::$variant(n) => <$ty>::try_from(n).ok(),
                    _ => None,
                }
            }
        }
    )*};
}

int_from_scalar! {
    i8 => Int(Int), i16 => Int(Int), i32 => Int(Int),
    i64 => Int(Int), i128 => Int(Int), isize => Int(Int),
    u8 => Uint(Uint), u16 => Uint(Uint), u32 => Uint(Uint),
    u64 => Uint(Uint), u128 => Uint(Uint), usize => Uint(Uint),
}

impl FromScalar for bool {
    const KIND: ScalarKind = ScalarKind::Bool;

    fn from_scalar(scalar: Scalar) -> Option<Self> {
        match scalar {
            Scalar::Bool(b) => Some(b),
            _ => None,
        }
    }
}

impl FromScalar for f32 {
    const KIND: ScalarKind = ScalarKind::Float(32);

    fn from_scalar(scalar: Scalar) -> Option<Self> {
        match scalar {
            Scalar::Float(n) => Some(n as f32),
            _ => None,
        }
    }
}

impl FromScalar for f64 {
    const KIND: ScalarKind = ScalarKind::Float(64);

    fn from_scalar(scalar: Scalar) -> Option<Self> {
        match scalar {
            Scalar::Float(n) => Some(n),
            _ => None,
        }
    }
}

impl FromScalar for String {
    const KIND: ScalarKind = ScalarKind::Text;

    fn from_scalar(scalar: Scalar) -> Option<Self> {
        match scalar {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl FromScalar for serde_json::Value {
    const KIND: ScalarKind = ScalarKind::Any;

    fn from_scalar(scalar: Scalar) -> Option<Self> {
        match scalar {
            Scalar::Text(s) => Some(serde_json::Value::String(s)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("true", true)]
    #[case("True", true)]
    #[case("T", true)]
    #[case("false", false)]
    #[case("FALSE", false)]
    #[case("f", false)]
    fn test_bool_literals(#[case] text: &str, #[case] expected: bool) {
        assert_eq!(coerce(text, ScalarKind::Bool), Ok(Scalar::Bool(expected)));
    }

    #[rstest]
    #[case("1")]
    #[case("0")]
    #[case("-48")]
    #[case("yes")]
    #[case("")]
    fn test_bool_rejects_non_literals(#[case] text: &str) {
        let err = coerce(text, ScalarKind::Bool).unwrap_err();
        assert!(matches!(err, CoerceError::Syntax { kind: ScalarKind::Bool, .. }));
    }

    #[rstest]
    #[case("-48", ScalarKind::Int(64), Ok(Scalar::Int(-48)))]
    #[case("127", ScalarKind::Int(8), Ok(Scalar::Int(127)))]
    #[case("-128", ScalarKind::Int(8), Ok(Scalar::Int(-128)))]
    #[case("+16", ScalarKind::Int(16), Ok(Scalar::Int(16)))]
    #[case("255", ScalarKind::Uint(8), Ok(Scalar::Uint(255)))]
    #[case("18446744073709551615", ScalarKind::Uint(64), Ok(Scalar::Uint(u64::MAX as u128)))]
    fn test_integers(
        #[case] text: &str,
        #[case] kind: ScalarKind,
        #[case] expected: Result<Scalar, CoerceError>,
    ) {
        assert_eq!(coerce(text, kind), expected);
    }

    #[rstest]
    #[case("128", ScalarKind::Int(8))]
    #[case("-129", ScalarKind::Int(8))]
    #[case("256", ScalarKind::Uint(8))]
    #[case("99999999999999999999999999999999999999999", ScalarKind::Int(64))]
    fn test_integer_out_of_range(#[case] text: &str, #[case] kind: ScalarKind) {
        let err = coerce(text, kind).unwrap_err();
        assert!(matches!(err, CoerceError::Range { .. }), "{err}");
        assert_eq!(err.kind(), kind);
    }

    #[test]
    fn test_integer_syntax_errors_name_the_kind() {
        let err = coerce("true", ScalarKind::Int(32)).unwrap_err();
        assert_eq!(err.to_string(), r#"parsing "true" as int32: invalid syntax"#);

        let err = coerce("-1", ScalarKind::Uint(64)).unwrap_err();
        assert_eq!(err.to_string(), r#"parsing "-1" as uint64: invalid syntax"#);
    }

    #[test]
    fn test_floats() {
        assert_eq!(coerce("2.468", ScalarKind::Float(64)), Ok(Scalar::Float(2.468)));
        assert_eq!(
            coerce("1.234", ScalarKind::Float(32)),
            Ok(Scalar::Float(1.234f32 as f64))
        );
        assert!(matches!(
            coerce("1e40", ScalarKind::Float(32)),
            Err(CoerceError::Range { .. })
        ));
        assert!(coerce("-inf", ScalarKind::Float(32)).is_ok());
        assert!(matches!(
            coerce("2.1f", ScalarKind::Float(64)),
            Err(CoerceError::Syntax { .. })
        ));
    }

    #[test]
    fn test_text_and_any_pass_through() {
        assert_eq!(
            coerce(" a b ", ScalarKind::Text),
            Ok(Scalar::Text(" a b ".to_string()))
        );
        let any = serde_json::Value::from_scalar(coerce("x", ScalarKind::Any).unwrap());
        assert_eq!(any, Some(serde_json::Value::String("x".to_string())));
    }

    #[test]
    fn test_from_scalar_narrows() {
        assert_eq!(i8::from_scalar(Scalar::Int(-8)), Some(-8));
        assert_eq!(u16::from_scalar(Scalar::Int(1)), None);
        assert_eq!(usize::KIND, ScalarKind::Uint(usize::BITS));
        assert_eq!(f32::from_scalar(Scalar::Float(0.5)), Some(0.5));
    }
}
