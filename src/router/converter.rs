//! Typed placeholder conversion.
//!
//! Each [`ParamKind`] maps to a regex fragment that a `<arg>` placeholder
//! expands to, and to a function turning the captured text into a [`Param`].

use crate::errors::RouteError;
use regex::Regex;
use std::{collections::HashMap, fmt, sync::Arc};

/// Semantic type of a route parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    /// One path segment: `[^/]+`.
    String,
    /// One path segment as raw bytes.
    Bytes,
    /// The rest of the path, slashes included.
    Url,
    /// Consumes the placeholder without matching anything or binding a value.
    Void,
    /// Registered with [`Router::add_converter`](crate::Router::add_converter).
    Custom(&'static str),
}

/// A converted placeholder value.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

/// Turns captured text into a value; `None` rejects the match.
pub type ConvertFn = Arc<dyn Fn(&str) -> Option<Param> + Send + Sync>;

#[derive(Clone)]
pub(crate) struct Converter {
    pub(crate) fragment: String,
    pub(crate) convert: ConvertFn,
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter").field("fragment", &self.fragment).finish()
    }
}

/// Registry keyed by [`ParamKind`].
#[derive(Debug, Clone)]
pub(crate) struct Converters {
    map: HashMap<ParamKind, Converter>,
}

const SIGNED: &str = r"[+-]?\d+";
const UNSIGNED: &str = r"[+]?\d+";
const FLOAT: &str = r"[+-]?(?:[0-9]+(?:[.][0-9]*)?|[.][0-9]+)";
const SEGMENT: &str = r"[^/]+";
const TAIL: &str = r".*";

macro_rules! number {
    ($map:ident, $kind:ident, $ty:ty, $fragment:expr, $variant:ident, $wide:ty) => {
        $map.insert(
            ParamKind::$kind,
            Converter {
                fragment: $fragment.to_owned(),
                convert: Arc::new(|s: &str| s.parse::<$ty>().ok().map(|v| Param::$variant(v as $wide))),
            },
        );
    };
}

impl Default for Converters {
    fn default() -> Self {
        let mut map = HashMap::new();

        number!(map, I8, i8, SIGNED, Int, i64);
        number!(map, I16, i16, SIGNED, Int, i64);
        number!(map, I32, i32, SIGNED, Int, i64);
        number!(map, I64, i64, SIGNED, Int, i64);
        number!(map, U8, u8, UNSIGNED, Uint, u64);
        number!(map, U16, u16, UNSIGNED, Uint, u64);
        number!(map, U32, u32, UNSIGNED, Uint, u64);
        number!(map, U64, u64, UNSIGNED, Uint, u64);
        number!(map, F32, f32, FLOAT, Float, f64);
        number!(map, F64, f64, FLOAT, Float, f64);

        let string: ConvertFn = Arc::new(|s: &str| Some(Param::Str(s.to_owned())));
        map.insert(ParamKind::String, Converter { fragment: SEGMENT.to_owned(), convert: string.clone() });
        map.insert(ParamKind::Url, Converter { fragment: TAIL.to_owned(), convert: string });
        map.insert(
            ParamKind::Bytes,
            Converter {
                fragment: SEGMENT.to_owned(),
                convert: Arc::new(|s: &str| Some(Param::Bytes(s.as_bytes().to_vec()))),
            },
        );
        map.insert(
            ParamKind::Void,
            Converter {
                fragment: String::new(),
                convert: Arc::new(|_: &str| None),
            },
        );

        Self { map }
    }
}

impl Converters {
    #[inline]
    pub(crate) fn get(&self, kind: ParamKind) -> Option<&Converter> {
        self.map.get(&kind)
    }

    /// Adds or replaces a converter. The fragment must compile and must not
    /// contain capture groups of its own.
    pub(crate) fn insert(&mut self, kind: ParamKind, fragment: &str, convert: ConvertFn) -> Result<(), RouteError> {
        if Regex::new(fragment)?.captures_len() != 1 {
            return Err(RouteError::CaptureGroupInFragment(kind));
        }

        self.map.insert(
            kind,
            Converter {
                fragment: fragment.to_owned(),
                convert,
            },
        );
        Ok(())
    }
}

/// Values bound to a matched rule's placeholders, in pattern order.
///
/// `Void` placeholders bind nothing and are not counted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(pub(crate) Vec<Param>);

impl Params {
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn raw(&self, index: usize) -> Option<&Param> {
        self.0.get(index)
    }

    /// The value at `index` as `T`, `None` when absent or of another type.
    ///
    /// ```
    /// # use duet_http::Params;
    /// # fn demo(params: &Params) -> Option<()> {
    /// let id: u32 = params.get(0)?;
    /// let name: String = params.get(1)?;
    /// # Some(())
    /// # }
    /// ```
    #[inline]
    pub fn get<T: FromParam>(&self, index: usize) -> Option<T> {
        T::from_param(self.0.get(index)?)
    }

    /// Borrowed text of a string parameter.
    pub fn str(&self, index: usize) -> Option<&str> {
        match self.0.get(index)? {
            Param::Str(value) => Some(value),
            _ => None,
        }
    }
}

/// Extraction of a typed value from a [`Param`].
pub trait FromParam: Sized {
    fn from_param(param: &Param) -> Option<Self>;
}

macro_rules! from_param_number {
    ($($ty:ty),*) => {$(
        impl FromParam for $ty {
            fn from_param(param: &Param) -> Option<Self> {
                match param {
                    Param::Int(v) => <$ty>::try_from(*v).ok(),
                    Param::Uint(v) => <$ty>::try_from(*v).ok(),
                    _ => None,
                }
            }
        }
    )*};
}

from_param_number!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

impl FromParam for f64 {
    fn from_param(param: &Param) -> Option<Self> {
        match param {
            Param::Float(v) => Some(*v),
            Param::Int(v) => Some(*v as f64),
            Param::Uint(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl FromParam for f32 {
    fn from_param(param: &Param) -> Option<Self> {
        f64::from_param(param).map(|v| v as f32)
    }
}

impl FromParam for String {
    fn from_param(param: &Param) -> Option<Self> {
        match param {
            Param::Str(v) => Some(v.clone()),
            Param::Bytes(v) => String::from_utf8(v.clone()).ok(),
            _ => None,
        }
    }
}

impl FromParam for Vec<u8> {
    fn from_param(param: &Param) -> Option<Self> {
        match param {
            Param::Bytes(v) => Some(v.clone()),
            Param::Str(v) => Some(v.clone().into_bytes()),
            _ => None,
        }
    }
}

impl FromParam for Param {
    fn from_param(param: &Param) -> Option<Self> {
        Some(param.clone())
    }
}
