use std::fmt;

/// A single attribute cell. `Null` marks an attribute that could not be
/// computed (e.g. a grid cell with no overlapping zones) and is distinct
/// from a numeric zero.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Num(f64),
    Cat(String),
    Bool(bool),
    Null,
}

impl AttrValue {
    #[inline]
    pub fn as_num(&self) -> Option<f64> {
        match self {
            AttrValue::Num(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_cat(&self) -> Option<&str> {
        match self {
            AttrValue::Cat(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Num(v) => write!(f, "{v}"),
            AttrValue::Cat(v) => write!(f, "{v}"),
            AttrValue::Bool(v) => write!(f, "{v}"),
            AttrValue::Null => write!(f, "null"),
        }
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Num(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Cat(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Cat(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}
