use super::AttrValue;

/// How an attribute participates in aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrKind {
    /// Reduced by area-weighted sum.
    Numeric,
    /// Reduced by largest-contributor-wins.
    Categorical,
    /// Flag columns (e.g. highlight); never aggregated.
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub kind: AttrKind,
}

impl Field {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: AttrKind::Numeric }
    }

    pub fn categorical(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: AttrKind::Categorical }
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: AttrKind::Boolean }
    }

    /// True if `value` may be stored under this field. Null is accepted
    /// everywhere; it marks missing data, not a type of its own.
    pub fn accepts(&self, value: &AttrValue) -> bool {
        match (self.kind, value) {
            (_, AttrValue::Null) => true,
            (AttrKind::Numeric, AttrValue::Num(_)) => true,
            (AttrKind::Categorical, AttrValue::Cat(_)) => true,
            (AttrKind::Boolean, AttrValue::Bool(_)) => true,
            _ => false,
        }
    }
}

/// Ordered attribute schema shared by every row of a layer. Inferred once
/// at load time and carried as typed metadata, never re-derived per row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[inline]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Column position of `name`, if present.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, idx: usize) -> &Field {
        &self.fields[idx]
    }
}
