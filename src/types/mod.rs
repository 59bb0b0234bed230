mod schema;
mod value;

pub use schema::{AttrKind, Field, Schema};
pub use value::AttrValue;
