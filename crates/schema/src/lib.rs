#![forbid(unsafe_code)]

mod error;
mod key_fields;
mod value_ext;

pub use error::SchemaError;
pub use key_fields::KeyFields;
pub use value_ext::ValueExt;
