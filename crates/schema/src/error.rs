use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum SchemaError {
    #[error("Key fields '{fields}' are not a valid field set: {message}")]
    InvalidKeyFields { fields: String, message: String },

    #[error("Key fields '{fields}' must only select fields.")]
    UnsupportedKeySelection { fields: String },

    #[error("Key fields must not be empty.")]
    EmptyKeyFields,
}
