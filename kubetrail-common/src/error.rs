use thiserror::Error;

/// A raw cluster object could not be read as a [`crate::ResourceObject`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("object is not a JSON mapping (found {0})")]
    NotAnObject(&'static str),

    #[error("object is missing required field `{0}`")]
    MissingField(&'static str),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("empty requirement in selector `{0}`")]
    EmptyRequirement(String),

    #[error("invalid label key `{0}`")]
    InvalidKey(String),

    #[error("unknown selector operator `{operator}` for key `{key}`")]
    UnknownOperator { key: String, operator: String },

    #[error("malformed value set `{0}`, expected `(a,b,...)`")]
    MalformedValueSet(String),

    #[error("malformed label selector object: {0}")]
    MalformedObject(String),
}
