use std::{
    borrow::Cow,
    fmt::{self, Display, Formatter},
    path::Path,
};

use anyhow::Error;

/// Creates a new error with a caller-specified error class name and message.
pub fn custom_error(class: &'static str, message: impl Into<Cow<'static, str>>) -> Error {
    CustomError {
        class,
        message: message.into(),
    }
    .into()
}

pub fn type_error(message: impl Into<Cow<'static, str>>) -> Error {
    custom_error("TypeError", message)
}

pub fn config_error(message: impl Into<Cow<'static, str>>) -> Error {
    custom_error("InvalidConfig", message)
}

pub fn relative_path_error(path: &Path) -> Error {
    custom_error(
        "InvalidPath",
        format!("Path must be absolute: '{}'", path.display()),
    )
}

/// Errors produced while turning a URL into an [`crate::Origin`].
#[derive(Debug, thiserror::Error)]
pub enum OriginError {
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("url '{0}' has no host")]
    MissingHost(String),
    #[error("url '{0}' has an opaque origin")]
    Opaque(String),
}

/// A simple error type that lets the creator specify both the error message and
/// the error class name. This type is private; externally it only ever appears
/// wrapped in an `anyhow::Error`. To retrieve the error class name from a wrapped
/// `CustomError`, use the function `get_custom_error_class()`.
#[derive(Debug)]
struct CustomError {
    class: &'static str,
    message: Cow<'static, str>,
}

impl Display for CustomError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CustomError {}

/// If this error was crated with `custom_error()`, return the specified error
/// class name. In all other cases this function returns `None`.
pub fn get_custom_error_class(error: &Error) -> Option<&'static str> {
    error.downcast_ref::<CustomError>().map(|e| e.class)
}
