use thiserror::Error;

/// Reasons a namespace declaration cannot be added to an element.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamespaceError {
    #[error("`{0}` is not a valid namespace prefix")]
    InvalidPrefix(String),

    #[error("prefix `{0}` is reserved")]
    ReservedPrefix(String),

    #[error("namespace URI `{0}` is reserved")]
    ReservedUri(String),

    #[error("prefix `{0}` cannot be bound to an empty namespace URI")]
    EmptyHref(String),

    #[error("{} is already declared on element `{element}`", describe(.prefix))]
    DuplicatePrefix {
        prefix: Option<String>,
        element: String,
    },
}

fn describe(prefix: &Option<String>) -> String {
    match prefix {
        Some(p) => format!("prefix `{}`", p),
        None => "the default namespace".to_string(),
    }
}
