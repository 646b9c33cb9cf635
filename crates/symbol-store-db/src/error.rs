//! Error types for the symbol store

use std::fmt;

#[derive(Debug)]
pub enum SymbolStoreError {
    /// No resident entry for the key (never stored, deleted or evicted)
    NotFound {
        debug_name: String,
        breakpad_id: String,
    },
    /// The underlying database failed to open, read or commit
    Storage(Box<sqlx::Error>),
    /// Invalid construction parameters
    Config(String),
}

impl SymbolStoreError {
    pub(crate) fn not_found(debug_name: &str, breakpad_id: &str) -> Self {
        SymbolStoreError::NotFound {
            debug_name: debug_name.to_string(),
            breakpad_id: breakpad_id.to_string(),
        }
    }

    /// A stored value that could not be decoded
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        let msg: String = msg.into();
        SymbolStoreError::Storage(Box::new(sqlx::Error::Decode(msg.into())))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SymbolStoreError::NotFound { .. })
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, SymbolStoreError::Storage(_))
    }
}

impl fmt::Display for SymbolStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolStoreError::NotFound {
                debug_name,
                breakpad_id,
            } => write!(
                f,
                "Symbol table for {} ({}) does not exist in the database",
                debug_name, breakpad_id
            ),
            SymbolStoreError::Storage(err) => write!(f, "Storage error: {}", err),
            SymbolStoreError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for SymbolStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SymbolStoreError::Storage(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for SymbolStoreError {
    fn from(err: sqlx::Error) -> Self {
        SymbolStoreError::Storage(Box::new(err))
    }
}

impl From<std::io::Error> for SymbolStoreError {
    fn from(err: std::io::Error) -> Self {
        SymbolStoreError::Storage(Box::new(sqlx::Error::Io(err)))
    }
}

pub type Result<T> = std::result::Result<T, SymbolStoreError>;
