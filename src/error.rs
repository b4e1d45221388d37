pub use crate::types::SubcollectorError;

pub type Result<T> = std::result::Result<T, SubcollectorError>;

pub trait ErrorContext<T> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    fn wordlist_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| SubcollectorError::ConfigError(format!("{}: {}", f(), e)))
    }

    fn wordlist_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| SubcollectorError::WordlistLoad(format!("{}: {}", f(), e)))
    }
}
