/// Shared error type used across all agent-dispatch crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store: {0}")]
    Store(String),

    #[error("broker: {0}")]
    Broker(String),

    #[error("LLM: {0}")]
    Llm(String),

    #[error("notify: {0}")]
    Notify(String),

    #[error("config: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    State(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for errors the boundary maps to a 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_detectable() {
        assert!(Error::NotFound("task 1".into()).is_not_found());
        assert!(!Error::Store("boom".into()).is_not_found());
    }

    #[test]
    fn display_prefixes_kind() {
        let e = Error::Broker("XADD failed".into());
        assert_eq!(e.to_string(), "broker: XADD failed");
    }
}
