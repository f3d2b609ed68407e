//! Common error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The other end of the USB bridge has gone away
    #[error("USB bridge closed ({0} side)")]
    BridgeClosed(&'static str),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::BridgeClosed("worker").to_string(),
            "USB bridge closed (worker side)"
        );
        assert!(
            Error::Logging("bad filter".into())
                .to_string()
                .contains("bad filter")
        );
    }
}
