//! Errors raised by component A.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("hub lacks an announcement")]
    MissingInfo,
    #[error("announcement parses but has zero valid transports")]
    MissingTransports,
    #[error("data is not newer than the currently stored version")]
    OldData,
    #[error("temporary validation failure, caller may retry")]
    Temporary,
    #[error(transparent)]
    Envelope(#[from] super::envelope::EnvelopeError),
    #[error(transparent)]
    Format(#[from] super::validate::FormatError),
}
