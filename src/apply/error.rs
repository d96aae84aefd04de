//! Errors raised by the apply pipeline.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("announcement ID does not match the signer's Hub ID")]
    IdMismatch,
    #[error("data is not newer than the currently stored version")]
    OldData,
    #[error("announcement has zero valid transports")]
    MissingTransports,
    #[error("announcement timestamp is too far in the future")]
    FutureTimestamp,
    #[error("announcement changes an already-verified IP address")]
    ImmutableIpChanged,
    #[error("IP scope does not match the map's configured scope")]
    ScopeMismatch,
    #[error("status received for a hub that is not yet known (TOFU not permitted for status)")]
    UnknownHubForStatus,
    #[error(transparent)]
    Envelope(#[from] crate::hub::envelope::EnvelopeError),
    #[error(transparent)]
    Format(#[from] crate::hub::validate::FormatError),
    #[error("payload did not decode: {0}")]
    Decode(String),
}
