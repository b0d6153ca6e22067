use arbitros_integration::ErrorKind;

/// Error returned by persistence reads and by the writer task when a flush ultimately fails.
/// Hot-path callers never see this directly — sends into the write channel cannot fail, they
/// can only be dropped (see [`crate::channel::WriteChannel`]).
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct PersistenceError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl PersistenceError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::PersistenceUnavailable, detail)
    }
}
