//! Job execution error types
//!
//! Processing stages report failures through [`JobError`], which tells the
//! worker pool whether the whole job should be retried (transient I/O or
//! transcode crashes) or failed immediately (unreadable source, missing
//! configuration).

use std::fmt;

/// Job execution error that is either recoverable or unrecoverable.
#[derive(Debug)]
pub struct JobError {
    inner: anyhow::Error,
    recoverable: bool,
}

impl JobError {
    /// An error that must not be retried: unreadable/unsupported source,
    /// missing configuration, invalid input that will not change on retry.
    pub fn unrecoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: false,
        }
    }

    /// A transient error retried under the job's backoff policy.
    pub fn recoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: true,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for JobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for JobError {
    /// Default conversion treats errors as recoverable.
    fn from(err: anyhow::Error) -> Self {
        Self::recoverable(err)
    }
}

/// Extension trait for Result to mark failures unrecoverable at the call site.
pub trait JobResultExt<T> {
    fn unrecoverable(self) -> Result<T, JobError>;
}

impl<T, E: Into<anyhow::Error>> JobResultExt<T> for Result<T, E> {
    fn unrecoverable(self) -> Result<T, JobError> {
        self.map_err(|e| JobError::unrecoverable(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_conversion_is_recoverable() {
        let err: JobError = anyhow::anyhow!("transient").into();
        assert!(err.is_recoverable());
    }

    #[test]
    fn result_ext_marks_unrecoverable() {
        let res: Result<(), anyhow::Error> = Err(anyhow::anyhow!("no video stream"));
        let err = res.unrecoverable().unwrap_err();
        assert!(!err.is_recoverable());
    }
}
