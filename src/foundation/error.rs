pub type BackdropResult<T> = Result<T, BackdropError>;

#[derive(thiserror::Error, Debug)]
pub enum BackdropError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("segmentation error: {0}")]
    Segmentation(String),

    #[error("source error: {0}")]
    Source(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BackdropError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn segmentation(msg: impl Into<String>) -> Self {
        Self::Segmentation(msg.into())
    }

    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// True for failures the frame loop recovers from by drawing unfiltered.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Segmentation(_))
    }
}

impl From<serde_json::Error> for BackdropError {
    fn from(e: serde_json::Error) -> Self {
        Self::serde(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            BackdropError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            BackdropError::segmentation("x")
                .to_string()
                .contains("segmentation error:")
        );
        assert!(
            BackdropError::source("x")
                .to_string()
                .contains("source error:")
        );
        assert!(
            BackdropError::serde("x")
                .to_string()
                .contains("serialization error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = BackdropError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn only_segmentation_failures_are_transient() {
        assert!(BackdropError::segmentation("model timed out").is_transient());
        assert!(!BackdropError::source("404").is_transient());
        assert!(!BackdropError::validation("bad").is_transient());
    }
}
