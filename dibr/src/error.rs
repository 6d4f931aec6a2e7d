use std::path::PathBuf;

/// [`std::result::Result`] alias for functions that return crate [`Error`]s.
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for any error that can happen while configuring, loading, or
/// running a view-synthesis pipeline.
///
/// Every variant that can be raised mid-pipeline carries a context string
/// identifying the frame, virtual camera, input camera and operation, as
/// required by the error-handling design: errors should be diagnosable
/// without a debugger.
#[derive(thiserror::Error)]
#[allow(missing_docs)]
pub enum Error {
    #[error("io error {0:?}")]
    Io(#[from] std::io::Error),

    #[error("io error {0:?} while {1}")]
    IoWhen(std::io::Error, String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("exr error: {0}")]
    Exr(#[from] exr::error::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("geometry error: {0}")]
    Geometry(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("{0} while {1}")]
    Context(Box<Error>, String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Creates a closure that will construct an [`Error::IoWhen`] with the
    /// given message. Useful as syntactic sugar inside a [`Result::map_err`]
    /// call.
    pub fn io_ctx(msg: impl AsRef<str>) -> impl FnOnce(std::io::Error) -> Self {
        move |err| Self::IoWhen(err, msg.as_ref().to_string())
    }

    /// Attaches a context string (frame/camera/operation) to an existing
    /// error. Chainable: repeated calls nest context without discarding the
    /// original cause.
    pub fn context(self, msg: impl AsRef<str>) -> Self {
        Self::Context(Box::new(self), msg.as_ref().to_string())
    }

    /// Builds the `"frame {frame}, virtual camera {virtual_cam}, input
    /// camera {input_cam}, op {op}"` context string used throughout the
    /// pipeline controller.
    pub fn pipeline_ctx(
        frame: u32,
        virtual_cam: &str,
        input_cam: Option<&str>,
        op: &str,
    ) -> String {
        match input_cam {
            Some(input_cam) => format!(
                "frame {frame}, virtual camera {virtual_cam:?}, input camera {input_cam:?}, op {op}"
            ),
            None => format!("frame {frame}, virtual camera {virtual_cam:?}, op {op}"),
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub(crate) fn missing_key(key: &str) -> Self {
        Self::Config(format!("missing required key {key:?}"))
    }

    pub(crate) fn mismatched_len(what: &str, expected: usize, got: usize) -> Self {
        Self::Config(format!(
            "{what}: expected {expected} entries, got {got}"
        ))
    }

    pub(crate) fn file_not_found(path: &PathBuf) -> Self {
        Self::Config(format!("file not found: {path:?}"))
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}
