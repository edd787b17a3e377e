use crate::components::window::{BlockSize, Window};

pub type Result<T> = std::result::Result<T, RastoreError>;

#[derive(thiserror::Error, Debug)]
pub enum RastoreError {
    /// Backend stream fault. Keeps the underlying diagnostic text.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("window {0:?} does not start on the {1:?} block grid")]
    Unaligned(Window, BlockSize),
    #[error("window {0:?} does not cover whole {1:?} blocks")]
    RaggedWindow(Window, BlockSize),
    #[error("window {window:?} exceeds the {cols}x{rows} image extent")]
    OutOfBounds {
        window: Window,
        cols: usize,
        rows: usize,
    },
    #[error("buffer shape {actual:?} does not match expected shape {expected:?}")]
    ShapeMismatch {
        expected: [usize; 3],
        actual: [usize; 3],
    },
    #[error("buffer length {actual} does not match shape {shape:?}")]
    BufferLength { shape: [usize; 3], actual: usize },
    #[error("plane index {index} out of range for {planes} planes")]
    BadPlane { index: usize, planes: usize },
    #[error("block size {0:?} must be nonzero in both axes")]
    ZeroBlock(BlockSize),
    #[error("image extent {0}x{1} must be nonzero")]
    EmptyImage(usize, usize),
    #[error("resource is not bound for {0}")]
    NotBound(&'static str),
    #[error("block layout is frozen, {0} block write(s) already accepted")]
    LayoutFrozen(usize),
    #[error("an image cannot combine a multi-channel pixel format with multiple planes")]
    PlaneChannelConflict,
}

impl RastoreError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        RastoreError::Io {
            context: context.into(),
            source,
        }
    }
}
