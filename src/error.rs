use std::path::PathBuf;

use thiserror::Error;

/// Helper macro for creating malformed data errors with source location information.
///
/// Records the file and line where the malformation was detected, which makes it much
/// easier to track down which structure of a PE image or manifest was rejected.
///
/// # Examples
///
/// ```rust,ignore
/// // Single string version
/// let error = malformed_error!("Invalid metadata signature");
///
/// // Format string version
/// let error = malformed_error!("Invalid heap offset: {}", offset);
/// ```
macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can return.
///
/// The variants follow the error taxonomy of the shading engine:
///
/// - **Input errors** ([`Error::Manifest`], [`Error::KeyMaterial`], [`Error::FileError`]) abort
///   the whole operation.
/// - **Binary format errors** ([`Error::Malformed`], [`Error::OutOfBounds`],
///   [`Error::NotSupported`], [`Error::GoblinErr`]) are raised while reading or writing a single
///   assembly. During package resolution they cause the assembly to be skipped, during the
///   rewrite they are collected per binary.
/// - **Rewrite errors** ([`Error::Rewrite`], [`Error::Signing`]) wrap the cause of a failed
///   output binary.
#[derive(Error, Debug)]
pub enum Error {
    /// The data being parsed is malformed.
    ///
    /// Carries the source location where the malformation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing or patching a buffer.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// The image uses a layout this library can not rewrite.
    #[error("This file type is not supported - {0}")]
    NotSupported(String),

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),

    /// Error from the goblin crate during PE parsing.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),

    /// The manifest document could not be parsed.
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    /// The lock-file manifest is missing or structurally invalid.
    #[error("Manifest {path}: {message}")]
    Manifest {
        /// Path of the manifest that failed to load
        path: PathBuf,
        /// Description of the problem
        message: String,
    },

    /// Key material could not be created, loaded or decoded.
    #[error("Key material - {0}")]
    KeyMaterial(String),

    /// Strong-name signing of an image failed.
    #[error("Signing failed - {0}")]
    Signing(String),

    /// Rewriting a single planned binary failed.
    #[error("Failed to rewrite {path}: {source}")]
    Rewrite {
        /// The original path of the binary
        path: PathBuf,
        /// The underlying cause
        source: Box<Error>,
    },

    /// A compute-once cache entry failed for another caller.
    #[error("Cached computation failed - {0}")]
    Cache(String),
}

impl From<rsa::Error> for Error {
    fn from(error: rsa::Error) -> Self {
        Error::KeyMaterial(error.to_string())
    }
}
