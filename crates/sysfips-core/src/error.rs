use crate::native::LibraryHandle;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias for core operations.
pub type FipsResult<T> = Result<T, FipsError>;

#[derive(Error, Debug)]
pub enum FipsError {
    #[error("[SF1000] io error: {0}")]
    Io(#[from] io::Error),

    #[error("[SF1001] toml config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("[SF1002] yaml config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("[SF1100] configuration error: {0}")]
    InvalidConfig(String),

    #[error("[SF1200] resolver lifecycle error: {0}")]
    Lifecycle(String),

    #[error("[{}] {}", .0.code(), .0)]
    Query(#[from] QueryError),
}

impl FipsError {
    pub fn code(&self) -> &'static str {
        match self {
            FipsError::Io(_) => "SF1000",
            FipsError::Toml(_) => "SF1001",
            FipsError::Yaml(_) => "SF1002",
            FipsError::InvalidConfig(_) => "SF1100",
            FipsError::Lifecycle(_) => "SF1200",
            FipsError::Query(err) => err.code(),
        }
    }
}

/// Failure to acquire the native entry point. Never fatal: the resolver
/// falls back to the status file.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("cannot open {library}: {detail}")]
    LibraryNotFound { library: String, detail: String },

    /// The library opened but the symbol is missing. The handle is carried
    /// here so the owner can release it at teardown.
    #[error("cannot resolve {symbol} in {}: {detail}", .library.name())]
    SymbolNotFound {
        symbol: String,
        detail: String,
        library: LibraryHandle,
    },
}

impl AcquisitionError {
    pub fn code(&self) -> &'static str {
        match self {
            AcquisitionError::LibraryNotFound { .. } => "SF3000",
            AcquisitionError::SymbolNotFound { .. } => "SF3001",
        }
    }

    /// Take the opened library out of a partial acquisition, if any.
    pub fn into_library(self) -> Option<LibraryHandle> {
        match self {
            AcquisitionError::LibraryNotFound { .. } => None,
            AcquisitionError::SymbolNotFound { library, .. } => Some(library),
        }
    }
}

/// Errors raised by the fallback status-file reader.
#[derive(Error, Debug)]
pub enum StatusFileError {
    #[error("cannot open {}: {source}", .path.display())]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Either end-of-stream on the first byte (`source` is `None`) or a
    /// failing read.
    #[error("cannot read {}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: Option<io::Error>,
    },
}

impl StatusFileError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            StatusFileError::OpenFailed { path, .. } | StatusFileError::ReadFailed { path, .. } => {
                path
            }
        }
    }
}

/// Failure of a single status query. Callers must read this as "status
/// unknown", never as "disabled".
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("fips resolver queried before initialization")]
    NotInitialized,

    #[error("fips resolver queried after shutdown")]
    Closed,

    #[error("fips status unavailable: {0}")]
    Fallback(#[from] StatusFileError),
}

impl QueryError {
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::NotInitialized => "SF2000",
            QueryError::Closed => "SF2001",
            QueryError::Fallback(StatusFileError::OpenFailed { .. }) => "SF2100",
            QueryError::Fallback(StatusFileError::ReadFailed { .. }) => "SF2101",
        }
    }
}

impl From<QueryError> for io::Error {
    fn from(err: QueryError) -> Self {
        let kind = match &err {
            QueryError::NotInitialized | QueryError::Closed => io::ErrorKind::Other,
            QueryError::Fallback(StatusFileError::OpenFailed { source, .. }) => source.kind(),
            QueryError::Fallback(StatusFileError::ReadFailed { .. }) => {
                io::ErrorKind::UnexpectedEof
            }
        };
        io::Error::new(kind, err)
    }
}
