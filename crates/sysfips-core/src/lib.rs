pub mod config;
pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod native;
pub mod policy;
pub mod resolver;
pub mod status_file;

pub use config::{DiagnosticsCfg, NativeCfg, PolicyCfg, ProbeConfig, StatusCfg};
pub use diagnostics::{DiagnosticSink, Diagnostics, LogSink, MSG_MAX_SIZE};
pub use error::{AcquisitionError, FipsError, FipsResult, QueryError, StatusFileError};
pub use native::{EntryPoint, LibraryHandle, LibraryLoader, LibraryToken, NativeBinding};
pub use policy::{AlignmentReport, CryptoPolicy};
pub use resolver::{CapabilityKind, FipsResolver};
