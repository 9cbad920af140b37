//! FIPS status resolver: acquires the native query once, then answers every
//! status request from it or from the kernel status file.
//!
//! The resolver is an owned context object. The embedding host creates it,
//! calls [`FipsResolver::initialize`] once, queries it from any number of
//! threads, and finally calls [`FipsResolver::shutdown`] (or drops it).

use crate::config::ProbeConfig;
use crate::diagnostics::{DiagnosticSink, Diagnostics};
use crate::error::{AcquisitionError, FipsError, FipsResult, QueryError};
use crate::native::{self, EntryPoint, LibraryHandle, LibraryLoader, NativeBinding};
use crate::status_file::read_status;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Weak;

/// Which detection mechanism the resolver settled on at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    StaticallyLinked,
    DynamicallyLoaded,
    Unavailable,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CapabilityKind::StaticallyLinked => "native (linked)",
            CapabilityKind::DynamicallyLoaded => "native (loaded)",
            CapabilityKind::Unavailable => "status file",
        };
        f.write_str(label)
    }
}

enum NativeCapability {
    StaticallyLinked(EntryPoint),
    DynamicallyLoaded {
        entry: EntryPoint,
        library: LibraryHandle,
    },
    /// No entry point. A library that opened but lacked the symbol is kept
    /// here until shutdown.
    Unavailable { retained: Option<LibraryHandle> },
}

impl NativeCapability {
    fn kind(&self) -> CapabilityKind {
        match self {
            NativeCapability::StaticallyLinked(_) => CapabilityKind::StaticallyLinked,
            NativeCapability::DynamicallyLoaded { .. } => CapabilityKind::DynamicallyLoaded,
            NativeCapability::Unavailable { .. } => CapabilityKind::Unavailable,
        }
    }

    fn entry(&self) -> Option<&EntryPoint> {
        match self {
            NativeCapability::StaticallyLinked(entry)
            | NativeCapability::DynamicallyLoaded { entry, .. } => Some(entry),
            NativeCapability::Unavailable { .. } => None,
        }
    }

    fn into_library(self) -> Option<LibraryHandle> {
        match self {
            NativeCapability::StaticallyLinked(_) => None,
            NativeCapability::DynamicallyLoaded { library, .. } => Some(library),
            NativeCapability::Unavailable { retained } => retained,
        }
    }
}

impl From<Result<NativeBinding, AcquisitionError>> for NativeCapability {
    fn from(outcome: Result<NativeBinding, AcquisitionError>) -> Self {
        match outcome {
            Ok(NativeBinding::StaticallyLinked(entry)) => NativeCapability::StaticallyLinked(entry),
            Ok(NativeBinding::DynamicallyLoaded { entry, library }) => {
                NativeCapability::DynamicallyLoaded { entry, library }
            }
            Err(err) => NativeCapability::Unavailable {
                retained: err.into_library(),
            },
        }
    }
}

enum ResolverState {
    Uninitialized,
    Initialized(NativeCapability),
    Closed,
}

/// Owned resolver context with an explicit `Uninitialized → Initialized →
/// Closed` lifecycle.
pub struct FipsResolver {
    state: ResolverState,
    diagnostics: Diagnostics,
    library: String,
    symbol: String,
    status_path: PathBuf,
}

impl fmt::Debug for FipsResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FipsResolver")
            .field("capability", &self.capability())
            .field("library", &self.library)
            .field("symbol", &self.symbol)
            .field("status_path", &self.status_path)
            .finish()
    }
}

impl FipsResolver {
    /// Build an uninitialized resolver from configuration.
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            state: ResolverState::Uninitialized,
            diagnostics: Diagnostics::disabled(),
            library: config.native.library.clone(),
            symbol: config.native.symbol.clone(),
            status_path: config.status_path(),
        }
    }

    /// Attach diagnostics and try to acquire the native entry point.
    ///
    /// Failing to find the library or symbol is not an error: every later
    /// query then reads the status file instead. Only a second call fails.
    pub fn initialize<L>(
        &mut self,
        loader: &L,
        sink: Option<Weak<dyn DiagnosticSink>>,
    ) -> FipsResult<()>
    where
        L: LibraryLoader + ?Sized,
    {
        if !matches!(self.state, ResolverState::Uninitialized) {
            return Err(FipsError::Lifecycle(
                "resolver can only be initialized once".to_string(),
            ));
        }

        self.diagnostics = Diagnostics::new(sink);
        let capability: NativeCapability =
            native::acquire(loader, &self.library, &self.symbol, &self.diagnostics).into();

        log::debug!("fips resolver initialized using {}", capability.kind());
        self.state = ResolverState::Initialized(capability);
        Ok(())
    }

    /// Report whether the system is in FIPS mode right now.
    pub fn query(&self) -> Result<bool, QueryError> {
        let capability = match &self.state {
            ResolverState::Initialized(capability) => capability,
            ResolverState::Uninitialized => return Err(QueryError::NotInitialized),
            ResolverState::Closed => return Err(QueryError::Closed),
        };

        match capability.entry() {
            Some(entry) => Ok(self.query_native(entry)),
            None => Ok(read_status(&self.status_path, &self.diagnostics)?),
        }
    }

    fn query_native(&self, entry: &EntryPoint) -> bool {
        self.diagnostics.render(
            format_args!("query: calling {}", self.symbol),
            "query: calling native entry point",
        );
        // SAFETY: a loaded library lives next to its entry point in the
        // capability and is only released by `shutdown`, which needs
        // `&mut self` and therefore cannot overlap this call.
        let raw = unsafe { entry.call() };
        self.diagnostics.render(
            format_args!("query: {} returned {:#x}", self.symbol, raw),
            "query: cannot render native return value",
        );
        raw == 1
    }

    /// Tear down, releasing any library this resolver opened. Safe to call in
    /// any state; only the first call after initialization does work.
    pub fn shutdown(&mut self) {
        let state = std::mem::replace(&mut self.state, ResolverState::Closed);
        match state {
            ResolverState::Initialized(capability) => {
                if let Some(library) = capability.into_library() {
                    native::release(library, &self.diagnostics);
                }
                log::debug!("fips resolver closed");
            }
            ResolverState::Uninitialized => self.state = ResolverState::Uninitialized,
            ResolverState::Closed => {}
        }
    }

    /// Mechanism selected at initialization; `None` outside `Initialized`.
    pub fn capability(&self) -> Option<CapabilityKind> {
        match &self.state {
            ResolverState::Initialized(capability) => Some(capability.kind()),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, ResolverState::Closed)
    }

    pub fn status_path(&self) -> &Path {
        &self.status_path
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

impl Drop for FipsResolver {
    fn drop(&mut self) {
        self.shutdown();
    }
}
