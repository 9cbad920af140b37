//! `LibraryLoader` implementation on top of the platform dynamic linker.
//! The running process is probed first so an already linked NSS is used
//! without opening a second handle.

use libloading::Library;
use std::sync::Weak;
use sysfips_core::config::ProbeConfig;
use sysfips_core::diagnostics::DiagnosticSink;
use sysfips_core::error::{AcquisitionError, FipsResult};
use sysfips_core::native::{
    EntryPoint, LibraryHandle, LibraryLoader, LibraryToken, NativeBinding, RawEntryPoint,
};
use sysfips_core::resolver::FipsResolver;

/// Dynamic library opened by [`SystemLibraryLoader`].
struct OpenedLibrary {
    name: String,
    library: Library,
}

impl LibraryToken for OpenedLibrary {
    fn name(&self) -> &str {
        &self.name
    }

    fn close(self: Box<Self>) -> Result<(), String> {
        self.library.close().map_err(|err| err.to_string())
    }
}

/// Loader backed by `dlopen`/`dlsym`.
#[derive(Debug, Clone)]
pub struct SystemLibraryLoader {
    probe_linked: bool,
}

impl Default for SystemLibraryLoader {
    fn default() -> Self {
        Self { probe_linked: true }
    }
}

impl SystemLibraryLoader {
    pub fn new(probe_linked: bool) -> Self {
        Self { probe_linked }
    }

    pub fn from_config(config: &ProbeConfig) -> Self {
        Self::new(config.native.probe_linked)
    }

    /// Look `symbol` up in the running process image.
    #[cfg(unix)]
    fn linked_entry(&self, symbol: &str) -> Option<EntryPoint> {
        let this = libloading::os::unix::Library::this();
        // SAFETY: the signature matches the documented zero-argument query.
        // Symbols in the process image stay mapped for the process lifetime.
        let entry = unsafe {
            this.get::<RawEntryPoint>(symbol.as_bytes())
                .ok()
                .map(|sym| EntryPoint::new(*sym))
        };
        if entry.is_none() {
            log::trace!("{symbol} not present in process image");
        }
        entry
    }

    #[cfg(not(unix))]
    fn linked_entry(&self, _symbol: &str) -> Option<EntryPoint> {
        None
    }
}

impl LibraryLoader for SystemLibraryLoader {
    fn load(&self, library: &str, symbol: &str) -> Result<NativeBinding, AcquisitionError> {
        if self.probe_linked {
            if let Some(entry) = self.linked_entry(symbol) {
                return Ok(NativeBinding::StaticallyLinked(entry));
            }
        }

        // SAFETY: opening the library runs its initializers; the configured
        // crypto library is trusted system code.
        let opened = unsafe { Library::new(library) }.map_err(|err| {
            AcquisitionError::LibraryNotFound {
                library: library.to_string(),
                detail: err.to_string(),
            }
        })?;

        // SAFETY: as above; the function pointer is only used while the
        // returned library handle is alive.
        let resolved = unsafe {
            opened
                .get::<RawEntryPoint>(symbol.as_bytes())
                .map(|sym| EntryPoint::new(*sym))
        };

        let handle: LibraryHandle = Box::new(OpenedLibrary {
            name: library.to_string(),
            library: opened,
        });
        match resolved {
            Ok(entry) => Ok(NativeBinding::DynamicallyLoaded {
                entry,
                library: handle,
            }),
            Err(err) => Err(AcquisitionError::SymbolNotFound {
                symbol: symbol.to_string(),
                detail: err.to_string(),
                library: handle,
            }),
        }
    }
}

/// Build a resolver from `config` and initialize it against the system
/// loader.
pub fn open_resolver(
    config: &ProbeConfig,
    sink: Option<Weak<dyn DiagnosticSink>>,
) -> FipsResult<FipsResolver> {
    let loader = SystemLibraryLoader::from_config(config);
    let mut resolver = FipsResolver::new(config);
    resolver.initialize(&loader, sink)?;
    Ok(resolver)
}
