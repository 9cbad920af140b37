//! Native entry-point acquisition. The actual loader lives behind
//! [`LibraryLoader`] so the resolver can be exercised without touching the
//! system's dynamic linker.

use crate::diagnostics::Diagnostics;
use crate::error::AcquisitionError;
use std::fmt;
use std::os::raw::c_int;

/// Library exporting the system FIPS query.
pub const NSS_LIBRARY: &str = "libnss3.so";

/// Zero-argument export returning `1` when the system is in FIPS mode.
pub const NSS_FIPS_SYMBOL: &str = "SECMOD_GetSystemFIPSEnabled";

/// Raw signature of the native FIPS query.
pub type RawEntryPoint = unsafe extern "C" fn() -> c_int;

/// Callable native FIPS query resolved by name.
pub struct EntryPoint {
    func: RawEntryPoint,
}

impl EntryPoint {
    /// Wrap a resolved function pointer.
    ///
    /// # Safety
    ///
    /// `func` must take no arguments, return a C `int`, and be safe to call
    /// from any thread.
    pub unsafe fn new(func: RawEntryPoint) -> Self {
        Self { func }
    }

    /// Invoke the native query and return its raw value.
    ///
    /// # Safety
    ///
    /// The code behind the entry point must still be mapped: when it came
    /// from a dynamically opened library, that library must not have been
    /// closed yet.
    pub unsafe fn call(&self) -> c_int {
        (self.func)()
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntryPoint")
            .field(&(self.func as *const ()))
            .finish()
    }
}

/// Ownership token for a library opened by a [`LibraryLoader`].
pub trait LibraryToken: Send + Sync {
    /// Name the library was opened under.
    fn name(&self) -> &str;

    /// Close the library. Failures carry the loader's diagnostic text.
    fn close(self: Box<Self>) -> Result<(), String>;
}

/// Boxed library token owned by the resolver.
pub type LibraryHandle = Box<dyn LibraryToken>;

impl fmt::Debug for dyn LibraryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryToken")
            .field("name", &self.name())
            .finish()
    }
}

/// Successful acquisition of the native entry point.
#[derive(Debug)]
pub enum NativeBinding {
    /// Symbol was already present in the running process; nothing to release.
    StaticallyLinked(EntryPoint),
    /// Library was opened on our behalf and must be released after use.
    DynamicallyLoaded {
        entry: EntryPoint,
        library: LibraryHandle,
    },
}

impl NativeBinding {
    pub fn entry(&self) -> &EntryPoint {
        match self {
            NativeBinding::StaticallyLinked(entry) => entry,
            NativeBinding::DynamicallyLoaded { entry, .. } => entry,
        }
    }
}

/// Abstraction over the platform's dynamic loader.
///
/// Implementations locate `library`, open it, and resolve `symbol`. When the
/// symbol is missing after a successful open, the opened handle must be
/// returned inside [`AcquisitionError::SymbolNotFound`].
pub trait LibraryLoader {
    fn load(&self, library: &str, symbol: &str) -> Result<NativeBinding, AcquisitionError>;
}

/// Ask `loader` for `symbol` from `library`, reporting the outcome through
/// `diagnostics`.
pub fn acquire<L>(
    loader: &L,
    library: &str,
    symbol: &str,
    diagnostics: &Diagnostics,
) -> Result<NativeBinding, AcquisitionError>
where
    L: LibraryLoader + ?Sized,
{
    let outcome = loader.load(library, symbol);
    match &outcome {
        Ok(NativeBinding::StaticallyLinked(_)) => diagnostics.render(
            format_args!("native: {symbol} already linked"),
            "native: entry point already linked",
        ),
        Ok(NativeBinding::DynamicallyLoaded { .. }) => diagnostics.render(
            format_args!("native: resolved {symbol} from {library}"),
            "native: entry point resolved",
        ),
        Err(AcquisitionError::LibraryNotFound { detail, .. }) => diagnostics.render(
            format_args!("native: open: {detail}"),
            "native: cannot open library",
        ),
        Err(AcquisitionError::SymbolNotFound { detail, .. }) => diagnostics.render(
            format_args!("native: resolve: {detail}"),
            "native: cannot resolve entry point",
        ),
    }
    outcome
}

/// Close a library handle. Close failures are reported, never returned.
pub fn release(handle: LibraryHandle, diagnostics: &Diagnostics) {
    let name = handle.name().to_string();
    match handle.close() {
        Ok(()) => diagnostics.render(
            format_args!("native: closed {name}"),
            "native: closed library",
        ),
        Err(detail) => {
            log::warn!("failed to close {name}: {detail}");
            diagnostics.render(
                format_args!("native: cannot close {name}: {detail}"),
                "native: cannot close library",
            );
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::diagnostics::tests::recording;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    pub(crate) extern "C" fn reports_enabled() -> c_int {
        1
    }

    pub(crate) extern "C" fn reports_disabled() -> c_int {
        0
    }

    pub(crate) extern "C" fn reports_garbage() -> c_int {
        0x7f
    }

    /// Library token that counts how often it gets closed.
    pub(crate) struct CountingToken {
        pub(crate) name: String,
        pub(crate) closes: Arc<AtomicUsize>,
        pub(crate) fail_close: bool,
    }

    impl LibraryToken for CountingToken {
        fn name(&self) -> &str {
            &self.name
        }

        fn close(self: Box<Self>) -> Result<(), String> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                Err("simulated dlclose failure".into())
            } else {
                Ok(())
            }
        }
    }

    #[derive(Clone, Copy)]
    pub(crate) enum MockOutcome {
        Linked(RawEntryPoint),
        Loaded(RawEntryPoint),
        MissingLibrary,
        MissingSymbol,
    }

    /// Loader returning a canned outcome and tracking library closes.
    pub(crate) struct MockLoader {
        pub(crate) outcome: MockOutcome,
        pub(crate) closes: Arc<AtomicUsize>,
        pub(crate) loads: AtomicUsize,
        pub(crate) fail_close: bool,
    }

    impl MockLoader {
        pub(crate) fn new(outcome: MockOutcome) -> Self {
            Self {
                outcome,
                closes: Arc::new(AtomicUsize::new(0)),
                loads: AtomicUsize::new(0),
                fail_close: false,
            }
        }

        pub(crate) fn failing_close(outcome: MockOutcome) -> Self {
            Self {
                fail_close: true,
                ..Self::new(outcome)
            }
        }

        pub(crate) fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }

        fn token(&self, library: &str) -> LibraryHandle {
            Box::new(CountingToken {
                name: library.to_string(),
                closes: self.closes.clone(),
                fail_close: self.fail_close,
            })
        }
    }

    impl LibraryLoader for MockLoader {
        fn load(&self, library: &str, symbol: &str) -> Result<NativeBinding, AcquisitionError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            match self.outcome {
                MockOutcome::Linked(func) => Ok(NativeBinding::StaticallyLinked(unsafe {
                    EntryPoint::new(func)
                })),
                MockOutcome::Loaded(func) => Ok(NativeBinding::DynamicallyLoaded {
                    entry: unsafe { EntryPoint::new(func) },
                    library: self.token(library),
                }),
                MockOutcome::MissingLibrary => Err(AcquisitionError::LibraryNotFound {
                    library: library.to_string(),
                    detail: format!("{library}: cannot open shared object file"),
                }),
                MockOutcome::MissingSymbol => Err(AcquisitionError::SymbolNotFound {
                    symbol: symbol.to_string(),
                    detail: format!("undefined symbol: {symbol}"),
                    library: self.token(library),
                }),
            }
        }
    }

    #[test]
    fn acquire_reports_missing_library() {
        let (sink, diag) = recording();
        let loader = MockLoader::new(MockOutcome::MissingLibrary);
        let err = acquire(&loader, "libnss3.so", NSS_FIPS_SYMBOL, &diag).unwrap_err();
        assert!(matches!(err, AcquisitionError::LibraryNotFound { .. }));
        assert_eq!(err.code(), "SF3000");
        let lines = sink.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines,
            vec!["native: open: libnss3.so: cannot open shared object file".to_string()]
        );
    }

    #[test]
    fn acquire_hands_back_library_on_missing_symbol() {
        let (_sink, diag) = recording();
        let loader = MockLoader::new(MockOutcome::MissingSymbol);
        let err = acquire(&loader, "libnss3.so", NSS_FIPS_SYMBOL, &diag).unwrap_err();
        let library = err.into_library().expect("handle must survive");
        assert_eq!(library.name(), "libnss3.so");
        release(library, &diag);
        assert_eq!(loader.closes(), 1);
    }

    #[test]
    fn acquire_resolves_loaded_entry_point() {
        let (sink, diag) = recording();
        let loader = MockLoader::new(MockOutcome::Loaded(reports_enabled));
        let binding = acquire(&loader, NSS_LIBRARY, NSS_FIPS_SYMBOL, &diag).unwrap();
        assert_eq!(unsafe { binding.entry().call() }, 1);
        assert_eq!(
            sink.lines(),
            vec!["native: resolved SECMOD_GetSystemFIPSEnabled from libnss3.so".to_string()]
        );
    }

    #[test]
    fn release_swallows_close_failures() {
        let (sink, diag) = recording();
        let loader = MockLoader::failing_close(MockOutcome::Loaded(reports_disabled));
        let binding = acquire(&loader, NSS_LIBRARY, NSS_FIPS_SYMBOL, &diag).unwrap();
        match binding {
            NativeBinding::DynamicallyLoaded { library, .. } => release(library, &diag),
            other => panic!("unexpected binding {other:?}"),
        }
        assert_eq!(loader.closes(), 1);
        assert!(sink
            .lines()
            .iter()
            .any(|line| line.contains("cannot close libnss3.so")));
    }
}
