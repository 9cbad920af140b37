use std::fs;
use std::sync::{Arc, Mutex};
use sysfips_core::config::ProbeConfig;
use sysfips_core::diagnostics::DiagnosticSink;
use sysfips_core::error::{AcquisitionError, QueryError, StatusFileError};
use sysfips_core::native::{acquire, LibraryLoader, LibraryToken, NativeBinding};
use sysfips_core::resolver::{CapabilityKind, FipsResolver};
use sysfips_core::Diagnostics;
use sysfips_nss::{open_resolver, SystemLibraryLoader};
use tempfile::{tempdir, TempDir};

const MISSING_LIBRARY: &str = "libsysfips-absent.so";

#[derive(Default)]
struct CollectingSink {
    lines: Mutex<Vec<String>>,
}

impl DiagnosticSink for CollectingSink {
    fn println(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}

/// Config pointing at a library that cannot exist and a private status file.
fn fallback_config(dir: &TempDir, status: Option<&[u8]>) -> ProbeConfig {
    let status_path = dir.path().join("fips_enabled");
    if let Some(bytes) = status {
        fs::write(&status_path, bytes).unwrap();
    }
    let mut config = ProbeConfig::default();
    config.native.library = MISSING_LIBRARY.to_string();
    config.native.symbol = "sysfips_missing_fips_query".to_string();
    config.status.path = status_path.to_string_lossy().into_owned();
    config
}

#[test]
fn fallback_reads_enabled_flag() {
    let dir = tempdir().unwrap();
    let resolver = open_resolver(&fallback_config(&dir, Some(b"1\n")), None).unwrap();
    assert_eq!(resolver.capability(), Some(CapabilityKind::Unavailable));
    assert!(resolver.query().unwrap());
}

#[test]
fn fallback_reads_disabled_flag() {
    let dir = tempdir().unwrap();
    let resolver = open_resolver(&fallback_config(&dir, Some(b"0\n")), None).unwrap();
    assert!(!resolver.query().unwrap());
}

#[test]
fn fallback_missing_status_file_fails_open() {
    let dir = tempdir().unwrap();
    let resolver = open_resolver(&fallback_config(&dir, None), None).unwrap();
    let err = resolver.query().unwrap_err();
    match err {
        QueryError::Fallback(StatusFileError::OpenFailed { path, .. }) => {
            assert_eq!(path, dir.path().join("fips_enabled"));
        }
        other => panic!("expected open failure, got {other:?}"),
    }
}

#[test]
fn fallback_empty_status_file_fails_read() {
    let dir = tempdir().unwrap();
    let resolver = open_resolver(&fallback_config(&dir, Some(b"")), None).unwrap();
    assert!(matches!(
        resolver.query().unwrap_err(),
        QueryError::Fallback(StatusFileError::ReadFailed { .. })
    ));
}

#[test]
fn diagnostics_explain_fallback_selection() {
    let dir = tempdir().unwrap();
    let sink = Arc::new(CollectingSink::default());
    let dyn_sink: Arc<dyn DiagnosticSink> = sink.clone();
    let config = fallback_config(&dir, Some(b"1\n"));
    let mut resolver = open_resolver(&config, Some(Arc::downgrade(&dyn_sink))).unwrap();
    assert!(resolver.query().unwrap());
    resolver.shutdown();

    let lines = sink.lines.lock().unwrap().clone();
    assert!(lines[0].starts_with("native: open: "), "{lines:?}");
    if cfg!(all(target_os = "linux", target_env = "gnu")) {
        // glibc's dlerror text fits a single diagnostic line.
        assert_eq!(
            lines[0],
            "native: open: libsysfips-absent.so: cannot open shared object file: \
             No such file or directory"
        );
    }
    assert_eq!(lines.last().unwrap(), "status: read character is '1'");
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
mod glibc {
    use super::*;

    /// `sched_yield` takes no arguments and returns 0 on success, which makes
    /// it a stand-in for a native query reporting "disabled".
    fn glibc_config(dir: &TempDir, probe_linked: bool) -> ProbeConfig {
        let mut config = fallback_config(dir, None);
        config.native.library = "libc.so.6".to_string();
        config.native.symbol = "sched_yield".to_string();
        config.native.probe_linked = probe_linked;
        config
    }

    #[test]
    fn loaded_entry_point_is_used_instead_of_status_file() {
        let dir = tempdir().unwrap();
        let mut resolver = open_resolver(&glibc_config(&dir, false), None).unwrap();
        assert_eq!(resolver.capability(), Some(CapabilityKind::DynamicallyLoaded));
        // The status file does not exist; a fallback read would fail.
        assert!(!resolver.query().unwrap());
        assert!(!resolver.query().unwrap());
        resolver.shutdown();
        assert!(resolver.is_closed());
    }

    #[test]
    fn linked_entry_point_needs_no_library_handle() {
        let dir = tempdir().unwrap();
        let resolver = open_resolver(&glibc_config(&dir, true), None).unwrap();
        assert_eq!(resolver.capability(), Some(CapabilityKind::StaticallyLinked));
        assert!(!resolver.query().unwrap());
    }

    #[test]
    fn missing_symbol_keeps_library_for_release() {
        let loader = SystemLibraryLoader::new(false);
        let err = loader
            .load("libc.so.6", "sysfips_missing_fips_query")
            .unwrap_err();
        assert_eq!(err.code(), "SF3001");
        let library = err.into_library().expect("opened library must be returned");
        assert_eq!(library.name(), "libc.so.6");
        assert!(library.close().is_ok());
    }

    #[test]
    fn missing_symbol_falls_back_and_shuts_down_cleanly() {
        let dir = tempdir().unwrap();
        let mut config = glibc_config(&dir, true);
        config.native.symbol = "sysfips_missing_fips_query".to_string();
        fs::write(config.status_path(), b"1").unwrap();

        let mut resolver = FipsResolver::new(&config);
        resolver
            .initialize(&SystemLibraryLoader::from_config(&config), None)
            .unwrap();
        assert_eq!(resolver.capability(), Some(CapabilityKind::Unavailable));
        assert!(resolver.query().unwrap());
        resolver.shutdown();
    }

    #[test]
    fn acquire_returns_dynamic_binding() {
        let loader = SystemLibraryLoader::new(false);
        let binding = acquire(&loader, "libc.so.6", "sched_yield", &Diagnostics::disabled())
            .unwrap();
        assert_eq!(unsafe { binding.entry().call() }, 0);
        match binding {
            NativeBinding::DynamicallyLoaded { library, .. } => {
                assert_eq!(library.name(), "libc.so.6");
            }
            other => panic!("expected a loaded library, got {other:?}"),
        }
    }
}

#[test]
fn acquire_reports_missing_library() {
    let loader = SystemLibraryLoader::default();
    let err = acquire(
        &loader,
        MISSING_LIBRARY,
        "sysfips_missing_fips_query",
        &Diagnostics::disabled(),
    )
    .unwrap_err();
    assert!(matches!(err, AcquisitionError::LibraryNotFound { .. }));
    assert!(err.into_library().is_none());
}
