//! System-backed native loader for the sysfips resolver. `loader` talks to
//! the platform dynamic linker through `libloading`.

mod loader;

pub use loader::{open_resolver, SystemLibraryLoader};
