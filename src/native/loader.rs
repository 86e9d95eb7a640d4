//! @ai:module:intent Materialize compiled artifact bytes as a loaded native module
//! @ai:module:layer infrastructure
//! @ai:module:public_api load, LoadedModule
//! @ai:module:stateless true

use crate::error::LoadError;
use crate::native::signature::EntryPointSignature;
use libloading::os::unix::{Library as UnixLibrary, RTLD_LOCAL, RTLD_NOW};
use libloading::Library;
use std::ffi::c_void;
use std::io::Write;
use std::path::{Path, PathBuf};

/// @ai:intent A live native module and its resolved entry point
///
/// The temporary file the module was loaded from is already gone; the
/// loader keeps the mapping alive until this value is dropped.
pub struct LoadedModule {
    library: Library,
    entry: *const c_void,
    signature: EntryPointSignature,
    staged_path: PathBuf,
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("symbol", &self.signature.symbol)
            .field("arity", &self.signature.arity())
            .finish_non_exhaustive()
    }
}

impl LoadedModule {
    /// @ai:intent Declared argument kinds of the entry point
    /// @ai:effects pure
    pub fn signature(&self) -> &EntryPointSignature {
        &self.signature
    }

    /// @ai:intent Where the artifact was staged while loading (no longer exists)
    /// @ai:effects pure
    pub fn staged_path(&self) -> &Path {
        &self.staged_path
    }

    /// Raw entry address; valid while `self` is alive.
    pub(crate) fn entry_ptr(&self) -> *const c_void {
        self.entry
    }

    /// @ai:intent Resolve another exported symbol's address
    /// @ai:effects pure
    pub fn symbol_address(&self, name: &str) -> Result<*const c_void, LoadError> {
        resolve(&self.library, name)
    }
}

/// @ai:intent Write `bytes` to a uniquely named temporary file, open it as a
///            shared library, and delete the file whether or not opening succeeded
/// @ai:pre bytes are a shared library for the host architecture
/// @ai:post no temporary file remains on disk
/// @ai:effects fs:write, fs:delete, dlopen
pub fn load(bytes: &[u8], signature: EntryPointSignature) -> Result<LoadedModule, LoadError> {
    let mut file = tempfile::Builder::new()
        .prefix("kernel-judge-")
        .suffix(".so")
        .tempfile()?;
    file.write_all(bytes)?;
    file.flush()?;

    let staged = file.into_temp_path();
    let path = staged.to_path_buf();

    // Safety: running library constructors is the point of loading a submission;
    // isolation is provided by the sandboxed worker, not here.
    let opened = unsafe { UnixLibrary::open(Some(path.as_os_str()), RTLD_NOW | RTLD_LOCAL) };
    let removed = staged.close();

    let library: Library = opened
        .map_err(|e| LoadError::Open {
            path: path.clone(),
            reason: e.to_string(),
        })?
        .into();
    removed?;

    let entry = resolve(&library, &signature.symbol)?;
    tracing::debug!("Loaded entry point '{}' from {} bytes", signature.symbol, bytes.len());

    Ok(LoadedModule {
        library,
        entry,
        signature,
        staged_path: path,
    })
}

fn resolve(library: &Library, name: &str) -> Result<*const c_void, LoadError> {
    // Safety: the symbol is only converted to an address here; calling it goes
    // through the argument adapter, which owns the signature contract.
    let symbol = unsafe { library.get::<unsafe extern "C" fn()>(name.as_bytes()) }.map_err(|_| {
        LoadError::SymbolNotFound {
            symbol: name.to_string(),
        }
    })?;

    Ok(*symbol as *const c_void)
}
