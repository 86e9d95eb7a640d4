//! @ai:module:intent Content-addressed, bounded cache of compiled artifacts
//! @ai:module:layer application
//! @ai:module:public_api ArtifactCache, CompileKey, CachedArtifact
//! @ai:module:stateless false

use crate::compile::diagnostics::CompileDiagnostics;
use crate::compile::target::GpuTarget;
use crate::compile::toolchain::Toolchain;
use crate::error::CompileError;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Each binary is around 1 MB, so this keeps the cache near 512 MB.
pub const DEFAULT_CAPACITY: usize = 512;

/// Name of the source file inside the private build directory.
const SOURCE_FILE_NAME: &str = "solution.cu";

/// @ai:intent What the cache remembers for a key: the binary, or the diagnostics of a failed compile
pub type CachedArtifact = Result<Arc<[u8]>, Arc<CompileDiagnostics>>;

/// @ai:intent Exact-match cache key; no whitespace or path normalization
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompileKey {
    pub target: GpuTarget,
    pub source: Arc<str>,
    pub output_name: Arc<str>,
}

impl CompileKey {
    /// @ai:intent Build a key for a supported target
    /// @ai:effects pure
    pub fn new(target: GpuTarget, source: &str, output_name: &str) -> Self {
        Self {
            target,
            source: Arc::from(source),
            output_name: Arc::from(output_name),
        }
    }
}

/// Result of one build, shared with every caller waiting on the same key.
/// Toolchain/IO failures and timeouts are handed to waiters but never cached.
type BuildOutcome = Result<CachedArtifact, CompileError>;

/// A build in progress; waiters block on it until it publishes or their own deadline passes.
#[derive(Default)]
struct InFlight {
    outcome: Mutex<Option<BuildOutcome>>,
    ready: Condvar,
}

impl InFlight {
    fn publish(&self, outcome: BuildOutcome) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
        self.ready.notify_all();
    }

    /// None when `timeout` passes before the build publishes.
    fn wait(&self, timeout: Duration) -> Option<BuildOutcome> {
        let outcome = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        let (outcome, _) = self
            .ready
            .wait_timeout_while(outcome, timeout, |outcome| outcome.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        outcome.clone()
    }
}

struct CacheState {
    entries: LruCache<CompileKey, CachedArtifact>,
    in_flight: HashMap<CompileKey, Arc<InFlight>>,
}

/// @ai:intent Deduplicates compilation by (device, source, output name) and
///            keeps at most `capacity` results, evicting least-recently-used first
/// @ai:invariant A key maps to at most one artifact; a second request for a key
///               that is compiling waits for that compile instead of starting another
pub struct ArtifactCache {
    toolchain: Arc<dyn Toolchain>,
    state: Mutex<CacheState>,
}

impl ArtifactCache {
    /// @ai:intent Create a cache in front of a toolchain
    /// @ai:effects pure
    pub fn new(toolchain: Arc<dyn Toolchain>, capacity: NonZeroUsize) -> Self {
        Self {
            toolchain,
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                in_flight: HashMap::new(),
            }),
        }
    }

    /// @ai:intent Compile `source` for `device`, reusing any cached result for the same key
    /// @ai:pre device is one of the supported device names
    /// @ai:post the same inputs return the same bytes or the same diagnostics until evicted
    /// @ai:post returns `CompileError::TimedOut` once `timeout` passes, whether this call
    ///          runs the compiler or waits on another caller's build
    /// @ai:effects fs:write (temporary), io, state:write
    pub fn compile(
        &self,
        device: &str,
        source: &str,
        output_name: &str,
        timeout: Duration,
    ) -> Result<Arc<[u8]>, CompileError> {
        let target = GpuTarget::from_name(device)?;
        let key = CompileKey::new(target, source, output_name);

        let (cell, builder) = {
            let mut state = self.lock();

            if let Some(cached) = state.entries.get(&key) {
                tracing::debug!("Artifact cache hit for {} ({})", output_name, target);
                return cached.clone().map_err(CompileError::Failed);
            }

            match state.in_flight.get(&key) {
                Some(cell) => (Arc::clone(cell), false),
                None => {
                    let cell = Arc::new(InFlight::default());
                    state.in_flight.insert(key.clone(), Arc::clone(&cell));
                    (cell, true)
                }
            }
        };

        let outcome = if builder {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                self.build(target, source, output_name, timeout)
            }))
            .unwrap_or_else(|_| Err(CompileError::Io("compiler invocation panicked".to_string())));

            self.settle(&key, &cell, &outcome);
            cell.publish(outcome.clone());
            outcome
        } else {
            match cell.wait(timeout) {
                Some(outcome) => outcome,
                None => {
                    tracing::debug!("Gave up waiting for {} ({}) after {:?}", output_name, target, timeout);
                    return Err(CompileError::TimedOut(timeout));
                }
            }
        };

        outcome?.map_err(CompileError::Failed)
    }

    /// Record a finished build: drop the in-flight marker and cache compiler verdicts.
    fn settle(&self, key: &CompileKey, cell: &Arc<InFlight>, outcome: &BuildOutcome) {
        let mut state = self.lock();

        if state
            .in_flight
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, cell))
        {
            state.in_flight.remove(key);
        }

        if let Ok(artifact) = outcome {
            if let Some((evicted, _)) = state.entries.push(key.clone(), artifact.clone()) {
                if &evicted != key {
                    tracing::debug!(
                        "Evicted artifact {} ({}) from cache",
                        evicted.output_name,
                        evicted.target
                    );
                }
            }
        }
    }

    /// @ai:intent Whether a result for these inputs is currently cached
    /// @ai:effects pure
    pub fn contains(&self, device: &str, source: &str, output_name: &str) -> bool {
        GpuTarget::from_name(device)
            .map(|target| {
                self.lock()
                    .entries
                    .contains(&CompileKey::new(target, source, output_name))
            })
            .unwrap_or(false)
    }

    /// @ai:intent Number of cached results (successes and failures)
    /// @ai:effects pure
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// @ai:intent Whether nothing is cached
    /// @ai:effects pure
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// @ai:intent Maximum number of cached results
    /// @ai:effects pure
    pub fn capacity(&self) -> usize {
        self.lock().entries.cap().get()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// @ai:intent Run the toolchain in a private build directory, removed on every path
    /// @ai:effects fs:write, io
    fn build(&self, target: GpuTarget, source: &str, output_name: &str, timeout: Duration) -> BuildOutcome {
        tracing::info!("Compiling {} for {}", output_name, target);

        let build_dir = tempfile::Builder::new()
            .prefix("kernel-judge-build-")
            .tempdir()
            .map_err(|e| CompileError::Io(e.to_string()))?;

        let source_path = build_dir.path().join(SOURCE_FILE_NAME);
        std::fs::write(&source_path, source).map_err(|e| CompileError::Io(e.to_string()))?;

        let output_path = build_dir
            .path()
            .join(format!("lib{}.so", sanitize_file_stem(output_name)));

        let output = self
            .toolchain
            .compile(target, &[source_path.as_path()], &output_path, timeout)?;

        if !output.success {
            // temp paths differ per build; strip them so diagnostics depend only on the source
            let prefix = format!("{}/", build_dir.path().display());
            let mut stderr = output.stderr.replace(&prefix, "");
            if stderr.trim().is_empty() {
                stderr = "compiler exited unsuccessfully without diagnostics".to_string();
            }
            let diagnostics = CompileDiagnostics::from_stderr(&stderr);

            tracing::warn!(
                "Compilation of {} for {} failed: {}",
                output_name,
                target,
                diagnostics.summary()
            );
            return Ok(Err(Arc::new(diagnostics)));
        }

        let bytes = std::fs::read(&output_path).map_err(|e| CompileError::Io(e.to_string()))?;
        tracing::debug!("Compiled {} ({} bytes)", output_name, bytes.len());

        Ok(Ok(Arc::from(bytes)))
    }
}

/// @ai:intent Keep output names from escaping the build directory
/// @ai:effects pure
fn sanitize_file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if stem.is_empty() {
        "solution".to_string()
    } else {
        stem
    }
}
