//! Re-inplacing pass context and entry point.
//!
//! When re-inplacing many graphs in a batch, it is useful to avoid reallocating the symbolic
//! executor's storage-id counter and the pass configuration for every call. `PassContext` is used
//! to hold on to that state between invocations, the same way cranelift's `Context` holds
//! allocations between function compilations.

use crate::fake_tensor::{FakeTensorExecutor, Shape};
use crate::ir::Graph;
use crate::pass::alias::AliasIndex;
use crate::pass::{dead_scatter, metadata, rewrite};

/// Knobs left as implementation choices, analogous to a cranelift `Flags`/`OptLevel` surface.
/// None of these change pass *semantics* — they only affect observability.
#[derive(Debug, Clone, Copy)]
pub struct ReinplaceConfig {
    /// Whether the rewriter emits a `log::trace!` for every candidate it classifies, including
    /// ones it skips. Defaults to whether the `trace-log` feature is enabled, so a caller gets
    /// the granular trace without needing to touch build flags, but can still suppress it at
    /// runtime in a hot loop.
    pub trace_candidates: bool,
}

impl Default for ReinplaceConfig {
    fn default() -> Self {
        ReinplaceConfig { trace_candidates: cfg!(feature = "trace-log") }
    }
}

/// What one `reinplace` call accomplished.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReinplaceStats {
    /// Number of `call_function` sites retargeted to their in-place sibling.
    pub rewritten: usize,
    /// Number of `{view}_scatter` nodes proven dead and erased.
    pub erased: usize,
}

/// Persistent state for repeated re-inplacing runs.
///
/// The returned instance should be reused across multiple graphs in order to avoid needless
/// allocator thrashing in the symbolic executor's storage-id counter.
pub struct PassContext {
    /// Pass configuration, see [`ReinplaceConfig`].
    pub config: ReinplaceConfig,
    exec: FakeTensorExecutor,
}

impl Default for PassContext {
    fn default() -> Self {
        Self::new()
    }
}

impl PassContext {
    /// Allocates a new pass context with the default configuration.
    pub fn new() -> Self {
        PassContext { config: ReinplaceConfig::default(), exec: FakeTensorExecutor::new() }
    }

    /// Allocates a new pass context with an explicit configuration.
    pub fn with_config(config: ReinplaceConfig) -> Self {
        PassContext { config, exec: FakeTensorExecutor::new() }
    }

    /// Clears the context's symbolic-executor state, e.g. between unrelated graphs whose storage
    /// identities should not be compared against each other.
    pub fn clear(&mut self) {
        self.exec = FakeTensorExecutor::new();
    }

    /// Runs the re-inplacing pass over `graph`, consuming `sample_shapes` (one concrete shape per
    /// `placeholder` node, in program order) to drive `MetadataProp`'s symbolic execution.
    ///
    /// Mutates `graph` and returns a [`ReinplaceStats`] summarizing what changed: retargeted
    /// nodes, erased scatters, and rewired downstream args are all side effects on `graph` itself.
    pub fn reinplace(&mut self, graph: &mut Graph, sample_shapes: &[Shape]) -> ReinplaceStats {
        metadata::run(graph, &mut self.exec, sample_shapes);

        let mut alias = AliasIndex::build(graph);
        let outcome = rewrite::run(graph, &mut alias, &mut self.exec, &self.config);

        let erased = dead_scatter::sweep(graph, &outcome.dead_scatter);

        ReinplaceStats { rewritten: outcome.rewritten, erased }
    }
}

/// Runs the re-inplacing pass over `graph` with a fresh, default-configured [`PassContext`].
///
/// Prefer [`PassContext::reinplace`] directly when re-inplacing many graphs in sequence, so the
/// executor's allocations are reused instead of rebuilt per call.
pub fn reinplace(graph: &mut Graph, sample_shapes: &[Shape]) -> ReinplaceStats {
    PassContext::new().reinplace(graph, sample_shapes)
}
