use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Externally owned stop signal, checked by the executor before each node.
///
/// Clones share the same flag, so the caller keeps one handle and passes
/// another to `CompiledGraph::run`.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
