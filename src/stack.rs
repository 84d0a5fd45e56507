//! Stack growth for the recursive evaluator.
//!
//! Deeply nested scripts recurse through `evaluate` and `execute_statement`
//! far faster than the call-depth limit is reached, so both entry points run
//! their bodies through [`ensure_sufficient_stack`].

/// Runs `f`, growing the native stack first when less than the red zone
/// remains.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    /// Minimum stack space to keep available (100KB red zone).
    const RED_ZONE: usize = 100 * 1024;

    /// Stack space to allocate when growing (1MB).
    const STACK_PER_RECURSION: usize = 1024 * 1024;

    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
