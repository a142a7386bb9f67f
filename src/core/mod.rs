//! Mutations and the hook pipeline that executes them.

/// Conditional hooks and condition combinators.
pub mod cond;
/// Hook trait, chains, and the executor.
pub mod hook;
/// Query interceptors and the read executor.
pub mod intercept;
/// The pending-change record.
pub mod mutation;
