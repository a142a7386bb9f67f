//! The hook pipeline.
//!
//! A hook wraps the rest of the pipeline: it may inspect or edit the mutation,
//! call [`Next::run`] at most once, and inspect or replace the outcome. Hooks
//! listed first run outermost, so for `[A, B]` around core `C` the order is
//! A-before, B-before, C, B-after, A-after.

use std::{fmt, sync::Arc};

use crate::{
    context::Context,
    entity::Outcome,
    error::{Error, Result},
};

use super::mutation::Mutation;

/// Middleware around the core executor.
pub trait Hook: Send + Sync {
    /// Runs this hook. Skipping `next` short-circuits everything inside it,
    /// including the storage write.
    fn mutate(&self, ctx: &Context, m: &mut Mutation, next: Next<'_>) -> Result<Outcome>;
}

impl<H: Hook + ?Sized> Hook for Arc<H> {
    fn mutate(&self, ctx: &Context, m: &mut Mutation, next: Next<'_>) -> Result<Outcome> {
        (**self).mutate(ctx, m, next)
    }
}

/// The remainder of the pipeline below the current hook.
///
/// Consumed by [`run`](Self::run), so a hook cannot invoke it twice.
pub struct Next<'a> {
    hooks: &'a [Arc<dyn Hook>],
    core: &'a mut (dyn FnMut(&Context, &mut Mutation) -> Result<Outcome> + 'a),
}

impl<'a> Next<'a> {
    /// Wraps `hooks` around `core`.
    pub fn new(
        hooks: &'a [Arc<dyn Hook>],
        core: &'a mut (dyn FnMut(&Context, &mut Mutation) -> Result<Outcome> + 'a),
    ) -> Self {
        Self { hooks, core }
    }

    /// Runs the next hook, or the core when no hooks remain.
    pub fn run(self, ctx: &Context, m: &mut Mutation) -> Result<Outcome> {
        match self.hooks.split_first() {
            Some((hook, rest)) => hook.mutate(
                ctx,
                m,
                Next {
                    hooks: rest,
                    core: self.core,
                },
            ),
            None => (self.core)(ctx, m),
        }
    }

    /// Hooks still to run before the core.
    pub fn remaining(&self) -> usize {
        self.hooks.len()
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.hooks.len())
            .finish()
    }
}

/// Adapts a closure into a [`Hook`].
pub struct HookFn<F>(F);

/// Builds a hook from a closure with the [`Hook::mutate`] signature.
pub fn hook_fn<F>(f: F) -> HookFn<F>
where
    F: Fn(&Context, &mut Mutation, Next<'_>) -> Result<Outcome> + Send + Sync,
{
    HookFn(f)
}

impl<F> Hook for HookFn<F>
where
    F: Fn(&Context, &mut Mutation, Next<'_>) -> Result<Outcome> + Send + Sync,
{
    fn mutate(&self, ctx: &Context, m: &mut Mutation, next: Next<'_>) -> Result<Outcome> {
        (self.0)(ctx, m, next)
    }
}

/// An ordered, immutable list of hooks that itself acts as one hook.
#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Arc<[Arc<dyn Hook>]>,
}

impl HookChain {
    /// A chain running `hooks` in order.
    pub fn new(hooks: impl IntoIterator<Item = Arc<dyn Hook>>) -> Self {
        Self {
            hooks: hooks.into_iter().collect(),
        }
    }

    /// Returns a new chain with `hooks` after the current ones.
    pub fn append(&self, hooks: impl IntoIterator<Item = Arc<dyn Hook>>) -> Self {
        Self {
            hooks: self.hooks.iter().cloned().chain(hooks).collect(),
        }
    }

    /// Returns a new chain running `self` outside `other`.
    pub fn extend(&self, other: &HookChain) -> Self {
        self.append(other.hooks.iter().cloned())
    }

    /// The hooks, outermost first.
    pub fn hooks(&self) -> &[Arc<dyn Hook>] {
        &self.hooks
    }

    /// Number of hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// True when the chain has no hooks.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl fmt::Debug for HookChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookChain")
            .field("len", &self.hooks.len())
            .finish()
    }
}

impl Hook for HookChain {
    fn mutate(&self, ctx: &Context, m: &mut Mutation, next: Next<'_>) -> Result<Outcome> {
        let mut next = Some(next);
        let mut tail = |ctx: &Context, m: &mut Mutation| match next.take() {
            Some(next) => next.run(ctx, m),
            None => Err(Error::AlreadyExecuted),
        };
        Next::new(&self.hooks, &mut tail).run(ctx, m)
    }
}

/// Runs `m` through `hooks` and then `core`.
///
/// Rejects a mutation that already completed. The mutation is marked done
/// only when `core` succeeds; hooks see the core's result unchanged.
pub fn execute<F>(ctx: &Context, m: &mut Mutation, hooks: &[Arc<dyn Hook>], core: F) -> Result<Outcome>
where
    F: FnMut(&Context, &mut Mutation) -> Result<Outcome>,
{
    if m.is_done() {
        return Err(Error::AlreadyExecuted);
    }
    tracing::debug!(
        entity = m.entity(),
        op = %m.op(),
        hooks = hooks.len(),
        "executing mutation"
    );

    let mut core = core;
    let mut guarded = |ctx: &Context, m: &mut Mutation| {
        if m.is_done() {
            return Err(Error::AlreadyExecuted);
        }
        let outcome = core(ctx, m)?;
        m.mark_done();
        Ok(outcome)
    };
    Next::new(hooks, &mut guarded).run(ctx, m)
}
