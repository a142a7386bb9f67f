//! Conditional hooks.

use std::sync::Arc;

use crate::{
    context::Context,
    entity::Outcome,
    error::{Error, Result},
    op::Op,
};

use super::{
    hook::{Hook, Next},
    mutation::Mutation,
};

/// Predicate over a pending mutation.
pub type Condition = Arc<dyn Fn(&Context, &Mutation) -> bool + Send + Sync>;

/// Wraps a closure as a [`Condition`].
pub fn condition(f: impl Fn(&Context, &Mutation) -> bool + Send + Sync + 'static) -> Condition {
    Arc::new(f)
}

/// True when every condition holds. Empty input is true.
pub fn and(conds: impl IntoIterator<Item = Condition>) -> Condition {
    let conds: Vec<Condition> = conds.into_iter().collect();
    Arc::new(move |ctx, m| conds.iter().all(|c| c(ctx, m)))
}

/// True when any condition holds. Empty input is false.
pub fn or(conds: impl IntoIterator<Item = Condition>) -> Condition {
    let conds: Vec<Condition> = conds.into_iter().collect();
    Arc::new(move |ctx, m| conds.iter().any(|c| c(ctx, m)))
}

/// Negates `cond`.
pub fn not(cond: Condition) -> Condition {
    Arc::new(move |ctx, m| !cond(ctx, m))
}

/// Matches mutations whose op is in `op`.
pub fn has_op(op: Op) -> Condition {
    Arc::new(move |_, m| m.op().is(op))
}

/// Matches mutations of one entity type.
pub fn has_entity(name: impl Into<String>) -> Condition {
    let name = name.into();
    Arc::new(move |_, m| m.entity() == name)
}

/// Matches mutations that assign every named field.
pub fn has_fields(fields: &[&str]) -> Condition {
    let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
    Arc::new(move |_, m| fields.iter().all(|f| m.field(f).is_some()))
}

/// Matches mutations that clear every named field.
pub fn has_cleared_fields(fields: &[&str]) -> Condition {
    let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
    Arc::new(move |_, m| fields.iter().all(|f| m.field_cleared(f)))
}

/// Matches mutations that append to every named field.
pub fn has_appended_fields(fields: &[&str]) -> Condition {
    let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
    Arc::new(move |_, m| fields.iter().all(|f| m.appended(f).is_some()))
}

/// Runs the wrapped hook only when its condition holds; otherwise passes
/// straight through to `next`.
pub struct If {
    hook: Arc<dyn Hook>,
    cond: Condition,
}

impl Hook for If {
    fn mutate(&self, ctx: &Context, m: &mut Mutation, next: Next<'_>) -> Result<Outcome> {
        if (self.cond)(ctx, m) {
            self.hook.mutate(ctx, m, next)
        } else {
            next.run(ctx, m)
        }
    }
}

/// Runs `hook` only when `cond` holds.
pub fn when(hook: impl Hook + 'static, cond: Condition) -> If {
    If {
        hook: Arc::new(hook),
        cond,
    }
}

/// Runs `hook` only for the given operations.
pub fn on(hook: impl Hook + 'static, op: Op) -> If {
    when(hook, has_op(op))
}

/// Runs `hook` for every operation except the given ones.
pub fn unless(hook: impl Hook + 'static, op: Op) -> If {
    when(hook, not(has_op(op)))
}

/// Fails every mutation it sees without calling `next`.
#[derive(Debug, Clone)]
pub struct FixedError(String);

impl Hook for FixedError {
    fn mutate(&self, _ctx: &Context, _m: &mut Mutation, _next: Next<'_>) -> Result<Outcome> {
        Err(Error::Rejected(self.0.clone()))
    }
}

/// A hook failing with `message`.
pub fn fixed_error(message: impl Into<String>) -> FixedError {
    FixedError(message.into())
}

/// Refuses the given operations.
pub fn reject(op: Op) -> If {
    on(fixed_error(format!("{op} operation is not allowed")), op)
}
