//! Composite control-flow workflows
//!
//! Building blocks that orchestrate child workflows:
//! - [`Sequential`] runs one async activity against its instance
//! - [`Parallel`] fans children out and joins them
//! - [`IfElse`] enters the first matching branch, or every else branch
//! - [`While`] re-enters a body while a condition holds
//! - [`Delay`], [`DelayUntil`] and [`DelayUntilCondition`] wait, then
//!   optionally enter a follow-up
//! - [`Empty`] does nothing
//!
//! Composites are bypassed when reloading from a store; the parent that
//! created them recreates them. Conditions see the composite instance's
//! arguments, which share their cells with the parent's.

mod branch;
mod delay;
mod empty;
mod parallel;
mod sequential;
mod while_loop;

pub use branch::IfElse;
pub use delay::{Delay, DelayUntil, DelayUntilCondition};
pub use empty::Empty;
pub use parallel::Parallel;
pub use sequential::{Activity, Sequential};
pub use while_loop::While;
