//! State tables, action rules and the state machine a workflow declares
//!
//! A workflow describes its behaviour as data:
//!
//! - [`WorkflowState`]: per-state `{action -> target, guard, tag, handler}`
//! - [`GlobalState`]: actions legal in every state
//! - [`ActionMap`]: plain named handlers on the workflow itself
//! - [`StateMachine`]: the above plus the initial state
//!
//! Actions resolve against the global table first, then the current state,
//! then the action map.

mod machine;
mod rule;
mod table;

pub use machine::{StateBehavior, StateMachine};
pub(crate) use rule::ActionHandler;
pub use rule::{ActionContext, ActionRule, Condition, StateHook};
pub use table::{ActionMap, GlobalState, WorkflowState};
