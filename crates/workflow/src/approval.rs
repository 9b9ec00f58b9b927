//! A ready-made approval workflow
//!
//! ```text
//! Open --Assign--> Assigned --Approve--> Approved --Accept--> Accepted (exit)
//!                  |  ^   \--Reject---> Rejected --Accept--/
//!                  \--/ Reassign
//! ```

use serde::{Deserialize, Serialize};

use crate::argument::Value;
use crate::error::Result;
use crate::state::{ActionContext, StateMachine};
use crate::workflow::{ArgumentSlot, Workflow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApprovalState {
    Open,
    Assigned,
    Approved,
    Rejected,
    Accepted,
}

/// Assign, approve or reject, then accept
///
/// Arguments:
/// - `AssignedTo`: set from the `AssignTo` action argument of Assign/Reassign
/// - `IsApproved`: set by Approve and Reject
/// - `AcceptedBy`: set from the `AcceptedBy` action argument of Accept
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ApprovalWorkflow;

fn on_assigned(ctx: &ActionContext<ApprovalState>) -> Result<()> {
    let assignee: String = ctx.value("AssignTo")?;
    ctx.instance().set_argument("AssignedTo", assignee);
    Ok(())
}

fn on_accepted(ctx: &ActionContext<ApprovalState>) -> Result<()> {
    let accepted_by: Value = ctx.value("AcceptedBy")?;
    ctx.instance().set_argument("AcceptedBy", accepted_by);
    Ok(())
}

impl Workflow for ApprovalWorkflow {
    type State = ApprovalState;

    fn workflow_type(&self) -> &str {
        "Approval"
    }

    fn arguments(&self) -> Vec<ArgumentSlot> {
        ["IsApproved", "AssignedTo", "AcceptedBy"]
            .into_iter()
            .map(ArgumentSlot::declared)
            .collect()
    }

    fn configure_states(&self, machine: &mut StateMachine<ApprovalState>) -> Result<()> {
        use ApprovalState::*;

        machine.set_initial_state(Open);

        machine
            .state(Open)
            .allow_with_handler("Assign", Assigned, on_assigned)?;

        machine
            .state(Assigned)
            .allow_with_handler("Reassign", Assigned, on_assigned)?
            .allow_with_handler("Approve", Approved, |ctx| {
                ctx.instance().set_argument("IsApproved", true);
                Ok(())
            })?
            .allow_with_handler("Reject", Rejected, |ctx| {
                ctx.instance().set_argument("IsApproved", false);
                Ok(())
            })?;

        machine
            .state(Approved)
            .allow_with_handler("Accept", Accepted, on_accepted)?;
        machine
            .state(Rejected)
            .allow_with_handler("Accept", Accepted, on_accepted)?;

        machine.state(Accepted).set_exit_state();
        Ok(())
    }
}
