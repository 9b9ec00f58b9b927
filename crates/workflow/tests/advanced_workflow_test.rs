//! Integration tests for multi-step business workflows and engine services
//!
//! Run with: cargo test -p everruns-workflow --test advanced_workflow_test

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use everruns_workflow::prelude::*;
use everruns_workflow::RegistryError;

// ============================================
// Vendor assignment with escalation
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
enum VendorState {
    Recommended,
    RecommendationApproved,
    RecommendationRejected,
    AwaitingConfirmation,
    AssignmentConfirmed,
}

/// Escalation timeout that disables escalation
const NO_ESCALATION: i64 = i32::MAX as i64;

struct AssignVendor;

async fn contact_for_assignment(ctx: ActionContext<VendorState>) -> Result<()> {
    let timeout_ms: i64 = ctx.instance().argument_value("EscalationTimeout")?;
    if timeout_ms == NO_ESCALATION {
        return Ok(());
    }

    let deadline = Utc::now() + chrono::Duration::milliseconds(timeout_ms);
    let escalation =
        DelayUntilCondition::new(|args| args.value::<bool>("IsBooked").unwrap_or(false))
            .escalate_at(deadline)
            .break_on_condition(true)
            .period(Duration::from_millis(10))
            .then(Sequential::new(|instance| async move {
                instance.set_argument("HasEscalated", true);
                Ok(())
            }));
    ctx.instance().spawn_workflow(escalation, Vec::new())?;
    Ok(())
}

#[async_trait]
impl Workflow for AssignVendor {
    type State = VendorState;

    fn arguments(&self) -> Vec<ArgumentSlot> {
        [
            "VendorName",
            "IsBooked",
            "HasEscalated",
            "EscalationTimeout",
            "FinishedRunning",
        ]
        .into_iter()
        .map(ArgumentSlot::declared)
        .collect()
    }

    fn configure_states(&self, machine: &mut StateMachine<VendorState>) -> Result<()> {
        use VendorState::*;

        machine.set_initial_state(Recommended);

        machine
            .state(Recommended)
            .allow("Approve Recommendation", RecommendationApproved)?
            .allow("Reject Recommendation", RecommendationRejected)?;

        machine.state(RecommendationApproved).allow_with_async_handler(
            "Contact For Assignment",
            AwaitingConfirmation,
            contact_for_assignment,
        )?;

        machine.state(RecommendationRejected).set_exit_state();

        machine
            .state(AwaitingConfirmation)
            .allow_with_handler("Confirm Assignment", AssignmentConfirmed, |ctx| {
                let vendor: String = ctx.instance().argument_value("VendorName")?;
                Ok(format!("Vendor {vendor} confirmed assignment"))
            })?
            .allow_with_handler("Reject Assignment", RecommendationRejected, |ctx| {
                let vendor: String = ctx.instance().argument_value("VendorName")?;
                Ok(format!("Vendor {vendor} rejected assignment"))
            })?;

        machine.state(AssignmentConfirmed).set_exit_state();
        Ok(())
    }

    async fn execute(&self, instance: &WorkflowInstance<VendorState>) -> Result<()> {
        if instance.argument_value::<i64>("EscalationTimeout")? == 0 {
            instance.set_argument("EscalationTimeout", 5000);
        }

        instance.await_action(true).await?;

        if instance.current_state() == Some(VendorState::AssignmentConfirmed) {
            instance.set_argument("IsBooked", true);
        }
        instance.set_argument("FinishedRunning", true);
        Ok(())
    }
}

#[tokio::test]
async fn test_assign_vendor_confirmed() {
    let engine = WorkflowEngine::new();
    let instance = engine.create_workflow(AssignVendor);
    instance
        .start(vec![
            Argument::new("VendorName", "John Smith"),
            Argument::new("EscalationTimeout", NO_ESCALATION),
        ])
        .await
        .expect("should start");

    instance.action("Approve Recommendation").await.unwrap();
    instance.action("Contact For Assignment").await.unwrap();
    let result = instance.action("Confirm Assignment").await.unwrap();
    assert_eq!(
        result.get::<String>().unwrap(),
        "Vendor John Smith confirmed assignment"
    );

    instance.wait().await.unwrap();
    assert_eq!(
        instance.current_state(),
        Some(VendorState::AssignmentConfirmed)
    );
    assert!(instance.argument_value::<bool>("IsBooked").unwrap());
    assert!(!instance.argument_value::<bool>("HasEscalated").unwrap());
    assert!(instance.argument_value::<bool>("FinishedRunning").unwrap());
}

#[tokio::test]
async fn test_assign_vendor_escalation() {
    let engine = WorkflowEngine::new();
    let instance = engine.create_workflow(AssignVendor);
    instance
        .start(vec![
            Argument::new("VendorName", "John Smith"),
            Argument::new("EscalationTimeout", 200),
        ])
        .await
        .unwrap();

    instance.action("Approve Recommendation").await.unwrap();
    instance.action("Contact For Assignment").await.unwrap();

    // Poll until the escalation child flips HasEscalated
    let poll = While::activity(
        |args| !args.value::<bool>("HasEscalated").unwrap_or(false),
        |_| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(())
        },
    );
    tokio::time::timeout(
        Duration::from_secs(5),
        instance.enter_workflow(poll, Vec::new()),
    )
    .await
    .expect("escalation should fire")
    .unwrap();

    // Escalation does not end the workflow by itself
    assert!(!instance.is_complete());
    instance.trigger_exit_state();
    instance.wait().await.unwrap();

    assert_eq!(
        instance.current_state(),
        Some(VendorState::AwaitingConfirmation)
    );
    assert!(!instance.argument_value::<bool>("IsBooked").unwrap());
    assert!(instance.argument_value::<bool>("HasEscalated").unwrap());
    assert!(instance.argument_value::<bool>("FinishedRunning").unwrap());
}

// ============================================
// Printer: per-state behaviors with auto-advance
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
enum PrinterState {
    Offline,
    Ready,
    PrintStart,
    Printing,
    PrintEnd,
}

struct PrinterOffline;

impl StateBehavior<PrinterState> for PrinterOffline {
    fn configure(&self, state: &mut WorkflowState<PrinterState>) -> Result<()> {
        state.allow("Turn On", PrinterState::Ready)?;
        Ok(())
    }
}

struct PrinterReady;

impl StateBehavior<PrinterState> for PrinterReady {
    fn configure(&self, state: &mut WorkflowState<PrinterState>) -> Result<()> {
        state.allow("Print", PrinterState::PrintStart)?;
        Ok(())
    }
}

struct PrinterPrintStart;

impl StateBehavior<PrinterState> for PrinterPrintStart {
    fn on_enter(&self, instance: &WorkflowInstance<PrinterState>) -> Result<()> {
        instance.set_state(PrinterState::Printing)
    }
}

struct PrinterPrinting;

impl StateBehavior<PrinterState> for PrinterPrinting {
    fn configure(&self, state: &mut WorkflowState<PrinterState>) -> Result<()> {
        state.allow("Done", PrinterState::PrintEnd)?;
        Ok(())
    }

    fn on_enter(&self, instance: &WorkflowInstance<PrinterState>) -> Result<()> {
        let printer = instance.handle()?;
        let finish = Sequential::new(move |_| {
            let printer = printer.clone();
            async move {
                printer.action("Done").await?;
                Ok(())
            }
        });
        instance.spawn_workflow(Delay::new(Duration::from_millis(50)).then(finish), Vec::new())?;
        Ok(())
    }
}

struct PrinterPrintEnd;

impl StateBehavior<PrinterState> for PrinterPrintEnd {
    fn configure(&self, state: &mut WorkflowState<PrinterState>) -> Result<()> {
        state.set_exit_state();
        Ok(())
    }
}

struct Printer;

impl Workflow for Printer {
    type State = PrinterState;

    fn configure_states(&self, machine: &mut StateMachine<PrinterState>) -> Result<()> {
        machine.set_initial_state(PrinterState::Offline);
        machine.state_with(PrinterState::Offline, PrinterOffline)?;
        machine.state_with(PrinterState::Ready, PrinterReady)?;
        machine.state_with(PrinterState::PrintStart, PrinterPrintStart)?;
        machine.state_with(PrinterState::Printing, PrinterPrinting)?;
        machine.state_with(PrinterState::PrintEnd, PrinterPrintEnd)?;
        Ok(())
    }
}

#[tokio::test]
async fn test_printer_workflow() {
    let engine = WorkflowEngine::new();
    let instance = engine.create_workflow(Printer);
    instance.start(Vec::new()).await.unwrap();

    instance.action("Turn On").await.unwrap();
    instance.action("Print").await.unwrap();
    // PrintStart advances straight to Printing
    assert_eq!(instance.current_state(), Some(PrinterState::Printing));
    assert_eq!(instance.last_state(), Some(PrinterState::PrintStart));

    tokio::time::timeout(Duration::from_secs(5), instance.wait())
        .await
        .expect("printing child should finish the job")
        .unwrap();

    assert_eq!(instance.current_state(), Some(PrinterState::PrintEnd));
    assert!(!instance.is_in_error());
}

// ============================================
// Failures
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
enum Stage {
    Idle,
    Done,
}

struct Faulty;

impl Workflow for Faulty {
    type State = Stage;

    fn configure_states(&self, machine: &mut StateMachine<Stage>) -> Result<()> {
        machine.set_initial_state(Stage::Idle);
        machine
            .state(Stage::Idle)
            .allow("Finish", Stage::Done)?
            .allow_with_handler("Explode", Stage::Idle, |_| -> Result<()> {
                Err(WorkflowError::execution("printer on fire"))
            })?;
        machine.state(Stage::Done).set_exit_state();
        Ok(())
    }
}

#[tokio::test]
async fn test_handler_failure_moves_instance_to_error() {
    let engine = WorkflowEngine::new();
    let mut events = engine.subscribe();
    let instance = engine.create_workflow(Faulty);
    instance.start(Vec::new()).await.unwrap();

    let err = instance.action("Explode").await.unwrap_err();
    assert!(err.to_string().contains("printer on fire"));
    assert!(!err.is_contract_violation());

    instance.wait().await.unwrap();
    assert!(instance.is_complete());
    assert!(instance.is_in_error());
    assert!(!instance.is_cancelled());
    assert!(instance
        .error()
        .expect("error should be recorded")
        .contains("printer on fire"));

    let started = events.recv().await.unwrap();
    assert_eq!(started.event, StoreEvent::Start);
    let failed = events.recv().await.unwrap();
    assert_eq!(failed.workflow_id, instance.id());
    assert_eq!(failed.event, StoreEvent::Error);
    assert!(failed.is_terminal());
    assert!(failed.error.is_some());
}

#[tokio::test]
async fn test_body_failure_moves_instance_to_error() {
    let engine = WorkflowEngine::new();
    let instance = engine.create_workflow(Sequential::new(|_| async {
        Err(WorkflowError::execution("disk full"))
    }));
    instance.start(Vec::new()).await.unwrap();
    instance.wait().await.unwrap();

    assert!(instance.is_in_error());
    assert!(instance.error().unwrap().contains("disk full"));
}

// ============================================
// Engine services
// ============================================

#[tokio::test]
async fn test_lifecycle_events_are_broadcast() {
    let engine = WorkflowEngine::new();
    let mut events = engine.subscribe();
    let instance = engine.create_workflow(Empty);

    instance
        .start_with(StartOptions::new().synchronous(true))
        .await
        .unwrap();

    let started = events.recv().await.unwrap();
    assert_eq!(started.workflow_id, instance.id());
    assert_eq!(started.workflow_type, "Empty");
    assert_eq!(started.event, StoreEvent::Start);
    assert!(!started.is_terminal());

    let completed = events.recv().await.unwrap();
    assert_eq!(completed.event, StoreEvent::Complete);
    assert!(completed.error.is_none());
}

#[tokio::test]
async fn test_remove_completed_immediately() {
    let engine = WorkflowEngine::with_config(
        EngineConfig::default().with_remove_completed_immediately(true),
    );
    let instance = engine.create_workflow(Empty);
    assert!(engine.get_workflow(instance.id()).is_some());

    instance
        .start_with(StartOptions::new().synchronous(true))
        .await
        .unwrap();

    assert!(engine.get_workflow(instance.id()).is_none());
    assert!(engine.is_empty());
}

#[tokio::test]
async fn test_completed_instances_are_kept_by_default() {
    let engine = WorkflowEngine::new();
    let instance = engine.create_workflow(Empty);
    instance
        .start_with(StartOptions::new().synchronous(true))
        .await
        .unwrap();

    let found = engine
        .get_workflow(instance.id())
        .expect("completed instance should stay registered");
    assert!(found.is_complete());
    assert_eq!(engine.len(), 1);
}

#[tokio::test]
async fn test_create_by_registered_type() {
    let engine = WorkflowEngine::new();
    engine.register_default::<ApprovalWorkflow>();
    assert_eq!(engine.registered_types(), vec!["Approval"]);

    let instance = engine
        .create_by_type("Approval", serde_json::Value::Null)
        .expect("registered type");
    assert_eq!(instance.workflow_type(), "Approval");

    instance.start(Arguments::new(), false).await.unwrap();
    assert_eq!(instance.allowed_actions(None).await.unwrap(), vec!["Assign"]);

    instance
        .action(ActionRequest::new("Assign").argument(Argument::new("AssignTo", "dana")))
        .await
        .unwrap();
    let descriptor = instance.descriptor();
    assert_eq!(descriptor.current_state, serde_json::json!("Assigned"));
    assert!(descriptor.is_running);
    assert!(descriptor
        .arguments
        .iter()
        .any(|a| a.name == "AssignedTo" && a.value == Value::from("dana")));

    let typed = engine
        .get_typed::<ApprovalState>(instance.id())
        .expect("state type matches");
    assert_eq!(typed.current_state(), Some(ApprovalState::Assigned));
    assert!(engine.get_typed::<()>(instance.id()).is_none());

    let err = engine
        .create_by_type("Unknown", serde_json::Value::Null)
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Registry(RegistryError::UnknownWorkflowType(_))
    ));

    instance.dispose();
    instance.wait().await.unwrap();
    assert!(instance.is_cancelled());
}

#[tokio::test]
async fn test_create_with_id_is_idempotent() {
    let engine = WorkflowEngine::new();
    let id = Uuid::now_v7();

    let first = engine
        .create_workflow_with_id(ApprovalWorkflow, id, None)
        .unwrap();
    let second = engine
        .create_workflow_with_id(ApprovalWorkflow, id, None)
        .unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(engine.len(), 1);

    let err = engine.create_workflow_with_id(Empty, id, None).unwrap_err();
    assert!(matches!(err, WorkflowError::InstanceTypeMismatch(found) if found == id));
}

#[tokio::test]
async fn test_engine_dispose_cancels_running_instances() {
    let engine = WorkflowEngine::new();
    let approval = engine.create_workflow(ApprovalWorkflow);
    let delay = engine.create_workflow(Delay::new(Duration::from_secs(30)));
    approval.start(Vec::new()).await.unwrap();
    delay.start(Vec::new()).await.unwrap();

    engine.dispose();
    assert!(engine.is_disposed());
    assert!(engine.is_empty());

    tokio::time::timeout(Duration::from_secs(5), async {
        approval.wait().await.unwrap();
        delay.wait().await.unwrap();
    })
    .await
    .expect("disposed instances should unwind");
    assert!(approval.is_cancelled());
    assert!(delay.is_cancelled());
    assert!(!approval.is_in_error());
}

#[tokio::test]
async fn test_concurrent_waiters_all_released() {
    let engine = WorkflowEngine::new();
    let instance = engine.create_workflow(ApprovalWorkflow);
    instance.start(Vec::new()).await.unwrap();

    let waiters: Vec<_> = (0..5)
        .map(|_| {
            let instance = instance.clone();
            tokio::spawn(async move { instance.wait().await })
        })
        .collect();

    instance
        .action(ActionRequest::new("Assign").argument(Argument::new("AssignTo", "a@test.com")))
        .await
        .unwrap();
    instance.action("Approve").await.unwrap();
    instance.action("Accept").await.unwrap();

    for waiter in waiters {
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter should be released")
            .expect("waiter should not panic")
            .expect("wait should succeed");
    }
}

#[tokio::test]
async fn test_concurrent_actions_are_serialized() {
    let engine = WorkflowEngine::new();
    let instance = engine.create_workflow(ApprovalWorkflow);
    instance.start(Vec::new()).await.unwrap();
    instance
        .action(ActionRequest::new("Assign").argument(Argument::new("AssignTo", "a@test.com")))
        .await
        .unwrap();

    // Two racing decisions: exactly one wins, the loser finds the state moved on
    let approve = instance.action_detached("Approve").unwrap();
    let reject = instance.action_detached("Reject").unwrap();
    let outcomes = [approve.await.unwrap(), reject.await.unwrap()];

    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(matches!(
        instance.current_state(),
        Some(ApprovalState::Approved) | Some(ApprovalState::Rejected)
    ));
    assert_eq!(instance.pending_actions(), 0);

    instance.action("Accept").await.unwrap();
    instance.wait().await.unwrap();
    assert_eq!(instance.current_state(), Some(ApprovalState::Accepted));
}
