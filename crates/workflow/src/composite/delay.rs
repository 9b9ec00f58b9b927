use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::argument::Arguments;
use crate::config::DEFAULT_POLLING_INTERVAL;
use crate::error::Result;
use crate::instance::WorkflowInstance;
use crate::state::Condition;
use crate::workflow::{DynWorkflow, LoadBehavior, Workflow};

async fn enter_follow_up(instance: &WorkflowInstance<()>, follow_up: Option<&DynWorkflow>) -> Result<()> {
    if let Some(workflow) = follow_up {
        instance.enter_dyn(workflow, Vec::new()).await?;
    }
    Ok(())
}

/// Waits for a fixed duration, then enters an optional follow-up
#[derive(Debug, Clone, Default)]
pub struct Delay {
    duration: Duration,
    follow_up: Option<DynWorkflow>,
}

impl Delay {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            follow_up: None,
        }
    }

    pub fn then<W: Workflow>(mut self, workflow: W) -> Self {
        self.follow_up = Some(DynWorkflow::new(workflow));
        self
    }

    pub fn then_dyn(mut self, workflow: DynWorkflow) -> Self {
        self.follow_up = Some(workflow);
        self
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

#[async_trait]
impl Workflow for Delay {
    type State = ();

    fn load_behavior(&self) -> LoadBehavior {
        LoadBehavior::Bypass
    }

    async fn execute(&self, instance: &WorkflowInstance<()>) -> Result<()> {
        if !self.duration.is_zero() {
            instance.delay(self.duration).await?;
        }
        enter_follow_up(instance, self.follow_up.as_ref()).await
    }
}

/// [`Delay`] whose duration runs until a point in time
///
/// The duration is computed when the workflow is built; a point in the past
/// means no delay.
#[derive(Debug, Clone)]
pub struct DelayUntil {
    inner: Delay,
    until: DateTime<Utc>,
}

impl DelayUntil {
    pub fn new(until: DateTime<Utc>) -> Self {
        let duration = (until - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        Self {
            inner: Delay::new(duration),
            until,
        }
    }

    pub fn then<W: Workflow>(mut self, workflow: W) -> Self {
        self.inner = self.inner.then(workflow);
        self
    }

    pub fn until(&self) -> DateTime<Utc> {
        self.until
    }
}

#[async_trait]
impl Workflow for DelayUntil {
    type State = ();

    fn load_behavior(&self) -> LoadBehavior {
        LoadBehavior::Bypass
    }

    async fn execute(&self, instance: &WorkflowInstance<()>) -> Result<()> {
        self.inner.execute(instance).await
    }
}

/// Polls a condition until it holds or an escalation deadline passes
///
/// The follow-up runs afterwards unless the instance was cancelled, or
/// `break_on_condition` is set and the condition tripped. This is the
/// building block for escalation: "if nobody confirmed by the deadline,
/// run the escalation workflow".
#[derive(Clone)]
pub struct DelayUntilCondition {
    condition: Condition,
    escalation: Option<DateTime<Utc>>,
    break_on_condition: bool,
    period: Option<Duration>,
    follow_up: Option<DynWorkflow>,
}

impl DelayUntilCondition {
    pub fn new<F>(condition: F) -> Self
    where
        F: Fn(&Arguments) -> bool + Send + Sync + 'static,
    {
        Self {
            condition: Arc::new(condition),
            escalation: None,
            break_on_condition: false,
            period: None,
            follow_up: None,
        }
    }

    /// Stop polling at `deadline` even if the condition never held
    pub fn escalate_at(mut self, deadline: DateTime<Utc>) -> Self {
        self.escalation = Some(deadline);
        self
    }

    /// Skip the follow-up when the condition tripped
    pub fn break_on_condition(mut self, enabled: bool) -> Self {
        self.break_on_condition = enabled;
        self
    }

    /// Polling period; the engine's polling interval when unset
    pub fn period(mut self, period: Duration) -> Self {
        self.period = Some(period);
        self
    }

    pub fn then<W: Workflow>(mut self, workflow: W) -> Self {
        self.follow_up = Some(DynWorkflow::new(workflow));
        self
    }

    pub fn then_dyn(mut self, workflow: DynWorkflow) -> Self {
        self.follow_up = Some(workflow);
        self
    }

    fn polling_period(&self, instance: &WorkflowInstance<()>) -> Duration {
        self.period
            .or_else(|| instance.engine().map(|engine| engine.config().polling_interval))
            .unwrap_or(DEFAULT_POLLING_INTERVAL)
    }

    fn before_deadline(&self) -> bool {
        self.escalation.map_or(true, |deadline| Utc::now() < deadline)
    }
}

#[async_trait]
impl Workflow for DelayUntilCondition {
    type State = ();

    fn load_behavior(&self) -> LoadBehavior {
        LoadBehavior::Bypass
    }

    async fn execute(&self, instance: &WorkflowInstance<()>) -> Result<()> {
        let period = self.polling_period(instance);
        let mut tripped = false;
        // The condition is evaluated once more after the deadline passes
        while !instance.is_cancelled() {
            tripped = (self.condition)(&instance.arguments());
            if tripped || !self.before_deadline() {
                break;
            }
            instance.delay(period).await?;
        }

        if instance.is_cancelled() || (self.break_on_condition && tripped) {
            debug!(workflow_id = %instance.id(), tripped, "condition polling ended without follow-up");
            return Ok(());
        }
        enter_follow_up(instance, self.follow_up.as_ref()).await
    }
}

impl fmt::Debug for DelayUntilCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayUntilCondition")
            .field("escalation", &self.escalation)
            .field("break_on_condition", &self.break_on_condition)
            .field("period", &self.period)
            .field("follow_up", &self.follow_up)
            .finish()
    }
}
