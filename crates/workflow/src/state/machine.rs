//! State machine declaration assembled by a workflow before it runs

use std::collections::HashMap;
use std::sync::Arc;

use super::rule::StateHook;
use super::table::{ActionMap, GlobalState, WorkflowState};
use crate::error::Result;
use crate::instance::WorkflowInstance;
use crate::workflow::StateKey;

/// Behaviour attached to a single state
///
/// Implement this when a state carries its own action table and enter/exit
/// logic, instead of configuring it inline.
pub trait StateBehavior<S: StateKey>: Send + Sync + 'static {
    /// Declare the state's actions
    fn configure(&self, _state: &mut WorkflowState<S>) -> Result<()> {
        Ok(())
    }

    /// Runs the first time the instance enters the state
    fn on_enter_first_time(&self, _instance: &WorkflowInstance<S>) -> Result<()> {
        Ok(())
    }

    /// Runs on every transition into the state
    fn on_enter(&self, _instance: &WorkflowInstance<S>) -> Result<()> {
        Ok(())
    }

    /// Runs on every transition away from the state
    fn on_exit(&self, _instance: &WorkflowInstance<S>) -> Result<()> {
        Ok(())
    }
}

/// All states of a workflow plus its global and named actions
pub struct StateMachine<S: StateKey> {
    initial: Option<S>,
    states: HashMap<S, WorkflowState<S>>,
    global: GlobalState<S>,
    actions: ActionMap<S>,
}

impl<S: StateKey> Default for StateMachine<S> {
    fn default() -> Self {
        Self {
            initial: None,
            states: HashMap::new(),
            global: GlobalState::default(),
            actions: ActionMap::default(),
        }
    }
}

/// Hooks collected while entering a state, run after the table lock is released
pub(crate) struct Transition<S: StateKey> {
    pub exit_hook: Option<StateHook<S>>,
    pub first_time_hook: Option<StateHook<S>>,
    pub enter_hook: Option<StateHook<S>>,
    pub is_exit_state: bool,
}

impl<S: StateKey> StateMachine<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_initial_state(&mut self, state: S) -> &mut Self {
        self.initial = Some(state);
        self
    }

    pub fn initial_state(&self) -> Option<&S> {
        self.initial.as_ref()
    }

    /// Table for `state`, created empty on first use
    pub fn state(&mut self, state: S) -> &mut WorkflowState<S> {
        self.states
            .entry(state.clone())
            .or_insert_with(|| WorkflowState::new(state))
    }

    /// Table for `state` configured by a [`StateBehavior`]
    pub fn state_with<B: StateBehavior<S>>(
        &mut self,
        state: S,
        behavior: B,
    ) -> Result<&mut WorkflowState<S>> {
        let behavior = Arc::new(behavior);
        let table = self.state(state);
        behavior.configure(table)?;

        let first = behavior.clone();
        let every = behavior.clone();
        table
            .on_enter_first_time(move |instance| first.on_enter_first_time(instance))
            .on_enter(move |instance| every.on_enter(instance))
            .on_exit(move |instance| behavior.on_exit(instance));
        Ok(table)
    }

    pub fn get(&self, state: &S) -> Option<&WorkflowState<S>> {
        self.states.get(state)
    }

    pub fn states(&self) -> impl Iterator<Item = &S> {
        self.states.keys()
    }

    pub fn global(&mut self) -> &mut GlobalState<S> {
        &mut self.global
    }

    pub fn global_state(&self) -> &GlobalState<S> {
        &self.global
    }

    pub fn actions(&mut self) -> &mut ActionMap<S> {
        &mut self.actions
    }

    pub fn action_map(&self) -> &ActionMap<S> {
        &self.actions
    }

    /// A declared initial state makes the workflow state-driven
    pub fn is_state_driven(&self) -> bool {
        self.initial.is_some()
    }

    pub(crate) fn transition(&mut self, from: Option<&S>, to: &S) -> Transition<S> {
        let exit_hook = from
            .and_then(|s| self.states.get(s))
            .and_then(|s| s.exit_hook());
        let target = self.state(to.clone());
        let (first_time_hook, enter_hook) = target.enter();
        Transition {
            exit_hook,
            first_time_hook,
            enter_hook,
            is_exit_state: target.is_exit_state(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argument::Arguments;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
    enum Printer {
        Offline,
        Ready,
        PrintEnd,
    }

    struct OfflineState;

    impl StateBehavior<Printer> for OfflineState {
        fn configure(&self, state: &mut WorkflowState<Printer>) -> Result<()> {
            state.allow("Turn On", Printer::Ready)?;
            Ok(())
        }
    }

    #[test]
    fn test_state_with_behavior() {
        let mut machine = StateMachine::new();
        machine.set_initial_state(Printer::Offline);
        machine.state_with(Printer::Offline, OfflineState).unwrap();
        machine.state(Printer::PrintEnd).set_exit_state();

        assert!(machine.is_state_driven());
        let offline = machine.get(&Printer::Offline).unwrap();
        assert_eq!(
            offline.outcome("Turn On", None, &Arguments::new()).unwrap(),
            Printer::Ready
        );
    }

    #[test]
    fn test_transition_creates_missing_state() {
        let mut machine = StateMachine::<Printer>::new();
        machine.state(Printer::PrintEnd).set_exit_state();

        let transition = machine.transition(None, &Printer::Ready);
        assert!(!transition.is_exit_state);
        assert!(machine.get(&Printer::Ready).unwrap().has_entered());

        let transition = machine.transition(Some(&Printer::Ready), &Printer::PrintEnd);
        assert!(transition.is_exit_state);
    }
}
