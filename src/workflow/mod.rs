//! Ordered action list and its sequential, fail-fast runner.

pub mod store;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};

use crate::action::{Action, ActionId, Outcome};
use crate::config::Config;
use crate::error::ActionError;
use crate::host::DocumentHost;
use crate::locator::Locator;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

/// Lifecycle notifications of a workflow run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEvent {
    RunStarted {
        total: usize,
    },
    ActionStarted {
        index: usize,
        id: ActionId,
        name: String,
    },
    ActionCompleted {
        index: usize,
        id: ActionId,
        outcome: Outcome,
    },
    ActionFailed {
        index: usize,
        id: ActionId,
        error: ActionError,
    },
    RunFinished {
        state: RunState,
    },
}

/// Clears the running flag on every exit path, including a dropped run future
struct RunGuard<'a> {
    workflow: &'a Workflow,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut state = lock(&self.workflow.state);
        if *state == RunState::Running {
            *state = RunState::Failed;
        }
        self.workflow.running.store(false, Ordering::SeqCst);
    }
}

/// Owns the action list of one document host and runs it
pub struct Workflow {
    host: Arc<dyn DocumentHost>,
    config: Config,
    actions: Mutex<Vec<Action>>,
    running: AtomicBool,
    state: Mutex<RunState>,
    cancel: watch::Sender<bool>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<WorkflowEvent>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Workflow {
    pub fn new(host: Arc<dyn DocumentHost>, config: Config) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            host,
            config,
            actions: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            state: Mutex::new(RunState::Idle),
            cancel,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Lock the action list for a structural change
    fn edit(&self) -> Result<MutexGuard<'_, Vec<Action>>> {
        let actions = lock(&self.actions);
        if self.is_running() {
            return Err(Error::AlreadyRunning);
        }
        Ok(actions)
    }

    /// Append an action and return its id
    pub fn add(&self, action: Action) -> Result<ActionId> {
        let mut actions = self.edit()?;
        let index = actions.len();
        Ok(insert_unique(&mut actions, index, action))
    }

    pub fn insert(&self, index: usize, action: Action) -> Result<ActionId> {
        let mut actions = self.edit()?;
        if index > actions.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: actions.len(),
            });
        }
        Ok(insert_unique(&mut actions, index, action))
    }

    pub fn remove(&self, id: ActionId) -> Result<Action> {
        let mut actions = self.edit()?;
        let index = position(&actions, id)?;
        Ok(actions.remove(index))
    }

    /// Move the action at `from` so it ends up at `to`
    pub fn move_action(&self, from: usize, to: usize) -> Result<()> {
        let mut actions = self.edit()?;
        let len = actions.len();
        for index in [from, to] {
            if index >= len {
                return Err(Error::IndexOutOfRange { index, len });
            }
        }
        let action = actions.remove(from);
        actions.insert(to, action);
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.edit()?.clear();
        Ok(())
    }

    /// Edit one action in place
    pub fn update<F>(&self, id: ActionId, f: F) -> Result<()>
    where
        F: FnOnce(&mut Action),
    {
        let mut actions = self.edit()?;
        let index = position(&actions, id)?;
        f(&mut actions[index]);
        Ok(())
    }

    /// Point an action at a new element. Returns false for actions that take no element.
    pub fn assign_target(&self, id: ActionId, locator: Locator) -> Result<bool> {
        let mut actions = self.edit()?;
        let index = position(&actions, id)?;
        Ok(actions[index].kind.set_target(locator))
    }

    pub fn get(&self, id: ActionId) -> Option<Action> {
        lock(&self.actions).iter().find(|a| a.id() == id).cloned()
    }

    pub fn actions(&self) -> Vec<Action> {
        lock(&self.actions).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.actions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state(&self) -> RunState {
        *lock(&self.state)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Receive lifecycle events of every later run
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<WorkflowEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.subscribers).push(tx);
        rx
    }

    /// Stop the current run. The action in flight is abandoned and the run ends `Failed`.
    pub fn cancel(&self) {
        if self.is_running() {
            tracing::info!("cancelling workflow run");
            self.cancel.send_replace(true);
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        store::save(path, &self.actions())
    }

    /// Replace the action list with the one stored at `path`
    pub fn load(&self, path: &Path) -> Result<()> {
        let loaded = store::load(path)?;
        let mut actions = self.edit()?;
        actions.clear();
        for action in loaded {
            let index = actions.len();
            insert_unique(&mut actions, index, action);
        }
        Ok(())
    }

    fn emit(&self, event: WorkflowEvent) {
        lock(&self.subscribers).retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn begin(&self) -> Result<RunGuard<'_>> {
        let _actions = lock(&self.actions);
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AlreadyRunning);
        }
        self.cancel.send_replace(false);
        Ok(RunGuard { workflow: self })
    }

    fn set_state(&self, state: RunState) {
        *lock(&self.state) = state;
    }

    /// Write run outputs of an executed copy back into the list
    fn store_outputs(&self, action: &Action) {
        let mut actions = lock(&self.actions);
        if let Some(slot) = actions.iter_mut().find(|a| a.id() == action.id()) {
            slot.kind = action.kind.clone();
        }
    }

    /// Execute `action`, abandoning it if the run is cancelled
    async fn execute(&self, action: &mut Action, cancel: &mut watch::Receiver<bool>) -> Outcome {
        if *cancel.borrow() {
            return Outcome::Failed(ActionError::Cancelled);
        }
        tokio::select! {
            outcome = action.execute(self.host.as_ref(), &self.config) => outcome,
            _ = cancel.wait_for(|cancelled| *cancelled) => Outcome::Failed(ActionError::Cancelled),
        }
    }

    /// Execute every action in order, stopping at the first failure
    pub async fn run_all(&self) -> Result<RunState> {
        let _guard = self.begin()?;
        let mut cancel = self.cancel.subscribe();
        let actions = self.actions();

        self.set_state(RunState::Running);
        tracing::info!("workflow run started ({} actions)", actions.len());
        self.emit(WorkflowEvent::RunStarted {
            total: actions.len(),
        });

        let mut state = RunState::Completed;
        for (index, mut action) in actions.into_iter().enumerate() {
            let id = action.id();
            self.emit(WorkflowEvent::ActionStarted {
                index,
                id,
                name: action.name.clone(),
            });

            let outcome = self.execute(&mut action, &mut cancel).await;
            self.store_outputs(&action);

            if let Outcome::Failed(error) = outcome {
                tracing::warn!("workflow stopped at action {index} ({}): {error}", action.name);
                self.emit(WorkflowEvent::ActionFailed { index, id, error });
                state = RunState::Failed;
                break;
            }
            self.emit(WorkflowEvent::ActionCompleted { index, id, outcome });
        }

        self.set_state(state);
        tracing::info!("workflow run finished: {state:?}");
        self.emit(WorkflowEvent::RunFinished { state });
        Ok(state)
    }

    /// Execute a single action from the list
    pub async fn run_one(&self, id: ActionId) -> Result<Outcome> {
        let _guard = self.begin()?;
        let mut cancel = self.cancel.subscribe();
        let (index, mut action) = {
            let actions = lock(&self.actions);
            let index = position(&actions, id)?;
            (index, actions[index].clone())
        };

        self.emit(WorkflowEvent::ActionStarted {
            index,
            id,
            name: action.name.clone(),
        });
        let outcome = self.execute(&mut action, &mut cancel).await;
        self.store_outputs(&action);

        match &outcome {
            Outcome::Failed(error) => self.emit(WorkflowEvent::ActionFailed {
                index,
                id,
                error: error.clone(),
            }),
            _ => self.emit(WorkflowEvent::ActionCompleted {
                index,
                id,
                outcome: outcome.clone(),
            }),
        }
        Ok(outcome)
    }
}

fn position(actions: &[Action], id: ActionId) -> Result<usize> {
    actions
        .iter()
        .position(|a| a.id() == id)
        .ok_or(Error::UnknownAction(id))
}

fn insert_unique(actions: &mut Vec<Action>, index: usize, mut action: Action) -> ActionId {
    while actions.iter().any(|a| a.id() == action.id()) {
        action.renew_id();
    }
    let id = action.id();
    actions.insert(index, action);
    id
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::action::ActionKind;
    use crate::host::testing::ScriptedHost;
    use crate::host::EvalReply;

    fn drain(rx: &mut mpsc::UnboundedReceiver<WorkflowEvent>) -> Vec<WorkflowEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn workflow_with(host: Arc<ScriptedHost>) -> Workflow {
        Workflow::new(host, Config::default())
    }

    #[tokio::test]
    async fn test_run_all_stops_at_first_failure() {
        let host = Arc::new(ScriptedHost::new(|script| {
            if script.contains("\"bad\"") {
                EvalReply::failed("TypeError: el.click is not a function")
            } else {
                EvalReply::ok(r#"{"found":true}"#)
            }
        }));
        let workflow = workflow_with(host.clone());
        let a = workflow.add(Action::click(Locator::by_id("a"))).unwrap();
        let bad = workflow.add(Action::click(Locator::by_id("bad"))).unwrap();
        workflow.add(Action::click(Locator::by_id("c"))).unwrap();
        let mut events = workflow.subscribe();

        assert_eq!(workflow.run_all().await.unwrap(), RunState::Failed);
        assert_eq!(workflow.state(), RunState::Failed);
        assert!(!workflow.is_running());
        assert_eq!(host.scripts().len(), 2);

        let error = ActionError::Script("TypeError: el.click is not a function".into());
        assert_eq!(
            drain(&mut events),
            vec![
                WorkflowEvent::RunStarted { total: 3 },
                WorkflowEvent::ActionStarted {
                    index: 0,
                    id: a,
                    name: "Click element".into()
                },
                WorkflowEvent::ActionCompleted {
                    index: 0,
                    id: a,
                    outcome: Outcome::Success(None)
                },
                WorkflowEvent::ActionStarted {
                    index: 1,
                    id: bad,
                    name: "Click element".into()
                },
                WorkflowEvent::ActionFailed {
                    index: 1,
                    id: bad,
                    error
                },
                WorkflowEvent::RunFinished {
                    state: RunState::Failed
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_run_all_completes_and_keeps_outputs() {
        let host = Arc::new(ScriptedHost::new(|_| {
            EvalReply::ok(r#"{"found":true,"value":"Welcome"}"#)
        }));
        let workflow = workflow_with(host);
        let id = workflow.add(Action::get_text(Locator::by_css("h1"))).unwrap();

        assert_eq!(workflow.run_all().await.unwrap(), RunState::Completed);
        assert_eq!(workflow.get(id).unwrap().extracted_text(), Some("Welcome"));
        assert!(!workflow.is_running());
    }

    #[tokio::test]
    async fn test_empty_run_completes() {
        let workflow = workflow_with(Arc::new(ScriptedHost::found()));
        let mut events = workflow.subscribe();

        assert_eq!(workflow.run_all().await.unwrap(), RunState::Completed);
        assert_eq!(
            drain(&mut events),
            vec![
                WorkflowEvent::RunStarted { total: 0 },
                WorkflowEvent::RunFinished {
                    state: RunState::Completed
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutations_refused_while_running() {
        let workflow = workflow_with(Arc::new(ScriptedHost::found()));
        let id = workflow.add(Action::wait(1_000)).unwrap();

        let (state, _) = tokio::join!(workflow.run_all(), async {
            assert!(workflow.is_running());
            assert_eq!(workflow.state(), RunState::Running);
            assert!(matches!(
                workflow.add(Action::wait(1)),
                Err(Error::AlreadyRunning)
            ));
            assert!(matches!(workflow.remove(id), Err(Error::AlreadyRunning)));
            assert!(matches!(workflow.run_all().await, Err(Error::AlreadyRunning)));
            assert!(matches!(workflow.run_one(id).await, Err(Error::AlreadyRunning)));
        });

        assert_eq!(state.unwrap(), RunState::Completed);
        assert!(workflow.add(Action::wait(1)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_abandons_action_in_flight() {
        let workflow = workflow_with(Arc::new(ScriptedHost::found()));
        let wait = workflow.add(Action::wait(60_000)).unwrap();
        workflow.add(Action::click(Locator::by_id("never"))).unwrap();
        let mut events = workflow.subscribe();

        let (state, _) = tokio::join!(workflow.run_all(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            workflow.cancel();
        });

        assert_eq!(state.unwrap(), RunState::Failed);
        assert!(!workflow.is_running());
        let events = drain(&mut events);
        assert!(events.contains(&WorkflowEvent::ActionFailed {
            index: 0,
            id: wait,
            error: ActionError::Cancelled,
        }));
        assert_eq!(
            events.last(),
            Some(&WorkflowEvent::RunFinished {
                state: RunState::Failed
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_run_releases_running_flag() {
        let workflow = workflow_with(Arc::new(ScriptedHost::found()));
        workflow.add(Action::wait(60_000)).unwrap();

        let run = tokio::time::timeout(Duration::from_millis(10), workflow.run_all()).await;
        assert!(run.is_err());
        assert!(!workflow.is_running());
        assert_eq!(workflow.state(), RunState::Failed);
    }

    #[tokio::test]
    async fn test_cancel_when_idle_is_ignored() {
        let workflow = workflow_with(Arc::new(ScriptedHost::found()));
        workflow.add(Action::click(Locator::by_id("a"))).unwrap();

        workflow.cancel();
        assert_eq!(workflow.run_all().await.unwrap(), RunState::Completed);
    }

    #[tokio::test]
    async fn test_run_one() {
        let host = Arc::new(ScriptedHost::found());
        let workflow = workflow_with(host.clone());
        workflow.add(Action::click(Locator::by_id("a"))).unwrap();
        let b = workflow.add(Action::click(Locator::by_id("b"))).unwrap();

        assert_eq!(workflow.run_one(b).await.unwrap(), Outcome::Success(None));
        assert_eq!(host.scripts().len(), 1);
        assert!(host.scripts()[0].contains("\"b\""));
        assert_eq!(workflow.state(), RunState::Idle);

        let missing = ActionId::new();
        assert!(matches!(
            workflow.run_one(missing).await,
            Err(Error::UnknownAction(id)) if id == missing
        ));
    }

    #[test]
    fn test_move_and_back_restores_order() {
        let workflow = workflow_with(Arc::new(ScriptedHost::found()));
        let ids: Vec<_> = (0..4)
            .map(|i| workflow.add(Action::wait(i)).unwrap())
            .collect();

        workflow.move_action(0, 3).unwrap();
        let moved: Vec<_> = workflow.actions().iter().map(Action::id).collect();
        assert_eq!(moved, vec![ids[1], ids[2], ids[3], ids[0]]);

        workflow.move_action(3, 0).unwrap();
        let restored: Vec<_> = workflow.actions().iter().map(Action::id).collect();
        assert_eq!(restored, ids);
    }

    #[test]
    fn test_move_out_of_range() {
        let workflow = workflow_with(Arc::new(ScriptedHost::found()));
        workflow.add(Action::wait(1)).unwrap();
        workflow.add(Action::wait(2)).unwrap();

        assert!(matches!(
            workflow.move_action(0, 2),
            Err(Error::IndexOutOfRange { index: 2, len: 2 })
        ));
        assert!(matches!(
            workflow.move_action(5, 0),
            Err(Error::IndexOutOfRange { index: 5, len: 2 })
        ));
        assert!(matches!(
            workflow.insert(3, Action::wait(3)),
            Err(Error::IndexOutOfRange { index: 3, len: 2 })
        ));
    }

    #[test]
    fn test_duplicate_ids_are_renewed() {
        let workflow = workflow_with(Arc::new(ScriptedHost::found()));
        let action = Action::wait(5);

        let first = workflow.add(action.clone()).unwrap();
        let second = workflow.add(action).unwrap();
        assert_ne!(first, second);
        assert_eq!(workflow.len(), 2);
    }

    #[test]
    fn test_edit_operations() {
        let workflow = workflow_with(Arc::new(ScriptedHost::found()));
        let click = workflow
            .add(Action::new(ActionKind::Click { target: None }))
            .unwrap();
        let wait = workflow.insert(0, Action::wait(5)).unwrap();

        assert!(workflow.assign_target(click, Locator::by_id("ok")).unwrap());
        assert!(!workflow.assign_target(wait, Locator::by_id("ok")).unwrap());
        assert_eq!(
            workflow.get(click).unwrap().kind.target(),
            Some(&Locator::by_id("ok"))
        );

        workflow
            .update(wait, |action| action.name = "Short pause".into())
            .unwrap();
        assert_eq!(workflow.get(wait).unwrap().name, "Short pause");

        let removed = workflow.remove(wait).unwrap();
        assert_eq!(removed.id(), wait);
        assert_eq!(workflow.len(), 1);
        assert!(matches!(workflow.remove(wait), Err(Error::UnknownAction(_))));

        workflow.clear().unwrap();
        assert!(workflow.is_empty());
    }

    #[test]
    fn test_save_and_load_replace_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.json");
        let workflow = workflow_with(Arc::new(ScriptedHost::found()));
        workflow.add(Action::navigate("example.com")).unwrap();
        workflow.add(Action::wait(300)).unwrap();
        workflow.save(&path).unwrap();

        let other = workflow_with(Arc::new(ScriptedHost::found()));
        other.add(Action::wait(1)).unwrap();
        other.load(&path).unwrap();

        assert_eq!(other.actions(), workflow.actions());
    }
}
