use crate::error::{Error, ProtocolViolation};
use crate::future::FutureId;
use crate::task::{AnyTask, TaskRef};

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Weak;

/// Per-scheduler bookkeeping of live tasks.
///
/// The registry never keeps a task alive: it only stores weak handles,
/// and tasks remove themselves once they are finished or dropped. The
/// current-task slot is the only strong reference, held for the duration
/// of a single step.
#[derive(Default)]
pub struct TaskRegistry {
    /// Weak handles to every live task, keyed by id (creation order).
    tasks: RefCell<BTreeMap<FutureId, Weak<dyn AnyTask>>>,

    /// The task whose computation is currently running, if any.
    current: RefCell<Option<TaskRef>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, id: FutureId, task: Weak<dyn AnyTask>) {
        self.tasks.borrow_mut().insert(id, task);
    }

    pub(crate) fn unregister(&self, id: FutureId) {
        self.tasks.borrow_mut().remove(&id);
    }

    /// Returns every live, unfinished task in creation order.
    ///
    /// Entries whose task has already been dropped are pruned.
    pub fn all_tasks(&self) -> Vec<TaskRef> {
        let mut tasks = self.tasks.borrow_mut();
        tasks.retain(|_, task| task.strong_count() > 0);

        tasks
            .values()
            .filter_map(Weak::upgrade)
            .filter(|task| !task.done())
            .collect()
    }

    /// Number of registered tasks, dropped ones excluded.
    pub fn len(&self) -> usize {
        self.tasks
            .borrow()
            .values()
            .filter(|task| task.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the task currently being stepped.
    pub fn current_task(&self) -> Option<TaskRef> {
        self.current.borrow().clone()
    }

    /// Runs `f` with `task` installed as the current task.
    ///
    /// Fails without running `f` if a task is already current: a scheduler
    /// never steps two tasks at once. The previous value of the
    /// slot is restored afterwards whatever `f` returns.
    pub(crate) fn enter<R>(
        &self,
        task: TaskRef,
        f: impl FnOnce() -> Result<R, Error>,
    ) -> Result<R, Error> {
        if let Some(current) = self.current.borrow().as_ref() {
            return Err(ProtocolViolation::ReentrantStep {
                task: task.to_string(),
                current: current.to_string(),
            }
            .into());
        }

        let previous = self.current.replace(Some(task));
        let out = f();
        let entered = self.current.replace(previous);

        drop(entered);
        out
    }
}
