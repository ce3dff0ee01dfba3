use std::borrow::Cow;
use std::fmt;

use crate::registry::TaskBody;
use crate::{CoreType, Result, Scheduler, TaskSetFn, TaskSetHandle};

/// Describes a task set before it is created.
///
/// Obtained from [`Scheduler::task_set()`]. Nothing is scheduled until
/// [`create()`][Self::create] is called.
#[must_use = "the task set is only scheduled when create() is called"]
pub struct TaskSetBuilder<'a> {
    scheduler: &'a mut Scheduler,
    subtask_count: u32,
    callback: Box<TaskSetFn>,
    dependencies: Vec<TaskSetHandle>,
    name: Option<Cow<'static, str>>,
    core_type: CoreType,
}

impl<'a> TaskSetBuilder<'a> {
    pub(crate) fn new(
        scheduler: &'a mut Scheduler,
        subtask_count: u32,
        callback: Box<TaskSetFn>,
    ) -> Self {
        Self {
            scheduler,
            subtask_count,
            callback,
            dependencies: Vec::new(),
            name: None,
            core_type: CoreType::Any,
        }
    }

    /// Adds task sets that must complete before this one starts.
    ///
    /// May be called more than once. [`TaskSetHandle::INVALID`] entries are ignored.
    pub fn depends_on(mut self, dependencies: &[TaskSetHandle]) -> Self {
        self.dependencies.extend_from_slice(dependencies);
        self
    }

    /// Sets a name for diagnostics. Task sets without a name are logged as "unnamed".
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the processor class the task set prefers to execute on.
    ///
    /// Default is [`CoreType::Any`]. Ignored on systems that are not hybrid.
    pub fn core_type(mut self, core_type: CoreType) -> Self {
        self.core_type = core_type;
        self
    }

    /// Creates the task set.
    ///
    /// If the task set has no dependencies (or all of them have already completed), it becomes
    /// ready to execute immediately.
    ///
    /// # Errors
    ///
    /// * [`Error::NoSubtasks`][crate::Error::NoSubtasks] if the sub-task count is zero.
    /// * [`Error::UnknownDependency`][crate::Error::UnknownDependency] if a dependency handle is
    ///   outside the registry.
    /// * [`Error::RegistryFull`][crate::Error::RegistryFull] if every registry slot is in use.
    /// * [`Error::SuccessorsFull`][crate::Error::SuccessorsFull] if a dependency already has the
    ///   maximum number of successors. Nothing is created in that case.
    pub fn create(self) -> Result<TaskSetHandle> {
        let body = TaskBody {
            callback: self.callback,
            name: self.name,
        };

        self.scheduler.create_task_set(
            body,
            self.subtask_count,
            &self.dependencies,
            self.core_type,
        )
    }
}

impl fmt::Debug for TaskSetBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSetBuilder")
            .field("subtask_count", &self.subtask_count)
            .field("dependencies", &self.dependencies)
            .field("name", &self.name)
            .field("core_type", &self.core_type)
            .finish_non_exhaustive()
    }
}
