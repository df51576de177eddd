//! Ptn task management.
//!
//! Services such as the unit fetcher run as endless futures. This crate abstracts over how those
//! futures are spawned ([`TaskSpawner`]) and how they are told to stop ([`shutdown::signal`]).

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

use dyn_clone::DynClone;
use futures_util::{future::BoxFuture, FutureExt};
use std::{any::Any, fmt, panic::AssertUnwindSafe};
use tokio::task::JoinHandle;
use tracing::error;

pub mod shutdown;

/// A type that can spawn tasks.
///
/// The main purpose of this type is to abstract over the runtime so it's more convenient to
/// provide default impls for testing.
///
/// # Examples
///
/// Use the [`TokioTaskExecutor`] that spawns with [`tokio::task::spawn`]
///
/// ```
/// # async fn t() {
/// use ptn_tasks::{TaskSpawner, TokioTaskExecutor};
/// let executor = TokioTaskExecutor::default();
///
/// let task = executor.spawn_task(Box::pin(async {
///     // -- snip --
/// }));
/// task.await.unwrap();
/// # }
/// ```
///
/// The [`TaskSpawner`] trait is [`DynClone`] so `Box<dyn TaskSpawner>` are also `Clone`.
#[auto_impl::auto_impl(&, Arc)]
pub trait TaskSpawner: Send + Sync + Unpin + fmt::Debug + DynClone {
    /// Spawns the task onto the runtime.
    fn spawn_task(&self, fut: BoxFuture<'static, ()>) -> JoinHandle<()>;

    /// This spawns a critical task onto the runtime.
    ///
    /// A panic inside a critical task is logged with the task's name before the task ends.
    fn spawn_critical_task(&self, name: &'static str, fut: BoxFuture<'static, ()>)
        -> JoinHandle<()>;
}

dyn_clone::clone_trait_object!(TaskSpawner);

/// An [`TaskSpawner`] that uses [`tokio::task::spawn`] to execute tasks
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct TokioTaskExecutor;

impl TokioTaskExecutor {
    /// Converts the instance to a boxed [`TaskSpawner`].
    pub fn boxed(self) -> Box<dyn TaskSpawner + 'static> {
        Box::new(self)
    }
}

impl TaskSpawner for TokioTaskExecutor {
    fn spawn_task(&self, fut: BoxFuture<'static, ()>) -> JoinHandle<()> {
        tokio::task::spawn(fut)
    }

    fn spawn_critical_task(
        &self,
        name: &'static str,
        fut: BoxFuture<'static, ()>,
    ) -> JoinHandle<()> {
        let task = AssertUnwindSafe(fut).catch_unwind().map(move |res| {
            if let Err(panic) = res {
                let err = PanickedTaskError::new(name, panic);
                error!(target: "ptn::tasks", %err, "critical task panicked");
            }
        });
        tokio::task::spawn(task)
    }
}

/// Error with the name of the task that panicked and an error downcasted to string, if possible.
#[derive(Debug, PartialEq, Eq)]
pub struct PanickedTaskError {
    task_name: &'static str,
    error: Option<String>,
}

impl PanickedTaskError {
    fn new(task_name: &'static str, error: Box<dyn Any + Send>) -> Self {
        let error = match error.downcast::<String>() {
            Ok(value) => Some(*value),
            Err(error) => match error.downcast::<&str>() {
                Ok(value) => Some(value.to_string()),
                Err(_) => None,
            },
        };

        Self { task_name, error }
    }

    /// Name of the task that panicked.
    pub const fn task_name(&self) -> &'static str {
        self.task_name
    }
}

impl fmt::Display for PanickedTaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let task_name = self.task_name;
        if let Some(error) = &self.error {
            write!(f, "Critical task `{task_name}` panicked: `{error}`")
        } else {
            write!(f, "Critical task `{task_name}` panicked")
        }
    }
}

impl std::error::Error for PanickedTaskError {}
