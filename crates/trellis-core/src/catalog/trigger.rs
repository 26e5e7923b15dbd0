//! Lifecycle triggers.
//!
//! A trigger binds an async action to a phase of a class's lifecycle.
//! Before-phase triggers run sequentially in registration order and may
//! mutate the operation payload or abort it by returning an error.
//! After-phase triggers run detached; their errors are logged and discarded
//! by the class manager.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::Error;
use crate::manager::OperationOptions;
use crate::object::ClassInstance;
use crate::query::Query;

/// Lifecycle phase a trigger is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPhase {
    /// Before a `find` compiles and executes.
    BeforeFind,
    /// Before a `first` compiles and executes.
    BeforeFirst,
    /// Before a `get_by_id` compiles and executes.
    BeforeGet,
    /// Before a `save` touches storage.
    BeforeSave,
    /// After a `save` has completed (detached).
    AfterSave,
    /// Before a `destroy` touches storage.
    BeforeDestroy,
    /// After a `destroy` has completed (detached).
    AfterDestroy,
}

impl TriggerPhase {
    /// Whether this phase runs before the storage operation.
    pub fn is_before(&self) -> bool {
        matches!(
            self,
            TriggerPhase::BeforeFind
                | TriggerPhase::BeforeFirst
                | TriggerPhase::BeforeGet
                | TriggerPhase::BeforeSave
                | TriggerPhase::BeforeDestroy
        )
    }
}

/// The operation payload handed to a trigger action.
///
/// Query-phase triggers see the query; instance-phase triggers see the
/// instance. Before-phase actions return the (possibly mutated) context.
#[derive(Debug, Clone)]
pub struct TriggerContext {
    /// The query being prepared, for find/first/get phases.
    pub query: Option<Query>,
    /// The instance being saved or destroyed.
    pub instance: Option<ClassInstance>,
    /// Caller-provided options bag.
    pub options: OperationOptions,
}

impl TriggerContext {
    /// Context for a query-phase trigger.
    pub fn for_query(query: Query, options: OperationOptions) -> Self {
        Self {
            query: Some(query),
            instance: None,
            options,
        }
    }

    /// Context for an instance-phase trigger.
    pub fn for_instance(instance: ClassInstance, options: OperationOptions) -> Self {
        Self {
            query: None,
            instance: Some(instance),
            options,
        }
    }
}

/// Async trigger action: receives the context, returns it possibly mutated.
pub type TriggerAction =
    Arc<dyn Fn(TriggerContext) -> BoxFuture<'static, Result<TriggerContext, Error>> + Send + Sync>;

/// A registered trigger.
#[derive(Clone)]
pub struct Trigger {
    /// The phase this trigger fires in.
    pub phase: TriggerPhase,
    /// The action to run.
    pub action: TriggerAction,
}

impl Trigger {
    /// Create a trigger.
    pub fn new(phase: TriggerPhase, action: TriggerAction) -> Self {
        Self { phase, action }
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}
