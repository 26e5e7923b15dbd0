//! Class manager: find/save/destroy orchestration.
//!
//! The manager ties the pipeline together: it runs before-phase triggers
//! sequentially, compiles queries through the SQL compiler, executes them on
//! the storage driver, materializes rows back into class instances, and
//! launches after-phase triggers as detached tasks whose errors are logged
//! and discarded.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use trellis_proto::{Increment, Pointer, Value};

use crate::catalog::{
    ClassId, ClassRegistry, TriggerContext, TriggerPhase, IDENTIFIER_KEY,
};
use crate::driver::{ExecuteResult, Intent, StorageDriver};
use crate::error::Error;
use crate::keymap::KeyMap;
use crate::object::ClassInstance;
use crate::query::Query;
use crate::sql::SqlCompiler;

/// Options bag passed by callers; triggers inspect it for authorization.
#[derive(Debug, Clone, Default)]
pub struct OperationOptions {
    /// Acting user, if any.
    pub user: Option<i64>,
    /// Elevated access: lifts hidden-field restrictions.
    pub master: bool,
}

impl OperationOptions {
    /// Options for an elevated caller.
    pub fn master() -> Self {
        Self {
            user: None,
            master: true,
        }
    }

    /// Options for a specific acting user.
    pub fn for_user(user: i64) -> Self {
        Self {
            user: Some(user),
            master: false,
        }
    }
}

/// An ordered list of materialized instances.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    items: Vec<ClassInstance>,
}

impl Collection {
    /// Wrap materialized instances.
    pub fn new(items: Vec<ClassInstance>) -> Self {
        Self { items }
    }

    /// Number of instances.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Borrow an instance by position.
    pub fn get(&self, index: usize) -> Option<&ClassInstance> {
        self.items.get(index)
    }

    /// Iterate instances in result order.
    pub fn iter(&self) -> impl Iterator<Item = &ClassInstance> {
        self.items.iter()
    }

    /// Unwrap into the underlying vector.
    pub fn into_vec(self) -> Vec<ClassInstance> {
        self.items
    }
}

impl IntoIterator for Collection {
    type Item = ClassInstance;
    type IntoIter = std::vec::IntoIter<ClassInstance>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Orchestrates query and persistence operations against the driver.
#[derive(Clone)]
pub struct ClassManager {
    registry: Arc<ClassRegistry>,
    driver: Arc<dyn StorageDriver>,
}

impl fmt::Debug for ClassManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassManager").finish_non_exhaustive()
    }
}

impl ClassManager {
    /// Create a manager over a registry and driver.
    pub fn new(registry: Arc<ClassRegistry>, driver: Arc<dyn StorageDriver>) -> Self {
        Self { registry, driver }
    }

    /// Initialize the driver and close the registry.
    pub async fn initialize(&self) -> Result<(), Error> {
        self.driver.initialize().await?;
        self.registry.freeze();
        Ok(())
    }

    /// The registry this manager operates over.
    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    /// Run a query and materialize every matching row.
    pub async fn find(&self, query: Query, opts: &OperationOptions) -> Result<Collection, Error> {
        self.registry.freeze();
        let class = query.class();
        let context = self
            .run_before_triggers(
                TriggerPhase::BeforeFind,
                TriggerContext::for_query(query, opts.clone()),
                class,
            )
            .await?;
        let query = Self::query_from(context)?;
        self.execute_find(&query, opts).await
    }

    /// Run a query limited to one row; `Ok(None)` when nothing matches.
    pub async fn first(
        &self,
        query: Query,
        opts: &OperationOptions,
    ) -> Result<Option<ClassInstance>, Error> {
        self.registry.freeze();
        let class = query.class();
        let context = self
            .run_before_triggers(
                TriggerPhase::BeforeFirst,
                TriggerContext::for_query(query, opts.clone()),
                class,
            )
            .await?;
        let query = Self::query_from(context)?.limit(1);
        let collection = self.execute_find(&query, opts).await?;
        Ok(collection.into_iter().next())
    }

    /// Fetch one row by identifier.
    pub async fn get_by_id(
        &self,
        class: ClassId,
        id: i64,
        include: &[&str],
        select: &[&str],
        opts: &OperationOptions,
    ) -> Result<Option<ClassInstance>, Error> {
        self.registry.freeze();
        let mut query =
            Query::new(self.registry.clone(), class).equal_to(IDENTIFIER_KEY, id)?;
        if !select.is_empty() {
            query = query.select(select)?;
        }
        for field in include {
            query = query.include(field)?;
        }
        let context = self
            .run_before_triggers(
                TriggerPhase::BeforeGet,
                TriggerContext::for_query(query, opts.clone()),
                class,
            )
            .await?;
        let query = Self::query_from(context)?.limit(1);
        let collection = self.execute_find(&query, opts).await?;
        Ok(collection.into_iter().next())
    }

    /// Persist an instance: insert when new, update by identifier otherwise.
    ///
    /// Before-save triggers run sequentially and may abort; after-save
    /// triggers run detached and cannot affect the result.
    pub async fn save(
        &self,
        instance: ClassInstance,
        opts: &OperationOptions,
    ) -> Result<ClassInstance, Error> {
        self.registry.freeze();
        let class = instance.class();
        let context = self
            .run_before_triggers(
                TriggerPhase::BeforeSave,
                TriggerContext::for_instance(instance, opts.clone()),
                class,
            )
            .await?;
        let mut instance = Self::instance_from(context)?;
        let definition = self.registry.definition(class)?;
        let compiler = SqlCompiler::new(self.driver.as_ref());
        let now = Utc::now();

        let mut row = instance.attributes().clone();
        if instance.is_new() {
            row.set("created_at", Value::Date(now))?;
            row.set("updated_at", Value::Date(now))?;
            let sql = compiler.compile_insert(definition.source(), &row)?;
            debug!(class = definition.name(), %sql, "inserting row");
            match self.execute(&sql, Intent::Write).await? {
                ExecuteResult::Inserted { id } => instance.assign_id(id),
                _ => return Err(Error::database("driver returned no inserted id", sql)),
            }
            instance.set_loaded("created_at", Value::Date(now))?;
            instance.set_loaded("updated_at", Value::Date(now))?;
        } else {
            let id = Self::require_id(&instance)?;
            row.set("updated_at", Value::Date(now))?;
            let sql = compiler.compile_update(definition.source(), id, &row)?;
            debug!(class = definition.name(), %sql, "updating row");
            self.execute(&sql, Intent::Write).await?;
            instance.set_loaded("updated_at", Value::Date(now))?;
        }

        self.spawn_after_triggers(
            TriggerPhase::AfterSave,
            TriggerContext::for_instance(instance.clone(), opts.clone()),
            class,
        );
        Ok(instance)
    }

    /// Destroy a persisted instance.
    pub async fn destroy(
        &self,
        instance: ClassInstance,
        opts: &OperationOptions,
    ) -> Result<(), Error> {
        self.registry.freeze();
        let class = instance.class();
        let context = self
            .run_before_triggers(
                TriggerPhase::BeforeDestroy,
                TriggerContext::for_instance(instance, opts.clone()),
                class,
            )
            .await?;
        let instance = Self::instance_from(context)?;
        let id = Self::require_id(&instance)?;
        let definition = self.registry.definition(class)?;
        let compiler = SqlCompiler::new(self.driver.as_ref());

        let sql = compiler.compile_destroy(definition.source(), id, Utc::now())?;
        debug!(class = definition.name(), %sql, "destroying row");
        self.execute(&sql, Intent::Write).await?;

        self.spawn_after_triggers(
            TriggerPhase::AfterDestroy,
            TriggerContext::for_instance(instance, opts.clone()),
            class,
        );
        Ok(())
    }

    /// Store an increment marker on a numeric field.
    pub fn increment(
        &self,
        instance: &mut ClassInstance,
        key: &str,
        amount: f64,
    ) -> Result<(), Error> {
        instance.set(key, Value::Increment(Increment::by(amount)))
    }

    /// Build a batcher over a template query: the request-scoped building
    /// block for avoiding N+1 fetches.
    pub fn batcher(&self, query: Query) -> Batcher {
        Batcher {
            manager: self.clone(),
            query,
        }
    }

    // Internals

    async fn execute_find(
        &self,
        query: &Query,
        opts: &OperationOptions,
    ) -> Result<Collection, Error> {
        let options = query.to_query_options(opts.master)?;
        let compiler = SqlCompiler::new(self.driver.as_ref());
        let sql = compiler.compile(&options)?;
        debug!(%sql, "executing query");

        let rows = match self.execute(&sql, Intent::Read).await? {
            ExecuteResult::Rows(rows) => rows,
            _ => return Err(Error::database("driver returned no rows", sql)),
        };
        let items = rows
            .into_iter()
            .map(|row| self.materialize(query.class(), row))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Collection::new(items))
    }

    async fn execute(&self, sql: &str, intent: Intent) -> Result<ExecuteResult, Error> {
        self.driver.execute(sql, intent).await.map_err(|error| match error {
            wrapped @ Error::Database { .. } => wrapped,
            other => Error::database(other, sql),
        })
    }

    /// Materialize one row via the relation-aware column→field mapping.
    ///
    /// Plain output aliases land as storage values; `relation.field` aliases
    /// are grouped into a nested pointer carrying the joined attributes.
    fn materialize(&self, class: ClassId, row: KeyMap) -> Result<ClassInstance, Error> {
        let definition = self.registry.definition(class)?;
        let mut instance = ClassInstance::new(self.registry.clone(), class)?;
        let mut nested: Vec<(String, Vec<(String, Value)>)> = Vec::new();

        for (alias, value) in row.iter() {
            if alias == IDENTIFIER_KEY {
                if let Some(id) = value.as_i64() {
                    instance.assign_id(id);
                }
            } else if let Some((field, sub)) = alias.split_once('.') {
                match nested.iter_mut().find(|(f, _)| f == field) {
                    Some((_, entries)) => entries.push((sub.to_string(), value.clone())),
                    None => nested.push((
                        field.to_string(),
                        vec![(sub.to_string(), value.clone())],
                    )),
                }
            } else {
                instance.set_loaded(alias, value.clone())?;
            }
        }

        for (field, entries) in nested {
            let Some(relation) = definition.relation(&field) else {
                continue;
            };
            let id = entries
                .iter()
                .find(|(sub, _)| sub == IDENTIFIER_KEY)
                .and_then(|(_, v)| v.as_i64());
            match id {
                Some(id) => {
                    let mut attributes = serde_json::Map::new();
                    for (sub, value) in &entries {
                        if sub != IDENTIFIER_KEY {
                            attributes.insert(sub.clone(), value.to_wire());
                        }
                    }
                    instance.set_loaded(
                        &field,
                        Value::Pointer(Pointer::relation(
                            relation.target_class.clone(),
                            id,
                            attributes,
                        )),
                    )?;
                }
                // The outer join missed; the relation is absent.
                None => instance.set_loaded(&field, Value::Null)?,
            }
        }
        Ok(instance)
    }

    async fn run_before_triggers(
        &self,
        phase: TriggerPhase,
        context: TriggerContext,
        class: ClassId,
    ) -> Result<TriggerContext, Error> {
        let definition = self.registry.definition(class)?;
        let actions: Vec<_> = definition
            .triggers_for(phase)
            .map(|t| t.action.clone())
            .collect();
        let mut context = context;
        // Strictly sequential, in registration order; an error aborts the
        // surrounding operation.
        for action in actions {
            context = action(context).await?;
        }
        Ok(context)
    }

    fn spawn_after_triggers(
        &self,
        phase: TriggerPhase,
        context: TriggerContext,
        class: ClassId,
    ) {
        let Ok(definition) = self.registry.definition(class) else {
            return;
        };
        for trigger in definition.triggers_for(phase) {
            let action = trigger.action.clone();
            let context = context.clone();
            // Detached by contract: completion order relative to the caller
            // is unspecified, and the error channel ends here.
            tokio::spawn(async move {
                if let Err(error) = action(context).await {
                    tracing::warn!(%error, ?phase, "after-phase trigger failed");
                }
            });
        }
    }

    fn query_from(context: TriggerContext) -> Result<Query, Error> {
        context.query.ok_or_else(|| {
            Error::ForbiddenOperation("a before-phase trigger dropped the query".to_string())
        })
    }

    fn instance_from(context: TriggerContext) -> Result<ClassInstance, Error> {
        context.instance.ok_or_else(|| {
            Error::ForbiddenOperation("a before-phase trigger dropped the instance".to_string())
        })
    }

    fn require_id(instance: &ClassInstance) -> Result<i64, Error> {
        instance.id().ok_or_else(|| {
            Error::ForbiddenOperation("operation requires a persisted instance".to_string())
        })
    }
}

/// Loads batches of rows by identifier, preserving the requested order.
#[derive(Debug, Clone)]
pub struct Batcher {
    manager: ClassManager,
    query: Query,
}

impl Batcher {
    /// Fetch `ids` in one query and return results aligned with the input
    /// order, `None` where an id matched nothing.
    pub async fn load(
        &self,
        ids: &[i64],
        opts: &OperationOptions,
    ) -> Result<Vec<Option<ClassInstance>>, Error> {
        let query = self.query.clone().contained_in(
            IDENTIFIER_KEY,
            ids.iter().map(|&id| Value::Int(id)).collect(),
        )?;
        let items = self.manager.find(query, opts).await?.into_vec();
        Ok(ids
            .iter()
            .map(|&id| items.iter().find(|item| item.id() == Some(id)).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TriggerAction;
    use crate::driver::MemoryDriver;
    use crate::keys::{KeyManager, NumericMode};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn setup() -> (Arc<ClassRegistry>, Arc<MemoryDriver>, ClassManager, ClassId) {
        let registry = Arc::new(ClassRegistry::new());
        registry
            .declare("User", "user", |c| {
                c.key(KeyManager::string("name"))?;
                Ok(())
            })
            .unwrap();
        let post = registry
            .declare("Post", "post", |c| {
                c.key(KeyManager::string("title"))?
                    .key(KeyManager::number("views", NumericMode::Integer))?
                    .relation("author", "User")?;
                Ok(())
            })
            .unwrap();
        let driver = Arc::new(MemoryDriver::new());
        let manager = ClassManager::new(registry.clone(), driver.clone());
        (registry, driver, manager, post)
    }

    fn row(entries: Vec<(&str, Value)>) -> KeyMap {
        KeyMap::from_entries(entries.into_iter().map(|(k, v)| (k.to_string(), v)))
    }

    #[tokio::test]
    async fn test_save_new_assigns_id_and_timestamps() {
        let (registry, driver, manager, post) = setup();
        let mut instance = ClassInstance::new(registry, post).unwrap();
        instance.set("title", Value::from("hello")).unwrap();

        driver.push_inserted(42);
        let saved = manager.save(instance, &OperationOptions::default()).await.unwrap();

        assert_eq!(saved.id(), Some(42));
        assert!(matches!(saved.get("created_at").unwrap(), Some(Value::Date(_))));
        assert!(matches!(saved.get("updated_at").unwrap(), Some(Value::Date(_))));

        let (sql, intent) = driver.executed().pop().unwrap();
        assert_eq!(intent, Intent::Write);
        assert!(sql.starts_with("INSERT INTO `post`"));
        assert!(sql.contains("`created_at`"));
        assert!(sql.contains("`updated_at`"));
    }

    #[tokio::test]
    async fn test_save_existing_leaves_created_at_alone() {
        let (registry, driver, manager, post) = setup();
        let mut instance = ClassInstance::from_id(registry, post, 5).unwrap();
        instance.set("title", Value::from("edited")).unwrap();

        driver.push_done(1);
        let saved = manager.save(instance, &OperationOptions::default()).await.unwrap();
        assert_eq!(saved.id(), Some(5));

        let (sql, _) = driver.executed().pop().unwrap();
        assert!(sql.starts_with("UPDATE `post` SET"));
        assert!(sql.contains("`updated_at`"));
        assert!(!sql.contains("`created_at`"));
        assert!(sql.ends_with("WHERE `id` = 5"));
    }

    #[tokio::test]
    async fn test_before_save_abort_prevents_statement() {
        let (registry, driver, manager, post) = setup();
        let action: TriggerAction = Arc::new(|_ctx| {
            Box::pin(async move {
                Err(Error::ForbiddenOperation("username taken".to_string()))
            })
        });
        registry
            .register_trigger(post, TriggerPhase::BeforeSave, action)
            .unwrap();

        let instance = ClassInstance::new(registry, post).unwrap();
        let kept = instance.clone();
        let err = manager.save(instance, &OperationOptions::default()).await;

        assert!(matches!(err, Err(Error::ForbiddenOperation(_))));
        assert!(driver.executed().is_empty());
        assert!(kept.id().is_none());
    }

    #[tokio::test]
    async fn test_before_save_triggers_run_in_registration_order() {
        let (registry, driver, manager, post) = setup();
        let first: TriggerAction = Arc::new(|mut ctx| {
            Box::pin(async move {
                if let Some(instance) = ctx.instance.as_mut() {
                    instance.set("title", Value::from("first"))?;
                }
                Ok(ctx)
            })
        });
        let second: TriggerAction = Arc::new(|mut ctx| {
            Box::pin(async move {
                if let Some(instance) = ctx.instance.as_mut() {
                    instance.set("title", Value::from("second"))?;
                }
                Ok(ctx)
            })
        });
        registry.register_trigger(post, TriggerPhase::BeforeSave, first).unwrap();
        registry.register_trigger(post, TriggerPhase::BeforeSave, second).unwrap();

        let instance = ClassInstance::new(registry, post).unwrap();
        driver.push_inserted(1);
        let saved = manager.save(instance, &OperationOptions::default()).await.unwrap();
        assert_eq!(saved.get("title").unwrap(), Some(Value::from("second")));
    }

    #[tokio::test]
    async fn test_after_save_failure_is_swallowed() {
        let (registry, driver, manager, post) = setup();
        let fired = Arc::new(AtomicBool::new(false));
        let observer = fired.clone();
        let action: TriggerAction = Arc::new(move |_ctx| {
            let observer = observer.clone();
            Box::pin(async move {
                observer.store(true, Ordering::SeqCst);
                Err(Error::FunctionNotFound("webhook missing".to_string()))
            })
        });
        registry
            .register_trigger(post, TriggerPhase::AfterSave, action)
            .unwrap();

        let instance = ClassInstance::new(registry, post).unwrap();
        driver.push_inserted(7);
        let saved = manager.save(instance, &OperationOptions::default()).await.unwrap();
        assert_eq!(saved.id(), Some(7));

        // Give the detached task a chance to run; its failure must not have
        // affected the save result.
        for _ in 0..100 {
            if fired.load(Ordering::SeqCst) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_find_materializes_rows_and_pointers() {
        let (registry, driver, manager, post) = setup();
        driver.push_rows(vec![row(vec![
            ("id", Value::Int(1)),
            ("title", Value::from("hello")),
            ("author", Value::Int(7)),
            ("author.id", Value::Int(7)),
            ("author.name", Value::from("Ada")),
        ])]);

        let query = Query::new(registry, post).include("author").unwrap();
        let found = manager.find(query, &OperationOptions::default()).await.unwrap();
        assert_eq!(found.len(), 1);

        let instance = found.get(0).unwrap();
        assert_eq!(instance.id(), Some(1));
        assert_eq!(instance.get("title").unwrap(), Some(Value::from("hello")));

        let author = instance.get("author").unwrap().unwrap();
        let Value::Pointer(pointer) = author else {
            panic!("expected pointer");
        };
        assert_eq!(pointer.class_name, "User");
        assert_eq!(pointer.id, Some(7));
        assert_eq!(
            pointer.attributes.unwrap().get("name"),
            Some(&serde_json::Value::String("Ada".into()))
        );
    }

    #[tokio::test]
    async fn test_missed_join_materializes_null_relation() {
        let (registry, driver, manager, post) = setup();
        driver.push_rows(vec![row(vec![
            ("id", Value::Int(1)),
            ("author.id", Value::Null),
            ("author.name", Value::Null),
        ])]);

        let query = Query::new(registry, post).include("author").unwrap();
        let found = manager.find(query, &OperationOptions::default()).await.unwrap();
        assert_eq!(found.get(0).unwrap().get("author").unwrap(), Some(Value::Null));
    }

    #[tokio::test]
    async fn test_first_returns_none_without_error() {
        let (registry, _driver, manager, post) = setup();
        let query = Query::new(registry, post);
        let result = manager.first(query, &OperationOptions::default()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_first_enforces_limit_one() {
        let (registry, driver, manager, post) = setup();
        let query = Query::new(registry, post);
        manager.first(query, &OperationOptions::default()).await.unwrap();
        let (sql, _) = driver.executed().pop().unwrap();
        assert!(sql.ends_with("LIMIT 0, 1"));
    }

    #[tokio::test]
    async fn test_get_by_id_builds_equality_query() {
        let (registry, driver, manager, post) = setup();
        driver.push_rows(vec![row(vec![("id", Value::Int(9))])]);

        let found = manager
            .get_by_id(post, 9, &[], &[], &OperationOptions::default())
            .await
            .unwrap();
        assert_eq!(found.unwrap().id(), Some(9));

        let (sql, _) = driver.executed().pop().unwrap();
        assert!(sql.contains("`post`.`id` = 9"));
        assert!(sql.contains("`post`.`deleted_at` IS NULL"));
    }

    #[tokio::test]
    async fn test_destroy_soft_deletes_by_id() {
        let (registry, driver, manager, post) = setup();
        let instance = ClassInstance::from_id(registry, post, 4).unwrap();

        driver.push_done(1);
        manager.destroy(instance, &OperationOptions::default()).await.unwrap();

        let (sql, intent) = driver.executed().pop().unwrap();
        assert_eq!(intent, Intent::Write);
        assert!(sql.starts_with("UPDATE `post` SET `deleted_at` = "));
        assert!(sql.ends_with("WHERE `id` = 4"));
    }

    #[tokio::test]
    async fn test_destroy_unsaved_is_forbidden() {
        let (registry, _driver, manager, post) = setup();
        let instance = ClassInstance::new(registry, post).unwrap();
        let err = manager.destroy(instance, &OperationOptions::default()).await;
        assert!(matches!(err, Err(Error::ForbiddenOperation(_))));
    }

    #[tokio::test]
    async fn test_batcher_preserves_input_order() {
        let (registry, driver, manager, post) = setup();
        driver.push_rows(vec![
            row(vec![("id", Value::Int(1))]),
            row(vec![("id", Value::Int(3))]),
        ]);

        let batcher = manager.batcher(Query::new(registry, post));
        let results = batcher
            .load(&[3, 2, 1], &OperationOptions::default())
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().and_then(|i| i.id()), Some(3));
        assert!(results[1].is_none());
        assert_eq!(results[2].as_ref().and_then(|i| i.id()), Some(1));

        let (sql, _) = driver.executed().pop().unwrap();
        assert!(sql.contains("`post`.`id` IN (3, 2, 1)"));
    }

    #[tokio::test]
    async fn test_increment_then_save_renders_expression() {
        let (registry, driver, manager, post) = setup();
        let mut instance = ClassInstance::from_id(registry, post, 8).unwrap();
        manager.increment(&mut instance, "views", 1.0).unwrap();

        driver.push_done(1);
        manager.save(instance, &OperationOptions::default()).await.unwrap();

        let (sql, _) = driver.executed().pop().unwrap();
        assert!(sql.contains("`views` = GREATEST(IFNULL(`views`, 0) + (1), 0)"));
    }

    #[tokio::test]
    async fn test_manager_use_closes_registry() {
        let (registry, _driver, manager, post) = setup();
        manager
            .find(Query::new(registry.clone(), post), &OperationOptions::default())
            .await
            .unwrap();

        assert!(registry.is_frozen());
        let err = registry.declare("Late", "late", |_| Ok(()));
        assert!(matches!(err, Err(Error::MissingConfiguration(_))));
    }

    #[tokio::test]
    async fn test_driver_failure_is_wrapped_with_statement() {
        let (registry, driver, manager, post) = setup();
        driver.push_failure("server has gone away");

        let err = manager
            .find(Query::new(registry, post), &OperationOptions::default())
            .await
            .unwrap_err();
        let Error::Database { message, statement } = err else {
            panic!("expected database error");
        };
        assert!(message.contains("server has gone away"));
        assert!(statement.starts_with("SELECT"));
    }
}
