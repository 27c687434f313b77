//! Process-wide ORM context.
//!
//! An [`Orm`] owns the configuration, one lazily created [`DbService`] per named database,
//! the association registry, the event bus and the scope registry. Chains and records hold
//! a handle to it instead of reaching for globals.

use crate::config::{DatabaseConfig, ModelConfig, OrmConfig};
use crate::error::{OrmError, OrmResult};
use crate::events::{EventBus, EventKind, ModelEvent};
use crate::exec::Executor;
use crate::model::ModelChain;
use crate::relation::{AssociationRegistry, Associations};
use crate::service::DbService;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Creates the service for a configured database on first use.
pub trait ServiceFactory: Send + Sync {
    fn create(&self, database: &DatabaseConfig) -> OrmResult<Arc<dyn DbService>>;
}

impl<F> ServiceFactory for F
where
    F: Fn(&DatabaseConfig) -> OrmResult<Arc<dyn DbService>> + Send + Sync,
{
    fn create(&self, database: &DatabaseConfig) -> OrmResult<Arc<dyn DbService>> {
        self(database)
    }
}

/// Creates a deadpool-backed [`PgService`](crate::pg::PgService) per database.
#[cfg(feature = "pool")]
#[derive(Debug, Clone, Copy, Default)]
pub struct PgServiceFactory;

#[cfg(feature = "pool")]
impl ServiceFactory for PgServiceFactory {
    fn create(&self, database: &DatabaseConfig) -> OrmResult<Arc<dyn DbService>> {
        Ok(Arc::new(crate::pg::PgService::from_config(database)?))
    }
}

/// A named, reusable chain fragment applied with [`ModelChain::scope`].
pub type ScopeFn = Arc<dyn Fn(&mut ModelChain, &[Value]) -> OrmResult<()> + Send + Sync>;

pub struct Orm {
    config: OrmConfig,
    factory: Option<Box<dyn ServiceFactory>>,
    services: RwLock<HashMap<String, Arc<dyn DbService>>>,
    associations: AssociationRegistry,
    events: EventBus,
    scopes: RwLock<HashMap<(String, String), ScopeFn>>,
    executor: Executor,
}

impl fmt::Debug for Orm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Orm")
            .field("databases", &self.config.databases.len())
            .field("connected", &services.keys().collect::<Vec<_>>())
            .field("events", &self.events)
            .finish()
    }
}

impl Orm {
    pub fn builder(config: OrmConfig) -> OrmBuilder {
        OrmBuilder::new(config)
    }

    /// Context over PostgreSQL pools created from `config`.
    #[cfg(feature = "pool")]
    pub fn connect(config: OrmConfig) -> OrmResult<Arc<Self>> {
        Self::builder(config).service_factory(PgServiceFactory).build()
    }

    pub fn config(&self) -> &OrmConfig {
        &self.config
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn associations(&self) -> &AssociationRegistry {
        &self.associations
    }

    /// Name of the default database.
    pub fn default_db(&self) -> OrmResult<&str> {
        Ok(self.config.default_database()?.name.as_str())
    }

    /// The service for database `name`, created on first use.
    pub fn service(&self, name: &str) -> OrmResult<Arc<dyn DbService>> {
        if let Some(svc) = self
            .services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(svc.clone());
        }

        let database = self.config.database(name)?;
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        // another caller may have won the race while we waited for the write lock
        if let Some(svc) = services.get(name) {
            return Ok(svc.clone());
        }
        let factory = self.factory.as_ref().ok_or_else(|| {
            OrmError::Config(format!("no service registered for database: {name}"))
        })?;
        let svc = factory.create(database)?;
        tracing::info!(target: "chainorm.context", database = name, "database service created");
        services.insert(name.to_string(), svc.clone());
        Ok(svc)
    }

    /// A fresh chain for `table` on its configured database.
    pub fn model(self: &Arc<Self>, table: &str) -> OrmResult<ModelChain> {
        self.model_with(table, self.config.model_config(table))
    }

    /// A fresh chain for `table` with explicit chain options.
    pub fn model_with(self: &Arc<Self>, table: &str, config: ModelConfig) -> OrmResult<ModelChain> {
        let db = match &config.db {
            Some(db) => db.clone(),
            None => self.default_db()?.to_string(),
        };
        let service = self.service(&db)?;
        ModelChain::new(self.clone(), service, table, &db, config)
    }

    /// A fresh chain for `table` on database `db`, using the table's configured options.
    pub fn model_in(self: &Arc<Self>, table: &str, db: &str) -> OrmResult<ModelChain> {
        self.model_with(table, self.config.model_config(table).db(db))
    }

    /// Register `table`'s associations. The first registration wins.
    pub fn associate(&self, table: &str, associations: Associations) -> bool {
        self.associations.register(table, associations)
    }

    /// Subscribe to `<table>.<kind>` events.
    pub fn on<F>(&self, table: &str, kind: EventKind, listener: F)
    where
        F: Fn(&ModelEvent<'_>) + Send + Sync + 'static,
    {
        self.events.on(table, kind, listener);
    }

    /// Register a named scope for `table`, replacing any previous one of that name.
    pub fn register_scope<F>(&self, table: &str, name: &str, scope: F)
    where
        F: Fn(&mut ModelChain, &[Value]) -> OrmResult<()> + Send + Sync + 'static,
    {
        self.scopes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((table.to_string(), name.to_string()), Arc::new(scope));
    }

    pub fn scope(&self, table: &str, name: &str) -> Option<ScopeFn> {
        self.scopes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(table.to_string(), name.to_string()))
            .cloned()
    }
}

pub struct OrmBuilder {
    config: OrmConfig,
    factory: Option<Box<dyn ServiceFactory>>,
    services: HashMap<String, Arc<dyn DbService>>,
    associations: Vec<(String, Associations)>,
    executor: Option<Executor>,
}

impl OrmBuilder {
    pub fn new(config: OrmConfig) -> Self {
        Self {
            config,
            factory: None,
            services: HashMap::new(),
            associations: Vec::new(),
            executor: None,
        }
    }

    pub fn service_factory(mut self, factory: impl ServiceFactory + 'static) -> Self {
        self.factory = Some(Box::new(factory));
        self
    }

    /// Pre-register the service for database `name`.
    pub fn service(mut self, name: &str, service: Arc<dyn DbService>) -> Self {
        self.services.insert(name.to_string(), service);
        self
    }

    pub fn associate(mut self, table: &str, associations: Associations) -> Self {
        self.associations.push((table.to_string(), associations));
        self
    }

    /// Override the executor derived from the config.
    pub fn executor(mut self, executor: Executor) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn build(self) -> OrmResult<Arc<Orm>> {
        self.config.validate()?;
        for name in self.services.keys() {
            self.config.database(name)?;
        }

        let associations = AssociationRegistry::new();
        for (table, assoc) in self.associations {
            associations.register(&table, assoc);
        }
        let executor = self
            .executor
            .unwrap_or_else(|| Executor::from_config(&self.config));

        Ok(Arc::new(Orm {
            config: self.config,
            factory: self.factory,
            services: RwLock::new(self.services),
            associations,
            events: EventBus::new(),
            scopes: RwLock::new(HashMap::new()),
            executor,
        }))
    }
}
