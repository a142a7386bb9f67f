#![allow(dead_code)]

use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use entmut::{
    client::{Client, ClientBuilder},
    context::Context,
    persist::{Driver, sqlite::SqliteDriver},
    schema::{
        EdgeDescriptor, EntityDescriptor, FieldDescriptor, JoinDescriptor, Registry,
        RegistryBuilder, validate,
    },
    types::Value,
};

/// Manually advanced clock shared by every timestamp provider.
#[derive(Clone, Default)]
pub struct Clock(Arc<AtomicU64>);

impl Clock {
    pub fn set(&self, ms: u64) {
        self.0.store(ms, Ordering::SeqCst);
    }

    pub fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    fn provider(&self) -> impl Fn() -> Value + Send + Sync + 'static {
        let clock = self.clone();
        move || Value::Time(clock.now())
    }
}

pub fn project() -> EntityDescriptor {
    EntityDescriptor::new("Project", "projects")
        .field(FieldDescriptor::string("name").unique().validate(validate::not_empty()))
        .field(FieldDescriptor::string("description").optional())
        .field(FieldDescriptor::time("createTime").immutable().default_provider())
        .field(
            FieldDescriptor::time("updateTime")
                .default_provider()
                .update_provider(),
        )
        .field(FieldDescriptor::json("labels").optional())
        .edge(EdgeDescriptor::o2m("applications", "Application", "project_id"))
}

pub fn application() -> EntityDescriptor {
    EntityDescriptor::new("Application", "applications")
        .field(FieldDescriptor::string("name"))
        .field(FieldDescriptor::int("replicas").default_value(1i64))
        .edge(EdgeDescriptor::m2o("project", "Project", "project_id"))
        .edge(EdgeDescriptor::m2m(
            "tags",
            "Tag",
            JoinDescriptor::new("application_tags", "application_id", "tag_id")
                .field(FieldDescriptor::time("createTime").default_provider()),
        ))
}

pub fn tag() -> EntityDescriptor {
    EntityDescriptor::new("Tag", "tags").field(FieldDescriptor::string("name").unique())
}

/// Registry builder with every fixture entity and clock-backed providers.
pub fn registry_builder(clock: &Clock) -> RegistryBuilder {
    Registry::builder()
        .entity(project())
        .entity(application())
        .entity(tag())
        .provider("Project", "createTime", clock.provider())
        .provider("Project", "updateTime", clock.provider())
        .update_provider("Project", "updateTime", clock.provider())
        .provider("application_tags", "createTime", clock.provider())
}

pub struct Fixture {
    pub clock: Clock,
    pub driver: Arc<SqliteDriver>,
    pub client: Client,
    pub ctx: Context,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with(|builder| builder)
    }

    /// In-memory fixture whose client builder is adjusted by `hooks`.
    pub fn with(hooks: impl FnOnce(ClientBuilder) -> ClientBuilder) -> Self {
        let driver = SqliteDriver::open_in_memory().expect("open sqlite");
        Self::from_driver(driver, hooks)
    }

    pub fn on_disk(path: &Path) -> Self {
        let driver = SqliteDriver::open(path).expect("open sqlite file");
        Self::from_driver(driver, |builder| builder)
    }

    fn from_driver(driver: SqliteDriver, hooks: impl FnOnce(ClientBuilder) -> ClientBuilder) -> Self {
        let clock = Clock::default();
        clock.set(1_000);
        let registry = Arc::new(registry_builder(&clock).build().expect("registry"));
        driver.create_schema(&registry).expect("schema");
        let driver = Arc::new(driver);
        let dyn_driver: Arc<dyn Driver> = driver.clone();
        let client = hooks(Client::builder(registry, dyn_driver))
            .build()
            .expect("client");
        Self {
            clock,
            driver,
            client,
            ctx: Context::background(),
        }
    }

    pub fn statements(&self) -> u64 {
        self.driver.stats().statements
    }
}
