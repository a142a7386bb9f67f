mod common;

use std::sync::Arc;

use common::{Clock, Fixture, registry_builder};
use entmut::{
    client::{Client, MutationBuilder},
    context::Context,
    core::{
        cond::{self, reject},
        hook::{Hook, HookChain, execute, hook_fn},
        mutation::Mutation,
    },
    entity::Outcome,
    error::Error,
    op::Op,
    persist::{Driver, sqlite::SqliteDriver},
    types::Value,
};
use parking_lot::Mutex;

type Log = Arc<Mutex<Vec<String>>>;

fn recorder(name: &'static str, log: &Log) -> Arc<dyn Hook> {
    let log = log.clone();
    Arc::new(hook_fn(move |ctx, m, next| {
        log.lock().push(format!("{name}-before"));
        let out = next.run(ctx, m);
        log.lock().push(format!("{name}-after"));
        out
    }))
}

#[test]
fn global_then_entity_then_schema_hooks() {
    let log: Log = Arc::default();
    let clock = Clock::default();
    let schema_hook = recorder("schema", &log);

    let mut tag = common::tag();
    tag.hooks.push(schema_hook);
    let registry = Arc::new(
        entmut::schema::Registry::builder()
            .entity(common::project())
            .entity(common::application())
            .entity(tag)
            .provider("Project", "createTime", move || Value::Time(clock.now()))
            .build()
            .expect("registry"),
    );
    let driver = SqliteDriver::open_in_memory().expect("open");
    driver.create_schema(&registry).expect("schema");
    let driver: Arc<dyn Driver> = Arc::new(driver);

    let client = Client::builder(registry, driver)
        .use_hooks([recorder("global", &log)])
        .entity_hooks("Tag", [recorder("entity", &log)])
        .build()
        .expect("client");

    client
        .entity("Tag")
        .expect("entity")
        .create()
        .set("name", "red")
        .exec(&Context::background())
        .expect("create");

    assert_eq!(
        *log.lock(),
        [
            "global-before",
            "entity-before",
            "schema-before",
            "schema-after",
            "entity-after",
            "global-after",
        ]
    );
}

#[test]
fn hooks_for_unknown_entities_fail_the_build() {
    let clock = Clock::default();
    let registry = Arc::new(registry_builder(&clock).build().expect("registry"));
    let driver: Arc<dyn Driver> = Arc::new(SqliteDriver::open_in_memory().expect("open"));
    let err = Client::builder(registry, driver)
        .entity_hook("Nope", reject(Op::CREATE))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn hook_edits_are_persisted() {
    let fx = Fixture::with(|builder| {
        builder.entity_hook(
            "Project",
            hook_fn(|ctx, m, next| {
                if m.field("description").is_none() {
                    m.set_field("description", "set by hook");
                }
                next.run(ctx, m)
            }),
        )
    });
    let projects = fx.client.entity("Project").expect("entity");
    let created = projects
        .create()
        .set("name", "apollo")
        .save(&fx.ctx)
        .expect("create");
    let stored = projects.get(&fx.ctx, created.id).expect("get");
    assert_eq!(stored.get_str("description"), Some("set by hook"));
}

#[test]
fn invalid_values_from_hooks_are_caught_before_the_write() {
    let fx = Fixture::with(|builder| {
        builder.entity_hook(
            "Project",
            hook_fn(|ctx, m, next| {
                m.set_field("name", "");
                next.run(ctx, m)
            }),
        )
    });
    let err = fx
        .client
        .entity("Project")
        .expect("entity")
        .create()
        .set("name", "apollo")
        .exec(&fx.ctx)
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(fx.statements(), 0);
}

#[test]
fn reject_hook_blocks_only_its_operations() {
    let fx = Fixture::with(|builder| builder.entity_hook("Tag", reject(Op::DELETE | Op::DELETE_ONE)));
    let tags = fx.client.entity("Tag").expect("entity");
    let tag = tags.create().set("name", "red").save(&fx.ctx).expect("create");

    let err = tags.delete_one(&tag).exec(&fx.ctx).unwrap_err();
    assert!(matches!(err, Error::Rejected(_)));
    assert_eq!(err.to_string(), "entmut: Delete|DeleteOne operation is not allowed");
    assert!(tags.get(&fx.ctx, tag.id).is_ok());
}

#[test]
fn conditional_hooks_see_changed_fields() {
    let log: Log = Arc::default();
    let hook = cond::when(
        recorder("description", &log),
        cond::and([cond::has_op(Op::UPDATE_ONE), cond::has_fields(&["description"])]),
    );
    let fx = Fixture::with(|builder| builder.entity_hook("Project", hook));
    let projects = fx.client.entity("Project").expect("entity");
    let created = projects
        .create()
        .set("name", "apollo")
        .set("description", "v1")
        .save(&fx.ctx)
        .expect("create");
    assert!(log.lock().is_empty());

    projects
        .update_one(&created)
        .set("name", "gemini")
        .exec(&fx.ctx)
        .expect("rename");
    assert!(log.lock().is_empty());

    projects
        .update_one(&created)
        .set("description", "v2")
        .exec(&fx.ctx)
        .expect("describe");
    assert_eq!(*log.lock(), ["description-before", "description-after"]);
}

#[test]
fn short_circuit_hook_skips_the_core() {
    let fx = Fixture::with(|builder| {
        builder.entity_hook(
            "Tag",
            hook_fn(|_, _, _| Ok(Outcome::Affected(0))),
        )
    });
    let tags = fx.client.entity("Tag").expect("entity");
    let n = tags.delete().exec(&fx.ctx).expect("delete");
    assert_eq!(n, 0);
    assert_eq!(fx.statements(), 0);
}

#[test]
fn done_mutation_is_never_executed_twice() {
    let ctx = Context::background();
    let writes = Arc::new(Mutex::new(0usize));
    let counter = writes.clone();
    let mut core = move |_: &Context, _: &mut Mutation| -> entmut::error::Result<Outcome> {
        *counter.lock() += 1;
        Ok(Outcome::Affected(1))
    };

    let mut m = Mutation::new("Tag", Op::DELETE);
    execute(&ctx, &mut m, &[], &mut core).expect("first run");
    assert!(m.is_done());

    let err = execute(&ctx, &mut m, &[], &mut core).unwrap_err();
    assert!(matches!(err, Error::AlreadyExecuted));
    assert_eq!(*writes.lock(), 1);
}

#[test]
fn chains_compose_as_single_hooks() {
    let log: Log = Arc::default();
    let inner = HookChain::new([recorder("b", &log), recorder("c", &log)]);
    let hooks: Vec<Arc<dyn Hook>> = vec![recorder("a", &log), Arc::new(inner), recorder("d", &log)];

    let mut m = Mutation::new("Tag", Op::CREATE);
    execute(&Context::background(), &mut m, &hooks, |_, _| {
        Ok(Outcome::Affected(0))
    })
    .expect("run");

    assert_eq!(
        *log.lock(),
        [
            "a-before", "b-before", "c-before", "d-before", "d-after", "c-after", "b-after",
            "a-after",
        ]
    );
}
