mod common;

use std::sync::Arc;

use common::{Fixture, tag};
use entmut::{
    client::{Client, MutationBuilder},
    context::Context,
    core::intercept::{QueryKind, QueryOutput, intercept_fn},
    error::Error,
    persist::{Driver, sqlite::SqliteDriver},
    schema::Registry,
    spec::predicate,
};
use parking_lot::Mutex;

#[test]
fn interceptors_run_global_then_entity_then_schema() {
    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    let recorder = |name: &'static str| {
        let log = log.clone();
        intercept_fn(move |ctx, q, next| {
            log.lock().push(format!("{name}:{:?}", q.kind()));
            next.run(ctx, q)
        })
    };

    let registry = Arc::new(
        Registry::builder()
            .entity(tag().interceptor(recorder("schema")))
            .build()
            .expect("registry"),
    );
    let driver = SqliteDriver::open_in_memory().expect("open");
    driver.create_schema(&registry).expect("schema");
    let driver: Arc<dyn Driver> = Arc::new(driver);
    let client = Client::builder(registry, driver)
        .entity_interceptor("Tag", recorder("entity"))
        .use_interceptor(recorder("global"))
        .build()
        .expect("client");
    assert_eq!(client.entity("Tag").expect("entity").interceptors().len(), 3);

    let ctx = Context::background();
    let tags = client.entity("Tag").expect("entity");
    let created = tags.create().set("name", "a").save(&ctx).expect("create");
    assert!(log.lock().is_empty(), "writes bypass interceptors");

    tags.get(&ctx, created.id).expect("get");
    tags.query().count(&ctx).expect("count");
    assert_eq!(
        *log.lock(),
        [
            "global:All",
            "entity:All",
            "schema:All",
            "global:Count",
            "entity:Count",
            "schema:Count",
        ]
    );
}

#[test]
fn filtering_interceptor_hides_rows_from_every_read() {
    let fx = Fixture::with(|builder| {
        builder.entity_interceptor(
            "Tag",
            intercept_fn(|ctx, q, next| {
                q.filter(predicate::not(predicate::has_prefix("name", "hidden-")));
                next.run(ctx, q)
            }),
        )
    });
    let tags = fx.client.entity("Tag").expect("entity");
    tags.create().set("name", "shown").exec(&fx.ctx).expect("create");
    let hidden = tags
        .create()
        .set("name", "hidden-1")
        .save(&fx.ctx)
        .expect("create");

    let names: Vec<String> = tags
        .query()
        .all(&fx.ctx)
        .expect("all")
        .into_iter()
        .filter_map(|t| t.get_str("name").map(str::to_string))
        .collect();
    assert_eq!(names, vec!["shown"]);
    assert_eq!(tags.query().count(&fx.ctx).expect("count"), 1);
    assert!(tags.get(&fx.ctx, hidden.id.clone()).unwrap_err().is_not_found());

    // Updates and deletes still reach the hidden row.
    tags.update_one(&hidden)
        .set("name", "hidden-2")
        .exec(&fx.ctx)
        .expect("update");
    tags.delete_one(&hidden).exec(&fx.ctx).expect("delete");
}

#[test]
fn interceptor_can_answer_without_the_driver() {
    let fx = Fixture::with(|builder| {
        builder.use_interceptor(intercept_fn(|ctx, q, next| match q.kind() {
            QueryKind::Count => Ok(QueryOutput::Count(42)),
            QueryKind::All if q.entity() == "Project" => {
                Err(Error::Rejected("projects are not listed".to_string()))
            }
            QueryKind::All => next.run(ctx, q),
        }))
    });

    let before = fx.statements();
    let tags = fx.client.entity("Tag").expect("entity");
    assert_eq!(tags.query().count(&fx.ctx).expect("count"), 42);
    let err = fx
        .client
        .entity("Project")
        .expect("entity")
        .query()
        .all(&fx.ctx)
        .unwrap_err();
    assert_eq!(err.to_string(), "entmut: projects are not listed");
    assert_eq!(fx.statements(), before);

    assert!(tags.query().all(&fx.ctx).expect("all").is_empty());
}

#[test]
fn interceptor_predicates_are_checked_against_the_table() {
    let fx = Fixture::with(|builder| {
        builder.entity_interceptor(
            "Tag",
            intercept_fn(|ctx, q, next| {
                q.filter(predicate::is_null("deleted_at"));
                next.run(ctx, q)
            }),
        )
    });

    let before = fx.statements();
    let err = fx
        .client
        .entity("Tag")
        .expect("entity")
        .query()
        .all(&fx.ctx)
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(fx.statements(), before);
}

#[test]
fn interceptors_for_unknown_entities_fail_the_build() {
    let clock = common::Clock::default();
    let registry = Arc::new(common::registry_builder(&clock).build().expect("registry"));
    let driver: Arc<dyn Driver> = Arc::new(SqliteDriver::open_in_memory().expect("open"));
    let err = Client::builder(registry, driver)
        .entity_interceptor("Ghost", intercept_fn(|ctx, q, next| next.run(ctx, q)))
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
