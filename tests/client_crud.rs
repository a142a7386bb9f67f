mod common;

use std::error::Error as _;

use common::Fixture;
use entmut::{
    client::MutationBuilder,
    error::Error,
    persist::DriverError,
    spec::{Direction, predicate},
    types::Value,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[test]
fn project_created_with_name_only_gets_provider_timestamps() {
    let fx = Fixture::new();
    fx.clock.set(42);
    let projects = fx.client.entity("Project").expect("entity");

    let created = projects
        .create()
        .set("name", "apollo")
        .save(&fx.ctx)
        .expect("create");
    assert_eq!(created.get_time("createTime"), Some(42));
    assert_eq!(created.get_time("updateTime"), Some(42));
    assert_eq!(created.get("description"), Some(&Value::Null));

    let loaded = projects.get(&fx.ctx, created.id.clone()).expect("get");
    assert_eq!(loaded, created);
}

#[test]
fn update_one_bumps_update_time_and_keeps_create_time() {
    let fx = Fixture::new();
    let projects = fx.client.entity("Project").expect("entity");
    let created = projects
        .create()
        .set("name", "apollo")
        .save(&fx.ctx)
        .expect("create");

    fx.clock.set(2_000);
    let updated = projects
        .update_one(&created)
        .set("description", "moon")
        .save(&fx.ctx)
        .expect("update");

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.get_time("createTime"), Some(1_000));
    assert_eq!(updated.get_time("updateTime"), Some(2_000));
    assert_eq!(updated.get_str("description"), Some("moon"));
}

#[test]
fn missing_required_field_fails_before_any_statement() {
    let fx = Fixture::new();
    let projects = fx.client.entity("Project").expect("entity");

    let err = projects
        .create()
        .set("description", "no name")
        .save(&fx.ctx)
        .unwrap_err();

    match &err {
        Error::Validation { field, .. } => assert_eq!(field, "name"),
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(fx.statements(), 0);
}

#[test]
fn validators_and_types_are_checked() {
    let fx = Fixture::new();
    let projects = fx.client.entity("Project").expect("entity");

    let err = projects.create().set("name", "").save(&fx.ctx).unwrap_err();
    assert!(err.is_validation());

    let err = projects
        .create()
        .set("name", "typed")
        .set("updateTime", "yesterday")
        .save(&fx.ctx)
        .unwrap_err();
    assert!(err.is_validation());

    let err = projects
        .create()
        .set("name", "unknown")
        .set("owner", "bob")
        .save(&fx.ctx)
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(fx.statements(), 0);
}

#[test]
fn update_one_and_delete_one_on_unknown_id_are_not_found() {
    let fx = Fixture::new();
    let projects = fx.client.entity("Project").expect("entity");

    let err = projects
        .update_one_id("missing")
        .set("description", "x")
        .save(&fx.ctx)
        .unwrap_err();
    assert!(err.is_not_found(), "got {err:?}");
    assert_eq!(err.to_string(), "entmut: Project not found");

    let err = projects.delete_one_id("missing").exec(&fx.ctx).unwrap_err();
    assert!(err.is_not_found(), "got {err:?}");
}

#[test]
fn unique_violation_is_a_constraint_error_reaching_sqlite() {
    let fx = Fixture::new();
    let projects = fx.client.entity("Project").expect("entity");
    projects
        .create()
        .set("name", "dup")
        .exec(&fx.ctx)
        .expect("first");

    let err = projects
        .create()
        .set("name", "dup")
        .exec(&fx.ctx)
        .unwrap_err();
    assert!(err.is_constraint(), "got {err:?}");

    let mut source = err.source();
    let mut reached_sqlite = false;
    while let Some(cause) = source {
        if cause.downcast_ref::<rusqlite::Error>().is_some() {
            reached_sqlite = true;
        }
        source = cause.source();
    }
    assert!(reached_sqlite);
}

#[test]
fn update_many_and_delete_many_report_counts() {
    let fx = Fixture::new();
    let apps = fx.client.entity("Application").expect("entity");
    for (name, replicas) in [("api", 1i64), ("web", 3), ("worker", 5)] {
        apps.create()
            .set("name", name)
            .set("replicas", replicas)
            .exec(&fx.ctx)
            .expect("create");
    }

    let n = apps
        .update()
        .where_(predicate::gte("replicas", 3i64))
        .set("replicas", 10i64)
        .save(&fx.ctx)
        .expect("update");
    assert_eq!(n, 2);
    assert_eq!(
        apps.query()
            .where_(predicate::eq("replicas", 10i64))
            .count(&fx.ctx)
            .expect("count"),
        2
    );

    let n = apps
        .delete()
        .where_(predicate::has_prefix("name", "w"))
        .exec(&fx.ctx)
        .expect("delete");
    assert_eq!(n, 2);
    assert_eq!(apps.query().count(&fx.ctx).expect("count"), 1);
}

#[test]
fn update_many_with_no_match_is_zero_not_an_error() {
    let fx = Fixture::new();
    let apps = fx.client.entity("Application").expect("entity");
    let n = apps
        .update()
        .where_(predicate::eq("name", "ghost"))
        .set("replicas", 2i64)
        .save(&fx.ctx)
        .expect("update");
    assert_eq!(n, 0);
}

#[test]
fn static_defaults_fill_unset_fields() {
    let fx = Fixture::new();
    let apps = fx.client.entity("Application").expect("entity");
    let app = apps.create().set("name", "api").save(&fx.ctx).expect("create");
    assert_eq!(app.get("replicas"), Some(&Value::Int(1)));
}

#[test]
fn immutable_field_cannot_be_updated() {
    let fx = Fixture::new();
    let projects = fx.client.entity("Project").expect("entity");
    let created = projects
        .create()
        .set("name", "apollo")
        .save(&fx.ctx)
        .expect("create");
    let before = fx.statements();

    let err = projects
        .update_one(&created)
        .set("createTime", Value::Time(1))
        .save(&fx.ctx)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "entmut: validation failed for field \"createTime\": field createTime is immutable"
    );
    assert_eq!(fx.statements(), before);
}

#[test]
fn clear_and_append_on_update() {
    let fx = Fixture::new();
    let projects = fx.client.entity("Project").expect("entity");
    let created = projects
        .create()
        .set("name", "apollo")
        .set("description", "moon")
        .save(&fx.ctx)
        .expect("create");

    let updated = projects
        .update_one(&created)
        .clear("description")
        .append("labels", [json!("a"), json!({"k": 1})])
        .save(&fx.ctx)
        .expect("update");
    assert_eq!(updated.get("description"), Some(&Value::Null));
    assert_eq!(updated.get("labels"), Some(&Value::Json(json!(["a", {"k": 1}]))));

    let updated = projects
        .update_one(&created)
        .append("labels", [json!("b")])
        .save(&fx.ctx)
        .expect("append again");
    assert_eq!(
        updated.get("labels"),
        Some(&Value::Json(json!(["a", {"k": 1}, "b"])))
    );

    let err = projects
        .update_one(&created)
        .clear("name")
        .save(&fx.ctx)
        .unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn update_one_select_limits_read_back() {
    let fx = Fixture::new();
    let projects = fx.client.entity("Project").expect("entity");
    let created = projects
        .create()
        .set("name", "apollo")
        .save(&fx.ctx)
        .expect("create");

    let updated = projects
        .update_one(&created)
        .set("description", "moon")
        .select(["name"])
        .save(&fx.ctx)
        .expect("update");
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.fields.len(), 1);
    assert_eq!(updated.get_str("name"), Some("apollo"));

    let err = projects
        .update_one(&created)
        .set("description", "x")
        .select(["bogus"])
        .save(&fx.ctx)
        .unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn update_one_guard_predicate_miss_is_not_found() {
    let fx = Fixture::new();
    let projects = fx.client.entity("Project").expect("entity");
    let created = projects
        .create()
        .set("name", "apollo")
        .save(&fx.ctx)
        .expect("create");

    let err = projects
        .update_one(&created)
        .where_(predicate::eq("name", "gemini"))
        .set("description", "x")
        .save(&fx.ctx)
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn query_order_limit_offset_and_singletons() {
    let fx = Fixture::new();
    let apps = fx.client.entity("Application").expect("entity");
    for (name, replicas) in [("c", 3i64), ("a", 1), ("b", 2)] {
        apps.create()
            .set("name", name)
            .set("replicas", replicas)
            .exec(&fx.ctx)
            .expect("create");
    }

    let names: Vec<String> = apps
        .query()
        .order_by("name", Direction::Desc)
        .offset(1)
        .limit(2)
        .all(&fx.ctx)
        .expect("all")
        .iter()
        .filter_map(|e| e.get_str("name").map(str::to_string))
        .collect();
    assert_eq!(names, ["b", "a"]);

    let first = apps
        .query()
        .order_by("replicas", Direction::Asc)
        .first(&fx.ctx)
        .expect("first");
    assert_eq!(first.get_str("name"), Some("a"));

    let err = apps.query().only(&fx.ctx).unwrap_err();
    assert!(err.is_not_singular());
    let err = apps
        .query()
        .where_(predicate::eq("name", "zzz"))
        .only(&fx.ctx)
        .unwrap_err();
    assert!(err.is_not_found());

    assert!(apps.query().where_(predicate::eq("name", "a")).exist(&fx.ctx).expect("exist"));
    assert_eq!(apps.query().ids(&fx.ctx).expect("ids").len(), 3);

    let err = apps
        .query()
        .where_(predicate::eq("nope", 1i64))
        .all(&fx.ctx)
        .unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn cancelled_context_stops_before_the_driver() {
    let fx = Fixture::new();
    let projects = fx.client.entity("Project").expect("entity");
    let token = CancellationToken::new();
    let ctx = fx.ctx.with_cancellation(token.clone());
    token.cancel();

    let err = projects
        .create()
        .set("name", "late")
        .save(&ctx)
        .unwrap_err();
    assert!(matches!(err, Error::Driver(DriverError::Cancelled)), "got {err:?}");
    assert_eq!(fx.statements(), 0);
}

#[test]
fn prebuilt_mutations_dispatch_by_op() {
    use entmut::{core::mutation::Mutation, entity::Outcome, op::Op};

    let fx = Fixture::new();
    let mut m = Mutation::new("Tag", Op::CREATE);
    m.set_field("name", "blue");
    let tag = fx
        .client
        .mutate(&fx.ctx, m)
        .expect("create")
        .into_entity()
        .expect("entity");

    let mut m = Mutation::new("Tag", Op::DELETE_ONE);
    m.set_id(tag.id.clone());
    assert_eq!(fx.client.mutate(&fx.ctx, m).expect("delete"), Outcome::Affected(1));

    let err = fx
        .client
        .mutate(&fx.ctx, Mutation::new("Nope", Op::CREATE))
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
