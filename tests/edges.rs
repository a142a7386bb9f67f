mod common;

use common::Fixture;
use entmut::{client::MutationBuilder, spec::predicate, types::Value};
use rusqlite::Connection;

fn join_rows(conn: &Connection, app: &str) -> Vec<(String, i64)> {
    let mut stmt = conn
        .prepare(
            "SELECT tag_id, createTime FROM application_tags WHERE application_id = ?1 ORDER BY tag_id",
        )
        .expect("prepare");
    stmt.query_map([app], |row| Ok((row.get(0)?, row.get(1)?)))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("rows")
}

#[test]
fn many_to_one_is_written_as_a_column() {
    let fx = Fixture::new();
    let projects = fx.client.entity("Project").expect("entity");
    let apps = fx.client.entity("Application").expect("entity");
    let project = projects
        .create()
        .set("name", "apollo")
        .save(&fx.ctx)
        .expect("project");

    let app = apps
        .create()
        .set("name", "api")
        .add_edge_ids("project", [project.id.clone()])
        .save(&fx.ctx)
        .expect("app");
    assert_eq!(app.get_str("project_id"), Some(project.id.as_str()));
    assert_eq!(apps.get(&fx.ctx, app.id.clone()).expect("get"), app);

    let owned = apps
        .query()
        .where_(predicate::eq("project_id", project.id.clone()))
        .count(&fx.ctx)
        .expect("count");
    assert_eq!(owned, 1);

    let cleared = apps
        .update_one(&app)
        .clear_edge("project")
        .save(&fx.ctx)
        .expect("clear");
    assert_eq!(cleared.get("project_id"), Some(&Value::Null));
}

#[test]
fn many_to_one_rejects_two_targets_and_removal() {
    let fx = Fixture::new();
    let apps = fx.client.entity("Application").expect("entity");

    let err = apps
        .create()
        .set("name", "api")
        .add_edge_ids("project", ["p1", "p2"])
        .exec(&fx.ctx)
        .unwrap_err();
    assert!(err.is_validation());

    let err = apps
        .update()
        .remove_edge_ids("project", ["p1"])
        .exec(&fx.ctx)
        .unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("clear it instead"));
}

#[test]
fn many_to_one_to_a_missing_row_is_a_constraint_error() {
    let fx = Fixture::new();
    let apps = fx.client.entity("Application").expect("entity");
    let err = apps
        .create()
        .set("name", "api")
        .add_edge_ids("project", ["nowhere"])
        .exec(&fx.ctx)
        .unwrap_err();
    assert!(err.is_constraint(), "got {err:?}");
}

#[test]
fn one_to_many_claims_unowned_targets_only() {
    let fx = Fixture::new();
    let projects = fx.client.entity("Project").expect("entity");
    let apps = fx.client.entity("Application").expect("entity");
    let api = apps.create().set("name", "api").save(&fx.ctx).expect("api");
    let web = apps.create().set("name", "web").save(&fx.ctx).expect("web");

    let apollo = projects
        .create()
        .set("name", "apollo")
        .add_edge_ids("applications", [api.id.clone(), web.id.clone()])
        .save(&fx.ctx)
        .expect("apollo");
    let api = apps.get(&fx.ctx, api.id).expect("api");
    assert_eq!(api.get_str("project_id"), Some(apollo.id.as_str()));

    let gemini = projects
        .create()
        .set("name", "gemini")
        .save(&fx.ctx)
        .expect("gemini");
    let err = projects
        .update_one(&gemini)
        .add_edge_ids("applications", [web.id.clone()])
        .exec(&fx.ctx)
        .unwrap_err();
    assert!(err.is_constraint(), "got {err:?}");
    assert!(err.to_string().contains("already connected"));

    projects
        .update_one(&apollo)
        .remove_edge_ids("applications", [web.id.clone()])
        .exec(&fx.ctx)
        .expect("release");
    projects
        .update_one(&gemini)
        .add_edge_ids("applications", [web.id.clone()])
        .exec(&fx.ctx)
        .expect("claim");
    let web = apps.get(&fx.ctx, web.id).expect("web");
    assert_eq!(web.get_str("project_id"), Some(gemini.id.as_str()));
}

#[test]
fn deleting_the_owner_detaches_children() {
    let fx = Fixture::new();
    let projects = fx.client.entity("Project").expect("entity");
    let apps = fx.client.entity("Application").expect("entity");
    let project = projects
        .create()
        .set("name", "apollo")
        .save(&fx.ctx)
        .expect("project");
    let app = apps
        .create()
        .set("name", "api")
        .add_edge_ids("project", [project.id.clone()])
        .save(&fx.ctx)
        .expect("app");

    projects.delete_one(&project).exec(&fx.ctx).expect("delete");
    let app = apps.get(&fx.ctx, app.id).expect("app");
    assert_eq!(app.get("project_id"), Some(&Value::Null));
}

#[test]
fn many_to_many_join_rows_get_their_own_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("edges.db");
    let fx = Fixture::on_disk(&path);
    let apps = fx.client.entity("Application").expect("entity");
    let tags = fx.client.entity("Tag").expect("entity");

    let red = tags.create().set("name", "red").save(&fx.ctx).expect("red");
    let blue = tags.create().set("name", "blue").save(&fx.ctx).expect("blue");
    let green = tags.create().set("name", "green").save(&fx.ctx).expect("green");

    fx.clock.set(7_000);
    let app = apps
        .create()
        .set("name", "api")
        .add_edge_ids("tags", [red.id.clone(), blue.id.clone()])
        .save(&fx.ctx)
        .expect("app");

    let conn = Connection::open(&path).expect("open raw");
    let mut expected = vec![(red.id.0.clone(), 7_000), (blue.id.0.clone(), 7_000)];
    expected.sort();
    assert_eq!(join_rows(&conn, app.id.as_str()), expected);

    fx.clock.set(8_000);
    apps.update_one(&app)
        .remove_edge_ids("tags", [red.id.clone()])
        .add_edge_ids("tags", [green.id.clone(), blue.id.clone()])
        .exec(&fx.ctx)
        .expect("retag");
    let mut expected = vec![(blue.id.0.clone(), 7_000), (green.id.0.clone(), 8_000)];
    expected.sort();
    assert_eq!(join_rows(&conn, app.id.as_str()), expected);

    apps.update_one(&app)
        .clear_edge("tags")
        .exec(&fx.ctx)
        .expect("clear");
    assert!(join_rows(&conn, app.id.as_str()).is_empty());
}
