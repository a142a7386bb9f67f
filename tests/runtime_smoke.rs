mod common;

use common::Fixture;
use entmut::{
    config::RuntimeConfig,
    core::mutation::Mutation,
    entity::Outcome,
    error::Error,
    op::Op,
    runtime::{MutationEvent, RuntimeError, spawn_writer},
};

fn create_tag(name: &str) -> Mutation {
    let mut m = Mutation::new("Tag", Op::CREATE);
    m.set_field("name", name);
    m
}

#[tokio::test]
async fn writer_runs_mutations_in_order_and_publishes_events() {
    let fx = Fixture::new();
    let handle = spawn_writer(fx.client.clone(), RuntimeConfig::default());
    let mut events = handle.subscribe();

    let tag = handle
        .mutate(create_tag("red"))
        .await
        .expect("create")
        .into_entity()
        .expect("entity");

    let mut rename = Mutation::new("Tag", Op::UPDATE_ONE);
    rename.set_id(tag.id.clone());
    rename.set_field("name", "crimson");
    handle.mutate(rename).await.expect("rename");

    let stored = handle.get("Tag", tag.id.clone()).await.expect("get");
    assert_eq!(stored.get_str("name"), Some("crimson"));

    let mut delete = Mutation::new("Tag", Op::DELETE_ONE);
    delete.set_id(tag.id.clone());
    assert_eq!(handle.mutate(delete).await.expect("delete"), Outcome::Affected(1));

    assert_eq!(
        events.recv().await.expect("created"),
        MutationEvent::Created {
            entity: "Tag".to_string(),
            ids: vec![tag.id.clone()],
        }
    );
    assert_eq!(
        events.recv().await.expect("updated"),
        MutationEvent::Updated {
            entity: "Tag".to_string(),
            id: Some(tag.id.clone()),
            affected: 1,
        }
    );
    assert_eq!(
        events.recv().await.expect("deleted"),
        MutationEvent::Deleted {
            entity: "Tag".to_string(),
            id: Some(tag.id.clone()),
            affected: 1,
        }
    );

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn failed_mutations_return_errors_and_publish_nothing() {
    let fx = Fixture::new();
    let handle = spawn_writer(fx.client.clone(), RuntimeConfig::default());
    let mut events = handle.subscribe();

    let err = handle
        .mutate(Mutation::new("Tag", Op::CREATE))
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Entity(ref e) if e.is_validation()), "got {err:?}");

    let err = handle.get("Tag", "missing").await.unwrap_err();
    assert!(matches!(err, RuntimeError::Entity(Error::NotFound { .. })), "got {err:?}");

    handle.mutate(create_tag("blue")).await.expect("create");
    match events.recv().await.expect("event") {
        MutationEvent::Created { ids, .. } => assert_eq!(ids.len(), 1),
        other => panic!("unexpected event {other:?}"),
    }
    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn clones_share_the_writer_until_shutdown() {
    let fx = Fixture::new();
    let handle = spawn_writer(
        fx.client.clone(),
        RuntimeConfig {
            queue_bound: 4,
            ..RuntimeConfig::default()
        },
    );

    let mut tasks = Vec::new();
    for i in 0..16 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            handle.mutate(create_tag(&format!("tag-{i}"))).await
        }));
    }
    for task in tasks {
        task.await.expect("join").expect("create");
    }
    assert_eq!(
        fx.client
            .entity("Tag")
            .expect("entity")
            .query()
            .count(&fx.ctx)
            .expect("count"),
        16
    );

    handle.shutdown().await.expect("shutdown");
    tokio::task::yield_now().await;
    let err = handle.mutate(create_tag("late")).await.unwrap_err();
    assert!(matches!(err, RuntimeError::ChannelClosed), "got {err:?}");
}
