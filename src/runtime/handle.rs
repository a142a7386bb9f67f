use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::{
    client::Client,
    config::RuntimeConfig,
    context::Context,
    core::mutation::Mutation,
    entity::{Entity, Outcome},
    error::Error,
    op::Op,
    types::EntityId,
};

use super::events::MutationEvent;

/// Errors returned by [`WriterHandle`] calls.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The pipeline failed.
    #[error(transparent)]
    Entity(#[from] Error),
    /// The writer task has stopped.
    #[error("writer channel closed")]
    ChannelClosed,
    /// The writer task panicked or was aborted.
    #[error("writer task failed: {0}")]
    Join(String),
}

/// Async front of a single writer task. Cheap to clone.
pub struct WriterHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<MutationEvent>,
}

impl Clone for WriterHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
        }
    }
}

enum Command {
    Mutate {
        mutation: Mutation,
        resp: oneshot::Sender<Result<Outcome, RuntimeError>>,
    },
    Get {
        entity: String,
        id: EntityId,
        resp: oneshot::Sender<Result<Entity, RuntimeError>>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
}

/// Starts the writer task. Commands run one at a time, in arrival order.
pub fn spawn_writer(client: Client, config: RuntimeConfig) -> WriterHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.queue_bound.max(1));
    let (events_tx, _) = broadcast::channel::<MutationEvent>(config.event_capacity.max(1));

    let events_tx_loop = events_tx.clone();
    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            let done = handle_command(cmd, &client, &events_tx_loop, &config).await;
            if done {
                break;
            }
        }
        tracing::debug!("writer stopped");
    });

    WriterHandle { cmd_tx, events_tx }
}

impl WriterHandle {
    /// Receives an event for every successful write.
    pub fn subscribe(&self) -> broadcast::Receiver<MutationEvent> {
        self.events_tx.subscribe()
    }

    /// Queues a prebuilt mutation and waits for its outcome.
    pub async fn mutate(&self, mutation: Mutation) -> Result<Outcome, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Mutate { mutation, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Reads one entity, ordered after every mutation queued before it.
    pub async fn get(
        &self,
        entity: impl Into<String>,
        id: impl Into<EntityId>,
    ) -> Result<Entity, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Get {
                entity: entity.into(),
                id: id.into(),
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Finishes queued commands, then stops the writer.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }
}

fn command_context(config: &RuntimeConfig) -> Context {
    let ctx = Context::background();
    match config.default_timeout_ms {
        0 => ctx,
        ms => ctx.with_timeout(Duration::from_millis(ms)),
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, RuntimeError>
where
    F: FnOnce() -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RuntimeError::Join(e.to_string()))?
        .map_err(RuntimeError::from)
}

async fn handle_command(
    cmd: Command,
    client: &Client,
    events_tx: &broadcast::Sender<MutationEvent>,
    config: &RuntimeConfig,
) -> bool {
    match cmd {
        Command::Mutate { mutation, resp } => {
            let entity = mutation.entity().to_string();
            let op = mutation.op();
            let id = mutation.id().cloned();
            let ctx = command_context(config);
            let client = client.clone();
            let res = run_blocking(move || client.mutate(&ctx, mutation)).await;
            match &res {
                Ok(outcome) => {
                    if let Some(event) = event_for(entity, op, id, outcome) {
                        let _ = events_tx.send(event);
                    }
                }
                Err(err) => tracing::debug!(op = %op, error = %err, "queued mutation failed"),
            }
            let _ = resp.send(res);
        }
        Command::Get { entity, id, resp } => {
            let ctx = command_context(config);
            let client = client.clone();
            let res = run_blocking(move || client.entity(&entity)?.get(&ctx, id)).await;
            let _ = resp.send(res);
        }
        Command::Shutdown { resp } => {
            let _ = resp.send(Ok(()));
            return true;
        }
    }

    false
}

fn event_for(
    entity: String,
    op: Op,
    id: Option<EntityId>,
    outcome: &Outcome,
) -> Option<MutationEvent> {
    match (op, outcome) {
        (Op::CREATE, Outcome::Entity(e)) => Some(MutationEvent::Created {
            entity,
            ids: vec![e.id.clone()],
        }),
        (Op::CREATE, Outcome::Entities(es)) => Some(MutationEvent::Created {
            entity,
            ids: es.iter().map(|e| e.id.clone()).collect(),
        }),
        (Op::UPDATE_ONE, Outcome::Entity(e)) => Some(MutationEvent::Updated {
            entity,
            id: Some(e.id.clone()),
            affected: 1,
        }),
        (Op::UPDATE, Outcome::Affected(n)) => Some(MutationEvent::Updated {
            entity,
            id: None,
            affected: *n,
        }),
        (Op::DELETE_ONE, Outcome::Affected(n)) => Some(MutationEvent::Deleted {
            entity,
            id,
            affected: *n,
        }),
        (Op::DELETE, Outcome::Affected(n)) => Some(MutationEvent::Deleted {
            entity,
            id: None,
            affected: *n,
        }),
        _ => None,
    }
}
