//! In-process transport: one named thread per worker

use crate::agent::{AgentKit, AgentSettings, AgentStats, WorkerAgent};
use crate::error::{ChannelError, Result, WorkerError};
use crate::protocol::{Request, Response};
use crate::transport::{Inbound, Outbox, SpawnSpec, Spawner, WorkerHandle};
use crossbeam_channel::{unbounded, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Builds the kit for each spawned agent
pub type KitFactory = Arc<dyn Fn(SpawnSpec) -> Result<AgentKit> + Send + Sync>;

/// Outbox that tags responses with the slot and forwards them to the coordinator
#[derive(Debug, Clone)]
pub struct ChannelOutbox {
    slot: usize,
    tx: Sender<Inbound>,
}

impl ChannelOutbox {
    pub fn new(slot: usize, tx: Sender<Inbound>) -> Self {
        Self { slot, tx }
    }
}

impl Outbox for ChannelOutbox {
    fn send(&mut self, response: Response) -> std::result::Result<(), ChannelError> {
        self.tx
            .send(Inbound::message(self.slot, response))
            .map_err(|_| ChannelError::CoordinatorGone)
    }
}

/// Spawns agents on threads of this process
pub struct ThreadSpawner {
    factory: KitFactory,
}

impl ThreadSpawner {
    /// Use a custom kit factory (scripted strategies, shared sinks)
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(SpawnSpec) -> Result<AgentKit> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
        }
    }

    /// Random strategies and the configured sink
    pub fn from_settings(settings: AgentSettings) -> Self {
        Self::new(move |spec| settings.build_kit(spec))
    }
}

impl Spawner for ThreadSpawner {
    fn spawn(&self, spec: SpawnSpec, inbound: Sender<Inbound>) -> Result<Box<dyn WorkerHandle>> {
        let kit = (self.factory)(spec)?;
        let (tx, rx) = unbounded::<Request>();
        let outbox = ChannelOutbox::new(spec.slot, inbound.clone());
        let slot = spec.slot;

        let handle = thread::Builder::new()
            .name(format!("{}-{}", spec.role, spec.slot))
            .spawn(move || {
                let agent = WorkerAgent::new(slot, spec.role, kit, Box::new(outbox));
                let result = agent.run(rx);
                let reason = match &result {
                    Ok(_) => "exited".to_string(),
                    Err(e) => {
                        error!(slot, error = %e, "Worker failed");
                        e.to_string()
                    }
                };
                // The coordinator may already be gone at shutdown.
                let _ = inbound.send(Inbound::exited(slot, reason));
                result
            })
            .map_err(|e| WorkerError::SpawnFailed {
                id: slot,
                reason: e.to_string(),
            })?;

        debug!(slot, role = %spec.role, "Spawned worker thread");
        Ok(Box::new(ThreadHandle {
            slot,
            sender: Some(tx),
            handle: Some(handle),
        }))
    }
}

/// Coordinator-side handle to a worker thread
pub struct ThreadHandle {
    slot: usize,
    sender: Option<Sender<Request>>,
    handle: Option<JoinHandle<Result<AgentStats>>>,
}

impl WorkerHandle for ThreadHandle {
    fn send(&mut self, request: Request) -> std::result::Result<(), ChannelError> {
        match &self.sender {
            Some(tx) => tx
                .send(request)
                .map_err(|_| ChannelError::Disconnected { slot: self.slot }),
            None => Err(ChannelError::Disconnected { slot: self.slot }),
        }
    }

    fn stop(&mut self, timeout: Duration) -> std::result::Result<(), WorkerError> {
        if let Some(tx) = self.sender.take() {
            let _ = tx.send(Request::Exit);
        }
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                // Detach; the thread exits on its own once its inbox is closed.
                return Err(WorkerError::StopTimeout {
                    id: self.slot,
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            thread::sleep(Duration::from_millis(10));
        }

        match handle.join() {
            Ok(Ok(stats)) => {
                debug!(slot = self.slot, ?stats, "Worker thread joined");
                Ok(())
            }
            Ok(Err(e)) => {
                debug!(slot = self.slot, error = %e, "Worker thread ended with error");
                Ok(())
            }
            Err(_) => Err(WorkerError::Panicked {
                id: self.slot,
                message: "Worker thread panicked".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::strategy::{FixedSource, ScriptedAttempt};
    use crate::agent::Outcome;
    use crate::engine::slot::Role;
    use crate::item::WorkItem;
    use crate::transport::SlotEvent;
    use chrono::Utc;

    fn spawner() -> ThreadSpawner {
        ThreadSpawner::new(|_| {
            Ok(AgentKit {
                attempt: Box::new(ScriptedAttempt::new(Duration::ZERO, |_: &WorkItem| {
                    Outcome::Success
                })),
                source: Box::new(FixedSource::new(vec![WorkItem::new("a", 1, Utc::now())])),
                sink: None,
            })
        })
    }

    #[test]
    fn test_thread_worker_round_trip() {
        let (tx, rx) = unbounded();
        let mut handle = spawner()
            .spawn(
                SpawnSpec {
                    slot: 3,
                    role: Role::Processor,
                },
                tx,
            )
            .unwrap();

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first, Inbound::message(3, Response::Online));

        handle.send(Request::ProcessDiscovery).unwrap();
        let reply = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        match reply.event {
            SlotEvent::Message(Response::DiscoveryComplete(items)) => assert_eq!(items.len(), 1),
            other => panic!("Expected DiscoveryComplete, got {:?}", other),
        }

        handle.stop(Duration::from_secs(5)).unwrap();
        let last = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(last.event, SlotEvent::Exited { .. }));
        assert!(handle.send(Request::HaltCollection).is_err());
    }
}
