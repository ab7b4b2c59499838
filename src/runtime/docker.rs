use super::{ContainerRuntime, EventStream};
use crate::error::{Error, Result};
use crate::types::{ContainerRecord, EventFilter, RuntimeEvent};
use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::{ContainerSummary, EventMessage};
use bollard::system::EventsOptions;
use bollard::Docker;
use futures_util::stream::{self, StreamExt};
use log::{debug, error};
use std::collections::HashMap;

/// Docker Engine API over the local socket (or `DOCKER_HOST`).
pub struct DockerRuntime {
    docker: Option<Docker>,
}

impl DockerRuntime {
    /// Builds a client with local defaults.
    ///
    /// This does not touch the socket; a client that cannot even be built
    /// (bad `DOCKER_HOST`) yields a runtime whose calls all fail with
    /// [`Error::Unavailable`].
    pub fn connect() -> Self {
        match Docker::connect_with_local_defaults() {
            Ok(docker) => Self {
                docker: Some(docker),
            },
            Err(e) => {
                error!("Failed to create Docker client: {}", e);
                Self { docker: None }
            }
        }
    }

    fn client(&self) -> Result<&Docker> {
        self.docker
            .as_ref()
            .ok_or_else(|| Error::Unavailable("no Docker client".to_string()))
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<()> {
        self.client()?.ping().await?;
        Ok(())
    }

    async fn list_running(&self) -> Result<Vec<ContainerRecord>> {
        let opts = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        let containers = self.client()?.list_containers(Some(opts)).await?;
        Ok(containers.into_iter().map(to_record).collect())
    }

    fn subscribe(&self, filter: &EventFilter) -> EventStream {
        let docker = match self.client() {
            Ok(d) => d,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };

        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        filters.insert("type".to_string(), filter.types.clone());
        filters.insert(
            "event".to_string(),
            filter.actions.iter().map(|a| a.to_string()).collect(),
        );
        let opts = EventsOptions::<String> {
            filters,
            ..Default::default()
        };

        docker
            .events(Some(opts))
            .filter_map(|msg| async move {
                match msg {
                    Ok(event) => to_event(event).map(Ok),
                    Err(e) => Some(Err(Error::Stream(e.to_string()))),
                }
            })
            .boxed()
    }
}

fn to_record(summary: ContainerSummary) -> ContainerRecord {
    ContainerRecord {
        id: summary.id.unwrap_or_default(),
        name: summary.names.and_then(|n| n.into_iter().next()),
        labels: summary.labels.unwrap_or_default(),
    }
}

/// Events without an actor id can't be attributed and are dropped.
fn to_event(event: EventMessage) -> Option<RuntimeEvent> {
    let id = event.actor.and_then(|actor| actor.id).unwrap_or_default();
    if id.is_empty() {
        debug!("Ignoring Docker event without actor id");
        return None;
    }
    Some(RuntimeEvent::new(id, event.action.unwrap_or_default()))
}
