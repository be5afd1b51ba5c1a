use super::runtime::{EventFilter, RuntimeClient, RuntimeEvent, Subscription};
use crate::model::Container;

use anyhow::{Context, Result, bail};
use std::future::Future;
use tracing::{debug, info, warn};

/// Receives container lifecycle changes from [`monitor`].
///
/// Calls arrive one at a time, in the order the runtime reported them.
/// `added` may see the same container id twice around startup, so
/// implementations must treat it as an upsert.
pub trait ContainerHandler {
    fn added(&mut self, container: Container);
    fn removed(&mut self, name: &str);

    /// Called once every already running container has been passed to `added`.
    fn synced(&mut self) {}
}

/// Watches the runtime until `stop` resolves or an error occurs.
///
/// The event subscription is opened before existing containers are listed,
/// so nothing started during the listing is missed. Any subscribe, list,
/// inspect or stream failure ends monitoring and is returned; `stop` is the
/// only way to finish with `Ok`.
pub async fn monitor<C, S, H>(client: &C, stop: S, handler: &mut H) -> Result<()>
where
    C: RuntimeClient,
    S: Future<Output = ()>,
    H: ContainerHandler,
{
    let mut subscription = client
        .subscribe(&EventFilter::container_lifecycle())
        .await
        .context("Unable to subscribe to container events")?;

    let result = async {
        publish_existing_containers(client, handler).await?;
        process_events(client, &mut subscription, stop, handler).await
    }
    .await;

    subscription.cancel();
    result
}

async fn publish_existing_containers<C, H>(client: &C, handler: &mut H) -> Result<()>
where
    C: RuntimeClient,
    H: ContainerHandler,
{
    let containers = client
        .list_containers()
        .await
        .context("Unable to list containers")?;

    info!("Found {} running containers", containers.len());
    for summary in containers {
        handler.added(summary.into());
    }
    handler.synced();
    Ok(())
}

async fn process_events<C, S, H>(
    client: &C,
    subscription: &mut Subscription,
    stop: S,
    handler: &mut H,
) -> Result<()>
where
    C: RuntimeClient,
    S: Future<Output = ()>,
    H: ContainerHandler,
{
    let mut stop = std::pin::pin!(stop);

    loop {
        tokio::select! {
            biased;

            _ = &mut stop => {
                info!("Stop requested, no longer monitoring containers");
                return Ok(());
            }
            // Queued events drain before a stream error is surfaced.
            event = subscription.events.recv() => {
                let Some(event) = event else {
                    if let Ok(err) = subscription.errors.try_recv() {
                        return Err(err).context("Container event stream failed");
                    }
                    bail!("Container event stream ended");
                };
                handle_event(client, event, handler).await?;
            }
            Some(err) = subscription.errors.recv() => {
                return Err(err).context("Container event stream failed");
            }
        }
    }
}

async fn handle_event<C, H>(client: &C, event: RuntimeEvent, handler: &mut H) -> Result<()>
where
    C: RuntimeClient,
    H: ContainerHandler,
{
    match event.action.as_str() {
        "create" => {
            let details = client
                .inspect_container(&event.actor.id)
                .await
                .with_context(|| format!("Unable to inspect container {}", event.actor.id))?;
            handler.added(details.into());
        }
        "destroy" => match event.actor.attributes.get("name") {
            Some(name) => handler.removed(name),
            None => warn!(
                "Destroy event for container {} carried no name",
                event.actor.id
            ),
        },
        other => debug!("Ignoring container event {} for {}", other, event.actor.id),
    }
    Ok(())
}
