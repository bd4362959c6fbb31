//! Client side of the batched data protocol
//!
//! ```text
//!  request "json{data}" ──► target.command ──► DataResponse{responseTopic}
//!  subscribe(responseTopic)
//!  publish(responseTopic, "")              ready signal
//!  collect queueCount messages ──► on_data(msg) for each
//! ```

use std::time::Duration;

use log::{debug, warn};
use marketbus_core::{
    DataRequest, DataResponse, JsonCommand, JsonOperation, Message, Topic, queue_count,
};
use marketbus_transport::{Broker, TransportError};
use tokio_util::sync::CancellationToken;

use crate::error::{BusError, Result};

/// Request a batch from the component listening on `target` and feed every
/// message to `on_data`. Returns the number of messages received.
///
/// The confirmation handshake is always used. If `token` is cancelled the
/// subscription is closed, pending deliveries are discarded and
/// [`BusError::Cancelled`] is returned.
pub async fn request_data<F>(
    broker: &dyn Broker,
    token: &CancellationToken,
    target: &Topic,
    mut request: DataRequest,
    timeout: Duration,
    mut on_data: F,
) -> Result<usize>
where
    F: FnMut(Message) + Send,
{
    request.no_confirm = false;
    let payload = JsonCommand::with_request(JsonOperation::Data, &request)?.to_payload()?;
    let subject = target.generate();

    let reply = tokio::select! {
        _ = token.cancelled() => return Err(BusError::Cancelled),
        reply = broker.request(&subject, payload, timeout) => reply?,
    };
    let response: DataResponse = serde_json::from_slice(&reply.payload)?;
    if !response.err().is_empty() {
        return Err(BusError::Remote(response.err().to_string()));
    }

    let response_topic = response.response_topic;
    let count = queue_count(&response_topic)?;
    debug!("[{}] expecting {} messages", response_topic, count);

    let mut subscription = broker.subscribe(&response_topic).await?;
    broker.publish(&response_topic, Vec::new()).await?;

    let mut received = 0;
    while received < count {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                subscription.unsubscribe();
                let dropped = subscription.drain();
                debug!(
                    "[{}] cancelled after {} of {} messages, {} pending dropped",
                    response_topic, received, count, dropped
                );
                return Err(BusError::Cancelled);
            }
            delivery = subscription.next() => {
                let Some(delivery) = delivery else {
                    return Err(TransportError::ChannelClosed.into());
                };
                // our own ready signal
                if delivery.is_empty() {
                    continue;
                }
                match Message::decode(&delivery.payload) {
                    Ok(message) => on_data(message),
                    Err(e) => warn!("[{}] undecodable batch message: {}", response_topic, e),
                }
                received += 1;
            }
        }
    }

    Ok(count)
}
