//! Create-if-absent subscription provisioning
//!
//! [`ensure_subscription`] makes sure a subscription exists before a
//! receiver is opened on it. An existing subscription is never updated:
//! filter and TTL are fixed by whichever call created it first.

use crate::broker::{BrokerSession, SqlFilter, SubscriptionDescriptor};
use crate::error::{ConsumerError, ConsumerResult};
use std::time::Duration;
use tracing::{debug, info, Instrument};

/// Outcome of a provisioning call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    /// The subscription was already present; nothing was sent
    Existing,
    /// This call created the subscription
    Created,
    /// A concurrent caller created it between our check and our create
    CreatedConcurrently,
}

/// Ensure `topic/subscription` exists, creating it if absent
///
/// A new subscription gets `time_to_expire` (4 days when `None`) as its
/// default message TTL and has dead-lettering disabled for both expiry and
/// filter evaluation errors. `filter` is attached only when non-blank.
///
/// Exactly one create call is issued when the existence check reports the
/// subscription missing, and none otherwise. A broker "already exists"
/// answer to that create is treated as success.
pub async fn ensure_subscription<S>(
    session: &S,
    topic: &str,
    subscription: &str,
    time_to_expire: Option<Duration>,
    filter: Option<&str>,
) -> ConsumerResult<Provisioned>
where
    S: BrokerSession + ?Sized,
{
    let span = crate::provision_span!(topic = %topic, subscription = %subscription);

    async move {
        let exists = session
            .subscription_exists(topic, subscription)
            .await
            .map_err(|e| ConsumerError::provisioning(topic, subscription, e))?;

        if exists {
            debug!("Subscription already exists, leaving it untouched");
            return Ok(Provisioned::Existing);
        }

        let descriptor = SubscriptionDescriptor::new(topic, subscription, time_to_expire);
        let sql_filter = SqlFilter::from_optional(filter);

        match session
            .create_subscription(&descriptor, sql_filter.as_ref())
            .await
        {
            Ok(()) => {
                info!(
                    ttl_secs = descriptor.default_message_time_to_live.as_secs(),
                    filtered = sql_filter.is_some(),
                    "Created subscription"
                );
                Ok(Provisioned::Created)
            }
            Err(e) if e.is_already_exists() => {
                debug!("Subscription was created concurrently");
                Ok(Provisioned::CreatedConcurrently)
            }
            Err(e) => Err(ConsumerError::provisioning(topic, subscription, e)),
        }
    }
    .instrument(span)
    .await
}
