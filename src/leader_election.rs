//! Leader election over a `coordination.k8s.io/v1` Lease.
//!
//! Every write carries the resourceVersion that was read, so two replicas
//! racing for an expired Lease cannot both win: the loser gets 409 Conflict
//! and simply is not the leader this round.

use std::time::Duration;

use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use k8s_openapi::chrono::{self, DateTime, Utc};
use kube::api::{Api, PostParams};
use kube::Client;
use thiserror::Error;
use tracing::{debug, info};

/// Leader election errors
#[derive(Debug, Error)]
pub enum LeaderElectionError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

/// What to do with the Lease as it was last read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseAction {
    /// No Lease yet
    Create,
    /// We hold it; push the renew time forward
    Renew,
    /// Free or expired; claim it
    TakeOver { transitions: i32 },
    /// Someone else holds a live Lease
    Wait { holder: String },
}

/// Decide the next step for `identity` given the stored Lease.
pub fn lease_action(lease: Option<&Lease>, identity: &str, now: DateTime<Utc>) -> LeaseAction {
    let Some(lease) = lease else {
        return LeaseAction::Create;
    };
    let spec = lease.spec.as_ref();
    let holder = spec
        .and_then(|s| s.holder_identity.as_deref())
        .filter(|h| !h.is_empty());

    if holder == Some(identity) {
        return LeaseAction::Renew;
    }

    let expires_at = spec.and_then(|s| {
        let renewed = s.renew_time.as_ref()?;
        let ttl = s.lease_duration_seconds?;
        Some(renewed.0 + chrono::Duration::seconds(i64::from(ttl)))
    });
    match (holder, expires_at) {
        (Some(holder), Some(expires_at)) if now <= expires_at => LeaseAction::Wait {
            holder: holder.to_string(),
        },
        _ => LeaseAction::TakeOver {
            transitions: spec.and_then(|s| s.lease_transitions).unwrap_or(0) + 1,
        },
    }
}

/// Competes for one named Lease on behalf of this pod.
#[derive(Clone)]
pub struct LeaderElector {
    api: Api<Lease>,
    lease_name: String,
    identity: String,
    lease_ttl: Duration,
}

impl LeaderElector {
    pub fn new(
        client: Client,
        namespace: &str,
        lease_name: &str,
        identity: &str,
        lease_ttl: Duration,
    ) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            lease_name: lease_name.to_string(),
            identity: identity.to_string(),
            lease_ttl,
        }
    }

    /// Identity written as the Lease holder
    pub fn identity(&self) -> &str {
        &self.identity
    }

    fn ttl_seconds(&self) -> i32 {
        i32::try_from(self.lease_ttl.as_secs()).unwrap_or(i32::MAX)
    }

    /// The Lease as this elector writes it when claiming leadership
    fn claimed_lease(
        &self,
        now: DateTime<Utc>,
        transitions: i32,
        resource_version: Option<String>,
    ) -> Lease {
        Lease {
            metadata: ObjectMeta {
                name: Some(self.lease_name.clone()),
                resource_version,
                ..Default::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: Some(self.identity.clone()),
                lease_duration_seconds: Some(self.ttl_seconds()),
                acquire_time: Some(MicroTime(now)),
                renew_time: Some(MicroTime(now)),
                lease_transitions: Some(transitions),
                ..Default::default()
            }),
        }
    }

    /// Try to become or stay leader. `Ok(true)` means we hold the Lease.
    pub async fn try_acquire_or_renew(&self) -> Result<bool, LeaderElectionError> {
        let existing = self.api.get_opt(&self.lease_name).await?;
        let now = Utc::now();
        let pp = PostParams::default();

        let written = match lease_action(existing.as_ref(), &self.identity, now) {
            LeaseAction::Wait { holder } => {
                debug!(holder = %holder, "Lease held by another replica");
                return Ok(false);
            }
            LeaseAction::Create => {
                let lease = self.claimed_lease(now, 0, None);
                self.api.create(&pp, &lease).await
            }
            LeaseAction::TakeOver { transitions } => {
                let version = existing.and_then(|l| l.metadata.resource_version);
                let lease = self.claimed_lease(now, transitions, version);
                info!(identity = %self.identity, transitions, "Taking over lease");
                self.api.replace(&self.lease_name, &pp, &lease).await
            }
            LeaseAction::Renew => {
                let mut lease = existing.unwrap_or_default();
                if let Some(spec) = lease.spec.as_mut() {
                    spec.renew_time = Some(MicroTime(now));
                    spec.lease_duration_seconds = Some(self.ttl_seconds());
                }
                self.api.replace(&self.lease_name, &pp, &lease).await
            }
        };

        match written {
            Ok(_) => Ok(true),
            // Lost the race for this resourceVersion
            Err(kube::Error::Api(e)) if e.code == 409 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
