//! # Metrics Peers Voting
//!
//! Owns the candidate roster and refreshes each peer's cached metrics on a
//! timer, independent of the machine.
//!
//! Each refresh fans out one task per peer into a `JoinSet`. Every task is
//! bounded by the round-trip deadline; a failed task leaves that peer's record
//! untouched.

use parking_lot::RwLock;
use shared_types::{PeerDescriptor, PeerId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::domain::{CandidateMetrics, CandidateView, SyncError};
use crate::metrics;
use crate::ports::{
    BlockStore, Candidate, CandidateSource, MetricsTransport, PeerRegistry,
};

#[derive(Clone, Debug)]
struct CandidateRecord {
    descriptor: PeerDescriptor,
    metrics: CandidateMetrics,
}

type Roster = Arc<RwLock<HashMap<PeerId, CandidateRecord>>>;

/// Candidate view backed by the shared roster.
///
/// Reads take the roster's read lock; a peer dropped from the roster after
/// this handle was issued reports missing metrics.
struct RosterCandidate {
    id: PeerId,
    address: String,
    roster: Roster,
}

impl Candidate for RosterCandidate {
    fn peer_id(&self) -> PeerId {
        self.id
    }

    fn remote_addr(&self) -> String {
        self.address.clone()
    }

    fn name(&self) -> String {
        self.roster
            .read()
            .get(&self.id)
            .map(|r| r.metrics.name.clone())
            .unwrap_or_default()
    }

    fn metrics(&self) -> Result<CandidateMetrics, SyncError> {
        self.roster
            .read()
            .get(&self.id)
            .map(|r| r.metrics.clone())
            .ok_or(SyncError::InvariantMissingMetrics(self.id))
    }
}

/// Roster of registered peers and their cached chain metrics.
pub struct MetricsPeersVoting {
    config: SyncConfig,
    local_id: PeerId,
    registry: Arc<dyn PeerRegistry>,
    transport: Arc<dyn MetricsTransport>,
    store: Arc<dyn BlockStore>,
    roster: Roster,
}

impl MetricsPeersVoting {
    /// Create an empty roster.
    pub fn new(
        config: SyncConfig,
        local_id: PeerId,
        registry: Arc<dyn PeerRegistry>,
        transport: Arc<dyn MetricsTransport>,
        store: Arc<dyn BlockStore>,
    ) -> Self {
        Self {
            config,
            local_id,
            registry,
            transport,
            store,
            roster: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Rebuild the roster from the registration table, dropping ourselves.
    ///
    /// Peers still registered keep their cached metrics. Returns the roster
    /// size.
    pub fn update_candidates(&self) -> usize {
        let registered: Vec<PeerDescriptor> = self
            .registry
            .registered_peers()
            .into_iter()
            .filter(|p| p.id != self.local_id)
            .collect();

        let mut roster = self.roster.write();
        roster.retain(|id, _| registered.iter().any(|p| &p.id == id));
        for peer in registered {
            match roster.get_mut(&peer.id) {
                Some(record) => record.descriptor = peer,
                None => {
                    debug!("[sync] Roster add {} ({})", peer.name, peer.address);
                    let metrics = CandidateMetrics::named(peer.name.clone());
                    roster.insert(
                        peer.id,
                        CandidateRecord {
                            descriptor: peer,
                            metrics,
                        },
                    );
                }
            }
        }

        let size = roster.len();
        metrics::record_roster_size(size);
        size
    }

    /// Refresh one peer's metrics with a bounded round trip.
    ///
    /// register, query height, then query the digest at our current height.
    /// A peer below our height cannot answer the digest query, so it is
    /// recorded without one. On any failure the record is left unchanged.
    pub async fn update_voting_metrics(&self, peer: &PeerDescriptor) -> Result<(), SyncError> {
        let local_height = self.store.height();

        let round_trip = async {
            let mut session = self.transport.open_session(peer).await?;
            let result = async {
                session.register(&self.local_id).await?;
                let remote_height = session.query_height().await?;
                let digest = if remote_height >= local_height {
                    Some(session.query_digest_at(local_height).await?)
                } else {
                    None
                };
                Ok::<_, SyncError>((remote_height, digest))
            }
            .await;
            session.close().await;
            result
        };

        let (remote_height, digest) = timeout(self.config.metrics_round_trip_timeout(), round_trip)
            .await
            .map_err(|_| SyncError::Timeout {
                operation: "metrics_round_trip",
                peer: peer.address.clone(),
            })??;

        let mut roster = self.roster.write();
        let record = roster
            .get_mut(&peer.id)
            .ok_or(SyncError::UnknownPeer(peer.id))?;
        record.metrics = CandidateMetrics {
            name: peer.name.clone(),
            remote_height,
            local_height_at_request_time: local_height,
            remote_digest_of_local_height: digest,
            last_response_time: Some(Instant::now()),
        };
        Ok(())
    }

    /// Refresh every roster member concurrently. Returns how many succeeded.
    pub async fn refresh_all(self: &Arc<Self>) -> usize {
        let peers: Vec<PeerDescriptor> = self
            .roster
            .read()
            .values()
            .map(|r| r.descriptor.clone())
            .collect();

        let mut tasks = JoinSet::new();
        for peer in peers {
            let voting = Arc::clone(self);
            tasks.spawn(async move {
                let result = voting.update_voting_metrics(&peer).await;
                (peer, result)
            });
        }

        let mut refreshed = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {
                    refreshed += 1;
                    metrics::record_metric_refresh("ok");
                }
                Ok((peer, Err(e))) => {
                    metrics::record_metric_refresh("failed");
                    warn!("[metrics] Refresh of {} failed: {}", peer.address, e);
                }
                Err(e) => {
                    metrics::record_metric_refresh("failed");
                    warn!("[metrics] Refresh task aborted: {}", e);
                }
            }
        }
        refreshed
    }

    /// Refresh on a fixed interval until `shutdown` flips.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.metrics_refresh_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "[metrics] Roster refresh every {:?}",
            self.config.metrics_refresh_interval()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = async {
                    ticker.tick().await;
                    let size = self.update_candidates();
                    let refreshed = self.refresh_all().await;
                    debug!("[metrics] Refreshed {}/{} candidates", refreshed, size);
                } => {}
            }
        }
        info!("[metrics] Roster refresh stopped");
    }

    /// Every roster entry with its staleness.
    pub fn snapshot(&self) -> Vec<CandidateView> {
        let now = Instant::now();
        let stale_after = self.config.stale_after();
        let mut views: Vec<CandidateView> = self
            .roster
            .read()
            .iter()
            .map(|(id, record)| CandidateView {
                peer: *id,
                address: record.descriptor.address.clone(),
                stale: record.metrics.is_stale(now, stale_after),
                metrics: record.metrics.clone(),
            })
            .collect();
        views.sort_by(|a, b| a.address.cmp(&b.address));
        views
    }

    /// Number of peers on the roster.
    pub fn len(&self) -> usize {
        self.roster.read().len()
    }

    /// Whether the roster is empty.
    pub fn is_empty(&self) -> bool {
        self.roster.read().is_empty()
    }
}

impl CandidateSource for MetricsPeersVoting {
    fn candidates(&self) -> Vec<Arc<dyn Candidate>> {
        let now = Instant::now();
        let stale_after = self.config.stale_after();
        let mut fresh: Vec<(String, Arc<dyn Candidate>)> = self
            .roster
            .read()
            .iter()
            .filter(|(_, record)| !record.metrics.is_stale(now, stale_after))
            .map(|(id, record)| {
                let candidate: Arc<dyn Candidate> = Arc::new(RosterCandidate {
                    id: *id,
                    address: record.descriptor.address.clone(),
                    roster: Arc::clone(&self.roster),
                });
                (record.descriptor.address.clone(), candidate)
            })
            .collect();
        fresh.sort_by(|a, b| a.0.cmp(&b.0));
        fresh.into_iter().map(|(_, c)| c).collect()
    }
}
