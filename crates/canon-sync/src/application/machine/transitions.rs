//! Transition functions, one per state.

use rand::Rng;
use shared_types::{BlockHeight, OperatingMode};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{Machine, Transition};
use crate::algorithms::{has_better_chain, is_identical_chain};
use crate::domain::{fork_walk_floor, SyncError, SyncState};
use crate::metrics;
use crate::ports::{Candidate, VerifyMode};

impl Machine {
    pub(super) fn on_connecting(&mut self) -> Result<Transition, SyncError> {
        let connected = self.ctx.node.conn_count();
        let required = self.ctx.config.min_connected_peers;
        if connected >= required {
            info!("[sync] {} peers connected, electing", connected);
            return Ok(Transition::proceed(SyncState::HighestBlock));
        }
        debug!("[sync] Waiting for peers ({}/{})", connected, required);
        Ok(Transition::wait(SyncState::Connecting))
    }

    pub(super) fn on_highest_block(&mut self) -> Result<Transition, SyncError> {
        let Some(election) = self.elect()? else {
            return Ok(Transition::wait(SyncState::HighestBlock));
        };

        let local_height = self.ctx.store.height();
        let compared_at = election.measured_at.min(local_height);
        let local_digest = self.ctx.store.digest_for_block(compared_at)?;

        self.target_height = election.majority_height;
        self.target_candidate = Some(Arc::clone(&election.winner));

        if compared_at == local_height
            && is_identical_chain(
                election.majority_height,
                &election.digest,
                local_height,
                &local_digest,
            )
        {
            info!("[sync] Local chain matches elected chain at {}", local_height);
            return Ok(Transition::proceed(SyncState::Rebuild));
        }

        if has_better_chain(
            election.majority_height,
            &election.digest,
            local_height,
            &local_digest,
        ) {
            info!(
                "[sync] Better chain at {} via {} ({} votes)",
                election.majority_height,
                election.winner.remote_addr(),
                election.highest_num_votes
            );
            return Ok(Transition::proceed(SyncState::ForkDetect));
        }

        Ok(Transition::wait(SyncState::HighestBlock))
    }

    pub(super) async fn on_fork_detect(&mut self) -> Result<Transition, SyncError> {
        let target = self
            .target_candidate
            .clone()
            .ok_or(SyncError::InvariantNoTarget("fork_detect"))?;
        let peer = target.peer_id();
        let local_height = self.ctx.store.height();

        let remote_height = self
            .bounded(
                "query_block_height",
                &*target,
                self.ctx.node.query_block_height(&peer),
            )
            .await?;
        let local_digest = self.ctx.store.digest_for_block(local_height)?;
        let remote_digest = if remote_height >= local_height {
            Some(
                self.bounded(
                    "remote_digest_of_height",
                    &*target,
                    self.ctx.node.remote_digest_of_height(&peer, local_height),
                )
                .await?,
            )
        } else {
            None
        };

        let better = remote_digest
            .map(|d| has_better_chain(remote_height, &d, local_height, &local_digest))
            .unwrap_or(false);
        let Some(mut remote) = remote_digest.filter(|_| better) else {
            info!("[sync] {} no longer has a better chain", target.remote_addr());
            return Ok(Transition::proceed(SyncState::Rebuild));
        };
        self.target_height = remote_height;

        let floor = fork_walk_floor(local_height, self.ctx.config.fork_protection);
        let mut height = local_height;
        let fork_point = loop {
            if self.ctx.store.digest_for_block(height)? == remote {
                break height;
            }
            if height == floor {
                return Err(SyncError::ForkBeyondProtection {
                    local_height,
                    floor,
                });
            }
            height -= 1;
            remote = self
                .bounded(
                    "remote_digest_of_height",
                    &*target,
                    self.ctx.node.remote_digest_of_height(&peer, height),
                )
                .await?;
        };

        if fork_point < local_height {
            self.ctx.store.delete_down_to_block(fork_point)?;
            self.ctx.store.clear_cache();
            metrics::record_rollback(local_height - fork_point, true);
            info!(
                "[sync] Fork at {}: rolled back {} blocks",
                fork_point,
                local_height - fork_point
            );
        } else {
            debug!("[sync] Local tip {} is on the elected chain", local_height);
        }

        self.pivot_point = fork_point;
        self.start_block_number = fork_point + 1;
        self.fetched_since_audit = 0;
        self.lookahead = None;
        Ok(Transition::proceed(SyncState::FetchBlocks))
    }

    pub(super) async fn on_fetch_blocks(&mut self) -> Result<Transition, SyncError> {
        self.ctx.set_mode(OperatingMode::Syncing);
        let target = self
            .target_candidate
            .clone()
            .ok_or(SyncError::InvariantNoTarget("fetch_blocks"))?;
        let peer = target.peer_id();

        for _ in 0..self.ctx.config.fetch_batch_size {
            let height = self.ctx.store.height() + 1;
            if height > self.target_height {
                break;
            }

            let block = match self.lookahead.take() {
                Some((at, block)) if at == height => block,
                _ => {
                    self.bounded(
                        "get_block_data",
                        &*target,
                        self.ctx.node.get_block_data(&peer, height),
                    )
                    .await?
                }
            };

            if self.fast_sync_enabled {
                let next = if height < self.target_height {
                    Some(
                        self.bounded(
                            "get_block_data",
                            &*target,
                            self.ctx.node.get_block_data(&peer, height + 1),
                        )
                        .await?,
                    )
                } else {
                    None
                };
                self.ctx
                    .store
                    .store_incoming(&block, next.as_ref(), VerifyMode::Lookahead)?;
                self.lookahead = next.map(|b| (height + 1, b));
                self.fetched_since_audit += 1;
            } else {
                self.ctx.store.store_incoming(&block, None, VerifyMode::Full)?;
            }
            metrics::record_block_fetched();

            if self.fast_sync_enabled && self.fetched_since_audit >= self.ctx.config.audit_interval
            {
                self.fetched_since_audit = 0;
                if !self.audit(&*target).await? {
                    return Ok(Transition::proceed(SyncState::HighestBlock));
                }
            }
        }

        let local_height = self.ctx.store.height();
        if local_height >= self.target_height {
            info!("[sync] Reached target height {}", local_height);
            self.lookahead = None;
            return Ok(Transition::proceed(SyncState::Rebuild));
        }
        debug!(
            "[sync] Fetched to {} of {} from {}",
            local_height,
            self.target_height,
            target.remote_addr()
        );
        Ok(Transition::proceed(SyncState::FetchBlocks))
    }

    /// Compare one random fetched block with the peer's digest.
    ///
    /// On mismatch storage is rolled back to just below the suspect block and
    /// fast sync is disabled. Returns whether the audit passed.
    async fn audit(&mut self, target: &dyn Candidate) -> Result<bool, SyncError> {
        let tip = self.ctx.store.height();
        if tip <= self.pivot_point {
            return Ok(true);
        }
        let height: BlockHeight = self.rng.gen_range(self.pivot_point + 1..=tip);
        let local = self.ctx.store.digest_for_block(height)?;
        let remote = self
            .bounded(
                "remote_digest_of_height",
                target,
                self.ctx.node.remote_digest_of_height(&target.peer_id(), height),
            )
            .await?;

        if local == remote {
            debug!("[sync] Audit passed at {}", height);
            return Ok(true);
        }

        warn!(
            "[sync] Audit failed at {}: local {} peer {} ({}); disabling fast sync",
            height,
            local.short(),
            remote.short(),
            target.remote_addr()
        );
        metrics::record_audit_failure();
        let rollback_to = height - 1;
        self.ctx.store.delete_down_to_block(rollback_to)?;
        self.ctx.store.clear_cache();
        metrics::record_rollback(tip - rollback_to, false);
        self.fast_sync_enabled = false;
        self.lookahead = None;
        Ok(false)
    }

    pub(super) fn on_rebuild(&mut self) -> Result<Transition, SyncError> {
        self.sample_count = 0;
        self.ctx.set_mode(OperatingMode::Normal);
        info!("[sync] Synced at {}", self.ctx.store.height());
        Ok(Transition::wait(SyncState::Sampling))
    }

    pub(super) fn on_sampling(&mut self) -> Result<Transition, SyncError> {
        let connected = self.ctx.node.conn_count();
        if connected < self.ctx.config.min_connected_peers {
            warn!("[sync] Peer count dropped to {}", connected);
            return Ok(Transition::wait(SyncState::Connecting));
        }

        let Some(election) = self.elect()? else {
            return Ok(Transition::wait(SyncState::Sampling));
        };

        let local_height = self.ctx.store.height();
        let compared_at = election.measured_at.min(local_height);
        let local_digest = self.ctx.store.digest_for_block(compared_at)?;
        self.target_height = election.majority_height;
        self.target_candidate = Some(Arc::clone(&election.winner));

        let better = has_better_chain(
            election.majority_height,
            &election.digest,
            local_height,
            &local_digest,
        );
        if better && election.digest != local_digest {
            info!(
                "[sync] Elected chain diverges at {}; detecting fork",
                compared_at
            );
            self.sample_count = 0;
            return Ok(Transition::proceed(SyncState::ForkDetect));
        }

        if election.majority_height > local_height {
            self.sample_count += 1;
            if self.sample_count > self.ctx.config.sampling_limit {
                info!(
                    "[sync] Behind for {} samples ({} < {})",
                    self.sample_count, local_height, election.majority_height
                );
                self.sample_count = 0;
                return Ok(Transition::proceed(SyncState::ForkDetect));
            }
            debug!(
                "[sync] Behind {} < {} (sample {})",
                local_height, election.majority_height, self.sample_count
            );
            return Ok(Transition::wait(SyncState::Sampling));
        }

        self.sample_count = 0;
        Ok(Transition::wait(SyncState::Sampling))
    }
}
