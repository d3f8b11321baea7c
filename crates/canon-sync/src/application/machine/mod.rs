//! # Sync Machine
//!
//! Single-task state machine driving chain selection and resynchronization.
//!
//! ```text
//! Connecting ──► HighestBlock ──► ForkDetect ──► FetchBlocks ──► Rebuild ──► Sampling
//!      ▲              │  ▲            │  ▲            │                         │
//!      │              │  └────────────┘  └────────────┼── audit mismatch / error │
//!      │              └──► Rebuild (identical)        │                         │
//!      └───────────────────────── peers lost ─────────┴─────────────────────────┘
//! ```
//!
//! One transition function per state returns the next state and whether to
//! continue in the same cycle or wait for the next tick. Errors are folded
//! into a transition here, never propagated out of the loop.

mod transitions;


use rand::rngs::StdRng;
use rand::SeedableRng;
use shared_types::{BlockHeight, RawBlock};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::context::SyncContext;
use crate::algorithms::{ElectionResult, Voting};
use crate::domain::{SyncError, SyncState, SyncStatus, MAX_TRANSITIONS_PER_CYCLE};
use crate::metrics;
use crate::ports::Candidate;

/// Whether the cycle continues after a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Run the next state's transition immediately.
    Continue,
    /// Stop until the next cycle tick.
    Yield,
}

/// Result of one transition function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    /// State to enter.
    pub next: SyncState,
    /// Continue or wait.
    pub flow: Flow,
}

impl Transition {
    /// Enter `next` and keep going.
    pub fn proceed(next: SyncState) -> Self {
        Self {
            next,
            flow: Flow::Continue,
        }
    }

    /// Enter `next` and wait for the next tick.
    pub fn wait(next: SyncState) -> Self {
        Self {
            next,
            flow: Flow::Yield,
        }
    }
}

/// The sync state machine.
pub struct Machine {
    ctx: Arc<SyncContext>,
    voting: Voting,
    state: SyncState,
    target_height: BlockHeight,
    target_candidate: Option<Arc<dyn Candidate>>,
    fast_sync_enabled: bool,
    pivot_point: BlockHeight,
    start_block_number: BlockHeight,
    sample_count: u32,
    fetched_since_audit: u64,
    lookahead: Option<(BlockHeight, RawBlock)>,
    rng: StdRng,
}

impl Machine {
    /// Machine in `Connecting`.
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self::with_rng(ctx, StdRng::from_entropy())
    }

    /// Machine with a seeded audit RNG.
    pub fn with_seed(ctx: Arc<SyncContext>, seed: u64) -> Self {
        Self::with_rng(ctx, StdRng::seed_from_u64(seed))
    }

    fn with_rng(ctx: Arc<SyncContext>, rng: StdRng) -> Self {
        let fast_sync_enabled = ctx.config.fast_sync_enabled;
        Self {
            ctx,
            voting: Voting::new(),
            state: SyncState::Connecting,
            target_height: 0,
            target_candidate: None,
            fast_sync_enabled,
            pivot_point: 0,
            start_block_number: 0,
            sample_count: 0,
            fetched_since_audit: 0,
            lookahead: None,
            rng,
        }
    }

    /// Current state.
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Height being synced to.
    pub fn target_height(&self) -> BlockHeight {
        self.target_height
    }

    /// Whether fast sync is still enabled.
    pub fn fast_sync_enabled(&self) -> bool {
        self.fast_sync_enabled
    }

    /// Common ancestor found by the last fork walk.
    pub fn pivot_point(&self) -> BlockHeight {
        self.pivot_point
    }

    /// First height fetched after the last fork walk.
    pub fn start_block_number(&self) -> BlockHeight {
        self.start_block_number
    }

    /// Consecutive samples spent behind.
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Run cycles on the configured timer until `shutdown` flips.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.ctx.config.cycle_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("[sync] Machine started in {}", self.state);
        self.publish();

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            self.cycle().await;
        }
        info!("[sync] Machine stopped in {}", self.state);
    }

    /// Chain transitions until one yields. Returns how many ran.
    pub async fn cycle(&mut self) -> usize {
        for ran in 1..=MAX_TRANSITIONS_PER_CYCLE {
            let transition = self.step().await;
            if transition.flow == Flow::Yield || self.ctx.is_shutting_down() {
                return ran;
            }
        }
        debug!(
            "[sync] Cycle hit {} transitions in {}",
            MAX_TRANSITIONS_PER_CYCLE, self.state
        );
        MAX_TRANSITIONS_PER_CYCLE
    }

    /// Run the current state's transition and enter the next state.
    pub async fn step(&mut self) -> Transition {
        let from = self.state;
        let outcome = match from {
            SyncState::Connecting => self.on_connecting(),
            SyncState::HighestBlock => self.on_highest_block(),
            SyncState::ForkDetect => self.on_fork_detect().await,
            SyncState::FetchBlocks => self.on_fetch_blocks().await,
            SyncState::Rebuild => self.on_rebuild(),
            SyncState::Sampling => self.on_sampling(),
        };
        let transition = outcome.unwrap_or_else(|e| self.recover(from, e));
        self.enter(transition.next);
        transition
    }

    fn recover(&mut self, from: SyncState, err: SyncError) -> Transition {
        self.lookahead = None;
        if err.is_invariant_violation() {
            error!("[sync] {} in {}; resetting", err, from);
            self.reset();
            return Transition::wait(SyncState::Connecting);
        }

        let retry = match from {
            SyncState::ForkDetect | SyncState::FetchBlocks => SyncState::HighestBlock,
            other => other,
        };
        warn!("[sync] {} failed ({}): {}; retry via {}", from, err.kind(), err, retry);
        Transition::wait(retry)
    }

    fn reset(&mut self) {
        self.voting.reset();
        self.target_height = 0;
        self.target_candidate = None;
        self.sample_count = 0;
        self.fetched_since_audit = 0;
        self.lookahead = None;
    }

    fn enter(&mut self, next: SyncState) {
        if next != self.state {
            debug!("[sync] {} -> {}", self.state, next);
            self.state = next;
        }
        metrics::record_transition(next);
        self.publish();
    }

    fn publish(&self) {
        self.ctx.publish_status(SyncStatus {
            state: self.state,
            local_height: self.ctx.store.height(),
            target_height: self.target_height,
            target_peer: self.target_candidate.as_ref().map(|c| c.remote_addr()),
            fast_sync_enabled: self.fast_sync_enabled,
            operating_mode: self.ctx.operating_mode(),
            sample_count: self.sample_count,
        });
    }

    /// Fresh election over the current candidates, floored at our height.
    ///
    /// `Ok(None)` means the round was inconclusive.
    fn elect(&mut self) -> Result<Option<ElectionResult>, SyncError> {
        self.voting.reset();
        self.voting.set_min_height(self.ctx.store.height());
        for candidate in self.ctx.candidates.candidates() {
            self.voting.vote_by(&candidate)?;
        }

        match self.voting.elected_candidate() {
            Ok(result) => {
                metrics::record_election("elected", result.draw);
                debug!("[sync] Elected {:?} from {:?}", result, self.voting.tally());
                Ok(Some(result))
            }
            Err(e) => {
                metrics::record_election("inconclusive", false);
                debug!("[sync] No election: {}", e);
                Ok(None)
            }
        }
    }

    /// Apply the request deadline to a Node call.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        candidate: &dyn Candidate,
        request: impl Future<Output = Result<T, SyncError>>,
    ) -> Result<T, SyncError> {
        timeout(self.ctx.config.request_timeout(), request)
            .await
            .map_err(|_| SyncError::Timeout {
                operation,
                peer: candidate.remote_addr(),
            })?
    }
}
