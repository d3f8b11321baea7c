//! # Voting
//!
//! Per-round tally electing a (height, digest) pair from the candidate set.
//!
//! ## Algorithm
//!
//! 1. `reset()` clears the table and the height floor.
//! 2. `set_min_height(h)` sets the floor for this round.
//! 3. `vote_by(c)` counts `c` in the electorate and, if `c` reports a height
//!    of at least the floor and a digest at our height, appends it to the
//!    bucket keyed by that digest.
//! 4. `elected_candidate()` picks the bucket with the most votes. Ties go to
//!    the numerically smallest digest. The bucket must hold at least half of
//!    the electorate, otherwise the round is inconclusive.
//!
//! Buckets live in a `BTreeMap`, so scanning them in key order makes the
//! tie-break independent of insertion order.

use shared_types::{BlockHeight, Digest, PeerId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::domain::{SyncError, VotingError};
use crate::ports::Candidate;

/// One vote: a candidate and the height it claims.
#[derive(Clone)]
pub struct Voter {
    /// The voting candidate.
    pub candidate: Arc<dyn Candidate>,
    /// Claimed remote height.
    pub height: BlockHeight,
    /// Local height the claimed digest refers to.
    pub measured_at: BlockHeight,
    /// Cached remote address, used for the deterministic winner pick.
    pub address: String,
}

impl fmt::Debug for Voter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Voter")
            .field("peer", &self.candidate.peer_id().short())
            .field("address", &self.address)
            .field("height", &self.height)
            .field("measured_at", &self.measured_at)
            .finish()
    }
}

/// Outcome of a conclusive election.
#[derive(Clone)]
pub struct ElectionResult {
    /// Votes in the winning bucket.
    pub highest_num_votes: usize,
    /// Candidate to sync from.
    pub winner: Arc<dyn Candidate>,
    /// Winning digest at our height.
    pub digest: Digest,
    /// Most common height claimed inside the winning bucket.
    pub majority_height: BlockHeight,
    /// Local height the winning digest refers to.
    pub measured_at: BlockHeight,
    /// Another bucket had the same vote count.
    pub draw: bool,
    /// Candidates offered this round.
    pub electorate: usize,
}

impl fmt::Debug for ElectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElectionResult")
            .field("highest_num_votes", &self.highest_num_votes)
            .field("winner", &self.winner.remote_addr())
            .field("digest", &self.digest.short())
            .field("majority_height", &self.majority_height)
            .field("measured_at", &self.measured_at)
            .field("draw", &self.draw)
            .field("electorate", &self.electorate)
            .finish()
    }
}

/// Election tally. Owned exclusively by the election call.
#[derive(Default)]
pub struct Voting {
    min_height: BlockHeight,
    buckets: BTreeMap<Digest, Vec<Voter>>,
    electorate: usize,
    voted: HashSet<PeerId>,
}

impl Voting {
    /// Empty tally.
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude candidates reporting a height below `height` this round.
    pub fn set_min_height(&mut self, height: BlockHeight) {
        self.min_height = height;
    }

    /// Current height floor.
    pub fn min_height(&self) -> BlockHeight {
        self.min_height
    }

    /// Offer `candidate` to the election.
    ///
    /// Returns `Ok(true)` if a vote was recorded. A candidate already offered
    /// this round, one below the floor, or one with no digest is ignored.
    /// Fails only if the candidate has no metrics record.
    pub fn vote_by(&mut self, candidate: &Arc<dyn Candidate>) -> Result<bool, SyncError> {
        let peer = candidate.peer_id();
        if self.voted.contains(&peer) {
            return Ok(false);
        }

        let metrics = candidate.metrics()?;
        self.voted.insert(peer);
        self.electorate += 1;

        if metrics.remote_height < self.min_height {
            return Ok(false);
        }
        let Some(digest) = metrics.remote_digest_of_local_height else {
            return Ok(false);
        };

        self.buckets.entry(digest).or_default().push(Voter {
            candidate: Arc::clone(candidate),
            height: metrics.remote_height,
            measured_at: metrics.local_height_at_request_time,
            address: candidate.remote_addr(),
        });
        Ok(true)
    }

    /// Votes recorded for `digest` this round.
    pub fn num_vote_of_digest(&self, digest: &Digest) -> usize {
        self.buckets.get(digest).map_or(0, Vec::len)
    }

    /// Per-digest vote counts in digest order.
    pub fn tally(&self) -> Vec<(Digest, usize)> {
        self.buckets.iter().map(|(d, v)| (*d, v.len())).collect()
    }

    /// Candidates offered this round.
    pub fn electorate(&self) -> usize {
        self.electorate
    }

    /// Clear the table and the height floor.
    pub fn reset(&mut self) {
        self.min_height = 0;
        self.buckets.clear();
        self.electorate = 0;
        self.voted.clear();
    }

    /// Elect the winning bucket.
    pub fn elected_candidate(&self) -> Result<ElectionResult, VotingError> {
        let highest = self.buckets.values().map(Vec::len).max().unwrap_or(0);
        if highest == 0 || 2 * highest < self.electorate {
            return Err(VotingError::InsufficientVotes {
                highest,
                electorate: self.electorate,
            });
        }

        let mut top = self.buckets.iter().filter(|(_, v)| v.len() == highest);
        let Some((digest, voters)) = top.next() else {
            return Err(VotingError::InsufficientVotes {
                highest,
                electorate: self.electorate,
            });
        };
        let draw = top.next().is_some();

        let majority_height =
            majority_height(voters).ok_or(VotingError::EmptyWinner(*digest))?;
        let winner = voters
            .iter()
            .filter(|v| v.height == majority_height)
            .min_by(|a, b| a.address.cmp(&b.address))
            .ok_or(VotingError::EmptyWinner(*digest))?;

        Ok(ElectionResult {
            highest_num_votes: highest,
            winner: Arc::clone(&winner.candidate),
            digest: *digest,
            majority_height,
            measured_at: winner.measured_at,
            draw,
            electorate: self.electorate,
        })
    }
}

/// Most common claimed height; the higher one on ties.
fn majority_height(voters: &[Voter]) -> Option<BlockHeight> {
    let mut counts: HashMap<BlockHeight, usize> = HashMap::new();
    for voter in voters {
        *counts.entry(voter.height).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|(ha, ca), (hb, cb)| ca.cmp(cb).then(ha.cmp(hb)))
        .map(|(height, _)| height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CandidateMetrics;
    use crate::testing::StaticCandidate;
    use proptest::prelude::*;

    fn d(b: u8) -> Digest {
        Digest([b; 32])
    }

    fn cast(voting: &mut Voting, candidates: &[Arc<dyn Candidate>]) {
        for c in candidates {
            voting.vote_by(c).unwrap();
        }
    }

    #[test]
    fn test_scenario_a_majority_elects() {
        let candidates = vec![
            StaticCandidate::voting(1, 100, d(1)).arc(),
            StaticCandidate::voting(2, 100, d(1)).arc(),
            StaticCandidate::voting(3, 100, d(1)).arc(),
            StaticCandidate::voting(4, 100, d(2)).arc(),
            StaticCandidate::voting(5, 100, d(2)).arc(),
        ];
        let mut voting = Voting::new();
        cast(&mut voting, &candidates);

        let result = voting.elected_candidate().unwrap();
        assert_eq!(result.digest, d(1));
        assert_eq!(result.majority_height, 100);
        assert_eq!(result.highest_num_votes, 3);
        assert!(!result.draw);
    }

    #[test]
    fn test_scenario_b_tie_goes_to_smaller_digest() {
        let candidates = vec![
            StaticCandidate::voting(1, 100, d(2)).arc(),
            StaticCandidate::voting(2, 100, d(1)).arc(),
            StaticCandidate::voting(3, 100, d(2)).arc(),
            StaticCandidate::voting(4, 100, d(1)).arc(),
        ];
        let mut voting = Voting::new();
        cast(&mut voting, &candidates);

        let result = voting.elected_candidate().unwrap();
        assert_eq!(result.digest, d(1));
        assert!(result.draw);
    }

    #[test]
    fn test_scenario_c_single_vote_is_insufficient() {
        let mut candidates = vec![StaticCandidate::voting(1, 100, d(1)).arc()];
        for i in 2..=5 {
            candidates.push(StaticCandidate::voting(i, 100, d(i)).arc());
        }
        let mut voting = Voting::new();
        cast(&mut voting, &candidates);

        assert_eq!(voting.num_vote_of_digest(&d(1)), 1);
        assert_eq!(
            voting.elected_candidate().unwrap_err(),
            VotingError::InsufficientVotes {
                highest: 1,
                electorate: 5
            }
        );
    }

    #[test]
    fn test_three_way_tie_is_inconclusive() {
        let candidates = vec![
            StaticCandidate::voting(1, 100, d(9)).arc(),
            StaticCandidate::voting(2, 100, d(5)).arc(),
            StaticCandidate::voting(3, 100, d(7)).arc(),
        ];
        let mut voting = Voting::new();
        cast(&mut voting, &candidates);

        // 1 of 3 is below half of the electorate
        assert!(voting.elected_candidate().is_err());

        let mut voting = Voting::new();
        let paired: Vec<_> = (1..=6)
            .map(|i| StaticCandidate::voting(i, 100, d([9, 5, 7][(i as usize - 1) % 3])).arc())
            .collect();
        cast(&mut voting, &paired);
        let result = voting.elected_candidate();
        // 2 of 6 is still short of half
        assert!(result.is_err());
        assert_eq!(voting.tally(), vec![(d(5), 2), (d(7), 2), (d(9), 2)]);
    }

    #[test]
    fn test_min_height_filters_stale_candidates() {
        let mut voting = Voting::new();
        voting.set_min_height(100);
        let low = StaticCandidate::voting(1, 99, d(1)).arc();
        assert!(!voting.vote_by(&low).unwrap());
        assert!(voting.tally().is_empty());
        assert_eq!(voting.electorate(), 1);
    }

    #[test]
    fn test_candidate_without_digest_is_ignored() {
        let mut voting = Voting::new();
        let silent = StaticCandidate::new(1, "10.0.0.1:30303", Default::default()).arc();
        assert!(!voting.vote_by(&silent).unwrap());
        assert!(voting.tally().is_empty());
    }

    #[test]
    fn test_candidate_votes_once_per_round() {
        let mut voting = Voting::new();
        let c = StaticCandidate::voting(1, 100, d(1)).arc();
        assert!(voting.vote_by(&c).unwrap());
        assert!(!voting.vote_by(&c).unwrap());
        assert_eq!(voting.num_vote_of_digest(&d(1)), 1);
        assert_eq!(voting.electorate(), 1);
    }

    /// Reports a newer refresh on every `metrics()` call.
    struct RefreshingCandidate {
        index: u8,
        reads: std::sync::atomic::AtomicU64,
    }

    impl Candidate for RefreshingCandidate {
        fn peer_id(&self) -> PeerId {
            PeerId([self.index; 32])
        }

        fn remote_addr(&self) -> String {
            format!("10.0.0.{}:30303", self.index)
        }

        fn name(&self) -> String {
            format!("peer-{}", self.index)
        }

        fn metrics(&self) -> Result<CandidateMetrics, SyncError> {
            let n = self
                .reads
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(CandidateMetrics {
                remote_height: 100 + n,
                local_height_at_request_time: 50 + n,
                remote_digest_of_local_height: Some(d(n as u8)),
                ..Default::default()
            })
        }
    }

    #[test]
    fn test_vote_reads_one_metrics_snapshot() {
        let refreshing: Vec<Arc<RefreshingCandidate>> = (1..=3)
            .map(|index| {
                Arc::new(RefreshingCandidate {
                    index,
                    reads: Default::default(),
                })
            })
            .collect();
        let candidates: Vec<Arc<dyn Candidate>> = refreshing
            .iter()
            .map(|c| Arc::clone(c) as Arc<dyn Candidate>)
            .collect();

        let mut voting = Voting::new();
        cast(&mut voting, &candidates);

        let result = voting.elected_candidate().unwrap();
        assert_eq!(result.digest, d(0));
        assert_eq!(result.majority_height, 100);
        assert_eq!(result.measured_at, 50);
        for c in &refreshing {
            assert_eq!(c.reads.load(std::sync::atomic::Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_missing_metrics_is_invariant_violation() {
        let mut voting = Voting::new();
        let broken = StaticCandidate::without_metrics(1).arc();
        let err = voting.vote_by(&broken).unwrap_err();
        assert!(err.is_invariant_violation());
        assert_eq!(voting.electorate(), 0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut voting = Voting::new();
        voting.set_min_height(50);
        cast(
            &mut voting,
            &[
                StaticCandidate::voting(1, 100, d(1)).arc(),
                StaticCandidate::voting(2, 100, d(1)).arc(),
            ],
        );
        assert!(voting.elected_candidate().is_ok());

        voting.reset();
        assert_eq!(voting.min_height(), 0);
        assert!(voting.tally().is_empty());
        assert!(matches!(
            voting.elected_candidate(),
            Err(VotingError::InsufficientVotes { highest: 0, .. })
        ));
    }

    #[test]
    fn test_majority_height_prefers_most_common_then_highest() {
        let candidates = vec![
            StaticCandidate::voting(1, 120, d(1)).arc(),
            StaticCandidate::voting(2, 110, d(1)).arc(),
            StaticCandidate::voting(3, 110, d(1)).arc(),
            StaticCandidate::voting(4, 130, d(1)).arc(),
        ];
        let mut voting = Voting::new();
        cast(&mut voting, &candidates);
        let result = voting.elected_candidate().unwrap();
        assert_eq!(result.majority_height, 110);
        assert_eq!(result.winner.remote_addr(), "10.0.0.2:30303");

        let even = vec![
            StaticCandidate::voting(1, 120, d(1)).arc(),
            StaticCandidate::voting(2, 110, d(1)).arc(),
        ];
        let mut voting = Voting::new();
        cast(&mut voting, &even);
        assert_eq!(voting.elected_candidate().unwrap().majority_height, 120);
    }

    proptest! {
        #[test]
        fn prop_election_is_order_independent(
            votes in prop::collection::vec((0u8..3, 90u64..110), 1..12),
            seed in any::<u64>(),
        ) {
            let candidates: Vec<Arc<dyn Candidate>> = votes
                .iter()
                .enumerate()
                .map(|(i, (digest, height))| {
                    StaticCandidate::voting(i as u8 + 1, *height, d(*digest)).arc()
                })
                .collect();

            let mut shuffled = candidates.clone();
            // deterministic Fisher-Yates driven by the seed
            let mut state = seed;
            for i in (1..shuffled.len()).rev() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let j = (state >> 33) as usize % (i + 1);
                shuffled.swap(i, j);
            }

            let mut forward = Voting::new();
            let mut permuted = Voting::new();
            for c in &candidates {
                forward.vote_by(c).unwrap();
            }
            for c in &shuffled {
                permuted.vote_by(c).unwrap();
            }

            match (forward.elected_candidate(), permuted.elected_candidate()) {
                (Ok(a), Ok(b)) => {
                    prop_assert_eq!(a.digest, b.digest);
                    prop_assert_eq!(a.majority_height, b.majority_height);
                    prop_assert_eq!(a.winner.remote_addr(), b.winner.remote_addr());
                    prop_assert_eq!(a.draw, b.draw);
                }
                (Err(a), Err(b)) => prop_assert_eq!(a, b),
                _ => prop_assert!(false, "outcome depends on vote order"),
            }
        }

        #[test]
        fn prop_below_floor_leaves_tally_unchanged(
            floor in 1u64..1000,
            below in 0u64..1000,
        ) {
            let height = below % floor;
            let mut voting = Voting::new();
            voting.set_min_height(floor);
            let existing = StaticCandidate::voting(1, floor, d(1)).arc();
            voting.vote_by(&existing).unwrap();
            let before = voting.tally();

            let c = StaticCandidate::voting(2, height, d(2)).arc();
            prop_assert!(!voting.vote_by(&c).unwrap());
            prop_assert_eq!(voting.tally(), before);
        }
    }
}
