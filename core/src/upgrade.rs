//! Major-version upgrade activation: either a configured hard
//! height or a rolling-window miner vote. Grounded on
//! `original_source/src/CryptoNoteCore/UpgradeDetector.h`'s
//! `BasicUpgradeDetector<BC>` — the `UNDEF_HEIGHT` sentinel, the
//! backward-scanning `init`, and `blockPushed`/`blockPopped`'s distinction
//! between a hard-configured height and a threshold reached by vote are
//! all carried over; the C++ template's `BC` (blockchain) parameter is
//! replaced by a plain timestamp/version callback the caller supplies, so
//! this type stays independent of `core::cache`.

use crate::error::{Error, Result};

/// Sentinel meaning "not yet determined," matching the original's
/// `UNDEF_HEIGHT = 0xFFFFFFFF`.
pub const UNDEFINED_HEIGHT: u32 = u32::MAX;

/// One block's contribution to the vote: its own major/minor version
/// pair, as recorded in [`crate::indices::CachedBlockInfo`]-adjacent state
/// (this type intentionally doesn't depend on `core::cache` — the caller
/// supplies versions via [`UpgradeDetector::block_pushed`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockVersion {
    pub major_version: u8,
    pub minor_version: u8,
}

/// Tracks whether/when the chain has voted in the next major version.
/// One instance per upgrade transition (e.g. one for v1→v2, one for
/// v2→v3), matching the original's one `BasicUpgradeDetector` per
/// transition.
#[derive(Debug, Clone)]
pub struct UpgradeDetector {
    voting_completed: bool,
    voting_complete_height: u32,
    target_major_version: u8,
    /// `None` means this transition is vote-activated; `Some(h)` means a
    /// hard-configured height overrides voting entirely.
    hard_fork_height: Option<u32>,
    upgrade_voting_threshold: u32,
    upgrade_voting_window: u32,
    upgrade_window: u32,
    /// Trailing window of recently pushed versions, oldest first, capped at
    /// `upgrade_voting_window` entries — enough to recompute the vote count
    /// without rescanning the whole chain on every block.
    recent_versions: Vec<BlockVersion>,
}

impl UpgradeDetector {
    #[must_use]
    pub fn new(
        target_major_version: u8,
        hard_fork_height: Option<u32>,
        upgrade_voting_threshold: u32,
        upgrade_voting_window: u32,
        upgrade_window: u32,
    ) -> Self {
        Self {
            voting_completed: false,
            voting_complete_height: UNDEFINED_HEIGHT,
            target_major_version,
            hard_fork_height,
            upgrade_voting_threshold,
            upgrade_voting_window,
            upgrade_window,
            recent_versions: Vec::new(),
        }
    }

    #[must_use]
    pub const fn target_major_version(&self) -> u8 {
        self.target_major_version
    }

    /// `isVotingComplete`: the fraction of the trailing window
    /// voting for the next major version must be at least
    /// `upgrade_voting_threshold` percent. `100 * votes >= threshold *
    /// window_size`, checked against the window actually accumulated so
    /// far (never larger than `upgrade_voting_window`).
    #[must_use]
    fn votes_clear_threshold(&self) -> bool {
        let votes = self
            .recent_versions
            .iter()
            .filter(|v| v.major_version == self.target_major_version - 1 && v.minor_version == 1)
            .count() as u64;
        let window_size = self.recent_versions.len() as u64;
        100 * votes >= u64::from(self.upgrade_voting_threshold) * window_size
    }

    /// `blockPushed`: feed one newly pushed block's version at
    /// `height`. If a hard height is configured, voting state is never
    /// consulted. Otherwise maintains the rolling window and latches
    /// `voting_complete_height` the first time the threshold clears,
    /// `upgrade_window` blocks after the window reached consensus
    /// (mirrors the original's `findVotingCompleteHeight` backward scan,
    /// done incrementally here instead of by rescanning).
    pub fn block_pushed(&mut self, height: u32, version: BlockVersion) {
        if self.hard_fork_height.is_some() {
            return;
        }
        self.recent_versions.push(version);
        if self.recent_versions.len() > self.upgrade_voting_window as usize {
            self.recent_versions.remove(0);
        }
        if !self.voting_completed && self.votes_clear_threshold() {
            self.voting_completed = true;
            self.voting_complete_height = height;
        }
    }

    /// `blockPopped`: the mirror image of
    /// `block_pushed`, used when a block is unwound (a split/rollback).
    /// `version` must be the same version passed to the matching
    /// `block_pushed` call; `height` is that block's height.
    pub fn block_popped(&mut self, height: u32, version: BlockVersion) {
        if self.hard_fork_height.is_some() {
            return;
        }
        if let Some(pos) = self.recent_versions.iter().rposition(|v| *v == version) {
            self.recent_versions.remove(pos);
        }
        if self.voting_completed && height <= self.voting_complete_height {
            self.voting_completed = false;
            self.voting_complete_height = UNDEFINED_HEIGHT;
        }
    }

    /// The height at which `target_major_version` becomes active, if
    /// known: the configured hard height, or `votingCompleteHeight +
    /// upgradeWindow` once voting has completed.
    #[must_use]
    pub fn upgrade_height(&self) -> Option<u32> {
        if let Some(h) = self.hard_fork_height {
            return Some(h);
        }
        if self.voting_completed {
            Some(self.voting_complete_height.saturating_add(self.upgrade_window))
        } else {
            None
        }
    }

    /// Whether `target_major_version` is active at `height`.
    #[must_use]
    pub fn is_upgraded_at(&self, height: u32) -> bool {
        self.upgrade_height().is_some_and(|h| height >= h)
    }

    /// The major version that should be used for a new block at `height`,
    /// given `previous_major_version` (the chain's current version): either
    /// `target_major_version` if upgraded, or unchanged otherwise.
    #[must_use]
    pub fn major_version_for_height(&self, height: u32, previous_major_version: u8) -> u8 {
        if self.is_upgraded_at(height) {
            self.target_major_version
        } else {
            previous_major_version
        }
    }

    /// Rebuilds voting state from a version history (mirrors the
    /// original's `init`):
    /// replays `block_pushed` over every `(height, version)` pair in
    /// ascending height order, for reconstructing a detector after a
    /// restart without persisting its own state separately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InternalError`] if `history` is not in strictly
    /// ascending height order.
    pub fn init(&mut self, history: &[(u32, BlockVersion)]) -> Result<()> {
        self.voting_completed = false;
        self.voting_complete_height = UNDEFINED_HEIGHT;
        self.recent_versions.clear();
        let mut last_height: Option<u32> = None;
        for &(height, version) in history {
            if let Some(last) = last_height {
                if height <= last {
                    return Err(Error::InternalError(
                        "upgrade history must be strictly ascending by height".to_string(),
                    ));
                }
            }
            last_height = Some(height);
            self.block_pushed(height, version);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voting_detector() -> UpgradeDetector {
        UpgradeDetector::new(2, None, 90, 10, 5)
    }

    #[test]
    fn hard_fork_height_overrides_voting() {
        let detector = UpgradeDetector::new(2, Some(1000), 90, 10, 5);
        assert_eq!(detector.upgrade_height(), Some(1000));
        assert!(detector.is_upgraded_at(1000));
        assert!(!detector.is_upgraded_at(999));
    }

    #[test]
    fn voting_completes_once_threshold_is_cleared() {
        // window = 10, threshold = 90% => needs 9 votes in the trailing window.
        let mut detector = voting_detector();
        for height in 0..10u32 {
            detector.block_pushed(height, BlockVersion { major_version: 1, minor_version: 0 });
        }
        assert!(detector.upgrade_height().is_none());

        // Heights 10..18 push 8 voting blocks; each displaces one non-voting
        // block from the 10-wide window, leaving 8 votes: still short.
        for height in 10..18u32 {
            detector.block_pushed(height, BlockVersion { major_version: 1, minor_version: 1 });
        }
        assert!(detector.upgrade_height().is_none());

        // The 9th voting block brings the window to 9/10 votes, clearing 90%.
        detector.block_pushed(18, BlockVersion { major_version: 1, minor_version: 1 });
        let upgrade_height = detector.upgrade_height().expect("threshold cleared at height 18");
        assert_eq!(upgrade_height, 18 + 5);
        assert!(detector.is_upgraded_at(23));
        assert!(!detector.is_upgraded_at(22));
    }

    #[test]
    fn popping_the_completing_block_reverts_voting_state() {
        let mut detector = voting_detector();
        for height in 0..10u32 {
            detector.block_pushed(height, BlockVersion { major_version: 1, minor_version: 0 });
        }
        for height in 10..18u32 {
            detector.block_pushed(height, BlockVersion { major_version: 1, minor_version: 1 });
        }
        assert!(detector.upgrade_height().is_none());

        let completing = BlockVersion { major_version: 1, minor_version: 1 };
        detector.block_pushed(18, completing);
        assert_eq!(detector.voting_complete_height, 18);
        assert!(detector.upgrade_height().is_some());

        detector.block_popped(18, completing);
        assert!(detector.upgrade_height().is_none());
    }

    #[test]
    fn init_rejects_non_ascending_history() {
        let mut detector = voting_detector();
        let history = vec![
            (5, BlockVersion { major_version: 1, minor_version: 1 }),
            (3, BlockVersion { major_version: 1, minor_version: 1 }),
        ];
        assert!(matches!(detector.init(&history), Err(Error::InternalError(_))));
    }
}
