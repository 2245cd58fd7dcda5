//! Peer reputation management

/// The type that tracks the reputation score.
pub type Reputation = i32;

/// The default reputation of a peer
pub const DEFAULT_REPUTATION: Reputation = 0;

/// The minimal unit we're measuring reputation
const REPUTATION_UNIT: i32 = -1024;

/// The reputation value below which a peer is never selected again.
pub const BANNED_REPUTATION: i32 = 50 * REPUTATION_UNIT;

/// The reputation change to apply to a peer that dropped the connection mid request.
const DROPPED_REPUTATION_CHANGE: i32 = 4 * REPUTATION_UNIT;

/// The reputation change to apply to a peer that failed to respond in time.
const TIMEOUT_REPUTATION_CHANGE: i32 = 4 * REPUTATION_UNIT;

/// The reputation change to apply to a peer whose response doesn't match the request.
const BAD_PROTOCOL_REPUTATION_CHANGE: i32 = 16 * REPUTATION_UNIT;

/// The reputation change to apply to a peer that delivered content not matching its hash.
const BAD_DATA_REPUTATION_CHANGE: i32 = 16 * REPUTATION_UNIT;

/// Returns `true` if the given reputation is below the [`BANNED_REPUTATION`] threshold
#[inline]
pub const fn is_banned_reputation(reputation: i32) -> bool {
    reputation < BANNED_REPUTATION
}

/// Various kinds of reputation changes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReputationChangeKind {
    /// Peer failed to respond in time.
    Timeout,
    /// Peer answered with a response that doesn't belong to the request.
    BadProtocol,
    /// Peer delivered content that does not hash to the requested hash.
    BadData,
    /// Connection dropped by peer.
    Dropped,
    /// Reset the reputation to the default value.
    Reset,
    /// Apply a reputation change by value
    Other(Reputation),
}

impl ReputationChangeKind {
    /// Returns true if the reputation change is a [`ReputationChangeKind::Reset`].
    pub const fn is_reset(&self) -> bool {
        matches!(self, Self::Reset)
    }
}

/// How the [`ReputationChangeKind`] are weighted.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReputationChangeWeights {
    /// Weight for [`ReputationChangeKind::Timeout`]
    pub timeout: Reputation,
    /// Weight for [`ReputationChangeKind::BadProtocol`]
    pub bad_protocol: Reputation,
    /// Weight for [`ReputationChangeKind::BadData`]
    pub bad_data: Reputation,
    /// Weight for [`ReputationChangeKind::Dropped`]
    pub dropped: Reputation,
}

// === impl ReputationChangeWeights ===

impl ReputationChangeWeights {
    /// Creates a new instance that doesn't penalize any kind of reputation change.
    pub const fn zero() -> Self {
        Self { timeout: 0, bad_protocol: 0, bad_data: 0, dropped: 0 }
    }

    /// Returns the quantifiable [`ReputationChange`] for the given [`ReputationChangeKind`] using
    /// the configured weights
    pub fn change(&self, kind: ReputationChangeKind) -> ReputationChange {
        match kind {
            ReputationChangeKind::Timeout => self.timeout.into(),
            ReputationChangeKind::BadProtocol => self.bad_protocol.into(),
            ReputationChangeKind::BadData => self.bad_data.into(),
            ReputationChangeKind::Dropped => self.dropped.into(),
            ReputationChangeKind::Reset => DEFAULT_REPUTATION.into(),
            ReputationChangeKind::Other(val) => val.into(),
        }
    }
}

impl Default for ReputationChangeWeights {
    fn default() -> Self {
        Self {
            timeout: TIMEOUT_REPUTATION_CHANGE,
            bad_protocol: BAD_PROTOCOL_REPUTATION_CHANGE,
            bad_data: BAD_DATA_REPUTATION_CHANGE,
            dropped: DROPPED_REPUTATION_CHANGE,
        }
    }
}

/// Represents a change in a peer's reputation.
#[derive(Debug, Copy, Clone, Default)]
pub struct ReputationChange(Reputation);

// === impl ReputationChange ===

impl ReputationChange {
    /// Helper type for easier conversion
    #[inline]
    pub const fn as_i32(self) -> Reputation {
        self.0
    }
}

impl From<ReputationChange> for Reputation {
    fn from(value: ReputationChange) -> Self {
        value.0
    }
}

impl From<Reputation> for ReputationChange {
    fn from(value: Reputation) -> Self {
        Self(value)
    }
}

/// Outcomes when a reputation change is applied to a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReputationChangeOutcome {
    /// Nothing to do.
    None,
    /// The peer crossed the ban threshold.
    Ban,
    /// The peer is no longer banned.
    Unban,
}

/// Applies the change to `reputation` and returns the new value and the outcome.
pub(crate) fn apply_change(
    reputation: Reputation,
    kind: ReputationChangeKind,
    change: ReputationChange,
) -> (Reputation, ReputationChangeOutcome) {
    let was_banned = is_banned_reputation(reputation);
    let new = if kind.is_reset() {
        DEFAULT_REPUTATION
    } else {
        reputation.saturating_add(change.as_i32())
    };
    let outcome = match (was_banned, is_banned_reputation(new)) {
        (false, true) => ReputationChangeOutcome::Ban,
        (true, false) => ReputationChangeOutcome::Unban,
        _ => ReputationChangeOutcome::None,
    };
    (new, outcome)
}
