use serde::Serialize;

/// Identity of one turn within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TurnId {
    pub session_id: uuid::Uuid,
    pub sequence: u64,
    pub turn_id: uuid::Uuid,
}

/// Explicit session context threaded into the aggregator.
///
/// Session and turn identifiers derive from the supplied random source, so a
/// seeded [`fastrand::Rng`] yields reproducible ids.
#[derive(Debug, Clone)]
pub struct SessionContext {
    seed: u128,
    session_id: uuid::Uuid,
    sequence: u64,
}

impl SessionContext {
    #[must_use]
    pub fn new() -> Self {
        Self::from_rng(&mut fastrand::Rng::new())
    }

    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(&mut fastrand::Rng::with_seed(seed))
    }

    #[must_use]
    pub fn from_rng(rng: &mut fastrand::Rng) -> Self {
        let session_hi = u128::from(rng.u64(..));
        let session_lo = u128::from(rng.u64(..));
        let seed_hi = u128::from(rng.u64(..));
        let seed_lo = u128::from(rng.u64(..));
        Self {
            seed: (seed_hi << 64) | seed_lo,
            session_id: uuid::Uuid::from_u128((session_hi << 64) | session_lo),
            sequence: 0,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> uuid::Uuid {
        self.session_id
    }

    /// Number of turns started so far.
    #[must_use]
    pub fn turns_started(&self) -> u64 {
        self.sequence
    }

    pub fn next_turn(&mut self) -> TurnId {
        self.sequence += 1;
        TurnId {
            session_id: self.session_id,
            sequence: self.sequence,
            turn_id: uuid::Uuid::from_u128(self.seed ^ u128::from(self.sequence)),
        }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}
