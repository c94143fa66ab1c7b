use serde::{Deserialize, Serialize};

/// Logical scheduler tick. Decay and reinforcement are counted in ticks,
/// never in wall-clock time, so a paused scheduler freezes every intention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Tick {
    pub frame: u64,
}

impl Tick {
    pub fn new() -> Self {
        Tick { frame: 0 }
    }

    pub fn next(&self) -> Self {
        Tick { frame: self.frame + 1 }
    }
}
