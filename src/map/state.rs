//! The 16-bit state bitmap.

use std::ops::{BitOr, BitOrAssign};

macro_rules! state_atoms {
    ($($name:ident = $bit:expr),* $(,)?) => {
        $(pub const $name: State = State(1 << $bit);)*
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct State(pub u16);

state_atoms! {
    INVALID = 0,
    SUPERSEDED = 1,
    FAILING = 2,
    OFFLINE = 3,
    HAS_REQUIRED_INFO = 4,
    REACHABLE = 5,
    ACTIVE = 6,
    TRUSTED = 7,
    USAGE_DISCOURAGED = 8,
    USAGE_AS_HOME_DISCOURAGED = 9,
    USAGE_AS_DESTINATION_DISCOURAGED = 10,
    IS_HOME_HUB = 11,
    CONNECTIVITY_ISSUES = 12,
    ALLOW_UNENCRYPTED = 13,
}

impl State {
    pub const NONE: State = State(0);

    /// `Regard = Reachable|Active`.
    pub fn regard_default() -> State {
        REACHABLE | ACTIVE
    }

    /// `Disregard = Invalid|Superseded|Failing|Offline|UsageDiscouraged|IsHomeHub`.
    pub fn disregard_default() -> State {
        INVALID | SUPERSEDED | FAILING | OFFLINE | USAGE_DISCOURAGED | IS_HOME_HUB
    }

    pub fn has(self, atom: State) -> bool {
        self.0 & atom.0 == atom.0
    }

    /// True if `self` has at least one bit in common with `mask`.
    pub fn intersects(self, mask: State) -> bool {
        self.0 & mask.0 != 0
    }

    pub fn set(&mut self, atom: State, value: bool) {
        if value {
            self.0 |= atom.0;
        } else {
            self.0 &= !atom.0;
        }
    }

    pub fn regard(self) -> bool {
        self.intersects(Self::regard_default())
    }

    pub fn disregard(self) -> bool {
        self.intersects(Self::disregard_default())
    }
}

impl BitOr for State {
    type Output = State;
    fn bitor(self, rhs: State) -> State {
        State(self.0 | rhs.0)
    }
}

impl BitOrAssign for State {
    fn bitor_assign(&mut self, rhs: State) {
        self.0 |= rhs.0;
    }
}
