use serde::{Deserialize, Serialize};

/// The six stages of a retrospective, in strict session order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Waiting,
    Adding,
    Grouping,
    Voting,
    Discussion,
    Complete,
}

/// Session order used for transition validation.
const ORDER: [Phase; 6] = [
    Phase::Waiting,
    Phase::Adding,
    Phase::Grouping,
    Phase::Voting,
    Phase::Discussion,
    Phase::Complete,
];

impl Phase {
    fn index(self) -> usize {
        ORDER.iter().position(|p| *p == self).unwrap_or(0)
    }

    /// A transition is legal only one step forward or one step back,
    /// and never out of `complete`.
    pub fn can_advance(self, requested: Phase) -> bool {
        if self == Phase::Complete {
            return false;
        }
        let from = self.index();
        let to = requested.index();
        to == from + 1 || to + 1 == from
    }

    /// Phases that expose the board with vote counts on entry.
    pub fn reveals_board(self) -> bool {
        matches!(
            self,
            Phase::Grouping | Phase::Voting | Phase::Discussion | Phase::Complete
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Adding => write!(f, "adding"),
            Self::Grouping => write!(f, "grouping"),
            Self::Voting => write!(f, "voting"),
            Self::Discussion => write!(f, "discussion"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

impl std::str::FromStr for Phase {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "adding" => Ok(Self::Adding),
            "grouping" => Ok(Self::Grouping),
            "voting" => Ok(Self::Voting),
            "discussion" => Ok(Self::Discussion),
            "complete" => Ok(Self::Complete),
            other => Err(format!("unknown phase: {other}")),
        }
    }
}
