use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FinalStatus {
    Select,
    Hold,
    Reject,
}

impl fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FinalStatus::Select => "Select",
            FinalStatus::Hold => "Hold",
            FinalStatus::Reject => "Reject",
        };
        f.write_str(s)
    }
}

/// Terminal hire decision recorded on stage 7.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalRecommendation {
    pub status: FinalStatus,
    pub cumulative_scale: u8,
    pub suggestions: String,
}
