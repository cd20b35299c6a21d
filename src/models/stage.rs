use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

pub const TOTAL_STAGES: u8 = 7;

/// A validated interview stage number in `1..=7`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct StageNumber(u8);

impl StageNumber {
    pub const FIRST: StageNumber = StageNumber(1);
    pub const FINAL: StageNumber = StageNumber(TOTAL_STAGES);

    pub fn new(n: u8) -> Result<Self> {
        if (1..=TOTAL_STAGES).contains(&n) {
            Ok(Self(n))
        } else {
            Err(Error::Validation(format!(
                "Invalid stage number {}: must be between 1 and {}",
                n, TOTAL_STAGES
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    pub fn next(self) -> Option<Self> {
        Self::new(self.0 + 1).ok()
    }

    pub fn previous(self) -> Option<Self> {
        Self::new(self.0.saturating_sub(1)).ok()
    }

    pub fn is_final(self) -> bool {
        self.0 == TOTAL_STAGES
    }

    pub fn all() -> impl Iterator<Item = StageNumber> {
        (1..=TOTAL_STAGES).map(StageNumber)
    }

    pub fn info(self) -> StageInfo {
        STAGE_CATALOG[self.index()]
    }
}

impl TryFrom<u8> for StageNumber {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<StageNumber> for u8 {
    fn from(stage: StageNumber) -> u8 {
        stage.0
    }
}

impl fmt::Display for StageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageInfo {
    pub name: &'static str,
    pub description: &'static str,
    /// Key of the stage-specific evaluation form on the wire.
    pub evaluation_key: &'static str,
}

const STAGE_CATALOG: [StageInfo; TOTAL_STAGES as usize] = [
    StageInfo {
        name: "HR Screening",
        description: "Initial screening with MCQ test and communication assessment",
        evaluation_key: "stage1_hr_screening",
    },
    StageInfo {
        name: "Hands-On Practical LAB Test",
        description: "Technical coding/assessment",
        evaluation_key: "stage2_practical_lab",
    },
    StageInfo {
        name: "Technical Round",
        description: "Technical interview with detailed feedback",
        evaluation_key: "stage3_technical_interview",
    },
    StageInfo {
        name: "HR Round",
        description: "HR interview with comprehensive ratings",
        evaluation_key: "stage4_hr_round",
    },
    StageInfo {
        name: "BU Lead Interview",
        description: "Business Unit Lead interview",
        evaluation_key: "stage5_bu_lead_interview",
    },
    StageInfo {
        name: "CEO Interview",
        description: "Final CEO interview",
        evaluation_key: "stage6_ceo_interview",
    },
    StageInfo {
        name: "Final Recommendation & Offer",
        description: "Final decision and recommendations",
        evaluation_key: "stage7_final_recommendation",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_numbers() {
        assert!(StageNumber::new(0).is_err());
        assert!(StageNumber::new(8).is_err());
        assert_eq!(StageNumber::new(7).unwrap(), StageNumber::FINAL);
    }

    #[test]
    fn next_stops_at_final() {
        assert_eq!(StageNumber::FIRST.next().map(StageNumber::get), Some(2));
        assert_eq!(StageNumber::FINAL.next(), None);
        assert_eq!(StageNumber::FIRST.previous(), None);
    }

    #[test]
    fn deserializing_validates_range() {
        let ok: StageNumber = serde_json::from_str("4").unwrap();
        assert_eq!(ok.get(), 4);
        assert!(serde_json::from_str::<StageNumber>("9").is_err());
    }

    #[test]
    fn catalog_names_match_stage_order() {
        assert_eq!(StageNumber::FIRST.info().name, "HR Screening");
        assert_eq!(StageNumber::FINAL.info().evaluation_key, "stage7_final_recommendation");
    }
}
