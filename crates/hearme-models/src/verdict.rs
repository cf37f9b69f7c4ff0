//! Match verdicts.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome label reported to the learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum MatchStatus {
    #[serde(rename = "Match!")]
    Match,
    #[serde(rename = "Not Match")]
    NotMatch,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Match => "Match!",
            MatchStatus::NotMatch => "Not Match",
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, MatchStatus::Match)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of scoring one candidate embedding against a reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Verdict {
    /// Raw cosine similarity in [-1, 1].
    pub similarity: f32,
    pub status: MatchStatus,
}

impl Verdict {
    pub fn is_match(&self) -> bool {
        self.status.is_match()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&MatchStatus::Match).unwrap(),
            "\"Match!\""
        );
        assert_eq!(
            serde_json::to_string(&MatchStatus::NotMatch).unwrap(),
            "\"Not Match\""
        );
    }

    #[test]
    fn test_verdict_serialization() {
        let verdict = Verdict {
            similarity: 0.62,
            status: MatchStatus::Match,
        };
        let json = serde_json::to_value(verdict).unwrap();
        assert_eq!(json["status"], "Match!");
        assert!(verdict.is_match());
    }
}
