//! The two parallel progression tracks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of two parallel, independently-progressing instances of the same
/// chapter/step configuration. Both tracks read the identical catalog but
/// hold their own contact roster and progress rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Track {
    /// Rehearsal track used to dry-run chapters before going live.
    Test,
    /// The live track the player actually experiences.
    Live,
}

impl Track {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Live => "live",
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Track {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "test" => Ok(Self::Test),
            "live" => Ok(Self::Live),
            other => Err(format!("unknown track: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_round_trips_through_str() {
        assert_eq!("test".parse::<Track>().unwrap(), Track::Test);
        assert_eq!("live".parse::<Track>().unwrap(), Track::Live);
        assert_eq!(Track::Test.as_str(), "test");
        assert_eq!(Track::Live.to_string(), "live");
    }

    #[test]
    fn test_unknown_track_is_rejected() {
        assert!("staging".parse::<Track>().is_err());
    }
}
