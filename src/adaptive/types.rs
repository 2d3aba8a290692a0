use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Review outcome on the 1–4 grading scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Again,
    Hard,
    Good,
    Easy,
}

impl Quality {
    pub const ALL: [Quality; 4] = [Quality::Again, Quality::Hard, Quality::Good, Quality::Easy];

    pub fn from_grade(grade: u8) -> Option<Self> {
        match grade {
            1 => Some(Self::Again),
            2 => Some(Self::Hard),
            3 => Some(Self::Good),
            4 => Some(Self::Easy),
            _ => None,
        }
    }

    pub fn grade(self) -> u8 {
        match self {
            Self::Again => 1,
            Self::Hard => 2,
            Self::Good => 3,
            Self::Easy => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Again => "again",
            Self::Hard => "hard",
            Self::Good => "good",
            Self::Easy => "easy",
        }
    }

    pub fn is_lapse(self) -> bool {
        self == Self::Again
    }
}

impl TryFrom<u8> for Quality {
    type Error = EngineError;

    fn try_from(grade: u8) -> Result<Self, Self::Error> {
        Self::from_grade(grade)
            .ok_or_else(|| EngineError::invalid_input(format!("quality must be 1-4, got {grade}")))
    }
}

impl FromStr for Quality {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "again" | "1" => Ok(Self::Again),
            "hard" | "2" => Ok(Self::Hard),
            "good" | "3" => Ok(Self::Good),
            "easy" | "4" => Ok(Self::Easy),
            other => Err(EngineError::invalid_input(format!("unknown rating '{other}'"))),
        }
    }
}

/// How much autonomy the engine has over difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyMode {
    Manual,
    Guided,
    Balanced,
    Automatic,
}

impl DifficultyMode {
    pub const ALL: [DifficultyMode; 4] = [
        DifficultyMode::Manual,
        DifficultyMode::Guided,
        DifficultyMode::Balanced,
        DifficultyMode::Automatic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Guided => "guided",
            Self::Balanced => "balanced",
            Self::Automatic => "automatic",
        }
    }
}

impl fmt::Display for DifficultyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DifficultyMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "guided" => Ok(Self::Guided),
            "balanced" => Ok(Self::Balanced),
            "automatic" => Ok(Self::Automatic),
            other => Err(EngineError::invalid_input(format!(
                "unknown difficulty mode '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyVsPerformance {
    TooEasy,
    Appropriate,
    TooHard,
}

/// Rounds to the nearest multiple of 0.5.
pub fn round_to_half(value: f64) -> f64 {
    (value * 2.0).round() / 2.0
}
