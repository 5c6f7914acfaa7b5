//! Navigation command vocabulary shared by the note builder, parser and state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Appended to an action that led to the target being lost.
pub const LOST_TARGET_SUFFIX: &str = " — bad action - lost target";

/// Outcome of a single navigation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    Fail,
}

const OPPOSITES: [(&str, &str); 4] = [
    ("go left", "go right"),
    ("go right", "go left"),
    ("go up", "go down"),
    ("go down", "go up"),
];

/// The move that would undo `action`, keeping its distance suffix.
///
/// `go straight` has no entry, so forward moves never produce a reversal.
pub fn opposite_action(action: &str) -> Option<String> {
    OPPOSITES.iter().find_map(|(key, opposite)| {
        action
            .strip_prefix(key)
            .map(|rest| format!("{opposite}{rest}"))
    })
}

/// Action text with any failure marker removed.
pub fn strip_failure_marker(action: &str) -> &str {
    action.split(" —").next().unwrap_or(action)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Straight,
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    fn from_word(word: &str) -> Option<Self> {
        match word {
            "straight" | "forward" => Some(Self::Straight),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            _ => None,
        }
    }
}

/// Typed view of the commands the model is allowed to answer with.
#[derive(Debug, Clone, PartialEq)]
pub enum Move {
    Go { direction: Direction, meters: f64 },
    Done,
    TargetLost,
}

impl Move {
    /// Interpret a reply action. `None` for anything outside the command set.
    pub fn parse(action: &str) -> Option<Self> {
        let lower = action.trim().trim_matches('"').to_lowercase();
        if lower == "done" || lower.starts_with("destination reached") {
            return Some(Self::Done);
        }
        if lower.starts_with("target lost") {
            return Some(Self::TargetLost);
        }

        let mut words = lower.strip_prefix("go ")?.split_whitespace();
        let direction = Direction::from_word(words.next()?)?;
        let amount = words.next()?;
        let number = amount.trim_end_matches(|c: char| c.is_ascii_alphabetic());
        let meters = number.parse::<f64>().ok()?;
        let unit_ok = match (&amount[number.len()..], words.next()) {
            ("m", None) => true,
            ("", Some(unit)) => matches!(unit, "m" | "meter" | "meters"),
            _ => false,
        };
        (unit_ok && meters > 0.0).then_some(Self::Go { direction, meters })
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Go { direction, meters } => {
                let word = match direction {
                    Direction::Straight => "straight",
                    Direction::Left => "left",
                    Direction::Right => "right",
                    Direction::Up => "up",
                    Direction::Down => "down",
                };
                write!(f, "go {word} {meters}m")
            }
            Self::Done => write!(f, "done"),
            Self::TargetLost => write!(f, "target lost"),
        }
    }
}
