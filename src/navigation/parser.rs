use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::navigation::action::Status;

static ACTION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^action:(.*)$").expect("valid action regex"));
static OBSTACLES_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^obstacles:(.*)$").expect("valid obstacles regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub name: String,
    pub status: Status,
}

/// A model reply broken into the fields the action log stores.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    pub action: String,
    pub status: Status,
    pub description: String,
    pub obstacles: Vec<Obstacle>,
}

/// Interpret a free-text reply. Never fails: a reply without an `Action:`
/// line yields an empty action.
pub fn parse_reply(reply: &str) -> ParsedReply {
    let reply = reply.trim();
    let status = if reply.to_lowercase().contains("target lost") {
        Status::Fail
    } else {
        Status::Ok
    };

    let mut action = String::new();
    let mut obstacles = Vec::new();
    let mut description = Vec::new();

    for line in reply.lines().map(str::trim) {
        if let Some(caps) = ACTION_LINE.captures(line) {
            action = caps[1].trim().to_string();
        } else if let Some(caps) = OBSTACLES_LINE.captures(line) {
            let value = caps[1].trim();
            obstacles = if value.eq_ignore_ascii_case("none") {
                Vec::new()
            } else {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(|name| Obstacle {
                        name: name.to_string(),
                        status: Status::Ok,
                    })
                    .collect()
            };
        } else if !line.is_empty() {
            description.push(line);
        }
    }

    ParsedReply {
        action,
        status,
        description: description.join(" "),
        obstacles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_action_obstacles_and_description() {
        let parsed = parse_reply(
            "Action: go left 0.5m\nThe stones are at the left edge.\nA couch blocks the right side.\nObstacles: couch, table\n",
        );
        assert_eq!(parsed.action, "go left 0.5m");
        assert_eq!(parsed.status, Status::Ok);
        assert_eq!(
            parsed.description,
            "The stones are at the left edge. A couch blocks the right side."
        );
        let names: Vec<_> = parsed.obstacles.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, ["couch", "table"]);
        assert!(parsed.obstacles.iter().all(|o| o.status == Status::Ok));
    }

    #[test]
    fn prefixes_match_case_insensitively() {
        let parsed = parse_reply("ACTION: go up 1m\nobstacles: lamp");
        assert_eq!(parsed.action, "go up 1m");
        assert_eq!(parsed.obstacles.len(), 1);
        assert_eq!(parsed.obstacles[0].name, "lamp");
    }

    #[test]
    fn obstacles_none_is_empty() {
        let parsed = parse_reply("Action: go straight 1m\nObstacles: None");
        assert!(parsed.obstacles.is_empty());
        assert_eq!(parsed.description, "");
    }

    #[test]
    fn target_lost_anywhere_fails() {
        let parsed = parse_reply(
            "Action: go straight 1m\nI think TARGET LOST — Return to previous position.",
        );
        assert_eq!(parsed.status, Status::Fail);

        let parsed = parse_reply(
            "Action: Target lost — return to previous position and try a different direction",
        );
        assert_eq!(parsed.status, Status::Fail);
        assert_eq!(
            parsed.action,
            "Target lost — return to previous position and try a different direction"
        );
    }

    #[test]
    fn missing_action_line_leaves_action_empty() {
        let parsed = parse_reply("I cannot decide.\n\nThe room is dark.");
        assert_eq!(parsed.action, "");
        assert_eq!(parsed.status, Status::Ok);
        assert_eq!(parsed.description, "I cannot decide. The room is dark.");
    }

    #[test]
    fn blank_obstacle_names_are_dropped() {
        let parsed = parse_reply("Action: go right 0.3m\nObstacles: chair, ,");
        assert_eq!(parsed.obstacles.len(), 1);
    }
}
