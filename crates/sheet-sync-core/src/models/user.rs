//! Editor identity and roles

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Sheet permissions role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Role {
    /// Regular player
    #[default]
    #[serde(alias = "User")]
    Player,
    /// May edit locked fields
    DungeonMaster,
}

impl Role {
    pub const fn can_edit_locked(self) -> bool {
        matches!(self, Self::DungeonMaster)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Player => f.write_str("player"),
            Self::DungeonMaster => f.write_str("dungeon-master"),
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "player" | "user" => Ok(Self::Player),
            "dm" | "dungeon-master" | "dungeonmaster" => Ok(Self::DungeonMaster),
            other => Err(Error::Config(format!("unknown role '{other}'"))),
        }
    }
}

/// A person editing sheets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub role: Role,
}

impl User {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_dungeon_master_edits_locked_fields() {
        assert!(Role::DungeonMaster.can_edit_locked());
        assert!(!Role::Player.can_edit_locked());
    }

    #[test]
    fn role_parses_short_and_long_names() {
        assert_eq!("dm".parse::<Role>().unwrap(), Role::DungeonMaster);
        assert_eq!(" Player ".parse::<Role>().unwrap(), Role::Player);
        assert!("wizard".parse::<Role>().is_err());
    }
}
