//! Whitelist command templates and reply classification.
//!
//! Remote servers answer whitelist commands with free-form text, and the
//! wording differs between server implementations and versions. Replies are
//! matched by substring against configurable patterns; the defaults follow
//! vanilla Minecraft.

use serde::{Deserialize, Serialize};

/// Placeholder substituted with the player name in command templates.
pub const PLAYER_PLACEHOLDER: &str = "{player}";

/// Result of adding a player to the whitelist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
    Failed,
}

/// Result of removing a player from the whitelist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoveOutcome {
    Removed,
    AlreadyAbsent,
    Failed,
}

/// Commands and reply patterns spoken by one kind of remote server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhitelistDialect {
    /// Command template for adding a player, must contain `{player}`
    pub add_command: String,
    /// Command template for removing a player, must contain `{player}`
    pub remove_command: String,
    /// Command listing whitelisted players
    pub list_command: String,
    /// Substring present in a successful add reply
    pub added: String,
    /// Substring present when the player was already whitelisted
    pub already_whitelisted: String,
    /// Substring present in a successful remove reply
    pub removed: String,
    /// Substring present when the player was not whitelisted
    pub not_whitelisted: String,
}

impl Default for WhitelistDialect {
    fn default() -> Self {
        Self {
            add_command: "whitelist add {player}".to_string(),
            remove_command: "whitelist remove {player}".to_string(),
            list_command: "whitelist list".to_string(),
            added: "Added".to_string(),
            already_whitelisted: "Player is already whitelisted".to_string(),
            removed: "Removed".to_string(),
            not_whitelisted: "Player is not whitelisted".to_string(),
        }
    }
}

impl WhitelistDialect {
    pub fn add_command_for(&self, player: &str) -> String {
        self.add_command.replace(PLAYER_PLACEHOLDER, player)
    }

    pub fn remove_command_for(&self, player: &str) -> String {
        self.remove_command.replace(PLAYER_PLACEHOLDER, player)
    }

    pub fn classify_add(&self, reply: &str) -> AddOutcome {
        if reply.contains(&self.added) {
            AddOutcome::Added
        } else if reply.contains(&self.already_whitelisted) {
            AddOutcome::AlreadyPresent
        } else {
            AddOutcome::Failed
        }
    }

    /// The "not whitelisted" pattern is checked first.
    pub fn classify_remove(&self, reply: &str) -> RemoveOutcome {
        if reply.contains(&self.not_whitelisted) {
            RemoveOutcome::AlreadyAbsent
        } else if reply.contains(&self.removed) {
            RemoveOutcome::Removed
        } else {
            RemoveOutcome::Failed
        }
    }

    /// Checks the templates and patterns for obvious mistakes.
    pub fn validate(&self) -> Result<(), String> {
        for (name, template) in [
            ("add_command", &self.add_command),
            ("remove_command", &self.remove_command),
        ] {
            if !template.contains(PLAYER_PLACEHOLDER) {
                return Err(format!("{name} must contain {PLAYER_PLACEHOLDER}"));
            }
        }
        if self.list_command.trim().is_empty() {
            return Err("list_command cannot be empty".to_string());
        }
        for (name, pattern) in [
            ("added", &self.added),
            ("already_whitelisted", &self.already_whitelisted),
            ("removed", &self.removed),
            ("not_whitelisted", &self.not_whitelisted),
        ] {
            if pattern.is_empty() {
                return Err(format!("Reply pattern {name} cannot be empty"));
            }
        }
        Ok(())
    }
}

/// Parses a single-line list reply such as
/// `"There are 2 whitelisted players: Alice, Bob"`.
///
/// Returns `None` when the reply has no `:` separator.
pub fn parse_player_list(reply: &str) -> Option<Vec<String>> {
    let (_, players) = reply.split_once(':')?;
    Some(
        players
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// Player names are sent verbatim inside a command line.
pub fn is_valid_player_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(|c| c.is_whitespace() || c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_templates() {
        let dialect = WhitelistDialect::default();
        assert_eq!(dialect.add_command_for("Alice"), "whitelist add Alice");
        assert_eq!(dialect.remove_command_for("Bob"), "whitelist remove Bob");
        assert!(dialect.validate().is_ok());
    }

    #[test]
    fn test_classify_add_replies() {
        let dialect = WhitelistDialect::default();
        assert_eq!(dialect.classify_add("Added Alice to the whitelist"), AddOutcome::Added);
        assert_eq!(
            dialect.classify_add("Player is already whitelisted"),
            AddOutcome::AlreadyPresent
        );
        assert_eq!(dialect.classify_add("That player does not exist"), AddOutcome::Failed);
        assert_eq!(dialect.classify_add(""), AddOutcome::Failed);
    }

    #[test]
    fn test_classify_remove_prefers_not_whitelisted() {
        let dialect = WhitelistDialect::default();
        assert_eq!(
            dialect.classify_remove("Removed Alice from the whitelist"),
            RemoveOutcome::Removed
        );
        assert_eq!(
            dialect.classify_remove("Player is not whitelisted"),
            RemoveOutcome::AlreadyAbsent
        );
        assert_eq!(dialect.classify_remove("Unknown command"), RemoveOutcome::Failed);
    }

    #[test]
    fn test_custom_patterns() {
        let dialect = WhitelistDialect {
            add_command: "wl add {player}".to_string(),
            added: "has been whitelisted".to_string(),
            already_whitelisted: "already on the list".to_string(),
            ..Default::default()
        };
        assert_eq!(dialect.add_command_for("Steve"), "wl add Steve");
        assert_eq!(dialect.classify_add("Steve has been whitelisted"), AddOutcome::Added);
        assert_eq!(dialect.classify_add("Steve is already on the list"), AddOutcome::AlreadyPresent);
        assert_eq!(dialect.classify_add("Added Steve"), AddOutcome::Failed);
    }

    #[test]
    fn test_validate_rejects_missing_placeholder() {
        let dialect = WhitelistDialect {
            remove_command: "whitelist remove".to_string(),
            ..Default::default()
        };
        let err = dialect.validate().unwrap_err();
        assert!(err.contains("remove_command"));
    }

    #[test]
    fn test_parse_player_list() {
        assert_eq!(
            parse_player_list("There are 2 whitelisted players: Alice, Bob"),
            Some(vec!["Alice".to_string(), "Bob".to_string()])
        );
        assert_eq!(parse_player_list("There are no whitelisted players"), None);
        assert_eq!(parse_player_list("There are 0 whitelisted players:"), Some(vec![]));
        assert_eq!(
            parse_player_list("Players: a:b, c"),
            Some(vec!["a:b".to_string(), "c".to_string()])
        );
    }

    #[test]
    fn test_player_name_validation() {
        assert!(is_valid_player_name("Alice_01"));
        assert!(!is_valid_player_name(""));
        assert!(!is_valid_player_name("Alice; op Alice"));
        assert!(!is_valid_player_name("Alice\nstop"));
    }
}
