/// Shell commands and suggestion logic

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

/// All commands understood by the shell
pub const COMMANDS: &[Command] = &[
  Command {
    name: "projects",
    aliases: &["p", "project"],
    description: "List, show, create or delete projects",
  },
  Command {
    name: "requirements",
    aliases: &["r", "req", "reqs"],
    description: "Browse requirements of the selected project",
  },
  Command {
    name: "select",
    aliases: &["use", "open"],
    description: "Select a project by id",
  },
  Command {
    name: "settings",
    aliases: &["s", "prefs"],
    description: "Show or change your settings",
  },
  Command {
    name: "login",
    aliases: &["signin"],
    description: "Sign in with email and password",
  },
  Command {
    name: "signup",
    aliases: &["register"],
    description: "Create an account",
  },
  Command {
    name: "reset-password",
    aliases: &["forgot"],
    description: "Email a password reset link",
  },
  Command {
    name: "logout",
    aliases: &["signout"],
    description: "Sign out",
  },
  Command {
    name: "whoami",
    aliases: &["me"],
    description: "Show the signed-in user",
  },
  Command {
    name: "confirm",
    aliases: &["verify"],
    description: "Complete an email confirmation link",
  },
  Command {
    name: "help",
    aliases: &["h", "?"],
    description: "List commands",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Leave the shell",
  },
];

/// Command whose name or alias is exactly `word`.
pub fn resolve(word: &str) -> Option<&'static Command> {
  let word = word.to_lowercase();
  COMMANDS
    .iter()
    .find(|cmd| cmd.name == word || cmd.aliases.contains(&word.as_str()))
}

/// Get suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    // Exact match on name
    if cmd.name == input_lower {
      matches.push((cmd, 0)); // Highest priority
      continue;
    }

    // Exact match on alias
    if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
      continue;
    }

    // Prefix match on name
    if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
      continue;
    }

    // Prefix match on alias
    if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((cmd, 3));
      continue;
    }

    // Fuzzy match (contains)
    if cmd.name.contains(&input_lower) {
      matches.push((cmd, 4));
      continue;
    }

    // Fuzzy match on alias
    if cmd.aliases.iter().any(|a| a.contains(&input_lower)) {
      matches.push((cmd, 5));
    }
  }

  // Sort by priority
  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_input_returns_all() {
    let suggestions = get_suggestions("");
    assert_eq!(suggestions.len(), COMMANDS.len());
  }

  #[test]
  fn test_exact_match() {
    let suggestions = get_suggestions("settings");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "settings");
  }

  #[test]
  fn test_alias_match() {
    let suggestions = get_suggestions("r");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "requirements");
  }

  #[test]
  fn test_prefix_match() {
    let suggestions = get_suggestions("proj");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "projects");
  }

  #[test]
  fn test_prefix_ranks_above_fuzzy() {
    let suggestions = get_suggestions("log");
    let names: Vec<_> = suggestions.iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["login", "logout"]);
  }

  #[test]
  fn test_fuzzy_match() {
    let suggestions = get_suggestions("uire");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "requirements");
  }

  #[test]
  fn test_resolve_alias() {
    assert_eq!(resolve("REQS").map(|c| c.name), Some("requirements"));
    assert_eq!(resolve("exit").map(|c| c.name), Some("quit"));
    assert_eq!(resolve("forgot").map(|c| c.name), Some("reset-password"));
    assert!(resolve("pro").is_none());
  }
}
