//! Interactive shell. Stores and caches stay alive between commands.

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::io::Write;
use tracing::debug;

use crate::app::{App, AppCommand};
use crate::commands::{self, COMMANDS};

#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_help_subcommand = true)]
struct ShellLine {
  #[command(subcommand)]
  command: ShellCommand,
}

#[derive(Subcommand, Debug)]
enum ShellCommand {
  #[command(flatten)]
  App(AppCommand),
  /// Select a project by id
  Select { id: String },
  /// List commands
  Help,
  /// Leave the shell
  Quit,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
  Continue,
  Quit,
}

pub async fn run(app: &App) -> Result<()> {
  let mut out = std::io::stdout();
  writeln!(out, "cassist shell. Type `help` for commands, `quit` to leave.")?;

  loop {
    let prompt = match app.selected_project() {
      Some(project) => format!("cassist:{}> ", project.display_code()),
      None => "cassist> ".to_string(),
    };

    let Some(line) = read_line(prompt).await? else {
      writeln!(out)?;
      break;
    };

    if handle_line(app, &line, &mut out).await? == Flow::Quit {
      break;
    }
  }
  Ok(())
}

/// Prompt and read one line; `None` at end of input.
async fn read_line(prompt: String) -> Result<Option<String>> {
  tokio::task::spawn_blocking(move || -> Result<Option<String>> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{}", prompt)?;
    stdout.flush()?;

    let mut line = String::new();
    if std::io::stdin().read_line(&mut line)? == 0 {
      return Ok(None);
    }
    Ok(Some(line))
  })
  .await?
}

async fn handle_line<W: Write>(app: &App, line: &str, out: &mut W) -> Result<Flow> {
  let mut words = split_words(line);
  let Some(first) = words.first_mut() else {
    return Ok(Flow::Continue);
  };

  // Aliases map onto the full command name before parsing
  match commands::resolve(first) {
    Some(cmd) => *first = cmd.name.to_string(),
    None => {
      let suggestions = commands::get_suggestions(first);
      if suggestions.is_empty() {
        writeln!(out, "Unknown command '{}'. Type `help` for commands.", first)?;
      } else {
        let names: Vec<_> = suggestions.iter().map(|c| c.name).collect();
        writeln!(out, "Unknown command '{}'. Did you mean: {}?", first, names.join(", "))?;
      }
      return Ok(Flow::Continue);
    }
  }

  let parsed = match ShellLine::try_parse_from(&words) {
    Ok(parsed) => parsed,
    Err(e) => {
      write!(out, "{}", e)?;
      return Ok(Flow::Continue);
    }
  };

  debug!(command = %words[0], "Shell command");
  let result = match parsed.command {
    ShellCommand::Quit => return Ok(Flow::Quit),
    ShellCommand::Help => {
      for cmd in COMMANDS {
        writeln!(out, "  {:<14} {}", cmd.name, cmd.description)?;
      }
      Ok(())
    }
    ShellCommand::Select { id } => app.select(&id, out).await,
    ShellCommand::App(command) => app.execute(command, out).await,
  };

  // Nothing a single command does ends the session
  if let Err(e) = result {
    writeln!(out, "Error: {}", e)?;
  }
  Ok(Flow::Continue)
}

/// Split on whitespace, keeping single- or double-quoted text together.
fn split_words(line: &str) -> Vec<String> {
  let mut words = Vec::new();
  let mut current = String::new();
  let mut quote: Option<char> = None;
  let mut in_word = false;

  for c in line.chars() {
    match quote {
      Some(q) if c == q => quote = None,
      Some(_) => current.push(c),
      None if c == '"' || c == '\'' => {
        quote = Some(c);
        in_word = true;
      }
      None if c.is_whitespace() => {
        if in_word {
          words.push(std::mem::take(&mut current));
          in_word = false;
        }
      }
      None => {
        current.push(c);
        in_word = true;
      }
    }
  }
  if in_word {
    words.push(current);
  }
  words
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::app::Collaborators;
  use crate::config::Config;
  use crate::store::fakes::{
    project, session_for, FakeAuth, FakeProjectsApi, FakeRequirementsApi, FakeSettingsBackend,
  };
  use std::sync::Arc;

  async fn app() -> App {
    let projects = Arc::new(FakeProjectsApi::new());
    projects.set_projects("u1", vec![project("p1"), project("p2")]);
    let app = App::new(
      Config::parse("supabase:\n  url: https://abc.supabase.co\n").unwrap(),
      Collaborators {
        auth: Arc::new(FakeAuth::with_session(session_for("u1"))),
        projects,
        requirements: Arc::new(FakeRequirementsApi::new()),
        settings: Arc::new(FakeSettingsBackend::new()),
      },
    );
    app.start().await.unwrap();
    app
  }

  async fn line(app: &App, input: &str) -> (Flow, String) {
    let mut out = Vec::new();
    let flow = handle_line(app, input, &mut out).await.unwrap();
    (flow, String::from_utf8(out).unwrap())
  }

  #[test]
  fn test_split_words() {
    assert_eq!(
      split_words("projects create --title \"Mars Rover\" --code MR"),
      vec!["projects", "create", "--title", "Mars Rover", "--code", "MR"]
    );
    assert_eq!(split_words("  select   p1 "), vec!["select", "p1"]);
    assert_eq!(split_words("x ''"), vec!["x", ""]);
    assert!(split_words("   ").is_empty());
  }

  #[tokio::test]
  async fn test_quit_and_blank() {
    let app = app().await;
    assert_eq!(line(&app, "").await.0, Flow::Continue);
    assert_eq!(line(&app, "exit").await.0, Flow::Quit);
  }

  #[tokio::test]
  async fn test_help_lists_commands() {
    let app = app().await;
    let (_, text) = line(&app, "?").await;
    assert_eq!(text.lines().count(), COMMANDS.len());
    assert!(text.contains("requirements"));
  }

  #[tokio::test]
  async fn test_unknown_command_suggests() {
    let app = app().await;
    let (flow, text) = line(&app, "proj").await;
    assert_eq!(flow, Flow::Continue);
    assert!(text.contains("Did you mean: projects?"));

    let (_, text) = line(&app, "zzz").await;
    assert!(text.contains("Unknown command 'zzz'. Type `help`"));
  }

  #[tokio::test]
  async fn test_alias_runs_command() {
    let app = app().await;
    let (_, text) = line(&app, "p").await;
    assert!(text.contains("Project p1"));
    assert!(text.contains("Project p2"));
  }

  #[tokio::test]
  async fn test_select_changes_prompt_target() {
    let app = app().await;
    line(&app, "use p2").await;
    assert_eq!(app.selected_project().map(|p| p.id).as_deref(), Some("p2"));
  }

  #[tokio::test]
  async fn test_command_errors_do_not_end_session() {
    let app = app().await;
    let (flow, text) = line(&app, "requirements list --project missing").await;
    assert_eq!(flow, Flow::Continue);
    assert!(text.starts_with("Error: Project missing not found"));
  }

  #[tokio::test]
  async fn test_parse_errors_are_printed() {
    let app = app().await;
    let (flow, text) = line(&app, "settings set --quantity lots").await;
    assert_eq!(flow, Flow::Continue);
    assert!(text.contains("lots"));
  }
}
