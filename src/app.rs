use clap::{Args, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::types::{DocumentKind, ExtractedRequirements, NewProject, Project, RequirementKind};
use crate::api::{ApiClient, PostgrestSettings, ProjectsApi, RequirementsApi};
use crate::auth::{AuthProvider, NewAccount, OtpType, SessionFile, SupabaseAuth};
use crate::cache::AppCaches;
use crate::config::Config;
use crate::store::session::Confirmation;
use crate::store::settings::{SettingsBackend, SettingsPatch};
use crate::store::{ProjectStore, RequirementStore, SessionStore, SettingsStore};
use crate::view;

/// Commands shared by the command line and the shell
#[derive(Subcommand, Debug)]
pub enum AppCommand {
  /// Sign in with email and password
  Login {
    #[arg(long)]
    email: String,
    /// Prompted for when omitted
    #[arg(long)]
    password: Option<String>,
  },
  /// Create an account; a confirmation email follows
  Signup {
    #[arg(long)]
    email: String,
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name: String,
    /// Prompted for when omitted
    #[arg(long)]
    password: Option<String>,
  },
  /// Email a password reset link
  ResetPassword {
    #[arg(long)]
    email: String,
  },
  /// Sign out
  Logout,
  /// Show the signed-in user
  Whoami,
  /// Complete an email confirmation link
  Confirm {
    /// Code from a PKCE confirmation link
    #[arg(long, conflicts_with = "token_hash", required_unless_present = "token_hash")]
    code: Option<String>,
    /// Token hash from a confirmation link
    #[arg(long, requires = "otp_type")]
    token_hash: Option<String>,
    /// signup, invite, magiclink, recovery, email_change or email
    #[arg(long = "type", value_name = "TYPE")]
    otp_type: Option<OtpType>,
  },
  /// Projects owned by the signed-in user
  Projects {
    #[command(subcommand)]
    action: Option<ProjectsAction>,
  },
  /// Requirements of a project
  Requirements {
    #[command(subcommand)]
    action: Option<RequirementsAction>,
  },
  /// Your settings
  Settings {
    #[command(subcommand)]
    action: Option<SettingsAction>,
  },
}

#[derive(Subcommand, Debug)]
pub enum ProjectsAction {
  /// List projects; `*` marks the selected one
  List {
    #[arg(long)]
    search: Option<String>,
    /// Bypass the cache
    #[arg(long)]
    refresh: bool,
  },
  /// Show one project with its requirement counts
  Show { id: String },
  /// Create a project from documents
  Create {
    #[arg(long)]
    title: String,
    /// Short project code
    #[arg(long)]
    code: Option<String>,
    #[arg(long)]
    description: Option<String>,
    /// Vision document (PDF)
    #[arg(long)]
    vision: Option<PathBuf>,
    /// Text already extracted from the vision document
    #[arg(long)]
    vision_text: Option<PathBuf>,
    /// Requirements document (PDF)
    #[arg(long)]
    requirements: Option<PathBuf>,
    /// Requirements already extracted, as JSON
    #[arg(long)]
    requirements_json: Option<PathBuf>,
  },
  /// Delete a project
  Delete {
    id: String,
    /// Do not ask for confirmation
    #[arg(short, long)]
    yes: bool,
  },
  /// Download a project's vision or requirements document
  Download {
    id: String,
    kind: DocumentKind,
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
}

#[derive(Args, Debug, Default)]
pub struct ListArgs {
  /// Project id (defaults to the selected project)
  #[arg(long)]
  pub project: Option<String>,
  /// functional, non-functional or conjectural
  #[arg(long = "type", value_name = "TYPE")]
  pub kind: Option<RequirementKind>,
  /// Case-insensitive match on title and description
  #[arg(long)]
  pub search: Option<String>,
  #[arg(long, default_value_t = 1)]
  pub page: usize,
  /// Bypass the cache
  #[arg(long)]
  pub refresh: bool,
}

#[derive(Subcommand, Debug)]
pub enum RequirementsAction {
  List(ListArgs),
  /// Delete a requirement
  Delete {
    id: String,
    #[arg(long)]
    project: Option<String>,
    /// Do not ask for confirmation
    #[arg(short, long)]
    yes: bool,
  },
}

#[derive(Subcommand, Debug)]
pub enum SettingsAction {
  Show {
    /// Re-read from the server
    #[arg(long)]
    refresh: bool,
  },
  /// Change one or more settings
  Set {
    #[arg(long)]
    brief_description: Option<bool>,
    #[arg(long)]
    batch_mode: Option<bool>,
    #[arg(long, allow_hyphen_values = true)]
    quantity: Option<i32>,
  },
  /// Raise the batch quantity by one
  Inc,
  /// Lower the batch quantity by one
  Dec,
}

/// External services the stores talk to
pub struct Collaborators {
  pub auth: Arc<dyn AuthProvider>,
  pub projects: Arc<dyn ProjectsApi>,
  pub requirements: Arc<dyn RequirementsApi>,
  pub settings: Arc<dyn SettingsBackend>,
}

impl Collaborators {
  /// Real HTTP collaborators built from configuration.
  pub fn from_config(config: &Config) -> Result<Self> {
    let anon_key = config.anon_key()?;
    let session_file = SessionFile::open_default()?;
    let auth = SupabaseAuth::new(&config.supabase.url, anon_key.clone(), session_file)?;
    let api = Arc::new(ApiClient::new(&config.api)?);
    let settings = PostgrestSettings::new(&config.supabase.url, anon_key)?;

    Ok(Self {
      auth: Arc::new(auth),
      projects: api.clone(),
      requirements: api,
      settings: Arc::new(settings),
    })
  }
}

/// Application container: owns the caches and every store built over them.
pub struct App {
  config: Config,
  caches: Arc<AppCaches>,
  collaborators: Collaborators,
  session: Arc<SessionStore>,
  projects: ProjectStore,
  requirements: RequirementStore,
  settings: SettingsStore,
}

impl App {
  pub fn new(config: Config, collaborators: Collaborators) -> Self {
    let caches = AppCaches::new();
    let session = Arc::new(SessionStore::new(
      collaborators.auth.clone(),
      caches.clone(),
    ));
    let (projects, requirements, settings) = build_stores(&collaborators, &session, &caches);

    Self {
      config,
      caches,
      collaborators,
      session,
      projects,
      requirements,
      settings,
    }
  }

  /// Rebuild the data stores over the same caches, as after a view remount.
  pub fn remount(&mut self) {
    let (projects, requirements, settings) =
      build_stores(&self.collaborators, &self.session, &self.caches);
    self.projects = projects;
    self.requirements = requirements;
    self.settings = settings;
  }

  /// Load the session; when signed in, warm projects and settings together.
  pub async fn start(&self) -> Result<()> {
    self.session.load().await?;
    if self.session.get_session().is_none() {
      return Ok(());
    }

    let (projects, settings) = futures::future::join(self.projects.sync(), self.settings.sync()).await;
    if let Err(e) = projects {
      warn!(error = %e, "Initial project load failed");
    }
    if let Err(e) = settings {
      warn!(error = %e, "Initial settings load failed");
    }

    if let Some(id) = &self.config.default_project {
      if self.projects.select_by_id(id)?.is_none() {
        warn!(%id, "Default project not found");
      }
    }
    Ok(())
  }

  pub fn selected_project(&self) -> Option<Project> {
    self.projects.selected()
  }

  pub async fn execute<W: Write>(&self, command: AppCommand, out: &mut W) -> Result<()> {
    self.session.ensure_session().await?;

    match command {
      AppCommand::Login { email, password } => self.login(&email, password, out).await,
      AppCommand::Signup {
        email,
        first_name,
        last_name,
        password,
      } => {
        let password = match password {
          Some(p) => p,
          None => prompt("Password: ").await?,
        };
        let account = NewAccount {
          email,
          password,
          first_name,
          last_name,
        };
        match self.session.sign_up(&account).await? {
          Some(session) => {
            self.after_user_change().await?;
            writeln!(out, "Account created. Signed in as {}.", account.email)?;
            info!(user_id = %session.id(), "Signed up");
          }
          None => writeln!(
            out,
            "Account created. Check {} for a confirmation link, then run `cassist confirm`.",
            account.email
          )?,
        }
        Ok(())
      }
      AppCommand::ResetPassword { email } => {
        self.session.reset_password(&email).await?;
        writeln!(out, "Password reset link sent to {}.", email.trim())?;
        Ok(())
      }
      AppCommand::Logout => {
        self.session.sign_out().await?;
        self.after_user_change().await?;
        writeln!(out, "Signed out.")?;
        Ok(())
      }
      AppCommand::Whoami => {
        match self.session.get_session() {
          Some(session) => writeln!(
            out,
            "{} {}",
            session.id(),
            session.user.email.as_deref().unwrap_or("")
          )?,
          None => writeln!(out, "Not signed in.")?,
        }
        Ok(())
      }
      AppCommand::Confirm {
        code,
        token_hash,
        otp_type,
      } => {
        let confirmation = match (code, token_hash, otp_type) {
          (Some(code), _, _) => Confirmation::Code(code),
          (None, Some(token_hash), Some(otp_type)) => Confirmation::TokenHash {
            token_hash,
            otp_type,
          },
          _ => return Err(eyre!("Provide --code, or --token-hash with --type")),
        };
        let session = self.session.confirm_email(&confirmation).await?;
        self.after_user_change().await?;
        writeln!(
          out,
          "Email confirmed for {}. Sign in with `cassist login`.",
          session.user.email.as_deref().unwrap_or(session.id())
        )?;
        Ok(())
      }
      AppCommand::Projects { action } => {
        let action = action.unwrap_or(ProjectsAction::List {
          search: None,
          refresh: false,
        });
        self.projects_command(action, out).await
      }
      AppCommand::Requirements { action } => {
        let action = action.unwrap_or_else(|| RequirementsAction::List(ListArgs {
          page: 1,
          ..ListArgs::default()
        }));
        self.requirements_command(action, out).await
      }
      AppCommand::Settings { action } => {
        let action = action.unwrap_or(SettingsAction::Show { refresh: false });
        self.settings_command(action, out).await
      }
    }
  }

  /// Select a project for later commands. Unknown ids clear the selection.
  pub async fn select<W: Write>(&self, id: &str, out: &mut W) -> Result<()> {
    self.session.ensure_session().await?;
    self.projects.sync().await?;
    match self.projects.select_by_id(id)? {
      Some(project) => {
        writeln!(out, "Selected {} ({})", project.title, project.id)?;
        self.prefetch_selected().await;
      }
      None => {
        self.requirements.clear()?;
        writeln!(out, "Project {} not found; selection cleared.", id)?;
      }
    }
    Ok(())
  }

  async fn login<W: Write>(&self, email: &str, password: Option<String>, out: &mut W) -> Result<()> {
    let password = match password {
      Some(p) => p,
      None => prompt("Password: ").await?,
    };
    let session = self.session.sign_in(email, &password).await?;
    info!(user_id = %session.id(), "Signed in");
    self.after_user_change().await?;
    writeln!(out, "Signed in as {}.", session.user.email.as_deref().unwrap_or(email))?;
    Ok(())
  }

  /// Stores follow the session; requirements never carry across users.
  async fn after_user_change(&self) -> Result<()> {
    self.requirements.clear()?;
    if let Err(e) = self.projects.sync().await {
      warn!(error = %e, "Project load after sign-in change failed");
    }
    if let Err(e) = self.settings.sync().await {
      warn!(error = %e, "Settings load after sign-in change failed");
    }
    Ok(())
  }

  async fn prefetch_selected(&self) {
    if let Some(project) = self.projects.selected() {
      if let Err(e) = self.requirements.prefetch(&project.id, &project.author()).await {
        warn!(error = %e, "Prefetch failed");
      }
    }
  }

  async fn projects_command<W: Write>(&self, action: ProjectsAction, out: &mut W) -> Result<()> {
    self.session.require_session()?;

    match action {
      ProjectsAction::List { search, refresh } => {
        let result = if refresh {
          self.projects.refresh().await.map(|_| ())
        } else {
          self.projects.sync().await.map(|_| ())
        };
        if let Err(e) = result {
          // Keep showing what we have, like an inline banner
          writeln!(out, "Warning: {}", e)?;
        }

        let projects = match search.as_deref() {
          Some(query) => self.projects.search(query),
          None => self.projects.list_projects(),
        };
        let selected = self.projects.selected().map(|p| p.id);
        view::render_projects(out, &projects, selected.as_deref())?;
        self.prefetch_selected().await;
        Ok(())
      }
      ProjectsAction::Show { id } => {
        let details = self.projects.project_details(&id).await?;
        view::render_project_details(out, &details)?;
        Ok(())
      }
      ProjectsAction::Create {
        title,
        code,
        description,
        vision,
        vision_text,
        requirements,
        requirements_json,
      } => {
        let vision_extracted_text = match vision_text {
          Some(path) => Some(tokio::fs::read_to_string(&path).await.map_err(|e| {
            eyre!("Failed to read {}: {}", path.display(), e)
          })?),
          None => None,
        };
        let extracted = match requirements_json {
          Some(path) => Some(read_extracted(&path).await?),
          None => None,
        };

        let created = self
          .projects
          .create_project(&NewProject {
            title,
            project_id: code,
            description,
            vision_file: vision,
            vision_extracted_text,
            requirements_file: requirements,
            requirements: extracted,
          })
          .await?;
        writeln!(
          out,
          "{} ({}, {} requirements)",
          created.message, created.project_id, created.requirements_count
        )?;
        Ok(())
      }
      ProjectsAction::Delete { id, yes } => {
        if !yes && !confirm(&format!("Delete project {}?", id)).await? {
          writeln!(out, "Cancelled.")?;
          return Ok(());
        }
        let deleting_shown = self.requirements.current_project_id().as_deref() == Some(id.as_str());
        let selected = self.projects.delete_project(&id).await?;
        if deleting_shown {
          self.requirements.clear()?;
        }
        writeln!(out, "Deleted project {}.", id)?;
        if let Some(project) = selected {
          writeln!(out, "Selected {} ({})", project.title, project.id)?;
        }
        Ok(())
      }
      ProjectsAction::Download { id, kind, output } => {
        let document = self.projects.download_document(&id, kind).await?;
        let path = output.unwrap_or_else(|| PathBuf::from(&document.file_name));
        tokio::fs::write(&path, &document.bytes)
          .await
          .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
        writeln!(out, "Saved {} ({} bytes).", path.display(), document.bytes.len())?;
        Ok(())
      }
    }
  }

  /// Resolve the project a requirements command applies to and make it current.
  async fn target_project(&self, explicit: Option<&str>) -> Result<Project> {
    self.projects.sync().await?;

    let project = match explicit {
      Some(id) => self.projects.select_by_id(id)?,
      None => self.projects.selected(),
    };

    match project {
      Some(project) => Ok(project),
      None => {
        self.requirements.clear()?;
        match explicit {
          Some(id) => Err(eyre!("Project {} not found", id)),
          None => Err(eyre!("No project selected. Use `select <id>` or --project.")),
        }
      }
    }
  }

  async fn requirements_command<W: Write>(
    &self,
    action: RequirementsAction,
    out: &mut W,
  ) -> Result<()> {
    self.session.require_session()?;

    match action {
      RequirementsAction::List(args) => {
        let project = self.target_project(args.project.as_deref()).await?;
        let fetched = self
          .requirements
          .fetch_requirements(&project.id, &project.author(), args.refresh)
          .await?;

        let filtered = view::filter_requirements(
          &fetched.data,
          args.kind,
          args.search.as_deref().unwrap_or(""),
        );
        let page = view::paginate(&filtered, args.page, self.config.page_size);

        writeln!(out, "{} ({})", project.title, project.display_code())?;
        view::render_requirements(out, &page, fetched.source)?;
        Ok(())
      }
      RequirementsAction::Delete { id, project, yes } => {
        let project = self.target_project(project.as_deref()).await?;
        self
          .requirements
          .fetch_requirements(&project.id, &project.author(), false)
          .await?;

        if !self.requirements.requirements().iter().any(|r| r.id == id) {
          return Err(eyre!("Requirement {} is not in project {}", id, project.id));
        }
        if !yes && !confirm(&format!("Delete requirement {}?", id)).await? {
          writeln!(out, "Cancelled.")?;
          return Ok(());
        }

        if self.requirements.delete_requirement(&id).await? {
          writeln!(out, "Deleted requirement {}.", id)?;
          Ok(())
        } else {
          Err(eyre!(
            "{}",
            self
              .requirements
              .error()
              .unwrap_or_else(|| "Failed to delete requirement".to_string())
          ))
        }
      }
    }
  }

  async fn settings_command<W: Write>(&self, action: SettingsAction, out: &mut W) -> Result<()> {
    self.session.require_session()?;

    let result = match action {
      SettingsAction::Show { refresh } => {
        if refresh {
          self.settings.refresh().await
        } else {
          self.settings.sync().await
        }
      }
      SettingsAction::Set {
        brief_description,
        batch_mode,
        quantity,
      } => {
        let patch = SettingsPatch {
          require_brief_description: brief_description,
          batch_mode,
          quantity_req_batch: quantity,
        };
        if patch.is_empty() {
          return Err(eyre!(
            "Nothing to change. Use --brief-description, --batch-mode or --quantity."
          ));
        }
        self.settings.set(patch).await
      }
      SettingsAction::Inc => self.settings.increment_quantity().await,
      SettingsAction::Dec => self.settings.decrement_quantity().await,
    };

    if let Err(e) = &result {
      writeln!(out, "Warning: {}", e)?;
    }
    view::render_settings(out, &self.settings.get(), |field| {
      self.settings.field_status(field)
    })?;
    Ok(())
  }
}

fn build_stores(
  collaborators: &Collaborators,
  session: &Arc<SessionStore>,
  caches: &Arc<AppCaches>,
) -> (ProjectStore, RequirementStore, SettingsStore) {
  (
    ProjectStore::new(
      collaborators.projects.clone(),
      session.clone(),
      caches.clone(),
    ),
    RequirementStore::new(
      collaborators.requirements.clone(),
      session.clone(),
      caches.clone(),
    ),
    SettingsStore::new(
      collaborators.settings.clone(),
      session.clone(),
      caches.clone(),
    ),
  )
}

async fn read_extracted(path: &Path) -> Result<ExtractedRequirements> {
  let text = tokio::fs::read_to_string(path)
    .await
    .map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))?;
  serde_json::from_str(&text).map_err(|e| eyre!("Invalid requirements JSON in {}: {}", path.display(), e))
}

/// Read one line from stdin after printing `question`.
pub async fn prompt(question: &str) -> Result<String> {
  let question = question.to_string();
  tokio::task::spawn_blocking(move || -> Result<String> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{}", question)?;
    stdout.flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
  })
  .await?
}

async fn confirm(question: &str) -> Result<bool> {
  let answer = prompt(&format!("{} [y/N] ", question)).await?;
  Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
