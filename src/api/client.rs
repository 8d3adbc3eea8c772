use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{header::CONTENT_DISPOSITION, Client, RequestBuilder, Response, StatusCode};
use std::path::Path;
use tracing::{debug, info};
use url::Url;

use crate::config::ApiConfig;
use crate::error::{AssistError, Result};

use super::api_types::{ApiErrorBody, ApiProject, ApiProjectDetails, ApiRequirement};
use super::types::{
  Document, DocumentKind, NewProject, Project, ProjectCreated, ProjectDetails,
};
use super::{ProjectsApi, RequirementsApi};

/// HTTP client for the project/requirement API
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  base: Url,
  prefix: Vec<String>,
}

impl ApiClient {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let base = Url::parse(&config.url)
      .map_err(|e| AssistError::Invalid(format!("Invalid API url {}: {}", config.url, e)))?;
    if base.cannot_be_a_base() {
      return Err(AssistError::Invalid(format!(
        "API url cannot be used as a base: {}",
        config.url
      )));
    }

    let client = Client::builder()
      .user_agent(concat!("cassist/", env!("CARGO_PKG_VERSION")))
      .build()?;

    Ok(Self {
      client,
      base,
      prefix: split_path(&config.prefix),
    })
  }

  /// Build an endpoint URL from path segments, percent-encoding each one.
  fn endpoint(&self, segments: &[&str]) -> Result<Url> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| AssistError::Invalid(format!("API url cannot be a base: {}", self.base)))?
      .pop_if_empty()
      .extend(self.prefix.iter().map(String::as_str))
      .extend(segments);
    Ok(url)
  }

  async fn send(&self, request: RequestBuilder, token: &str) -> Result<Response> {
    let response = request.bearer_auth(token).send().await?;
    check_response(response).await
  }
}

/// Check response status and convert errors.
pub(crate) async fn check_response(response: Response) -> Result<Response> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }

  let url = response.url().to_string();
  let text = response.text().await.unwrap_or_default();
  let detail = serde_json::from_str::<ApiErrorBody>(&text)
    .ok()
    .and_then(|b| b.message())
    .unwrap_or(text);

  match status {
    StatusCode::UNAUTHORIZED => Err(AssistError::Unauthorized),
    StatusCode::NOT_FOUND => {
      debug!(%url, %detail, "API returned 404");
      Err(AssistError::NotFound(url))
    }
    status => Err(AssistError::Status {
      status: status.as_u16(),
      body: detail,
    }),
  }
}

#[async_trait]
impl ProjectsApi for ApiClient {
  async fn list_projects(&self, token: &str) -> Result<Vec<Project>> {
    let url = self.endpoint(&["projects"])?;
    let response = self.send(self.client.get(url), token).await?;
    let projects: Vec<ApiProject> = response.json().await?;
    Ok(projects.into_iter().map(Project::from).collect())
  }

  async fn get_project_details(&self, token: &str, id: &str) -> Result<ProjectDetails> {
    let url = self.endpoint(&["projects", id, "details"])?;
    let response = self.send(self.client.get(url), token).await?;
    let details: ApiProjectDetails = response.json().await?;
    Ok(details.into())
  }

  async fn create_project(&self, token: &str, project: &NewProject) -> Result<ProjectCreated> {
    let url = self.endpoint(&["projects"])?;
    let form = build_project_form(project).await?;

    info!(title = %project.title, "Creating project");
    let response = self
      .send(self.client.post(url).multipart(form), token)
      .await?;
    Ok(response.json().await?)
  }

  async fn delete_project(&self, token: &str, id: &str) -> Result<()> {
    let url = self.endpoint(&["projects", id])?;
    self.send(self.client.delete(url), token).await?;
    Ok(())
  }

  async fn download_document(
    &self,
    token: &str,
    id: &str,
    kind: DocumentKind,
  ) -> Result<Document> {
    let url = self.endpoint(&["projects", id, "documents", kind.path_segment()])?;
    let response = self.send(self.client.get(url), token).await?;

    let file_name = response
      .headers()
      .get(CONTENT_DISPOSITION)
      .and_then(|v| v.to_str().ok())
      .and_then(disposition_file_name)
      .unwrap_or_else(|| format!("{}_document_{}.pdf", kind.path_segment(), id));
    let bytes = response.bytes().await?.to_vec();

    Ok(Document { file_name, bytes })
  }
}

#[async_trait]
impl RequirementsApi for ApiClient {
  async fn list_for_project(&self, token: &str, project_id: &str) -> Result<Vec<ApiRequirement>> {
    let url = self.endpoint(&["requirements", "project", project_id])?;
    let response = self.send(self.client.get(url), token).await?;
    Ok(response.json().await?)
  }

  async fn delete_requirement(&self, token: &str, id: &str) -> Result<()> {
    let url = self.endpoint(&["requirements", id])?;
    self.send(self.client.delete(url), token).await?;
    Ok(())
  }
}

/// Build the multipart body for `POST /projects`.
async fn build_project_form(project: &NewProject) -> Result<Form> {
  let mut form = Form::new().text("title", project.title.clone());

  if let Some(code) = &project.project_id {
    form = form.text("project_id", code.clone());
  }
  if let Some(description) = &project.description {
    form = form.text("description", description.clone());
  }
  if let Some(text) = &project.vision_extracted_text {
    form = form.text("vision_extracted_text", text.clone());
  }
  if let Some(requirements) = &project.requirements {
    form = form.text("requirements_json", serde_json::to_string(requirements)?);
  }
  if let Some(path) = &project.vision_file {
    let (name, part) = pdf_part(path).await?;
    form = form
      .text("vision_document_name", name)
      .part("vision_file", part);
  }
  if let Some(path) = &project.requirements_file {
    let (name, part) = pdf_part(path).await?;
    form = form
      .text("requirements_document_name", name)
      .part("requirements_file", part);
  }

  Ok(form)
}

async fn pdf_part(path: &Path) -> Result<(String, Part)> {
  let bytes = tokio::fs::read(path).await?;
  let name = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| "document.pdf".to_string());
  let part = Part::bytes(bytes)
    .file_name(name.clone())
    .mime_str("application/pdf")?;
  Ok((name, part))
}

/// Extract the file name from a `Content-Disposition` header value.
fn disposition_file_name(value: &str) -> Option<String> {
  value
    .split(';')
    .map(str::trim)
    .find_map(|param| param.strip_prefix("filename="))
    .map(|name| name.trim_matches('"').to_string())
    .filter(|name| !name.is_empty())
}

fn split_path(path: &str) -> Vec<String> {
  path
    .split('/')
    .filter(|s| !s.is_empty())
    .map(String::from)
    .collect()
}
