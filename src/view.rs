//! Plain-text listings: filtering, search, pagination and table rendering.

use std::io::{self, Write};

use crate::api::types::{Project, ProjectDetails, Requirement, RequirementKind};
use crate::cache::CacheSource;
use crate::store::settings::{FieldStatus, Settings, SettingsField};

/// Requirement descriptions are cut after this many characters
pub const DESCRIPTION_WIDTH: usize = 80;

/// Cut `s` after `max_len` characters, marking the cut with "...".
pub fn truncate(s: &str, max_len: usize) -> String {
  match s.char_indices().nth(max_len) {
    None => s.to_string(),
    Some((end, _)) => format!("{}...", &s[..end]),
  }
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
  haystack.to_lowercase().contains(needle_lower)
}

/// Requirements of `kind` (all when `None`) whose title or description
/// contains `query`, ignoring case.
pub fn filter_requirements(
  requirements: &[Requirement],
  kind: Option<RequirementKind>,
  query: &str,
) -> Vec<Requirement> {
  let query = query.trim().to_lowercase();
  requirements
    .iter()
    .filter(|r| kind.map_or(true, |k| r.kind == k))
    .filter(|r| {
      query.is_empty() || contains_ci(&r.title, &query) || contains_ci(&r.description, &query)
    })
    .cloned()
    .collect()
}

/// Projects whose title or description contains `query`, ignoring case.
pub fn search_projects(projects: &[Project], query: &str) -> Vec<Project> {
  let query = query.trim().to_lowercase();
  projects
    .iter()
    .filter(|p| {
      query.is_empty()
        || contains_ci(&p.title, &query)
        || p
          .description
          .as_deref()
          .is_some_and(|d| contains_ci(d, &query))
    })
    .cloned()
    .collect()
}

/// One page of a listing
#[derive(Debug, PartialEq)]
pub struct Page<'a, T> {
  pub items: &'a [T],
  /// 1-based, clamped into `1..=total_pages`
  pub number: usize,
  pub total_pages: usize,
  pub total_items: usize,
}

/// Slice out page `page` (1-based). Out-of-range pages clamp to the nearest
/// valid one; an empty listing has a single empty page.
pub fn paginate<T>(items: &[T], page: usize, per_page: usize) -> Page<'_, T> {
  let per_page = per_page.max(1);
  let total_pages = items.len().div_ceil(per_page).max(1);
  let number = page.clamp(1, total_pages);
  let start = (number - 1) * per_page;
  let end = (start + per_page).min(items.len());

  Page {
    items: &items[start.min(end)..end],
    number,
    total_pages,
    total_items: items.len(),
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMarker {
  Number(usize),
  Gap,
}

/// Page buttons to show for `current` of `total`.
///
/// Up to five pages are all listed. Beyond that the first and last page are
/// always shown with the current page's neighbourhood in between.
pub fn page_numbers(current: usize, total: usize) -> Vec<PageMarker> {
  use PageMarker::{Gap, Number};

  if total <= 5 {
    return (1..=total).map(Number).collect();
  }

  if current <= 3 {
    vec![Number(1), Number(2), Number(3), Gap, Number(total)]
  } else if current >= total - 2 {
    vec![
      Number(1),
      Gap,
      Number(total - 2),
      Number(total - 1),
      Number(total),
    ]
  } else {
    vec![Number(1), Gap, Number(current), Gap, Number(total)]
  }
}

/// Render the page strip, bracketing the current page: `1 [2] 3 … 9`
pub fn page_strip(current: usize, total: usize) -> String {
  page_numbers(current, total)
    .into_iter()
    .map(|marker| match marker {
      PageMarker::Number(n) if n == current => format!("[{}]", n),
      PageMarker::Number(n) => n.to_string(),
      PageMarker::Gap => "…".to_string(),
    })
    .collect::<Vec<_>>()
    .join(" ")
}

fn or_dash(value: Option<&str>) -> &str {
  value.filter(|v| !v.is_empty()).unwrap_or("-")
}

pub fn render_projects<W: Write>(
  out: &mut W,
  projects: &[Project],
  selected: Option<&str>,
) -> io::Result<()> {
  if projects.is_empty() {
    return writeln!(out, "No projects.");
  }

  for project in projects {
    let marker = if Some(project.id.as_str()) == selected {
      "*"
    } else {
      " "
    };
    writeln!(
      out,
      "{} {:<10} {:<36} {}",
      marker,
      truncate(project.display_code(), 10),
      project.id,
      project.title
    )?;
  }
  Ok(())
}

pub fn render_project_details<W: Write>(out: &mut W, details: &ProjectDetails) -> io::Result<()> {
  let project = &details.project;
  let counts = &details.requirement_counts;

  writeln!(out, "{}", project.title)?;
  writeln!(out, "  id:           {}", project.id)?;
  writeln!(out, "  code:         {}", project.display_code())?;
  writeln!(out, "  author:       {}", project.author())?;
  writeln!(out, "  description:  {}", or_dash(project.description.as_deref()))?;
  writeln!(
    out,
    "  vision:       {}",
    or_dash(project.vision_document_name.as_deref())
  )?;
  writeln!(
    out,
    "  requirements: {}",
    or_dash(project.requirements_document_name.as_deref())
  )?;
  if let Some(created) = project.created_at {
    writeln!(out, "  created:      {}", created.format("%Y-%m-%d %H:%M"))?;
  }
  writeln!(
    out,
    "  counts:       {} functional, {} non-functional, {} conjectural ({} total)",
    counts.functional,
    counts.non_functional,
    counts.conjectural,
    counts.total()
  )
}

pub fn render_requirements<W: Write>(
  out: &mut W,
  page: &Page<'_, Requirement>,
  source: CacheSource,
) -> io::Result<()> {
  if page.total_items == 0 {
    return writeln!(out, "No requirements found.");
  }

  for req in page.items {
    let kind = match req.category {
      Some(category) if req.kind == RequirementKind::NonFunctional => {
        format!("{} ({})", req.kind.label(), category.label())
      }
      _ => req.kind.label().to_string(),
    };
    writeln!(
      out,
      "{:<12} {:<32} {}",
      req.title,
      kind,
      truncate(&req.description, DESCRIPTION_WIDTH)
    )?;
    writeln!(out, "{:<12} {}", "", req.id)?;
  }

  writeln!(out)?;
  writeln!(
    out,
    "Page {} of {} ({} requirements, {})   {}",
    page.number,
    page.total_pages,
    page.total_items,
    source.label(),
    page_strip(page.number, page.total_pages)
  )
}

fn status_suffix(status: FieldStatus) -> &'static str {
  match status {
    FieldStatus::Applied => "",
    FieldStatus::Pending => "  (saving)",
    FieldStatus::Failed => "  (not saved)",
  }
}

pub fn render_settings<W: Write>(
  out: &mut W,
  settings: &Settings,
  status: impl Fn(SettingsField) -> FieldStatus,
) -> io::Result<()> {
  let on_off = |v: bool| if v { "on" } else { "off" };

  for field in SettingsField::ALL {
    let value = match field {
      SettingsField::RequireBriefDescription => on_off(settings.require_brief_description).to_string(),
      SettingsField::BatchMode => on_off(settings.batch_mode).to_string(),
      SettingsField::QuantityReqBatch => settings.quantity_req_batch.to_string(),
    };
    writeln!(
      out,
      "{:<26} {}{}",
      field.column(),
      value,
      status_suffix(status(field))
    )?;
  }
  Ok(())
}
