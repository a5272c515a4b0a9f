//! Task-spec documents
//!
//! Parses a plain-text task list into records that seed the Task Store:
//!
//! ```text
//! ## Task 1: Parser
//! ### Overview
//! Build the tokenizer.
//! ### Requirements
//! 1. Handles comments
//! 2. Reports line numbers
//! ```
//!
//! Any heading level is accepted. Text before the first task heading is a
//! preamble and ignored. Every violation is reported with its line number
//! and nothing is returned for a document that has one.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{HiveError, HiveResult};

/// Lifecycle marker of a parsed record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecStatus {
    #[default]
    Pending,
}

/// One task from a task-spec document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    pub number: u32,
    pub name: String,
    pub overview: String,
    pub requirements: Vec<String>,
    pub status: SpecStatus,
}

impl TaskSpec {
    /// Payload stored on the task created from this record
    pub fn to_task_data(&self) -> Value {
        json!({
            "specNumber": self.number,
            "requirements": self.requirements,
        })
    }
}

/// Read and parse a task-spec file
pub fn parse_task_spec_file(path: impl AsRef<Path>) -> HiveResult<Vec<TaskSpec>> {
    let content = fs::read_to_string(path.as_ref())?;
    parse_task_specs(&content)
}

fn line_error(line: usize, message: impl std::fmt::Display) -> HiveError {
    HiveError::validation(format!("line {}: {}", line, message))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    /// After the task heading, before any section heading
    Header,
    Overview,
    Requirements,
}

/// A task being assembled; turned into a [`TaskSpec`] only once complete
#[derive(Debug)]
struct Draft {
    number: u32,
    name: String,
    line: usize,
    section: Section,
    /// Line of the current section heading
    section_line: usize,
    overview: Option<Vec<String>>,
    requirements: Option<Vec<String>>,
}

impl Draft {
    fn new(number: u32, name: String, line: usize) -> Self {
        Self {
            number,
            name,
            line,
            section: Section::Header,
            section_line: line,
            overview: None,
            requirements: None,
        }
    }

    fn open_section(&mut self, section: Section, line: usize) -> HiveResult<()> {
        self.close_section()?;
        let slot = match section {
            Section::Overview => &mut self.overview,
            Section::Requirements => &mut self.requirements,
            Section::Header => return Ok(()),
        };
        if slot.is_some() {
            return Err(line_error(
                line,
                format!("duplicate section in task {}", self.number),
            ));
        }
        *slot = Some(Vec::new());
        self.section = section;
        self.section_line = line;
        Ok(())
    }

    /// The section being left must have content
    fn close_section(&self) -> HiveResult<()> {
        let content = match self.section {
            Section::Header => return Ok(()),
            Section::Overview => &self.overview,
            Section::Requirements => &self.requirements,
        };
        if content.as_ref().map_or(true, Vec::is_empty) {
            let name = match self.section {
                Section::Overview => "Overview",
                _ => "Requirements",
            };
            return Err(line_error(
                self.section_line,
                format!("{} section of task {} is empty", name, self.number),
            ));
        }
        Ok(())
    }

    fn push_line(&mut self, text: &str, line: usize) -> HiveResult<()> {
        match self.section {
            Section::Header => Err(line_error(
                line,
                format!(
                    "text in task {} before an Overview or Requirements heading",
                    self.number
                ),
            )),
            Section::Overview => {
                if let Some(overview) = &mut self.overview {
                    overview.push(text.to_string());
                }
                Ok(())
            }
            Section::Requirements => {
                let requirement = parse_numbered_item(text)
                    .ok_or_else(|| line_error(line, "requirement must be a numbered item like '1. ...'"))?;
                if let Some(requirements) = &mut self.requirements {
                    requirements.push(requirement.to_string());
                }
                Ok(())
            }
        }
    }

    fn finish(self) -> HiveResult<TaskSpec> {
        self.close_section()?;
        let overview = self
            .overview
            .ok_or_else(|| line_error(self.line, format!("task {} has no Overview section", self.number)))?;
        let requirements = self.requirements.ok_or_else(|| {
            line_error(
                self.line,
                format!("task {} has no Requirements section", self.number),
            )
        })?;
        Ok(TaskSpec {
            number: self.number,
            name: self.name,
            overview: overview.join("\n"),
            requirements,
            status: SpecStatus::Pending,
        })
    }
}

/// Parse a task-spec document
pub fn parse_task_specs(content: &str) -> HiveResult<Vec<TaskSpec>> {
    let mut specs = Vec::new();
    let mut numbers = HashSet::new();
    let mut current: Option<Draft> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(heading) = heading_text(line) {
            let task_heading = heading
                .strip_prefix("Task")
                .filter(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace));
            if let Some(rest) = task_heading {
                let (number, name) = parse_task_heading(rest)
                    .ok_or_else(|| line_error(line_no, format!("malformed task heading '{}'", line)))?;
                if !numbers.insert(number) {
                    return Err(line_error(line_no, format!("duplicate task number {}", number)));
                }
                if let Some(done) = current.take() {
                    specs.push(done.finish()?);
                }
                current = Some(Draft::new(number, name.to_string(), line_no));
                continue;
            }

            match current.as_mut() {
                // Preamble headings (document title etc.)
                None => continue,
                Some(draft) => {
                    let section = match heading {
                        "Overview" => Section::Overview,
                        "Requirements" => Section::Requirements,
                        other => {
                            return Err(line_error(
                                line_no,
                                format!("unexpected heading '{}' in task {}", other, draft.number),
                            ))
                        }
                    };
                    draft.open_section(section, line_no)?;
                }
            }
            continue;
        }

        if let Some(draft) = current.as_mut() {
            draft.push_line(line, line_no)?;
        }
    }

    match current.take() {
        Some(done) => specs.push(done.finish()?),
        None => {
            return Err(HiveError::validation(
                "document contains no 'Task <number>: <name>' heading",
            ))
        }
    }
    Ok(specs)
}

/// Text of a `#`..`######` heading, `None` for anything else
fn heading_text(line: &str) -> Option<&str> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = line.trim_start_matches('#');
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim())
}

/// `" 3: Name"` -> `(3, "Name")`
fn parse_task_heading(rest: &str) -> Option<(u32, &str)> {
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let (number, name) = rest.trim_start().split_once(':')?;
    let number = number.trim().parse::<u32>().ok()?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((number, name))
}

/// `"2. Do the thing"` -> `"Do the thing"`
fn parse_numbered_item(line: &str) -> Option<&str> {
    let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() == line.len() {
        return None;
    }
    let rest = rest.strip_prefix('.')?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let item = rest.trim();
    if item.is_empty() {
        None
    } else {
        Some(item)
    }
}
