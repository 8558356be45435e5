//! Agent definition files.
//!
//! Roles can be declared as markdown files with a `---` frontmatter block:
//!
//! ```text
//! ---
//! name: code-scout
//! description: Reads and searches the source tree
//! tools: Read, Grep, Glob
//! model: haiku
//! tier: 2
//! ---
//! System prompt body...
//! ```
//!
//! `name` and `description` are required. `tools`, `model`, `tier`,
//! `permissionMode` and `skills` are optional. Unknown fields and an empty
//! body only produce warnings.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{CapabilityClass, CapabilityRegistry, Operation, RoleId, RoleSpec, Tier, WorkerRole};
use crate::error::{Error, Result};

const REQUIRED_FIELDS: &[&str] = &["description", "name"];
const OPTIONAL_FIELDS: &[&str] = &["model", "permissionMode", "skills", "tier", "tools"];
const VALID_PERMISSION_MODES: &[&str] = &[
    "acceptEdits",
    "bypassPermissions",
    "default",
    "ignore",
    "plan",
];

/// Outcome of validating one agent definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub file: Option<PathBuf>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn for_file(file: Option<&Path>) -> Self {
        Self {
            file: file.map(Path::to_path_buf),
            ..Default::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Human-readable summary.
    pub fn format(&self) -> String {
        let mut lines = Vec::new();
        if let Some(file) = &self.file {
            lines.push(format!("Validating: {}", file.display()));
        }
        if self.is_valid() {
            lines.push("  valid".to_string());
        }
        for error in &self.errors {
            lines.push(format!("  error: {}", error));
        }
        for warning in &self.warnings {
            lines.push(format!("  warning: {}", warning));
        }
        lines.join("\n")
    }
}

/// A parsed, validated agent definition.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentDefinition {
    pub name: RoleId,
    pub description: String,
    pub tools: Option<Vec<String>>,
    pub capability: CapabilityClass,
    pub tier: Option<Tier>,
    pub prompt: String,
}

impl AgentDefinition {
    /// Tier used when the file does not declare one: roles that can delegate
    /// (`Task` tool) are coordinators, everything else is a leaf.
    pub fn effective_tier(&self) -> Tier {
        if let Some(tier) = self.tier {
            return tier;
        }
        match &self.tools {
            Some(tools) if tools.iter().any(|t| t == "Task") => Tier::Lead,
            _ => Tier::Leaf,
        }
    }

    /// Operations granted by the tool list. Without a tool list the role gets
    /// every operation its tier permits.
    pub fn operations(&self) -> BTreeSet<Operation> {
        let tier = self.effective_tier();
        match &self.tools {
            Some(tools) => tools.iter().filter_map(|t| Operation::from_tool(t)).collect(),
            None => Operation::ALL
                .into_iter()
                .filter(|op| *op != Operation::TaskSpawn || tier.next().is_some())
                .collect(),
        }
    }

    pub fn to_role(&self) -> Result<WorkerRole> {
        WorkerRole::new(
            self.effective_tier(),
            RoleSpec::new(
                self.name.clone(),
                &self.description,
                self.capability,
                self.operations(),
            ),
        )
    }
}

/// Split `content` into frontmatter fields and body.
///
/// Returns `None` if there is no well-formed frontmatter block. Values may
/// continue on indented lines or use the `|` / `>` block indicators.
pub fn parse_frontmatter(content: &str) -> Option<(BTreeMap<String, String>, String)> {
    if !content.starts_with("---") {
        return None;
    }
    let lines: Vec<&str> = content.lines().collect();
    let end = lines
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, line)| line.trim() == "---")
        .map(|(i, _)| i)?;

    let mut fields = BTreeMap::new();
    let mut current_key: Option<String> = None;
    let mut continuation: Vec<String> = Vec::new();

    for line in &lines[1..end] {
        if current_key.is_some() && (line.starts_with("  ") || line.starts_with('\t')) {
            continuation.push(line.trim().to_string());
            continue;
        }
        if let Some(key) = current_key.take() {
            if !continuation.is_empty() {
                fields.insert(key, continuation.join("\n"));
                continuation.clear();
            }
        }
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_string();
            let value = value.trim();
            if value.is_empty() || value == "|" || value == ">" {
                current_key = Some(key);
            } else {
                fields.insert(key, value.to_string());
            }
        }
    }
    if let Some(key) = current_key {
        if !continuation.is_empty() {
            fields.insert(key, continuation.join("\n"));
        }
    }

    let body = lines[end + 1..].join("\n");
    Some((fields, body))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|s| s.trim().trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Validate agent file content, returning the definition when it is valid.
pub fn validate_content(
    content: &str,
    file: Option<&Path>,
) -> (ValidationReport, Option<AgentDefinition>) {
    let mut report = ValidationReport::for_file(file);

    let Some((fields, body)) = parse_frontmatter(content) else {
        report
            .errors
            .push("Missing or invalid frontmatter (must start with ---)".to_string());
        return (report, None);
    };
    if fields.is_empty() {
        report
            .errors
            .push("Missing or invalid frontmatter (must start with ---)".to_string());
        return (report, None);
    }

    for field in REQUIRED_FIELDS {
        match fields.get(*field) {
            None => report
                .errors
                .push(format!("Missing required field: \"{}\"", field)),
            Some(v) if v.trim().is_empty() => report
                .errors
                .push(format!("Required field \"{}\" is empty", field)),
            Some(_) => {}
        }
    }

    for field in fields.keys() {
        if !REQUIRED_FIELDS.contains(&field.as_str()) && !OPTIONAL_FIELDS.contains(&field.as_str())
        {
            let mut valid: Vec<&str> = REQUIRED_FIELDS
                .iter()
                .chain(OPTIONAL_FIELDS)
                .copied()
                .collect();
            valid.sort_unstable();
            report.warnings.push(format!(
                "Unknown field \"{}\" - valid fields are: {}",
                field,
                valid.join(", ")
            ));
        }
    }

    let name = fields.get("name").and_then(|n| match RoleId::new(n) {
        Ok(id) => Some(id),
        Err(_) => {
            report.errors.push(format!(
                "Invalid name format \"{}\" - must be lowercase letters, numbers, and hyphens \
                 (e.g., \"my-agent\")",
                n.trim()
            ));
            None
        }
    });

    let capability = match fields.get("model") {
        Some(model) => CapabilityClass::from_model(model).unwrap_or_else(|| {
            report.errors.push(format!(
                "Invalid model \"{}\" - valid values: haiku, inherit, opus, sonnet",
                model.trim().to_lowercase()
            ));
            CapabilityClass::Inherit
        }),
        None => CapabilityClass::Inherit,
    };

    if let Some(mode) = fields.get("permissionMode") {
        if !VALID_PERMISSION_MODES.contains(&mode.trim()) {
            report.errors.push(format!(
                "Invalid permissionMode \"{}\" - valid values: {}",
                mode.trim(),
                VALID_PERMISSION_MODES.join(", ")
            ));
        }
    }

    let tier = fields.get("tier").and_then(|t| {
        let parsed = t
            .trim()
            .parse::<u8>()
            .map_err(|_| ())
            .and_then(|n| Tier::try_from(n).map_err(|_| ()));
        match parsed {
            Ok(tier) => Some(tier),
            Err(()) => {
                report
                    .errors
                    .push(format!("Invalid tier \"{}\" - valid values: 0, 1, 2", t.trim()));
                None
            }
        }
    });

    let tools = fields.get("tools").map(|t| split_list(t));
    if let Some(tools) = &tools {
        for tool in tools {
            if Operation::from_tool(tool).is_none() {
                report
                    .warnings
                    .push(format!("Unknown tool \"{}\" grants no operation", tool));
            }
        }
    }

    if body.trim().is_empty() {
        report
            .warnings
            .push("Agent has no system prompt (body content after frontmatter)".to_string());
    }

    if !report.is_valid() {
        return (report, None);
    }
    let Some(name) = name else {
        return (report, None);
    };

    let definition = AgentDefinition {
        name,
        description: fields.get("description").cloned().unwrap_or_default(),
        tools,
        capability,
        tier,
        prompt: body.trim().to_string(),
    };

    if definition.effective_tier() == Tier::Leaf
        && definition.operations().contains(&Operation::TaskSpawn)
    {
        report
            .errors
            .push("Tier-2 agents cannot use the Task tool".to_string());
        return (report, None);
    }

    (report, Some(definition))
}

/// Validate an agent file from disk.
pub fn validate_file(path: &Path) -> (ValidationReport, Option<AgentDefinition>) {
    let mut report = ValidationReport::for_file(Some(path));
    if !path.exists() {
        report
            .errors
            .push(format!("File not found: {}", path.display()));
        return (report, None);
    }
    if path.extension().and_then(|e| e.to_str()) != Some("md") {
        report
            .errors
            .push("Agent files must have .md extension".to_string());
        return (report, None);
    }
    match fs::read_to_string(path) {
        Ok(content) => validate_content(&content, Some(path)),
        Err(e) => {
            report.errors.push(format!("Failed to read file: {}", e));
            (report, None)
        }
    }
}

/// Agent definition files in `dir`, sorted by path.
pub fn definition_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| {
            Error::Configuration(format!("cannot read roles dir {}: {}", dir.display(), e))
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("md"))
        .collect();
    files.sort();
    Ok(files)
}

/// Build a registry from every agent definition in `dir`.
///
/// # Errors
///
/// Returns a configuration error naming every invalid file.
pub fn load_dir(dir: &Path) -> Result<CapabilityRegistry> {
    let mut registry = CapabilityRegistry::new();
    let mut problems = Vec::new();

    for path in definition_files(dir)? {
        let (report, definition) = validate_file(&path);
        for warning in &report.warnings {
            warn!(file = %path.display(), "{}", warning);
        }
        match definition {
            Some(def) => {
                let role = def.to_role()?;
                debug!(role = %role.id(), tier = %role.tier(), "Loaded agent definition");
                registry.register(role)?;
            }
            None => problems.push(report.format()),
        }
    }

    if !problems.is_empty() {
        return Err(Error::Configuration(format!(
            "invalid agent definitions:\n{}",
            problems.join("\n")
        )));
    }
    Ok(registry)
}
