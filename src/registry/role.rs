//! Worker role vocabulary: identifiers, tiers, capability classes and
//! operation allow-lists.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;

use crate::error::{Error, Result};

/// Role names: lowercase letters, digits and hyphens, starting with a letter.
static ROLE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]*$").expect("role name regex"));

/// Validated identifier of a worker role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoleId(String);

impl RoleId {
    /// Create a role id, rejecting names that do not match the role name pattern.
    pub fn new(name: &str) -> Result<Self> {
        let name = name.trim();
        if !ROLE_NAME_RE.is_match(name) {
            return Err(Error::Configuration(format!(
                "invalid role name \"{}\": must be lowercase letters, numbers, and hyphens \
                 (e.g. \"code-scout\")",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoleId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<RoleId> for String {
    fn from(id: RoleId) -> Self {
        id.0
    }
}

impl std::fmt::Display for RoleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RoleId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Rank bounding how deep fan-out may recurse.
///
/// Tier 0 is the root orchestrator, tier 1 roles may fan out once more,
/// tier 2 roles are leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Tier {
    Root,
    Lead,
    Leaf,
}

impl Tier {
    pub fn level(self) -> u8 {
        match self {
            Tier::Root => 0,
            Tier::Lead => 1,
            Tier::Leaf => 2,
        }
    }

    /// The tier a role at this tier may spawn, if any.
    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::Root => Some(Tier::Lead),
            Tier::Lead => Some(Tier::Leaf),
            Tier::Leaf => None,
        }
    }
}

impl TryFrom<u8> for Tier {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Tier::Root),
            1 => Ok(Tier::Lead),
            2 => Ok(Tier::Leaf),
            other => Err(Error::Configuration(format!(
                "invalid tier {}: valid tiers are 0, 1, 2",
                other
            ))),
        }
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> Self {
        tier.level()
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.level())
    }
}

/// Cost/quality class of the model backing a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityClass {
    Fast,
    Balanced,
    Thorough,
    /// Use whatever the parent session runs with.
    #[default]
    Inherit,
}

impl CapabilityClass {
    /// Map an agent definition `model` value to a capability class.
    pub fn from_model(model: &str) -> Option<Self> {
        match model.trim().to_lowercase().as_str() {
            "haiku" => Some(CapabilityClass::Fast),
            "sonnet" => Some(CapabilityClass::Balanced),
            "opus" => Some(CapabilityClass::Thorough),
            "inherit" => Some(CapabilityClass::Inherit),
            _ => None,
        }
    }

    /// Model alias passed to the agent CLI, `None` for inherit.
    pub fn model(self) -> Option<&'static str> {
        match self {
            CapabilityClass::Fast => Some("haiku"),
            CapabilityClass::Balanced => Some("sonnet"),
            CapabilityClass::Thorough => Some("opus"),
            CapabilityClass::Inherit => None,
        }
    }
}

impl std::fmt::Display for CapabilityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityClass::Fast => write!(f, "fast"),
            CapabilityClass::Balanced => write!(f, "balanced"),
            CapabilityClass::Thorough => write!(f, "thorough"),
            CapabilityClass::Inherit => write!(f, "inherit"),
        }
    }
}

/// Kind of side effect a worker may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    ShellExec,
    FileRead,
    FileWrite,
    PatternMatch,
    NetworkFetch,
    TaskSpawn,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::ShellExec,
        Operation::FileRead,
        Operation::FileWrite,
        Operation::PatternMatch,
        Operation::NetworkFetch,
        Operation::TaskSpawn,
    ];

    /// Map an agent tool name to the operation it performs.
    pub fn from_tool(tool: &str) -> Option<Self> {
        match tool.trim() {
            "Bash" => Some(Operation::ShellExec),
            "Read" => Some(Operation::FileRead),
            "Write" | "Edit" | "MultiEdit" | "NotebookEdit" => Some(Operation::FileWrite),
            "Grep" | "Glob" => Some(Operation::PatternMatch),
            "WebFetch" | "WebSearch" => Some(Operation::NetworkFetch),
            "Task" => Some(Operation::TaskSpawn),
            _ => None,
        }
    }

    /// Agent tool names granting this operation.
    pub fn tools(self) -> &'static [&'static str] {
        match self {
            Operation::ShellExec => &["Bash"],
            Operation::FileRead => &["Read"],
            Operation::FileWrite => &["Write", "Edit"],
            Operation::PatternMatch => &["Grep", "Glob"],
            Operation::NetworkFetch => &["WebFetch", "WebSearch"],
            Operation::TaskSpawn => &["Task"],
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operation::ShellExec => "shell-exec",
            Operation::FileRead => "file-read",
            Operation::FileWrite => "file-write",
            Operation::PatternMatch => "pattern-match",
            Operation::NetworkFetch => "network-fetch",
            Operation::TaskSpawn => "task-spawn",
        };
        write!(f, "{s}")
    }
}

/// Static description shared by every role variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub id: RoleId,
    pub description: String,
    pub capability: CapabilityClass,
    pub allowed_operations: BTreeSet<Operation>,
}

impl RoleSpec {
    pub fn new(
        id: RoleId,
        description: &str,
        capability: CapabilityClass,
        allowed_operations: impl IntoIterator<Item = Operation>,
    ) -> Self {
        Self {
            id,
            description: description.to_string(),
            capability,
            allowed_operations: allowed_operations.into_iter().collect(),
        }
    }
}

/// A worker role, one variant per tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "spec", rename_all = "snake_case")]
pub enum WorkerRole {
    /// Tier 0: owns the request and fans out to coordinators.
    Orchestrator(RoleSpec),
    /// Tier 1: may run one more fan-out to specialists.
    Coordinator(RoleSpec),
    /// Tier 2: leaf worker, never spawns.
    Specialist(RoleSpec),
}

impl WorkerRole {
    /// Build a role for `tier`.
    ///
    /// # Errors
    ///
    /// Tier-2 roles holding `task-spawn` are rejected.
    pub fn new(tier: Tier, spec: RoleSpec) -> Result<Self> {
        match tier {
            Tier::Root => Ok(WorkerRole::Orchestrator(spec)),
            Tier::Lead => Ok(WorkerRole::Coordinator(spec)),
            Tier::Leaf => {
                if spec.allowed_operations.contains(&Operation::TaskSpawn) {
                    return Err(Error::Configuration(format!(
                        "tier-2 role {} cannot hold {}",
                        spec.id,
                        Operation::TaskSpawn
                    )));
                }
                Ok(WorkerRole::Specialist(spec))
            }
        }
    }

    pub fn spec(&self) -> &RoleSpec {
        match self {
            WorkerRole::Orchestrator(spec)
            | WorkerRole::Coordinator(spec)
            | WorkerRole::Specialist(spec) => spec,
        }
    }

    pub fn id(&self) -> &RoleId {
        &self.spec().id
    }

    pub fn tier(&self) -> Tier {
        match self {
            WorkerRole::Orchestrator(_) => Tier::Root,
            WorkerRole::Coordinator(_) => Tier::Lead,
            WorkerRole::Specialist(_) => Tier::Leaf,
        }
    }

    pub fn capability(&self) -> CapabilityClass {
        self.spec().capability
    }

    pub fn allows(&self, operation: Operation) -> bool {
        self.spec().allowed_operations.contains(&operation)
    }

    /// Whether this role may fan out at all.
    pub fn can_spawn(&self) -> bool {
        self.tier().next().is_some() && self.allows(Operation::TaskSpawn)
    }

    /// Check that this role may spawn `child`.
    ///
    /// # Errors
    ///
    /// - `DepthExceeded` if this role is a leaf
    /// - `OperationDenied` if this role lacks `task-spawn`
    /// - `Graph` if `child` is not exactly one tier below
    pub fn check_spawn(&self, child: &WorkerRole) -> Result<()> {
        self.check_may_spawn()?;
        if Some(child.tier()) != self.tier().next() {
            return Err(Error::Graph(format!(
                "role {} (tier {}) cannot be spawned by {} (tier {})",
                child.id(),
                child.tier(),
                self.id(),
                self.tier()
            )));
        }
        Ok(())
    }

    /// Check that this role may fan out, independent of the child.
    pub fn check_may_spawn(&self) -> Result<()> {
        if self.tier().next().is_none() {
            return Err(Error::DepthExceeded {
                role: self.id().to_string(),
                tier: self.tier().level(),
            });
        }
        if !self.allows(Operation::TaskSpawn) {
            return Err(Error::OperationDenied {
                role: self.id().to_string(),
                operation: Operation::TaskSpawn.to_string(),
            });
        }
        Ok(())
    }

    /// Like `check_may_spawn`, but against the operations one call was
    /// actually granted rather than the full allow-list.
    pub fn check_may_spawn_with(&self, granted: &BTreeSet<Operation>) -> Result<()> {
        self.check_may_spawn()?;
        if !granted.contains(&Operation::TaskSpawn) {
            return Err(Error::OperationDenied {
                role: self.id().to_string(),
                operation: Operation::TaskSpawn.to_string(),
            });
        }
        Ok(())
    }

    /// Check that every requested operation is on the allow-list.
    pub fn check_operations(&self, requested: &BTreeSet<Operation>) -> Result<()> {
        match requested.iter().find(|op| !self.allows(**op)) {
            Some(op) => Err(Error::OperationDenied {
                role: self.id().to_string(),
                operation: op.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Operations a call actually gets: the request, or the whole allow-list
    /// when nothing specific was requested.
    pub fn effective_operations(&self, requested: &BTreeSet<Operation>) -> BTreeSet<Operation> {
        if requested.is_empty() {
            self.spec().allowed_operations.clone()
        } else {
            requested.clone()
        }
    }
}
