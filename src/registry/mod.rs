//! Capability registry: the static set of worker roles available to a run.
//!
//! The registry is an immutable value once built. Runs receive it behind an
//! `Arc` and never mutate it.

pub mod manifest;
mod role;

pub use manifest::{AgentDefinition, ValidationReport};
pub use role::{CapabilityClass, Operation, RoleId, RoleSpec, Tier, WorkerRole};

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Roles indexed by id.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    roles: BTreeMap<RoleId, WorkerRole>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default role set used when no agent definitions are configured.
    pub fn builtin() -> Self {
        use CapabilityClass::*;
        use Operation::*;

        let entries: [(Tier, &str, &str, CapabilityClass, &[Operation]); 8] = [
            (
                Tier::Root,
                "orchestrator",
                "Owns a request and fans it out to coordinators",
                Thorough,
                &[TaskSpawn, FileRead],
            ),
            (
                Tier::Lead,
                "feasibility-analyst",
                "Checks a feature's prerequisites against the project",
                Thorough,
                &[TaskSpawn, FileRead, PatternMatch],
            ),
            (
                Tier::Lead,
                "research-lead",
                "Splits a question into research dimensions",
                Balanced,
                &[TaskSpawn, FileRead, NetworkFetch],
            ),
            (
                Tier::Lead,
                "feature-lead",
                "Splits a feature into implementation slices",
                Thorough,
                &[TaskSpawn, FileRead, FileWrite],
            ),
            (
                Tier::Leaf,
                "code-scout",
                "Reads and searches the source tree",
                Fast,
                &[FileRead, PatternMatch],
            ),
            (
                Tier::Leaf,
                "implementer",
                "Writes code for a single slice",
                Balanced,
                &[FileRead, FileWrite, ShellExec],
            ),
            (
                Tier::Leaf,
                "validator",
                "Runs checks and reports results",
                Fast,
                &[ShellExec, FileRead],
            ),
            (
                Tier::Leaf,
                "writer",
                "Produces text content",
                Fast,
                &[FileRead, FileWrite],
            ),
        ];

        let mut registry = Self::new();
        for (tier, name, description, capability, ops) in entries {
            let id = RoleId::new(name).expect("built-in role names are valid");
            let spec = RoleSpec::new(id, description, capability, ops.iter().copied());
            let role = WorkerRole::new(tier, spec).expect("built-in roles respect tier rules");
            registry
                .register(role)
                .expect("built-in role names are unique");
        }
        registry
    }

    /// Add a role.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a role with the same id exists.
    pub fn register(&mut self, role: WorkerRole) -> Result<()> {
        if self.roles.contains_key(role.id()) {
            return Err(Error::Configuration(format!(
                "duplicate role: {}",
                role.id()
            )));
        }
        self.roles.insert(role.id().clone(), role);
        Ok(())
    }

    /// Look up a role.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the role is not registered.
    pub fn get(&self, id: &RoleId) -> Result<&WorkerRole> {
        self.roles
            .get(id)
            .ok_or_else(|| Error::Configuration(format!("unknown role: {}", id)))
    }

    pub fn contains(&self, id: &RoleId) -> bool {
        self.roles.contains_key(id)
    }

    /// Whether `parent` may spawn `child`. Unknown roles never can.
    pub fn can_spawn(&self, parent: &RoleId, child: &RoleId) -> bool {
        match (self.roles.get(parent), self.roles.get(child)) {
            (Some(parent), Some(child)) => parent.check_spawn(child).is_ok(),
            _ => false,
        }
    }

    /// Roles in id order.
    pub fn roles(&self) -> impl Iterator<Item = &WorkerRole> {
        self.roles.values()
    }

    /// Roles at one tier, in id order.
    pub fn at_tier(&self, tier: Tier) -> impl Iterator<Item = &WorkerRole> {
        self.roles.values().filter(move |r| r.tier() == tier)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
