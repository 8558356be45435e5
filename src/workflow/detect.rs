//! Step synthesis from project files.
//!
//! `detect` looks for ecosystem markers in a fixed order (Rust, Node,
//! Python) and emits type-check, lint, test and doctor steps for each one it
//! finds. It only reads files, so two calls on an unchanged tree return the
//! same steps.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use super::types::{StepKind, StepSpec};
use crate::{Error, Result};

#[derive(Debug, Default, Deserialize)]
struct PackageJson {
    #[serde(default)]
    scripts: BTreeMap<String, String>,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: BTreeMap<String, String>,
}

impl PackageJson {
    fn depends_on(&self, name: &str) -> bool {
        self.dependencies.contains_key(name) || self.dev_dependencies.contains_key(name)
    }

    fn has_script(&self, name: &str) -> bool {
        self.scripts.contains_key(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PackageManager {
    Npm,
    Yarn,
    Pnpm,
}

impl PackageManager {
    fn detect(dir: &Path) -> Self {
        if dir.join("yarn.lock").exists() {
            PackageManager::Yarn
        } else if dir.join("pnpm-lock.yaml").exists() {
            PackageManager::Pnpm
        } else {
            PackageManager::Npm
        }
    }

    fn program(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Yarn => "yarn",
            PackageManager::Pnpm => "pnpm",
        }
    }

    /// Runs a binary from the project's dependencies.
    fn exec(&self, bin: &str, args: &[&str]) -> (String, Vec<String>) {
        let (program, mut full): (&str, Vec<String>) = match self {
            PackageManager::Npm => ("npx", vec![bin.to_string()]),
            PackageManager::Yarn => ("yarn", vec![bin.to_string()]),
            PackageManager::Pnpm => ("pnpm", vec!["exec".to_string(), bin.to_string()]),
        };
        full.extend(args.iter().map(|a| a.to_string()));
        (program.to_string(), full)
    }

    fn run_script(&self, script: &str) -> (String, Vec<String>) {
        (
            self.program().to_string(),
            vec!["run".to_string(), script.to_string()],
        )
    }
}

fn step(name: &str, kind: StepKind, (program, args): (String, Vec<String>)) -> StepSpec {
    StepSpec {
        name: name.to_string(),
        kind,
        program,
        args,
    }
}

fn rust_steps(dir: &Path) -> Vec<StepSpec> {
    if !dir.join("Cargo.toml").exists() {
        return Vec::new();
    }
    vec![
        StepSpec::new("cargo check", StepKind::TypeCheck, "cargo", &["check", "--all-targets"]),
        StepSpec::new(
            "cargo clippy",
            StepKind::Lint,
            "cargo",
            &["clippy", "--all-targets", "--", "-D", "warnings"],
        ),
        StepSpec::new("cargo test", StepKind::Test, "cargo", &["test"]),
    ]
}

fn node_steps(dir: &Path) -> Result<Vec<StepSpec>> {
    let manifest = dir.join("package.json");
    if !manifest.exists() {
        return Ok(Vec::new());
    }
    let package: PackageJson = serde_json::from_str(&fs::read_to_string(&manifest)?)
        .map_err(|e| Error::Configuration(format!("{}: {}", manifest.display(), e)))?;
    let pm = PackageManager::detect(dir);
    let mut steps = Vec::new();

    if package.has_script("typecheck") {
        steps.push(step("typecheck", StepKind::TypeCheck, pm.run_script("typecheck")));
    } else if dir.join("tsconfig.json").exists() || package.depends_on("typescript") {
        steps.push(step("tsc", StepKind::TypeCheck, pm.exec("tsc", &["--noEmit"])));
    }
    if package.has_script("lint") {
        steps.push(step("lint", StepKind::Lint, pm.run_script("lint")));
    }
    if package.has_script("test") {
        steps.push(step("test", StepKind::Test, pm.run_script("test")));
    }
    if package.depends_on("expo") {
        steps.push(step("expo-doctor", StepKind::Doctor, pm.exec("expo-doctor", &[])));
    }
    Ok(steps)
}

fn python_steps(dir: &Path) -> Vec<StepSpec> {
    let is_python = ["pyproject.toml", "setup.py", "requirements.txt"]
        .iter()
        .any(|marker| dir.join(marker).exists());
    if !is_python {
        return Vec::new();
    }
    vec![
        StepSpec::new("mypy", StepKind::TypeCheck, "mypy", &["."]),
        StepSpec::new("ruff", StepKind::Lint, "ruff", &["check", "."]),
        StepSpec::new("pytest", StepKind::Test, "pytest", &[]),
    ]
}

/// Synthesize validation steps for the project rooted at `dir`.
///
/// # Errors
/// Returns `Error::Configuration` when `package.json` exists but cannot be
/// parsed, and `Error::Io` when a marker file cannot be read.
pub fn detect(dir: &Path) -> Result<Vec<StepSpec>> {
    let mut steps = Vec::new();
    for mut group in [rust_steps(dir), node_steps(dir)?, python_steps(dir)] {
        group.sort_by_key(|s| s.kind);
        steps.extend(group);
    }
    debug!(dir = %dir.display(), count = steps.len(), "synthesized validation steps");
    Ok(steps)
}
