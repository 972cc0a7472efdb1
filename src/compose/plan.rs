//! The Plan value object produced by the compose compiler. Immutable after
//! construction — every field is set once, by `compile`, and never mutated
//! in place by downstream code.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A single service's normalised, validated configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServicePlan {
    pub image: String,
    pub command: Option<String>,
    /// Normalised `KEY=VALUE` pairs, insertion order preserved — the
    /// adapter emits one `-e` flag per entry in this order.
    pub environment: Vec<(String, String)>,
    pub ports: Vec<String>,
    pub volumes: Vec<String>,
    pub networks: Vec<String>,
    pub working_dir: Option<String>,
    pub user: Option<String>,
    pub depends_on: Vec<String>,
}

/// The compiled deployment plan for one stack. Iteration order over
/// `services` is not semantic; `BTreeMap` is used purely for deterministic
/// debug output and equality comparisons in tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Plan {
    pub stack_name: String,
    pub services: BTreeMap<String, ServicePlan>,
    pub networks: Option<BTreeSet<String>>,
    pub volumes: Option<BTreeSet<String>>,
}

/// One compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileError {
    pub key: String,
    /// Dotted path, e.g. `services.web.deploy`.
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileWarning {
    pub key: String,
    pub path: String,
    pub message: String,
}

/// `(plan, errors, warnings)`. `errors` non-empty means the plan MUST NOT
/// be deployed; `warnings` are advisory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileResult {
    pub plan: Plan,
    pub errors: Vec<CompileError>,
    pub warnings: Vec<CompileWarning>,
}

impl CompileResult {
    pub fn is_deployable(&self) -> bool {
        self.errors.is_empty()
    }
}
