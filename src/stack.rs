//! Per-stack lifecycle, reconciliation between lock state and observed
//! runtime state, status aggregation, and the update workflow.

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;
use yaml_rust2::YamlLoader;

use crate::compose::{self, substitute_compose_text};
use crate::config::EngineConfig;
use crate::constants::{ACCEPTED_COMPOSE_FILE_NAMES, RESERVED_STACK_NAME};
use crate::error::preflight_message;
use crate::lock_store::LockStore;
use crate::runtime::RuntimeAdapter;
use crate::status::StackStatus;

fn name_regex() -> Regex {
    Regex::new(r"^[a-z0-9_-]+$").expect("static regex is valid")
}

/// The in-memory Stack entity: created lazily on demand.
#[derive(Debug, Clone)]
pub struct Stack {
    pub name: String,
    pub status: StackStatus,
    pub compose_yaml: Option<String>,
    pub compose_env: Option<String>,
    pub compose_file_name: String,
}

/// Presentation object for `toJSON`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackJson {
    pub name: String,
    pub status: StackStatus,
    pub tags: Vec<String>,
    #[serde(rename = "isManagedByDockge")]
    pub is_managed_by_dockge: bool,
    #[serde(rename = "composeFileName")]
    pub compose_file_name: String,
    pub endpoint: String,
    #[serde(rename = "composeYAML")]
    pub compose_yaml: String,
    #[serde(rename = "composeENV")]
    pub compose_env: String,
    #[serde(rename = "primaryHostname")]
    pub primary_hostname: String,
}

pub struct StackEngine {
    config: Arc<EngineConfig>,
    adapter: Arc<RuntimeAdapter>,
    locks: Arc<LockStore>,
    registry: Mutex<Option<BTreeMap<String, Stack>>>,
}

impl StackEngine {
    pub fn new(config: Arc<EngineConfig>, adapter: Arc<RuntimeAdapter>, locks: Arc<LockStore>) -> Self {
        Self {
            config,
            adapter,
            locks,
            registry: Mutex::new(None),
        }
    }

    async fn invalidate_registry(&self) {
        *self.registry.lock().await = None;
    }

    fn stack_dir(&self, name: &str) -> std::path::PathBuf {
        self.config.stack_dir(name)
    }

    async fn is_file_managed(&self, name: &str) -> bool {
        self.detect_compose_file_name(name).await.is_some()
    }

    async fn detect_compose_file_name(&self, name: &str) -> Option<String> {
        let dir = self.stack_dir(name);
        for candidate in ACCEPTED_COMPOSE_FILE_NAMES {
            if tokio::fs::metadata(dir.join(candidate)).await.is_ok() {
                return Some(candidate.to_string());
            }
        }
        None
    }

    async fn read_compose_yaml(&self, name: &str, compose_file_name: &str) -> Result<String> {
        let path = self.stack_dir(name).join(compose_file_name);
        tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading compose file for stack '{}'", name))
    }

    async fn read_compose_env(&self, name: &str) -> Result<String> {
        let path = self.stack_dir(name).join(".env");
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e).with_context(|| format!("reading .env for stack '{}'", name)),
        }
    }

    fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() {
            bail!("Stack name must not be empty");
        }
        if !name_regex().is_match(name) {
            bail!("Stack name can only contain [a-z][0-9] _ - only");
        }
        Ok(())
    }

    fn validate_yaml(yaml_text: &str) -> Result<()> {
        YamlLoader::load_from_str(yaml_text).context("Invalid YAML format")?;
        Ok(())
    }

    fn validate_env(env_text: &str) -> Result<()> {
        let lines: Vec<&str> = env_text.lines().collect();
        if lines.len() == 1 && !lines[0].is_empty() && !lines[0].contains('=') {
            bail!("Invalid .env format");
        }
        Ok(())
    }

    /// `save(isAdd)`.
    pub async fn save(&self, name: &str, is_add: bool, yaml_text: &str, env_text: &str) -> Result<()> {
        Self::validate_name(name)?;
        Self::validate_yaml(yaml_text)?;
        Self::validate_env(env_text)?;

        let dir = self.stack_dir(name);

        if is_add {
            if tokio::fs::metadata(&dir).await.is_ok() {
                bail!("Stack name already exists");
            }
            tokio::fs::create_dir_all(&dir)
                .await
                .context("Failed to create stack directory")?;
        } else if tokio::fs::metadata(&dir).await.is_err() {
            bail!("Stack not found");
        }

        let compose_file_name = self
            .detect_compose_file_name(name)
            .await
            .unwrap_or_else(|| "compose.yaml".to_string());
        let compose_path = dir.join(&compose_file_name);
        tokio::fs::write(&compose_path, yaml_text)
            .await
            .context("Failed to write compose file")?;

        let env_path = dir.join(".env");
        if tokio::fs::metadata(&env_path).await.is_ok() || !env_text.trim().is_empty() {
            tokio::fs::write(&env_path, env_text)
                .await
                .context("Failed to write .env file")?;
        }

        self.invalidate_registry().await;
        Ok(())
    }

    async fn compile_stack(&self, name: &str) -> Result<compose::CompileResult> {
        let compose_file_name = self
            .detect_compose_file_name(name)
            .await
            .context("Stack not found")?;
        let yaml_text = self.read_compose_yaml(name, &compose_file_name).await?;
        let env_text = self.read_compose_env(name).await?;
        let substituted = substitute_compose_text(&yaml_text, &env_text);
        Ok(compose::compile(&substituted, name))
    }

    /// `deploy`.
    pub async fn deploy(&self, name: &str) -> Result<()> {
        let compose_file_name = self
            .detect_compose_file_name(name)
            .await
            .context("Stack not found")?;
        let yaml_text = self.read_compose_yaml(name, &compose_file_name).await?;
        let env_text = self.read_compose_env(name).await?;
        let substituted = substitute_compose_text(&yaml_text, &env_text);
        let result = compose::compile(&substituted, name);
        if !result.errors.is_empty() {
            bail!(preflight_message(&result.errors));
        }

        self.adapter.deploy(&result.plan).await?;

        let mut record = self
            .locks
            .read(name)
            .await?
            .context("Lock record missing immediately after deploy")?;
        record.fingerprint = crate::lock_store::fingerprint(&yaml_text);
        self.locks.write(name, &record).await?;

        self.invalidate_registry().await;
        Ok(())
    }

    /// `start`: falls through to `deploy` for a file-managed stack with no
    /// lock record, or when the adapter reports "not found".
    pub async fn start(&self, name: &str) -> Result<()> {
        let has_lock = self.locks.exists(name).await;
        let file_managed = self.is_file_managed(name).await;

        if file_managed && !has_lock {
            return self.deploy(name).await;
        }

        match self.adapter.start(name, None).await {
            Ok(()) => Ok(()),
            Err(e) if file_managed && e.to_string().to_lowercase().contains("not found") => {
                self.deploy(name).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn stop(&self, name: &str) -> Result<()> {
        self.adapter.stop(name, None).await
    }

    pub async fn restart(&self, name: &str) -> Result<()> {
        self.adapter.restart(name, None).await
    }

    pub async fn down(&self, name: &str, remove_volumes: bool) -> Result<()> {
        let result = self.adapter.down(name, remove_volumes).await;
        self.invalidate_registry().await;
        result
    }

    /// `update`: pulls images, and only redeploys a stack that is
    /// currently running.
    pub async fn update(&self, name: &str) -> Result<()> {
        let compiled = self.compile_stack(name).await?;
        if !compiled.errors.is_empty() {
            bail!(preflight_message(&compiled.errors));
        }
        for service in compiled.plan.services.values() {
            self.adapter.pull_image(&service.image).await?;
        }

        let statuses = self.adapter.get_all_stack_status().await?;
        if statuses.get(name) != Some(&StackStatus::Running) {
            return Ok(());
        }

        let recompiled = self.compile_stack(name).await?;
        if !recompiled.errors.is_empty() {
            bail!(preflight_message(&recompiled.errors));
        }

        self.down(name, false).await?;
        self.deploy(name).await
    }

    /// `delete`: `down` failures are logged, not fatal.
    pub async fn delete(&self, name: &str) -> Result<()> {
        if let Err(e) = self.down(name, false).await {
            warn!("down failed while deleting stack '{}': {}", name, e);
        }
        let dir = self.stack_dir(name);
        if tokio::fs::metadata(&dir).await.is_ok() {
            tokio::fs::remove_dir_all(&dir)
                .await
                .with_context(|| format!("removing stack directory for '{}'", name))?;
        }
        self.invalidate_registry().await;
        Ok(())
    }

    /// `toJSON(endpoint)`. `primaryHostname` falls back to the endpoint's
    /// hostname, then `"localhost"` (the settings store that would
    /// otherwise override it is an external collaborator).
    pub async fn to_json(&self, name: &str, endpoint: &str) -> Result<StackJson> {
        let compose_file_name = self
            .detect_compose_file_name(name)
            .await
            .unwrap_or_else(|| "compose.yaml".to_string());
        let compose_yaml = self.read_compose_yaml(name, &compose_file_name).await.unwrap_or_default();
        let compose_env = self.read_compose_env(name).await.unwrap_or_default();
        let statuses = self.adapter.get_all_stack_status().await?;
        let status = statuses.get(name).copied().unwrap_or(StackStatus::Unknown);

        let primary_hostname = if endpoint.is_empty() {
            "localhost".to_string()
        } else {
            url::Url::parse(&format!("https://{}", endpoint))
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_else(|| "localhost".to_string())
        };

        Ok(StackJson {
            name: name.to_string(),
            status,
            tags: Vec::new(),
            is_managed_by_dockge: self.is_file_managed(name).await,
            compose_file_name,
            endpoint: endpoint.to_string(),
            compose_yaml,
            compose_env,
            primary_hostname,
        })
    }

    /// `getStackList`: scans `stacksDir`, then overlays adapter-reported
    /// statuses; entries not seen on disk are included as
    /// externally-managed stacks.
    pub async fn get_stack_list(&self) -> Result<BTreeMap<String, Stack>> {
        if let Some(cached) = self.registry.lock().await.clone() {
            return Ok(cached);
        }

        let mut stacks: BTreeMap<String, Stack> = BTreeMap::new();
        let mut entries = match tokio::fs::read_dir(&self.config.stacks_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to read stacks directory: {}", e);
                return Ok(stacks);
            }
        };

        while let Some(entry) = entries.next_entry().await.context("reading stacks directory")? {
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(_) => continue,
            };
            if !metadata.is_dir() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(compose_file_name) = self.detect_compose_file_name(&file_name).await else {
                continue;
            };
            stacks.insert(
                file_name.clone(),
                Stack {
                    name: file_name,
                    status: StackStatus::CreatedFile,
                    compose_yaml: None,
                    compose_env: None,
                    compose_file_name,
                },
            );
        }

        let statuses = self.adapter.get_all_stack_status().await?;
        for (stack_name, status) in statuses {
            if stack_name == RESERVED_STACK_NAME {
                continue;
            }
            match stacks.get_mut(&stack_name) {
                Some(stack) => stack.status = status,
                None => {
                    stacks.insert(
                        stack_name.clone(),
                        Stack {
                            name: stack_name,
                            status,
                            compose_yaml: None,
                            compose_env: None,
                            compose_file_name: "compose.yaml".to_string(),
                        },
                    );
                }
            }
        }

        *self.registry.lock().await = Some(stacks.clone());
        Ok(stacks)
    }
}
