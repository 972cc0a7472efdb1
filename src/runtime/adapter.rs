//! Plan-driven operations on top of the runtime driver and lock store: one
//! function per `container run/start/stop/delete` subcommand.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use crate::compose::Plan;
use crate::constants::{CONTAINER_NAME_PREFIX, CONTAINER_NAME_SEP, DEFAULT_SERVICE_INDEX, RESERVED_STACK_NAME};
use crate::lock_store::{LockRecord, LockStore, ServiceLock};
use crate::reference::{build_candidates, is_local_only};
use crate::runtime::driver::RuntimeDriver;
use crate::runtime::parse::{field_i64, field_str, is_builder_container, parse_json_or_jsonl, read_name, EXIT_CODE_FIELDS, STARTED_AT_FIELDS, STATE_FIELDS};
use crate::status::{rollup, ContainerState, StackStatus};

/// One container's observed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStatus {
    pub name: String,
    pub state: ContainerState,
    pub exit_code: Option<i32>,
    pub started_at: Option<String>,
}

/// An invocation description for the terminal layer to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecInvocation {
    pub command: String,
    pub args: Vec<String>,
}

/// A runtime image record with in-use accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub reference: String,
    pub digest: Option<String>,
    pub in_use_count: usize,
}

pub struct RuntimeAdapter {
    driver: Arc<dyn RuntimeDriver>,
    locks: Arc<LockStore>,
    binary: String,
}

/// Build the container name for `(stack, service, index)`.
pub fn container_name(stack: &str, service: &str, index: u32) -> String {
    format!(
        "{}{sep}{}{sep}{}{sep}{}",
        CONTAINER_NAME_PREFIX,
        stack,
        service,
        index,
        sep = CONTAINER_NAME_SEP
    )
}

/// Strip the prefix and take the first underscore-delimited segment — used
/// only as a fallback when no lock record exists.
pub fn infer_stack_name(container_name: &str) -> Option<String> {
    let prefix = format!("{}{}", CONTAINER_NAME_PREFIX, CONTAINER_NAME_SEP);
    let tail = container_name.strip_prefix(&prefix)?;
    tail.split(CONTAINER_NAME_SEP).next().map(str::to_string)
}

/// Topologically order services by `dependsOn`, ignoring edges to missing
/// services; cycles are broken by visitation order.
fn topo_order(services: &BTreeMap<String, crate::compose::ServicePlan>) -> Vec<String> {
    let mut order = Vec::new();
    let mut done: HashSet<String> = HashSet::new();
    let mut visiting: HashSet<String> = HashSet::new();

    fn visit(
        name: &str,
        services: &BTreeMap<String, crate::compose::ServicePlan>,
        done: &mut HashSet<String>,
        visiting: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) {
        if done.contains(name) || visiting.contains(name) {
            return;
        }
        visiting.insert(name.to_string());
        if let Some(plan) = services.get(name) {
            for dep in &plan.depends_on {
                if services.contains_key(dep) {
                    visit(dep, services, done, visiting, order);
                }
            }
        }
        visiting.remove(name);
        done.insert(name.to_string());
        order.push(name.to_string());
    }

    for name in services.keys() {
        visit(name, services, &mut done, &mut visiting, &mut order);
    }
    order
}

fn parse_state(raw: &str) -> ContainerState {
    match raw.to_lowercase().as_str() {
        "running" => ContainerState::Running,
        "stopped" | "exited" => ContainerState::Stopped,
        "created" => ContainerState::Created,
        _ => ContainerState::Unknown,
    }
}

impl RuntimeAdapter {
    pub fn new(driver: Arc<dyn RuntimeDriver>, locks: Arc<LockStore>, binary: impl Into<String>) -> Self {
        Self {
            driver,
            locks,
            binary: binary.into(),
        }
    }

    async fn run(&self, args: Vec<String>) -> crate::runtime::driver::RunOutput {
        self.driver.run(&args).await
    }

    async fn list_all_containers(&self) -> Result<Vec<serde_json::Value>> {
        let output = self
            .run(vec!["list".to_string(), "--all".to_string(), "--format".to_string(), "json".to_string()])
            .await;
        if !output.success() {
            bail!("runtime unresponsive listing containers: {}", output.stderr);
        }
        Ok(parse_json_or_jsonl(&output.stdout)
            .into_iter()
            .filter(|r| !is_builder_container(r))
            .collect())
    }

    fn container_status_of(record: &serde_json::Value) -> Option<ContainerStatus> {
        let name = read_name(record)?;
        let state = field_str(record, STATE_FIELDS)
            .map(|s| parse_state(&s))
            .unwrap_or(ContainerState::Unknown);
        let exit_code = field_i64(record, EXIT_CODE_FIELDS).map(|v| v as i32);
        let started_at = field_str(record, STARTED_AT_FIELDS);
        Some(ContainerStatus {
            name,
            state,
            exit_code,
            started_at,
        })
    }

    /// `pullImage`. Local-only references fail fast if absent; otherwise a
    /// failed pull falls back to a local presence check.
    pub async fn pull_image(&self, image: &str) -> Result<()> {
        if is_local_only(image) {
            if self.image_present_locally(image).await? {
                return Ok(());
            }
            bail!("Local image '{}' not found", image);
        }

        let output = self
            .run(vec!["image".to_string(), "pull".to_string(), image.to_string()])
            .await;
        if output.success() {
            return Ok(());
        }
        if self.image_present_locally(image).await? {
            return Ok(());
        }
        bail!("Failed to pull image '{}': {}", image, output.stderr)
    }

    async fn image_present_locally(&self, image: &str) -> Result<bool> {
        let images = self.list_images_raw().await?;
        let candidates = build_candidates(image);
        Ok(images.iter().any(|img| {
            candidates.contains(&img.reference)
                || img
                    .digest
                    .as_deref()
                    .map(|d| d == image)
                    .unwrap_or(false)
        }))
    }

    /// `deploy(plan)`.
    pub async fn deploy(&self, plan: &Plan) -> Result<LockRecord> {
        let order = topo_order(&plan.services);
        let mut record = LockRecord::new(plan.stack_name.clone());
        record.networks = plan.networks.clone().map(|s| s.into_iter().collect()).unwrap_or_default();
        record.volumes = plan.volumes.clone().map(|s| s.into_iter().collect()).unwrap_or_default();

        for service_name in &order {
            let service = plan
                .services
                .get(service_name)
                .expect("topo_order only returns known services");

            self.pull_image(&service.image)
                .await
                .with_context(|| format!("pulling image for service '{}'", service_name))?;

            let name = container_name(&plan.stack_name, service_name, DEFAULT_SERVICE_INDEX);
            let mut args = vec!["run".to_string(), "-d".to_string(), "--name".to_string(), name.clone()];
            for port in &service.ports {
                args.push("-p".to_string());
                args.push(port.clone());
            }
            for (key, value) in &service.environment {
                args.push("-e".to_string());
                args.push(format!("{}={}", key, value));
            }
            for volume in &service.volumes {
                args.push("-v".to_string());
                args.push(volume.clone());
            }
            for network in &service.networks {
                args.push("--network".to_string());
                args.push(network.clone());
            }
            if let Some(working_dir) = &service.working_dir {
                args.push("-w".to_string());
                args.push(working_dir.clone());
            }
            if let Some(user) = &service.user {
                args.push("--user".to_string());
                args.push(user.clone());
            }
            args.push(service.image.clone());
            if let Some(command) = &service.command {
                args.extend(command.split_whitespace().map(str::to_string));
            }

            let output = self.run(args).await;
            if !output.success() {
                bail!(
                    "Failed to deploy service '{}': {}",
                    service_name,
                    output.stderr
                );
            }

            record.services.insert(
                service_name.clone(),
                ServiceLock {
                    container_name: name,
                    image: service.image.clone(),
                    created_at: Utc::now(),
                    container_id: None,
                },
            );
        }

        record.last_deployed = Utc::now();
        record.fingerprint = String::new();
        self.locks.write(&plan.stack_name, &record).await?;
        Ok(record)
    }

    fn target_containers(
        &self,
        stack_name: &str,
        lock: &Option<LockRecord>,
        service_name: Option<&str>,
    ) -> Vec<String> {
        match lock {
            Some(record) => match service_name {
                Some(svc) => record
                    .services
                    .get(svc)
                    .map(|s| vec![s.container_name.clone()])
                    .unwrap_or_default(),
                None => record.container_names(),
            },
            None => match service_name {
                Some(_) => Vec::new(),
                None => vec![stack_name.to_string()],
            },
        }
    }

    /// `start(stackName, serviceName?)`.
    pub async fn start(&self, stack_name: &str, service_name: Option<&str>) -> Result<()> {
        let lock = self.locks.read(stack_name).await?;
        for target in self.target_containers(stack_name, &lock, service_name) {
            let output = self.run(vec!["start".to_string(), target.clone()]).await;
            if !output.success() {
                bail!("Failed to start '{}': {}", target, output.stderr);
            }
        }
        Ok(())
    }

    /// `stop(stackName, serviceName?)`.
    pub async fn stop(&self, stack_name: &str, service_name: Option<&str>) -> Result<()> {
        let lock = self.locks.read(stack_name).await?;
        for target in self.target_containers(stack_name, &lock, service_name) {
            let output = self.run(vec!["stop".to_string(), target.clone()]).await;
            if !output.success() {
                bail!("Failed to stop '{}': {}", target, output.stderr);
            }
        }
        Ok(())
    }

    /// `restart(stackName, serviceName?)`: stop then start.
    pub async fn restart(&self, stack_name: &str, service_name: Option<&str>) -> Result<()> {
        self.stop(stack_name, service_name).await?;
        self.start(stack_name, service_name).await
    }

    /// `down(stackName, removeVolumes?)`.
    pub async fn down(&self, stack_name: &str, remove_volumes: bool) -> Result<()> {
        let lock = self.locks.read(stack_name).await?;
        match lock {
            Some(record) => {
                for container in record.container_names() {
                    let _ = self.run(vec!["stop".to_string(), container]).await;
                }
                for container in record.container_names() {
                    let output = self.run(vec!["delete".to_string(), container.clone()]).await;
                    if !output.success() {
                        bail!("Failed to delete '{}': {}", container, output.stderr);
                    }
                }
                if remove_volumes {
                    for volume in &record.volumes {
                        let _ = self
                            .run(vec!["volume".to_string(), "delete".to_string(), volume.clone()])
                            .await;
                    }
                }
                self.locks.delete(stack_name).await?;
            }
            None => {
                let _ = self.run(vec!["stop".to_string(), stack_name.to_string()]).await;
                let _ = self.run(vec!["delete".to_string(), stack_name.to_string()]).await;
            }
        }
        Ok(())
    }

    /// Every observed container keyed by name, used by the observer's poll
    /// loop — unlike `get_service_status_list`, not scoped to a stack.
    pub async fn get_all_container_statuses(&self) -> Result<BTreeMap<String, ContainerStatus>> {
        let containers = self.list_all_containers().await?;
        Ok(containers
            .iter()
            .filter_map(Self::container_status_of)
            .map(|status| (status.name.clone(), status))
            .collect())
    }

    /// `getServiceStatusList(stackName)`.
    pub async fn get_service_status_list(&self, stack_name: &str) -> Result<BTreeMap<String, ContainerStatus>> {
        let lock = self.locks.read(stack_name).await?;
        let containers = self.list_all_containers().await?;
        let statuses: Vec<ContainerStatus> = containers.iter().filter_map(Self::container_status_of).collect();
        let mut result = BTreeMap::new();

        match lock {
            Some(record) => {
                for (service_name, service_lock) in &record.services {
                    let found = statuses.iter().find(|s| s.name == service_lock.container_name);
                    let status = found.cloned().unwrap_or(ContainerStatus {
                        name: service_lock.container_name.clone(),
                        state: ContainerState::Unknown,
                        exit_code: None,
                        started_at: None,
                    });
                    result.insert(service_name.clone(), status);
                }
            }
            None => {
                for status in statuses {
                    let matches_stack_name = status.name == stack_name;
                    let matches_prefix = infer_stack_name(&status.name).as_deref() == Some(stack_name);
                    if matches_stack_name || matches_prefix {
                        result.insert(status.name.clone(), status);
                    }
                }
            }
        }
        Ok(result)
    }

    /// `getAllStackStatus()`.
    pub async fn get_all_stack_status(&self) -> Result<BTreeMap<String, StackStatus>> {
        let lock_names = self.locks.list_all().await?;
        let mut container_to_stack: BTreeMap<String, String> = BTreeMap::new();
        let mut lock_records = Vec::new();
        for name in &lock_names {
            if let Some(record) = self.locks.read(name).await? {
                for container in record.container_names() {
                    container_to_stack.insert(container, name.clone());
                }
                lock_records.push(name.clone());
            }
        }

        let containers = self.list_all_containers().await?;
        let mut states_by_stack: BTreeMap<String, Vec<ContainerState>> = BTreeMap::new();

        for record in &containers {
            let Some(status) = Self::container_status_of(record) else {
                continue;
            };
            let stack_name = container_to_stack
                .get(&status.name)
                .cloned()
                .or_else(|| infer_stack_name(&status.name))
                .unwrap_or_else(|| status.name.clone());
            if stack_name == RESERVED_STACK_NAME {
                continue;
            }
            states_by_stack.entry(stack_name).or_default().push(status.state);
        }

        let mut result: BTreeMap<String, StackStatus> = states_by_stack
            .into_iter()
            .map(|(stack, states)| (stack, rollup(&states)))
            .collect();

        for name in lock_records {
            if name != RESERVED_STACK_NAME {
                result.entry(name).or_insert(StackStatus::Unknown);
            }
        }

        Ok(result)
    }

    async fn list_images_raw(&self) -> Result<Vec<ImageRecord>> {
        let output = self
            .run(vec!["image".to_string(), "list".to_string(), "--format".to_string(), "json".to_string()])
            .await;
        if !output.success() {
            bail!("runtime unresponsive listing images: {}", output.stderr);
        }
        Ok(parse_json_or_jsonl(&output.stdout)
            .iter()
            .filter_map(|r| {
                let reference = field_str(r, &["reference", "name", "Name"])?;
                let digest = field_str(r, &["digest", "Digest"]);
                Some(ImageRecord {
                    reference: reference.to_lowercase(),
                    digest,
                    in_use_count: 0,
                })
            })
            .collect())
    }

    /// `getImageList`: attaches `inUseCount` by exact digest match or any
    /// normalised-reference candidate match against running containers.
    pub async fn get_image_list(&self) -> Result<Vec<ImageRecord>> {
        let mut images = self.list_images_raw().await?;
        let containers = self.list_all_containers().await?;
        let used_images: Vec<String> = containers
            .iter()
            .filter_map(|c| field_str(c, &["image", "Image"]))
            .collect();

        for image in &mut images {
            let candidates = build_candidates(&image.reference);
            image.in_use_count = used_images
                .iter()
                .filter(|used| {
                    let used_lower = used.to_lowercase();
                    candidates.contains(&used_lower)
                        || image.digest.as_deref().map(|d| d == used_lower).unwrap_or(false)
                })
                .count();
        }
        Ok(images)
    }

    /// `deleteImage(reference)`.
    pub async fn delete_image(&self, reference: &str) -> Result<()> {
        let images = self.get_image_list().await?;
        let candidates = build_candidates(reference);
        if let Some(image) = images.iter().find(|img| candidates.contains(&img.reference)) {
            if image.in_use_count > 0 {
                bail!("Image '{}' is in use by {} container(s)", reference, image.in_use_count);
            }
        }
        let output = self
            .run(vec!["image".to_string(), "delete".to_string(), reference.to_string()])
            .await;
        if !output.success() {
            bail!("Failed to delete image '{}': {}", reference, output.stderr);
        }
        Ok(())
    }

    /// `getNetworkList`.
    pub async fn get_network_list(&self) -> Result<BTreeSet<String>> {
        let output = self
            .run(vec!["network".to_string(), "list".to_string(), "--format".to_string(), "json".to_string()])
            .await;
        if !output.success() {
            bail!("runtime unresponsive listing networks: {}", output.stderr);
        }
        Ok(parse_json_or_jsonl(&output.stdout)
            .iter()
            .filter_map(|r| field_str(r, &["name", "Name"]))
            .collect())
    }

    /// Build the `logs` invocation's argument vector. Spawning and
    /// streaming the child's stdout is the transport layer's
    /// responsibility; the adapter only specifies the invocation.
    pub fn logs_args(&self, container: &str, tail: Option<u32>, follow: bool) -> Vec<String> {
        let mut args = vec!["logs".to_string()];
        if let Some(n) = tail {
            args.push("--tail".to_string());
            args.push(n.to_string());
        }
        if follow {
            args.push("--follow".to_string());
        }
        args.push(container.to_string());
        args
    }

    /// `exec` invocation description.
    pub fn exec_invocation(&self, container: &str, command: &str) -> ExecInvocation {
        let mut args = vec!["exec".to_string(), "-it".to_string(), container.to_string()];
        args.extend(command.split_whitespace().map(str::to_string));
        ExecInvocation {
            command: self.binary.clone(),
            args,
        }
    }
}
