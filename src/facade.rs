//! Request-validated entry points consumed by the (out-of-scope) transport
//! layer: each method validates its arguments, calls into the stack engine
//! or runtime adapter, and returns a `BaseRes` envelope.

use std::sync::Arc;

use crate::compose;
use crate::error::{preflight_message, EngineError};
use crate::runtime::RuntimeAdapter;
use crate::stack::StackEngine;
use crate::types::BaseRes;

pub struct Facade {
    engine: Arc<StackEngine>,
    adapter: Arc<RuntimeAdapter>,
}

fn require_non_empty(value: &str, field: &str) -> Result<(), BaseRes> {
    if value.trim().is_empty() {
        return Err(BaseRes::error(format!("'{}' must not be empty", field)));
    }
    Ok(())
}

impl Facade {
    pub fn new(engine: Arc<StackEngine>, adapter: Arc<RuntimeAdapter>) -> Self {
        Self { engine, adapter }
    }

    pub async fn deploy_stack(&self, name: &str) -> BaseRes {
        if let Err(res) = require_non_empty(name, "name") {
            return res;
        }
        match self.engine.deploy(name).await {
            Ok(()) => BaseRes::ok(),
            Err(e) => BaseRes::error(EngineError::classify(&e).message()),
        }
    }

    pub async fn save_stack(&self, name: &str, is_add: bool, yaml_text: &str, env_text: &str) -> BaseRes {
        if let Err(res) = require_non_empty(name, "name") {
            return res;
        }
        match self.engine.save(name, is_add, yaml_text, env_text).await {
            Ok(()) => BaseRes::ok(),
            Err(e) => BaseRes::error(EngineError::classify(&e).message()),
        }
    }

    pub async fn delete_stack(&self, name: &str) -> BaseRes {
        if let Err(res) = require_non_empty(name, "name") {
            return res;
        }
        match self.engine.delete(name).await {
            Ok(()) => BaseRes::ok(),
            Err(e) => BaseRes::error(EngineError::classify(&e).message()),
        }
    }

    pub async fn get_stack(&self, name: &str, endpoint: &str) -> BaseRes {
        if let Err(res) = require_non_empty(name, "name") {
            return res;
        }
        match self.engine.to_json(name, endpoint).await {
            Ok(json) => BaseRes::ok_with_data(json),
            Err(e) => BaseRes::error(EngineError::classify(&e).message()),
        }
    }

    pub async fn request_stack_list(&self) -> BaseRes {
        match self.engine.get_stack_list().await {
            Ok(list) => {
                let names: Vec<&String> = list.keys().collect();
                BaseRes::ok_with_data(names)
            }
            Err(e) => BaseRes::error(EngineError::classify(&e).message()),
        }
    }

    pub async fn start_stack(&self, name: &str) -> BaseRes {
        if let Err(res) = require_non_empty(name, "name") {
            return res;
        }
        match self.engine.start(name).await {
            Ok(()) => BaseRes::ok(),
            Err(e) => BaseRes::error(EngineError::classify(&e).message()),
        }
    }

    pub async fn stop_stack(&self, name: &str) -> BaseRes {
        if let Err(res) = require_non_empty(name, "name") {
            return res;
        }
        match self.engine.stop(name).await {
            Ok(()) => BaseRes::ok(),
            Err(e) => BaseRes::error(EngineError::classify(&e).message()),
        }
    }

    pub async fn restart_stack(&self, name: &str) -> BaseRes {
        if let Err(res) = require_non_empty(name, "name") {
            return res;
        }
        match self.engine.restart(name).await {
            Ok(()) => BaseRes::ok(),
            Err(e) => BaseRes::error(EngineError::classify(&e).message()),
        }
    }

    pub async fn update_stack(&self, name: &str) -> BaseRes {
        if let Err(res) = require_non_empty(name, "name") {
            return res;
        }
        match self.engine.update(name).await {
            Ok(()) => BaseRes::ok(),
            Err(e) => BaseRes::error(EngineError::classify(&e).message()),
        }
    }

    pub async fn down_stack(&self, name: &str, remove_volumes: bool) -> BaseRes {
        if let Err(res) = require_non_empty(name, "name") {
            return res;
        }
        match self.engine.down(name, remove_volumes).await {
            Ok(()) => BaseRes::ok(),
            Err(e) => BaseRes::error(EngineError::classify(&e).message()),
        }
    }

    pub async fn service_status_list(&self, name: &str) -> BaseRes {
        if let Err(res) = require_non_empty(name, "name") {
            return res;
        }
        match self.adapter.get_service_status_list(name).await {
            Ok(statuses) => {
                let as_map: std::collections::BTreeMap<_, _> = statuses
                    .into_iter()
                    .map(|(k, v)| {
                        (
                            k,
                            serde_json::json!({
                                "name": v.name,
                                "state": v.state,
                                "exitCode": v.exit_code,
                                "startedAt": v.started_at,
                            }),
                        )
                    })
                    .collect();
                BaseRes::ok_with_data(as_map)
            }
            Err(e) => BaseRes::error(EngineError::classify(&e).message()),
        }
    }

    pub async fn get_docker_network_list(&self) -> BaseRes {
        match self.adapter.get_network_list().await {
            Ok(networks) => BaseRes::ok_with_data(networks),
            Err(e) => BaseRes::error(EngineError::classify(&e).message()),
        }
    }

    pub async fn get_container_image_list(&self) -> BaseRes {
        match self.adapter.get_image_list().await {
            Ok(images) => {
                let as_json: Vec<_> = images
                    .into_iter()
                    .map(|img| {
                        serde_json::json!({
                            "reference": img.reference,
                            "digest": img.digest,
                            "inUseCount": img.in_use_count,
                        })
                    })
                    .collect();
                BaseRes::ok_with_data(as_json)
            }
            Err(e) => BaseRes::error(EngineError::classify(&e).message()),
        }
    }

    pub async fn delete_container_image(&self, reference: &str) -> BaseRes {
        if let Err(res) = require_non_empty(reference, "reference") {
            return res;
        }
        match self.adapter.delete_image(reference).await {
            Ok(()) => BaseRes::ok(),
            Err(e) => BaseRes::error(EngineError::classify(&e).message()),
        }
    }

    /// `checkComposeCompat`: invokes the compiler's validate-only entry
    /// point.
    pub async fn check_compose_compat(&self, yaml_text: &str) -> BaseRes {
        let (errors, warnings) = compose::validate(yaml_text, "");
        if errors.is_empty() {
            BaseRes::ok_with_data(serde_json::json!({ "warnings": warnings }))
        } else {
            BaseRes::error(preflight_message(&errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::lock_store::LockStore;
    use crate::runtime::FakeRuntimeDriver;
    use tempfile::tempdir;

    fn test_facade(data_dir: &std::path::Path, stacks_dir: &std::path::Path, driver: FakeRuntimeDriver) -> Facade {
        let config = Arc::new(EngineConfig {
            data_dir: data_dir.to_path_buf(),
            stacks_dir: stacks_dir.to_path_buf(),
            runtime_binary: "container".to_string(),
            poll_interval_secs: 5,
        });
        let locks = Arc::new(LockStore::new(config.locks_dir()));
        let adapter = Arc::new(RuntimeAdapter::new(Arc::new(driver), locks.clone(), "container"));
        let engine = Arc::new(StackEngine::new(config, adapter.clone(), locks));
        Facade::new(engine, adapter)
    }

    #[tokio::test]
    async fn deploy_stack_rejects_empty_name() {
        let data = tempdir().unwrap();
        let stacks = tempdir().unwrap();
        let facade = test_facade(data.path(), stacks.path(), FakeRuntimeDriver::new());
        let res = facade.deploy_stack("").await;
        assert!(!res.ok);
    }

    #[tokio::test]
    async fn save_then_deploy_then_get_stack_round_trips() {
        let data = tempdir().unwrap();
        let stacks = tempdir().unwrap();
        let driver = FakeRuntimeDriver::new();
        driver.record(&["image", "pull", "nginx:latest"], "", "", 0);
        driver.record(
            &["run", "-d", "--name", "dockgeac_e2e-test_web_1", "nginx:latest"],
            "",
            "",
            0,
        );
        driver.record(&["list", "--all", "--format", "json"], "[]", "", 0);
        let facade = test_facade(data.path(), stacks.path(), driver);

        let save_res = facade
            .save_stack("e2e-test", true, "services:\n  web:\n    image: nginx:latest\n", "")
            .await;
        assert!(save_res.ok);

        let deploy_res = facade.deploy_stack("e2e-test").await;
        assert!(deploy_res.ok, "{:?}", deploy_res.msg);

        let get_res = facade.get_stack("e2e-test", "").await;
        assert!(get_res.ok);
    }

    #[tokio::test]
    async fn check_compose_compat_surfaces_blocked_key_message() {
        let data = tempdir().unwrap();
        let stacks = tempdir().unwrap();
        let facade = test_facade(data.path(), stacks.path(), FakeRuntimeDriver::new());
        let yaml = "services:\n  web:\n    image: nginx:latest\n    deploy:\n      replicas: 3\n";
        let res = facade.check_compose_compat(yaml).await;
        assert!(!res.ok);
        assert!(res.msg.unwrap().contains("services.web.deploy"));
    }

    #[tokio::test]
    async fn check_compose_compat_ok_with_warnings_for_clean_input() {
        let data = tempdir().unwrap();
        let stacks = tempdir().unwrap();
        let facade = test_facade(data.path(), stacks.path(), FakeRuntimeDriver::new());
        let res = facade.check_compose_compat("services:\n  web:\n    image: nginx:latest\n").await;
        assert!(res.ok);
    }

    #[tokio::test]
    async fn delete_container_image_rejects_empty_reference() {
        let data = tempdir().unwrap();
        let stacks = tempdir().unwrap();
        let facade = test_facade(data.path(), stacks.path(), FakeRuntimeDriver::new());
        let res = facade.delete_container_image("").await;
        assert!(!res.ok);
    }
}
