//! Parses compose YAML, enforces the supported/blocked key policy,
//! normalises environment and dependency forms, and emits a `Plan`.

use crate::compose::plan::{CompileError, CompileResult, CompileWarning, Plan, ServicePlan};
use std::collections::BTreeSet;
use yaml_rust2::{yaml::Hash, Yaml, YamlLoader};

/// Service keys this engine understands and forwards to the runtime.
pub const SUPPORTED_SERVICE_KEYS: &[&str] = &[
    "image",
    "command",
    "entrypoint",
    "environment",
    "env_file",
    "ports",
    "volumes",
    "networks",
    "working_dir",
    "user",
    "depends_on",
    "container_name",
    "stdin_open",
    "tty",
    "restart",
];

/// Service keys that make the plan undeployable.
pub const BLOCKED_SERVICE_KEYS: &[&str] = &[
    "deploy",
    "profiles",
    "secrets",
    "configs",
    "healthcheck",
    "build",
    "cap_add",
    "cap_drop",
    "cgroup_parent",
    "devices",
    "dns",
    "dns_search",
    "domainname",
    "external_links",
    "extra_hosts",
    "init",
    "ipc",
    "isolation",
    "labels",
    "links",
    "logging",
    "network_mode",
    "pid",
    "platform",
    "privileged",
    "read_only",
    "security_opt",
    "shm_size",
    "sysctls",
    "tmpfs",
    "ulimits",
    "userns_mode",
];

/// Top-level compose keys this engine understands.
pub const SUPPORTED_TOP_LEVEL_KEYS: &[&str] = &["services", "networks", "volumes", "version", "name"];

/// Compile raw compose YAML text into a `CompileResult` for `stack_name`.
/// Pure: repeated calls with the same input return equal results.
pub fn compile(yaml_text: &str, stack_name: &str) -> CompileResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut plan = Plan {
        stack_name: stack_name.to_string(),
        ..Default::default()
    };

    // Rule 1: empty/whitespace-only input.
    if yaml_text.trim().is_empty() {
        errors.push(err("", "", "Empty compose file"));
        return CompileResult { plan, errors, warnings };
    }

    // Rule 2: parse as YAML.
    let docs = match YamlLoader::load_from_str(yaml_text) {
        Ok(docs) => docs,
        Err(e) => {
            errors.push(err("", "", &e.to_string()));
            return CompileResult { plan, errors, warnings };
        }
    };
    let root = docs.into_iter().next().unwrap_or(Yaml::Null);

    // Rule 3: root must be a mapping.
    let root_hash = match root {
        Yaml::Hash(h) => h,
        _ => {
            errors.push(err("", "", "Invalid compose file: not an object"));
            return CompileResult { plan, errors, warnings };
        }
    };

    // Rule 4: reject unknown top-level keys.
    for (key, _) in root_hash.iter() {
        if let Some(key) = as_str(key) {
            if !SUPPORTED_TOP_LEVEL_KEYS.contains(&key.as_str()) {
                errors.push(err(&key, &key, &format!("Unknown top-level key '{}'", key)));
            }
        }
    }

    // Rule 5: services must exist and be a mapping.
    let services_hash = match hash_get(&root_hash, "services") {
        Some(Yaml::Hash(h)) => h.clone(),
        _ => {
            errors.push(err("services", "services", "No services defined"));
            return finish(plan, &root_hash, errors, warnings);
        }
    };

    for (svc_key, svc_value) in services_hash.iter() {
        let Some(svc_name) = as_str(svc_key) else {
            continue;
        };
        let svc_path = format!("services.{}", svc_name);

        let svc_hash = match svc_value {
            Yaml::Hash(h) => h,
            _ => {
                errors.push(err(&svc_name, &svc_path, "Service definition must be a mapping"));
                continue;
            }
        };

        // Rule 6: blocked / unsupported keys.
        for (k, _) in svc_hash.iter() {
            let Some(k) = as_str(k) else { continue };
            let key_path = format!("{}.{}", svc_path, k);
            if BLOCKED_SERVICE_KEYS.contains(&k.as_str()) {
                errors.push(err(
                    &k,
                    &key_path,
                    &format!("'{}' is not supported by the target runtime", k),
                ));
            } else if !SUPPORTED_SERVICE_KEYS.contains(&k.as_str()) {
                warnings.push(warn(&k, &key_path, &format!("Unknown key '{}' ignored", k)));
            }
        }

        // Rule 7: image required and truthy.
        let image = hash_get(svc_hash, "image").and_then(as_str).unwrap_or_default();
        if image.trim().is_empty() {
            errors.push(err("image", &format!("{}.image", svc_path), "image is required"));
            continue;
        }

        // Rule 8: restart is parsed but not enforced.
        if hash_get(svc_hash, "restart").is_some() {
            warnings.push(warn(
                "restart",
                &format!("{}.restart", svc_path),
                "restart is parsed but not enforced",
            ));
        }

        let mut service = ServicePlan {
            image,
            ..Default::default()
        };

        // Rule 9: normalise environment.
        if let Some(env_value) = hash_get(svc_hash, "environment") {
            service.environment = normalise_environment(env_value);
        }

        // Rule 10: normalise depends_on.
        if let Some(dep_value) = hash_get(svc_hash, "depends_on") {
            let (deps, cond_warning) = normalise_depends_on(dep_value);
            service.depends_on = deps;
            if cond_warning {
                warnings.push(warn(
                    "depends_on",
                    &format!("{}.depends_on", svc_path),
                    "depends_on conditions are ignored",
                ));
            }
        }

        // Rule 11: scalar and sequence fields.
        service.command = hash_get(svc_hash, "command").and_then(as_str);
        service.working_dir = hash_get(svc_hash, "working_dir").and_then(as_str);
        service.user = hash_get(svc_hash, "user").and_then(as_str);
        service.ports = hash_get(svc_hash, "ports").map(stringify_sequence).unwrap_or_default();
        service.volumes = hash_get(svc_hash, "volumes").map(stringify_sequence).unwrap_or_default();
        service.networks = hash_get(svc_hash, "networks").map(stringify_sequence).unwrap_or_default();

        plan.services.insert(svc_name, service);
    }

    finish(plan, &root_hash, errors, warnings)
}

/// Rule 12: surface top-level `networks`/`volumes` key lists, then return.
fn finish(
    mut plan: Plan,
    root_hash: &Hash,
    errors: Vec<CompileError>,
    warnings: Vec<CompileWarning>,
) -> CompileResult {
    plan.networks = hash_get(root_hash, "networks").and_then(object_key_set);
    plan.volumes = hash_get(root_hash, "volumes").and_then(object_key_set);
    CompileResult { plan, errors, warnings }
}

/// Validate-only entry point: same diagnostics as `compile`, discarding the
/// plan.
pub fn validate(yaml_text: &str, stack_name: &str) -> (Vec<CompileError>, Vec<CompileWarning>) {
    let result = compile(yaml_text, stack_name);
    (result.errors, result.warnings)
}

fn object_key_set(value: &Yaml) -> Option<BTreeSet<String>> {
    match value {
        Yaml::Hash(h) => Some(h.iter().filter_map(|(k, _)| as_str(k)).collect()),
        _ => None,
    }
}

fn normalise_environment(value: &Yaml) -> Vec<(String, String)> {
    match value {
        Yaml::Hash(h) => h
            .iter()
            .filter_map(|(k, v)| {
                let key = as_str(k)?;
                let value = if matches!(v, Yaml::Null) {
                    String::new()
                } else {
                    as_str(v).unwrap_or_default()
                };
                Some((key, value))
            })
            .collect(),
        Yaml::Array(arr) => arr
            .iter()
            .filter_map(as_str)
            .map(|item| match item.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (item, String::new()),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Returns `(service names, true if mapping form with ignored conditions)`.
fn normalise_depends_on(value: &Yaml) -> (Vec<String>, bool) {
    match value {
        Yaml::Array(arr) => (arr.iter().filter_map(as_str).collect(), false),
        Yaml::Hash(h) => (h.iter().filter_map(|(k, _)| as_str(k)).collect(), true),
        _ => (Vec::new(), false),
    }
}

fn stringify_sequence(value: &Yaml) -> Vec<String> {
    match value {
        Yaml::Array(arr) => arr.iter().filter_map(as_str).collect(),
        _ => Vec::new(),
    }
}

fn hash_get<'a>(hash: &'a Hash, key: &str) -> Option<&'a Yaml> {
    hash.iter()
        .find(|(k, _)| as_str(k).as_deref() == Some(key))
        .map(|(_, v)| v)
}

/// Render a scalar `Yaml` value as a string (rule 11's "stringified").
fn as_str(value: &Yaml) -> Option<String> {
    match value {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Integer(i) => Some(i.to_string()),
        Yaml::Real(r) => Some(r.clone()),
        Yaml::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

fn err(key: &str, path: &str, message: &str) -> CompileError {
    CompileError {
        key: key.to_string(),
        path: path.to_string(),
        message: message.to_string(),
    }
}

fn warn(key: &str, path: &str, message: &str) -> CompileWarning {
    CompileWarning {
        key: key.to_string(),
        path: path.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_single_error() {
        let result = compile("", "stack");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].message, "Empty compose file");
    }

    #[test]
    fn whitespace_only_input_is_single_error() {
        let result = compile("   \n\t \n", "stack");
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn invalid_yaml_surfaces_parser_message() {
        let result = compile("services: [unterminated", "stack");
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn non_mapping_root_is_rejected() {
        let result = compile("- just\n- a\n- list\n", "stack");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].message, "Invalid compose file: not an object");
    }

    #[test]
    fn unknown_top_level_key_is_error() {
        let yaml = "services:\n  web:\n    image: nginx\nbogus: 1\n";
        let result = compile(yaml, "stack");
        assert!(result
            .errors
            .iter()
            .any(|e| e.message.contains("Unknown top-level key 'bogus'")));
    }

    #[test]
    fn missing_services_is_error() {
        let result = compile("version: '3'\n", "stack");
        assert!(result.errors.iter().any(|e| e.message == "No services defined"));
    }

    #[test]
    fn blocked_key_produces_error_with_exact_path() {
        let yaml = "services:\n  web:\n    image: nginx:latest\n    deploy:\n      replicas: 3\n";
        let result = compile(yaml, "stack");
        assert!(result
            .errors
            .iter()
            .any(|e| e.path == "services.web.deploy"));
    }

    #[test]
    fn unsupported_key_produces_warning_not_error() {
        let yaml = "services:\n  web:\n    image: nginx\n    totally_made_up: true\n";
        let result = compile(yaml, "stack");
        assert!(result.errors.is_empty());
        assert!(result
            .warnings
            .iter()
            .any(|w| w.path == "services.web.totally_made_up"));
    }

    #[test]
    fn missing_image_is_error_and_skips_service() {
        let yaml = "services:\n  web:\n    ports:\n      - \"80:80\"\n";
        let result = compile(yaml, "stack");
        assert!(result.errors.iter().any(|e| e.path == "services.web.image"));
        assert!(!result.plan.services.contains_key("web"));
    }

    #[test]
    fn restart_is_warning_not_error() {
        let yaml = "services:\n  web:\n    image: nginx\n    restart: always\n";
        let result = compile(yaml, "stack");
        assert!(result.errors.is_empty());
        assert!(result.warnings.iter().any(|w| w.path == "services.web.restart"));
    }

    #[test]
    fn environment_mapping_form_with_null_becomes_empty_string() {
        let yaml = "services:\n  web:\n    image: nginx\n    environment:\n      FOO: bar\n      BAR:\n";
        let result = compile(yaml, "stack");
        let env = &result.plan.services["web"].environment;
        assert!(env.contains(&("FOO".to_string(), "bar".to_string())));
        assert!(env.contains(&("BAR".to_string(), "".to_string())));
    }

    #[test]
    fn environment_sequence_form_splits_on_first_equals() {
        let yaml = "services:\n  web:\n    image: nginx\n    environment:\n      - FOO=bar=baz\n      - NOVALUE\n";
        let result = compile(yaml, "stack");
        let env = &result.plan.services["web"].environment;
        assert!(env.contains(&("FOO".to_string(), "bar=baz".to_string())));
        assert!(env.contains(&("NOVALUE".to_string(), "".to_string())));
    }

    #[test]
    fn depends_on_sequence_form_is_list_as_is() {
        let yaml = "services:\n  web:\n    image: nginx\n    depends_on:\n      - db\n      - cache\n";
        let result = compile(yaml, "stack");
        assert_eq!(result.plan.services["web"].depends_on, vec!["db", "cache"]);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn depends_on_mapping_form_warns_conditions_ignored() {
        let yaml = "services:\n  web:\n    image: nginx\n    depends_on:\n      db:\n        condition: service_healthy\n";
        let result = compile(yaml, "stack");
        assert_eq!(result.plan.services["web"].depends_on, vec!["db"]);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.message.contains("conditions are ignored")));
    }

    #[test]
    fn ports_volumes_networks_are_stringified_sequences() {
        let yaml = "services:\n  web:\n    image: nginx\n    ports:\n      - \"8080:80\"\n    volumes:\n      - data:/data\n    networks:\n      - front\n";
        let result = compile(yaml, "stack");
        let svc = &result.plan.services["web"];
        assert_eq!(svc.ports, vec!["8080:80"]);
        assert_eq!(svc.volumes, vec!["data:/data"]);
        assert_eq!(svc.networks, vec!["front"]);
    }

    #[test]
    fn top_level_object_networks_and_volumes_surface_key_list() {
        let yaml = "services:\n  web:\n    image: nginx\nnetworks:\n  front: {}\n  back: {}\nvolumes:\n  data: {}\n";
        let result = compile(yaml, "stack");
        assert_eq!(
            result.plan.networks,
            Some(BTreeSet::from(["front".to_string(), "back".to_string()]))
        );
        assert_eq!(result.plan.volumes, Some(BTreeSet::from(["data".to_string()])));
    }

    #[test]
    fn plan_is_still_returned_when_errors_are_present() {
        let yaml = "services:\n  web:\n    image: nginx\n    deploy: {}\n  api:\n    image: api:latest\n";
        let result = compile(yaml, "stack");
        assert!(!result.errors.is_empty());
        assert!(result.plan.services.contains_key("web"));
        assert!(result.plan.services.contains_key("api"));
    }

    #[test]
    fn compile_is_deterministic() {
        let yaml = "services:\n  web:\n    image: nginx:latest\n    environment:\n      - FOO=bar\n";
        let a = compile(yaml, "stack");
        let b = compile(yaml, "stack");
        assert_eq!(a, b);
    }

    #[test]
    fn every_blocked_key_produces_an_error_at_its_path() {
        for key in BLOCKED_SERVICE_KEYS {
            let yaml = format!(
                "services:\n  svc:\n    image: nginx\n    {}: {{}}\n",
                key
            );
            let result = compile(&yaml, "stack");
            let expected_path = format!("services.svc.{}", key);
            assert!(
                result.errors.iter().any(|e| e.path == expected_path),
                "missing error for blocked key {}",
                key
            );
        }
    }

    #[test]
    fn validate_returns_only_diagnostics() {
        let yaml = "services:\n  web:\n    image: nginx\n    deploy: {}\n";
        let (errors, _warnings) = validate(yaml, "stack");
        assert!(!errors.is_empty());
    }
}
