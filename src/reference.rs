//! Canonicalise image references and build the candidate set used for
//! equality testing against runtime-reported image records.

/// True iff `reference` is never pulled from a remote registry.
pub fn is_local_only(reference: &str) -> bool {
    let r = reference.trim().to_lowercase();
    r.ends_with(":local") || r.starts_with("localhost/")
}

/// Build the ordered candidate set used for equality testing.
pub fn build_candidates(reference: &str) -> Vec<String> {
    let mut candidates = Vec::new();

    // 1. Lowercased, trimmed.
    let base = reference.trim().to_lowercase();
    push_unique(&mut candidates, base.clone());

    // 2. Strip `@<digest>` suffix.
    let without_digest = match base.find('@') {
        Some(idx) => base[..idx].to_string(),
        None => base.clone(),
    };
    push_unique(&mut candidates, without_digest.clone());

    // 3. Strip `docker.io/library/` prefix.
    const LIBRARY_PREFIX: &str = "docker.io/library/";
    if let Some(tail) = without_digest.strip_prefix(LIBRARY_PREFIX) {
        push_unique(&mut candidates, tail.to_string());
    }

    // 4. Strip `docker.io/` prefix.
    const REGISTRY_PREFIX: &str = "docker.io/";
    if let Some(tail) = without_digest.strip_prefix(REGISTRY_PREFIX) {
        push_unique(&mut candidates, tail.to_string());
    }

    // 5/6. Candidates derived from the digest-stripped tail's path shape.
    if !without_digest.contains('/') {
        // 5. No slash at all: also docker.io/library/<tail>.
        push_unique(
            &mut candidates,
            format!("{}{}", LIBRARY_PREFIX, without_digest),
        );
    } else {
        // 6. First path segment looks like a third-party host: also docker.io/<tail>.
        let first_segment = without_digest.split('/').next().unwrap_or("");
        let looks_like_host =
            first_segment.contains('.') || first_segment.contains(':') || first_segment == "localhost";
        if !looks_like_host {
            push_unique(
                &mut candidates,
                format!("{}{}", REGISTRY_PREFIX, without_digest),
            );
        }
    }

    candidates
}

fn push_unique(candidates: &mut Vec<String>, value: String) {
    if !candidates.contains(&value) {
        candidates.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_includes_library_prefixed_form() {
        let candidates = build_candidates("nginx");
        assert!(candidates.contains(&"nginx".to_string()));
        assert!(candidates.contains(&"docker.io/library/nginx".to_string()));
    }

    #[test]
    fn digest_suffix_is_stripped() {
        let candidates = build_candidates("nginx@sha256:abc");
        assert!(candidates.contains(&"nginx".to_string()));
        assert!(!candidates.iter().any(|c| c.contains('@')));
    }

    #[test]
    fn docker_io_library_prefix_yields_bare_tail() {
        let candidates = build_candidates("docker.io/library/redis");
        assert!(candidates.contains(&"redis".to_string()));
    }

    #[test]
    fn docker_io_prefix_yields_tail() {
        let candidates = build_candidates("docker.io/bitnami/redis");
        assert!(candidates.contains(&"bitnami/redis".to_string()));
    }

    #[test]
    fn third_party_path_gets_docker_io_candidate() {
        let candidates = build_candidates("bitnami/redis");
        assert!(candidates.contains(&"docker.io/bitnami/redis".to_string()));
    }

    #[test]
    fn host_qualified_path_does_not_get_docker_io_candidate() {
        let candidates = build_candidates("ghcr.io/org/app");
        assert!(!candidates.contains(&"docker.io/ghcr.io/org/app".to_string()));
    }

    #[test]
    fn port_qualified_host_is_not_rewritten() {
        let candidates = build_candidates("registry.local:5000/app");
        assert!(!candidates
            .contains(&"docker.io/registry.local:5000/app".to_string()));
    }

    #[test]
    fn localhost_reference_is_local_only() {
        assert!(is_local_only("localhost/app:latest"));
        assert!(build_candidates("localhost/app:local")
            .contains(&"localhost/app:local".to_string()));
    }

    #[test]
    fn local_tag_is_local_only() {
        assert!(is_local_only("app:local"));
        assert!(!is_local_only("app:latest"));
    }

    #[test]
    fn whitespace_and_case_are_normalised() {
        let candidates = build_candidates("  NGINX:Latest  ");
        assert!(candidates.contains(&"nginx:latest".to_string()));
    }
}
