//! Parses `.env` text into a variable map and applies `${VAR}`/`$VAR`
//! substitution to the raw compose text before compilation — the
//! substitution targets the text, not a parsed YAML tree.

use std::collections::HashMap;

use regex::Regex;

fn var_ref_regex() -> Regex {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").expect("static regex is valid")
}

/// Parse `.env`-style text (`KEY=VALUE` lines, `#` comments, blank lines
/// ignored) into a variable map. Lines without `=` are skipped.
pub fn parse_env_text(text: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            let value = value.trim().trim_matches('"').trim_matches('\'');
            vars.insert(key.to_string(), value.to_string());
        }
    }
    vars
}

/// Substitute `${VAR}`/`$VAR` occurrences in `s` using `variables`.
/// Undefined variables expand to the empty string: every referenced name
/// absent from `variables` is seeded with `""` before handing the map to
/// the `envsubst` crate, which otherwise leaves unknown references
/// untouched.
pub fn substitute(s: &str, variables: &HashMap<String, String>) -> String {
    let mut vars = variables.clone();
    let var_ref = var_ref_regex();
    for captures in var_ref.captures_iter(s) {
        let name = captures
            .get(1)
            .or_else(|| captures.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        vars.entry(name.to_string()).or_insert_with(String::new);
    }
    envsubst::substitute(s, &vars).unwrap_or_else(|_| s.to_string())
}

/// Apply substitution to raw compose YAML text using the parsed `.env`
/// text.
pub fn substitute_compose_text(yaml_text: &str, env_text: &str) -> String {
    let vars = parse_env_text(env_text);
    substitute(yaml_text, &vars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_key_value_lines() {
        let vars = parse_env_text("NAME=World\nVERSION=1.0.0\n");
        assert_eq!(vars.get("NAME"), Some(&"World".to_string()));
        assert_eq!(vars.get("VERSION"), Some(&"1.0.0".to_string()));
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let vars = parse_env_text("# comment\n\nNAME=World\n");
        assert_eq!(vars.len(), 1);
        assert_eq!(vars.get("NAME"), Some(&"World".to_string()));
    }

    #[test]
    fn strips_surrounding_quotes() {
        let vars = parse_env_text("NAME=\"World\"\nOTHER='value'\n");
        assert_eq!(vars.get("NAME"), Some(&"World".to_string()));
        assert_eq!(vars.get("OTHER"), Some(&"value".to_string()));
    }

    #[test]
    fn substitute_replaces_braced_variable() {
        let mut vars = HashMap::new();
        vars.insert("NAME".to_string(), "World".to_string());
        assert_eq!(substitute("Hello ${NAME}", &vars), "Hello World");
    }

    #[test]
    fn substitute_undefined_variable_expands_to_empty_string() {
        let vars = HashMap::new();
        let result = substitute("Hello ${NAME}!", &vars);
        assert_eq!(result, "Hello !");
    }

    #[test]
    fn substitute_undefined_bare_variable_expands_to_empty_string() {
        let vars = HashMap::new();
        let result = substitute("prefix-$NAME-suffix", &vars);
        assert_eq!(result, "prefix--suffix");
    }

    #[test]
    fn substitute_compose_text_applies_env_file_values() {
        let yaml = "services:\n  web:\n    image: nginx:${VERSION}\n";
        let env = "VERSION=1.25\n";
        let result = substitute_compose_text(yaml, env);
        assert!(result.contains("nginx:1.25"));
    }

    #[test]
    fn substitute_compose_text_with_undefined_var_resolves_to_empty_string() {
        let yaml = "services:\n  web:\n    image: nginx:${VERSION}\n";
        let result = substitute_compose_text(yaml, "");
        assert!(result.contains("image: nginx:\n"));
    }
}
