use proptest::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Every crate that uses a dependency declared in the root
/// `[workspace.dependencies]` table must inherit it with `workspace = true`.
#[cfg(test)]
mod workspace_dependency_tests {
    use super::*;

    const MEMBERS: &[&str] = &["loopback-core", "loopback-agent", "workspace-tests"];

    fn workspace_dependencies() -> Vec<String> {
        let content = fs::read_to_string("../Cargo.toml").expect("root Cargo.toml is readable");
        let manifest: toml::Value = content.parse().expect("root Cargo.toml is valid TOML");
        manifest
            .get("workspace")
            .and_then(|w| w.get("dependencies"))
            .and_then(toml::Value::as_table)
            .map(|table| table.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Dependency name -> whether it inherits from the workspace, across
    /// normal, dev and build dependency tables
    fn crate_dependencies(content: &str) -> HashMap<String, bool> {
        let manifest: toml::Value = match content.parse() {
            Ok(manifest) => manifest,
            Err(_) => return HashMap::new(),
        };

        let mut dependencies = HashMap::new();
        for section in ["dependencies", "dev-dependencies", "build-dependencies"] {
            let Some(table) = manifest.get(section).and_then(toml::Value::as_table) else {
                continue;
            };
            for (name, spec) in table {
                let inherits = spec
                    .get("workspace")
                    .and_then(toml::Value::as_bool)
                    .unwrap_or(false);
                // A crate may list the same dependency twice; any plain
                // declaration counts as a violation
                let entry = dependencies.entry(name.clone()).or_insert(true);
                *entry = *entry && inherits;
            }
        }
        dependencies
    }

    proptest! {
        #[test]
        fn test_workspace_dependency_consistency(
            crate_name in prop::sample::select(MEMBERS.to_vec())
        ) {
            let cargo_toml_path = format!("../{}/Cargo.toml", crate_name);
            prop_assume!(Path::new(&cargo_toml_path).exists());

            let content = fs::read_to_string(&cargo_toml_path)
                .map_err(|e| TestCaseError::fail(format!("Failed to read {}: {}", cargo_toml_path, e)))?;

            let crate_deps = crate_dependencies(&content);
            for dep_name in workspace_dependencies() {
                if let Some(&uses_workspace) = crate_deps.get(&dep_name) {
                    prop_assert!(
                        uses_workspace,
                        "Crate '{}' uses dependency '{}' but does not inherit from workspace (missing 'workspace = true')",
                        crate_name,
                        dep_name
                    );
                }
            }
        }
    }

    #[test]
    fn test_members_match_root_manifest() {
        let content = fs::read_to_string("../Cargo.toml").unwrap();
        let manifest: toml::Value = content.parse().unwrap();
        let members: Vec<&str> = manifest["workspace"]["members"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(toml::Value::as_str)
            .collect();
        assert_eq!(members, MEMBERS);
    }

    #[test]
    fn test_dependency_parsing() {
        let good = r#"
[package]
name = "test-crate"

[dependencies]
tokio = { workspace = true }
serde = { workspace = true, features = ["derive"] }
"#;
        let parsed = crate_dependencies(good);
        assert_eq!(parsed.get("tokio"), Some(&true));
        assert_eq!(parsed.get("serde"), Some(&true));

        let bad = r#"
[dependencies]
tokio = "1.0"

[dev-dependencies]
serde = { workspace = true }
"#;
        let parsed = crate_dependencies(bad);
        assert_eq!(parsed.get("tokio"), Some(&false));
        assert_eq!(parsed.get("serde"), Some(&true));
    }
}
