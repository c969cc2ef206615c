//! Pipeline configuration file.

use std::collections::HashMap;
use std::path::Path;

use dirsync_connector_ldap::LdapConfig;
use dirsync_connector_sql::SqlConfig;
use dirsync_core::ActionSettings;
use dirsync_replay::ReplayConfig;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, CliResult};

/// A full pipeline: named SQL connections plus a forest of steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// SQL connection strings by name.
    #[serde(default)]
    pub connections: HashMap<String, String>,

    pub actions: Vec<ActionNodeConfig>,
}

/// One configured step and the steps that run after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionNodeConfig {
    #[serde(flatten)]
    pub settings: ActionSettings,

    #[serde(flatten)]
    pub kind: ActionKind,

    /// Child steps, run after this one with its settings as parent.
    #[serde(default)]
    pub actions: Vec<ActionNodeConfig>,
}

/// What a step does.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    Ldap(LdapConfig),
    Sql(SqlConfig),
    ProfileReplay(ReplayConfig),
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Ldap(_) => "ldap",
            ActionKind::Sql(_) => "sql",
            ActionKind::ProfileReplay(_) => "profile_replay",
        }
    }
}

impl PipelineConfig {
    /// Read and check a YAML pipeline file.
    pub fn load(path: &Path) -> CliResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&text)
            .map_err(|e| CliError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that need the whole file.
    ///
    /// Per-step checks run when the step is built.
    pub fn validate(&self) -> CliResult<()> {
        if self.actions.is_empty() {
            return Err(CliError::Config("no actions configured".into()));
        }
        self.validate_nodes(&self.actions, None)
    }

    fn validate_nodes(
        &self,
        nodes: &[ActionNodeConfig],
        parent: Option<&ActionNodeConfig>,
    ) -> CliResult<()> {
        for node in nodes {
            match &node.kind {
                ActionKind::Sql(sql) if !self.connections.contains_key(&sql.connection_name) => {
                    return Err(CliError::Config(format!(
                        "sql step references unknown connection '{}'",
                        sql.connection_name
                    )));
                }
                ActionKind::ProfileReplay(_) => {
                    let inherited = parent.is_some_and(|p| !p.settings.properties.is_empty());
                    if node.settings.properties.is_empty() && !inherited {
                        return Err(CliError::Config(
                            "profile_replay step needs properties or a parent step with properties"
                                .into(),
                        ));
                    }
                }
                _ => {}
            }
            self.validate_nodes(&node.actions, Some(node))?;
        }
        Ok(())
    }

    /// Number of steps in the whole tree.
    pub fn step_count(&self) -> usize {
        fn count(nodes: &[ActionNodeConfig]) -> usize {
            nodes.iter().map(|n| 1 + count(&n.actions)).sum()
        }
        count(&self.actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirsync_core::Transform;

    const PIPELINE: &str = r#"
connections:
  Main: postgres://sync@db/identity
actions:
  - type: ldap
    directory_location: staging/ldap
    host: dc01.contoso.com
    search_root: DC=contoso,DC=com
    service_login: svc-sync
    upn_suffix: contoso.com
    batch_action: delta
    page_size: 500
    properties:
      - { index: 0, name: AccountName, mapping: sAMAccountName }
      - { index: 1, name: WorkEmail, mapping: mail, transform: { type: changed_value } }
    actions:
      - type: profile_replay
        directory_location: staging/ldap
        sleep_period_secs: 5
  - type: sql
    stored_procedure: hr.get_users
    upn_suffix: contoso.com
    parameters: [active]
    properties:
      - { index: 0, name: AccountName, mapping: login }
"#;

    #[test]
    fn test_parse_pipeline() {
        let config: PipelineConfig = serde_yaml::from_str(PIPELINE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.step_count(), 3);

        let ldap = &config.actions[0];
        assert_eq!(ldap.settings.directory_location, Path::new("staging/ldap"));
        assert_eq!(ldap.settings.properties.len(), 2);
        assert_eq!(
            ldap.settings.properties.get(1).unwrap().transform,
            Transform::ChangedValue
        );
        match &ldap.kind {
            ActionKind::Ldap(c) => {
                assert_eq!(c.host, "dc01.contoso.com");
                assert_eq!(c.port, 389);
                assert_eq!(c.page_size, 500);
                assert_eq!(c.batch_action, "delta");
                assert_eq!(c.service_login.as_deref(), Some("svc-sync"));
            }
            other => panic!("unexpected kind {}", other.label()),
        }

        let replay = &ldap.actions[0];
        assert!(replay.settings.properties.is_empty());
        match &replay.kind {
            ActionKind::ProfileReplay(c) => {
                assert_eq!(c.sleep_period_secs, 5);
                assert!(!c.keep);
            }
            other => panic!("unexpected kind {}", other.label()),
        }

        let sql = &config.actions[1];
        assert_eq!(sql.settings.directory_location, Path::new("Input"));
        match &sql.kind {
            ActionKind::Sql(c) => {
                assert_eq!(c.connection_name, "Main");
                assert_eq!(c.parameters, vec!["active"]);
                assert_eq!(c.page_size, 100);
            }
            other => panic!("unexpected kind {}", other.label()),
        }
    }

    #[test]
    fn test_unknown_connection_rejected() {
        let mut config: PipelineConfig = serde_yaml::from_str(PIPELINE).unwrap();
        config.connections.clear();
        let err = config.validate().unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().contains("Main"));
    }

    #[test]
    fn test_orphan_replay_without_properties_rejected() {
        let config: PipelineConfig = serde_yaml::from_str(
            r#"
actions:
  - type: profile_replay
"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(CliError::Config(_))));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result: Result<PipelineConfig, _> = serde_yaml::from_str(
            r#"
actions:
  - type: csv_import
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = PipelineConfig::load(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, CliError::Io { .. }));
    }
}
