use crate::artifact::Pattern;
use crate::error::{Result, WfmailError};
use crate::panel::DecisionModel;
use crate::paths;
use crate::template;
use crate::types::{Address, EventType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// RoleConfig
// ---------------------------------------------------------------------------

/// What a role's inbox is expected to contain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Event types this role acts on. Empty means all of them.
    #[serde(default)]
    pub event_types: Vec<EventType>,
    /// How far back `pending` looks.
    #[serde(default = "default_catchup_days")]
    pub catchup_days: u32,
    /// Artifacts the role should re-read when catching up.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catchup_artifacts: Vec<String>,
}

/// Longest catch-up window `validate` accepts, in days (about ten years).
pub const MAX_CATCHUP_DAYS: u32 = 3650;

fn default_catchup_days() -> u32 {
    7
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            event_types: Vec::new(),
            catchup_days: default_catchup_days(),
            catchup_artifacts: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// PanelConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelConfig {
    /// The first member is the primary under `primary-decides`.
    pub members: Vec<String>,
    #[serde(default)]
    pub decision_model: DecisionModel,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default)]
    pub roles: BTreeMap<String, RoleConfig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub panels: BTreeMap<String, PanelConfig>,
    /// Body template overrides keyed by event type.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub templates: BTreeMap<String, String>,
}

fn default_version() -> u32 {
    1
}

fn default_domain() -> String {
    paths::DEFAULT_DOMAIN.to_string()
}

fn role(event_types: &[EventType], catchup_artifacts: &[&str]) -> RoleConfig {
    RoleConfig {
        event_types: event_types.to_vec(),
        catchup_days: default_catchup_days(),
        catchup_artifacts: catchup_artifacts.iter().map(|s| s.to_string()).collect(),
    }
}

fn default_roles() -> BTreeMap<String, RoleConfig> {
    use EventType::*;
    let mut m = BTreeMap::new();
    m.insert(
        "spec-reviewer".to_string(),
        role(&[ReviewRequest], &["specs/proposed/*.md", "specs/doing/*.md"]),
    );
    m.insert(
        "spec-writer".to_string(),
        role(
            &[Approval, Rejection, ClarificationRequest],
            &["planning/ROADMAP.md", "specs/proposed/*.md"],
        ),
    );
    m.insert(
        "skeleton-reviewer".to_string(),
        role(&[ReviewRequest], &["specs/todo/*.md", "src/**/*skeleton*"]),
    );
    m.insert(
        "implementer".to_string(),
        role(
            &[Approval, ClarificationRequest, Question],
            &["specs/todo/*.md", "tests/**/*.py"],
        ),
    );
    m
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            version: default_version(),
            domain: default_domain(),
            roles: default_roles(),
            panels: BTreeMap::new(),
            templates: BTreeMap::new(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(WfmailError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Like [`Config::load`], but an uninitialized root yields the defaults.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        match Self::load(root) {
            Err(WfmailError::NotInitialized) => Ok(Self::new()),
            other => other,
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn role(&self, name: &str) -> Result<&RoleConfig> {
        self.roles
            .get(name)
            .ok_or_else(|| WfmailError::RoleNotFound(name.to_string()))
    }

    pub fn panel(&self, name: &str) -> Result<&PanelConfig> {
        self.panels
            .get(name)
            .ok_or_else(|| WfmailError::PanelNotFound(name.to_string()))
    }

    /// `role@<configured domain>`, or the address as written when it names a domain.
    pub fn address(&self, role: &str) -> Result<Address> {
        if role.contains('@') || role.contains('<') {
            return role.parse();
        }
        Address::new(role, self.domain.as_str())
    }

    pub fn template_for(&self, event_type: &EventType) -> Option<&str> {
        self.templates.get(event_type.as_str()).map(String::as_str)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut push = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message });
        };

        if paths::validate_domain(&self.domain).is_err() {
            push(WarnLevel::Error, format!("invalid domain '{}'", self.domain));
        }

        for (name, role) in &self.roles {
            if paths::validate_role(name).is_err() {
                push(WarnLevel::Error, format!("invalid role name '{name}'"));
            }
            for et in &role.event_types {
                if !et.is_known() {
                    push(
                        WarnLevel::Warning,
                        format!("role '{name}' subscribes to unknown event type '{et}'"),
                    );
                }
            }
            if role.catchup_days == 0 {
                push(
                    WarnLevel::Warning,
                    format!("role '{name}' has catchup_days 0; pending will always be empty"),
                );
            } else if role.catchup_days > MAX_CATCHUP_DAYS {
                push(
                    WarnLevel::Error,
                    format!(
                        "role '{name}' has catchup_days {}; the limit is {MAX_CATCHUP_DAYS}",
                        role.catchup_days
                    ),
                );
            }
            for pattern in &role.catchup_artifacts {
                if let Err(e) = Pattern::new(pattern) {
                    push(WarnLevel::Warning, format!("role '{name}': {e}"));
                }
            }
        }

        for (name, panel) in &self.panels {
            if paths::validate_role(name).is_err() {
                push(WarnLevel::Error, format!("invalid panel name '{name}'"));
            }
            if self.roles.contains_key(name) {
                push(
                    WarnLevel::Warning,
                    format!("panel '{name}' shares its mailbox with the role of the same name"),
                );
            }
            if panel.members.is_empty() {
                push(WarnLevel::Error, format!("panel '{name}' has no members"));
            }
            for member in &panel.members {
                if paths::validate_role(member).is_err() {
                    push(
                        WarnLevel::Error,
                        format!("panel '{name}' has invalid member '{member}'"),
                    );
                }
            }
        }

        for (event_type, body) in &self.templates {
            if !template::is_well_formed(body) {
                push(
                    WarnLevel::Warning,
                    format!("template for '{event_type}' has unbalanced placeholder braces"),
                );
            }
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::new();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.domain, "workflow.local");
        assert_eq!(parsed.roles, cfg.roles);
        assert!(parsed.validate().is_empty());
    }

    #[test]
    fn minimal_yaml_fills_defaults() {
        let cfg: Config = serde_yaml::from_str(
            "roles:\n  implementer:\n    event_types: [approval, question]\npanels:\n  spec-panel:\n    members: [claude, gemini]\n",
        )
        .unwrap();
        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.domain, "workflow.local");
        let role = cfg.role("implementer").unwrap();
        assert_eq!(role.catchup_days, 7);
        assert_eq!(role.event_types, vec![EventType::Approval, EventType::Question]);
        assert_eq!(cfg.panel("spec-panel").unwrap().decision_model, DecisionModel::Consensus);
        assert!(matches!(cfg.role("nobody"), Err(WfmailError::RoleNotFound(_))));
        assert!(matches!(cfg.panel("nope"), Err(WfmailError::PanelNotFound(_))));
    }

    #[test]
    fn load_missing_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(Config::load(dir.path()), Err(WfmailError::NotInitialized)));
        assert_eq!(Config::load_or_default(dir.path()).unwrap().roles.len(), 4);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::new();
        cfg.domain = "team.example".to_string();
        cfg.templates
            .insert("question".to_string(), "Q: {{QUESTION}}\n".to_string());
        cfg.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.domain, "team.example");
        assert_eq!(loaded.template_for(&EventType::Question), Some("Q: {{QUESTION}}\n"));
        assert_eq!(loaded.address("implementer").unwrap().to_string(), "implementer@team.example");
        assert_eq!(
            loaded.address("claude@panel.local").unwrap().to_string(),
            "claude@panel.local"
        );
    }

    #[test]
    fn validate_flags_problems() {
        let mut cfg = Config::new();
        cfg.roles.get_mut("implementer").unwrap().event_types.push(EventType::from("deploy"));
        cfg.roles.get_mut("spec-writer").unwrap().catchup_days = 0;
        cfg.panels.insert(
            "empty-panel".to_string(),
            PanelConfig {
                members: Vec::new(),
                decision_model: DecisionModel::Majority,
            },
        );
        cfg.templates.insert("answer".to_string(), "{{ANSWER".to_string());

        let warnings = cfg.validate();
        let errors = warnings.iter().filter(|w| w.level == WarnLevel::Error).count();
        assert_eq!(errors, 1);
        assert_eq!(warnings.len(), 4);
        assert!(warnings.iter().any(|w| w.message.contains("'deploy'")));
    }

    #[test]
    fn oversized_catchup_window_is_an_error() {
        let mut cfg = Config::new();
        cfg.roles.get_mut("implementer").unwrap().catchup_days = 200_000_000;
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, WarnLevel::Error);
        assert!(warnings[0].message.contains("catchup_days 200000000"));

        cfg.roles.get_mut("implementer").unwrap().catchup_days = MAX_CATCHUP_DAYS;
        assert!(cfg.validate().is_empty());
    }
}
