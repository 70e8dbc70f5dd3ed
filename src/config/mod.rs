use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Placeholder written over secrets when a config is rendered for logging.
const MASK: &str = "********";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// External base URL used when building pipeline links in webhook
    /// responses (e.g. behind a reverse proxy).
    #[serde(default)]
    pub public_url: Option<String>,
    /// Disable the read-only inspection API (`/pipelines`, `/logs`).
    #[serde(default)]
    pub disable_api: bool,
    #[serde(default)]
    pub api_user: Option<String>,
    #[serde(default)]
    pub api_password: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_actions_db_file")]
    pub actions_db_file: PathBuf,
    /// Empty value disables the database log sink and the `/logs` endpoint.
    #[serde(default = "default_logs_db_file")]
    pub logs_db_file: PathBuf,
    #[serde(default)]
    pub ssl: SslConfig,
    pub projects: BTreeMap<String, Project>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SslConfig {
    #[serde(default)]
    pub cert_file_path: Option<PathBuf>,
    #[serde(default)]
    pub key_file_path: Option<PathBuf>,
}

impl SslConfig {
    pub fn enabled(&self) -> bool {
        self.cert_file_path.is_some() && self.key_file_path.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitProvider {
    Gitea,
    Github,
    Gitlab,
}

impl Default for GitProvider {
    fn default() -> Self {
        GitProvider::Github
    }
}

impl std::fmt::Display for GitProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitProvider::Gitea => write!(f, "gitea"),
            GitProvider::Github => write!(f, "github"),
            GitProvider::Gitlab => write!(f, "gitlab"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub git_provider: GitProvider,
    /// Repository path as the provider reports it, `owner/name`.
    pub repo: String,
    /// Bearer token checked against the delivery's authorization header.
    #[serde(default)]
    pub authorization: Option<String>,
    /// Shared secret for HMAC signature verification.
    #[serde(default)]
    pub secret: Option<String>,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default = "default_action_on")]
    pub on: String,
    #[serde(default = "default_action_branch")]
    pub branch: String,
    #[serde(default)]
    pub cwd: Option<String>,
    /// Run the action as this OS user (Unix only).
    #[serde(default)]
    pub user: Option<String>,
    /// Shell script, interpreted in-process. Mutually exclusive with `run`.
    #[serde(default)]
    pub script: Option<String>,
    /// Command argv, executed directly. Mutually exclusive with `script`.
    #[serde(default)]
    pub run: Option<Vec<String>>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    9090
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_actions_db_file() -> PathBuf {
    PathBuf::from("actions.sqlite3")
}

fn default_logs_db_file() -> PathBuf {
    PathBuf::from("logs.sqlite3")
}

fn default_action_on() -> String {
    "push".to_string()
}

fn default_action_branch() -> String {
    "master".to_string()
}

const LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

impl Config {
    /// Load the config file, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Environment overrides mirror YAML paths, upper-case with `__` as the
    /// nesting separator. Project and action overrides only exist for
    /// entries already present in the file.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("HOST") {
            self.host = v;
        }
        if let Ok(v) = std::env::var("PORT") {
            self.port = v.parse().context("Invalid PORT value")?;
        }
        if let Ok(v) = std::env::var("PUBLIC_URL") {
            self.public_url = Some(v);
        }
        if let Ok(v) = std::env::var("DISABLE_API") {
            self.disable_api = parse_bool(&v).context("Invalid DISABLE_API value")?;
        }
        if let Ok(v) = std::env::var("API_USER") {
            self.api_user = Some(v);
        }
        if let Ok(v) = std::env::var("API_PASSWORD") {
            self.api_password = Some(v);
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Ok(v) = std::env::var("ACTIONS_DB_FILE") {
            self.actions_db_file = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("LOGS_DB_FILE") {
            self.logs_db_file = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SSL__CERT_FILE_PATH") {
            self.ssl.cert_file_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("SSL__KEY_FILE_PATH") {
            self.ssl.key_file_path = Some(PathBuf::from(v));
        }

        for (name, project) in self.projects.iter_mut() {
            let prefix = format!("PROJECTS__{name}__");
            if let Ok(v) = std::env::var(format!("{prefix}GIT_PROVIDER")) {
                project.git_provider = match v.as_str() {
                    "gitea" => GitProvider::Gitea,
                    "github" => GitProvider::Github,
                    "gitlab" => GitProvider::Gitlab,
                    other => bail!("Unknown git provider '{other}' in {prefix}GIT_PROVIDER"),
                };
            }
            if let Ok(v) = std::env::var(format!("{prefix}REPO")) {
                project.repo = v;
            }
            if let Ok(v) = std::env::var(format!("{prefix}AUTHORIZATION")) {
                project.authorization = Some(v);
            }
            if let Ok(v) = std::env::var(format!("{prefix}SECRET")) {
                project.secret = Some(v);
            }
            // Action indices in env names are 1-based.
            for (i, action) in project.actions.iter_mut().enumerate() {
                let prefix = format!("{prefix}ACTIONS__{}__", i + 1);
                if let Ok(v) = std::env::var(format!("{prefix}ON")) {
                    action.on = v;
                }
                if let Ok(v) = std::env::var(format!("{prefix}BRANCH")) {
                    action.branch = v;
                }
                if let Ok(v) = std::env::var(format!("{prefix}CWD")) {
                    action.cwd = Some(v);
                }
                if let Ok(v) = std::env::var(format!("{prefix}USER")) {
                    action.user = Some(v);
                }
                if let Ok(v) = std::env::var(format!("{prefix}SCRIPT")) {
                    action.script = Some(v);
                }
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            bail!(
                "Incorrect log_level value '{}'. Possible values are 'debug', 'info', 'warn' and 'error'",
                self.log_level
            );
        }
        if self.projects.is_empty() {
            bail!("No projects configured, nothing to serve");
        }
        let name_re = Regex::new("^[A-Za-z0-9_-]+$").expect("static regex");
        for (name, project) in &self.projects {
            if !name_re.is_match(name) || name.starts_with('_') || name.contains("__") {
                bail!(
                    "Invalid project name '{name}': names must match [A-Za-z0-9_-]+, \
                     must not start with '_' and must not contain '__'"
                );
            }
            if project.repo.is_empty() {
                bail!("Project '{name}' has no repo configured");
            }
            if project.actions.is_empty() {
                bail!(
                    "Project '{name}' has no associated actions and can not be executed. \
                     Either add an 'actions' list or comment the project out"
                );
            }
            for (i, action) in project.actions.iter().enumerate() {
                let has_script = action.script.as_deref().is_some_and(|s| !s.is_empty());
                let has_run = action.run.as_deref().is_some_and(|r| !r.is_empty());
                if has_script == has_run {
                    bail!(
                        "Action {} (on {}) of project '{name}' must have exactly one of \
                         'script' or 'run'",
                        i + 1,
                        action.on
                    );
                }
            }
        }
        Ok(())
    }

    /// Deep copy with `api_password` and every project `secret` /
    /// `authorization` replaced by a placeholder. The live config is
    /// untouched; the masked copy is safe to log.
    pub fn masked(&self) -> Config {
        let mut masked = self.clone();
        mask_in_place(&mut masked.api_password);
        for project in masked.projects.values_mut() {
            mask_in_place(&mut project.secret);
            mask_in_place(&mut project.authorization);
        }
        masked
    }
}

fn mask_in_place(value: &mut Option<String>) {
    if value.as_deref().is_some_and(|v| !v.is_empty()) {
        *value = Some(MASK.to_string());
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => bail!("'{other}' is not a boolean"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
projects:
  website:
    git_provider: gitea
    repo: me/website
    authorization: tok
    secret: sec
    actions:
      - on: push
        branch: master
        run: ["make", "deploy"]
  api:
    repo: me/api
    actions:
      - script: |
          echo building
          make release
"#;

    fn parse(yaml: &str) -> Config {
        let mut cfg: Config = serde_yaml::from_str(yaml).expect("yaml parses");
        cfg.validate().expect("config validates");
        cfg
    }

    #[test]
    fn parses_sample_with_defaults() {
        let cfg = parse(SAMPLE);
        assert_eq!(cfg.host, "localhost");
        assert_eq!(cfg.port, 9090);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.actions_db_file, PathBuf::from("actions.sqlite3"));
        assert!(!cfg.disable_api);

        let website = &cfg.projects["website"];
        assert_eq!(website.git_provider, GitProvider::Gitea);
        assert_eq!(website.actions[0].on, "push");
        assert_eq!(website.actions[0].branch, "master");

        // git_provider defaults to github, action fields to push/master
        let api = &cfg.projects["api"];
        assert_eq!(api.git_provider, GitProvider::Github);
        assert_eq!(api.actions[0].on, "push");
        assert_eq!(api.actions[0].branch, "master");
    }

    #[test]
    fn rejects_empty_projects() {
        let cfg: Config = serde_yaml::from_str("projects: {}").expect("yaml parses");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_action_with_both_script_and_run() {
        let yaml = r#"
projects:
  p:
    repo: a/b
    actions:
      - script: "echo hi"
        run: ["echo", "hi"]
"#;
        let cfg: Config = serde_yaml::from_str(yaml).expect("yaml parses");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_action_with_neither_script_nor_run() {
        let yaml = r#"
projects:
  p:
    repo: a/b
    actions:
      - branch: main
"#;
        let cfg: Config = serde_yaml::from_str(yaml).expect("yaml parses");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_project_names() {
        for name in ["_private", "a__b", "has space", "ügly"] {
            let yaml = format!(
                "projects:\n  \"{name}\":\n    repo: a/b\n    actions:\n      - run: [\"true\"]\n"
            );
            let cfg: Config = serde_yaml::from_str(&yaml).expect("yaml parses");
            assert!(cfg.validate().is_err(), "name '{name}' should be rejected");
        }
    }

    #[test]
    fn rejects_unknown_log_level() {
        let yaml = r#"
log_level: verbose
projects:
  p:
    repo: a/b
    actions:
      - run: ["true"]
"#;
        let cfg: Config = serde_yaml::from_str(yaml).expect("yaml parses");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn masked_replaces_secrets_and_keeps_original() {
        let mut cfg = parse(SAMPLE);
        cfg.api_password = Some("hunter2".to_string());

        let masked = cfg.masked();
        assert_eq!(masked.api_password.as_deref(), Some("********"));
        assert_eq!(
            masked.projects["website"].secret.as_deref(),
            Some("********")
        );
        assert_eq!(
            masked.projects["website"].authorization.as_deref(),
            Some("********")
        );
        // untouched fields deep-equal the original
        assert_eq!(masked.host, cfg.host);
        assert_eq!(masked.projects["website"].repo, cfg.projects["website"].repo);
        assert_eq!(masked.projects["api"], cfg.projects["api"]);

        // the live config still holds the real values
        assert_eq!(cfg.api_password.as_deref(), Some("hunter2"));
        assert_eq!(cfg.projects["website"].secret.as_deref(), Some("sec"));
    }

    #[test]
    fn masked_skips_empty_secrets() {
        let mut cfg = parse(SAMPLE);
        cfg.projects.get_mut("website").unwrap().secret = Some(String::new());
        let masked = cfg.masked();
        assert_eq!(masked.projects["website"].secret.as_deref(), Some(""));
    }

    #[test]
    fn env_overrides_apply_to_projects_and_actions() {
        // Var names are unique to this test; nothing else reads them.
        std::env::set_var("PROJECTS__envtest__SECRET", "from-env");
        std::env::set_var("PROJECTS__envtest__ACTIONS__1__BRANCH", "main");
        let yaml = r#"
projects:
  envtest:
    repo: a/b
    actions:
      - run: ["true"]
"#;
        let mut cfg: Config = serde_yaml::from_str(yaml).expect("yaml parses");
        cfg.apply_env_overrides().expect("overrides apply");
        std::env::remove_var("PROJECTS__envtest__SECRET");
        std::env::remove_var("PROJECTS__envtest__ACTIONS__1__BRANCH");

        let project = &cfg.projects["envtest"];
        assert_eq!(project.secret.as_deref(), Some("from-env"));
        assert_eq!(project.actions[0].branch, "main");
    }
}
