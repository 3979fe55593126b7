//! Run configuration.
//!
//! Non-secret settings come from an optional `botdeploy.toml`; the remote
//! target and credential come from the environment only. Both are folded
//! into one `DeployConfig` that the pipeline takes by value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::credential::{Credential, Redactor};
use crate::error::{Error, Result};
use crate::marker::DEFAULT_MARKER_KEY;
use crate::trigger::TriggerPolicy;
use crate::utils::{base_path, io};

pub const DEFAULT_CONFIG_FILE: &str = "botdeploy.toml";

pub const ENV_HOST: &str = "BOT_DEPLOY_HOST";
pub const ENV_USER: &str = "BOT_DEPLOY_USER";
pub const ENV_PASSWORD: &str = "BOT_DEPLOY_PASSWORD";
pub const ENV_PATH: &str = "BOT_DEPLOY_PATH";

pub const SECRET_KEYS: [&str; 4] = [ENV_HOST, ENV_USER, ENV_PASSWORD, ENV_PATH];

/// Root structure of `botdeploy.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_trigger")]
    pub trigger: TriggerSettings,

    #[serde(default = "default_artifact")]
    pub artifact: ArtifactSettings,

    #[serde(default = "default_remote")]
    pub remote: RemoteSettings,

    #[serde(default = "default_transfer")]
    pub transfer: TransferSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerSettings {
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Paths or globs that trigger a run. Empty means the artifact path alone.
    #[serde(default)]
    pub watch: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSettings {
    #[serde(default = "default_artifact_path")]
    pub path: String,

    #[serde(default = "default_marker_key")]
    pub marker_key: String,

    /// Rewrite the local file with the stamped text before transfer.
    #[serde(default = "default_true")]
    pub write_back: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    #[serde(default = "default_service")]
    pub service: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Off by default: the host key is accepted on first use.
    #[serde(default)]
    pub strict_host_key_checking: bool,

    #[serde(default)]
    pub privilege: Privilege,

    #[serde(default)]
    pub status_delay_secs: u64,

    /// Remote file name; defaults to the artifact's file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Upload to a staging file and rename into place.
    #[serde(default = "default_true")]
    pub atomic: bool,

    /// Compare the staged file's SHA-256 with the local bytes before the rename.
    #[serde(default = "default_true")]
    pub verify_checksum: bool,
}

/// How supervisor commands gain root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Privilege {
    /// `sudo -S`, password fed on stdin.
    #[default]
    SudoPassword,
    /// `sudo -n`, relies on a NOPASSWD rule.
    Sudo,
    /// Run as the login user.
    None,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            trigger: default_trigger(),
            artifact: default_artifact(),
            remote: default_remote(),
            transfer: default_transfer(),
        }
    }
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_trigger() -> TriggerSettings {
    TriggerSettings {
        branch: default_branch(),
        watch: Vec::new(),
    }
}

fn default_artifact() -> ArtifactSettings {
    ArtifactSettings {
        path: default_artifact_path(),
        marker_key: default_marker_key(),
        write_back: true,
    }
}

fn default_remote() -> RemoteSettings {
    RemoteSettings {
        service: default_service(),
        port: default_ssh_port(),
        strict_host_key_checking: false,
        privilege: Privilege::default(),
        status_delay_secs: 0,
        file_name: None,
    }
}

fn default_transfer() -> TransferSettings {
    TransferSettings {
        atomic: true,
        verify_checksum: true,
    }
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_artifact_path() -> String {
    "main.py".to_string()
}

fn default_marker_key() -> String {
    DEFAULT_MARKER_KEY.to_string()
}

fn default_service() -> String {
    "discord-bot".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_true() -> bool {
    true
}

impl Settings {
    /// Load settings from `path`, or from `botdeploy.toml` in the working
    /// directory when present, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).to_string());
        if !expanded.is_file() {
            return Err(Error::config_missing_key(
                "config",
                Some(expanded.display().to_string()),
            )
            .with_hint(format!(
                "Create {} or omit --config to use defaults",
                expanded.display()
            )));
        }

        let content = io::read_file(&expanded, "read config")?;
        Self::from_toml(&content, &expanded.display().to_string())
    }

    pub fn from_toml(content: &str, origin: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config_invalid_toml(origin, e))
    }

    pub fn validate(&self) -> Result<()> {
        if self.trigger.branch.trim().is_empty() {
            return Err(Error::config_invalid_value(
                "trigger.branch",
                None,
                "Branch cannot be empty",
            ));
        }

        if self.artifact.path.trim().is_empty() {
            return Err(Error::config_invalid_value(
                "artifact.path",
                None,
                "Artifact path cannot be empty",
            ));
        }

        if !is_valid_unit_name(&self.remote.service) {
            return Err(Error::config_invalid_value(
                "remote.service",
                Some(self.remote.service.clone()),
                "Service name may only contain letters, digits and @ . _ : -",
            ));
        }

        if self.remote.port == 0 {
            return Err(Error::config_invalid_value(
                "remote.port",
                Some("0".to_string()),
                "Port must be between 1 and 65535",
            ));
        }

        if let Some(name) = &self.remote.file_name {
            if name.trim().is_empty() {
                return Err(Error::config_invalid_value(
                    "remote.file_name",
                    None,
                    "Remote file name cannot be empty",
                ));
            }
        }

        Ok(())
    }

    pub fn trigger_policy(&self) -> TriggerPolicy {
        let watch = if self.trigger.watch.is_empty() {
            let cwd = std::env::current_dir().ok();
            vec![repo_relative(&self.artifact.path, cwd.as_deref())]
        } else {
            self.trigger.watch.clone()
        };
        TriggerPolicy::new(self.trigger.branch.clone(), watch)
    }

    /// File name used on the remote side.
    pub fn remote_file_name(&self) -> Result<String> {
        if let Some(name) = &self.remote.file_name {
            return Ok(name.trim().to_string());
        }

        Path::new(&self.artifact.path)
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_string())
            .ok_or_else(|| {
                Error::config_invalid_value(
                    "artifact.path",
                    Some(self.artifact.path.clone()),
                    "Artifact path must include a file name",
                )
            })
    }
}

/// Changed paths are repo-relative; an absolute artifact path is taken
/// relative to the working directory, which is the checkout in CI.
fn repo_relative(artifact: &str, cwd: Option<&Path>) -> String {
    let path = Path::new(artifact);
    if !path.is_absolute() {
        return artifact.to_string();
    }

    match cwd.and_then(|cwd| path.strip_prefix(cwd).ok()) {
        Some(relative) => relative.to_string_lossy().into_owned(),
        None => {
            log_status!(
                "config",
                "Artifact {} is outside the working directory; set trigger.watch explicitly",
                artifact
            );
            artifact.to_string()
        }
    }
}

fn is_valid_unit_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '_' | ':' | '-'))
}

/// Remote target and credential, read from the environment.
pub struct Secrets {
    pub host: String,
    pub user: String,
    pub credential: Credential,
    pub base_path: String,
}

impl Secrets {
    /// Read the four secrets and remove them from the process environment.
    pub fn from_env() -> Result<Self> {
        let secrets = Self::from_lookup(|key| std::env::var(key).ok());
        for key in SECRET_KEYS {
            std::env::remove_var(key);
        }
        secrets
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let host = read(ENV_HOST);
        let user = read(ENV_USER);
        let password = read(ENV_PASSWORD);
        let base_path = read(ENV_PATH);

        let missing: Vec<&str> = [
            (ENV_HOST, host.is_none()),
            (ENV_USER, user.is_none()),
            (ENV_PASSWORD, password.is_none()),
            (ENV_PATH, base_path.is_none()),
        ]
        .into_iter()
        .filter_map(|(key, absent)| absent.then_some(key))
        .collect();

        let (Some(host), Some(user), Some(password), Some(base_path)) =
            (host, user, password, base_path)
        else {
            return Err(Error::config_missing_key(
                missing.join(", "),
                Some("environment".to_string()),
            )
            .with_hint(format!(
                "Set all of {} before starting a run",
                SECRET_KEYS.join(", ")
            )));
        };

        // Remote paths are single-quoted, so `~` would never be expanded.
        let base_path = base_path.trim();
        if !base_path.starts_with('/') {
            return Err(Error::config_invalid_value(
                ENV_PATH,
                None,
                "Remote base path must be absolute",
            )
            .with_hint(format!(
                "Set {} to an absolute directory such as /home/<user>/<bot>",
                ENV_PATH
            )));
        }

        Ok(Self {
            host: host.trim().to_string(),
            user: user.trim().to_string(),
            credential: Credential::new(password),
            base_path: base_path.to_string(),
        })
    }

    pub fn redactor(&self) -> Redactor<'_> {
        Redactor::new()
            .secret(&self.credential)
            .value(&self.base_path, "<path>")
            .value(&self.host, "<host>")
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("host", &"<redacted>")
            .field("user", &"<redacted>")
            .field("credential", &self.credential)
            .field("base_path", &"<redacted>")
            .finish()
    }
}

/// Everything a run needs, handed to the pipeline by value.
#[derive(Debug)]
pub struct DeployConfig {
    pub settings: Settings,
    pub secrets: Secrets,
}

impl DeployConfig {
    pub fn new(settings: Settings, secrets: Secrets) -> Self {
        Self { settings, secrets }
    }

    /// Absolute remote path of the deployed file.
    pub fn destination(&self) -> Result<String> {
        let file_name = self.settings.remote_file_name()?;
        base_path::join_remote_path(Some(&self.secrets.base_path), &file_name)
    }

    /// Identity of the remote target, used to key the run lock.
    pub fn target_identity(&self) -> Result<String> {
        Ok(format!(
            "{}@{}:{}:{}#{}",
            self.secrets.user,
            self.secrets.host,
            self.settings.remote.port,
            self.destination()?,
            self.settings.remote.service
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn full_env() -> Vec<(&'static str, &'static str)> {
        vec![
            (ENV_HOST, "bot.example.com"),
            (ENV_USER, "pi"),
            (ENV_PASSWORD, "s3cr3t"),
            (ENV_PATH, "/home/pi/bot"),
        ]
    }

    #[test]
    fn defaults_match_single_file_bot_layout() {
        let settings = Settings::default();
        assert_eq!(settings.trigger.branch, "main");
        assert_eq!(settings.artifact.path, "main.py");
        assert_eq!(settings.artifact.marker_key, "BOT_LAST_UPDATED");
        assert_eq!(settings.remote.port, 22);
        assert_eq!(settings.remote.privilege, Privilege::SudoPassword);
        assert!(!settings.remote.strict_host_key_checking);
        assert!(settings.transfer.atomic);
        assert!(settings.transfer.verify_checksum);
    }

    #[test]
    fn partial_toml_keeps_defaults_for_missing_fields() {
        let settings = Settings::from_toml(
            "[remote]\nservice = \"camera-bot\"\nprivilege = \"sudo\"\n\n[transfer]\natomic = false\n",
            "test",
        )
        .unwrap();

        assert_eq!(settings.remote.service, "camera-bot");
        assert_eq!(settings.remote.privilege, Privilege::Sudo);
        assert_eq!(settings.remote.port, 22);
        assert!(!settings.transfer.atomic);
        assert!(settings.transfer.verify_checksum);
        assert_eq!(settings.artifact.path, "main.py");
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = Settings::from_toml("[remote\nservice = 1", "botdeploy.toml").unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_toml");
        assert_eq!(err.details["path"], "botdeploy.toml");
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.toml");
        std::fs::write(&path, "[trigger]\nbranch = \"release\"\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.trigger.branch, "release");
    }

    #[test]
    fn load_rejects_missing_explicit_file() {
        let err = Settings::load(Some(Path::new("/nonexistent/botdeploy.toml"))).unwrap_err();
        assert_eq!(err.code.as_str(), "config.missing_key");
    }

    #[test]
    fn validate_rejects_shell_metacharacters_in_service() {
        let mut settings = Settings::default();
        settings.remote.service = "bot; rm -rf /".to_string();
        let err = settings.validate().unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");
    }

    #[test]
    fn watch_list_defaults_to_artifact_path() {
        let policy = Settings::default().trigger_policy();
        assert_eq!(policy.watch, vec!["main.py".to_string()]);
        assert_eq!(policy.branch, "main");
    }

    #[test]
    fn absolute_artifact_path_watches_its_repo_relative_form() {
        let cwd = Path::new("/work/repo");
        assert_eq!(repo_relative("/work/repo/bot/main.py", Some(cwd)), "bot/main.py");
        assert_eq!(repo_relative("bot/main.py", Some(cwd)), "bot/main.py");
        assert_eq!(repo_relative("/elsewhere/main.py", Some(cwd)), "/elsewhere/main.py");
    }

    #[test]
    fn absolute_artifact_under_working_directory_still_triggers() {
        let cwd = std::env::current_dir().unwrap();
        let mut settings = Settings::default();
        settings.artifact.path = cwd.join("main.py").display().to_string();

        let decision = settings.trigger_policy().evaluate(&crate::trigger::TriggerEvent {
            branch: "main".to_string(),
            changed_paths: vec!["main.py".to_string()],
            commit: None,
        });
        assert!(matches!(decision, crate::trigger::TriggerDecision::Proceed { .. }));
    }

    #[test]
    fn secrets_require_all_four_values() {
        let mut env = full_env();
        env.retain(|(k, _)| *k != ENV_PASSWORD && *k != ENV_PATH);

        let err = Secrets::from_lookup(lookup(&env)).unwrap_err();
        assert_eq!(err.code.as_str(), "config.missing_key");
        assert_eq!(err.details["key"], "BOT_DEPLOY_PASSWORD, BOT_DEPLOY_PATH");
    }

    #[test]
    fn blank_secret_counts_as_missing() {
        let mut env = full_env();
        env[0] = (ENV_HOST, "   ");
        let err = Secrets::from_lookup(lookup(&env)).unwrap_err();
        assert_eq!(err.details["key"], "BOT_DEPLOY_HOST");
    }

    #[test]
    fn relative_or_home_base_path_is_rejected_without_echoing_it() {
        for path in ["~/discord-bot", "discord-bot", "./bot"] {
            let mut env = full_env();
            env[3] = (ENV_PATH, path);

            let err = Secrets::from_lookup(lookup(&env)).unwrap_err();
            assert_eq!(err.code.as_str(), "config.invalid_value");
            assert_eq!(err.details["key"], "BOT_DEPLOY_PATH");
            assert!(!err.details.to_string().contains(path));
            assert!(!err.hints.is_empty());
        }
    }

    #[test]
    fn secrets_debug_hides_values() {
        let secrets = Secrets::from_lookup(lookup(&full_env())).unwrap();
        let debug = format!("{:?}", secrets);
        assert!(!debug.contains("s3cr3t"));
        assert!(!debug.contains("bot.example.com"));
        assert!(!debug.contains("/home/pi/bot"));
    }

    #[test]
    fn destination_joins_base_path_and_file_name() {
        let secrets = Secrets::from_lookup(lookup(&full_env())).unwrap();
        let mut settings = Settings::default();
        settings.artifact.path = "bot/main.py".to_string();
        let config = DeployConfig::new(settings, secrets);

        assert_eq!(config.destination().unwrap(), "/home/pi/bot/main.py");
    }

    #[test]
    fn destination_honors_remote_file_name() {
        let secrets = Secrets::from_lookup(lookup(&full_env())).unwrap();
        let mut settings = Settings::default();
        settings.remote.file_name = Some("bot.py".to_string());
        let config = DeployConfig::new(settings, secrets);

        assert_eq!(config.destination().unwrap(), "/home/pi/bot/bot.py");
    }
}
