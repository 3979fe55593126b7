use botdeploy::config::{DeployConfig, Privilege, Secrets, Settings};
use botdeploy::lock::RunLock;

const SETTINGS: &str = r#"
[trigger]
branch = "main"
watch = ["bot/main.py", "bot/cogs/**/*.py"]

[artifact]
path = "bot/main.py"
write_back = false

[remote]
service = "discord-bot"
port = 2222
strict_host_key_checking = true
privilege = "sudo"
status_delay_secs = 2

[transfer]
atomic = true
verify_checksum = false
"#;

fn secrets() -> Secrets {
    Secrets::from_lookup(|key| {
        Some(
            match key {
                "BOT_DEPLOY_HOST" => "10.0.0.5",
                "BOT_DEPLOY_USER" => "deploy",
                "BOT_DEPLOY_PASSWORD" => "pw",
                _ => "/srv/bot/",
            }
            .to_string(),
        )
    })
    .unwrap()
}

#[test]
fn full_settings_file_round_trips_into_a_deploy_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("botdeploy.toml");
    std::fs::write(&path, SETTINGS).unwrap();

    let settings = Settings::load(Some(&path)).unwrap();
    assert_eq!(settings.remote.port, 2222);
    assert_eq!(settings.remote.privilege, Privilege::Sudo);
    assert!(settings.remote.strict_host_key_checking);
    assert!(!settings.transfer.verify_checksum);
    assert!(!settings.artifact.write_back);

    let policy = settings.trigger_policy();
    assert_eq!(policy.watch.len(), 2);

    let config = DeployConfig::new(settings, secrets());
    assert_eq!(config.destination().unwrap(), "/srv/bot/main.py");
}

#[test]
fn debug_output_of_a_config_hides_the_target() {
    let config = DeployConfig::new(Settings::default(), secrets());
    let debug = format!("{:?}", config);

    assert!(!debug.contains("10.0.0.5"));
    assert!(!debug.contains("/srv/bot"));
    assert!(!debug.contains("\"pw\""));
}

#[test]
fn overlapping_runs_against_one_target_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let config = DeployConfig::new(Settings::default(), secrets());
    let identity = config.target_identity().unwrap();

    let held = RunLock::acquire_in(dir.path(), &identity).unwrap();
    let err = RunLock::acquire_in(dir.path(), &identity).unwrap_err();
    assert_eq!(err.code.as_str(), "run.locked");

    drop(held);
    assert!(RunLock::acquire_in(dir.path(), &identity).is_ok());
}

#[test]
fn lock_left_behind_by_a_killed_run_is_taken_over() {
    let dir = tempfile::tempdir().unwrap();
    let config = DeployConfig::new(Settings::default(), secrets());
    let identity = config.target_identity().unwrap();

    let path = RunLock::acquire_in(dir.path(), &identity)
        .unwrap()
        .path()
        .to_path_buf();
    // Same file a SIGKILLed run leaves: PID still recorded, nobody holding it.
    std::fs::write(&path, "4194303\n").unwrap();

    let lock = RunLock::acquire_in(dir.path(), &identity).unwrap();
    assert_eq!(lock.path(), path);
}
