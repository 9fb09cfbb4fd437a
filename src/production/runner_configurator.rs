//! Script-driven agent configurator
//!
//! Shells out to the runner's `config.sh` for (de)registration and `svc.sh`
//! for the service lifecycle.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::traits::{AgentConfigurator, ConfiguratorError, Registration, RegistrationToken};

pub struct ScriptConfigurator {
    working_dir: PathBuf,
    config_script: PathBuf,
    service_script: PathBuf,
}

impl ScriptConfigurator {
    pub fn new(working_dir: PathBuf, config_script: PathBuf, service_script: PathBuf) -> Self {
        Self {
            working_dir,
            config_script,
            service_script,
        }
    }

    /// Standard layout: `config.sh` and `svc.sh` inside the runner directory
    pub fn for_runner(runner_dir: &Path) -> Self {
        Self::new(
            runner_dir.to_path_buf(),
            runner_dir.join("config.sh"),
            runner_dir.join("svc.sh"),
        )
    }

    async fn run(&self, step: &str, program: &Path, args: &[&str]) -> Result<(), ConfiguratorError> {
        tracing::debug!(step, program = %program.display(), "Running configurator step");

        let output = Command::new(program)
            .args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ConfiguratorError::SpawnFailed {
                program: program.display().to_string(),
                reason: e.to_string(),
            })?;

        match output.status.code() {
            Some(0) => {
                tracing::debug!(step, "Configurator step succeeded");
                Ok(())
            }
            Some(code) => Err(ConfiguratorError::NonZeroExit {
                step: step.to_string(),
                code,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
            None => Err(ConfiguratorError::Terminated {
                step: step.to_string(),
            }),
        }
    }
}

/// Arguments for `config.sh` removal
fn remove_args(token: Option<&RegistrationToken>) -> Vec<&str> {
    match token {
        Some(t) => vec!["remove", "--token", t.expose()],
        None => vec!["remove", "--unattended"],
    }
}

/// Arguments for `config.sh` registration
fn register_args<'a>(registration: &Registration<'a>) -> Vec<&'a str> {
    vec![
        "--unattended",
        "--replace",
        "--url",
        registration.url,
        "--token",
        registration.token.expose(),
        "--name",
        registration.name,
    ]
}

#[async_trait::async_trait]
impl AgentConfigurator for ScriptConfigurator {
    async fn stop_service(&self) -> Result<(), ConfiguratorError> {
        self.run("service stop", &self.service_script, &["stop"]).await
    }

    async fn start_service(&self) -> Result<(), ConfiguratorError> {
        self.run("service start", &self.service_script, &["start"]).await
    }

    async fn remove(&self, token: Option<&RegistrationToken>) -> Result<(), ConfiguratorError> {
        let args = remove_args(token);
        self.run("remove", &self.config_script, &args).await
    }

    async fn register(&self, registration: Registration<'_>) -> Result<(), ConfiguratorError> {
        tracing::info!(
            url = registration.url,
            name = registration.name,
            token = %registration.token,
            "Registering runner"
        );
        let args = register_args(&registration);
        self.run("register", &self.config_script, &args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_remove_args() {
        let token = RegistrationToken::new("REMOVE123");
        assert_eq!(remove_args(Some(&token)), vec!["remove", "--token", "REMOVE123"]);
        assert_eq!(remove_args(None), vec!["remove", "--unattended"]);
    }

    #[test]
    fn test_register_args() {
        let token = RegistrationToken::new("REG456");
        let registration = Registration {
            url: "https://github.com/acme",
            token: &token,
            name: "builder-1",
        };
        let args = register_args(&registration);
        assert_eq!(
            args,
            vec![
                "--unattended",
                "--replace",
                "--url",
                "https://github.com/acme",
                "--token",
                "REG456",
                "--name",
                "builder-1",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_script_is_spawn_failure() {
        let dir = TempDir::new().unwrap();
        let configurator = ScriptConfigurator::for_runner(dir.path());

        let result = configurator.stop_service().await;
        assert!(matches!(result, Err(ConfiguratorError::SpawnFailed { .. })));
    }

    // `/bin/sh <step>` reads the step script from the working directory
    #[cfg(unix)]
    fn shell_configurator(dir: &TempDir) -> ScriptConfigurator {
        ScriptConfigurator::new(
            dir.path().to_path_buf(),
            PathBuf::from("/bin/sh"),
            PathBuf::from("/bin/sh"),
        )
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_code_and_stderr_are_captured() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("start"), "echo \"cannot start\" >&2\nexit 3\n").unwrap();

        let configurator = shell_configurator(&dir);
        match configurator.start_service().await {
            Err(ConfiguratorError::NonZeroExit { step, code, stderr }) => {
                assert_eq!(step, "service start");
                assert_eq!(code, 3);
                assert_eq!(stderr, "cannot start");
            }
            other => panic!("Expected NonZeroExit, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_script() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("remove"), "exit 0\n").unwrap();

        let configurator = shell_configurator(&dir);
        assert!(configurator.remove(None).await.is_ok());
    }
}
