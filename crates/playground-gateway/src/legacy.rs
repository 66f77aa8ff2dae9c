//! Legacy API process.
//!
//! When a launch command is configured, the gateway starts the legacy API
//! itself. The child lives as long as the routing table that proxies to it.

use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::config::EngineSettings;
use crate::error::GatewayError;
use crate::xterm::ENGINE_CONFIGURATION_ENV;

/// A running legacy API child process, killed on drop.
#[derive(Debug)]
pub struct LegacyProcess {
    child: Child,
    command: String,
}

impl LegacyProcess {
    /// Start `argv[0]` with the remaining arguments. Must be called from
    /// within a Tokio runtime.
    pub fn spawn(argv: &[String], engine: &EngineSettings) -> Result<Self, GatewayError> {
        let command = argv.join(" ");
        let Some((program, args)) = argv.split_first() else {
            return Err(GatewayError::LegacyProcess {
                command,
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            });
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if !engine.settings_json.is_empty() {
            cmd.env(ENGINE_CONFIGURATION_ENV, &engine.settings_json);
        }

        let child = cmd.spawn().map_err(|source| GatewayError::LegacyProcess {
            command: command.clone(),
            source,
        })?;
        info!("Started legacy API process (pid {:?}): {command}", child.id());

        Ok(Self { child, command })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Drop for LegacyProcess {
    fn drop(&mut self) {
        if let Err(e) = self.child.start_kill() {
            warn!("Failed to stop legacy API process {}: {e}", self.command);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let err = LegacyProcess::spawn(&[], &EngineSettings::default()).unwrap_err();
        assert!(matches!(err, GatewayError::LegacyProcess { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_rejected() {
        let argv = vec!["/nonexistent/legacy-api".to_string()];
        assert!(LegacyProcess::spawn(&argv, &EngineSettings::default()).is_err());
    }

    #[tokio::test]
    async fn spawns_and_reports_pid() {
        let argv = vec!["sleep".to_string(), "30".to_string()];
        let process = LegacyProcess::spawn(&argv, &EngineSettings::default()).unwrap();
        assert!(process.id().is_some());
        assert_eq!(process.command(), "sleep 30");
    }
}
