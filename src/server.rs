//! Driving the external world generator.

use crate::error::ExploreError;
use log::{debug, warn};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub const DEFAULT_COMMAND: &str = "java -jar minecraft_server.jar nogui";

/// Something that generates the chunks around the current spawn when run.
pub trait Engine {
    fn run_once(&mut self) -> Result<(), ExploreError>;
}

/// Starts the server, asks it to stop right away, and waits for it to exit.
/// The server generates the spawn area before it reads `stop`.
#[derive(Debug)]
pub struct ServerEngine {
    working_dir: PathBuf,
    command: String,
    argv: Vec<String>,
    verbose: bool,
}

impl ServerEngine {
    pub fn new(working_dir: &Path, command: &str, verbose: bool) -> Result<Self, ExploreError> {
        let argv = shlex::split(command)
            .filter(|argv| !argv.is_empty())
            .ok_or_else(|| ExploreError::InvalidCommand(command.to_string()))?;
        Ok(Self {
            working_dir: working_dir.to_path_buf(),
            command: command.to_string(),
            argv,
            verbose,
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    fn failure(&self, code: Option<i32>) -> ExploreError {
        ExploreError::EngineFailure {
            command: self.command.clone(),
            code,
            log: (!self.verbose).then(|| self.working_dir.join("logs").join("latest.log")),
        }
    }
}

impl Engine for ServerEngine {
    fn run_once(&mut self) -> Result<(), ExploreError> {
        debug!("running '{}' in {}", self.command, self.working_dir.display());
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| ExploreError::InvalidCommand(self.command.clone()))?;
        let stdout = if self.verbose {
            Stdio::inherit()
        } else {
            Stdio::null()
        };
        let mut child = Command::new(program)
            .args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(stdout)
            .spawn()
            .map_err(|error| {
                debug!("failed to start '{}': {error}", self.command);
                self.failure(None)
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(b"stop\n").and_then(|_| stdin.flush()) {
                Ok(()) => {}
                Err(error) if error.kind() == io::ErrorKind::BrokenPipe => {}
                Err(error) => warn!("failed to send stop to the server: {error}"),
            }
        }

        let status = child
            .wait()
            .map_err(|error| ExploreError::io(&self.working_dir, error))?;
        debug!("'{}' exited with {status}", self.command);
        if status.success() {
            Ok(())
        } else {
            Err(self.failure(status.code()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_command_like_a_shell() {
        let engine = ServerEngine::new(
            Path::new("."),
            "java -Xmx2G -jar 'my server.jar' nogui",
            false,
        )
        .unwrap();
        assert_eq!(
            engine.argv,
            vec!["java", "-Xmx2G", "-jar", "my server.jar", "nogui"]
        );
        assert_eq!(engine.command(), "java -Xmx2G -jar 'my server.jar' nogui");
    }

    #[test]
    fn rejects_unparseable_commands() {
        for command in ["", "   ", "java -jar 'unterminated"] {
            assert!(matches!(
                ServerEngine::new(Path::new("."), command, false),
                Err(ExploreError::InvalidCommand(_))
            ));
        }
    }

    #[cfg(unix)]
    #[test]
    fn successful_command_reads_stop() {
        let dir = std::env::temp_dir();
        let mut engine =
            ServerEngine::new(&dir, "sh -c 'read line; test \"$line\" = stop'", false).unwrap();
        engine.run_once().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_points_at_the_log_when_quiet() {
        let dir = std::env::temp_dir();
        let mut engine = ServerEngine::new(&dir, "sh -c 'exit 3'", false).unwrap();
        match engine.run_once() {
            Err(ExploreError::EngineFailure { command, code, log }) => {
                assert_eq!(command, "sh -c 'exit 3'");
                assert_eq!(code, Some(3));
                assert_eq!(log, Some(dir.join("logs").join("latest.log")));
            }
            other => panic!("unexpected result {other:?}"),
        }

        let mut verbose = ServerEngine::new(&dir, "sh -c 'exit 1'", true).unwrap();
        assert!(matches!(
            verbose.run_once(),
            Err(ExploreError::EngineFailure { log: None, .. })
        ));
    }

    #[test]
    fn missing_program_is_an_engine_failure() {
        let mut engine = ServerEngine::new(
            &std::env::temp_dir(),
            "mcexplore-test-no-such-program nogui",
            true,
        )
        .unwrap();
        assert!(matches!(
            engine.run_once(),
            Err(ExploreError::EngineFailure { code: None, .. })
        ));
    }
}
