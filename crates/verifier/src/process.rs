use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};
use std::thread;

use lockwatch_ir::Program;

use crate::backend::VerifierBackend;
use crate::config::VerifierConfig;
use crate::error::VerifierError;
use crate::parser::{parse_refutation, parse_verdict};
use crate::result::VerifierResult;

/// Verifier running as a subprocess.
///
/// The printed program goes to the child's stdin; the verdict is read from
/// its stdout as JSON.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    config: VerifierConfig,
}

impl ProcessBackend {
    pub fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    /// Create a backend with the auto-detected verifier and default settings.
    pub fn with_default_config() -> Result<Self, VerifierError> {
        Ok(Self::new(VerifierConfig::auto_detect()?))
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Run the verifier with `args`, feeding it `input`. Returns stdout and
    /// stderr.
    ///
    /// The program is written from a separate thread so a verifier that
    /// answers before draining stdin cannot block on a full pipe.
    fn run(&self, args: &[String], input: &str) -> Result<(String, String), VerifierError> {
        self.config.validate()?;
        tracing::debug!(
            verifier = %self.config.verifier_path.display(),
            args = ?args,
            "Spawning verifier"
        );

        let mut child = Command::new(&self.config.verifier_path)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| io_error("start", &e))?;

        let mut stdin = child.stdin.take().ok_or_else(|| VerifierError::Io {
            action: "open stdin of",
            message: "no pipe".to_string(),
        })?;
        let program = input.to_string();
        let writer = thread::spawn(move || stdin.write_all(program.as_bytes()));

        let output = child.wait_with_output().map_err(|e| io_error("wait for", &e))?;
        match writer.join() {
            Ok(Ok(())) => {}
            // The verifier may stop reading once it has its answer.
            Ok(Err(e)) if e.kind() == ErrorKind::BrokenPipe => {
                tracing::trace!("Verifier closed stdin early");
            }
            Ok(Err(e)) => return Err(io_error("write the program to", &e)),
            Err(_) => {
                return Err(VerifierError::Io {
                    action: "write the program to",
                    message: "writer thread panicked".to_string(),
                });
            }
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() && stdout.trim().is_empty() && !stderr.contains("timeout") {
            return Err(VerifierError::Exit {
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok((stdout, stderr))
    }
}

fn io_error(action: &'static str, err: &std::io::Error) -> VerifierError {
    VerifierError::Io {
        action,
        message: err.to_string(),
    }
}

impl VerifierBackend for ProcessBackend {
    fn verify(&self, program: &Program, procedure: &str) -> Result<VerifierResult, VerifierError> {
        let (stdout, stderr) = self.run(&self.config.verify_args(procedure), &program.to_string())?;
        parse_verdict(&stdout, &stderr)
    }

    fn refute_candidates(
        &self,
        program: &Program,
        guards: &[String],
    ) -> Result<Vec<String>, VerifierError> {
        if guards.is_empty() {
            return Ok(Vec::new());
        }
        let (stdout, stderr) = self.run(&self.config.refute_args(guards), &program.to_string())?;
        parse_refutation(&stdout, &stderr, guards)
    }
}
