//! Vagrant invocation for box builds.
//!
//! Every call runs with `VAGRANT_CWD` pointing at the per-build directory so
//! the generated Vagrantfile and `.vagrant/` state stay out of the caller's
//! working directory. Output is captured for diagnostics and echoed to the
//! debug log line by line while the command runs.
use crate::config::Config;
use crate::error::{BoxError, Result};
use crate::util::tail_lines;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const DIAGNOSTIC_TAIL_LINES: usize = 40;

/// Captured result of one vagrant invocation.
#[derive(Debug)]
pub struct VagrantOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Resolved vagrant command line plus per-invocation limits.
#[derive(Debug, Clone)]
pub struct Vagrant {
    program: PathBuf,
    leading_args: Vec<String>,
    timeout: Option<Duration>,
}

impl Vagrant {
    /// Resolve the configured vagrant command on `PATH`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut argv = config.vagrant_argv()?.into_iter();
        let program = argv
            .next()
            .ok_or_else(|| BoxError::Config("vagrant_command must be non-empty".into()))?;
        let resolved = which::which(&program).map_err(|err| BoxError::Build {
            command: program.clone(),
            detail: format!("not found on PATH ({err})"),
        })?;
        Ok(Self {
            program: resolved,
            leading_args: argv.collect(),
            timeout: config.build_timeout_secs.map(Duration::from_secs),
        })
    }

    fn command_line(&self, args: &[&str]) -> String {
        let mut words = vec![self.program.display().to_string()];
        words.extend(self.leading_args.iter().cloned());
        words.extend(args.iter().map(|arg| arg.to_string()));
        shell_words::join(words)
    }

    /// Run `vagrant <args>` for `build_dir`; non-zero exit is a build error.
    pub fn run(
        &self,
        build_dir: &Path,
        env: &[(&str, &str)],
        args: &[&str],
    ) -> Result<VagrantOutput> {
        let output = self.run_unchecked(build_dir, env, args)?;
        if !output.status.success() {
            return Err(BoxError::Build {
                command: self.command_line(args),
                detail: failure_detail(&output),
            });
        }
        Ok(output)
    }

    /// Run `vagrant <args>` and return whatever it produced, success or not.
    pub fn run_unchecked(
        &self,
        build_dir: &Path,
        env: &[(&str, &str)],
        args: &[&str],
    ) -> Result<VagrantOutput> {
        let command_line = self.command_line(args);
        tracing::info!(command = %command_line, "running vagrant");
        let start = Instant::now();

        let mut child = Command::new(&self.program)
            .args(&self.leading_args)
            .args(args)
            .env("VAGRANT_CWD", build_dir)
            .envs(env.iter().copied())
            .current_dir(build_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| BoxError::Build {
                command: command_line.clone(),
                detail: format!("spawn failed: {err}"),
            })?;

        let stdout = child.stdout.take().map(|pipe| capture_lines(pipe, "stdout"));
        let stderr = child.stderr.take().map(|pipe| capture_lines(pipe, "stderr"));

        let status = match self.wait(&mut child) {
            Ok(status) => status,
            Err(detail) => {
                // Readers are left detached: grandchildren may still hold the pipes.
                let _ = child.kill();
                let _ = child.wait();
                return Err(BoxError::Build {
                    command: command_line,
                    detail,
                });
            }
        };

        let output = VagrantOutput {
            status,
            stdout: join_capture(stdout),
            stderr: join_capture(stderr),
        };
        tracing::info!(
            command = %command_line,
            elapsed_ms = start.elapsed().as_millis(),
            status = %output.status,
            "vagrant finished"
        );
        Ok(output)
    }

    fn wait(&self, child: &mut Child) -> std::result::Result<ExitStatus, String> {
        let Some(timeout) = self.timeout else {
            return child.wait().map_err(|err| format!("wait failed: {err}"));
        };
        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if Instant::now() >= deadline => {
                    return Err(format!("timed out after {}s", timeout.as_secs()));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(err) => return Err(format!("wait failed: {err}")),
            }
        }
    }
}

fn capture_lines<R: Read + Send + 'static>(pipe: R, stream: &'static str) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut captured = String::new();
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line);
                    tracing::debug!(stream, "{}", text.trim_end());
                    captured.push_str(&text);
                }
            }
        }
        captured
    })
}

fn join_capture(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn failure_detail(output: &VagrantOutput) -> String {
    let status = match output.status.code() {
        Some(code) => format!("exit code {code}"),
        None => format!("terminated ({})", output.status),
    };
    let diagnostics = if output.stderr.trim().is_empty() {
        &output.stdout
    } else {
        &output.stderr
    };
    if diagnostics.trim().is_empty() {
        status
    } else {
        format!("{status}\n{}", tail_lines(diagnostics, DIAGNOSTIC_TAIL_LINES))
    }
}
