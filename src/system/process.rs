// src/system/process.rs

use std::{
    io::Read,
    path::Path,
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::{ToolOutput, ToolRunner};
use crate::constants::TOOL_POLL_INTERVAL_SECS;

/// Spawns the tool and polls for completion instead of blocking, so a
/// multi-minute regedit export does not wedge the caller. The child is
/// killed once the deadline passes.
#[derive(Debug, Default)]
pub struct ProcessToolRunner;

/// Reads a pipe to the end on its own thread. The pipes must be drained
/// while the child runs; a child that fills the OS pipe buffer blocks on
/// write and never exits, which the poll loop would read as a timeout.
fn drain(pipe: Option<impl Read + Send + 'static>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

impl ToolRunner for ProcessToolRunner {
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> Result<ToolOutput> {
        debug!(program, ?args, "launching external tool");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to launch '{}'", program))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + timeout;
        let poll = Duration::from_secs(TOOL_POLL_INTERVAL_SECS);

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        warn!(program, "tool exceeded timeout, killing");
                        let _ = child.kill();
                        let _ = child.wait();
                        anyhow::bail!(
                            "'{}' did not finish within {}s and was killed",
                            program,
                            timeout.as_secs()
                        );
                    }
                    thread::sleep(poll.min(deadline.saturating_duration_since(Instant::now())));
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to poll '{}' for completion", program))
                }
            }
        };

        Ok(ToolOutput {
            exit_code: status.code(),
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        })
    }

    fn run_producing(
        &self,
        program: &str,
        args: &[&str],
        dest: &Path,
        timeout: Duration,
    ) -> Result<ToolOutput> {
        let output = self.run(program, args, timeout)?;
        if !dest.exists() {
            debug!(path = %dest.display(), "tool finished but output file is missing");
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_exit_code_and_stdout() {
        let runner = ProcessToolRunner;
        let result = if cfg!(windows) {
            runner.run("cmd", &["/C", "echo hi"], Duration::from_secs(30))
        } else {
            runner.run("echo", &["hi"], Duration::from_secs(30))
        };
        let output = result.expect("tool should run");
        assert!(output.success());
        assert!(output.stdout.contains("hi"));
    }

    #[test]
    fn large_output_does_not_stall_the_tool() {
        let runner = ProcessToolRunner;
        // Well past the OS pipe buffer, so the child only finishes if the
        // runner keeps reading while it waits.
        let result = if cfg!(windows) {
            runner.run(
                "cmd",
                &["/C", "for /L %i in (1,1,20000) do @echo 0123456789"],
                Duration::from_secs(60),
            )
        } else {
            runner.run(
                "sh",
                &[
                    "-c",
                    "i=0; while [ $i -lt 20000 ]; do echo 0123456789; i=$((i+1)); done",
                ],
                Duration::from_secs(60),
            )
        };
        let output = result.expect("tool should run");
        assert!(output.success());
        assert!(output.stdout.len() >= 200_000);
    }

    #[test]
    fn missing_program_is_an_error() {
        let runner = ProcessToolRunner;
        let result = runner.run("definitely-not-a-real-tool", &[], Duration::from_secs(5));
        assert!(result.is_err());
    }
}
