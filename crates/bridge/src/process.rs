//! Octave over pipes
//!
//! `OctaveSession` spawns `octave-cli` and feeds it one line per request.
//! Octave prints no prompt when its input is not a terminal, so every
//! request ends by printing a sentinel line that carries the outcome:
//!
//! ```text
//! try, eval(<code>); disp('<sentinel> ok'); catch matbridge_err, disp(['<sentinel> error ' ...]); end; ...; fflush(stdout);
//! ```
//!
//! Lines read before the sentinel are the request's output, one stdout
//! message per line. Bytes that are not UTF-8 are replaced with U+FFFD.

use crate::kernel::{CellRequest, Completion, HostKernel, KernelError, Message, MessageKind};
use matbridge_codec::quote_str;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tracing::{debug, warn};
use uuid::Uuid;

/// A running Octave process acting as the target kernel
pub struct OctaveSession {
    command: String,
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    warnings: Vec<String>,
}

impl OctaveSession {
    /// Start `command` (program followed by arguments, split on whitespace)
    pub fn spawn(command: &str) -> Result<Self, KernelError> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| KernelError::Protocol("empty Octave command".to_string()))?;

        let mut process = Command::new(program)
            .args(parts)
            .args(["--quiet", "--no-history"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| KernelError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| KernelError::Protocol("Failed to get stdin".to_string()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| KernelError::Protocol("Failed to get stdout".to_string()))?;

        debug!("Started {} (pid {})", command, process.id());
        Ok(OctaveSession {
            command: command.to_string(),
            process,
            stdin,
            stdout: BufReader::new(stdout),
            warnings: Vec::new(),
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Warnings reported through [`HostKernel::warn`] since the last take
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    /// Run `code` and collect its output lines
    pub fn execute(&mut self, code: &str) -> Result<(Completion, Vec<Message>), KernelError> {
        let sentinel = format!("matbridge_{}", Uuid::new_v4().simple());
        let line = wrap_request(code, &sentinel);
        debug!("octave <- {}", line);
        writeln!(self.stdin, "{}", line)?;
        self.stdin.flush()?;

        // Output is not guaranteed to be UTF-8, so read bytes and keep
        // reading to the sentinel even when a line does not decode
        let mut output = Vec::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = self.stdout.read_until(b'\n', &mut buf)?;
            if n == 0 {
                return Err(KernelError::Disconnected);
            }
            let line = String::from_utf8_lossy(&buf).into_owned();
            if let Some(status) = line.trim_end().strip_prefix(sentinel.as_str()) {
                let completion = parse_status(status.trim_start())?;
                return Ok((completion, output));
            }
            output.push(Message::stdout(line));
        }
    }
}

/// One input line that runs `code` and then prints `<sentinel> <status>`
fn wrap_request(code: &str, sentinel: &str) -> String {
    format!(
        "try, eval({code}); disp('{s} ok'); \
         catch matbridge_err, disp(['{s} error ' strrep(matbridge_err.message, char(10), ' ')]); \
         end; clear matbridge_err; fflush(stdout);",
        code = quote_str(code),
        s = sentinel,
    )
}

fn parse_status(status: &str) -> Result<Completion, KernelError> {
    if status == "ok" {
        Ok(Completion::Ok)
    } else if let Some(message) = status.strip_prefix("error") {
        Ok(Completion::Error {
            name: "error".to_string(),
            message: message.trim().to_string(),
        })
    } else {
        Err(KernelError::Protocol(format!(
            "unexpected request status '{}'",
            status
        )))
    }
}

impl HostKernel for OctaveSession {
    fn run_cell(&mut self, request: &CellRequest) -> Result<Completion, KernelError> {
        let (completion, output) = self.execute(&request.code)?;
        if !request.silent {
            for message in &output {
                debug!("octave -> {}", message.text.trim_end());
            }
        }
        if let Completion::Error { message, .. } = &completion {
            let report = match &request.on_error {
                Some(on_error) => format!("{}: {}", on_error, message),
                None => message.clone(),
            };
            self.warn(&report);
        }
        Ok(completion)
    }

    fn get_response(
        &mut self,
        code: &str,
        kinds: &[MessageKind],
        stream: &str,
    ) -> Result<Vec<Message>, KernelError> {
        let (completion, mut output) = self.execute(code)?;
        if let Completion::Error { message, .. } = completion {
            output.push(Message::stderr(message));
        }
        Ok(output
            .into_iter()
            .filter(|m| kinds.contains(&m.kind))
            .filter(|m| m.kind != MessageKind::Stream || m.name == stream)
            .collect())
    }

    fn warn(&mut self, message: &str) {
        warn!("{}", message);
        self.warnings.push(message.to_string());
    }
}

impl Drop for OctaveSession {
    fn drop(&mut self) {
        let _ = writeln!(self.stdin, "exit");
        let _ = self.stdin.flush();

        match self.process.try_wait() {
            Ok(Some(_)) => (),
            _ => {
                let _ = self.process.kill();
                let _ = self.process.wait();
            }
        }
    }
}
