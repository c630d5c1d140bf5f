// ==============================================================================
// exomiser.rs - Exomiser CLI Invocation
// ==============================================================================
// Description: Builds the Java command line and streams merged stdout/stderr
//              line by line until exit or cancellation
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Split};
use tokio::process::Command as TokioCommand;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use exomiser_core::config::ExomiserConfig;

use crate::error::{Result, RunnerError};

/// How a finished process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    Cancelled,
}

/// One fully-resolved Exomiser command line
#[derive(Debug, Clone)]
pub struct ExomiserCommand {
    program: PathBuf,
    args: Vec<OsString>,
    work_dir: Option<PathBuf>,
}

impl ExomiserCommand {
    /// `<java> <memory flags> -jar <jar> --sample <phenopacket> --analysis <config>
    /// [--spring.config.location=<properties>]`
    pub fn new(config: &ExomiserConfig, phenopacket: &Path) -> Self {
        let mut args: Vec<OsString> = config.memory_flags.iter().map(OsString::from).collect();
        args.push("-jar".into());
        args.push(config.jar_path.clone().into_os_string());
        args.push("--sample".into());
        args.push(phenopacket.as_os_str().to_owned());
        args.push("--analysis".into());
        args.push(config.analysis_config.clone().into_os_string());

        if let Some(properties) = &config.application_properties {
            let mut flag = OsString::from("--spring.config.location=");
            flag.push(properties.as_os_str());
            args.push(flag);
        }

        Self {
            program: config.java_bin.clone(),
            args,
            work_dir: config.work_dir.clone(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Shell-like rendering for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|part| part.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion, passing every output line to `on_line`.
    ///
    /// A non-zero exit is `RunnerError::ExitCode`; cancellation kills the
    /// child and returns `ExitOutcome::Cancelled`.
    pub async fn run<F>(&self, mut on_line: F, cancel: &CancellationToken) -> Result<ExitOutcome>
    where
        F: FnMut(&str),
    {
        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.work_dir {
            cmd.current_dir(dir);
        }

        info!("Executing: {}", self.display());

        let mut child = cmd.spawn().map_err(RunnerError::Spawn)?;

        let mut stdout = child.stdout.take().map(segments);
        let mut stderr = child.stderr.take().map(segments);

        while stdout.is_some() || stderr.is_some() {
            let event = tokio::select! {
                _ = cancel.cancelled() => StreamEvent::Cancelled,
                line = next_segment(&mut stdout), if stdout.is_some() => StreamEvent::Stdout(line),
                line = next_segment(&mut stderr), if stderr.is_some() => StreamEvent::Stderr(line),
            };

            match event {
                StreamEvent::Cancelled => {
                    terminate(&mut child).await;
                    return Ok(ExitOutcome::Cancelled);
                }
                StreamEvent::Stdout(Some(line)) | StreamEvent::Stderr(Some(line)) => on_line(&line),
                StreamEvent::Stdout(None) => stdout = None,
                StreamEvent::Stderr(None) => stderr = None,
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                terminate(&mut child).await;
                return Ok(ExitOutcome::Cancelled);
            }
            status = child.wait() => status?,
        };

        if status.success() {
            Ok(ExitOutcome::Success)
        } else {
            match status.code() {
                Some(code) => Err(RunnerError::ExitCode(code)),
                None => Err(RunnerError::Terminated),
            }
        }
    }
}

enum StreamEvent {
    Cancelled,
    Stdout(Option<String>),
    Stderr(Option<String>),
}

fn segments<R: AsyncRead + Unpin>(reader: R) -> Split<BufReader<R>> {
    BufReader::new(reader).split(b'\n')
}

/// Next line of a stream; `None` once it is closed or unreadable
async fn next_segment<R: AsyncRead + Unpin>(stream: &mut Option<Split<BufReader<R>>>) -> Option<String> {
    let stream = stream.as_mut()?;
    match stream.next_segment().await {
        Ok(Some(bytes)) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Ok(None) => None,
        Err(e) => {
            warn!("Error reading Exomiser output: {}", e);
            None
        }
    }
}

async fn terminate(child: &mut tokio::process::Child) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill Exomiser process: {}", e);
    }
}
