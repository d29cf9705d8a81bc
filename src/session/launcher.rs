//! Child process launchers.
//!
//! Both launches are asynchronous in the process sense: they return as
//! soon as the OS confirms process creation, before the child finishes
//! its own initialization. Readiness is only guaranteed after the start
//! and cache-ready events fire.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::info;

use crate::config::GlobalConfig;
use crate::handoff::ConfigHandle;
use crate::ipc::IpcChannelSet;
use crate::session::handle::{ProcessHandle, ProcessRole};
use crate::{Result, SessionError};

/// Append-mode log file for the scheduler, inside `log_dir`.
const SCHEDULER_LOG_FILE: &str = "sched.log";

/// Start the external scheduler executable.
///
/// Invoked as `<bin> [args..] --config <snapshot>`, with stdout and
/// stderr redirected to the append-mode scheduler log.
///
/// # Errors
///
/// Returns `SessionError::Launch` if the log sink cannot be opened or the
/// executable cannot be found or started. Fatal to the session.
pub fn launch_scheduler(config: &GlobalConfig, handle: &ConfigHandle) -> Result<ProcessHandle> {
    std::fs::create_dir_all(&config.log_dir).map_err(|err| {
        SessionError::Launch(format!(
            "cannot create log dir '{}': {err}",
            config.log_dir.display()
        ))
    })?;
    let log_path = config.log_dir.join(SCHEDULER_LOG_FILE);
    let log_out = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|err| {
            SessionError::Launch(format!(
                "cannot open scheduler log '{}': {err}",
                log_path.display()
            ))
        })?;
    let log_err = log_out.try_clone().map_err(|err| {
        SessionError::Launch(format!("cannot clone scheduler log handle: {err}"))
    })?;

    let mut cmd = Command::new(&config.scheduler.bin);
    cmd.args(&config.scheduler.args)
        .arg("--config")
        .arg(handle.path())
        .stdin(Stdio::null())
        .stdout(Stdio::from(log_out))
        .stderr(Stdio::from(log_err))
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|err| {
        SessionError::Launch(format!(
            "failed to spawn scheduler '{}': {err}",
            config.scheduler.bin.display()
        ))
    })?;

    let handle = ProcessHandle::new(ProcessRole::Scheduler, child);
    info!(
        pid = handle.pid(),
        bin = %config.scheduler.bin.display(),
        log = %log_path.display(),
        "scheduler process started"
    );
    Ok(handle)
}

/// Start the serving child.
///
/// The child is a re-execution of the session binary (or the configured
/// override) with the IPC attachment passed as arguments; the live
/// configuration is streamed over the child's stdin rather than through a
/// snapshot path, because the serving process participates in the same
/// channel set instead of merely reading static configuration.
///
/// # Errors
///
/// Returns `SessionError::Launch` if the executable cannot be resolved or
/// started, or the config cannot be delivered. Fatal to the session.
pub async fn launch_serving(config: &GlobalConfig, ipc: &IpcChannelSet) -> Result<ProcessHandle> {
    let exe = match &config.serving.command {
        Some(command) => command.clone(),
        None => std::env::current_exe().map_err(|err| {
            SessionError::Launch(format!("cannot resolve own executable: {err}"))
        })?,
    };

    let attach = ipc.attachment();
    let mut cmd = Command::new(&exe);
    cmd.arg("--serving-child")
        .arg("--token-socket")
        .arg(&attach.token_socket)
        .arg("--start-event")
        .arg(&attach.start_event)
        .arg("--cache-ready-event")
        .arg(&attach.cache_ready_event)
        .arg("--broadcast-endpoint")
        .arg(&attach.broadcast_endpoint)
        .args(&config.serving.args)
        .stdin(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|err| {
        SessionError::Launch(format!(
            "failed to spawn serving child '{}': {err}",
            exe.display()
        ))
    })?;

    let rendered = toml::to_string(config).map_err(|err| {
        SessionError::Launch(format!("cannot serialize config for serving child: {err}"))
    })?;
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| SessionError::Launch("failed to capture serving child stdin".into()))?;
    stdin.write_all(rendered.as_bytes()).await.map_err(|err| {
        SessionError::Launch(format!("cannot deliver config to serving child: {err}"))
    })?;
    stdin.shutdown().await.map_err(|err| {
        SessionError::Launch(format!("cannot finish config delivery: {err}"))
    })?;
    drop(stdin);

    let handle = ProcessHandle::new(ProcessRole::Serving, child);
    info!(pid = handle.pid(), exe = %exe.display(), "serving process started");
    Ok(handle)
}
