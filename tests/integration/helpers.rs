//! Shared helpers for integration tests that spawn real child processes.

use std::path::{Path, PathBuf};

use inferd::config::GlobalConfig;

/// Write an executable shell script into `dir` and return its path.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&path)
            .expect("script metadata")
            .permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).expect("chmod script");
    }

    path
}

/// Config whose children are the given executables, tuned for fast tests:
/// 1 s monitor polls and a 2 s shutdown grace.
pub fn test_config(scheduler_bin: &Path, serving_command: &Path, log_dir: &Path) -> GlobalConfig {
    let toml = format!(
        r#"
model_name = "test-model"
log_dir = '{log_dir}'
token_channel_capacity = 64
shutdown_grace_seconds = 2
monitor_poll_seconds = 1

[scheduler]
bin = '{scheduler}'

[serving]
command = '{serving}'
"#,
        log_dir = log_dir.display(),
        scheduler = scheduler_bin.display(),
        serving = serving_command.display(),
    );
    GlobalConfig::from_toml_str(&toml).expect("valid test config")
}
