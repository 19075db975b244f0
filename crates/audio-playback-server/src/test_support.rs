//! Fake player executables and polling helpers shared by unit tests.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Write an executable `/bin/sh` script and return its path as a string.
#[cfg(unix)]
pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod script");
    path.to_string_lossy().into_owned()
}

/// Runs until signalled.
#[cfg(unix)]
pub(crate) fn sleeping_player(dir: &Path) -> String {
    write_script(dir, "sleeping-player", "exec sleep 30")
}

/// Exits right away, like a player reaching the end of a short file.
#[cfg(unix)]
pub(crate) fn quick_player(dir: &Path) -> String {
    write_script(dir, "quick-player", "exit 0")
}

/// Ignores SIGTERM so only a kill stops it.
#[cfg(unix)]
pub(crate) fn stubborn_player(dir: &Path) -> String {
    write_script(
        dir,
        "stubborn-player",
        "trap '' TERM\nwhile true; do sleep 0.05; done",
    )
}

/// Records its arguments (one per line) to `log`, then sleeps.
#[cfg(unix)]
pub(crate) fn recording_player(dir: &Path, log: &Path) -> String {
    let tmp = log.with_extension("tmp");
    write_script(
        dir,
        "recording-player",
        &format!(
            "printf '%s\\n' \"$@\" > '{tmp}' && mv '{tmp}' '{log}'\nexec sleep 30",
            tmp = tmp.display(),
            log = log.display()
        ),
    )
}

/// Appends one line per launch to `log`, then sleeps.
#[cfg(unix)]
pub(crate) fn counting_player(dir: &Path, log: &Path) -> String {
    write_script(
        dir,
        "counting-player",
        &format!("echo $$ >> '{}'\nexec sleep 30", log.display()),
    )
}

pub(crate) fn read_args(log: &Path) -> Vec<String> {
    std::fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Poll `check` every 20ms for up to five seconds.
pub(crate) async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..250 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// Root directory containing the given empty-ish audio files.
pub(crate) fn audio_root(files: &[&str]) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    for file in files {
        let path = dir.path().join(file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create dirs");
        }
        std::fs::write(&path, b"RIFF").expect("write audio");
    }
    let root = dir.path().canonicalize().expect("canonical root");
    (dir, root)
}
