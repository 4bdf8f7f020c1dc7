//! Guard against running alongside an autopilot that owns the same outputs.

use std::{fs, io, path::Path};

const PROC_ROOT: &str = "/proc";
const AUTOPILOT_PREFIX: &str = "ardu";

/// Name of a running ArduPilot process, if there is one.
pub fn running_autopilot() -> io::Result<Option<String>> {
    find_process(Path::new(PROC_ROOT), AUTOPILOT_PREFIX)
}

/// First process under `proc_root` whose command name starts with `prefix`.
///
/// Entries that vanish or cannot be read while scanning are skipped.
pub fn find_process(proc_root: &Path, prefix: &str) -> io::Result<Option<String>> {
    for entry in fs::read_dir(proc_root)? {
        let Ok(entry) = entry else { continue };
        let is_pid = entry
            .file_name()
            .to_str()
            .is_some_and(|name| !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()));
        if !is_pid {
            continue;
        }
        let Ok(comm) = fs::read_to_string(entry.path().join("comm")) else {
            continue;
        };
        let comm = comm.trim();
        if comm.starts_with(prefix) {
            return Ok(Some(comm.to_string()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_proc(entries: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (pid, comm) in entries {
            let path = dir.path().join(pid);
            fs::create_dir(&path).unwrap();
            fs::write(path.join("comm"), format!("{comm}\n")).unwrap();
        }
        dir
    }

    #[test]
    fn finds_arducopter() {
        let proc = fake_proc(&[("1", "systemd"), ("412", "arducopter"), ("self", "ardufake")]);
        assert_eq!(
            find_process(proc.path(), AUTOPILOT_PREFIX).unwrap(),
            Some("arducopter".to_string())
        );
    }

    #[test]
    fn ignores_other_processes() {
        let proc = fake_proc(&[("1", "systemd"), ("77", "rover"), ("net", "arduino")]);
        assert_eq!(find_process(proc.path(), AUTOPILOT_PREFIX).unwrap(), None);
    }

    #[test]
    fn missing_proc_is_an_error() {
        assert!(find_process(Path::new("/nonexistent/proc"), AUTOPILOT_PREFIX).is_err());
    }
}
