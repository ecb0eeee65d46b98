//! Administrative control over backend server processes.
//!
//! Only used to clean up after a crashed or abandoned session, never while
//! ticking.

use crate::error::ProcessError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerProcess {
    pub pid: u32,
    pub name: String,
}

pub trait ProcessControl {
    /// Lists processes whose name contains `pattern`, ignoring case
    fn list(&self, pattern: &str) -> Result<Vec<ServerProcess>, ProcessError>;

    /// Forcibly terminates a process
    fn kill(&self, pid: u32) -> Result<(), ProcessError>;
}

/// Kills every process matching `pattern` and returns how many were killed.
pub fn kill_all_servers(control: &dyn ProcessControl, pattern: &str) -> Result<usize, ProcessError> {
    let processes = control.list(pattern)?;
    for process in &processes {
        tracing::warn!("Killing server process {} ({})", process.pid, process.name);
        control.kill(process.pid)?;
    }
    Ok(processes.len())
}

/// Process control backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessControl;

impl ProcessControl for SystemProcessControl {
    #[cfg(target_os = "linux")]
    fn list(&self, pattern: &str) -> Result<Vec<ServerProcess>, ProcessError> {
        let pattern = pattern.to_lowercase();
        let own_pid = std::process::id();
        let mut processes = Vec::new();

        for entry in std::fs::read_dir("/proc")? {
            let entry = entry?;
            let Some(pid) = entry.file_name().to_str().and_then(|name| name.parse::<u32>().ok())
            else {
                continue;
            };
            if pid == own_pid {
                continue;
            }
            // Processes may exit while we scan.
            let Ok(comm) = std::fs::read_to_string(entry.path().join("comm")) else {
                continue;
            };
            let name = comm.trim().to_string();
            if name.to_lowercase().contains(&pattern) {
                processes.push(ServerProcess { pid, name });
            }
        }

        processes.sort_by_key(|process| process.pid);
        Ok(processes)
    }

    #[cfg(not(target_os = "linux"))]
    fn list(&self, _pattern: &str) -> Result<Vec<ServerProcess>, ProcessError> {
        Ok(Vec::new())
    }

    #[cfg(unix)]
    fn kill(&self, pid: u32) -> Result<(), ProcessError> {
        let raw_pid = libc::pid_t::try_from(pid).map_err(|_| ProcessError::Kill {
            pid,
            message: "pid out of range".to_string(),
        })?;
        let rc = unsafe { libc::kill(raw_pid, libc::SIGKILL) };
        if rc != 0 {
            return Err(ProcessError::Kill {
                pid,
                message: std::io::Error::last_os_error().to_string(),
            });
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn kill(&self, _pid: u32) -> Result<(), ProcessError> {
        Err(ProcessError::Unsupported)
    }
}
