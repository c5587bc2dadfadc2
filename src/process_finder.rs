//! Process discovery for background targeting.
//!
//! Resolves a process name to an opaque [`ProcessRef`] that rides along in
//! the click configuration. The engine never inspects the handle itself; it
//! only passes it to the click-injection dependency, which may use it to
//! deliver clicks to an unfocused window.

use serde::{Deserialize, Serialize};
use sysinfo::{ProcessesToUpdate, System};

use crate::error::Result;

/// Opaque handle to a resolved target process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRef {
    pid: u32,
    name: String,
}

impl ProcessRef {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Finds running processes by name using the `sysinfo` crate.
///
/// # Example
///
/// ```
/// use precision_clicker::ProcessFinder;
///
/// let mut finder = ProcessFinder::new();
/// match finder.resolve("notepad") {
///     Ok(Some(target)) => println!("found PID {}", target.pid()),
///     Ok(None) => println!("process not found"),
///     Err(e) => eprintln!("error: {e}"),
/// }
/// ```
pub struct ProcessFinder {
    system: System,
}

impl Clone for ProcessFinder {
    fn clone(&self) -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for ProcessFinder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessFinder {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// Case-insensitive substring match over running process names. Returns
    /// the first match, or `None` when nothing matches.
    pub fn resolve(&mut self, process_name: &str) -> Result<Option<ProcessRef>> {
        self.system.refresh_processes(ProcessesToUpdate::All, true);

        let wanted = process_name.to_lowercase();
        for (pid, process) in self.system.processes() {
            let name = process.name().to_string_lossy();
            if name.to_lowercase().contains(&wanted) {
                return Ok(Some(ProcessRef {
                    pid: pid.as_u32(),
                    name: name.into_owned(),
                }));
            }
        }

        Ok(None)
    }
}
