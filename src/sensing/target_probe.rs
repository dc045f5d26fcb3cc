use sysinfo::{Process, ProcessRefreshKind, ProcessesToUpdate, System};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// Checks whether the supervised application is still running.
///
/// Matches processes whose name or executable path contains any configured
/// fragment, case-insensitively. The supervisor's own process never counts.
pub struct TargetProbe {
    system: System,
    fragments: Vec<String>,
    own_pid: u32,
}

impl TargetProbe {
    pub fn new(fragments: Vec<String>) -> Self {
        Self {
            system: System::new(),
            fragments: fragments
                .into_iter()
                .map(|fragment| fragment.trim().to_lowercase())
                .filter(|fragment| !fragment.is_empty())
                .collect(),
            own_pid: std::process::id(),
        }
    }

    pub fn describe(&self) -> String {
        self.fragments.join("|")
    }

    pub fn is_alive(&mut self) -> bool {
        if self.fragments.is_empty() {
            return true;
        }

        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            ProcessRefreshKind::everything(),
        );

        let found = self
            .system
            .processes()
            .iter()
            .filter(|(pid, _)| pid.as_u32() != self.own_pid)
            .find(|(_, process)| self.matches(process));

        match found {
            Some((pid, _)) => {
                log_debug!("target alive as pid {}", pid.as_u32());
                true
            }
            None => false,
        }
    }

    fn matches(&self, process: &Process) -> bool {
        let name = process.name().to_string_lossy();
        let exe = process.exe().map(|path| path.to_string_lossy());
        matches_fragments(&self.fragments, &name, exe.as_deref())
    }
}

fn matches_fragments(fragments: &[String], name: &str, exe: Option<&str>) -> bool {
    let name = name.to_lowercase();
    let exe = exe.map(str::to_lowercase);
    fragments.iter().any(|fragment| {
        name.contains(fragment.as_str())
            || exe
                .as_deref()
                .is_some_and(|exe| exe.contains(fragment.as_str()))
    })
}
