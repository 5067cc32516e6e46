use std::collections::{HashMap, HashSet};
use std::time::Duration;

use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, Signal, System};

const KILL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Check whether a process is still running. Zombies waiting to be reaped
/// count as dead.
pub fn process_alive(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    still_alive(&system, Pid::from_u32(pid))
}

fn still_alive(system: &System, pid: Pid) -> bool {
    match system.process(pid) {
        Some(process) => process.status() != ProcessStatus::Zombie,
        None => false,
    }
}

/// Terminate a process and everything it transitively spawned.
///
/// Sends a graceful signal to every process in the tree (descendants before
/// the root), waits up to `grace` for them to go away, then force-kills any
/// survivors. Best effort throughout: processes that exit on their own while
/// this runs are simply skipped.
pub async fn terminate_tree(root_pid: u32, grace: Duration) {
    let root = Pid::from_u32(root_pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let targets = collect_tree(&system, root);
    tracing::debug!(
        "terminating process tree rooted at {} ({} processes)",
        root_pid,
        targets.len()
    );

    for pid in &targets {
        if let Some(process) = system.process(*pid) {
            // kill_with returns None when the platform has no TERM equivalent
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
        }
    }

    let deadline = tokio::time::Instant::now() + grace;
    loop {
        tokio::time::sleep(KILL_POLL_INTERVAL).await;
        system.refresh_processes(ProcessesToUpdate::All, true);
        if targets.iter().all(|pid| !still_alive(&system, *pid)) {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            break;
        }
    }

    system.refresh_processes(ProcessesToUpdate::All, true);
    for pid in &targets {
        if still_alive(&system, *pid) {
            tracing::warn!("process {} survived graceful termination, killing", pid);
            if let Some(process) = system.process(*pid) {
                process.kill();
            }
        }
    }
}

/// Walk the process table from `root` downward. The returned order puts every
/// descendant before its ancestor so the root dies last.
fn collect_tree(system: &System, root: Pid) -> Vec<Pid> {
    let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
    for (pid, process) in system.processes() {
        if let Some(parent) = process.parent() {
            children.entry(parent).or_default().push(*pid);
        }
    }

    let mut order = Vec::new();
    let mut seen: HashSet<Pid> = HashSet::new();
    let mut stack = vec![root];
    while let Some(current) = stack.pop() {
        if !seen.insert(current) {
            continue;
        }
        order.push(current);
        if let Some(kids) = children.get(&current) {
            for child in kids {
                if !seen.contains(child) {
                    stack.push(*child);
                }
            }
        }
    }

    // Reversed pre-order: children always precede their parent.
    order.reverse();
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_alive() {
        assert!(process_alive(std::process::id()));
    }

    #[test]
    fn nonexistent_pid_is_not_alive() {
        // PIDs near the default pid_max are essentially never in use on test hosts
        assert!(!process_alive(u32::MAX - 7));
    }
}
