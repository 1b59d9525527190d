//! Companion process launch
//!
//! The companion is launched with its registered name, the persisted
//! window allocation as a single JSON argument, an optional debug flag,
//! a mode token, and the hub endpoint to dial back. It runs in its own
//! process group so terminating it never touches the host's tree.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use tracing::debug;

/// Fixed mode token passed to the companion
pub const LAUNCH_MODE: &str = "fixed";

/// Everything needed to launch the companion process
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Companion executable path
    pub executable: PathBuf,
    /// Registered hub name (`-n`)
    pub name: String,
    /// JSON-encoded window allocation (`-a`)
    pub allocation_json: String,
    /// Enable companion-side debug output (`-d`)
    pub debug: bool,
    /// Hub endpoint the companion dials back
    pub hub_uri: String,
}

impl LaunchSpec {
    /// Argument vector in the order the companion expects
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-n".into(),
            self.name.clone().into(),
            "-a".into(),
            self.allocation_json.clone().into(),
        ];
        if self.debug {
            args.push("-d".into());
        }
        args.push(LAUNCH_MODE.into());
        args.push(self.hub_uri.clone().into());
        args
    }
}

/// Opaque handle to a launched companion process
pub trait CompanionProcess: Send {
    /// Process identifier
    fn id(&self) -> u32;

    /// Exit code if the process has exited; stable across repeated polls
    fn poll_exit(&mut self) -> Option<i32>;

    /// Force-terminate the process
    fn kill(&mut self) -> std::io::Result<()>;
}

/// Launch seam so supervision is testable without real processes
pub trait CompanionLauncher: Send + Sync {
    fn launch(&self, spec: &LaunchSpec) -> std::io::Result<Box<dyn CompanionProcess>>;
}

/// OS launcher backed by `std::process`
pub struct OsLauncher;

impl CompanionLauncher for OsLauncher {
    fn launch(&self, spec: &LaunchSpec) -> std::io::Result<Box<dyn CompanionProcess>> {
        let mut command = Command::new(&spec.executable);
        command
            .args(spec.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Own process group: terminating the companion must be
        // independent of the host's process tree.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            command.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        let child = command.spawn()?;
        debug!(pid = child.id(), executable = %spec.executable.display(), "companion process spawned");
        Ok(Box::new(OsProcess { child, exit: None }))
    }
}

struct OsProcess {
    child: Child,
    exit: Option<i32>,
}

impl CompanionProcess for OsProcess {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn poll_exit(&mut self) -> Option<i32> {
        if self.exit.is_some() {
            return self.exit;
        }
        match self.child.try_wait() {
            // A signaled exit has no code; report it as abnormal.
            Ok(Some(status)) => {
                self.exit = Some(status.code().unwrap_or(-1));
                self.exit
            }
            Ok(None) => None,
            Err(_) => None,
        }
    }

    fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill()
    }
}
