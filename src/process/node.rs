//! Node-specific launch construction.
//!
//! # Responsibilities
//! - Build the `node` command line (debugger flag, script, pass-through args)
//! - Augment `NODE_PATH` with the working directory's `node_modules`
//! - Re-emit child output lines as events instead of logging them
//!
//! # Design Decisions
//! - A launch-spec builder over the generic supervisor, not a subclass: the
//!   supervisor stays tool-agnostic and this module owns everything Node
//! - Output events go through an unbounded channel; the host decides what
//!   compilation status or errors mean

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::lifecycle::Shutdown;
use crate::process::supervisor::{
    Completion, LaunchSpec, OutputListener, ProcessError, ProcessSupervisor,
};

/// Environment variable holding Node's module search path.
pub const NODE_PATH_VAR: &str = "NODE_PATH";

/// Environment variable through which the host hands the child the path of
/// its serialized options file.
pub const OPTIONS_FILE_VAR: &str = "DEV_BRIDGE_OPTIONS_FILE";

/// Environment variable through which the host tells the child which pid to
/// watch for liveness.
pub const PARENT_PID_VAR: &str = "DEV_BRIDGE_PARENT_PID";

const NODE_MODULES_DIR: &str = "node_modules";

/// Separator for `PATH`-style environment variable lists.
const PATH_LIST_SEPARATOR: char = if cfg!(windows) { ';' } else { ':' };

/// One line of child output, tagged by stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Description of the Node script to run.
#[derive(Debug, Clone)]
pub struct NodeScript {
    pub script: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: HashMap<String, String>,
    /// Launch Node with `--inspect-brk` so a debugger can attach before the
    /// script runs.
    pub inspect_brk: bool,
}

impl NodeScript {
    /// `[--inspect-brk] <script> [args…]`
    fn command_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.args.len() + 2);
        if self.inspect_brk {
            args.push("--inspect-brk".to_string());
        }
        args.push(self.script.display().to_string());
        args.extend(self.args.iter().cloned());
        args
    }
}

/// A supervised Node dev-server process.
///
/// Launching hands back the completion future and the output event stream;
/// the value itself is the handle that keeps the process owned — dropping it
/// (or calling [`dispose`](Self::dispose)) tears the process down.
pub struct NodeDevServer {
    supervisor: ProcessSupervisor,
}

impl NodeDevServer {
    /// Launch `node` for the given script under supervision.
    pub fn launch(
        script: NodeScript,
        shutdown: Shutdown,
    ) -> Result<(Self, Completion, mpsc::UnboundedReceiver<OutputLine>), ProcessError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let spec = launch_spec(&script, std::env::var(NODE_PATH_VAR).ok().as_deref());

        let supervisor = ProcessSupervisor::new();
        let completion = supervisor.launch(spec, Arc::new(ChannelOutput { tx }), shutdown)?;

        Ok((Self { supervisor }, completion, rx))
    }

    /// Tear down the process. Idempotent; also happens on drop.
    pub fn dispose(&self) {
        self.supervisor.dispose();
    }
}

/// Listener that re-emits lines as [`OutputLine`] events. Send failures mean
/// the receiver is gone and the lines have nowhere to go; they are dropped.
struct ChannelOutput {
    tx: mpsc::UnboundedSender<OutputLine>,
}

impl OutputListener for ChannelOutput {
    fn on_stdout(&self, line: &str) {
        let _ = self.tx.send(OutputLine::Stdout(line.to_string()));
    }

    fn on_stderr(&self, line: &str) {
        let _ = self.tx.send(OutputLine::Stderr(line.to_string()));
    }
}

fn launch_spec(script: &NodeScript, ambient_node_path: Option<&str>) -> LaunchSpec {
    let mut env = script.env.clone();
    env.insert(
        NODE_PATH_VAR.to_string(),
        node_path_value(&script.env, ambient_node_path, &script.working_dir),
    );

    LaunchSpec {
        command: "node".to_string(),
        args: script.command_args(),
        working_dir: script.working_dir.clone(),
        env,
    }
}

/// Compute the augmented `NODE_PATH`: caller-supplied value, else the
/// ambient one, else empty; then the separator (only when non-empty) and the
/// working directory's `node_modules`.
fn node_path_value(
    overrides: &HashMap<String, String>,
    ambient: Option<&str>,
    working_dir: &Path,
) -> String {
    let mut node_path = overrides
        .get(NODE_PATH_VAR)
        .cloned()
        .filter(|value| !value.is_empty())
        .or_else(|| ambient.map(str::to_string).filter(|value| !value.is_empty()))
        .unwrap_or_default();

    if !node_path.is_empty() {
        node_path.push(PATH_LIST_SEPARATOR);
    }
    node_path.push_str(&working_dir.join(NODE_MODULES_DIR).display().to_string());
    node_path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(inspect: bool) -> NodeScript {
        NodeScript {
            script: PathBuf::from("server.js"),
            args: vec!["--port".to_string(), "8090".to_string()],
            working_dir: PathBuf::from("/srv/app"),
            env: HashMap::new(),
            inspect_brk: inspect,
        }
    }

    #[test]
    fn command_args_without_debugging() {
        assert_eq!(
            script(false).command_args(),
            vec!["server.js", "--port", "8090"]
        );
    }

    #[test]
    fn command_args_with_debugging_puts_flag_first() {
        assert_eq!(
            script(true).command_args(),
            vec!["--inspect-brk", "server.js", "--port", "8090"]
        );
    }

    #[test]
    fn node_path_without_existing_value_has_no_separator() {
        let value = node_path_value(&HashMap::new(), None, Path::new("/srv/app"));
        assert_eq!(value, "/srv/app/node_modules");
    }

    #[test]
    fn node_path_appends_to_caller_override() {
        let mut overrides = HashMap::new();
        overrides.insert(NODE_PATH_VAR.to_string(), "/opt/libs".to_string());

        let value = node_path_value(&overrides, Some("/ignored"), Path::new("/srv/app"));
        assert_eq!(
            value,
            format!("/opt/libs{PATH_LIST_SEPARATOR}/srv/app/node_modules")
        );
    }

    #[test]
    fn node_path_falls_back_to_ambient_value() {
        let value = node_path_value(&HashMap::new(), Some("/usr/lib/node"), Path::new("/srv/app"));
        assert_eq!(
            value,
            format!("/usr/lib/node{PATH_LIST_SEPARATOR}/srv/app/node_modules")
        );
    }

    #[test]
    fn empty_override_falls_through_to_ambient() {
        let mut overrides = HashMap::new();
        overrides.insert(NODE_PATH_VAR.to_string(), String::new());

        let value = node_path_value(&overrides, Some("/usr/lib/node"), Path::new("/srv/app"));
        assert_eq!(
            value,
            format!("/usr/lib/node{PATH_LIST_SEPARATOR}/srv/app/node_modules")
        );
    }
}
