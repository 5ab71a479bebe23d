//! Named constants for ttrpc service and method strings.
//!
//! ttrpc addresses a call by a (service, method) pair rather than a single
//! path, so both halves are exported. `METHOD_*` keys are the
//! `service/method` form used by the `call` subcommand's lookup table.

// ---------------------------------------------------------------------------
// containerd.task.v2.Task
// ---------------------------------------------------------------------------

/// Fully qualified name of the containerd task service.
pub const TASK_SERVICE: &str = "containerd.task.v2.Task";

pub const STATE: &str = "State";
pub const CREATE: &str = "Create";
pub const START: &str = "Start";
pub const DELETE: &str = "Delete";
pub const PIDS: &str = "Pids";
pub const PAUSE: &str = "Pause";
pub const RESUME: &str = "Resume";
pub const KILL: &str = "Kill";
pub const EXEC: &str = "Exec";
pub const RESIZE_PTY: &str = "ResizePty";
pub const CLOSE_IO: &str = "CloseIO";
pub const WAIT: &str = "Wait";
pub const CONNECT: &str = "Connect";
pub const SHUTDOWN: &str = "Shutdown";

/// `containerd.task.v2.Task/State`
pub const METHOD_STATE: &str = "containerd.task.v2.Task/State";

/// `containerd.task.v2.Task/Create`
pub const METHOD_CREATE: &str = "containerd.task.v2.Task/Create";

/// `containerd.task.v2.Task/Start`
pub const METHOD_START: &str = "containerd.task.v2.Task/Start";

/// `containerd.task.v2.Task/Delete`
pub const METHOD_DELETE: &str = "containerd.task.v2.Task/Delete";

/// `containerd.task.v2.Task/Pids`
pub const METHOD_PIDS: &str = "containerd.task.v2.Task/Pids";

/// `containerd.task.v2.Task/Pause`
pub const METHOD_PAUSE: &str = "containerd.task.v2.Task/Pause";

/// `containerd.task.v2.Task/Resume`
pub const METHOD_RESUME: &str = "containerd.task.v2.Task/Resume";

/// `containerd.task.v2.Task/Kill`
pub const METHOD_KILL: &str = "containerd.task.v2.Task/Kill";

/// `containerd.task.v2.Task/Exec`
pub const METHOD_EXEC: &str = "containerd.task.v2.Task/Exec";

/// `containerd.task.v2.Task/ResizePty`
pub const METHOD_RESIZE_PTY: &str = "containerd.task.v2.Task/ResizePty";

/// `containerd.task.v2.Task/CloseIO`
pub const METHOD_CLOSE_IO: &str = "containerd.task.v2.Task/CloseIO";

/// `containerd.task.v2.Task/Wait`
pub const METHOD_WAIT: &str = "containerd.task.v2.Task/Wait";

/// `containerd.task.v2.Task/Connect`
pub const METHOD_CONNECT: &str = "containerd.task.v2.Task/Connect";

/// `containerd.task.v2.Task/Shutdown`
pub const METHOD_SHUTDOWN: &str = "containerd.task.v2.Task/Shutdown";
