//! OCI runtime spec builder.
//!
//! Only the subset of the runtime-spec the agent's runc shim reads. Field
//! names and omission rules follow the runtime-spec JSON schema.

use serde::{Deserialize, Serialize};

pub const OCI_VERSION: &str = "1.0.2";

const DEFAULT_ROOTFS_PATH: &str = "rootfs";
const DEFAULT_PATH_ENV: &str = "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

const DEFAULT_CAPS: &[&str] = &[
    "CAP_CHOWN",
    "CAP_DAC_OVERRIDE",
    "CAP_FSETID",
    "CAP_FOWNER",
    "CAP_MKNOD",
    "CAP_NET_RAW",
    "CAP_SETGID",
    "CAP_SETUID",
    "CAP_SETFCAP",
    "CAP_SETPCAP",
    "CAP_NET_BIND_SERVICE",
    "CAP_SYS_CHROOT",
    "CAP_KILL",
    "CAP_AUDIT_WRITE",
];

const PRIVILEGED_CAPS: &[&str] = &[
    "CAP_CHOWN",
    "CAP_DAC_OVERRIDE",
    "CAP_DAC_READ_SEARCH",
    "CAP_FOWNER",
    "CAP_FSETID",
    "CAP_KILL",
    "CAP_SETGID",
    "CAP_SETUID",
    "CAP_SETPCAP",
    "CAP_LINUX_IMMUTABLE",
    "CAP_NET_BIND_SERVICE",
    "CAP_NET_BROADCAST",
    "CAP_NET_ADMIN",
    "CAP_NET_RAW",
    "CAP_IPC_LOCK",
    "CAP_IPC_OWNER",
    "CAP_SYS_MODULE",
    "CAP_SYS_RAWIO",
    "CAP_SYS_CHROOT",
    "CAP_SYS_PTRACE",
    "CAP_SYS_PACCT",
    "CAP_SYS_ADMIN",
    "CAP_SYS_BOOT",
    "CAP_SYS_NICE",
    "CAP_SYS_RESOURCE",
    "CAP_SYS_TIME",
    "CAP_SYS_TTY_CONFIG",
    "CAP_MKNOD",
    "CAP_LEASE",
    "CAP_AUDIT_WRITE",
    "CAP_AUDIT_CONTROL",
    "CAP_SETFCAP",
    "CAP_MAC_OVERRIDE",
    "CAP_MAC_ADMIN",
    "CAP_SYSLOG",
    "CAP_WAKE_ALARM",
    "CAP_BLOCK_SUSPEND",
    "CAP_AUDIT_READ",
];

/// Capability set for `--priv` (every capability) or the container default.
pub fn capabilities(privileged: bool) -> Vec<String> {
    let caps = if privileged {
        PRIVILEGED_CAPS
    } else {
        DEFAULT_CAPS
    };
    caps.iter().map(ToString::to_string).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spec {
    pub oci_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<Process>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<Root>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linux: Option<Linux>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub terminal: bool,
    pub user: User,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    pub cwd: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<LinuxCapabilities>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub no_new_privileges: bool,
}

impl Process {
    /// A process running `args` as `uid:gid` in `cwd` with the default or
    /// privileged capability set.
    pub fn new(args: Vec<String>, uid: u32, gid: u32, cwd: impl Into<String>, privileged: bool) -> Self {
        Self {
            user: User { uid, gid },
            args,
            cwd: cwd.into(),
            capabilities: Some(LinuxCapabilities::uniform(capabilities(privileged))),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinuxCapabilities {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bounding: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effective: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permitted: Vec<String>,
}

impl LinuxCapabilities {
    /// Same set for bounding, effective and permitted.
    pub fn uniform(caps: Vec<String>) -> Self {
        Self {
            bounding: caps.clone(),
            effective: caps.clone(),
            permitted: caps,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Root {
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub destination: String,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl Mount {
    fn new(destination: &str, kind: &str, source: &str, options: &[&str]) -> Self {
        Self {
            destination: destination.to_string(),
            kind: kind.to_string(),
            source: source.to_string(),
            options: options.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Linux {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cgroups_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<LinuxResources>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<LinuxNamespace>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinuxResources {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<LinuxDeviceCgroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinuxDeviceCgroup {
    pub allow: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinuxNamespace {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
}

impl LinuxNamespace {
    fn new(kind: &str, path: &str) -> Self {
        Self {
            kind: kind.to_string(),
            path: path.to_string(),
        }
    }
}

/// The default container spec: root filesystem at `rootfs`, pid/ipc/uts/
/// mount/network namespaces (pid joined at `pid_ns_path` when non-empty),
/// the standard pseudo-filesystem mounts, and cgroup path `/<ns>/<id>`.
pub fn default_spec(namespace: &str, id: &str, pid_ns_path: &str, privileged: bool) -> Spec {
    Spec {
        oci_version: OCI_VERSION.to_string(),
        process: Some(Process {
            env: vec![DEFAULT_PATH_ENV.to_string()],
            ..Process::new(Vec::new(), 0, 0, "/", privileged)
        }),
        root: Some(Root {
            path: DEFAULT_ROOTFS_PATH.to_string(),
        }),
        mounts: default_mounts(),
        linux: Some(Linux {
            cgroups_path: cgroups_path(namespace, id),
            resources: Some(LinuxResources {
                devices: vec![LinuxDeviceCgroup {
                    allow: true,
                    access: "rwm".to_string(),
                }],
            }),
            namespaces: vec![
                LinuxNamespace::new("pid", pid_ns_path),
                LinuxNamespace::new("ipc", ""),
                LinuxNamespace::new("uts", ""),
                LinuxNamespace::new("mount", ""),
                LinuxNamespace::new("network", ""),
            ],
        }),
    }
}

fn default_mounts() -> Vec<Mount> {
    vec![
        Mount::new("/proc", "proc", "proc", &["nosuid", "noexec", "nodev"]),
        Mount::new(
            "/dev",
            "tmpfs",
            "tmpfs",
            &["nosuid", "strictatime", "mode=755", "size=65536k"],
        ),
        Mount::new(
            "/dev/pts",
            "devpts",
            "devpts",
            &[
                "nosuid",
                "noexec",
                "newinstance",
                "ptmxmode=0666",
                "mode=0620",
                "gid=5",
            ],
        ),
        Mount::new(
            "/dev/shm",
            "tmpfs",
            "shm",
            &["nosuid", "noexec", "nodev", "mode=1777", "size=65536k"],
        ),
        Mount::new("/dev/mqueue", "mqueue", "mqueue", &["nosuid", "noexec", "nodev"]),
        Mount::new("/sys", "sysfs", "sysfs", &["nosuid", "noexec", "nodev", "rw"]),
        Mount::new(
            "/sys/fs/cgroup",
            "cgroup",
            "cgroup",
            &["nosuid", "noexec", "nodev", "rw"],
        ),
    ]
}

/// `/<ns>/<id>`, skipping empty segments.
fn cgroups_path(namespace: &str, id: &str) -> String {
    let mut path = String::new();
    for segment in [namespace, id] {
        let segment = segment.trim_matches('/');
        if !segment.is_empty() {
            path.push('/');
            path.push_str(segment);
        }
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn default_capabilities_are_a_subset_of_privileged() {
        let default = capabilities(false);
        let privileged = capabilities(true);
        assert_eq!(default.len(), 14);
        assert_eq!(privileged.len(), 38);
        assert!(default.iter().all(|cap| privileged.contains(cap)));
    }

    #[test]
    fn cgroup_path_joins_namespace_and_id() {
        assert_eq!(cgroups_path("ns", "abc"), "/ns/abc");
        assert_eq!(cgroups_path("", "abc"), "/abc");
        assert_eq!(cgroups_path("", ""), "/");
    }

    #[test]
    fn default_spec_shape() {
        let spec = default_spec("default", "c1", "/proc/1/ns/pid", false);
        let linux = spec.linux.as_ref().unwrap();
        assert_eq!(linux.cgroups_path, "/default/c1");
        assert_eq!(linux.namespaces[0].path, "/proc/1/ns/pid");
        assert_eq!(linux.namespaces.len(), 5);
        assert_eq!(spec.mounts.len(), 7);
        assert_eq!(spec.root.as_ref().unwrap().path, "rootfs");

        let process = spec.process.as_ref().unwrap();
        assert_eq!(process.cwd, "/");
        assert_eq!(process.env, vec![DEFAULT_PATH_ENV.to_string()]);
    }

    #[test]
    fn json_uses_runtime_spec_names_and_omits_empty_fields() {
        let spec = default_spec("", "c1", "", false);
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["ociVersion"], OCI_VERSION);
        assert_eq!(json["linux"]["cgroupsPath"], "/c1");
        assert_eq!(json["linux"]["namespaces"][0], serde_json::json!({"type": "pid"}));
        assert_eq!(json["mounts"][0]["type"], "proc");
        assert!(json["process"].get("noNewPrivileges").is_none());
        assert!(json["process"].get("args").is_none());
    }

    #[test]
    fn user_mounts_parse_from_runtime_spec_json() {
        let mounts: Vec<Mount> = serde_json::from_str(
            r#"[{"destination": "/data", "type": "bind", "source": "/mnt/data", "options": ["rbind"]}]"#,
        )
        .unwrap();
        assert_eq!(mounts[0].kind, "bind");
        assert_eq!(mounts[0].options, vec!["rbind"]);
    }
}
