//! `create` subcommand: create a container from the default OCI spec.
//!
//! User-facing output uses writeln! to stdout (this is a CLI binary, not debug output).

use std::io::{self, Write};

use anyhow::Context;
use clap::Args;
use tracing::info;

use fcagent_proto::methods::{CREATE, TASK_SERVICE};
use fcagent_proto::task::{CreateTaskRequest, CreateTaskResponse};
use fcagent_proto::{Any, ExtraData, Mount};

use crate::connection::AgentConnection;
use crate::oci;

/// Arguments of `fcagent create`.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Bundle directory inside the VM
    #[arg(long, default_value = "")]
    pub bundle: String,
    /// Root filesystem mount as JSON (`{"type", "source", "target", "options"}`)
    #[arg(long, default_value = "{}")]
    pub rootfs_config: String,
    /// Extra OCI mounts as a JSON array, appended to the defaults
    #[arg(long, default_value = "[]")]
    pub mounts_config: String,
    /// cgroup namespace
    #[arg(long, default_value = "")]
    pub namespace: String,
    /// Path of the PID namespace to join
    #[arg(long, default_value = "")]
    pub pid: String,
    /// Grant every capability
    #[arg(long = "priv")]
    pub privileged: bool,
    /// Command to run in the container
    #[arg(last = true)]
    pub args: Vec<String>,
}

/// Run `fcagent create`.
pub async fn run(conn: &AgentConnection, args: CreateArgs) -> anyhow::Result<()> {
    let id = uuid::Uuid::new_v4().to_string();
    info!(container_id = %id, "Creating container");

    let req = build_request(&id, &args)?;
    let res: CreateTaskResponse = conn
        .call(TASK_SERVICE, CREATE, &req)
        .await
        .context("failure in create call")?;

    info!(container_id = %id, pid = res.pid, "Container created");
    writeln!(io::stdout(), "{id} {}", res.pid)?;
    Ok(())
}

/// Build the Create request for container `id`.
pub fn build_request(id: &str, args: &CreateArgs) -> anyhow::Result<CreateTaskRequest> {
    let mut spec = oci::default_spec(&args.namespace, id, &args.pid, args.privileged);
    if let Some(process) = spec.process.as_mut() {
        process.args.clone_from(&args.args);
    }

    let user_mounts: Vec<oci::Mount> =
        serde_json::from_str(&args.mounts_config).context("failure parsing mounts JSON config")?;
    spec.mounts.extend(user_mounts);

    let rootfs: Mount =
        serde_json::from_str(&args.rootfs_config).context("failure parsing rootfs JSON config")?;

    let json_spec = serde_json::to_vec(&spec)?;
    let extra = ExtraData {
        runc_options: Some(Any {
            type_url: String::new(),
            value: json_spec.clone(),
        }),
        json_spec,
        ..ExtraData::default()
    };

    Ok(CreateTaskRequest {
        id: id.to_string(),
        bundle: args.bundle.clone(),
        rootfs: vec![rootfs],
        options: Some(extra.to_any()),
        ..CreateTaskRequest::default()
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use prost::Message;

    use super::*;

    fn args() -> CreateArgs {
        CreateArgs {
            bundle: "/container/c1".into(),
            rootfs_config: r#"{"type": "ext4", "source": "/dev/vdb"}"#.into(),
            mounts_config: r#"[{"destination": "/data", "type": "bind", "source": "/mnt"}]"#
                .into(),
            namespace: "default".into(),
            pid: String::new(),
            privileged: false,
            args: vec!["/bin/sh".into()],
        }
    }

    #[test]
    fn request_wraps_spec_in_extra_data() {
        let req = build_request("c1", &args()).unwrap();
        assert_eq!(req.id, "c1");
        assert_eq!(req.bundle, "/container/c1");
        assert_eq!(req.rootfs[0].r#type, "ext4");

        let options = req.options.unwrap();
        assert_eq!(options.type_url, fcagent_proto::types::EXTRA_DATA_TYPE_URL);
        let extra = ExtraData::decode(options.value.as_slice()).unwrap();
        assert_eq!(extra.runc_options.unwrap().value, extra.json_spec);

        let spec: oci::Spec = serde_json::from_slice(&extra.json_spec).unwrap();
        assert_eq!(spec.linux.unwrap().cgroups_path, "/default/c1");
        assert_eq!(spec.process.unwrap().args, vec!["/bin/sh"]);
        assert_eq!(spec.mounts.len(), 8);
        assert_eq!(spec.mounts[7].destination, "/data");
    }

    #[test]
    fn malformed_mounts_config_is_an_error() {
        let mut bad = args();
        bad.mounts_config = "{".into();
        let err = build_request("c1", &bad).unwrap_err();
        assert!(err.to_string().contains("mounts"), "{err}");
    }

    #[test]
    fn default_rootfs_config_is_an_empty_mount() {
        let mut defaults = args();
        defaults.rootfs_config = "{}".into();
        let req = build_request("c1", &defaults).unwrap();
        assert_eq!(req.rootfs, vec![Mount::default()]);
    }
}
