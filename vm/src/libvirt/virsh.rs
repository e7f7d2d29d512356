//! [`Hypervisor`] implementation driving the `virsh` command line client.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use super::{DomainInfo, DomainState, Hypervisor, HypervisorError, LibvirtVersion, UndefineFlags};
use crate::env::SearchPath;

/// A connection to a libvirt daemon through `virsh --connect <uri>`.
#[derive(Debug, Clone)]
pub struct VirshConnection {
	virsh: PathBuf,
	uri: String,
	search_path: SearchPath
}

impl VirshConnection {
	/// Locate virsh and make sure the daemon at `uri` answers.
	pub async fn open(uri: &str, search_path: &SearchPath) -> Result<VirshConnection, HypervisorError> {
		let virsh = search_path.which("virsh").ok_or_else(|| {
			HypervisorError::Spawn(std::io::Error::new(std::io::ErrorKind::NotFound, "virsh not found in PATH"))
		})?;

		let conn = VirshConnection {
			virsh,
			uri: String::from(uri),
			search_path: search_path.clone()
		};

		let canonical = conn.run(["uri"]).await?;
		debug!(uri = canonical.trim(), "connected to libvirt daemon");

		Ok(conn)
	}

	fn command(&self) -> Command {
		let mut cmd = Command::new(&self.virsh);
		self.search_path.apply(&mut cmd);
		cmd.arg("--connect")
			.arg(&self.uri)
			.stdin(Stdio::null())
			.kill_on_drop(true);
		cmd
	}

	/// Run one virsh subcommand and return its stdout.
	async fn run<I, S>(&self, args: I) -> Result<String, HypervisorError>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<OsStr>,
	{
		let args: Vec<S> = args.into_iter().collect();
		let command = args.iter()
			.map(|arg| arg.as_ref().to_string_lossy().into_owned())
			.collect::<Vec<String>>()
			.join(" ");
		debug!(uri = %self.uri, %command, "running virsh");

		let output = self.command()
			.args(&args)
			.output()
			.await
			.map_err(HypervisorError::Spawn)?;

		if !output.status.success() {
			return Err(HypervisorError::CommandFailed {
				command,
				stderr: String::from_utf8_lossy(&output.stderr).trim().to_string()
			});
		}

		Ok(String::from_utf8_lossy(&output.stdout).into_owned())
	}

	async fn list_names(&self, all: bool) -> Result<Vec<String>, HypervisorError> {
		let stdout = if all {
			self.run(["list", "--all", "--name"]).await?
		} else {
			self.run(["list", "--name"]).await?
		};
		Ok(parse_name_list(&stdout))
	}
}

#[async_trait::async_trait]
impl Hypervisor for VirshConnection {
	fn uri(&self) -> &str {
		&self.uri
	}

	async fn list_domains(&self) -> Result<Vec<DomainInfo>, HypervisorError> {
		let active: HashSet<String> = self.list_names(false).await?.into_iter().collect();
		let domains = self.list_names(true).await?
			.into_iter()
			.map(|name| {
				let state = if active.contains(&name) { DomainState::Running } else { DomainState::Inactive };
				DomainInfo { name, state }
			})
			.collect();
		Ok(domains)
	}

	async fn destroy(&self, name: &str) -> Result<(), HypervisorError> {
		self.run(["destroy", name]).await?;
		Ok(())
	}

	async fn undefine(&self, name: &str, flags: UndefineFlags) -> Result<(), HypervisorError> {
		self.run(undefine_args(name, flags)).await?;
		Ok(())
	}

	async fn define_xml(&self, xml: &str) -> Result<(), HypervisorError> {
		// virsh only defines from a file
		let mut file = tempfile::Builder::new()
			.prefix("domain-")
			.suffix(".xml")
			.tempfile()?;
		file.write_all(xml.as_bytes())?;
		file.flush()?;

		self.run([OsStr::new("define"), file.path().as_os_str()]).await?;
		Ok(())
	}

	async fn start(&self, name: &str) -> Result<(), HypervisorError> {
		self.run(["start", name]).await?;
		Ok(())
	}

	async fn version(&self) -> Result<u64, HypervisorError> {
		let stdout = self.run(["version", "--daemon"]).await?;
		parse_daemon_version(&stdout)
			.and_then(|version| version.encoded())
			.ok_or(HypervisorError::UnexpectedOutput {
				command: String::from("version --daemon"),
				output: stdout
			})
	}
}

fn undefine_args(name: &str, flags: UndefineFlags) -> Vec<&str> {
	let mut args = vec!["undefine", name];
	if flags.managed_save {
		args.push("--managed-save");
	}
	if flags.snapshots_metadata {
		args.push("--snapshots-metadata");
	}
	if flags.nvram {
		args.push("--nvram");
	}
	args
}

fn parse_name_list(stdout: &str) -> Vec<String> {
	stdout.lines()
		.map(str::trim)
		.filter(|line| !line.is_empty())
		.map(String::from)
		.collect()
}

/// Pull the daemon version out of `virsh version --daemon`, falling back to
/// the library version when talking to an older virsh.
fn parse_daemon_version(stdout: &str) -> Option<LibvirtVersion> {
	let field = |prefix: &str| {
		stdout.lines()
			.find_map(|line| line.trim().strip_prefix(prefix))
			.and_then(|rest| rest.trim().trim_start_matches("libvirt").trim().parse::<LibvirtVersion>().ok())
	};

	field("Running against daemon:").or_else(|| field("Using library:"))
}

#[cfg(test)]
mod tests {
	use super::*;

	const VERSION_OUTPUT: &str = "\
Compiled against library: libvirt 9.0.0
Using library: libvirt 9.0.0
Using API: QEMU 9.0.0
Running hypervisor: QEMU 7.2.0
Running against daemon: 8.10.1
";

	#[test]
	fn test_parse_daemon_version() {
		assert_eq!(parse_daemon_version(VERSION_OUTPUT), Some(LibvirtVersion::new(8, 10, 1)));
	}

	#[test]
	fn test_parse_version_falls_back_to_library() {
		let output = "Compiled against library: libvirt 4.4.0\nUsing library: libvirt 4.4.0\n";
		assert_eq!(parse_daemon_version(output), Some(LibvirtVersion::new(4, 4, 0)));
		assert_eq!(parse_daemon_version("error: no connection\n"), None);
	}

	#[test]
	fn test_parse_name_list() {
		let names = parse_name_list("clipos-testbed_clipos-qemu\n debian12 \n\n");
		assert_eq!(names, vec!["clipos-testbed_clipos-qemu", "debian12"]);
	}

	#[test]
	fn test_undefine_args() {
		assert_eq!(
			undefine_args("vm", UndefineFlags::all()),
			vec!["undefine", "vm", "--managed-save", "--snapshots-metadata", "--nvram"]
		);
		assert_eq!(undefine_args("vm", UndefineFlags::default()), vec!["undefine", "vm"]);
	}

	#[tokio::test]
	async fn test_open_without_virsh() {
		let empty = tempfile::TempDir::new().unwrap();
		let search_path = SearchPath::from_dirs([empty.path()]).unwrap();

		let err = VirshConnection::open(crate::libvirt::SYSTEM_URI, &search_path).await.unwrap_err();
		assert!(matches!(err, HypervisorError::Spawn(_)));
	}

	fn fake_virsh(dir: &std::path::Path, daemon_version: &str) {
		use std::os::unix::fs::PermissionsExt;

		let script = format!(
			"#!/bin/sh\ncase \"$3\" in\n\tversion) echo 'Running against daemon: {daemon_version}' ;;\n\t*) echo \"$2\" ;;\nesac\n"
		);
		let virsh = dir.join("virsh");
		std::fs::write(&virsh, script).unwrap();
		std::fs::set_permissions(&virsh, std::fs::Permissions::from_mode(0o755)).unwrap();
	}

	#[tokio::test]
	async fn test_daemon_version_is_encoded() {
		let bin = tempfile::TempDir::new().unwrap();
		fake_virsh(bin.path(), "8.10.1");
		let search_path = SearchPath::from_dirs([bin.path()]).unwrap();

		let conn = VirshConnection::open("test:///default", &search_path).await.unwrap();
		assert_eq!(conn.uri(), "test:///default");
		assert_eq!(conn.version().await.unwrap(), 8_010_001);
	}

	#[tokio::test]
	async fn test_oversized_daemon_version_is_rejected() {
		let bin = tempfile::TempDir::new().unwrap();
		fake_virsh(bin.path(), "18446744073709551615.0.0");
		let search_path = SearchPath::from_dirs([bin.path()]).unwrap();

		let conn = VirshConnection::open("test:///default", &search_path).await.unwrap();
		let err = conn.version().await.unwrap_err();
		assert!(matches!(err, HypervisorError::UnexpectedOutput { .. }));
	}
}
