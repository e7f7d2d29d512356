use std::path::PathBuf;

use thiserror::Error;

use crate::libvirt::HypervisorError;
use crate::template::TemplateError;

/// Broad class of a launch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	/// The host or the source tree is not in a state we can launch from.
	Precondition,

	/// Reading or staging files failed.
	Io,

	/// The libvirt daemon refused a request or could not be reached.
	DaemonRejection,

	/// The operator gave up on the launch.
	Interrupted
}

#[derive(Error, Debug)]
pub enum LaunchError {
	#[error("do not run as root")]
	RunningAsRoot,

	#[error("could not find repo root")]
	RepoRootNotFound,

	#[error("could not find {0:?} emulator")]
	EmulatorNotFound(String),

	#[error("invalid search path")]
	InvalidSearchPath(#[from] std::env::JoinPathsError),

	#[error("could not connect to the libvirt daemon at {uri}")]
	Connect {
		uri: String,
		#[source]
		source: HypervisorError
	},

	#[error("could not prepare working directory {path:?}")]
	WorkingDir {
		path: PathBuf,
		#[source]
		source: std::io::Error
	},

	#[error("could not copy {path:?} to workdir")]
	Stage {
		path: PathBuf,
		#[source]
		source: std::io::Error
	},

	#[error("could not read domain template {path:?}")]
	TemplateRead {
		path: PathBuf,
		#[source]
		source: std::io::Error
	},

	#[error("could not render domain template")]
	Template(#[from] TemplateError),

	#[error("could not define libvirt domain {name}")]
	Define {
		name: String,
		#[source]
		source: HypervisorError
	},

	#[error("could not start libvirt domain {name}")]
	Start {
		name: String,
		#[source]
		source: HypervisorError
	},

	#[error("libvirt request failed")]
	Hypervisor(#[from] HypervisorError),

	#[error("interrupted while stopping libvirt domain {name}, it may still be running")]
	Interrupted {
		name: String
	}
}

impl LaunchError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::RunningAsRoot
			| Self::RepoRootNotFound
			| Self::EmulatorNotFound(_)
			| Self::InvalidSearchPath(_)
			| Self::Template(_) => ErrorKind::Precondition,

			Self::WorkingDir { .. }
			| Self::Stage { .. }
			| Self::TemplateRead { .. } => ErrorKind::Io,

			Self::Connect { .. }
			| Self::Define { .. }
			| Self::Start { .. }
			| Self::Hypervisor(_) => ErrorKind::DaemonRejection,

			Self::Interrupted { .. } => ErrorKind::Interrupted
		}
	}

	/// Process exit status for this failure. Every failure is fatal.
	pub fn exit_code(&self) -> u8 {
		1
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_kinds() {
		assert_eq!(LaunchError::RunningAsRoot.kind(), ErrorKind::Precondition);
		assert_eq!(
			LaunchError::Stage {
				path: PathBuf::from("/src/out/OVMF_CODE.fd"),
				source: std::io::Error::from(std::io::ErrorKind::NotFound)
			}.kind(),
			ErrorKind::Io
		);
		assert_eq!(
			LaunchError::Define {
				name: String::from("vm"),
				source: HypervisorError::CommandFailed { command: String::from("define"), stderr: String::new() }
			}.kind(),
			ErrorKind::DaemonRejection
		);
		assert_eq!(LaunchError::Interrupted { name: String::from("vm") }.kind(), ErrorKind::Interrupted);
	}

	#[test]
	fn test_stage_message_names_source() {
		let err = LaunchError::Stage {
			path: PathBuf::from("/src/run/virtual_machines/main.qcow2"),
			source: std::io::Error::from(std::io::ErrorKind::NotFound)
		};
		assert_eq!(err.to_string(), "could not copy \"/src/run/virtual_machines/main.qcow2\" to workdir");
		assert_eq!(err.exit_code(), 1);
	}
}
