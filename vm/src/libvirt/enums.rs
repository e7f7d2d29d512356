use thiserror::Error;

#[derive(Error, Debug)]
pub enum HypervisorError {
	/// virsh could not be executed at all.
	#[error("failure running virsh")]
	Spawn(#[source] std::io::Error),

	/// virsh ran, but the daemon refused the request.
	#[error("virsh {command} failed: {stderr}")]
	CommandFailed {
		command: String,
		stderr: String
	},

	#[error("unexpected output from virsh {command}: {output:?}")]
	UnexpectedOutput {
		command: String,
		output: String
	},

	#[error(transparent)]
	IoError(#[from] std::io::Error)
}

/// Flags for removing a domain definition. Mirrors the
/// `VIR_DOMAIN_UNDEFINE_*` bits the launcher uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UndefineFlags {
	/// Also remove any managed save image.
	pub managed_save: bool,

	/// Also remove snapshot metadata.
	pub snapshots_metadata: bool,

	/// Also remove the UEFI variable store.
	pub nvram: bool
}

impl UndefineFlags {
	/// Remove everything libvirt keeps about a domain.
	pub fn all() -> UndefineFlags {
		UndefineFlags {
			managed_save: true,
			snapshots_metadata: true,
			nvram: true
		}
	}
}

/// A domain as reported by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainInfo {
	pub name: String,
	pub state: DomainState
}

impl DomainInfo {
	pub fn is_active(&self) -> bool {
		matches!(self.state, DomainState::Running)
	}
}

/// Current domain state, as far as the launcher cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainState {
	/// The domain is defined but not running.
	Inactive,

	/// The domain is running (or paused; libvirt calls both "active").
	Running
}
