//! Talking to the libvirt daemon.

pub mod device;
pub mod enums;
pub mod version;
pub mod virsh;

pub use enums::*;
pub use version::LibvirtVersion;
pub use virsh::VirshConnection;

/// URI of the system-wide QEMU driver.
pub const SYSTEM_URI: &str = "qemu:///system";

/// The handful of daemon calls the launcher needs.
///
/// Domains are addressed by name; the launcher never holds on to a domain
/// object across calls.
#[async_trait::async_trait]
pub trait Hypervisor: Send + Sync {
	/// The connection URI, for messages shown to the operator.
	fn uri(&self) -> &str;

	/// All defined domains, running or not.
	async fn list_domains(&self) -> Result<Vec<DomainInfo>, HypervisorError>;

	/// Hard power-off a running domain.
	async fn destroy(&self, name: &str) -> Result<(), HypervisorError>;

	/// Remove a domain definition.
	async fn undefine(&self, name: &str, flags: UndefineFlags) -> Result<(), HypervisorError>;

	/// Define (or redefine) a persistent domain from its XML description.
	async fn define_xml(&self, xml: &str) -> Result<(), HypervisorError>;

	/// Boot a defined domain.
	async fn start(&self, name: &str) -> Result<(), HypervisorError>;

	/// Daemon version, encoded the way libvirt does
	/// (see [`LibvirtVersion::from_encoded`]).
	async fn version(&self) -> Result<u64, HypervisorError>;
}

/// Find a domain by exact name.
pub async fn lookup_domain<H: Hypervisor + ?Sized>(hypervisor: &H, name: &str) -> Result<Option<DomainInfo>, HypervisorError> {
	Ok(hypervisor.list_domains().await?
		.into_iter()
		.find(|domain| domain.name == name))
}
