//! Deciding whether the guest gets an emulated TPM.

use tracing::{debug, warn};

use crate::env::SearchPath;
use crate::libvirt::device::{DomainOption, TpmDevice};
use crate::libvirt::{Hypervisor, LibvirtVersion};

/// The libtpms-based TPM emulator libvirt drives.
pub const SWTPM: &str = "swtpm";

/// Outcome of the TPM capability checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmSupport {
	pub swtpm_present: bool,

	/// `None` if the daemon could not tell us its version.
	pub libvirt_version: Option<LibvirtVersion>
}

impl TpmSupport {
	pub fn new(swtpm_present: bool, libvirt_version: Option<LibvirtVersion>) -> TpmSupport {
		TpmSupport { swtpm_present, libvirt_version }
	}

	pub fn version_supported(&self) -> bool {
		self.libvirt_version.map_or(false, |version| version.supports_swtpm())
	}

	/// Both checks have to pass.
	pub fn usable(&self) -> bool {
		self.swtpm_present && self.version_supported()
	}

	/// The device XML to splice into the domain definition, or an empty
	/// string when the guest goes without a TPM.
	pub fn device_xml(&self) -> String {
		if self.usable() {
			TpmDevice::swtpm().as_xml()
		} else {
			String::new()
		}
	}

	/// One message per failed check, followed by the fallback notice.
	/// Empty when the TPM is usable.
	pub fn diagnostics(&self) -> Vec<String> {
		if self.usable() {
			return Vec::new();
		}

		let mut messages = Vec::new();
		if !self.swtpm_present {
			messages.push(String::from(
				"swtpm (libtpms-based TPM emulator) could not be found in PATH but is required by libvirt for the TPM emulation."
			));
		}
		if !self.version_supported() {
			let current = match self.libvirt_version {
				Some(version) => version.to_string(),
				None => String::from("unknown")
			};
			messages.push(format!(
				"Your libvirt version is too old to support swtpm (libtpms-based TPM emulator): libvirt {} at least is required but your libvirt version is currently {}.",
				LibvirtVersion::SWTPM_MINIMUM,
				current
			));
		}
		messages.push(String::from(
			"TPM cannot be emulated: falling back to launch a libvirt virtual machine without any emulated TPM."
		));
		messages
	}
}

/// Check for swtpm and ask the daemon for its version.
///
/// A failed version query only costs us the TPM, so it is logged rather than
/// returned.
pub async fn check<H: Hypervisor + ?Sized>(search_path: &SearchPath, hypervisor: &H) -> TpmSupport {
	let swtpm_present = search_path.which(SWTPM).is_some();

	let libvirt_version = match hypervisor.version().await {
		Ok(encoded) => Some(LibvirtVersion::from_encoded(encoded)),
		Err(err) => {
			warn!(error = %err, "could not query libvirt version");
			None
		}
	};

	let support = TpmSupport::new(swtpm_present, libvirt_version);
	debug!(?support, usable = support.usable(), "checked TPM support");
	support
}

#[cfg(test)]
mod tests {
	use super::*;

	const OLD: LibvirtVersion = LibvirtVersion::new(4, 4, 999);
	const NEW: LibvirtVersion = LibvirtVersion::new(4, 5, 0);

	#[test]
	fn test_usable_needs_both_checks() {
		assert!(TpmSupport::new(true, Some(NEW)).usable());
		assert!(!TpmSupport::new(true, Some(OLD)).usable());
		assert!(!TpmSupport::new(false, Some(NEW)).usable());
		assert!(!TpmSupport::new(false, Some(OLD)).usable());
	}

	#[test]
	fn test_unknown_version_is_unsupported() {
		assert!(!TpmSupport::new(true, None).usable());
	}

	#[test]
	fn test_device_xml() {
		assert_eq!(
			TpmSupport::new(true, Some(NEW)).device_xml(),
			"<tpm model='tpm-tis'><backend type='emulator' version='2.0'></backend></tpm>"
		);
		assert_eq!(TpmSupport::new(false, Some(NEW)).device_xml(), "");
	}

	#[test]
	fn test_diagnostics_per_failed_check() {
		assert!(TpmSupport::new(true, Some(NEW)).diagnostics().is_empty());

		let missing = TpmSupport::new(false, Some(NEW)).diagnostics();
		assert_eq!(missing.len(), 2);
		assert!(missing[0].starts_with("swtpm"));

		let old = TpmSupport::new(true, Some(OLD)).diagnostics();
		assert_eq!(old.len(), 2);
		assert!(old[0].contains("libvirt 4.5.0 at least is required"));
		assert!(old[0].contains("currently 4.4.999"));

		let both = TpmSupport::new(false, Some(OLD)).diagnostics();
		assert_eq!(both.len(), 3);
		assert!(both[2].starts_with("TPM cannot be emulated"));
	}
}
