/// trait that devices which want to be spliced into a domain definition implement
pub trait DomainOption {

	/// Returns the libvirt domain XML for this device.
	fn as_xml(&self) -> String;

}

/// TPM Interface Specification (TIS) frontend, the one the testbed firmware drives.
const TPM_TIS: &str = "tpm-tis";

/// A TPM backed by an swtpm process that libvirt starts alongside the guest.
pub struct TpmDevice {
	/// TPM specification version, "1.2" or "2.0".
	pub version: String
}

impl TpmDevice {
	/// The TPM the testbed images expect: 2.0 behind a TIS interface.
	pub fn swtpm() -> TpmDevice {
		TpmDevice {
			version: String::from("2.0")
		}
	}
}

impl DomainOption for TpmDevice {
	fn as_xml(&self) -> String {
		format!("<tpm model='{}'><backend type='emulator' version='{}'></backend></tpm>", TPM_TIS, self.version)
	}
}
