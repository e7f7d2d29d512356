//! Where the launcher finds its inputs and stages its working copies.
//!
//! Everything is derived from the repository root plus the product name and
//! version given on the command line, once, at startup.

use std::path::{Path, PathBuf};

/// Build a libvirt domain name for a product.
///
/// With TPM emulation libvirt hands the guest name to swtpm, which uses it as
/// a certificate CN where `+` has a special meaning, so `+` becomes `--`.
pub fn domain_name(product: &str) -> String {
	format!("{product}-testbed_{product}-qemu").replace('+', "--")
}

/// Paths used during one launch.
#[derive(Debug, Clone)]
pub struct TestbedLayout {
	repo_root: PathBuf,
	product: String,
	version: String,
	domain_name: String
}

impl TestbedLayout {
	pub fn new(repo_root: &Path, product: &str, version: &str) -> TestbedLayout {
		TestbedLayout {
			repo_root: repo_root.to_path_buf(),
			product: String::from(product),
			version: String::from(version),
			domain_name: domain_name(product)
		}
	}

	pub fn domain_name(&self) -> &str {
		&self.domain_name
	}

	/// The libvirt domain XML template.
	pub fn domain_template(&self) -> PathBuf {
		self.repo_root.join("testbed/qemu/clipos-qemu.xml")
	}

	fn ovmf_bundle(&self) -> PathBuf {
		self.repo_root
			.join("out")
			.join(&self.product)
			.join(&self.version)
			.join("efiboot/bundle/qemu-ovmf")
	}

	pub fn ovmf_code_source(&self) -> PathBuf {
		self.ovmf_bundle().join("OVMF_CODE.fd")
	}

	pub fn ovmf_vars_template_source(&self) -> PathBuf {
		self.ovmf_bundle().join("OVMF_VARS.fd")
	}

	pub fn main_disk_source(&self) -> PathBuf {
		self.virtual_machines_dir().join("main.qcow2")
	}

	fn virtual_machines_dir(&self) -> PathBuf {
		self.repo_root.join("run/virtual_machines")
	}

	/// Per-domain directory holding the staged copies.
	pub fn working_dir(&self) -> PathBuf {
		self.virtual_machines_dir().join(&self.domain_name)
	}

	pub fn ovmf_code(&self) -> PathBuf {
		self.working_dir().join("OVMF_code.fd")
	}

	pub fn ovmf_vars_template(&self) -> PathBuf {
		self.working_dir().join("OVMF_vars_template.fd")
	}

	/// Created by libvirt from [`Self::ovmf_vars_template`] on first boot.
	pub fn ovmf_vars(&self) -> PathBuf {
		self.working_dir().join("OVMF_vars.fd")
	}

	pub fn main_disk(&self) -> PathBuf {
		self.working_dir().join("main.qcow2")
	}

	/// Copy of the rendered definition, kept for inspection.
	pub fn domain_xml(&self) -> PathBuf {
		self.working_dir().join("domain.xml")
	}

	/// SSH key for the guest root account, relative to the repository root.
	pub fn ssh_key_hint(&self) -> String {
		format!("cache/{}/{}/qemu/bundle/ssh_root", self.product, self.version)
	}
}
