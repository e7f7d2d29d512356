//! Turning the staged files into a running domain, and back.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::env::SearchPath;
use crate::error::LaunchError;
use crate::layout::TestbedLayout;
use crate::libvirt::Hypervisor;
use crate::template::Template;

use super::tpm::TpmSupport;

/// virt-manager forks into the background, so it should return quickly.
const VIRT_MANAGER_TIMEOUT: Duration = Duration::from_secs(2);

/// Builds and submits the domain definition for one launch.
pub struct Launcher<'a> {
	layout: &'a TestbedLayout,
	emulator: PathBuf,
	tpm: TpmSupport
}

impl<'a> Launcher<'a> {
	pub fn new(layout: &'a TestbedLayout, emulator: &Path, tpm: TpmSupport) -> Launcher<'a> {
		Launcher {
			layout,
			emulator: emulator.to_path_buf(),
			tpm
		}
	}

	/// Values for every placeholder the domain template may use.
	pub fn template_values(&self) -> HashMap<&'static str, String> {
		let layout = self.layout;
		let path = |p: PathBuf| p.to_string_lossy().into_owned();

		HashMap::from([
			("domain_name", String::from(layout.domain_name())),
			("ovmf_firmware_code_filepath", path(layout.ovmf_code())),
			("ovmf_firmware_vars_filepath", path(layout.ovmf_vars())),
			("ovmf_firmware_vars_template_filepath", path(layout.ovmf_vars_template())),
			("qemu_x86_64_binpath", path(self.emulator.clone())),
			("qcow2_main_disk_image_filepath", path(layout.main_disk())),
			("tpm_support", self.tpm.device_xml())
		])
	}

	pub fn render(&self, template: &Template) -> Result<String, LaunchError> {
		debug!(placeholders = ?template.placeholders(), "rendering domain template");
		Ok(template.render(&self.template_values())?)
	}

	/// Read the domain template from the source tree and render it.
	pub async fn render_from_tree(&self) -> Result<String, LaunchError> {
		let path = self.layout.domain_template();
		let source = tokio::fs::read_to_string(&path).await
			.map_err(|source| LaunchError::TemplateRead { path: path.clone(), source })?;
		self.render(&Template::new(source))
	}

	/// Define the domain from the rendered template. A copy of what was
	/// submitted is left in the working directory.
	pub async fn define<H: Hypervisor + ?Sized>(&self, hypervisor: &H) -> Result<(), LaunchError> {
		let xml = self.render_from_tree().await?;

		let copy = self.layout.domain_xml();
		tokio::fs::write(&copy, &xml).await
			.map_err(|source| LaunchError::WorkingDir { path: copy.clone(), source })?;

		let name = self.layout.domain_name();
		hypervisor.define_xml(&xml).await
			.map_err(|source| LaunchError::Define { name: String::from(name), source })?;
		info!(domain = name, tpm = self.tpm.usable(), "defined domain");
		Ok(())
	}

	pub async fn start<H: Hypervisor + ?Sized>(&self, hypervisor: &H) -> Result<(), LaunchError> {
		let name = self.layout.domain_name();
		hypervisor.start(name).await
			.map_err(|source| LaunchError::Start { name: String::from(name), source })?;
		info!(domain = name, "started domain");
		Ok(())
	}
}

/// How to reach the guest once it has booted.
pub fn connection_guidance(layout: &TestbedLayout, uri: &str) -> String {
	format!(
		"[*] Retrieve the virtual machine IP address with:\n\
		 $ virsh --connect {uri} domifaddr {name}\n\
		 \n\
		 [*] Connect locally via SSH with:\n\
		 $ ssh -i {key} \\\n\
		 \x20     -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null \\\n\
		 \x20     root@<domain_ip>",
		uri = uri,
		name = layout.domain_name(),
		key = layout.ssh_key_hint()
	)
}

/// Open the domain console in virt-manager.
///
/// Returns `false` if virt-manager is not installed, in which case the
/// caller should tell the operator how to connect instead. Problems with a
/// virt-manager that did start are only logged.
pub async fn spawn_virt_manager(search_path: &SearchPath, uri: &str, name: &str) -> bool {
	println!("[*] Spawning graphical virtual machine manager (\"virt-manager\")...");

	let binpath = match search_path.which("virt-manager") {
		Some(binpath) => binpath,
		None => {
			eprintln!("[!] Could not find virt-manager in PATH!");
			return false;
		}
	};

	let mut cmd = Command::new(&binpath);
	search_path.apply(&mut cmd);
	cmd.args(["--connect", uri, "--show-domain-console", name]);

	match tokio::time::timeout(VIRT_MANAGER_TIMEOUT, cmd.status()).await {
		Ok(Ok(status)) if status.success() => debug!("virt-manager started"),
		Ok(Ok(status)) => warn!(%status, "virt-manager exited with an error"),
		Ok(Err(err)) => warn!(error = %err, "could not run virt-manager"),
		Err(_) => warn!(timeout = ?VIRT_MANAGER_TIMEOUT, "virt-manager did not return in time")
	}
	true
}

/// Power off the domain if it is still running.
pub async fn stop<H: Hypervisor + ?Sized>(hypervisor: &H, name: &str) -> Result<(), LaunchError> {
	if let Some(domain) = crate::libvirt::lookup_domain(hypervisor, name).await? {
		if domain.is_active() {
			hypervisor.destroy(name).await?;
			info!(domain = name, "destroyed domain");
		}
	}
	Ok(())
}
