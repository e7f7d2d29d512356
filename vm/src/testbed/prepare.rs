//! Getting the host ready for a fresh domain.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::SearchPath;
use crate::error::LaunchError;
use crate::layout::TestbedLayout;
use crate::libvirt::{Hypervisor, UndefineFlags};

pub const EMULATOR: &str = "qemu-system-x86_64";

/// Domains run under the system libvirt instance; the launcher itself must
/// not be root.
pub fn ensure_not_root(running_as_root: bool) -> Result<(), LaunchError> {
	if running_as_root {
		return Err(LaunchError::RunningAsRoot);
	}
	Ok(())
}

pub fn find_emulator(search_path: &SearchPath) -> Result<PathBuf, LaunchError> {
	let path = search_path.which(EMULATOR)
		.ok_or_else(|| LaunchError::EmulatorNotFound(String::from(EMULATOR)))?;
	debug!(emulator = %path.display(), "found emulator");
	Ok(path)
}

/// Stop and forget any domain left over under `name`, together with its
/// managed save, snapshot metadata and NVRAM.
pub async fn remove_stale_domain<H: Hypervisor + ?Sized>(hypervisor: &H, name: &str) -> Result<(), LaunchError> {
	for domain in hypervisor.list_domains().await? {
		if domain.name != name {
			continue;
		}

		info!(domain = name, active = domain.is_active(), "removing stale domain");
		if domain.is_active() {
			hypervisor.destroy(name).await?;
		}
		hypervisor.undefine(name, UndefineFlags::all()).await?;
	}
	Ok(())
}

/// Recreate the working directory and copy the firmware and disk into it.
///
/// The directory is wiped unconditionally since its domain is gone by now.
pub async fn stage_files(layout: &TestbedLayout) -> Result<(), LaunchError> {
	let working_dir = layout.working_dir();
	let wd_err = |source| LaunchError::WorkingDir { path: working_dir.clone(), source };

	if tokio::fs::try_exists(&working_dir).await.map_err(wd_err)? {
		debug!(path = %working_dir.display(), "removing previous working directory");
		tokio::fs::remove_dir_all(&working_dir).await.map_err(wd_err)?;
	}
	tokio::fs::create_dir_all(&working_dir).await.map_err(wd_err)?;

	copy(&layout.ovmf_code_source(), &layout.ovmf_code()).await?;
	copy(&layout.ovmf_vars_template_source(), &layout.ovmf_vars_template()).await?;
	copy(&layout.main_disk_source(), &layout.main_disk()).await?;

	Ok(())
}

async fn copy(from: &Path, to: &Path) -> Result<(), LaunchError> {
	let bytes = tokio::fs::copy(from, to).await.map_err(|source| LaunchError::Stage {
		path: from.to_path_buf(),
		source
	})?;
	debug!(from = %from.display(), to = %to.display(), bytes, "staged");
	Ok(())
}
