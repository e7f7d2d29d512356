//! Launching a testbed virtual machine from start to finish.

pub mod launch;
pub mod prepare;
pub mod tpm;

use std::future::Future;

use tracing::{info, warn};

use crate::env::SearchPath;
use crate::error::LaunchError;
use crate::layout::TestbedLayout;
use crate::libvirt::{Hypervisor, HypervisorError, SYSTEM_URI};

pub use launch::Launcher;
pub use tpm::TpmSupport;

/// Knobs that do not come from the source tree.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
	/// libvirt connection URI.
	pub uri: String,

	/// Open the console in virt-manager instead of printing SSH instructions.
	pub virt_manager: bool,

	/// Whether the launcher runs with an effective uid of 0.
	pub running_as_root: bool
}

impl Default for LaunchOptions {
	fn default() -> Self {
		LaunchOptions {
			uri: String::from(SYSTEM_URI),
			virt_manager: false,
			running_as_root: false
		}
	}
}

/// Where a launch is at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
	Init,

	/// Stale domain gone, working directory staged.
	Prepared,

	TpmChecked,

	Defined,

	/// The domain is running and we are waiting to be interrupted.
	Running,

	Stopped
}

/// One launch of the testbed domain.
pub struct Testbed<'a> {
	layout: &'a TestbedLayout,
	search_path: &'a SearchPath,
	options: &'a LaunchOptions,
	state: LaunchState
}

impl<'a> Testbed<'a> {
	pub fn new(layout: &'a TestbedLayout, search_path: &'a SearchPath, options: &'a LaunchOptions) -> Testbed<'a> {
		Testbed {
			layout,
			search_path,
			options,
			state: LaunchState::Init
		}
	}

	pub fn state(&self) -> LaunchState {
		self.state
	}

	fn transition(&mut self, state: LaunchState) {
		info!(from = ?self.state, to = ?state, domain = self.layout.domain_name(), "launch state");
		self.state = state;
	}

	/// Bring the domain up, wait for the first interrupt, then tear it down.
	///
	/// `connect` is only awaited once the local preconditions hold, so nothing
	/// talks to the daemon when the launch is refused early. Every failure
	/// ends the launch; nothing is retried.
	///
	/// `interrupt` is called once to wait for the shutdown request and once
	/// more while the domain is being destroyed. A second interrupt abandons
	/// the teardown.
	pub async fn run<H, C, I, F>(&mut self, connect: C, mut interrupt: I) -> Result<(), LaunchError>
	where
		H: Hypervisor,
		C: Future<Output = Result<H, HypervisorError>>,
		I: FnMut() -> F,
		F: Future<Output = ()>,
	{
		prepare::ensure_not_root(self.options.running_as_root)?;
		let emulator = prepare::find_emulator(self.search_path)?;

		let hypervisor = connect.await.map_err(|source| LaunchError::Connect {
			uri: self.options.uri.clone(),
			source
		})?;

		let layout = self.layout;
		let name = layout.domain_name();
		prepare::remove_stale_domain(&hypervisor, name).await?;
		prepare::stage_files(layout).await?;
		self.transition(LaunchState::Prepared);

		let tpm = tpm::check(self.search_path, &hypervisor).await;
		let diagnostics = tpm.diagnostics();
		if !diagnostics.is_empty() {
			warn!(domain = name, "launching without TPM");
		}
		for message in diagnostics {
			println!("[!] {message}");
		}
		self.transition(LaunchState::TpmChecked);

		let launcher = Launcher::new(layout, &emulator, tpm);
		launcher.define(&hypervisor).await?;
		self.transition(LaunchState::Defined);

		launcher.start(&hypervisor).await?;
		self.transition(LaunchState::Running);
		println!();

		let console = self.options.virt_manager
			&& launch::spawn_virt_manager(self.search_path, hypervisor.uri(), name).await;
		if !console {
			println!("{}", launch::connection_guidance(layout, hypervisor.uri()));
		}

		println!();
		println!("[*] Interrupt the virtual machine with Control+C (SIGINT).");
		println!("[*] Note: this will kill the virtual machine.");
		interrupt().await;
		println!("[*] Stopping virtual machine");

		tokio::select! {
			biased;

			stopped = launch::stop(&hypervisor, name) => stopped?,
			_ = interrupt() => {
				warn!(domain = name, "teardown interrupted");
				return Err(LaunchError::Interrupted { name: String::from(name) });
			}
		}
		self.transition(LaunchState::Stopped);
		Ok(())
	}
}
