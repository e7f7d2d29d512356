use std::error::Error;
use std::process::ExitCode;

use clap::Parser;
use testbed_vm::env::EnvSnapshot;
use testbed_vm::layout::TestbedLayout;
use testbed_vm::libvirt::{VirshConnection, SYSTEM_URI};
use testbed_vm::repo::RepoRootLocator;
use testbed_vm::testbed::{prepare, LaunchOptions, Testbed};
use testbed_vm::LaunchError;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Run a CLIP OS VM in a libvirt based testbed.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
	/// Product name
	#[arg(value_name = "name")]
	product: String,

	/// Product version
	#[arg(id = "product_version", value_name = "version")]
	version: String,

	/// Open the domain console in virt-manager instead of printing SSH instructions
	#[arg(long)]
	virt_manager: bool
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
		.with_writer(std::io::stderr)
		.init();

	let args = Args::parse();

	match launch(args).await {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			eprintln!("[!] {}", report(&err));
			debug!(kind = ?err.kind(), "launch failed");
			ExitCode::from(err.exit_code())
		}
	}
}

async fn launch(args: Args) -> Result<(), LaunchError> {
	let options = LaunchOptions {
		uri: String::from(SYSTEM_URI),
		virt_manager: args.virt_manager,
		running_as_root: nix::unistd::geteuid().is_root()
	};
	prepare::ensure_not_root(options.running_as_root)?;

	let search_path = EnvSnapshot::capture().sanitize()?;

	let locator = RepoRootLocator::from_process();
	let repo_root = locator.locate().ok_or(LaunchError::RepoRootNotFound)?;
	debug!(repo_root = %repo_root.display(), "found repo root");

	let layout = TestbedLayout::new(repo_root, &args.product, &args.version);

	let interrupt = || async {
		if let Err(err) = tokio::signal::ctrl_c().await {
			error!(error = %err, "could not listen for SIGINT");
		}
	};

	let mut testbed = Testbed::new(&layout, &search_path, &options);
	testbed.run(VirshConnection::open(&options.uri, &search_path), interrupt).await
}

/// One line: the error followed by its causes.
fn report(err: &dyn Error) -> String {
	let mut line = err.to_string();
	let mut source = err.source();
	while let Some(cause) = source {
		line.push_str(": ");
		line.push_str(&cause.to_string());
		source = cause.source();
	}
	line
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_args() {
		let args = Args::try_parse_from(["testbed", "clipos", "5.0.0"]).unwrap();
		assert_eq!(args.product, "clipos");
		assert_eq!(args.version, "5.0.0");
		assert!(!args.virt_manager);

		let args = Args::try_parse_from(["testbed", "--virt-manager", "clipos", "5.0.0"]).unwrap();
		assert!(args.virt_manager);
	}

	#[test]
	fn test_args_require_version() {
		assert!(Args::try_parse_from(["testbed", "clipos"]).is_err());
	}

	#[test]
	fn test_report_includes_causes() {
		let err = LaunchError::Stage {
			path: std::path::PathBuf::from("/src/out/OVMF_CODE.fd"),
			source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory")
		};
		assert_eq!(
			report(&err),
			"could not copy \"/src/out/OVMF_CODE.fd\" to workdir: No such file or directory"
		);
	}
}
