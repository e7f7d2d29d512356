//! Process environment handling.
//!
//! The environment is captured once at startup. When the launcher is started
//! from inside a Python virtualenv, its `bin/` directory shadows system tools
//! (and the libvirt bindings some of them rely on), so those entries are
//! dropped from the search path handed to every child process.

use std::env::JoinPathsError;
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Variable set by an activated virtualenv.
pub const VIRTUAL_ENV: &str = "VIRTUAL_ENV";

/// Executable search path variable.
pub const PATH: &str = "PATH";

/// An immutable copy of the environment variables the launcher cares about.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
	virtual_env: Option<OsString>,
	path: Option<OsString>
}

impl EnvSnapshot {
	/// Capture the current process environment.
	pub fn capture() -> EnvSnapshot {
		EnvSnapshot {
			virtual_env: std::env::var_os(VIRTUAL_ENV),
			path: std::env::var_os(PATH)
		}
	}

	pub fn new(virtual_env: Option<&OsStr>, path: Option<&OsStr>) -> EnvSnapshot {
		EnvSnapshot {
			virtual_env: virtual_env.map(OsStr::to_os_string),
			path: path.map(OsStr::to_os_string)
		}
	}

	/// Produce the search path with the virtualenv stripped out.
	///
	/// If either `VIRTUAL_ENV` or `PATH` is missing the snapshot is passed
	/// through untouched.
	pub fn sanitize(&self) -> Result<SearchPath, JoinPathsError> {
		let (venv, path) = match (&self.virtual_env, &self.path) {
			(Some(venv), Some(path)) => (venv, path),
			_ => {
				return Ok(SearchPath {
					path: self.path.clone(),
					strip_virtual_env: false
				})
			}
		};

		let venv_root = canonical(Path::new(venv));
		let kept = std::env::split_paths(path).filter(|entry| {
			// plain prefix match: `<venv>2/bin` counts as inside `<venv>`
			let inside = canonical(entry).as_os_str().as_bytes().starts_with(venv_root.as_os_str().as_bytes());
			if inside {
				debug!(entry = %entry.display(), "dropping virtualenv entry from PATH");
			}
			!inside
		});

		Ok(SearchPath {
			path: Some(std::env::join_paths(kept)?),
			strip_virtual_env: true
		})
	}
}

/// Make `path` absolute and resolve symlinks, like `realpath(3)` without
/// requiring the path to exist: the longest existing ancestor is resolved
/// and the missing components are appended to it.
fn canonical(path: &Path) -> PathBuf {
	let absolute = match std::env::current_dir() {
		Ok(cwd) if !path.is_absolute() => cwd.join(path),
		_ => path.to_path_buf()
	};

	let mut missing = Vec::new();
	let mut existing = absolute.as_path();
	loop {
		if let Ok(resolved) = std::fs::canonicalize(existing) {
			return missing.iter().rev().fold(resolved, |acc: PathBuf, part| acc.join(part));
		}
		match (existing.parent(), existing.file_name()) {
			(Some(parent), Some(name)) => {
				missing.push(name);
				existing = parent;
			}
			_ => return absolute
		}
	}
}

/// The executable search path used for lookups and child processes.
#[derive(Debug, Clone)]
pub struct SearchPath {
	path: Option<OsString>,
	strip_virtual_env: bool
}

impl SearchPath {
	/// A search path made of the given directories, in order.
	pub fn from_dirs<I, P>(dirs: I) -> Result<SearchPath, JoinPathsError>
	where
		I: IntoIterator<Item = P>,
		P: AsRef<OsStr>,
	{
		Ok(SearchPath {
			path: Some(std::env::join_paths(dirs)?),
			strip_virtual_env: false
		})
	}

	pub fn dirs(&self) -> Vec<PathBuf> {
		match &self.path {
			Some(path) => std::env::split_paths(path).collect(),
			None => Vec::new()
		}
	}

	/// Locate an executable by name, like `which(1)`.
	pub fn which(&self, binary: &str) -> Option<PathBuf> {
		let path = self.path.as_ref()?;
		let cwd = std::env::current_dir().ok()?;
		which::which_in(binary, Some(path), cwd).ok()
	}

	/// Make a child process see this search path instead of ours.
	pub fn apply(&self, cmd: &mut tokio::process::Command) {
		match &self.path {
			Some(path) => cmd.env(PATH, path),
			None => cmd.env_remove(PATH)
		};

		if self.strip_virtual_env {
			cmd.env_remove(VIRTUAL_ENV);
		}
	}
}
