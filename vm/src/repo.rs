//! Locating the root of the enclosing source tree.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::debug;

/// Directory whose presence marks the repository root.
pub const REPO_MARKER: &str = ".repo";

/// Finds the repository root from a list of starting points and remembers it.
///
/// Every later path the launcher uses hangs off this directory, so the walk
/// runs at most once per locator.
#[derive(Debug)]
pub struct RepoRootLocator {
	starts: Vec<PathBuf>,
	root: OnceLock<Option<PathBuf>>
}

impl RepoRootLocator {
	/// Search from the current directory first, then from where the running
	/// executable lives.
	pub fn from_process() -> RepoRootLocator {
		let mut starts = Vec::new();
		if let Ok(cwd) = std::env::current_dir() {
			starts.push(cwd);
		}
		if let Some(dir) = std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)) {
			starts.push(dir);
		}
		RepoRootLocator::new(starts)
	}

	pub fn new(starts: Vec<PathBuf>) -> RepoRootLocator {
		RepoRootLocator {
			starts,
			root: OnceLock::new()
		}
	}

	/// Returns the repository root, or `None` if no starting point lives
	/// inside one.
	pub fn locate(&self) -> Option<&Path> {
		self.root
			.get_or_init(|| self.starts.iter().find_map(|start| walk_up(start)))
			.as_deref()
	}
}

/// Check `start` and each of its parents for the marker. The filesystem root
/// itself is never considered a repository root.
fn walk_up(start: &Path) -> Option<PathBuf> {
	debug!(start = %start.display(), "looking for repo root");
	start
		.ancestors()
		.take_while(|dir| dir.file_name().is_some())
		.find(|dir| is_repo_root(dir))
		.map(Path::to_path_buf)
}

pub fn is_repo_root(path: &Path) -> bool {
	path.join(REPO_MARKER).is_dir()
}
