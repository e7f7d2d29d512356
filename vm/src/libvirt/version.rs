use std::fmt;
use std::str::FromStr;

/// A libvirt version.
///
/// libvirt reports versions as a single integer,
/// `1_000_000 * major + 1_000 * minor + release`. Field order makes the
/// derived ordering compare major first, then minor, then release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LibvirtVersion {
	pub major: u64,
	pub minor: u64,
	pub release: u64
}

impl LibvirtVersion {
	/// First release able to drive swtpm.
	pub const SWTPM_MINIMUM: LibvirtVersion = LibvirtVersion::new(4, 5, 0);

	pub const fn new(major: u64, minor: u64, release: u64) -> LibvirtVersion {
		LibvirtVersion { major, minor, release }
	}

	pub const fn from_encoded(version: u64) -> LibvirtVersion {
		LibvirtVersion {
			major: version / 1_000_000,
			minor: (version / 1_000) % 1_000,
			release: version % 1_000
		}
	}

	/// The integer form, or `None` if it does not fit in a `u64`.
	pub fn encoded(&self) -> Option<u64> {
		self.major.checked_mul(1_000_000)?
			.checked_add(self.minor.checked_mul(1_000)?)?
			.checked_add(self.release)
	}

	pub fn supports_swtpm(&self) -> bool {
		*self >= LibvirtVersion::SWTPM_MINIMUM
	}
}

impl fmt::Display for LibvirtVersion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}.{}", self.major, self.minor, self.release)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid libvirt version {0:?}")]
pub struct ParseVersionError(String);

impl FromStr for LibvirtVersion {
	type Err = ParseVersionError;

	/// Parses the dotted form virsh prints, e.g. `9.0.0`. A missing release
	/// component counts as zero.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let err = || ParseVersionError(String::from(s));
		let mut parts = s.trim().split('.');

		let mut next = |required: bool| -> Result<u64, ParseVersionError> {
			match parts.next() {
				Some(part) => part.parse::<u64>().map_err(|_| err()),
				None if required => Err(err()),
				None => Ok(0)
			}
		};

		let major = next(true)?;
		let minor = next(true)?;
		let release = next(false)?;

		if parts.next().is_some() || minor >= 1_000 || release >= 1_000 {
			return Err(err());
		}

		Ok(LibvirtVersion::new(major, minor, release))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_decompose_minimum() {
		assert_eq!(LibvirtVersion::from_encoded(4_005_000), LibvirtVersion::new(4, 5, 0));
		assert!(LibvirtVersion::from_encoded(4_005_000).supports_swtpm());
	}

	#[test]
	fn test_just_below_minimum() {
		let version = LibvirtVersion::from_encoded(4_004_999);
		assert_eq!(version, LibvirtVersion::new(4, 4, 999));
		assert!(version < LibvirtVersion::SWTPM_MINIMUM);
		assert!(!version.supports_swtpm());
	}

	#[test]
	fn test_major_dominates() {
		assert!(LibvirtVersion::new(5, 0, 0) > LibvirtVersion::new(4, 999, 999));
		assert!(LibvirtVersion::new(10, 0, 0).supports_swtpm());
		assert!(!LibvirtVersion::new(3, 999, 999).supports_swtpm());
	}

	#[test]
	fn test_parse_virsh_output() {
		let version: LibvirtVersion = "9.0.0".parse().unwrap();
		assert_eq!(version.encoded(), Some(9_000_000));
		assert_eq!("4.5".parse::<LibvirtVersion>().unwrap(), LibvirtVersion::new(4, 5, 0));
		assert_eq!(" 10.10.1\n".parse::<LibvirtVersion>().unwrap(), LibvirtVersion::new(10, 10, 1));
	}

	#[test]
	fn test_parse_rejects_garbage() {
		assert!("".parse::<LibvirtVersion>().is_err());
		assert!("9".parse::<LibvirtVersion>().is_err());
		assert!("9.x.0".parse::<LibvirtVersion>().is_err());
		assert!("1.2.3.4".parse::<LibvirtVersion>().is_err());
		assert!("1.1000.0".parse::<LibvirtVersion>().is_err());
	}

	#[test]
	fn test_encoded_does_not_overflow() {
		assert_eq!(LibvirtVersion::new(4, 4, 999).encoded(), Some(4_004_999));
		assert_eq!(LibvirtVersion::new(u64::MAX / 1_000_000, 999, 999).encoded(), None);
		assert_eq!(LibvirtVersion::new(u64::MAX, 0, 0).encoded(), None);

		let huge: LibvirtVersion = "18446744073709551615.0.0".parse().unwrap();
		assert_eq!(huge.encoded(), None);
	}

	#[test]
	fn test_display() {
		assert_eq!(LibvirtVersion::new(4, 4, 999).to_string(), "4.4.999");
	}
}
