//! `$placeholder` substitution for domain definition templates.
//!
//! Placeholders are written `$name` or `${name}`, where `name` is an ASCII
//! identifier. `$$` produces a single `$`. Every placeholder must have a
//! value: a template is never rendered with holes left in it.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TemplateError {
	#[error("no value for template placeholder {0:?}")]
	MissingKey(String),

	#[error("invalid placeholder in template at line {line}, column {column}")]
	InvalidPlaceholder {
		line: usize,
		column: usize
	}
}

/// A parsed template.
#[derive(Debug, Clone)]
pub struct Template {
	source: String
}

impl Template {
	pub fn new(source: impl Into<String>) -> Template {
		Template { source: source.into() }
	}

	/// Substitute every placeholder with its value from `values`.
	pub fn render(&self, values: &HashMap<&str, String>) -> Result<String, TemplateError> {
		let mut out = String::with_capacity(self.source.len());
		let mut rest = self.source.as_str();

		while let Some(dollar) = rest.find('$') {
			out.push_str(&rest[..dollar]);
			let after = &rest[dollar + 1..];

			if let Some(tail) = after.strip_prefix('$') {
				out.push('$');
				rest = tail;
				continue;
			}

			let (name, tail) = if let Some(braced) = after.strip_prefix('{') {
				match braced.find('}') {
					Some(end) if is_identifier(&braced[..end]) => (&braced[..end], &braced[end + 1..]),
					_ => return Err(self.invalid_at(rest, dollar))
				}
			} else {
				let len = identifier_len(after);
				if len == 0 {
					return Err(self.invalid_at(rest, dollar));
				}
				(&after[..len], &after[len..])
			};

			match values.get(name) {
				Some(value) => out.push_str(value),
				None => return Err(TemplateError::MissingKey(String::from(name)))
			}
			rest = tail;
		}

		out.push_str(rest);
		Ok(out)
	}

	/// Names of all placeholders, in order of first appearance.
	pub fn placeholders(&self) -> Vec<&str> {
		let mut names: Vec<&str> = Vec::new();
		let mut rest = self.source.as_str();

		while let Some(dollar) = rest.find('$') {
			let after = &rest[dollar + 1..];
			let (name, tail) = if let Some(tail) = after.strip_prefix('$') {
				("", tail)
			} else if let Some(braced) = after.strip_prefix('{') {
				match braced.find('}') {
					Some(end) => (&braced[..end], &braced[end + 1..]),
					None => ("", braced)
				}
			} else {
				let len = identifier_len(after);
				(&after[..len], &after[len..])
			};

			if is_identifier(name) && !names.contains(&name) {
				names.push(name);
			}
			rest = tail;
		}

		names
	}

	fn invalid_at(&self, rest: &str, dollar: usize) -> TemplateError {
		let offset = self.source.len() - rest.len() + dollar;
		let before = &self.source[..offset];
		let line = before.matches('\n').count() + 1;
		let column = before.len() - before.rfind('\n').map_or(0, |nl| nl + 1) + 1;
		TemplateError::InvalidPlaceholder { line, column }
	}
}

/// Length in bytes of the identifier at the start of `s`.
fn identifier_len(s: &str) -> usize {
	let mut chars = s.char_indices();
	match chars.next() {
		Some((_, c)) if c == '_' || c.is_ascii_alphabetic() => {}
		_ => return 0
	}
	chars
		.find(|(_, c)| !(*c == '_' || c.is_ascii_alphanumeric()))
		.map_or(s.len(), |(i, _)| i)
}

fn is_identifier(s: &str) -> bool {
	!s.is_empty() && identifier_len(s) == s.len()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn values(pairs: &[(&'static str, &str)]) -> HashMap<&'static str, String> {
		pairs.iter().map(|(k, v)| (*k, String::from(*v))).collect()
	}

	#[test]
	fn test_plain_and_braced() {
		let template = Template::new("<name>$name</name><path>${dir}/disk.qcow2</path>");
		let out = template.render(&values(&[("name", "vm"), ("dir", "/srv")])).unwrap();
		assert_eq!(out, "<name>vm</name><path>/srv/disk.qcow2</path>");
	}

	#[test]
	fn test_identifier_stops_at_punctuation() {
		let template = Template::new("'$a'-$b_c.");
		let out = template.render(&values(&[("a", "1"), ("b_c", "2")])).unwrap();
		assert_eq!(out, "'1'-2.");
	}

	#[test]
	fn test_escaped_dollar() {
		let template = Template::new("cost: $$5 for $$$who");
		let out = template.render(&values(&[("who", "you")])).unwrap();
		assert_eq!(out, "cost: $5 for $you");
	}

	#[test]
	fn test_empty_value() {
		let template = Template::new("<devices>$tpm_support</devices>");
		let out = template.render(&values(&[("tpm_support", "")])).unwrap();
		assert_eq!(out, "<devices></devices>");
	}

	#[test]
	fn test_missing_key_fails() {
		let template = Template::new("$present and ${absent}");
		let err = template.render(&values(&[("present", "x")])).unwrap_err();
		assert_eq!(err, TemplateError::MissingKey(String::from("absent")));
	}

	#[test]
	fn test_invalid_placeholders() {
		let no_values = HashMap::new();
		assert_eq!(
			Template::new("ok\n  $ 1").render(&no_values).unwrap_err(),
			TemplateError::InvalidPlaceholder { line: 2, column: 3 }
		);
		assert!(matches!(
			Template::new("${unterminated").render(&no_values),
			Err(TemplateError::InvalidPlaceholder { line: 1, column: 1 })
		));
		assert!(matches!(
			Template::new("${1abc}").render(&no_values),
			Err(TemplateError::InvalidPlaceholder { .. })
		));
		assert!(matches!(
			Template::new("trailing $").render(&no_values),
			Err(TemplateError::InvalidPlaceholder { .. })
		));
	}

	#[test]
	fn test_placeholders() {
		let template = Template::new("$a ${b} $$c $a ${bad");
		assert_eq!(template.placeholders(), vec!["a", "b"]);
	}
}
