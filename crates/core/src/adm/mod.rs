//! Administrative operations: schema, table, column, and index DDL. Every
//! mutation here is followed by a catalog reload at the call site.

pub mod column;
pub mod database;
pub mod index;
pub mod table;

pub use table::{ColumnSpec, IndexSpec, TableSpec};

use once_cell::sync::Lazy;
use regex::Regex;

static IDENT: Lazy<Regex> = Lazy::new(|| Regex::new("^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap());

/// Identifiers end up spliced into DDL, so their shape is checked up front.
pub fn valid_ident(name: &str) -> bool {
	IDENT.is_match(name)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identifier_shape_is_enforced() {
		assert!(valid_ident("users"));
		assert!(valid_ident("_private"));
		assert!(valid_ident("tab_1"));
		assert!(!valid_ident("1tab"));
		assert!(!valid_ident("users; DROP TABLE x"));
		assert!(!valid_ident("a-b"));
		assert!(!valid_ident(""));
	}
}
