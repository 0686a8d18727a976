#![allow(dead_code)]

use dtschema_core::SchemaError;

/// Primitive definitions shared by the test documents.
pub const PRIMITIVES: &str = r#"
name: byte
type: integer
attributes:
  format: unsigned
  size: 1
  units: bytes
---
name: uint16
type: integer
attributes:
  format: unsigned
  size: 2
  units: bytes
---
name: uint32
type: integer
attributes:
  format: unsigned
  size: 4
  units: bytes
"#;

/// `PRIMITIVES` followed by `rest`.
pub fn with_primitives(rest: &str) -> String {
    format!("{PRIMITIVES}---\n{rest}")
}

/// Detail text of a parse error, panicking on any other error.
pub fn parse_detail(err: SchemaError) -> String {
    match err {
        SchemaError::Parse { detail, .. } => detail,
        other => panic!("expected a parse error, got {other:?}"),
    }
}
