//! Serde shapes of one YAML definition document.
//!
//! These mirror the keys accepted in definitions files one-to-one; every
//! struct denies unknown keys so that typos surface as parse errors with the
//! key path instead of being silently dropped.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawDefinition {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: Option<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Free-form `type: format` metadata (authors, year).
    pub metadata: Option<serde_yaml::Mapping>,
    #[serde(default)]
    pub attributes: RawAttributes,
    /// Member maps for structures, member names for structure-groups. Kept
    /// untyped here and deserialized per kind.
    pub members: Option<Vec<serde_yaml::Value>>,
    pub values: Option<Vec<RawEnumerationValue>>,
    pub value: Option<RawLiteral>,
    pub base: Option<String>,
    pub identifier: Option<String>,
    pub default: Option<String>,
    pub element_data_type: Option<String>,
    pub number_of_elements: Option<RawSize>,
    pub elements_data_size: Option<RawSize>,
    pub elements_terminator: Option<RawBytes>,
    pub encoding: Option<String>,
    pub alignment_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawAttributes {
    pub byte_order: Option<String>,
    pub format: Option<String>,
    pub size: Option<usize>,
    pub units: Option<String>,
    pub encoding: Option<String>,
    pub false_value: Option<u64>,
    pub true_value: Option<u64>,
    pub alignment_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawMember {
    pub name: String,
    pub data_type: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub attributes: RawAttributes,
    pub element_data_type: Option<String>,
    pub number_of_elements: Option<RawSize>,
    pub elements_data_size: Option<RawSize>,
    pub elements_terminator: Option<RawBytes>,
    pub encoding: Option<String>,
    pub alignment_size: Option<usize>,
    pub members: Option<Vec<RawMember>>,
    pub condition: Option<String>,
    pub value: Option<RawLiteral>,
    pub values: Option<Vec<RawLiteral>>,
    #[serde(default)]
    pub clamp_negative_size: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawEnumerationValue {
    pub name: String,
    pub number: i64,
    pub description: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// `number_of_elements` / `elements_data_size`: a literal or an expression.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawSize {
    Literal(u64),
    Expression(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawLiteral {
    Signed(i64),
    Unsigned(u64),
    Bool(bool),
    Text(String),
}

/// A terminator: a string whose code points are bytes, or a list of bytes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawBytes {
    Text(String),
    List(Vec<u8>),
}
