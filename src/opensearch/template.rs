//! Index template descriptors for the request log indices.
//!
//! [`build_template`] yields the template installed by the provisioner: a fixed set of core
//! fields describing a request, plus whatever extra fields the caller declared for custom data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Strings longer than this are not indexed into the `keyword` sub-field.
const KEYWORD_IGNORE_ABOVE: u32 = 256;

/// A legacy (`_template`) index template.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct IndexTemplate {
    /// Template name, part of the URL rather than of the body.
    #[serde(skip)]
    pub name: String,
    /// Index name globs the template applies to.
    pub index_patterns: Vec<String>,
    /// Field mappings for matching indices.
    pub mappings: Mapping,
    /// Settings for matching indices.
    pub settings: TemplateSettings,
}

/// Settings block of a template.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TemplateSettings {
    pub index: IndexSettings,
}

/// Index configuration settings.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct IndexSettings {
    /// Number of primary shards.
    pub number_of_shards: u32,
    /// Number of replica shards.
    pub number_of_replicas: u32,
}

/// Index field mappings container.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Mapping {
    /// Field name to mapping definition.
    pub properties: BTreeMap<String, FieldMapping>,
}

/// OpenSearch field type definitions.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldMapping {
    /// Full-text searchable field, optionally with multi-fields (e.g. a `keyword` twin).
    Text {
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        fields: BTreeMap<String, FieldMapping>,
    },
    /// Exact-match field for filtering and aggregations.
    Keyword {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ignore_above: Option<u32>,
    },
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    Long,
    /// Single-precision floating point.
    Float,
    /// Double-precision floating point.
    Double,
    /// Date/time field.
    Date,
    /// Boolean field.
    Boolean,
    /// JSON object. With `enabled: false` the content is stored but neither parsed nor indexed.
    Object {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        enabled: Option<bool>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        properties: BTreeMap<String, FieldMapping>,
    },
    /// Nested document (independently searchable).
    Nested {
        #[serde(default)]
        properties: BTreeMap<String, FieldMapping>,
    },
}

impl FieldMapping {
    /// A text field with a `keyword` sub-field, the default mapping for short strings.
    pub fn text_with_keyword() -> Self {
        FieldMapping::Text {
            fields: BTreeMap::from([(
                "keyword".to_string(),
                FieldMapping::Keyword {
                    ignore_above: Some(KEYWORD_IGNORE_ABOVE),
                },
            )]),
        }
    }

    /// An object which is kept in `_source` but not indexed.
    pub fn opaque_object() -> Self {
        FieldMapping::Object {
            enabled: Some(false),
            properties: BTreeMap::new(),
        }
    }

    /// An indexed object with the given sub-fields.
    pub fn object<I, K>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, FieldMapping)>,
        K: Into<String>,
    {
        FieldMapping::Object {
            enabled: None,
            properties: properties
                .into_iter()
                .map(|(key, mapping)| (key.into(), mapping))
                .collect(),
        }
    }
}

/// Builds the index template for the given name.
///
/// The core request fields are always present. `extra_fields` are merged on top of them, so a
/// caller-supplied definition replaces a core field of the same name.
pub fn build_template(
    name: &str,
    number_of_shards: u32,
    number_of_replicas: u32,
    extra_fields: &BTreeMap<String, FieldMapping>,
) -> IndexTemplate {
    let mut properties = core_fields();
    properties.extend(
        extra_fields
            .iter()
            .map(|(field, mapping)| (field.clone(), mapping.clone())),
    );

    IndexTemplate {
        name: name.to_string(),
        index_patterns: vec![format!("{}-*", name)],
        mappings: Mapping { properties },
        settings: TemplateSettings {
            index: IndexSettings {
                number_of_shards,
                number_of_replicas,
            },
        },
    }
}

fn core_fields() -> BTreeMap<String, FieldMapping> {
    let error = FieldMapping::object([
        ("code", FieldMapping::text_with_keyword()),
        ("message", FieldMapping::text_with_keyword()),
        ("payload", FieldMapping::opaque_object()),
    ]);

    BTreeMap::from([
        ("@timestamp".to_string(), FieldMapping::Date),
        ("appName".to_string(), FieldMapping::text_with_keyword()),
        ("body".to_string(), FieldMapping::opaque_object()),
        ("error".to_string(), error),
        ("headers".to_string(), FieldMapping::opaque_object()),
        ("method".to_string(), FieldMapping::text_with_keyword()),
        ("params".to_string(), FieldMapping::opaque_object()),
        ("path".to_string(), FieldMapping::text_with_keyword()),
        ("query".to_string(), FieldMapping::opaque_object()),
        ("route".to_string(), FieldMapping::text_with_keyword()),
        ("spec".to_string(), FieldMapping::text_with_keyword()),
        ("statusCode".to_string(), FieldMapping::Integer),
        ("took".to_string(), FieldMapping::Integer),
        ("version".to_string(), FieldMapping::text_with_keyword()),
    ])
}
