use std::fmt::{self, Display, Formatter};
use std::ops::Deref;

use indexmap::IndexMap;
use parser::types::{DocumentOperations, Selection, SelectionSet};
use value::Name;

use crate::SchemaError;

/// The field-set of an entity key, such as `manufacturer { id } id`.
///
/// Each entry maps a field name to the key fields selected below it; leaf
/// fields map to an empty set.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct KeyFields(IndexMap<Name, KeyFields>);

impl Deref for KeyFields {
    type Target = IndexMap<Name, KeyFields>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl KeyFields {
    pub fn parse(fields: &str) -> Result<KeyFields, SchemaError> {
        let document = parser::parse_query(format!("{{{}}}", fields)).map_err(|err| {
            SchemaError::InvalidKeyFields {
                fields: fields.to_string(),
                message: err.to_string(),
            }
        })?;
        let selection_set = match document.operations {
            DocumentOperations::Single(operation) => operation.node.selection_set.node,
            DocumentOperations::Multiple(_) => {
                return Err(SchemaError::UnsupportedKeySelection {
                    fields: fields.to_string(),
                })
            }
        };

        let key_fields = convert_key_fields(fields, selection_set)?;
        if key_fields.is_empty() {
            return Err(SchemaError::EmptyKeyFields);
        }
        Ok(key_fields)
    }

    /// Every leaf of the field-set as a path from the representation root,
    /// in declaration order.
    ///
    /// `manufacturer { id } id` yields `[manufacturer, id]` and `[id]`.
    pub fn paths(&self) -> Vec<Vec<Name>> {
        fn collect_paths(
            key_fields: &KeyFields,
            prefix: &mut Vec<Name>,
            paths: &mut Vec<Vec<Name>>,
        ) {
            for (name, children) in key_fields.iter() {
                prefix.push(name.clone());
                if children.is_empty() {
                    paths.push(prefix.clone());
                } else {
                    collect_paths(children, prefix, paths);
                }
                prefix.pop();
            }
        }

        let mut paths = Vec::new();
        collect_paths(self, &mut Vec::new(), &mut paths);
        paths
    }
}

impl Display for KeyFields {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (idx, (name, children)) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", name)?;
            if !children.is_empty() {
                write!(f, " {{ {} }}", children)?;
            }
        }
        Ok(())
    }
}

fn convert_key_fields(fields: &str, selection_set: SelectionSet) -> Result<KeyFields, SchemaError> {
    let mut key_fields = IndexMap::new();
    for selection in selection_set.items {
        match selection.node {
            Selection::Field(field) => {
                let children = convert_key_fields(fields, field.node.selection_set.node)?;
                key_fields.insert(field.node.name.node, children);
            }
            Selection::FragmentSpread(_) | Selection::InlineFragment(_) => {
                return Err(SchemaError::UnsupportedKeySelection {
                    fields: fields.to_string(),
                })
            }
        }
    }
    Ok(KeyFields(key_fields))
}
