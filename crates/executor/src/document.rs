use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use parser::types::{self as ast, DocumentOperations, ExecutableDocument, OperationType};
use parser::{Pos, Positioned};
use value::{ConstValue, Name, Value, Variables};

use crate::error::ExecutorError;

pub type SelectionSet = Arc<[Selection]>;

#[derive(Debug, Clone)]
pub enum Selection {
    Field(Arc<Field>),
    FragmentSpread(Arc<FragmentSpread>),
    InlineFragment(Arc<InlineFragment>),
}

#[derive(Debug)]
pub struct Field {
    pub alias: Option<Name>,
    pub name: Name,
    pub arguments: Vec<(Name, Value)>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
    pub pos: Pos,
}

impl Field {
    /// The key this field is written under in the response.
    pub fn response_key(&self) -> &Name {
        self.alias.as_ref().unwrap_or(&self.name)
    }
}

#[derive(Debug)]
pub struct Directive {
    pub name: Name,
    pub arguments: Vec<(Name, Value)>,
}

impl Directive {
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments
            .iter()
            .find(|(arg_name, _)| arg_name.as_str() == name)
            .map(|(_, value)| value)
    }
}

#[derive(Debug)]
pub struct FragmentSpread {
    pub fragment_name: Name,
    pub directives: Vec<Directive>,
}

#[derive(Debug)]
pub struct InlineFragment {
    pub type_condition: Option<Name>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
}

#[derive(Debug)]
pub struct Fragment {
    pub type_condition: Name,
    pub selection_set: SelectionSet,
}

#[derive(Debug)]
pub struct Operation {
    pub name: Option<Name>,
    pub ty: OperationType,
    pub variable_defaults: Vec<(Name, ConstValue)>,
    pub selection_set: SelectionSet,
}

impl Operation {
    /// The request variables with declared defaults filled in.
    pub fn variables(&self, mut variables: Variables) -> Variables {
        for (name, default) in &self.variable_defaults {
            if !variables.contains_key(name) {
                variables.insert(name.clone(), default.clone());
            }
        }
        variables
    }
}

/// An executable document converted into shared, immutable selection trees.
#[derive(Debug)]
pub struct Document {
    operations: Vec<Operation>,
    fragments: HashMap<Name, Fragment>,
}

impl Document {
    pub fn parse(query: &str) -> Result<Self, ExecutorError> {
        Self::from_executable(parser::parse_query(query)?)
    }

    pub fn from_executable(document: ExecutableDocument) -> Result<Self, ExecutorError> {
        let operations = match document.operations {
            DocumentOperations::Single(operation) => vec![convert_operation(None, operation)],
            DocumentOperations::Multiple(operations) => operations
                .into_iter()
                .map(|(name, operation)| convert_operation(Some(name), operation))
                .collect(),
        };
        let fragments = document
            .fragments
            .into_iter()
            .map(|(name, fragment)| {
                let fragment = fragment.node;
                (
                    name,
                    Fragment {
                        type_condition: fragment.type_condition.node.on.node,
                        selection_set: convert_selection_set(fragment.selection_set),
                    },
                )
            })
            .collect();

        let document = Self {
            operations,
            fragments,
        };
        document.check_fragment_spreads()?;
        Ok(document)
    }

    pub fn operation(&self, name: Option<&str>) -> Result<&Operation, ExecutorError> {
        match name {
            Some(name) => self
                .operations
                .iter()
                .find(|operation| operation.name.as_deref() == Some(name))
                .ok_or_else(|| ExecutorError::UnknownOperation(name.to_string())),
            None if self.operations.len() == 1 => Ok(&self.operations[0]),
            None => Err(ExecutorError::MissingOperationName),
        }
    }

    pub fn fragment(&self, name: &str) -> Option<&Fragment> {
        self.fragments.get(name)
    }

    fn check_fragment_spreads(&self) -> Result<(), ExecutorError> {
        fn check(document: &Document, selection_set: &[Selection]) -> Result<(), ExecutorError> {
            for selection in selection_set {
                match selection {
                    Selection::Field(field) => check(document, &field.selection_set)?,
                    Selection::InlineFragment(fragment) => {
                        check(document, &fragment.selection_set)?
                    }
                    Selection::FragmentSpread(spread) => {
                        if document.fragment(&spread.fragment_name).is_none() {
                            return Err(ExecutorError::UnknownFragment(
                                spread.fragment_name.clone(),
                            ));
                        }
                    }
                }
            }
            Ok(())
        }

        for operation in &self.operations {
            check(self, &operation.selection_set)?;
        }
        for fragment in self.fragments.values() {
            check(self, &fragment.selection_set)?;
        }
        Ok(())
    }
}

/// Substitute variables into a value; unbound variables become `null`.
pub fn resolve_value(value: &Value, variables: &Variables) -> ConstValue {
    let resolved = value.clone().into_const_with(|name| {
        Ok::<_, Infallible>(variables.get(&name).cloned().unwrap_or_default())
    });
    match resolved {
        Ok(value) => value,
        Err(err) => match err {},
    }
}

fn convert_operation(
    name: Option<Name>,
    operation: Positioned<ast::OperationDefinition>,
) -> Operation {
    let operation = operation.node;
    Operation {
        name,
        ty: operation.ty,
        variable_defaults: operation
            .variable_definitions
            .into_iter()
            .filter_map(|definition| {
                let definition = definition.node;
                definition
                    .default_value
                    .map(|value| (definition.name.node, value.node))
            })
            .collect(),
        selection_set: convert_selection_set(operation.selection_set),
    }
}

fn convert_selection_set(selection_set: Positioned<ast::SelectionSet>) -> SelectionSet {
    selection_set
        .node
        .items
        .into_iter()
        .map(|selection| match selection.node {
            ast::Selection::Field(field) => {
                let pos = field.pos;
                let field = field.node;
                Selection::Field(Arc::new(Field {
                    alias: field.alias.map(|alias| alias.node),
                    name: field.name.node,
                    arguments: convert_arguments(field.arguments),
                    directives: convert_directives(field.directives),
                    selection_set: convert_selection_set(field.selection_set),
                    pos,
                }))
            }
            ast::Selection::FragmentSpread(spread) => {
                let spread = spread.node;
                Selection::FragmentSpread(Arc::new(FragmentSpread {
                    fragment_name: spread.fragment_name.node,
                    directives: convert_directives(spread.directives),
                }))
            }
            ast::Selection::InlineFragment(fragment) => {
                let fragment = fragment.node;
                Selection::InlineFragment(Arc::new(InlineFragment {
                    type_condition: fragment
                        .type_condition
                        .map(|condition| condition.node.on.node),
                    directives: convert_directives(fragment.directives),
                    selection_set: convert_selection_set(fragment.selection_set),
                }))
            }
        })
        .collect::<Vec<_>>()
        .into()
}

fn convert_arguments(
    arguments: Vec<(Positioned<Name>, Positioned<Value>)>,
) -> Vec<(Name, Value)> {
    arguments
        .into_iter()
        .map(|(name, value)| (name.node, value.node))
        .collect()
}

fn convert_directives(directives: Vec<Positioned<ast::Directive>>) -> Vec<Directive> {
    directives
        .into_iter()
        .map(|directive| {
            let directive = directive.node;
            Directive {
                name: directive.name.node,
                arguments: convert_arguments(directive.arguments),
            }
        })
        .collect()
}
