//! Translation of GraphQL query text into a domain [`Operation`].
//!
//! Parsing is delegated to `async-graphql-parser`. This module picks the
//! operation to run, substitutes variables, evaluates `@skip`/`@include`,
//! inlines fragments and merges fields sharing a response key, so the executor
//! only ever sees plain field selections.

use std::collections::{HashMap, HashSet};

use async_graphql_parser::Positioned;
use async_graphql_parser::types::{
    Directive, DocumentOperations, ExecutableDocument, Field, FragmentDefinition,
    OperationDefinition, OperationType, Selection, SelectionSet,
};
use async_graphql_value::{ConstValue, Name, Value as GqlValue};
use serde_json::{Map, Value};

use crate::domain::Error;
use crate::domain::graph::{FieldSelection, Operation, OperationKind};

/// Build the operation a request asks for.
///
/// # Errors
/// Returns `invalid_request` for unparsable text, an unknown or ambiguous
/// operation name, subscriptions, undefined variables or fragments, fragment
/// cycles and conflicting fields under one response key.
pub fn build_operation(
    query: &str,
    operation_name: Option<&str>,
    variables: Map<String, Value>,
) -> Result<Operation, Error> {
    let document = async_graphql_parser::parse_query(query)
        .map_err(|err| Error::invalid_request(format!("failed to parse query: {err}")))?;
    let ExecutableDocument {
        operations,
        fragments,
    } = document;
    let definition = select_operation(operations, operation_name)?;

    let kind = match definition.ty {
        OperationType::Query => OperationKind::Query,
        OperationType::Mutation => OperationKind::Mutation,
        OperationType::Subscription => {
            return Err(Error::invalid_request("subscriptions are not supported"));
        }
    };

    let context = Context {
        variables: bind_variables(&definition, variables)?,
        fragments: &fragments,
    };
    let selections = context.flatten(&definition.selection_set.node, &mut HashSet::new())?;
    Ok(Operation { kind, selections })
}

fn select_operation(
    operations: DocumentOperations,
    operation_name: Option<&str>,
) -> Result<OperationDefinition, Error> {
    match operations {
        DocumentOperations::Single(operation) => Ok(operation.node),
        DocumentOperations::Multiple(mut named) => match operation_name {
            Some(name) => named
                .remove(name)
                .map(|operation| operation.node)
                .ok_or_else(|| Error::invalid_request(format!("unknown operation `{name}`"))),
            None if named.len() == 1 => named
                .into_values()
                .next()
                .map(|operation| operation.node)
                .ok_or_else(|| Error::invalid_request("document contains no operation")),
            None => Err(Error::invalid_request(
                "operationName is required when the document has several operations",
            )),
        },
    }
}

/// Resolve every declared variable from the request, falling back to its
/// default and then to `null`.
fn bind_variables(
    definition: &OperationDefinition,
    mut provided: Map<String, Value>,
) -> Result<HashMap<Name, ConstValue>, Error> {
    let mut bound = HashMap::new();
    for variable in &definition.variable_definitions {
        let name = variable.node.name.node.clone();
        let value = match provided.remove(name.as_str()) {
            Some(json) => ConstValue::from_json(json).map_err(|err| {
                Error::invalid_request(format!("variable `${name}` is not valid: {err}"))
            })?,
            None => variable
                .node
                .default_value
                .as_ref()
                .map_or(ConstValue::Null, |default| default.node.clone()),
        };
        if value == ConstValue::Null && !variable.node.var_type.node.nullable {
            return Err(Error::invalid_request(format!(
                "variable `${name}` of non-null type must be provided"
            )));
        }
        bound.insert(name, value);
    }
    Ok(bound)
}

struct Context<'doc> {
    variables: HashMap<Name, ConstValue>,
    fragments: &'doc HashMap<Name, Positioned<FragmentDefinition>>,
}

impl Context<'_> {
    fn resolve(&self, value: &GqlValue) -> Result<ConstValue, Error> {
        value.clone().into_const_with(|name| {
            self.variables
                .get(&name)
                .cloned()
                .ok_or_else(|| Error::invalid_request(format!("variable `${name}` is not defined")))
        })
    }

    fn to_json(&self, value: &GqlValue) -> Result<Value, Error> {
        self.resolve(value)?
            .into_json()
            .map_err(|err| Error::invalid_request(format!("unsupported argument value: {err}")))
    }

    /// Evaluate `@skip(if:)` and `@include(if:)`.
    fn included(&self, directives: &[Positioned<Directive>]) -> Result<bool, Error> {
        for directive in directives {
            let directive = &directive.node;
            let condition = match directive.name.node.as_str() {
                "skip" => false,
                "include" => true,
                other => {
                    return Err(Error::invalid_request(format!(
                        "unknown directive `@{other}`"
                    )));
                }
            };
            let argument = directive
                .get_argument("if")
                .ok_or_else(|| {
                    Error::invalid_request(format!(
                        "directive `@{}` requires an `if` argument",
                        directive.name.node
                    ))
                })
                .and_then(|value| self.resolve(&value.node))?;
            match argument {
                ConstValue::Boolean(flag) if flag != condition => return Ok(false),
                ConstValue::Boolean(_) => {}
                _ => {
                    return Err(Error::invalid_request(format!(
                        "directive `@{}` expects a Boolean `if` argument",
                        directive.name.node
                    )));
                }
            }
        }
        Ok(true)
    }

    /// Inline fragments and merge fields into a list keyed by response key.
    fn flatten(
        &self,
        set: &SelectionSet,
        visiting: &mut HashSet<Name>,
    ) -> Result<Vec<FieldSelection>, Error> {
        let mut merged: Vec<FieldSelection> = Vec::new();
        self.collect(set, visiting, &mut merged)?;
        Ok(merged)
    }

    fn collect(
        &self,
        set: &SelectionSet,
        visiting: &mut HashSet<Name>,
        merged: &mut Vec<FieldSelection>,
    ) -> Result<(), Error> {
        for item in &set.items {
            match &item.node {
                Selection::Field(field) => {
                    if self.included(&field.node.directives)? {
                        let selection = self.field(&field.node, visiting)?;
                        merge_field(merged, selection)?;
                    }
                }
                Selection::InlineFragment(fragment) => {
                    if self.included(&fragment.node.directives)? {
                        self.collect(&fragment.node.selection_set.node, visiting, merged)?;
                    }
                }
                Selection::FragmentSpread(spread) => {
                    if !self.included(&spread.node.directives)? {
                        continue;
                    }
                    let name = &spread.node.fragment_name.node;
                    let definition = self.fragments.get(name).ok_or_else(|| {
                        Error::invalid_request(format!("unknown fragment `{name}`"))
                    })?;
                    if !visiting.insert(name.clone()) {
                        return Err(Error::invalid_request(format!(
                            "fragment `{name}` spreads itself"
                        )));
                    }
                    self.collect(&definition.node.selection_set.node, visiting, merged)?;
                    visiting.remove(name);
                }
            }
        }
        Ok(())
    }

    fn field(&self, field: &Field, visiting: &mut HashSet<Name>) -> Result<FieldSelection, Error> {
        let mut arguments = Map::new();
        for (name, value) in &field.arguments {
            arguments.insert(name.node.to_string(), self.to_json(&value.node)?);
        }
        Ok(FieldSelection {
            name: field.name.node.to_string(),
            alias: field.alias.as_ref().map(|alias| alias.node.to_string()),
            arguments,
            selections: self.flatten(&field.selection_set.node, visiting)?,
        })
    }
}

/// Add `selection`, merging it into an earlier field with the same response
/// key when both select the same field with the same arguments.
fn merge_field(merged: &mut Vec<FieldSelection>, selection: FieldSelection) -> Result<(), Error> {
    let Some(existing) = merged
        .iter_mut()
        .find(|field| field.response_key() == selection.response_key())
    else {
        merged.push(selection);
        return Ok(());
    };
    if existing.name != selection.name || existing.arguments != selection.arguments {
        return Err(Error::invalid_request(format!(
            "fields under response key `{}` conflict",
            selection.response_key()
        )));
    }
    for child in selection.selections {
        merge_field(&mut existing.selections, child)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorCode;
    use rstest::rstest;
    use serde_json::json;

    fn build(query: &str) -> Result<Operation, Error> {
        build_operation(query, None, Map::new())
    }

    fn leaf(name: &str) -> FieldSelection {
        FieldSelection::new(name)
    }

    #[rstest]
    fn plain_queries_become_field_selections() {
        let operation = build("{ users { id posts { title } } }").expect("valid");
        assert_eq!(
            operation,
            Operation::query(vec![FieldSelection::new("users").with_selections(vec![
                leaf("id"),
                FieldSelection::new("posts").with_selections(vec![leaf("title")]),
            ])])
        );
    }

    #[rstest]
    fn variables_and_defaults_are_substituted() {
        let variables = json!({"id": 2}).as_object().cloned().expect("object");
        let operation = build_operation(
            "query Q($id: Int!) { user(id: $id) { id } }",
            None,
            variables,
        )
        .expect("valid");
        assert_eq!(operation.selections[0].arguments.get("id"), Some(&json!(2)));

        let mutation = build_operation(
            "mutation M($name: String = \"ada\") { createUser(name: $name) { id } }",
            None,
            Map::new(),
        )
        .expect("valid");
        assert_eq!(mutation.kind, OperationKind::Mutation);
        assert_eq!(
            mutation.selections[0].arguments.get("name"),
            Some(&json!("ada"))
        );
    }

    #[rstest]
    fn fragments_are_inlined_and_merged() {
        let operation = build(
            "{ posts { ...Summary ... on Post { author { id } } author { name } } }
             fragment Summary on Post { id title }",
        )
        .expect("valid");
        assert_eq!(
            operation.selections[0].selections,
            vec![
                leaf("id"),
                leaf("title"),
                FieldSelection::new("author").with_selections(vec![leaf("id"), leaf("name")]),
            ]
        );
    }

    #[rstest]
    fn skip_and_include_are_honoured() {
        let variables = json!({"full": false}).as_object().cloned().expect("object");
        let operation = build_operation(
            "query($full: Boolean!) { \
                users { id name @include(if: $full) posts @skip(if: true) { id } } \
            }",
            None,
            variables,
        )
        .expect("valid");
        assert_eq!(operation.selections[0].selections, vec![leaf("id")]);
    }

    #[rstest]
    fn named_operations_are_selected_by_name() {
        let query = "query A { users { id } } query B { posts { id } }";
        let operation = build_operation(query, Some("B"), Map::new()).expect("valid");
        assert_eq!(operation.selections[0].name, "posts");
    }

    #[rstest]
    #[case::syntax("{ users { id }", "failed to parse query")]
    #[case::subscription("subscription { users { id } }", "subscriptions are not supported")]
    #[case::ambiguous(
        "query A { users { id } } query B { posts { id } }",
        "operationName is required"
    )]
    #[case::undefined_variable("{ user(id: $id) { id } }", "`$id` is not defined")]
    #[case::missing_variable("query($id: Int!) { user(id: $id) { id } }", "must be provided")]
    #[case::unknown_fragment("{ users { ...Missing } }", "unknown fragment `Missing`")]
    #[case::cycle(
        "{ users { ...A } } fragment A on User { posts { author { ...A } } }",
        "spreads itself"
    )]
    #[case::conflict("{ users { id: name id } }", "conflict")]
    #[case::directive("{ users @cached { id } }", "unknown directive")]
    fn malformed_documents_are_rejected(#[case] query: &str, #[case] fragment: &str) {
        let err = build(query).expect_err("invalid document");
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
        assert!(
            err.message().contains(fragment),
            "`{}` should mention `{fragment}`",
            err.message()
        );
    }

    #[rstest]
    fn unknown_operation_names_are_rejected() {
        let err = build_operation("query A { users { id } }", Some("Z"), Map::new())
            .expect_err("unknown name");
        assert_eq!(err.message(), "unknown operation `Z`");
    }
}
