//! WHERE / HAVING compilation
//!
//! Compilation happens in two steps:
//!
//! 1. `build_tree` validates the predicate list and turns the bracket and
//!    connective flags into an explicit chain of items. An item is either a
//!    single condition or one bracket group of conditions sharing a single
//!    connective.
//! 2. `lower` folds the chain right to left into one filter document. When
//!    the connective across a boundary is unchanged the tail is flattened
//!    into the current document; when it changes the tail is nested under
//!    `$and`/`$or` keyed by the new connective.
//!
//! Rejected (UnsupportedFilter): XOR anywhere, nested brackets, unmatched
//! brackets, a node that both opens and closes a bracket, and mixed
//! connectives inside one bracket group.

use bson::{doc, Bson, Document};

use super::naming::NameResolver;
use crate::codec::literal_to_bson;
use crate::errors::{GatewayError, GatewayResult};
use crate::query::{CompareOp, Connective, Literal, Where};

/// A compiled `{field: {op: value}}` condition
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: Document,
}

impl Condition {
    fn to_document(&self) -> Document {
        let mut document = Document::new();
        document.insert(self.field.clone(), self.operator.clone());
        document
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterTerm {
    Condition(Condition),
    /// A bracketed group; every member shares `connective`
    Group {
        connective: Connective,
        conditions: Vec<Condition>,
    },
}

/// One link of the chain; `connective` joins it to the previous item
#[derive(Debug, Clone, PartialEq)]
pub struct FilterItem {
    pub connective: Connective,
    pub term: FilterTerm,
}

/// Boolean expression recovered from a predicate list
#[derive(Debug, Clone, PartialEq)]
pub struct FilterTree {
    pub items: Vec<FilterItem>,
}

struct OpenGroup {
    connective: Connective,
    inner: Option<Connective>,
    conditions: Vec<Condition>,
}

/// Compiles predicate lists into filter documents
#[derive(Debug, Clone, Copy)]
pub struct FilterCompiler<'a> {
    resolver: NameResolver<'a>,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(resolver: NameResolver<'a>) -> Self {
        Self { resolver }
    }

    /// Compiles a predicate list; None when the list is empty
    pub fn compile(&self, nodes: &[Where]) -> GatewayResult<Option<Document>> {
        Ok(self.build_tree(nodes)?.map(|tree| lower(&tree)))
    }

    /// Validates a predicate list and recovers its boolean structure
    pub fn build_tree(&self, nodes: &[Where]) -> GatewayResult<Option<FilterTree>> {
        if nodes.is_empty() {
            return Ok(None);
        }

        if let Some(node) = nodes.iter().find(|n| n.connective == Some(Connective::Xor)) {
            return Err(GatewayError::unsupported_filter(format!(
                "XOR connective on '{}' has no document-store equivalent",
                node.column.name
            )));
        }

        let mut items = Vec::new();
        let mut open: Option<OpenGroup> = None;

        for (index, node) in nodes.iter().enumerate() {
            // the first node has no predecessor
            let connective = if index == 0 {
                Connective::And
            } else {
                node.effective_connective()
            };

            if node.bracket_start && node.bracket_end {
                return Err(GatewayError::unsupported_filter(format!(
                    "predicate on '{}' both opens and closes a bracket",
                    node.column.name
                )));
            }

            let condition = self.condition(node)?;

            if node.bracket_start {
                if open.is_some() {
                    return Err(GatewayError::unsupported_filter(
                        "nested brackets are not supported",
                    ));
                }
                open = Some(OpenGroup {
                    connective,
                    inner: None,
                    conditions: vec![condition],
                });
                continue;
            }

            match open.as_mut() {
                Some(group) => {
                    match group.inner {
                        None => group.inner = Some(connective),
                        Some(inner) if inner != connective => {
                            return Err(GatewayError::unsupported_filter(format!(
                                "bracket mixes {} and {}",
                                inner.as_str(),
                                connective.as_str()
                            )));
                        }
                        Some(_) => {}
                    }
                    group.conditions.push(condition);

                    if node.bracket_end {
                        if let Some(group) = open.take() {
                            items.push(FilterItem {
                                connective: group.connective,
                                term: FilterTerm::Group {
                                    connective: group.inner.unwrap_or(Connective::And),
                                    conditions: group.conditions,
                                },
                            });
                        }
                    }
                }
                None => {
                    if node.bracket_end {
                        return Err(GatewayError::unsupported_filter(format!(
                            "closing bracket on '{}' without an opening bracket",
                            node.column.name
                        )));
                    }
                    items.push(FilterItem {
                        connective,
                        term: FilterTerm::Condition(condition),
                    });
                }
            }
        }

        if open.is_some() {
            return Err(GatewayError::unsupported_filter("unmatched opening bracket"));
        }

        Ok(Some(FilterTree { items }))
    }

    fn condition(&self, node: &Where) -> GatewayResult<Condition> {
        Ok(Condition {
            field: self.resolver.field(&node.column)?,
            operator: operator_document(node)?,
        })
    }
}

/// Translate one predicate's operator and value
fn operator_document(node: &Where) -> GatewayResult<Document> {
    let value = literal_to_bson(&node.value);
    let operator = match node.op {
        CompareOp::Eq | CompareOp::Is => doc! { "$eq": value },
        CompareOp::Ne | CompareOp::IsNot => doc! { "$ne": value },
        CompareOp::Lt => doc! { "$lt": value },
        CompareOp::Lte => doc! { "$lte": value },
        CompareOp::Gt => doc! { "$gt": value },
        CompareOp::Gte => doc! { "$gte": value },
        CompareOp::In => doc! { "$in": as_array(value) },
        CompareOp::NotIn => doc! { "$nin": as_array(value) },
        CompareOp::Like => doc! { "$regex": like_pattern(node)? },
        CompareOp::NotLike => doc! { "$not": { "$regex": like_pattern(node)? } },
    };
    Ok(operator)
}

fn as_array(value: Bson) -> Bson {
    match value {
        Bson::Array(_) => value,
        other => Bson::Array(vec![other]),
    }
}

/// `%` wildcards are dropped and the rest is matched as a substring
fn like_pattern(node: &Where) -> GatewayResult<String> {
    match &node.value {
        Literal::String(pattern) => {
            let text = pattern.replace('%', "");
            Ok(format!(".*{}.*", regex::escape(&text)))
        }
        other => Err(GatewayError::unsupported_filter(format!(
            "{} on '{}' needs a string pattern, got {}",
            node.op.as_str(),
            node.column.name,
            other.tag()
        ))),
    }
}

/// Lowers a filter tree into a single filter document
pub fn lower(tree: &FilterTree) -> Document {
    let mut acc: Option<Document> = None;

    for index in (0..tree.items.len()).rev() {
        let item = &tree.items[index];
        let mut document = lower_term(&item.term);

        if let Some(tail) = acc.take() {
            let next = tree.items[index + 1].connective;
            if next == item.connective {
                merge_document(&mut document, tail);
            } else {
                merge_field(
                    &mut document,
                    connective_key(next),
                    Bson::Array(vec![Bson::Document(tail)]),
                );
            }
        }
        acc = Some(document);
    }

    acc.unwrap_or_default()
}

fn lower_term(term: &FilterTerm) -> Document {
    match term {
        FilterTerm::Condition(condition) => condition.to_document(),
        FilterTerm::Group {
            connective: Connective::Or,
            conditions,
        } => {
            let branches = conditions
                .iter()
                .map(|c| Bson::Document(c.to_document()))
                .collect::<Vec<_>>();
            doc! { "$or": branches }
        }
        FilterTerm::Group { conditions, .. } => {
            let mut document = Document::new();
            for condition in conditions {
                merge_field(
                    &mut document,
                    &condition.field,
                    Bson::Document(condition.operator.clone()),
                );
            }
            document
        }
    }
}

fn connective_key(connective: Connective) -> &'static str {
    match connective {
        Connective::Or => "$or",
        // XOR never survives validation
        Connective::And | Connective::Xor => "$and",
    }
}

/// Merge every key of `other` into `target`
pub fn merge_document(target: &mut Document, other: Document) {
    for (key, value) in other {
        merge_field(target, &key, value);
    }
}

/// Insert one key, combining with an existing entry instead of overwriting
///
/// - `$and` arrays are concatenated
/// - operator documents on the same field with disjoint operators merge
/// - anything else moves the new entry under `$and`
pub fn merge_field(target: &mut Document, key: &str, value: Bson) {
    if !target.contains_key(key) {
        target.insert(key, value);
        return;
    }

    let leftover = match target.get_mut(key) {
        Some(Bson::Array(current)) if key == "$and" => match value {
            Bson::Array(extra) => {
                current.extend(extra);
                None
            }
            other => Some(other),
        },
        Some(Bson::Document(current)) => match value {
            Bson::Document(extra) if can_merge_operators(current, &extra) => {
                for (op, operand) in extra {
                    current.insert(op, operand);
                }
                None
            }
            other => Some(other),
        },
        _ => Some(value),
    };

    if let Some(value) = leftover {
        let mut moved = Document::new();
        moved.insert(key, value);
        merge_field(target, "$and", Bson::Array(vec![Bson::Document(moved)]));
    }
}

fn can_merge_operators(current: &Document, extra: &Document) -> bool {
    is_operator_document(current)
        && is_operator_document(extra)
        && extra.keys().all(|k| !current.contains_key(k))
}

fn is_operator_document(document: &Document) -> bool {
    !document.is_empty() && document.keys().all(|k| k.starts_with('$'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::query::{Aggregation, Column};

    fn compile(nodes: &[Where]) -> GatewayResult<Option<Document>> {
        FilterCompiler::new(NameResolver::new(None)).compile(nodes)
    }

    #[test]
    fn test_single_predicate() {
        let filter = compile(&[Where::eq("name", "Alice")]).unwrap().unwrap();
        assert_eq!(filter, doc! { "name": { "$eq": "Alice" } });
    }

    #[test]
    fn test_empty_list_has_no_filter() {
        assert_eq!(compile(&[]).unwrap(), None);
    }

    #[test]
    fn test_and_chain_is_flat() {
        let filter = compile(&[Where::eq("a", 1), Where::eq("b", 2).and()])
            .unwrap()
            .unwrap();
        assert_eq!(filter, doc! { "a": { "$eq": 1 }, "b": { "$eq": 2 } });
    }

    #[test]
    fn test_connective_change_nests_tail() {
        let filter = compile(&[Where::eq("a", 1), Where::eq("b", 2).or()])
            .unwrap()
            .unwrap();
        assert_eq!(
            filter,
            doc! { "a": { "$eq": 1 }, "$or": [ { "b": { "$eq": 2 } } ] }
        );
    }

    #[test]
    fn test_first_connective_is_ignored() {
        let filter = compile(&[Where::eq("a", 1).or(), Where::eq("b", 2).and()])
            .unwrap()
            .unwrap();
        assert_eq!(filter, doc! { "a": { "$eq": 1 }, "b": { "$eq": 2 } });
    }

    #[test]
    fn test_longer_chain_folds_right() {
        let filter = compile(&[
            Where::eq("a", 1),
            Where::eq("b", 2).and(),
            Where::eq("c", 3).or(),
            Where::eq("d", 4).or(),
        ])
        .unwrap()
        .unwrap();
        assert_eq!(
            filter,
            doc! {
                "a": { "$eq": 1 },
                "b": { "$eq": 2 },
                "$or": [ { "c": { "$eq": 3 }, "d": { "$eq": 4 } } ]
            }
        );
    }

    #[test]
    fn test_xor_rejected_anywhere() {
        for position in 0..3 {
            let mut nodes = vec![Where::eq("a", 1), Where::eq("b", 2).and(), Where::eq("c", 3).and()];
            nodes[position].connective = Some(Connective::Xor);
            let err = compile(&nodes).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnsupportedFilter, "position {}", position);
        }
    }

    #[test]
    fn test_or_bracket_group() {
        let filter = compile(&[
            Where::eq("a", 1),
            Where::eq("b", 2).and().open(),
            Where::eq("c", 3).or().close(),
        ])
        .unwrap()
        .unwrap();
        assert_eq!(
            filter,
            doc! {
                "a": { "$eq": 1 },
                "$or": [ { "b": { "$eq": 2 } }, { "c": { "$eq": 3 } } ]
            }
        );
    }

    #[test]
    fn test_bracket_group_joined_by_or() {
        let filter = compile(&[
            Where::eq("a", 1),
            Where::eq("b", 2).or().open(),
            Where::eq("c", 3).and().close(),
        ])
        .unwrap()
        .unwrap();
        assert_eq!(
            filter,
            doc! {
                "a": { "$eq": 1 },
                "$or": [ { "b": { "$eq": 2 }, "c": { "$eq": 3 } } ]
            }
        );
    }

    #[test]
    fn test_bracket_followed_by_tail() {
        let filter = compile(&[
            Where::eq("a", 1).open(),
            Where::eq("b", 2).or().close(),
            Where::eq("c", 3).and(),
        ])
        .unwrap()
        .unwrap();
        assert_eq!(
            filter,
            doc! {
                "$or": [ { "a": { "$eq": 1 } }, { "b": { "$eq": 2 } } ],
                "c": { "$eq": 3 }
            }
        );
    }

    #[test]
    fn test_unmatched_bracket_rejected() {
        let err = compile(&[Where::eq("a", 1).open(), Where::eq("b", 2).or()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFilter);
    }

    #[test]
    fn test_nested_bracket_rejected() {
        let err = compile(&[
            Where::eq("a", 1).open(),
            Where::eq("b", 2).or().open(),
            Where::eq("c", 3).or().close(),
            Where::eq("d", 4).or().close(),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFilter);
    }

    #[test]
    fn test_stray_close_rejected() {
        let err = compile(&[Where::eq("a", 1), Where::eq("b", 2).and().close()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFilter);
    }

    #[test]
    fn test_open_and_close_on_one_node_rejected() {
        let err = compile(&[Where::eq("a", 1).open().close()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFilter);
    }

    #[test]
    fn test_mixed_connectives_in_bracket_rejected() {
        let err = compile(&[
            Where::eq("a", 1).open(),
            Where::eq("b", 2).or(),
            Where::eq("c", 3).and().close(),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFilter);
    }

    #[test]
    fn test_like_translation() {
        let filter = compile(&[Where::new("name", CompareOp::Like, "%Smith%")])
            .unwrap()
            .unwrap();
        assert_eq!(filter, doc! { "name": { "$regex": ".*Smith.*" } });
    }

    #[test]
    fn test_like_escapes_metacharacters() {
        let filter = compile(&[Where::new("email", CompareOp::Like, "%a.b%")])
            .unwrap()
            .unwrap();
        assert_eq!(filter, doc! { "email": { "$regex": ".*a\\.b.*" } });
    }

    #[test]
    fn test_not_like_wraps_regex() {
        let filter = compile(&[Where::new("name", CompareOp::NotLike, "%x%")])
            .unwrap()
            .unwrap();
        assert_eq!(filter, doc! { "name": { "$not": { "$regex": ".*x.*" } } });
    }

    #[test]
    fn test_like_requires_string() {
        let err = compile(&[Where::new("n", CompareOp::Like, 5)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFilter);
    }

    #[test]
    fn test_in_and_not_in() {
        let list = Literal::List(vec![Literal::Integer(1), Literal::Integer(2)]);
        let filter = compile(&[
            Where::new("a", CompareOp::In, list.clone()),
            Where::new("b", CompareOp::NotIn, list).and(),
        ])
        .unwrap()
        .unwrap();
        assert_eq!(
            filter,
            doc! { "a": { "$in": [1, 2] }, "b": { "$nin": [1, 2] } }
        );
    }

    #[test]
    fn test_is_null_and_is_not_null() {
        let filter = compile(&[
            Where::new("a", CompareOp::Is, Literal::Null),
            Where::new("b", CompareOp::IsNot, Literal::Null).and(),
        ])
        .unwrap()
        .unwrap();
        assert_eq!(
            filter,
            doc! { "a": { "$eq": Bson::Null }, "b": { "$ne": Bson::Null } }
        );
    }

    #[test]
    fn test_same_field_range_merges() {
        let filter = compile(&[
            Where::new("age", CompareOp::Gte, 18),
            Where::new("age", CompareOp::Lte, 30).and(),
        ])
        .unwrap()
        .unwrap();
        assert_eq!(filter, doc! { "age": { "$gte": 18, "$lte": 30 } });
    }

    #[test]
    fn test_same_operator_collision_moves_to_and() {
        let filter = compile(&[
            Where::new("a", CompareOp::Ne, 1),
            Where::new("a", CompareOp::Ne, 2).and(),
        ])
        .unwrap()
        .unwrap();
        assert_eq!(
            filter,
            doc! { "a": { "$ne": 1 }, "$and": [ { "a": { "$ne": 2 } } ] }
        );
    }

    #[test]
    fn test_aggregated_field_name() {
        let node = Where::on(
            Column::aggregated(Aggregation::Sum, "total"),
            CompareOp::Gt,
            100,
        );
        let filter = compile(&[node]).unwrap().unwrap();
        assert_eq!(filter, doc! { "SUM_total": { "$gt": 100 } });
    }

    #[test]
    fn test_tree_shape() {
        let compiler = FilterCompiler::new(NameResolver::new(None));
        let tree = compiler
            .build_tree(&[
                Where::eq("a", 1),
                Where::eq("b", 2).or().open(),
                Where::eq("c", 3).or().close(),
            ])
            .unwrap()
            .unwrap();
        assert_eq!(tree.items.len(), 2);
        assert_eq!(tree.items[1].connective, Connective::Or);
        match &tree.items[1].term {
            FilterTerm::Group { connective, conditions } => {
                assert_eq!(*connective, Connective::Or);
                assert_eq!(conditions.len(), 2);
            }
            other => panic!("expected group, got {:?}", other),
        }
    }
}
