//! SELECT planning
//!
//! Four strategies, tried in order:
//! 1. Distinct: `distinct` over exactly one column
//! 2. Find: no join, no grouping, no aggregation
//! 3. Join-only: one join, no grouping, no aggregation
//! 4. Grouping: GROUP BY and/or aggregates, optionally with one join

use bson::{doc, Bson, Document};
use tracing::debug;

use super::command::{Command, Verb};
use super::plan::{JoinedCollection, Plan, PlanShape, ProbeColumn, ProbeTarget, SelectShape};
use crate::compiler::{
    join_prefix, strip_aggregation_prefix, FilterCompiler, NameResolver, ProjectionCompiler,
    Window,
};
use crate::errors::{GatewayError, GatewayResult};
use crate::query::{Aggregation, Column, Join, JoinKind, Select, Where};

/// Name of the grouped field carrying the first document of each group
pub const RECORD_FIELD: &str = "Record";

pub(super) fn plan_select(select: &Select) -> GatewayResult<Plan> {
    let join = single_join(select)?;
    let resolver = NameResolver::new(join);

    let shape = choose_shape(select, join, resolver)?;
    debug!(
        collection = %select.collection,
        strategy = ?shape,
        "planning select"
    );

    let command = match &shape {
        SelectShape::Distinct { .. } => distinct_command(select, resolver)?,
        SelectShape::Find => find_command(select, resolver)?,
        SelectShape::JoinOnly => {
            let join = join
                .ok_or_else(|| GatewayError::unsupported_join("join strategy without a join"))?;
            join_command(select, join, resolver)?
        }
        SelectShape::Grouping => grouping_command(select, join, resolver)?,
    };

    let probe = probe_target(select, join, resolver)?;
    Ok(Plan::new("select", PlanShape::Select(shape))
        .with_command(command)
        .with_probe(probe))
}

/// At most one join, with exactly one relation
fn single_join(select: &Select) -> GatewayResult<Option<&Join>> {
    match select.joins.as_slice() {
        [] => Ok(None),
        [join] => {
            if join.relations.len() != 1 {
                return Err(GatewayError::unsupported_join(format!(
                    "join on '{}' must have exactly one relation, got {}",
                    join.collection,
                    join.relations.len()
                )));
            }
            if matches!(join.kind, JoinKind::Right | JoinKind::Full) {
                return Err(GatewayError::unsupported_join(format!(
                    "{:?} join on '{}' cannot be expressed as a lookup",
                    join.kind, join.collection
                )));
            }
            Ok(Some(join))
        }
        joins => Err(GatewayError::unsupported_join(format!(
            "at most one join is supported, got {}",
            joins.len()
        ))),
    }
}

fn choose_shape(
    select: &Select,
    join: Option<&Join>,
    resolver: NameResolver<'_>,
) -> GatewayResult<SelectShape> {
    // surfaces aggregated + join-sourced columns before any strategy is chosen
    for column in select.columns.iter().filter(|c| !c.is_wildcard()) {
        resolver.field(column)?;
    }

    if select.distinct {
        let column = distinct_column(select)?;
        return Ok(SelectShape::Distinct {
            output: resolver.output_name(column)?,
        });
    }

    // COUNT-only selects group too: a find projection cannot compute cardinality
    let grouping =
        !select.group_by.is_empty() || !select.having.is_empty() || select.has_aggregation();
    Ok(match (grouping, join) {
        (true, _) => SelectShape::Grouping,
        (false, None) => SelectShape::Find,
        (false, Some(_)) => SelectShape::JoinOnly,
    })
}

fn distinct_column(select: &Select) -> GatewayResult<&Column> {
    let columns: Vec<&Column> = select.columns.iter().filter(|c| !c.is_wildcard()).collect();
    let [column] = columns.as_slice() else {
        return Err(GatewayError::unsupported_statement(format!(
            "DISTINCT requires exactly one column, got {}",
            columns.len()
        )));
    };
    if !select.joins.is_empty() {
        return Err(GatewayError::unsupported_join(
            "DISTINCT cannot be combined with a join",
        ));
    }
    if column.aggregation.is_some() {
        return Err(GatewayError::unsupported_aggregation(
            "DISTINCT cannot be combined with an aggregation",
        ));
    }
    Ok(column)
}

fn distinct_command(select: &Select, resolver: NameResolver<'_>) -> GatewayResult<Command> {
    let column = distinct_column(select)?;
    let filter = FilterCompiler::new(resolver).compile(&select.wheres)?;
    Ok(Command::new(Verb::Distinct, &select.collection)
        .with("key", resolver.field(column)?)
        .with_opt("query", filter))
}

fn find_command(select: &Select, resolver: NameResolver<'_>) -> GatewayResult<Command> {
    let filter = FilterCompiler::new(resolver).compile(&select.wheres)?;
    let projector = ProjectionCompiler::new(resolver);
    let sort = select
        .order_by
        .as_ref()
        .map(|order| projector.sort(order))
        .transpose()?;
    let window = Window::from_limit(select.limit.as_ref());

    Ok(Command::new(Verb::Find, &select.collection)
        .with_opt("filter", filter)
        .with("projection", projector.projection(&select.columns)?)
        .with_opt("sort", sort)
        .with_opt("skip", window.map(|w| w.skip))
        .with_opt("limit", window.map(|w| w.limit)))
}

fn join_command(
    select: &Select,
    join: &Join,
    resolver: NameResolver<'_>,
) -> GatewayResult<Command> {
    let mut pipeline = lookup_stages(join, resolver)?;
    if let Some(filter) = FilterCompiler::new(resolver).compile(&select.wheres)? {
        pipeline.push(doc! { "$match": filter });
    }
    pipeline.extend(tail_stages(select, resolver)?);
    Ok(Command::aggregate(&select.collection, pipeline))
}

fn grouping_command(
    select: &Select,
    join: Option<&Join>,
    resolver: NameResolver<'_>,
) -> GatewayResult<Command> {
    let mut pipeline = Vec::new();

    // $first only keeps the first document of each group, so the extremum
    // has to arrive first
    if let Some(column) = select
        .columns
        .iter()
        .find(|c| matches!(c.aggregation, Some(Aggregation::Max | Aggregation::Min)))
    {
        let direction = if column.aggregation == Some(Aggregation::Max) {
            -1
        } else {
            1
        };
        let mut sort = Document::new();
        sort.insert(column.name.clone(), direction);
        pipeline.push(doc! { "$sort": sort });
    }

    if let Some(join) = join {
        pipeline.extend(lookup_stages(join, resolver)?);
    }

    let mut group = Document::new();
    group.insert("_id", group_key(&select.group_by, resolver)?);
    let mut aggregates = Document::new();
    for (column, aggregation) in select
        .columns
        .iter()
        .filter_map(|c| c.aggregation.map(|a| (c, a)))
    {
        let field = resolver.field(column)?;
        let mut accumulator = Document::new();
        accumulator.insert(aggregation.accumulator(), format!("${}", column.name));
        group.insert(field.clone(), accumulator);
        aggregates.insert(field.clone(), format!("${}", field));
    }
    group.insert(RECORD_FIELD, doc! { "$first": "$$ROOT" });
    pipeline.push(doc! { "$group": group });

    pipeline.push(doc! {
        "$replaceRoot": {
            "newRoot": {
                "$mergeObjects": [format!("${}", RECORD_FIELD), aggregates]
            }
        }
    });

    let projector = ProjectionCompiler::new(resolver);
    pipeline.push(doc! { "$project": projector.projection(&select.columns)? });

    let predicates: Vec<Where> = select
        .wheres
        .iter()
        .chain(select.having.iter())
        .cloned()
        .collect();
    if let Some(filter) = FilterCompiler::new(resolver).compile(&predicates)? {
        pipeline.push(doc! { "$match": filter });
    }

    if let Some(order) = &select.order_by {
        pipeline.push(doc! { "$sort": projector.sort(order)? });
    }
    if let Some(window) = Window::from_limit(select.limit.as_ref()) {
        pipeline.push(doc! { "$skip": window.skip });
        pipeline.push(doc! { "$limit": window.limit });
    }
    Ok(Command::aggregate(&select.collection, pipeline))
}

/// `_id` of the `$group` stage: null for one group over everything
fn group_key(columns: &[Column], resolver: NameResolver<'_>) -> GatewayResult<Bson> {
    if columns.is_empty() {
        return Ok(Bson::Null);
    }
    let mut key = Document::new();
    for column in columns {
        let field = resolver.field(column)?;
        key.insert(field.replace('.', "_"), format!("${}", field));
    }
    Ok(Bson::Document(key))
}

fn lookup_stages(join: &Join, resolver: NameResolver<'_>) -> GatewayResult<Vec<Document>> {
    let prefix = resolver.join_prefix()?;
    let relation = join.relations.first().ok_or_else(|| {
        GatewayError::unsupported_join(format!("join on '{}' has no relation", join.collection))
    })?;
    let unwind = if join.kind == JoinKind::Left {
        Bson::Document(doc! {
            "path": format!("${}", prefix),
            "preserveNullAndEmptyArrays": true
        })
    } else {
        Bson::String(format!("${}", prefix))
    };
    Ok(vec![
        doc! {
            "$lookup": {
                "from": join.collection.clone(),
                "localField": relation.left.clone(),
                "foreignField": relation.right.clone(),
                "as": prefix,
            }
        },
        doc! { "$unwind": unwind },
    ])
}

/// `$project`, `$sort`, `$skip`, `$limit` of the join-only pipeline
fn tail_stages(select: &Select, resolver: NameResolver<'_>) -> GatewayResult<Vec<Document>> {
    let projector = ProjectionCompiler::new(resolver);
    let mut stages = vec![doc! { "$project": projector.projection(&select.columns)? }];
    if let Some(order) = &select.order_by {
        stages.push(doc! { "$sort": projector.sort(order)? });
    }
    if let Some(window) = Window::from_limit(select.limit.as_ref()) {
        stages.push(doc! { "$skip": window.skip });
        stages.push(doc! { "$limit": window.limit });
    }
    Ok(stages)
}

fn probe_target(
    select: &Select,
    join: Option<&Join>,
    resolver: NameResolver<'_>,
) -> GatewayResult<ProbeTarget> {
    let mut probe = ProbeTarget {
        collection: select.collection.clone(),
        join: join.map(|j| JoinedCollection {
            collection: j.collection.clone(),
            prefix: join_prefix(&j.collection),
        }),
        ..ProbeTarget::default()
    };
    for column in select.columns.iter().filter(|c| !c.is_wildcard()) {
        let key = resolver.output_name(column)?;
        let probed = if column.join_sourced {
            ProbeColumn::joined(key, column.name.clone())
        } else {
            let field = resolver.field(column)?;
            ProbeColumn::base(key, strip_aggregation_prefix(&field))
        };
        if !probe.columns.contains(&probed) {
            probe.columns.push(probed);
        }
    }
    Ok(probe)
}
