//! In-memory graph backend.
//!
//! Evaluates the same Cypher subset the rewriter emits over nodes and edges
//! held in memory. Used as a reference backend in tests and by the CLI.
//!
//! Semantics follow Cypher where the subset overlaps:
//!
//! - a relationship is traversed at most once per path
//! - comparisons involving `null` yield `null`, and `WHERE` keeps a row only
//!   when its predicate is `true`
//! - `RETURN` with aggregates groups by the non-aggregate items
//! - ascending sorts put `null` last

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::ast::{
    BinaryOp, Direction, Expr, NodePattern, Pattern, Query, ReturnItem, is_aggregate,
};
use crate::error::ExecutorError;
use crate::executor::GraphExecutor;
use crate::parser::parse_query;
use crate::value::{Entity, Params, QueryResult, Row, Value};

/// Variables in scope for one match.
type Binding = BTreeMap<String, Value>;

type EvalResult = Result<Value, ExecutorError>;

#[derive(Debug, Clone, PartialEq)]
struct Edge {
    entity: Entity,
    from: u64,
    to: u64,
}

/// A property graph held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    nodes: Vec<Entity>,
    edges: Vec<Edge>,
    next_id: u64,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and returns its id.
    pub fn add_node<K, V>(
        &mut self,
        label: impl Into<String>,
        properties: impl IntoIterator<Item = (K, V)>,
    ) -> u64
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let id = self.allocate_id();
        let mut entity = Entity::new(id, label);
        for (key, value) in properties {
            entity.properties.insert(key.into(), value.into());
        }
        self.nodes.push(entity);
        id
    }

    /// Adds a relationship `from -[:rel_type]-> to` and returns its id.
    ///
    /// Endpoints are not checked; an edge to a missing node never matches.
    pub fn add_edge<K, V>(
        &mut self,
        from: u64,
        rel_type: impl Into<String>,
        to: u64,
        properties: impl IntoIterator<Item = (K, V)>,
    ) -> u64
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let id = self.allocate_id();
        let mut entity = Entity::new(id, rel_type);
        for (key, value) in properties {
            entity.properties.insert(key.into(), value.into());
        }
        self.edges.push(Edge { entity, from, to });
        id
    }

    pub fn node(&self, id: u64) -> Option<&Entity> {
        self.nodes.iter().find(|n| n.id == id)
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // ========================================================================
    // Matching
    // ========================================================================

    fn match_pattern(
        &self,
        pattern: &Pattern,
        eval: &Evaluator<'_>,
    ) -> Result<Vec<Binding>, ExecutorError> {
        let mut out = Vec::new();
        for node in &self.nodes {
            let mut binding = Binding::new();
            if node_matches(&pattern.start, node, eval, &mut binding)? {
                self.extend_path(pattern, 0, node.id, binding, &mut Vec::new(), eval, &mut out)?;
            }
        }
        Ok(out)
    }

    fn extend_path(
        &self,
        pattern: &Pattern,
        step: usize,
        current: u64,
        binding: Binding,
        used_edges: &mut Vec<u64>,
        eval: &Evaluator<'_>,
        out: &mut Vec<Binding>,
    ) -> Result<(), ExecutorError> {
        let Some((rel, node_pattern)) = pattern.steps.get(step) else {
            out.push(binding);
            return Ok(());
        };

        for edge in &self.edges {
            if used_edges.contains(&edge.entity.id) {
                continue;
            }
            let next = match rel.direction {
                Direction::Outgoing => (edge.from == current).then_some(edge.to),
                Direction::Incoming => (edge.to == current).then_some(edge.from),
                Direction::Either if edge.from == current => Some(edge.to),
                Direction::Either => (edge.to == current).then_some(edge.from),
            };
            let Some(next) = next else {
                continue;
            };
            let Some(node) = self.node(next) else {
                continue;
            };

            let mut extended = binding.clone();
            if !element_matches(
                rel.rel_type.as_deref(),
                &rel.properties,
                rel.alias.as_deref(),
                Value::Relationship(edge.entity.clone()),
                eval,
                &mut extended,
            )? || !node_matches(node_pattern, node, eval, &mut extended)?
            {
                continue;
            }

            used_edges.push(edge.entity.id);
            self.extend_path(pattern, step + 1, next, extended, used_edges, eval, out)?;
            used_edges.pop();
        }
        Ok(())
    }
}

impl GraphExecutor for MemoryGraph {
    fn execute(&self, query: &str, params: &Params) -> Result<QueryResult, ExecutorError> {
        let parsed = parse_query(query).map_err(|e| ExecutorError::InvalidQuery(e.to_string()))?;
        let eval = Evaluator { params };

        let mut bindings = self.match_pattern(&parsed.pattern, &eval)?;
        trace!(matches = bindings.len(), "Pattern matched");

        if let Some(predicate) = &parsed.where_clause {
            let mut kept = Vec::with_capacity(bindings.len());
            for binding in bindings {
                if eval.eval(predicate, &binding)? == Value::Boolean(true) {
                    kept.push(binding);
                }
            }
            bindings = kept;
        }

        let result = project(&parsed, bindings, &eval)?;
        debug!(rows = result.rows.len(), "Memory graph query executed");
        Ok(result)
    }
}

fn node_matches(
    pattern: &NodePattern,
    node: &Entity,
    eval: &Evaluator<'_>,
    binding: &mut Binding,
) -> Result<bool, ExecutorError> {
    element_matches(
        pattern.label.as_deref(),
        &pattern.properties,
        pattern.alias.as_deref(),
        Value::Node(node.clone()),
        eval,
        binding,
    )
}

/// Checks label/type, inline properties and alias reuse, binding the alias.
fn element_matches(
    label: Option<&str>,
    properties: &[(String, Expr)],
    alias: Option<&str>,
    value: Value,
    eval: &Evaluator<'_>,
    binding: &mut Binding,
) -> Result<bool, ExecutorError> {
    let Some(entity) = value.as_entity() else {
        return Ok(false);
    };
    if label.is_some_and(|l| !entity.has_label(l)) {
        return Ok(false);
    }
    for (key, expr) in properties {
        let expected = eval.eval(expr, binding)?;
        if entity.get(key).equals(&expected) != Some(true) {
            return Ok(false);
        }
    }
    if let Some(alias) = alias {
        if let Some(bound) = binding.get(alias) {
            return Ok(bound.as_entity().is_some_and(|b| b.id == entity.id));
        }
        binding.insert(alias.to_string(), value);
    }
    Ok(true)
}

/// Groups bindings by the values of the non-aggregate items.
fn group(
    items: &[ReturnItem],
    bindings: Vec<Binding>,
    eval: &Evaluator<'_>,
) -> Result<Vec<(Row, Vec<Binding>)>, ExecutorError> {
    let mut groups: Vec<(Row, Vec<Binding>)> = Vec::new();
    for binding in bindings {
        let key = items
            .iter()
            .filter(|item| !item.expr.contains_aggregate())
            .map(|item| eval.eval(&item.expr, &binding))
            .collect::<Result<Row, _>>()?;
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(binding),
            None => groups.push((key, vec![binding])),
        }
    }

    // Aggregating nothing without grouping keys still yields one row.
    if groups.is_empty() && items.iter().all(|item| item.expr.contains_aggregate()) {
        groups.push((Row::new(), Vec::new()));
    }
    Ok(groups)
}

fn project(
    query: &Query,
    bindings: Vec<Binding>,
    eval: &Evaluator<'_>,
) -> Result<QueryResult, ExecutorError> {
    let ret = &query.return_clause;
    let columns: Vec<String> = ret.items.iter().map(ReturnItem::column_name).collect();

    // Each output row keeps the binding it came from for ORDER BY.
    let mut rows: Vec<(Row, Binding)> = Vec::new();
    if ret.items.iter().any(|item| item.expr.contains_aggregate()) {
        for (_, members) in group(&ret.items, bindings, eval)? {
            let env = members.first().cloned().unwrap_or_default();
            let row = ret
                .items
                .iter()
                .map(|item| eval.eval_grouped(&item.expr, &env, &members))
                .collect::<Result<Row, _>>()?;
            rows.push((row, env));
        }
    } else {
        for binding in bindings {
            let row = ret
                .items
                .iter()
                .map(|item| eval.eval(&item.expr, &binding))
                .collect::<Result<Row, _>>()?;
            rows.push((row, binding));
        }
    }

    if ret.distinct {
        let mut seen: Vec<Row> = Vec::new();
        rows.retain(|(row, _)| {
            if seen.contains(row) {
                false
            } else {
                seen.push(row.clone());
                true
            }
        });
    }

    if !ret.order_by.is_empty() {
        let mut keyed = Vec::with_capacity(rows.len());
        for (row, mut env) in rows {
            let mut keys = Vec::with_capacity(ret.order_by.len());
            for sort in &ret.order_by {
                let text = sort.expr.to_string();
                let key = match columns.iter().position(|c| *c == text) {
                    Some(i) => row[i].clone(),
                    None => {
                        for (name, value) in columns.iter().zip(&row) {
                            env.insert(name.clone(), value.clone());
                        }
                        eval.eval(&sort.expr, &env)?
                    }
                };
                keys.push(key);
            }
            keyed.push((keys, row, env));
        }
        keyed.sort_by(|(a, _, _), (b, _, _)| {
            for ((x, y), sort) in a.iter().zip(b).zip(&ret.order_by) {
                let ordering = if sort.descending {
                    y.sort_cmp(x)
                } else {
                    x.sort_cmp(y)
                };
                if ordering.is_ne() {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });
        rows = keyed.into_iter().map(|(_, row, env)| (row, env)).collect();
    }

    let skip = ret.skip.unwrap_or(0) as usize;
    let limit = ret.limit.map_or(usize::MAX, |l| l as usize);
    Ok(QueryResult {
        columns,
        rows: rows
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|(row, _)| row)
            .collect(),
    })
}

// ============================================================================
// Expression evaluation
// ============================================================================

struct Evaluator<'a> {
    params: &'a Params,
}

impl Evaluator<'_> {
    fn eval(&self, expr: &Expr, env: &Binding) -> EvalResult {
        self.eval_in(expr, env, None)
    }

    fn eval_grouped(&self, expr: &Expr, env: &Binding, members: &[Binding]) -> EvalResult {
        self.eval_in(expr, env, Some(members))
    }

    fn eval_in(&self, expr: &Expr, env: &Binding, group: Option<&[Binding]>) -> EvalResult {
        match expr {
            Expr::Literal(scalar) => Ok(Value::from(scalar.clone())),
            Expr::Parameter(name) => self
                .params
                .get(name)
                .cloned()
                .ok_or_else(|| ExecutorError::MissingParameter(name.clone())),
            Expr::Variable(name) => env
                .get(name)
                .cloned()
                .ok_or_else(|| ExecutorError::InvalidQuery(format!("unknown variable '{name}'"))),
            Expr::Property(base, key) => match self.eval_in(base, env, group)? {
                Value::Null => Ok(Value::Null),
                Value::Node(entity) | Value::Relationship(entity) => Ok(entity.get(key).clone()),
                Value::Map(mut map) => Ok(map.remove(key).unwrap_or(Value::Null)),
                other => Err(ExecutorError::InvalidQuery(format!(
                    "cannot read property '{key}' of {other}"
                ))),
            },
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval_in(item, env, group))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Expr::Function {
                name,
                distinct,
                star,
                args,
            } if is_aggregate(name) => {
                let Some(members) = group else {
                    return Err(ExecutorError::InvalidQuery(format!(
                        "aggregate '{name}' outside RETURN"
                    )));
                };
                self.aggregate(name, *distinct, *star, args, members)
            }
            Expr::Function { name, args, .. } => {
                let values = args
                    .iter()
                    .map(|arg| self.eval_in(arg, env, group))
                    .collect::<Result<Vec<_>, _>>()?;
                call(name, values)
            }
            Expr::Not(inner) => match self.eval_in(inner, env, group)? {
                Value::Boolean(b) => Ok(Value::Boolean(!b)),
                Value::Null => Ok(Value::Null),
                other => Err(type_error("NOT", &other)),
            },
            Expr::And(parts) => {
                let mut unknown = false;
                for part in parts {
                    match self.eval_in(part, env, group)? {
                        Value::Boolean(false) => return Ok(Value::Boolean(false)),
                        Value::Boolean(true) => {}
                        Value::Null => unknown = true,
                        other => return Err(type_error("AND", &other)),
                    }
                }
                Ok(if unknown { Value::Null } else { Value::Boolean(true) })
            }
            Expr::Or(parts) => {
                let mut unknown = false;
                for part in parts {
                    match self.eval_in(part, env, group)? {
                        Value::Boolean(true) => return Ok(Value::Boolean(true)),
                        Value::Boolean(false) => {}
                        Value::Null => unknown = true,
                        other => return Err(type_error("OR", &other)),
                    }
                }
                Ok(if unknown { Value::Null } else { Value::Boolean(false) })
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval_in(left, env, group)?;
                let right = self.eval_in(right, env, group)?;
                binary(*op, &left, &right)
            }
            Expr::Negate(inner) => match self.eval_in(inner, env, group)? {
                Value::Integer(i) => i
                    .checked_neg()
                    .map(Value::Integer)
                    .ok_or_else(overflow),
                Value::Float(f) => Ok(Value::Float(-f)),
                Value::Null => Ok(Value::Null),
                other => Err(type_error("-", &other)),
            },
            Expr::IsNull { expr, negated } => {
                let is_null = self.eval_in(expr, env, group)?.is_null();
                Ok(Value::Boolean(is_null != *negated))
            }
        }
    }

    fn aggregate(
        &self,
        name: &str,
        distinct: bool,
        star: bool,
        args: &[Expr],
        members: &[Binding],
    ) -> EvalResult {
        if star {
            return Ok(Value::Integer(members.len() as i64));
        }
        let [arg] = args else {
            return Err(ExecutorError::InvalidQuery(format!(
                "{name}() takes exactly one argument"
            )));
        };

        let mut values = Vec::with_capacity(members.len());
        for member in members {
            let value = self.eval(arg, member)?;
            if value.is_null() || (distinct && values.contains(&value)) {
                continue;
            }
            values.push(value);
        }

        match name.to_ascii_lowercase().as_str() {
            "count" => Ok(Value::Integer(values.len() as i64)),
            "collect" => Ok(Value::List(values)),
            "sum" => values
                .iter()
                .try_fold(Value::Integer(0), |acc, v| binary(BinaryOp::Add, &acc, v)),
            "avg" => {
                if values.is_empty() {
                    return Ok(Value::Null);
                }
                let mut total = 0.0;
                for value in &values {
                    total += value.as_f64().ok_or_else(|| type_error("avg", value))?;
                }
                Ok(Value::Float(total / values.len() as f64))
            }
            "min" => Ok(values
                .into_iter()
                .min_by(Value::sort_cmp)
                .unwrap_or(Value::Null)),
            "max" => Ok(values
                .into_iter()
                .max_by(Value::sort_cmp)
                .unwrap_or(Value::Null)),
            _ => Err(ExecutorError::InvalidQuery(format!(
                "unknown aggregate '{name}'"
            ))),
        }
    }
}

fn type_error(operation: &str, value: &Value) -> ExecutorError {
    ExecutorError::InvalidQuery(format!("type mismatch: {operation} applied to {value}"))
}

fn overflow() -> ExecutorError {
    ExecutorError::InvalidQuery("integer overflow".into())
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> EvalResult {
    use std::cmp::Ordering;

    let compare = |accept: fn(Ordering) -> bool| {
        Ok(left
            .compare(right)
            .map_or(Value::Null, |o| Value::Boolean(accept(o))))
    };

    match op {
        BinaryOp::Eq => Ok(left.equals(right).map_or(Value::Null, Value::Boolean)),
        BinaryOp::Ne => Ok(left.equals(right).map_or(Value::Null, |eq| Value::Boolean(!eq))),
        BinaryOp::Lt => compare(Ordering::is_lt),
        BinaryOp::Le => compare(Ordering::is_le),
        BinaryOp::Gt => compare(Ordering::is_gt),
        BinaryOp::Ge => compare(Ordering::is_ge),
        BinaryOp::Xor => match (left, right) {
            (Value::Boolean(a), Value::Boolean(b)) => Ok(Value::Boolean(a != b)),
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (other, _) => Err(type_error("XOR", other)),
        },
        BinaryOp::In => {
            let Value::List(items) = right else {
                return match right {
                    Value::Null => Ok(Value::Null),
                    other => Err(type_error("IN", other)),
                };
            };
            let mut unknown = false;
            for item in items {
                match left.equals(item) {
                    Some(true) => return Ok(Value::Boolean(true)),
                    Some(false) => {}
                    None => unknown = true,
                }
            }
            Ok(if unknown { Value::Null } else { Value::Boolean(false) })
        }
        BinaryOp::StartsWith | BinaryOp::EndsWith | BinaryOp::Contains => {
            match (left.as_str(), right.as_str()) {
                (Some(l), Some(r)) => Ok(Value::Boolean(match op {
                    BinaryOp::StartsWith => l.starts_with(r),
                    BinaryOp::EndsWith => l.ends_with(r),
                    _ => l.contains(r),
                })),
                _ => Ok(Value::Null),
            }
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            arithmetic(op, left, right)
        }
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> EvalResult {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Integer(a), Value::Integer(b)) => {
            let result = match op {
                BinaryOp::Add => a.checked_add(*b),
                BinaryOp::Sub => a.checked_sub(*b),
                BinaryOp::Mul => a.checked_mul(*b),
                BinaryOp::Div | BinaryOp::Mod if *b == 0 => {
                    return Err(ExecutorError::InvalidQuery("division by zero".into()));
                }
                BinaryOp::Div => a.checked_div(*b),
                _ => a.checked_rem(*b),
            };
            result.map(Value::Integer).ok_or_else(overflow)
        }
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            let (a, b) = (left.as_f64().unwrap_or_default(), right.as_f64().unwrap_or_default());
            Ok(Value::Float(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            }))
        }
        (Value::String(a), Value::String(b)) if op == BinaryOp::Add => {
            Ok(Value::String(format!("{a}{b}")))
        }
        (Value::List(a), Value::List(b)) if op == BinaryOp::Add => {
            Ok(Value::List(a.iter().chain(b).cloned().collect()))
        }
        (other, _) => Err(type_error("arithmetic", other)),
    }
}

/// Scalar functions.
fn call(name: &str, mut args: Vec<Value>) -> EvalResult {
    let lower = name.to_ascii_lowercase();
    if lower == "coalesce" {
        return Ok(args.into_iter().find(|v| !v.is_null()).unwrap_or(Value::Null));
    }

    if args.len() != 1 {
        return Err(ExecutorError::InvalidQuery(format!(
            "{name}() takes exactly one argument"
        )));
    }
    let arg = args.remove(0);
    if arg.is_null() {
        return Ok(Value::Null);
    }

    match (lower.as_str(), arg) {
        ("id", Value::Node(e) | Value::Relationship(e)) => Ok(Value::Integer(e.id as i64)),
        ("labels", Value::Node(e)) => Ok(Value::from(e.labels)),
        ("type", Value::Relationship(e)) => Ok(e
            .labels
            .into_iter()
            .next()
            .map_or(Value::Null, Value::String)),
        ("properties", Value::Node(e) | Value::Relationship(e)) => Ok(Value::Map(e.properties)),
        ("keys", Value::Node(e) | Value::Relationship(e)) => {
            Ok(Value::from(e.properties.into_keys().collect::<Vec<_>>()))
        }
        ("keys", Value::Map(map)) => Ok(Value::from(map.into_keys().collect::<Vec<_>>())),
        ("tolower", Value::String(s)) => Ok(Value::String(s.to_lowercase())),
        ("size", Value::String(s)) => Ok(Value::Integer(s.chars().count() as i64)),
        ("size", Value::List(items)) => Ok(Value::Integer(items.len() as i64)),
        ("id" | "labels" | "type" | "properties" | "keys" | "tolower" | "size", other) => {
            Err(type_error(name, &other))
        }
        _ => Err(ExecutorError::InvalidQuery(format!("unknown function '{name}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    /// Two countries, one commodity, production and trade edges.
    fn world() -> MemoryGraph {
        let mut graph = MemoryGraph::new();
        let france = graph.add_node(
            "Geography",
            [("name", Value::from("France")), ("population", Value::from(68))],
        );
        let us = graph.add_node(
            "Geography",
            [("name", Value::from("United States")), ("population", Value::from(335))],
        );
        let wheat = graph.add_node("Commodity", [("name", "Wheat")]);
        graph.add_node("Commodity", [("name", Value::from("Corn")), ("code", Value::Null)]);

        graph.add_edge(france, "PRODUCES", wheat, [("tonnes", 35)]);
        graph.add_edge(us, "PRODUCES", wheat, [("tonnes", 49)]);
        graph.add_edge(us, "TRADES_WITH", france, [("commodity", "Wheat")]);
        graph
    }

    fn run(graph: &MemoryGraph, query: &str) -> QueryResult {
        graph.execute(query, &Params::new()).unwrap()
    }

    fn strings(result: &QueryResult, column: &str) -> Vec<String> {
        result
            .column(column)
            .into_iter()
            .map(|v| v.as_str().unwrap_or("<null>").to_string())
            .collect()
    }

    #[test]
    fn test_match_by_label() {
        let result = run(&world(), "MATCH (g:Geography) RETURN g.name ORDER BY g.name");
        assert_eq!(result.columns, vec!["g.name"]);
        assert_eq!(strings(&result, "g.name"), vec!["France", "United States"]);
    }

    #[test]
    fn test_where_three_valued() {
        let graph = world();
        // `code` is null for Corn and absent for Wheat: neither comparison is true.
        let result = run(&graph, "MATCH (c:Commodity) WHERE c.code = 1 RETURN c.name");
        assert!(result.is_empty());
        let result = run(&graph, "MATCH (c:Commodity) WHERE NOT (c.code = 1) RETURN c.name");
        assert!(result.is_empty());
        let result = run(
            &graph,
            "MATCH (c:Commodity) WHERE c.code IS NULL OR c.code = 1 RETURN c.name ORDER BY c.name",
        );
        assert_eq!(strings(&result, "c.name"), vec!["Corn", "Wheat"]);
    }

    #[test_case("MATCH (g:Geography)-[:PRODUCES]->(c:Commodity) RETURN g.name ORDER BY g.name", &["France", "United States"]; "outgoing")]
    #[test_case("MATCH (c:Commodity)<-[:PRODUCES]-(g:Geography) RETURN g.name ORDER BY g.name", &["France", "United States"]; "incoming")]
    #[test_case("MATCH (a:Geography)-[:TRADES_WITH]-(b:Geography) RETURN a.name ORDER BY a.name", &["France", "United States"]; "either direction")]
    #[test_case("MATCH (g:Geography)-[p:PRODUCES {tonnes: 49}]->(:Commodity) RETURN g.name", &["United States"]; "inline relationship properties")]
    #[test_case("MATCH (g:Geography {name: 'France'})-[:PRODUCES]->(c:Commodity) RETURN g.name", &["France"]; "inline node properties")]
    fn test_traversal(query: &str, expected: &[&str]) {
        let result = run(&world(), query);
        let column = result.columns[0].clone();
        assert_eq!(strings(&result, &column), expected);
    }

    #[test]
    fn test_relationship_traversed_once_per_path() {
        let result = run(
            &world(),
            "MATCH (a:Geography)-[r:TRADES_WITH]-(b:Geography)-[s:TRADES_WITH]-(c:Geography) RETURN a.name",
        );
        assert!(result.is_empty());
    }

    #[test]
    fn test_aggregates_group_by_keys() {
        let result = run(
            &world(),
            "MATCH (g:Geography)-[p:PRODUCES]->(c:Commodity) RETURN c.name, count(*) AS n, sum(p.tonnes) AS total, avg(p.tonnes) AS mean, collect(g.name) AS producers",
        );
        assert_eq!(result.len(), 1);
        let row = &result.rows[0];
        assert_eq!(row[0], Value::from("Wheat"));
        assert_eq!(row[1], Value::Integer(2));
        assert_eq!(row[2], Value::Integer(84));
        assert_eq!(row[3], Value::Float(42.0));
        assert_eq!(row[4], Value::from(vec!["France", "United States"]));
    }

    #[test]
    fn test_aggregate_over_nothing() {
        let result = run(&world(), "MATCH (g:Geography) WHERE false RETURN count(g) AS n, max(g.population)");
        assert_eq!(result.rows, vec![vec![Value::Integer(0), Value::Null]]);
    }

    #[test]
    fn test_order_skip_limit_distinct() {
        let graph = world();
        let result = run(
            &graph,
            "MATCH (g:Geography) RETURN g.name AS name ORDER BY g.population DESC LIMIT 1",
        );
        assert_eq!(strings(&result, "name"), vec!["United States"]);

        let result = run(&graph, "MATCH (g:Geography) RETURN g.name AS name ORDER BY name SKIP 1");
        assert_eq!(strings(&result, "name"), vec!["United States"]);

        let result = run(
            &graph,
            "MATCH (g:Geography)-[:PRODUCES]->(c:Commodity) RETURN DISTINCT c.name",
        );
        assert_eq!(strings(&result, "c.name"), vec!["Wheat"]);
    }

    #[test]
    fn test_functions() {
        let result = run(
            &world(),
            "MATCH (g:Geography {name: 'France'}) RETURN toLower(g.name), size(g.name), coalesce(g.missing, 'n/a'), labels(g), properties(g).name",
        );
        assert_eq!(
            result.rows[0],
            vec![
                Value::from("france"),
                Value::Integer(6),
                Value::from("n/a"),
                Value::from(vec!["Geography"]),
                Value::from("France"),
            ]
        );
    }

    #[test]
    fn test_parameters() {
        let graph = world();
        let params = Params::from([("names".to_string(), Value::from(vec!["France"]))]);
        let result = graph
            .execute("MATCH (g:Geography) WHERE g.name IN $names RETURN g.name", &params)
            .unwrap();
        assert_eq!(strings(&result, "g.name"), vec!["France"]);

        let err = graph
            .execute("MATCH (g:Geography) WHERE g.name = $missing RETURN g", &Params::new())
            .unwrap_err();
        assert_eq!(err, ExecutorError::MissingParameter("missing".into()));
    }

    #[test]
    fn test_whole_entities_returned() {
        let result = run(&world(), "MATCH (c:Commodity {name: 'Corn'}) RETURN c");
        let entity = result.rows[0][0].as_entity().unwrap();
        assert!(entity.has_label("Commodity"));
        assert_eq!(entity.properties.get("code"), Some(&Value::Null));
    }

    #[test_case("MATCH (g:Geography) WITH g RETURN g"; "unsupported clause")]
    #[test_case("MATCH (g:Geography) RETURN h"; "unknown variable")]
    #[test_case("MATCH (g:Geography) RETURN g.name + 1"; "type mismatch")]
    #[test_case("MATCH (g:Geography) RETURN g.population / 0"; "division by zero")]
    fn test_invalid_queries(query: &str) {
        let err = world().execute(query, &Params::new()).unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidQuery(_)), "{err}");
    }
}
