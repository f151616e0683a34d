//! Syntax tree for the supported Cypher subset, and its printer.
//!
//! The printer is canonical: printing a parsed query and parsing the output
//! again yields the same tree. Keywords are upper-case, `NOT` always wraps
//! its operand in parentheses, and parentheses are otherwise emitted only
//! where precedence requires them.

use std::fmt::{self, Display, Write};

use graphward_types::{Scalar, quote_identifier};

// ============================================================================
// Query structure
// ============================================================================

/// `MATCH pattern [WHERE expr] RETURN ...`
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub pattern: Pattern,
    pub where_clause: Option<Expr>,
    pub return_clause: Return,
}

/// A single path: a node followed by zero or more `(relationship, node)` steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub start: NodePattern,
    pub steps: Vec<(RelationshipPattern, NodePattern)>,
}

impl Pattern {
    /// Node patterns in path order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodePattern> {
        std::iter::once(&self.start).chain(self.steps.iter().map(|(_, node)| node))
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut NodePattern> {
        std::iter::once(&mut self.start).chain(self.steps.iter_mut().map(|(_, node)| node))
    }

    /// Relationship patterns in path order.
    pub fn relationships(&self) -> impl Iterator<Item = &RelationshipPattern> {
        self.steps.iter().map(|(rel, _)| rel)
    }

    /// Every alias declared in the pattern.
    pub fn aliases(&self) -> Vec<&str> {
        self.nodes()
            .filter_map(|n| n.alias.as_deref())
            .chain(self.relationships().filter_map(|r| r.alias.as_deref()))
            .collect()
    }
}

/// `(alias:Label {key: value})`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodePattern {
    pub alias: Option<String>,
    pub label: Option<String>,
    pub properties: Vec<(String, Expr)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `-[...]->`
    Outgoing,
    /// `<-[...]-`
    Incoming,
    /// `-[...]-`
    Either,
}

/// `-[alias:TYPE {key: value}]->`
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipPattern {
    pub alias: Option<String>,
    pub rel_type: Option<String>,
    pub properties: Vec<(String, Expr)>,
    pub direction: Direction,
}

/// `RETURN [DISTINCT] items [ORDER BY ...] [SKIP n] [LIMIT n]`
#[derive(Debug, Clone, PartialEq)]
pub struct Return {
    pub distinct: bool,
    pub items: Vec<ReturnItem>,
    pub order_by: Vec<SortItem>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl ReturnItem {
    /// The result column name: the `AS` name, or the item's own text.
    pub fn column_name(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => self.expr.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortItem {
    pub expr: Expr,
    pub descending: bool,
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    StartsWith,
    EndsWith,
    Contains,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Xor => "XOR",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "IN",
            BinaryOp::StartsWith => "STARTS WITH",
            BinaryOp::EndsWith => "ENDS WITH",
            BinaryOp::Contains => "CONTAINS",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Xor => prec::XOR,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::In
            | BinaryOp::StartsWith
            | BinaryOp::EndsWith
            | BinaryOp::Contains => prec::COMPARISON,
            BinaryOp::Add | BinaryOp::Sub => prec::ADDITIVE,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => prec::MULTIPLICATIVE,
        }
    }
}

/// An expression. `And`/`Or` are n-ary and never directly nested in
/// themselves; build them with [`Expr::and`] and [`Expr::or`].
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Scalar),
    Parameter(String),
    Variable(String),
    /// `base.key`
    Property(Box<Expr>, String),
    List(Vec<Expr>),
    /// `name([DISTINCT] args)`; `count(*)` has `star` set and no args.
    Function {
        name: String,
        distinct: bool,
        star: bool,
        args: Vec<Expr>,
    },
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary minus.
    Negate(Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
}

mod prec {
    pub const OR: u8 = 1;
    pub const XOR: u8 = 2;
    pub const AND: u8 = 3;
    pub const NOT: u8 = 4;
    pub const COMPARISON: u8 = 5;
    pub const ADDITIVE: u8 = 6;
    pub const MULTIPLICATIVE: u8 = 7;
    pub const UNARY: u8 = 8;
    pub const POSTFIX: u8 = 9;
    pub const ATOM: u8 = 10;
}

impl Expr {
    pub fn variable(name: impl Into<String>) -> Self {
        Expr::Variable(name.into())
    }

    /// `alias.key`
    pub fn property(alias: impl Into<String>, key: impl Into<String>) -> Self {
        Expr::Property(Box::new(Expr::Variable(alias.into())), key.into())
    }

    pub fn literal(value: impl Into<Scalar>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Conjunction, flattening nested conjunctions. A single operand is returned as is.
    pub fn and(parts: impl IntoIterator<Item = Expr>) -> Self {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Expr::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Expr::And(flat)
        }
    }

    /// Disjunction, flattening nested disjunctions.
    pub fn or(parts: impl IntoIterator<Item = Expr>) -> Self {
        let mut flat = Vec::new();
        for part in parts {
            match part {
                Expr::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Expr::Or(flat)
        }
    }

    /// The top-level conjuncts of this expression.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::And(parts) => parts.iter().collect(),
            other => vec![other],
        }
    }

    /// If this is `variable.key`, returns `(variable, key)`.
    pub fn as_property_of_variable(&self) -> Option<(&str, &str)> {
        match self {
            Expr::Property(base, key) => match base.as_ref() {
                Expr::Variable(var) => Some((var.as_str(), key.as_str())),
                _ => None,
            },
            _ => None,
        }
    }

    /// Returns whether the expression contains an aggregate function call.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Function { name, args, .. } => {
                is_aggregate(name) || args.iter().any(Expr::contains_aggregate)
            }
            Expr::Literal(_) | Expr::Parameter(_) | Expr::Variable(_) => false,
            Expr::Property(base, _) => base.contains_aggregate(),
            Expr::List(items) | Expr::And(items) | Expr::Or(items) => {
                items.iter().any(Expr::contains_aggregate)
            }
            Expr::Not(inner) | Expr::Negate(inner) => inner.contains_aggregate(),
            Expr::IsNull { expr, .. } => expr.contains_aggregate(),
            Expr::Binary { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Or(_) => prec::OR,
            Expr::And(_) => prec::AND,
            Expr::Not(_) => prec::NOT,
            Expr::Binary { op, .. } => op.precedence(),
            Expr::IsNull { .. } => prec::COMPARISON,
            Expr::Negate(_) => prec::UNARY,
            Expr::Literal(Scalar::Integer(i)) if *i < 0 => prec::UNARY,
            Expr::Literal(Scalar::Float(f)) if f.is_sign_negative() => prec::UNARY,
            Expr::Property(..) => prec::POSTFIX,
            Expr::Literal(_)
            | Expr::Parameter(_)
            | Expr::Variable(_)
            | Expr::List(_)
            | Expr::Function { .. } => prec::ATOM,
        }
    }

    fn write_with(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        if self.precedence() < min {
            f.write_char('(')?;
            self.write(f)?;
            f.write_char(')')
        } else {
            self.write(f)
        }
    }

    fn write_joined(f: &mut fmt::Formatter<'_>, parts: &[Expr], sep: &str, min: u8) -> fmt::Result {
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                f.write_str(sep)?;
            }
            part.write_with(f, min)?;
        }
        Ok(())
    }

    fn write(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(value) => f.write_str(&value.to_cypher()),
            Expr::Parameter(name) => write!(f, "${name}"),
            Expr::Variable(name) => f.write_str(&quote_identifier(name)),
            Expr::Property(base, key) => {
                base.write_with(f, prec::POSTFIX)?;
                write!(f, ".{}", quote_identifier(key))
            }
            Expr::List(items) => {
                f.write_char('[')?;
                Self::write_joined(f, items, ", ", prec::OR)?;
                f.write_char(']')
            }
            Expr::Function {
                name,
                distinct,
                star,
                args,
            } => {
                write!(f, "{}(", quote_identifier(name))?;
                if *star {
                    f.write_char('*')?;
                } else {
                    if *distinct {
                        f.write_str("DISTINCT ")?;
                    }
                    Self::write_joined(f, args, ", ", prec::OR)?;
                }
                f.write_char(')')
            }
            Expr::Not(inner) => {
                f.write_str("NOT (")?;
                inner.write(f)?;
                f.write_char(')')
            }
            Expr::And(parts) => Self::write_joined(f, parts, " AND ", prec::AND + 1),
            Expr::Or(parts) => Self::write_joined(f, parts, " OR ", prec::OR + 1),
            Expr::Binary { op, left, right } => {
                let p = op.precedence();
                left.write_with(f, p)?;
                write!(f, " {} ", op.symbol())?;
                right.write_with(f, p + 1)
            }
            Expr::Negate(inner) => {
                f.write_char('-')?;
                inner.write_with(f, prec::UNARY + 1)
            }
            Expr::IsNull { expr, negated } => {
                expr.write_with(f, prec::COMPARISON + 1)?;
                f.write_str(if *negated { " IS NOT NULL" } else { " IS NULL" })
            }
        }
    }
}

/// Returns whether `name` is an aggregate function.
pub fn is_aggregate(name: &str) -> bool {
    ["count", "sum", "avg", "min", "max", "collect"]
        .iter()
        .any(|agg| agg.eq_ignore_ascii_case(name))
}

// ============================================================================
// Printing
// ============================================================================

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f)
    }
}

fn write_properties(f: &mut fmt::Formatter<'_>, properties: &[(String, Expr)]) -> fmt::Result {
    if properties.is_empty() {
        return Ok(());
    }
    f.write_str(" {")?;
    for (i, (key, value)) in properties.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}: {value}", quote_identifier(key))?;
    }
    f.write_char('}')
}

impl Display for NodePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char('(')?;
        if let Some(alias) = &self.alias {
            f.write_str(&quote_identifier(alias))?;
        }
        if let Some(label) = &self.label {
            write!(f, ":{}", quote_identifier(label))?;
        }
        write_properties(f, &self.properties)?;
        f.write_char(')')
    }
}

impl Display for RelationshipPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.direction == Direction::Incoming {
            "<-["
        } else {
            "-["
        })?;
        if let Some(alias) = &self.alias {
            f.write_str(&quote_identifier(alias))?;
        }
        if let Some(rel_type) = &self.rel_type {
            write!(f, ":{}", quote_identifier(rel_type))?;
        }
        write_properties(f, &self.properties)?;
        f.write_str(if self.direction == Direction::Outgoing {
            "]->"
        } else {
            "]-"
        })
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)?;
        for (rel, node) in &self.steps {
            write!(f, "{rel}{node}")?;
        }
        Ok(())
    }
}

impl Display for ReturnItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {}", quote_identifier(alias))?;
        }
        Ok(())
    }
}

impl Display for Return {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RETURN ")?;
        if self.distinct {
            f.write_str("DISTINCT ")?;
        }
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{item}")?;
        }
        if !self.order_by.is_empty() {
            f.write_str(" ORDER BY ")?;
            for (i, sort) in self.order_by.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", sort.expr)?;
                if sort.descending {
                    f.write_str(" DESC")?;
                }
            }
        }
        if let Some(skip) = self.skip {
            write!(f, " SKIP {skip}")?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {limit}")?;
        }
        Ok(())
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MATCH {}", self.pattern)?;
        if let Some(where_clause) = &self.where_clause {
            write!(f, " WHERE {where_clause}")?;
        }
        write!(f, " {}", self.return_clause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_flattens() {
        let a = Expr::variable("a");
        let b = Expr::variable("b");
        let c = Expr::variable("c");
        let expr = Expr::and([Expr::and([a.clone(), b.clone()]), c.clone()]);
        assert_eq!(expr, Expr::And(vec![a.clone(), b, c]));
        assert_eq!(Expr::and([a.clone()]), a);
    }

    #[test]
    fn test_print_precedence() {
        let or = Expr::or([Expr::variable("a"), Expr::variable("b")]);
        let expr = Expr::and([or, Expr::variable("c")]);
        assert_eq!(expr.to_string(), "(a OR b) AND c");

        let arithmetic = Expr::binary(
            BinaryOp::Mul,
            Expr::binary(BinaryOp::Add, Expr::literal(1), Expr::literal(2)),
            Expr::literal(3),
        );
        assert_eq!(arithmetic.to_string(), "(1 + 2) * 3");

        let right_nested = Expr::binary(
            BinaryOp::Sub,
            Expr::literal(1),
            Expr::binary(BinaryOp::Sub, Expr::literal(2), Expr::literal(3)),
        );
        assert_eq!(right_nested.to_string(), "1 - (2 - 3)");
    }

    #[test]
    fn test_print_not_always_parenthesized() {
        let expr = Expr::Not(Box::new(Expr::binary(
            BinaryOp::Eq,
            Expr::property("g", "name"),
            Expr::literal("France"),
        )));
        assert_eq!(expr.to_string(), "NOT (g.name = 'France')");
    }

    #[test]
    fn test_print_pattern() {
        let pattern = Pattern {
            start: NodePattern {
                alias: Some("c".into()),
                label: Some("Commodity".into()),
                properties: vec![("name".into(), Expr::literal("Wheat"))],
            },
            steps: vec![(
                RelationshipPattern {
                    alias: None,
                    rel_type: Some("PRODUCED_IN".into()),
                    properties: Vec::new(),
                    direction: Direction::Incoming,
                },
                NodePattern {
                    alias: Some("g".into()),
                    label: Some("Geography".into()),
                    properties: Vec::new(),
                },
            )],
        };
        assert_eq!(
            pattern.to_string(),
            "(c:Commodity {name: 'Wheat'})<-[:PRODUCED_IN]-(g:Geography)"
        );
        assert_eq!(pattern.aliases(), vec!["c", "g"]);
    }

    #[test]
    fn test_column_name() {
        let plain = ReturnItem {
            expr: Expr::property("g", "name"),
            alias: None,
        };
        let aliased = ReturnItem {
            expr: Expr::property("g", "name"),
            alias: Some("country".into()),
        };
        assert_eq!(plain.column_name(), "g.name");
        assert_eq!(aliased.column_name(), "country");
    }

    #[test]
    fn test_contains_aggregate() {
        let count = Expr::Function {
            name: "COUNT".into(),
            distinct: false,
            star: true,
            args: Vec::new(),
        };
        assert!(count.contains_aggregate());
        assert!(!Expr::property("g", "name").contains_aggregate());
        assert_eq!(count.to_string(), "COUNT(*)");
    }
}
