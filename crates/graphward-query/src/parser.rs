//! Recursive-descent parser for the supported Cypher subset.
//!
//! ```text
//! query      := MATCH pattern [WHERE expr] RETURN [DISTINCT] item {"," item}
//!               [ORDER BY sort {"," sort}] [SKIP int] [LIMIT int] [";"]
//! pattern    := node { rel node }
//! node       := "(" [alias] [":" label] [props] ")"
//! rel        := "-[" inner "]->" | "<-[" inner "]-" | "-[" inner "]-"
//! ```
//!
//! ## Expression precedence (lowest to highest)
//!
//! 1. `OR`
//! 2. `XOR`
//! 3. `AND`
//! 4. `NOT`
//! 5. `=`, `<>`, `<`, `<=`, `>`, `>=`, `IN`, `STARTS WITH`, `ENDS WITH`, `CONTAINS`, `IS [NOT] NULL`
//! 6. `+`, `-`
//! 7. `*`, `/`, `%`
//! 8. unary `-`
//! 9. property access
//!
//! Valid Cypher outside the subset is reported as [`CypherError::Unsupported`].

use graphward_types::Scalar;

use crate::ast::{
    BinaryOp, Direction, Expr, NodePattern, Pattern, Query, RelationshipPattern, Return,
    ReturnItem, SortItem,
};
use crate::error::CypherError;
use crate::lexer::{Token, TokenKind, tokenize};

/// Clause keywords that may not appear anywhere in a supported query.
const UNSUPPORTED_CLAUSES: &[&str] = &[
    "OPTIONAL", "WITH", "UNWIND", "UNION", "CALL", "CREATE", "MERGE", "DELETE", "DETACH", "SET",
    "REMOVE", "FOREACH", "LOAD", "USE",
];

/// Parses a complete query.
pub fn parse_query(input: &str) -> Result<Query, CypherError> {
    let mut parser = Parser::new(tokenize(input)?);
    let query = parser.query()?;
    parser.finish()?;
    Ok(query)
}

/// Parses a standalone expression, such as a policy predicate.
pub fn parse_expression(input: &str) -> Result<Expr, CypherError> {
    let mut parser = Parser::new(tokenize(input)?);
    let expr = parser.expr()?;
    parser.finish()?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    // ------------------------------------------------------------------
    // Token stream helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> &TokenKind {
        self.peek_n(0)
    }

    fn peek_n(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .or_else(|| self.tokens.last())
            .map_or(&TokenKind::Eof, |t| &t.kind)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |t| t.start)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if kind != TokenKind::Eof {
            self.pos += 1;
        }
        kind
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check_keyword(&self, keyword: &str) -> bool {
        self.peek().is_keyword(keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.check_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> CypherError {
        CypherError::Parse {
            position: self.position(),
            message: message.into(),
        }
    }

    fn expected(&self, what: &str) -> CypherError {
        self.error(format!("expected {what}, found {}", self.peek()))
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), CypherError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.expected(&kind.to_string()))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), CypherError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.expected(keyword))
        }
    }

    /// Rejects the current token if it starts a clause outside the subset.
    fn reject_clause(&self) -> Result<(), CypherError> {
        if let Some(clause) = UNSUPPORTED_CLAUSES
            .iter()
            .find(|clause| self.check_keyword(clause))
        {
            return Err(CypherError::Unsupported(format!("{clause} clause")));
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), CypherError> {
        self.eat(&TokenKind::Semicolon);
        self.reject_clause()?;
        if self.check_keyword("MATCH") {
            return Err(CypherError::Unsupported("multiple MATCH clauses".into()));
        }
        if !self.check(&TokenKind::Eof) {
            return Err(self.expected("end of input"));
        }
        Ok(())
    }

    /// A bare or backtick-quoted name.
    fn name(&mut self) -> Option<String> {
        match self.peek() {
            TokenKind::Ident(name) | TokenKind::QuotedIdent(name) => {
                let name = name.clone();
                self.advance();
                Some(name)
            }
            _ => None,
        }
    }

    fn expect_name(&mut self, what: &str) -> Result<String, CypherError> {
        self.name().ok_or_else(|| self.expected(what))
    }

    // ------------------------------------------------------------------
    // Clauses
    // ------------------------------------------------------------------

    fn query(&mut self) -> Result<Query, CypherError> {
        self.reject_clause()?;
        self.expect_keyword("MATCH")?;

        if matches!(self.peek(), TokenKind::Ident(_)) && self.peek_n(1) == &TokenKind::Eq {
            return Err(CypherError::Unsupported("named paths".into()));
        }

        let pattern = self.pattern()?;
        if self.check(&TokenKind::Comma) {
            return Err(CypherError::Unsupported("multiple patterns".into()));
        }
        if self.check_keyword("MATCH") {
            return Err(CypherError::Unsupported("multiple MATCH clauses".into()));
        }

        let where_clause = if self.eat_keyword("WHERE") {
            Some(self.expr()?)
        } else {
            None
        };

        self.reject_clause()?;
        if self.check_keyword("MATCH") {
            return Err(CypherError::Unsupported("multiple MATCH clauses".into()));
        }
        self.expect_keyword("RETURN")?;
        let return_clause = self.return_clause()?;

        Ok(Query {
            pattern,
            where_clause,
            return_clause,
        })
    }

    fn return_clause(&mut self) -> Result<Return, CypherError> {
        let distinct = self.eat_keyword("DISTINCT");

        let mut items = Vec::new();
        loop {
            if self.check(&TokenKind::Star) {
                return Err(CypherError::Unsupported("RETURN *".into()));
            }
            let expr = self.expr()?;
            let alias = if self.eat_keyword("AS") {
                Some(self.expect_name("column name")?)
            } else {
                None
            };
            items.push(ReturnItem { expr, alias });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        let mut order_by = Vec::new();
        if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            loop {
                let expr = self.expr()?;
                let descending = if self.eat_keyword("DESC") || self.eat_keyword("DESCENDING") {
                    true
                } else {
                    let _ = self.eat_keyword("ASC") || self.eat_keyword("ASCENDING");
                    false
                };
                order_by.push(SortItem { expr, descending });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }

        let skip = if self.eat_keyword("SKIP") {
            Some(self.count("SKIP")?)
        } else {
            None
        };
        let limit = if self.eat_keyword("LIMIT") {
            Some(self.count("LIMIT")?)
        } else {
            None
        };

        Ok(Return {
            distinct,
            items,
            order_by,
            skip,
            limit,
        })
    }

    fn count(&mut self, clause: &str) -> Result<u64, CypherError> {
        match self.peek() {
            TokenKind::Integer(n) if *n >= 0 => {
                let n = n.unsigned_abs();
                self.advance();
                Ok(n)
            }
            TokenKind::Parameter(_) => {
                Err(CypherError::Unsupported(format!("parameterized {clause}")))
            }
            _ => Err(self.expected("non-negative integer")),
        }
    }

    // ------------------------------------------------------------------
    // Patterns
    // ------------------------------------------------------------------

    fn pattern(&mut self) -> Result<Pattern, CypherError> {
        let start = self.node()?;
        let mut steps = Vec::new();
        while matches!(self.peek(), TokenKind::Minus | TokenKind::Lt) {
            let rel = self.relationship()?;
            let node = self.node()?;
            steps.push((rel, node));
        }
        Ok(Pattern { start, steps })
    }

    fn node(&mut self) -> Result<NodePattern, CypherError> {
        self.expect(&TokenKind::LParen)?;
        let alias = self.name();
        let label = if self.eat(&TokenKind::Colon) {
            Some(self.expect_name("label")?)
        } else {
            None
        };
        if self.check(&TokenKind::Colon) {
            return Err(CypherError::Unsupported("multiple labels".into()));
        }
        let properties = self.property_map()?;
        self.expect(&TokenKind::RParen)?;
        Ok(NodePattern {
            alias,
            label,
            properties,
        })
    }

    fn relationship(&mut self) -> Result<RelationshipPattern, CypherError> {
        let incoming = self.eat(&TokenKind::Lt);
        self.expect(&TokenKind::Minus)?;
        if !self.check(&TokenKind::LBracket) {
            return Err(CypherError::Unsupported(
                "relationship without brackets".into(),
            ));
        }
        self.advance();

        let alias = self.name();
        let rel_type = if self.eat(&TokenKind::Colon) {
            Some(self.expect_name("relationship type")?)
        } else {
            None
        };
        if self.check(&TokenKind::Pipe) {
            return Err(CypherError::Unsupported("alternative relationship types".into()));
        }
        if self.check(&TokenKind::Star) {
            return Err(CypherError::Unsupported("variable-length relationships".into()));
        }
        let properties = self.property_map()?;
        self.expect(&TokenKind::RBracket)?;
        self.expect(&TokenKind::Minus)?;
        let outgoing = self.eat(&TokenKind::Gt);

        let direction = match (incoming, outgoing) {
            (false, true) => Direction::Outgoing,
            (true, false) => Direction::Incoming,
            (false, false) => Direction::Either,
            (true, true) => return Err(self.error("relationship cannot point both ways")),
        };

        Ok(RelationshipPattern {
            alias,
            rel_type,
            properties,
            direction,
        })
    }

    fn property_map(&mut self) -> Result<Vec<(String, Expr)>, CypherError> {
        let mut properties = Vec::new();
        if !self.eat(&TokenKind::LBrace) {
            return Ok(properties);
        }
        if self.eat(&TokenKind::RBrace) {
            return Ok(properties);
        }
        loop {
            let key = self.expect_name("property key")?;
            self.expect(&TokenKind::Colon)?;
            let value = self.expr()?;
            properties.push((key, value));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(properties)
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expr(&mut self) -> Result<Expr, CypherError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, CypherError> {
        let mut parts = vec![self.xor_expr()?];
        while self.eat_keyword("OR") {
            parts.push(self.xor_expr()?);
        }
        Ok(Expr::or(parts))
    }

    fn xor_expr(&mut self) -> Result<Expr, CypherError> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("XOR") {
            let right = self.and_expr()?;
            left = Expr::binary(BinaryOp::Xor, left, right);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, CypherError> {
        let mut parts = vec![self.not_expr()?];
        while self.eat_keyword("AND") {
            parts.push(self.not_expr()?);
        }
        Ok(Expr::and(parts))
    }

    fn not_expr(&mut self) -> Result<Expr, CypherError> {
        if self.eat_keyword("NOT") {
            let inner = self.not_expr()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, CypherError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::Eq => Some(BinaryOp::Eq),
                TokenKind::Ne => Some(BinaryOp::Ne),
                TokenKind::Lt => Some(BinaryOp::Lt),
                TokenKind::Le => Some(BinaryOp::Le),
                TokenKind::Gt => Some(BinaryOp::Gt),
                TokenKind::Ge => Some(BinaryOp::Ge),
                kind if kind.is_keyword("IN") => Some(BinaryOp::In),
                kind if kind.is_keyword("CONTAINS") => Some(BinaryOp::Contains),
                _ => None,
            };

            if let Some(op) = op {
                self.advance();
                let right = self.additive()?;
                left = Expr::binary(op, left, right);
            } else if self.check_keyword("STARTS") || self.check_keyword("ENDS") {
                let op = if self.eat_keyword("STARTS") {
                    BinaryOp::StartsWith
                } else {
                    self.advance();
                    BinaryOp::EndsWith
                };
                self.expect_keyword("WITH")?;
                let right = self.additive()?;
                left = Expr::binary(op, left, right);
            } else if self.eat_keyword("IS") {
                let negated = self.eat_keyword("NOT");
                self.expect_keyword("NULL")?;
                left = Expr::IsNull {
                    expr: Box::new(left),
                    negated,
                };
            } else {
                return Ok(left);
            }
        }
    }

    fn additive(&mut self) -> Result<Expr, CypherError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.multiplicative()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, CypherError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = Expr::binary(op, left, right);
        }
    }

    fn unary(&mut self) -> Result<Expr, CypherError> {
        if self.eat(&TokenKind::Minus) {
            // Numeric literals fold into a negative literal.
            return Ok(match self.unary()? {
                Expr::Literal(Scalar::Integer(i)) if i >= 0 => Expr::Literal(Scalar::Integer(-i)),
                Expr::Literal(Scalar::Float(f)) if f.is_sign_positive() => {
                    Expr::Literal(Scalar::Float(-f))
                }
                other => Expr::Negate(Box::new(other)),
            });
        }
        if self.eat(&TokenKind::Plus) {
            return self.unary();
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, CypherError> {
        let mut expr = self.atom()?;
        while self.eat(&TokenKind::Dot) {
            let key = self.expect_name("property key")?;
            expr = Expr::Property(Box::new(expr), key);
        }
        if self.check(&TokenKind::LBracket) {
            return Err(CypherError::Unsupported("subscript expressions".into()));
        }
        Ok(expr)
    }

    fn atom(&mut self) -> Result<Expr, CypherError> {
        match self.peek().clone() {
            TokenKind::String(s) => {
                self.advance();
                Ok(Expr::Literal(Scalar::String(s)))
            }
            TokenKind::Integer(i) => {
                self.advance();
                Ok(Expr::Literal(Scalar::Integer(i)))
            }
            TokenKind::Float(f) => {
                self.advance();
                Ok(Expr::Literal(Scalar::Float(f)))
            }
            TokenKind::Parameter(name) => {
                self.advance();
                Ok(Expr::Parameter(name))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.advance();
                let items = self.expr_list(&TokenKind::RBracket)?;
                Ok(Expr::List(items))
            }
            TokenKind::LBrace => Err(CypherError::Unsupported("map literals".into())),
            TokenKind::QuotedIdent(name) => {
                self.advance();
                if self.check(&TokenKind::LParen) {
                    return self.function(name);
                }
                Ok(Expr::Variable(name))
            }
            TokenKind::Ident(word) => {
                self.advance();
                if self.check(&TokenKind::LParen) {
                    return self.function(word);
                }
                match word.to_ascii_uppercase().as_str() {
                    "TRUE" => Ok(Expr::Literal(Scalar::Boolean(true))),
                    "FALSE" => Ok(Expr::Literal(Scalar::Boolean(false))),
                    "NULL" => Ok(Expr::Literal(Scalar::Null)),
                    "CASE" => Err(CypherError::Unsupported("CASE expressions".into())),
                    "EXISTS" | "COUNT" => {
                        Err(CypherError::Unsupported("subquery expressions".into()))
                    }
                    _ => Ok(Expr::Variable(word)),
                }
            }
            _ => Err(self.expected("expression")),
        }
    }

    fn function(&mut self, name: String) -> Result<Expr, CypherError> {
        self.expect(&TokenKind::LParen)?;
        if self.eat(&TokenKind::Star) {
            self.expect(&TokenKind::RParen)?;
            return Ok(Expr::Function {
                name,
                distinct: false,
                star: true,
                args: Vec::new(),
            });
        }
        let distinct = self.eat_keyword("DISTINCT");
        let args = self.expr_list(&TokenKind::RParen)?;
        Ok(Expr::Function {
            name,
            distinct,
            star: false,
            args,
        })
    }

    /// Comma-separated expressions up to and including `close`.
    fn expr_list(&mut self, close: &TokenKind) -> Result<Vec<Expr>, CypherError> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(self.expr()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(close)?;
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn roundtrip(input: &str) -> String {
        parse_query(input).unwrap().to_string()
    }

    #[test]
    fn test_simple_match() {
        let query = parse_query("match (g:Geography) where g.name = 'France' return g.name").unwrap();
        assert_eq!(query.pattern.start.alias.as_deref(), Some("g"));
        assert_eq!(query.pattern.start.label.as_deref(), Some("Geography"));
        assert_eq!(
            query.where_clause,
            Some(Expr::binary(
                BinaryOp::Eq,
                Expr::property("g", "name"),
                Expr::literal("France")
            ))
        );
        assert_eq!(query.return_clause.items.len(), 1);
    }

    #[test]
    fn test_path_with_directions() {
        let query = parse_query(
            "MATCH (a:Geography)-[t:TRADES_WITH]->(b:Geography)<-[:PRODUCES]-(c:Commodity)-[r:RELATED]-(d:Commodity) RETURN a, t",
        )
        .unwrap();
        let directions: Vec<Direction> = query
            .pattern
            .relationships()
            .map(|r| r.direction)
            .collect();
        assert_eq!(
            directions,
            vec![Direction::Outgoing, Direction::Incoming, Direction::Either]
        );
        assert_eq!(query.pattern.aliases(), vec!["a", "b", "c", "d", "t", "r"]);
    }

    #[test_case(
        "MATCH (g:Geography) RETURN g.name";
        "plain projection"
    )]
    #[test_case(
        "MATCH (g:Geography) WHERE g.population > 1000 AND (g.name = 'France' OR g.name = 'Spain') RETURN g.name AS name ORDER BY name DESC SKIP 5 LIMIT 10";
        "ordering and paging"
    )]
    #[test_case(
        "MATCH (b:BalanceSheet {year: 2024}) RETURN DISTINCT b.product_name, count(*) AS n";
        "distinct with aggregate"
    )]
    #[test_case(
        "MATCH (c:Commodity)<-[p:PRODUCES]-(g:Geography) WHERE NOT (g.name IN ['France', 'Spain']) AND p.volume IS NOT NULL RETURN c.name, g.name";
        "negation and membership"
    )]
    #[test_case(
        "MATCH (g:Geography) WHERE g.name STARTS WITH 'Fr' XOR g.code ENDS WITH 'X' RETURN toLower(g.name)";
        "string operators"
    )]
    #[test_case(
        "MATCH (t:Trade) WHERE t.value * -2 >= (t.cost + 1) * 3 RETURN t.value % 7, -t.cost";
        "arithmetic"
    )]
    #[test_case(
        "MATCH (`my node`:`Odd Label`) WHERE `my node`.`the value` = $param RETURN `my node`";
        "quoted identifiers"
    )]
    fn test_canonical_roundtrip(input: &str) {
        let printed = roundtrip(input);
        assert_eq!(printed, input);
        assert_eq!(roundtrip(&printed), printed);
    }

    #[test]
    fn test_print_normalizes() {
        assert_eq!(
            roundtrip(
                "match (g:Geography) where not g.name = \"France\" return g.name order by g.name asc limit 3;"
            ),
            "MATCH (g:Geography) WHERE NOT (g.name = 'France') RETURN g.name ORDER BY g.name LIMIT 3"
        );
    }

    #[test_case("OPTIONAL MATCH (g:Geography) RETURN g"; "optional match")]
    #[test_case("MATCH (g:Geography) WITH g RETURN g"; "with clause")]
    #[test_case("MATCH (g:Geography) RETURN g UNION MATCH (c:Commodity) RETURN c"; "union")]
    #[test_case("CALL db.labels()"; "procedure call")]
    #[test_case("MATCH (g:Geography) SET g.name = 'x' RETURN g"; "write clause")]
    #[test_case("MATCH (g:Geography), (c:Commodity) RETURN g"; "multiple patterns")]
    #[test_case("MATCH (g:Geography) MATCH (c:Commodity) RETURN g"; "multiple match")]
    #[test_case("MATCH p = (g:Geography) RETURN p"; "named path")]
    #[test_case("MATCH (g:Geography:Country) RETURN g"; "multiple labels")]
    #[test_case("MATCH (a:A)-[:X|Y]->(b:B) RETURN a"; "alternative types")]
    #[test_case("MATCH (a:A)-[:X*1..3]->(b:B) RETURN a"; "variable length")]
    #[test_case("MATCH (a:A)-->(b:B) RETURN a"; "bare arrow")]
    #[test_case("MATCH (g:Geography) RETURN *"; "return star")]
    #[test_case("MATCH (g:Geography) RETURN CASE WHEN g.x THEN 1 END"; "case expression")]
    #[test_case("MATCH (g:Geography) RETURN g LIMIT $n"; "parameterized limit")]
    fn test_rejects_unsupported(input: &str) {
        assert!(matches!(parse_query(input), Err(CypherError::Unsupported(_))), "{input}");
    }

    #[test_case("MATCH (g:Geography RETURN g"; "unclosed node")]
    #[test_case("MATCH (g:Geography) RETURN"; "empty return")]
    #[test_case("MATCH (g:Geography) RETURN g garbage"; "trailing input")]
    #[test_case("RETURN 1"; "no match")]
    #[test_case("MATCH (a:A)<-[:X]->(b:B) RETURN a"; "two-way arrow")]
    fn test_rejects_invalid(input: &str) {
        assert!(matches!(parse_query(input), Err(CypherError::Parse { .. })), "{input}");
    }

    #[test]
    fn test_parse_expression() {
        let expr = parse_expression("NOT (name = 'France') AND (value > 1000000)").unwrap();
        assert_eq!(expr.conjuncts().len(), 2);
        assert_eq!(expr.to_string(), "NOT (name = 'France') AND value > 1000000");

        assert!(parse_expression("name = ").is_err());
        assert!(parse_expression("a b").is_err());
    }

    #[test]
    fn test_negative_literals_fold() {
        assert_eq!(parse_expression("-5").unwrap(), Expr::literal(-5));
        assert_eq!(parse_expression("-x").unwrap().to_string(), "-x");
    }
}
