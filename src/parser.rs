use anyhow::anyhow;
use strum::IntoDiscriminant;

use crate::ast::{
    Call, Identifier, JoinKind, Literal, Operator, SelectNode, SetOperator, SqlNode, Token,
    TokenType, TokenTypeVariant,
};
use crate::scanner::Scanner;

/// Ceiling on nested expression frames (parenthesized expressions, function
/// arguments, unary operators and operator chains). Keeps the syntax tree
/// shallow enough that every later recursive walk is bounded.
pub const MAX_PARSE_DEPTH: usize = 96;

/// Sub-queries nested deeper than this are not parsed: their tokens are
/// skipped and an [`Operator::ElidedQuery`] leaf takes their place.
pub const MAX_QUERY_DEPTH: usize = 32;

/// A SQL front-end turning text into the analyzer's node taxonomy.
pub trait Frontend: Send + Sync {
    fn parse(&self, sql: &str) -> anyhow::Result<SqlNode>;
}

/// Default front-end: MySQL lexing and a recursive-descent SELECT parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlFrontend;

impl Frontend for MySqlFrontend {
    fn parse(&self, sql: &str) -> anyhow::Result<SqlNode> {
        parse_sql(sql)
    }
}

pub struct Parser<'a> {
    source_tokens: &'a [Token],
    curr: usize,
    depth: usize,
    query_depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Parser<'a> {
        Self {
            source_tokens: tokens,
            curr: 0,
            depth: 0,
            query_depth: 0,
        }
    }

    pub fn parse(&mut self) -> anyhow::Result<SqlNode> {
        self.parse_statement()
    }

    fn peek_prev(&self) -> &Token {
        &self.source_tokens[self.curr - 1]
    }

    fn peek(&self) -> &Token {
        &self.source_tokens[self.curr]
    }

    fn peek_next_i(&self, i: usize) -> &Token {
        if self.curr + i >= self.source_tokens.len() {
            &self.source_tokens[self.source_tokens.len() - 1] // Eof
        } else {
            &self.source_tokens[self.curr + i]
        }
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            // Do not advance if we peek Eof
            self.curr += 1;
        }
        self.peek_prev()
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenType::Eof
    }

    fn check_token_type(&self, token_type: TokenTypeVariant) -> bool {
        self.peek().kind.discriminant() == token_type
    }

    fn match_token_type(&mut self, token_type: TokenTypeVariant) -> bool {
        if self.check_token_type(token_type) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check_non_reserved_keyword(&self, value: &str) -> bool {
        match &self.peek().kind {
            TokenType::Identifier(ident) => ident.to_lowercase() == value,
            _ => false,
        }
    }

    fn match_non_reserved_keyword(&mut self, value: &str) -> bool {
        if self.check_non_reserved_keyword(value) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check_identifier(&self) -> bool {
        self.check_token_type(TokenTypeVariant::Identifier)
            || self.check_token_type(TokenTypeVariant::QuotedIdentifier)
    }

    fn consume(&mut self, token_type: TokenTypeVariant) -> anyhow::Result<&Token> {
        if self.check_token_type(token_type) {
            Ok(self.advance())
        } else {
            let err_msg = format!("Expected `{}`.", token_type.variant_str());
            Err(anyhow!(self.error(self.peek(), &err_msg)))
        }
    }

    fn consume_identifier(&mut self) -> anyhow::Result<String> {
        let token = self.peek().clone();
        match token.kind {
            TokenType::Identifier(ident) | TokenType::QuotedIdentifier(ident) => {
                self.advance();
                Ok(ident)
            }
            _ => Err(anyhow!(self.error(&token, "Expected identifier."))),
        }
    }

    fn error(&self, token: &Token, message: &str) -> String {
        format!(
            "[line {}, col {}] Error {}: {}",
            token.line,
            token.col,
            &format!("at '{}'", token.lexeme),
            message
        )
    }

    fn enter(&mut self) -> anyhow::Result<()> {
        self.depth += 1;
        if self.depth > MAX_PARSE_DEPTH {
            return Err(anyhow!(self.error(
                self.peek(),
                &format!("Expression nesting exceeds {} levels.", MAX_PARSE_DEPTH)
            )));
        }
        Ok(())
    }

    fn exit(&mut self, frames: usize) {
        self.depth -= frames;
    }

    /// Lookahead (past any opening parentheses) for the start of a query.
    fn check_query_ahead(&self) -> bool {
        let mut i = 0;
        while self.peek_next_i(i).kind == TokenType::LeftParen {
            i += 1;
        }
        self.peek_next_i(i).kind == TokenType::Select
    }

    // statement -> (with_expr | query_expr)
    // The trailing semicolon is stripped before parsing.
    fn parse_statement(&mut self) -> anyhow::Result<SqlNode> {
        if self.check_token_type(TokenTypeVariant::Eof) {
            return Err(anyhow!(self.error(self.peek(), "Expected `SELECT`.")));
        }
        let query = if self.check_token_type(TokenTypeVariant::With) {
            self.parse_with_expr()?
        } else {
            self.parse_query_expr()?
        };
        self.consume(TokenTypeVariant::Eof)?;
        Ok(query)
    }

    // with_expr -> "WITH" ["RECURSIVE"] cte ("," cte)* query_expr
    // cte -> ("Identifier" | "QuotedIdentifier") ["(" identifier ("," identifier)* ")"] "AS" "(" query_expr ")"
    fn parse_with_expr(&mut self) -> anyhow::Result<SqlNode> {
        self.consume(TokenTypeVariant::With)?;
        let recursive = self.match_non_reserved_keyword("recursive");

        let mut ctes = vec![];
        loop {
            let name = self.consume_identifier()?;
            if self.match_token_type(TokenTypeVariant::LeftParen) {
                // Column names are not kept
                loop {
                    self.consume_identifier()?;
                    if !self.match_token_type(TokenTypeVariant::Comma) {
                        break;
                    }
                }
                self.consume(TokenTypeVariant::RightParen)?;
            }
            self.consume(TokenTypeVariant::As)?;
            self.consume(TokenTypeVariant::LeftParen)?;
            let query = self.parse_query_expr()?;
            self.consume(TokenTypeVariant::RightParen)?;
            ctes.push(SqlNode::Call(Call::new(
                Operator::As,
                vec![query, SqlNode::Identifier(Identifier::simple(&name))],
            )));
            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }

        let body = self.parse_query_expr()?;
        Ok(SqlNode::Call(Call::new(
            Operator::With { recursive },
            vec![SqlNode::NodeList(ctes), body],
        )))
    }

    fn parse_query_expr(&mut self) -> anyhow::Result<SqlNode> {
        if self.query_depth >= MAX_QUERY_DEPTH {
            return self.skip_nested_query();
        }
        self.query_depth += 1;
        let query = self.parse_query_body()?;
        self.query_depth -= 1;
        Ok(query)
    }

    /// Consumes a sub-query up to, but not including, its closing parenthesis.
    fn skip_nested_query(&mut self) -> anyhow::Result<SqlNode> {
        if !self.check_token_type(TokenTypeVariant::Select)
            && !self.check_token_type(TokenTypeVariant::LeftParen)
        {
            return Err(anyhow!(self.error(self.peek(), "Expected `SELECT`.")));
        }
        log::warn!(
            "[line {}, col {}] Sub-query nested deeper than {} levels, skipping it.",
            self.peek().line,
            self.peek().col,
            MAX_QUERY_DEPTH
        );

        let mut open = 0usize;
        loop {
            match self.peek().kind {
                TokenType::LeftParen => open += 1,
                TokenType::RightParen if open == 0 => break,
                TokenType::RightParen => open -= 1,
                TokenType::Eof => {
                    return Err(anyhow!(self.error(self.peek(), "Expected `)`.")));
                }
                _ => {}
            }
            self.advance();
        }
        Ok(SqlNode::Call(Call::new(Operator::ElidedQuery, vec![])))
    }

    // query_expr ->
    // set_operand (("UNION" ["ALL" | "DISTINCT"] | "INTERSECT" ["DISTINCT"] | "EXCEPT" ["DISTINCT"]) set_operand)*
    // ["ORDER BY" order_by_expr]
    // ["LIMIT" limit_expr]
    fn parse_query_body(&mut self) -> anyhow::Result<SqlNode> {
        let mut links = 0;
        let mut output = self.parse_set_operand()?;

        loop {
            let set_operator = match self.peek().kind.clone() {
                TokenType::Union => {
                    self.advance();
                    if self.match_token_type(TokenTypeVariant::All) {
                        SetOperator::UnionAll
                    } else {
                        self.match_token_type(TokenTypeVariant::Distinct);
                        SetOperator::Union
                    }
                }
                TokenType::Intersect => {
                    self.advance();
                    self.match_token_type(TokenTypeVariant::Distinct);
                    SetOperator::Intersect
                }
                TokenType::Except => {
                    self.advance();
                    self.match_token_type(TokenTypeVariant::Distinct);
                    SetOperator::Except
                }
                _ => break,
            };
            self.enter()?;
            links += 1;
            let right = self.parse_set_operand()?;
            output = SqlNode::Call(Call::new(Operator::Set(set_operator), vec![output, right]));
        }

        let order_by = if self.match_token_type(TokenTypeVariant::Order) {
            self.consume(TokenTypeVariant::By)?;
            self.parse_order_by_expr()?
        } else {
            vec![]
        };
        let (limit, offset) = self.parse_limit_expr()?;

        if !order_by.is_empty() || limit.is_some() {
            output = match output {
                SqlNode::Select(mut select) if select.order_by.is_empty() && select.limit.is_none() => {
                    select.order_by = order_by;
                    select.limit = limit;
                    select.offset = offset;
                    SqlNode::Select(select)
                }
                other => {
                    let mut operands = vec![other, SqlNode::NodeList(order_by)];
                    if let Some(limit) = limit {
                        operands.push(limit);
                    }
                    SqlNode::Call(Call::new(Operator::OrderBy, operands))
                }
            };
        }

        self.exit(links);
        Ok(output)
    }

    // set_operand -> select | "(" query_expr ")"
    fn parse_set_operand(&mut self) -> anyhow::Result<SqlNode> {
        if self.match_token_type(TokenTypeVariant::LeftParen) {
            let query = self.parse_query_expr()?;
            self.consume(TokenTypeVariant::RightParen)?;
            Ok(query)
        } else {
            Ok(SqlNode::Select(Box::new(self.parse_select()?)))
        }
    }

    // limit_expr -> "LIMIT" expr [("OFFSET" expr | "," expr)]
    fn parse_limit_expr(&mut self) -> anyhow::Result<(Option<SqlNode>, Option<SqlNode>)> {
        if !self.match_token_type(TokenTypeVariant::Limit) {
            return Ok((None, None));
        }
        let first = self.parse_expr()?;
        if self.match_token_type(TokenTypeVariant::Offset) {
            let offset = self.parse_expr()?;
            Ok((Some(first), Some(offset)))
        } else if self.match_token_type(TokenTypeVariant::Comma) {
            // MySQL `LIMIT offset, count`
            let count = self.parse_expr()?;
            Ok((Some(count), Some(first)))
        } else {
            Ok((Some(first), None))
        }
    }

    // order_by_expr -> expr [("ASC" | "DESC")] ("," expr [("ASC" | "DESC")])*
    fn parse_order_by_expr(&mut self) -> anyhow::Result<Vec<SqlNode>> {
        let mut items = vec![];
        loop {
            let expr = self.parse_expr()?;
            let item = if self.match_token_type(TokenTypeVariant::Desc) {
                SqlNode::Call(Call::new(Operator::Descending, vec![expr]))
            } else {
                self.match_token_type(TokenTypeVariant::Asc);
                expr
            };
            items.push(item);
            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }
        Ok(items)
    }

    // select ->
    // "SELECT"
    // [("ALL" | "DISTINCT")]
    // select_item ("," select_item)*
    // ["FROM" from_expr]
    // ["WHERE" expr]
    // ["GROUP BY" expr ("," expr)*]
    // ["HAVING" expr]
    fn parse_select(&mut self) -> anyhow::Result<SelectNode> {
        self.consume(TokenTypeVariant::Select)?;

        let distinct = self.match_token_type(TokenTypeVariant::Distinct);
        if !distinct {
            self.match_token_type(TokenTypeVariant::All);
        }

        let mut select_list = vec![];
        loop {
            select_list.push(self.parse_select_item()?);
            if !self.match_token_type(TokenTypeVariant::Comma) {
                break;
            }
        }

        let from = if self.match_token_type(TokenTypeVariant::From) {
            Some(self.parse_from_expr()?)
        } else {
            None
        };

        let r#where = if self.match_token_type(TokenTypeVariant::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let mut group_by = vec![];
        if self.match_token_type(TokenTypeVariant::Group) {
            self.consume(TokenTypeVariant::By)?;
            loop {
                group_by.push(self.parse_expr()?);
                if !self.match_token_type(TokenTypeVariant::Comma) {
                    break;
                }
            }
            if self.match_token_type(TokenTypeVariant::With) {
                // WITH ROLLUP does not change the projected fields
                if !self.match_non_reserved_keyword("rollup") {
                    return Err(anyhow!(self.error(self.peek(), "Expected `ROLLUP`.")));
                }
            }
        }

        let having = if self.match_token_type(TokenTypeVariant::Having) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        Ok(SelectNode {
            distinct,
            select_list,
            from,
            r#where,
            group_by,
            having,
            order_by: vec![],
            limit: None,
            offset: None,
        })
    }

    // select_item -> "*" | expr [as_alias]
    fn parse_select_item(&mut self) -> anyhow::Result<SqlNode> {
        if self.match_token_type(TokenTypeVariant::Star) {
            return Ok(SqlNode::Identifier(Identifier::simple("*")));
        }
        let expr = self.parse_expr()?;
        Ok(match self.parse_as_alias()? {
            Some(alias) => SqlNode::Call(Call::new(
                Operator::As,
                vec![expr, SqlNode::Identifier(Identifier::simple(&alias))],
            )),
            None => expr,
        })
    }

    // as_alias -> ["AS"] ("Identifier" | "QuotedIdentifier") | "AS" "String"
    fn parse_as_alias(&mut self) -> anyhow::Result<Option<String>> {
        if self.match_token_type(TokenTypeVariant::As) {
            let token = self.peek().clone();
            if let TokenType::String(alias) = token.kind {
                self.advance();
                return Ok(Some(alias));
            }
            return Ok(Some(self.consume_identifier()?));
        }
        if self.check_identifier() {
            return Ok(Some(self.consume_identifier()?));
        }
        Ok(None)
    }

    // from_expr -> from_item_expr (cross_join_op from_item_expr | cond_join_op from_item_expr [cond])*
    // where:
    // cross_join_op -> "CROSS" "JOIN" | ","
    // cond_join_op -> (["INNER"] "JOIN" | "FULL" ["OUTER"] "JOIN" | "LEFT" ["OUTER"] "JOIN" | "RIGHT" ["OUTER"] "JOIN")
    fn parse_from_expr(&mut self) -> anyhow::Result<SqlNode> {
        let mut output = self.parse_from_item_expr()?;
        let mut links = 0;

        loop {
            let kind = match self.peek().kind.clone() {
                TokenType::Inner | TokenType::Join => {
                    self.match_token_type(TokenTypeVariant::Inner);
                    JoinKind::Inner
                }
                TokenType::Left => {
                    self.advance();
                    self.match_token_type(TokenTypeVariant::Outer);
                    JoinKind::Left
                }
                TokenType::Right => {
                    self.advance();
                    self.match_token_type(TokenTypeVariant::Outer);
                    JoinKind::Right
                }
                TokenType::Full => {
                    self.advance();
                    self.match_token_type(TokenTypeVariant::Outer);
                    JoinKind::Full
                }
                TokenType::Cross => {
                    self.advance();
                    JoinKind::Cross
                }
                TokenType::Comma => JoinKind::Comma,
                TokenType::Natural => {
                    return Err(anyhow!(
                        self.error(self.peek(), "NATURAL joins are not supported.")
                    ));
                }
                _ => break,
            };
            if kind == JoinKind::Comma {
                self.advance();
            } else {
                self.consume(TokenTypeVariant::Join)?;
            }
            self.enter()?;
            links += 1;

            let right = self.parse_from_item_expr()?;
            let mut operands = vec![output, right];
            match kind {
                JoinKind::Cross | JoinKind::Comma => {}
                JoinKind::Inner => {
                    if let Some(cond) = self.parse_cond()? {
                        operands.push(cond);
                    }
                }
                _ => match self.parse_cond()? {
                    Some(cond) => operands.push(cond),
                    None => {
                        return Err(anyhow!(
                            self.error(self.peek(), "Expected `ON` or `USING`.")
                        ));
                    }
                },
            }
            output = SqlNode::Call(Call::new(Operator::Join(kind), operands));
        }

        self.exit(links);
        Ok(output)
    }

    // cond -> "ON" expr | "USING" "(" ("Identifier" | "QuotedIdentifier") ("," ("Identifier" | "QuotedIdentifier"))* ")"
    fn parse_cond(&mut self) -> anyhow::Result<Option<SqlNode>> {
        if self.match_token_type(TokenTypeVariant::On) {
            let bool_expr = self.parse_expr()?;
            Ok(Some(SqlNode::Call(Call::new(Operator::On, vec![bool_expr]))))
        } else if self.match_token_type(TokenTypeVariant::Using) {
            self.consume(TokenTypeVariant::LeftParen)?;
            let mut columns = vec![];
            loop {
                let ident = self.consume_identifier()?;
                columns.push(SqlNode::Identifier(Identifier::simple(&ident)));
                if !self.match_token_type(TokenTypeVariant::Comma) {
                    break;
                }
            }
            self.consume(TokenTypeVariant::RightParen)?;
            Ok(Some(SqlNode::Call(Call::new(
                Operator::Using,
                vec![SqlNode::NodeList(columns)],
            ))))
        } else {
            Ok(None)
        }
    }

    // from_item_expr -> path [as_alias] | "(" query_expr ")" [as_alias] | "(" from_expr ")"
    fn parse_from_item_expr(&mut self) -> anyhow::Result<SqlNode> {
        if self.check_token_type(TokenTypeVariant::LeftParen) {
            self.enter()?;
            let item = if self.check_query_ahead() {
                let query = self.parse_set_operand()?;
                match self.parse_as_alias()? {
                    Some(alias) => SqlNode::Call(Call::new(
                        Operator::As,
                        vec![query, SqlNode::Identifier(Identifier::simple(&alias))],
                    )),
                    None => query,
                }
            } else {
                self.advance();
                let from_expr = self.parse_from_expr()?;
                self.consume(TokenTypeVariant::RightParen)?;
                from_expr
            };
            self.exit(1);
            Ok(item)
        } else {
            let path = self.parse_path()?;
            Ok(match self.parse_as_alias()? {
                Some(alias) => SqlNode::Call(Call::new(
                    Operator::As,
                    vec![
                        SqlNode::Identifier(path),
                        SqlNode::Identifier(Identifier::simple(&alias)),
                    ],
                )),
                None => SqlNode::Identifier(path),
            })
        }
    }

    // path -> identifier ("." identifier)*
    fn parse_path(&mut self) -> anyhow::Result<Identifier> {
        let mut parts = vec![self.consume_identifier()?];
        while self.match_token_type(TokenTypeVariant::Dot) {
            parts.push(self.consume_identifier()?);
        }
        Ok(Identifier::new(parts))
    }

    // expr -> or_expr
    fn parse_expr(&mut self) -> anyhow::Result<SqlNode> {
        self.enter()?;
        let expr = self.parse_or_expr()?;
        self.exit(1);
        Ok(expr)
    }

    /// Util function to parse a standard binary rule expression of kind
    ///
    /// `parse_rule -> next_parsing_rule (("T1" | "T2" | ...) next_parsing_rule)*`
    ///
    /// Every link of the chain counts as one nesting level, since the
    /// resulting tree is left-deep.
    fn parse_standard_binary_expr(
        &mut self,
        token_types_to_match: &[(TokenTypeVariant, Operator)],
        next_parsing_rule_fn: impl Fn(&mut Self) -> anyhow::Result<SqlNode>,
    ) -> anyhow::Result<SqlNode> {
        let mut output = next_parsing_rule_fn(self)?;
        let mut links = 0;

        'chain: loop {
            for (token_type, operator) in token_types_to_match {
                if self.match_token_type(*token_type) {
                    self.enter()?;
                    links += 1;
                    let right = next_parsing_rule_fn(self)?;
                    output = SqlNode::Call(Call::new(operator.clone(), vec![output, right]));
                    continue 'chain;
                }
            }
            break;
        }

        self.exit(links);
        Ok(output)
    }

    /// Like [`Self::parse_standard_binary_expr`] but for associative
    /// operators, which are kept flat as a single n-ary call.
    fn parse_flat_binary_expr(
        &mut self,
        token_type: TokenTypeVariant,
        operator: Operator,
        next_parsing_rule_fn: impl Fn(&mut Self) -> anyhow::Result<SqlNode>,
    ) -> anyhow::Result<SqlNode> {
        let first = next_parsing_rule_fn(self)?;
        if !self.check_token_type(token_type) {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.match_token_type(token_type) {
            operands.push(next_parsing_rule_fn(self)?);
        }
        Ok(SqlNode::Call(Call::new(operator, operands)))
    }

    // or_expr -> xor_expr ("OR" xor_expr)*
    fn parse_or_expr(&mut self) -> anyhow::Result<SqlNode> {
        self.parse_flat_binary_expr(TokenTypeVariant::Or, Operator::Or, Self::parse_xor_expr)
    }

    // xor_expr -> and_expr ("XOR" and_expr)*
    fn parse_xor_expr(&mut self) -> anyhow::Result<SqlNode> {
        self.parse_standard_binary_expr(
            &[(TokenTypeVariant::Xor, Operator::Xor)],
            Self::parse_and_expr,
        )
    }

    // and_expr -> not_expr ("AND" not_expr)*
    fn parse_and_expr(&mut self) -> anyhow::Result<SqlNode> {
        self.parse_flat_binary_expr(TokenTypeVariant::And, Operator::And, Self::parse_not_expr)
    }

    // not_expr -> "NOT" not_expr | comparison_expr
    fn parse_not_expr(&mut self) -> anyhow::Result<SqlNode> {
        if self.match_token_type(TokenTypeVariant::Not) {
            self.enter()?;
            let right = self.parse_not_expr()?;
            self.exit(1);
            return Ok(SqlNode::Call(Call::new(Operator::Not, vec![right])));
        }
        self.parse_comparison_expr()
    }

    // comparison_expr ->
    // bitwise_or_expr
    // | bitwise_or_expr (("=" | ">" | "<" | ">=" | "<=", | "!=", | "<>") bitwise_or_expr)*
    // | bitwise_or_expr "IS" ["NOT"] ("TRUE" | "FALSE" | "NULL")
    // | bitwise_or_expr ["NOT"] "IN" "(" (query_expr | expr ("," expr)*) ")"
    // | bitwise_or_expr ["NOT"] "BETWEEN" bitwise_or_expr "AND" bitwise_or_expr
    // | bitwise_or_expr ["NOT"] ("LIKE" | "REGEXP") bitwise_or_expr
    fn parse_comparison_expr(&mut self) -> anyhow::Result<SqlNode> {
        let mut output = self.parse_bitwise_or_expr()?;
        let mut links = 0;

        loop {
            let negated = self.check_token_type(TokenTypeVariant::Not)
                && matches!(
                    self.peek_next_i(1).kind,
                    TokenType::In | TokenType::Between | TokenType::Like | TokenType::Regexp
                );
            if negated {
                self.advance();
            }

            let curr_token = self.peek().clone();
            let simple_operator = match curr_token.kind {
                TokenType::Equal => Some(Operator::Equal),
                TokenType::Greater => Some(Operator::Greater),
                TokenType::Less => Some(Operator::Less),
                TokenType::GreaterEqual => Some(Operator::GreaterEqual),
                TokenType::LessEqual => Some(Operator::LessEqual),
                TokenType::BangEqual | TokenType::NotEqual => Some(Operator::NotEqual),
                TokenType::Like if negated => Some(Operator::NotLike),
                TokenType::Like => Some(Operator::Like),
                TokenType::Regexp if negated => Some(Operator::NotRegexp),
                TokenType::Regexp => Some(Operator::Regexp),
                _ => None,
            };

            if let Some(operator) = simple_operator {
                self.advance();
                self.enter()?;
                links += 1;
                let right = self.parse_bitwise_or_expr()?;
                output = SqlNode::Call(Call::new(operator, vec![output, right]));
                continue;
            }

            match curr_token.kind {
                TokenType::Is => {
                    self.advance();
                    let not = self.match_token_type(TokenTypeVariant::Not);
                    let literal = self.peek().clone();
                    let operator = match (&literal.kind, not) {
                        (TokenType::Null, false) => Operator::IsNull,
                        (TokenType::Null, true) => Operator::IsNotNull,
                        (TokenType::True, false) => Operator::IsTrue,
                        (TokenType::True, true) => Operator::IsNotTrue,
                        (TokenType::False, false) => Operator::IsFalse,
                        (TokenType::False, true) => Operator::IsNotFalse,
                        _ => {
                            return Err(anyhow!(self.error(
                                &literal,
                                "Expected one of: `NULL` or `TRUE` or `FALSE`."
                            )));
                        }
                    };
                    self.advance();
                    self.enter()?;
                    links += 1;
                    output = SqlNode::Call(Call::new(operator, vec![output]));
                }
                TokenType::In => {
                    self.advance();
                    self.enter()?;
                    links += 1;
                    self.consume(TokenTypeVariant::LeftParen)?;
                    let right = if self.check_query_ahead() {
                        self.parse_query_expr()?
                    } else {
                        let mut values = vec![];
                        loop {
                            values.push(self.parse_expr()?);
                            if !self.match_token_type(TokenTypeVariant::Comma) {
                                break;
                            }
                        }
                        SqlNode::NodeList(values)
                    };
                    self.consume(TokenTypeVariant::RightParen)?;
                    let operator = if negated { Operator::NotIn } else { Operator::In };
                    output = SqlNode::Call(Call::new(operator, vec![output, right]));
                }
                TokenType::Between => {
                    self.advance();
                    self.enter()?;
                    links += 1;
                    let low = self.parse_bitwise_or_expr()?;
                    self.consume(TokenTypeVariant::And)?;
                    let high = self.parse_bitwise_or_expr()?;
                    let operator = if negated {
                        Operator::NotBetween
                    } else {
                        Operator::Between
                    };
                    output = SqlNode::Call(Call::new(operator, vec![output, low, high]));
                }
                _ => break,
            }
        }

        self.exit(links);
        Ok(output)
    }

    // bitwise_or_expr -> bitwise_and_expr ("|" bitwise_and_expr)*
    fn parse_bitwise_or_expr(&mut self) -> anyhow::Result<SqlNode> {
        self.parse_standard_binary_expr(
            &[(TokenTypeVariant::BitwiseOr, Operator::BitwiseOr)],
            Self::parse_bitwise_and_expr,
        )
    }

    // bitwise_and_expr -> bitwise_shift_expr ("&" bitwise_shift_expr)*
    fn parse_bitwise_and_expr(&mut self) -> anyhow::Result<SqlNode> {
        self.parse_standard_binary_expr(
            &[(TokenTypeVariant::BitwiseAnd, Operator::BitwiseAnd)],
            Self::parse_bitwise_shift_expr,
        )
    }

    // bitwise_shift_expr -> add_expr (("<<" | ">>") add_expr)*
    fn parse_bitwise_shift_expr(&mut self) -> anyhow::Result<SqlNode> {
        self.parse_standard_binary_expr(
            &[
                (TokenTypeVariant::BitwiseRightShift, Operator::ShiftRight),
                (TokenTypeVariant::BitwiseLeftShift, Operator::ShiftLeft),
            ],
            Self::parse_add_expr,
        )
    }

    // add_expr -> mul_concat_expr (("+" | "-") mul_concat_expr)*
    fn parse_add_expr(&mut self) -> anyhow::Result<SqlNode> {
        self.parse_standard_binary_expr(
            &[
                (TokenTypeVariant::Plus, Operator::Plus),
                (TokenTypeVariant::Minus, Operator::Minus),
            ],
            Self::parse_mul_concat_expr,
        )
    }

    // mul_concat_expr -> xor_bit_expr (("*" | "/" | "%" | "DIV" | "MOD" | "||") xor_bit_expr)*
    fn parse_mul_concat_expr(&mut self) -> anyhow::Result<SqlNode> {
        self.parse_standard_binary_expr(
            &[
                (TokenTypeVariant::Star, Operator::Multiply),
                (TokenTypeVariant::Slash, Operator::Divide),
                (TokenTypeVariant::Percent, Operator::Modulo),
                (TokenTypeVariant::Div, Operator::IntDivide),
                (TokenTypeVariant::Mod, Operator::Modulo),
                (TokenTypeVariant::ConcatOperator, Operator::Concat),
            ],
            Self::parse_xor_bit_expr,
        )
    }

    // xor_bit_expr -> unary_expr ("^" unary_expr)*
    fn parse_xor_bit_expr(&mut self) -> anyhow::Result<SqlNode> {
        self.parse_standard_binary_expr(
            &[(TokenTypeVariant::BitwiseXor, Operator::BitwiseXor)],
            Self::parse_unary_expr,
        )
    }

    // unary_expr -> ("+" | "-" | "~" | "!") unary_expr | primary_expr
    fn parse_unary_expr(&mut self) -> anyhow::Result<SqlNode> {
        let operator = match self.peek().kind.clone() {
            TokenType::Plus => Operator::UnaryPlus,
            TokenType::Minus => Operator::UnaryMinus,
            TokenType::BitwiseNot => Operator::BitwiseNot,
            TokenType::Bang => Operator::Not,
            _ => return self.parse_primary_expr(),
        };
        self.advance();
        self.enter()?;
        let right = self.parse_unary_expr()?;
        self.exit(1);
        Ok(SqlNode::Call(Call::new(operator, vec![right])))
    }

    // function -> name "(" [["DISTINCT"] ("*" | expr ("," expr)*)] ")" ["OVER" window]
    fn parse_function_expr(&mut self, name: String) -> anyhow::Result<SqlNode> {
        self.consume(TokenTypeVariant::LeftParen)?;

        let distinct = self.match_token_type(TokenTypeVariant::Distinct);
        let mut arguments = vec![];
        if !self.match_token_type(TokenTypeVariant::RightParen) {
            loop {
                if self.match_token_type(TokenTypeVariant::Star) {
                    arguments.push(SqlNode::Identifier(Identifier::simple("*")));
                } else {
                    arguments.push(self.parse_expr()?);
                }
                if self.match_token_type(TokenTypeVariant::Order) {
                    // GROUP_CONCAT(x ORDER BY y [SEPARATOR s])
                    self.consume(TokenTypeVariant::By)?;
                    self.parse_order_by_expr()?;
                }
                if self.match_non_reserved_keyword("separator") {
                    self.consume(TokenTypeVariant::String)?;
                }
                if !self.match_token_type(TokenTypeVariant::Comma) {
                    self.consume(TokenTypeVariant::RightParen)?;
                    break;
                }
            }
        }

        if self.match_non_reserved_keyword("over") {
            self.skip_window_spec()?;
        }

        Ok(SqlNode::Call(Call::new(
            Operator::Function { name, distinct },
            arguments,
        )))
    }

    /// Window specifications do not contribute to lineage, the tokens are
    /// consumed and dropped.
    fn skip_window_spec(&mut self) -> anyhow::Result<()> {
        if self.check_identifier() {
            self.advance();
            return Ok(());
        }
        self.consume(TokenTypeVariant::LeftParen)?;
        let mut open = 1;
        while open > 0 {
            match self.peek().kind.clone() {
                TokenType::LeftParen => open += 1,
                TokenType::RightParen => open -= 1,
                TokenType::Eof => {
                    return Err(anyhow!(self.error(self.peek(), "Expected `)`.")));
                }
                _ => {}
            }
            self.advance();
        }
        Ok(())
    }

    // case_expr -> "CASE" [expr] ("WHEN" expr "THEN" expr)+ ["ELSE" expr] "END"
    fn parse_case_expr(&mut self) -> anyhow::Result<SqlNode> {
        self.consume(TokenTypeVariant::Case)?;

        let mut operands = vec![];
        let simple = !self.check_token_type(TokenTypeVariant::When);
        if simple {
            operands.push(self.parse_expr()?);
        }

        loop {
            self.consume(TokenTypeVariant::When)?;
            operands.push(self.parse_expr()?);
            self.consume(TokenTypeVariant::Then)?;
            operands.push(self.parse_expr()?);
            if !self.check_token_type(TokenTypeVariant::When) {
                break;
            }
        }

        let has_else = self.match_token_type(TokenTypeVariant::Else);
        if has_else {
            operands.push(self.parse_expr()?);
        }

        self.consume(TokenTypeVariant::End)?;

        Ok(SqlNode::Call(Call::new(
            Operator::Case { simple, has_else },
            operands,
        )))
    }

    // cast -> "CAST" "(" expr "AS" type_name ["(" number ("," number)* ")"] ")"
    fn parse_cast_expr(&mut self) -> anyhow::Result<SqlNode> {
        self.consume(TokenTypeVariant::Cast)?;
        self.consume(TokenTypeVariant::LeftParen)?;
        let expr = self.parse_expr()?;
        self.consume(TokenTypeVariant::As)?;

        let mut type_parts = vec![self.consume_identifier()?.to_uppercase()];
        while self.check_token_type(TokenTypeVariant::Identifier) {
            type_parts.push(self.consume_identifier()?.to_uppercase());
        }
        let mut target = type_parts.join(" ");
        if self.match_token_type(TokenTypeVariant::LeftParen) {
            let mut sizes = vec![];
            loop {
                let size = self.consume(TokenTypeVariant::Number)?;
                sizes.push(size.lexeme.clone());
                if !self.match_token_type(TokenTypeVariant::Comma) {
                    break;
                }
            }
            self.consume(TokenTypeVariant::RightParen)?;
            target = format!("{}({})", target, sizes.join(", "));
        }
        self.consume(TokenTypeVariant::RightParen)?;

        Ok(SqlNode::Call(Call::new(Operator::Cast { target }, vec![expr])))
    }

    // interval -> "INTERVAL" expr unit
    fn parse_interval_expr(&mut self) -> anyhow::Result<SqlNode> {
        self.consume(TokenTypeVariant::Interval)?;
        let value = self.parse_add_expr()?;
        let unit = self.consume_identifier()?.to_uppercase();
        Ok(SqlNode::Call(Call::new(
            Operator::Interval { unit },
            vec![value],
        )))
    }

    // primary_expr ->
    // "True" | "False" | "Null" | "String" | "Number"
    // | path ["." "*"]
    // | case_expr | cast | interval
    // | "EXISTS" "(" query_expr ")"
    // | function
    // | "(" expr ")" | "(" expr ("," expr)+ ")" | "(" query_expr ")"
    fn parse_primary_expr(&mut self) -> anyhow::Result<SqlNode> {
        let peek_token = self.peek().clone();
        let primary_expr = match peek_token.kind {
            TokenType::True => {
                self.advance();
                SqlNode::Literal(Literal::Bool(true))
            }
            TokenType::False => {
                self.advance();
                SqlNode::Literal(Literal::Bool(false))
            }
            TokenType::Null => {
                self.advance();
                SqlNode::Literal(Literal::Null)
            }
            TokenType::Number(num) => {
                self.advance();
                SqlNode::Literal(Literal::Number(num))
            }
            TokenType::String(str) => {
                self.advance();
                SqlNode::Literal(Literal::String(str))
            }
            TokenType::Case => self.parse_case_expr()?,
            TokenType::Cast => self.parse_cast_expr()?,
            TokenType::Interval => self.parse_interval_expr()?,
            TokenType::Exists => {
                self.advance();
                self.consume(TokenTypeVariant::LeftParen)?;
                let query = self.parse_query_expr()?;
                self.consume(TokenTypeVariant::RightParen)?;
                SqlNode::Call(Call::new(Operator::Exists, vec![query]))
            }
            // Functions whose name is a reserved keyword
            TokenType::Left | TokenType::Right | TokenType::Mod
                if self.peek_next_i(1).kind == TokenType::LeftParen =>
            {
                self.advance();
                self.parse_function_expr(peek_token.lexeme.to_uppercase())?
            }
            TokenType::Identifier(ident) | TokenType::QuotedIdentifier(ident) => {
                if self.peek_next_i(1).kind == TokenType::LeftParen {
                    self.advance();
                    return self.parse_function_expr(ident);
                }
                self.advance();
                let mut parts = vec![ident];
                while self.match_token_type(TokenTypeVariant::Dot) {
                    if self.match_token_type(TokenTypeVariant::Star) {
                        parts.push("*".to_owned());
                        break;
                    }
                    parts.push(self.consume_identifier()?);
                }
                SqlNode::Identifier(Identifier::new(parts))
            }
            TokenType::LeftParen => {
                // Look ahead to check whether we need to parse a query_expr or an expr
                if self.check_query_ahead() {
                    self.advance();
                    let query = self.parse_query_expr()?;
                    self.consume(TokenTypeVariant::RightParen)?;
                    return Ok(query);
                }
                self.advance();
                let expr = self.parse_expr()?;
                if self.match_token_type(TokenTypeVariant::Comma) {
                    let mut values = vec![expr];
                    loop {
                        values.push(self.parse_expr()?);
                        if !self.match_token_type(TokenTypeVariant::Comma) {
                            break;
                        }
                    }
                    self.consume(TokenTypeVariant::RightParen)?;
                    return Ok(SqlNode::Call(Call::new(
                        Operator::Function {
                            name: "ROW".to_owned(),
                            distinct: false,
                        },
                        values,
                    )));
                }
                self.consume(TokenTypeVariant::RightParen)?;
                expr
            }
            _ => {
                return Err(anyhow!(self.error(&peek_token, "Expected Expression.")));
            }
        };

        Ok(primary_expr)
    }
}

pub fn parse_sql(sql: &str) -> anyhow::Result<SqlNode> {
    log::debug!(
        "Parsing {}",
        &sql.chars().take(50).collect::<String>()
    );

    let mut scanner = Scanner::new(sql);

    scanner.scan()?;

    log::debug!("Tokens:");
    scanner
        .tokens()
        .iter()
        .for_each(|tok| log::debug!("{:?}", tok));

    let mut parser = Parser::new(scanner.tokens());
    let ast = parser.parse()?;
    log::debug!("AST: {:?}", ast);
    Ok(ast)
}
