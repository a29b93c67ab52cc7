use serde::{Deserialize, Serialize};
use strum_macros::EnumDiscriminants;

/// A node of the SQL syntax tree handed to the analyzer.
///
/// The taxonomy is deliberately small: every operator, function, alias, join
/// and set operation is a [`Call`], so that any front-end able to produce
/// these five shapes can feed the analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlNode {
    Identifier(Identifier),
    Literal(Literal),
    Call(Call),
    Select(Box<SelectNode>),
    NodeList(Vec<SqlNode>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    pub parts: Vec<String>,
}

impl Identifier {
    pub fn new(parts: Vec<String>) -> Self {
        Self { parts }
    }

    pub fn simple(name: &str) -> Self {
        Self {
            parts: vec![name.to_owned()],
        }
    }

    /// Dotted name, e.g. `schema.table` or `t.col`.
    pub fn name(&self) -> String {
        self.parts.join(".")
    }

    /// Last part of the name (the column of `t.col`).
    pub fn last(&self) -> &str {
        self.parts.last().map_or("", |s| s.as_str())
    }

    /// Everything but the last part (the `t` of `t.col`).
    pub fn qualifier(&self) -> Option<String> {
        if self.parts.len() > 1 {
            Some(self.parts[..self.parts.len() - 1].join("."))
        } else {
            None
        }
    }

    pub fn is_star(&self) -> bool {
        self.last() == "*"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Number(String),
    String(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub operator: Operator,
    pub operands: Vec<SqlNode>,
}

impl Call {
    pub fn new(operator: Operator, operands: Vec<SqlNode>) -> Self {
        Self { operator, operands }
    }

    pub fn operand(&self, i: usize) -> Option<&SqlNode> {
        self.operands.get(i)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
    /// `FROM a, b`
    Comma,
}

impl JoinKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
            JoinKind::Full => "FULL",
            JoinKind::Cross | JoinKind::Comma => "CROSS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetOperator {
    Union,
    UnionAll,
    Intersect,
    Except,
}

impl SetOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetOperator::Union => "UNION",
            SetOperator::UnionAll => "UNION ALL",
            SetOperator::Intersect => "INTERSECT",
            SetOperator::Except => "EXCEPT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// `NAME([DISTINCT] args)`
    Function { name: String, distinct: bool },
    /// `expr AS alias`; operands are `[expr, alias]`.
    As,
    /// Operands: `[value]` when `simple`, then `when, then` pairs, then `else` when `has_else`.
    Case { simple: bool, has_else: bool },
    /// `CAST(expr AS target)`
    Cast { target: String },
    /// `INTERVAL expr unit`
    Interval { unit: String },
    And,
    Or,
    Xor,
    Not,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Like,
    NotLike,
    Regexp,
    NotRegexp,
    In,
    NotIn,
    /// Operands: `[expr, low, high]`
    Between,
    NotBetween,
    IsNull,
    IsNotNull,
    IsTrue,
    IsNotTrue,
    IsFalse,
    IsNotFalse,
    Exists,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    IntDivide,
    Concat,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    ShiftLeft,
    ShiftRight,
    UnaryMinus,
    UnaryPlus,
    BitwiseNot,
    /// Operands: `[left, right]` or `[left, right, On | Using]`.
    Join(JoinKind),
    On,
    Using,
    Set(SetOperator),
    /// Ordering applied to a whole query: `[query, NodeList(items)]` and an optional limit.
    OrderBy,
    Descending,
    /// `WITH [RECURSIVE] name AS (query), ... query`; operands are
    /// `[NodeList(name AS query, ...), query]`.
    With { recursive: bool },
    /// A sub-query nested too deep to be parsed, kept as an opaque leaf.
    ElidedQuery,
}

impl Operator {
    /// Name of the operator as an upper case keyword, used for logging and
    /// for the classification of calls.
    pub fn name(&self) -> String {
        match self {
            Operator::Function { name, .. } => name.to_uppercase(),
            Operator::As => "AS".to_owned(),
            Operator::Case { .. } => "CASE".to_owned(),
            Operator::Cast { .. } => "CAST".to_owned(),
            Operator::Interval { .. } => "INTERVAL".to_owned(),
            Operator::And => "AND".to_owned(),
            Operator::Or => "OR".to_owned(),
            Operator::Xor => "XOR".to_owned(),
            Operator::Not => "NOT".to_owned(),
            Operator::Join(kind) => kind.as_str().to_owned(),
            Operator::On => "ON".to_owned(),
            Operator::Using => "USING".to_owned(),
            Operator::Set(op) => op.as_str().to_owned(),
            Operator::OrderBy => "ORDER BY".to_owned(),
            Operator::Descending => "DESC".to_owned(),
            Operator::Exists => "EXISTS".to_owned(),
            Operator::With { .. } => "WITH".to_owned(),
            Operator::ElidedQuery => "SELECT".to_owned(),
            other => other
                .binary_symbol()
                .or_else(|| other.postfix_symbol())
                .unwrap_or("?")
                .to_owned(),
        }
    }

    /// Symbol of infix operators, `None` for everything else.
    pub fn binary_symbol(&self) -> Option<&'static str> {
        let symbol = match self {
            Operator::Equal => "=",
            Operator::NotEqual => "<>",
            Operator::Less => "<",
            Operator::LessEqual => "<=",
            Operator::Greater => ">",
            Operator::GreaterEqual => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::Regexp => "REGEXP",
            Operator::NotRegexp => "NOT REGEXP",
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::Modulo => "%",
            Operator::IntDivide => "DIV",
            Operator::Concat => "||",
            Operator::BitwiseAnd => "&",
            Operator::BitwiseOr => "|",
            Operator::BitwiseXor => "^",
            Operator::ShiftLeft => "<<",
            Operator::ShiftRight => ">>",
            _ => return None,
        };
        Some(symbol)
    }

    pub fn postfix_symbol(&self) -> Option<&'static str> {
        let symbol = match self {
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
            Operator::IsTrue => "IS TRUE",
            Operator::IsNotTrue => "IS NOT TRUE",
            Operator::IsFalse => "IS FALSE",
            Operator::IsNotFalse => "IS NOT FALSE",
            _ => return None,
        };
        Some(symbol)
    }

    /// Binding strength used when rendering, higher binds tighter.
    pub fn precedence(&self) -> u8 {
        match self {
            Operator::Or => 1,
            Operator::Xor => 2,
            Operator::And => 3,
            Operator::Not => 4,
            Operator::Equal
            | Operator::NotEqual
            | Operator::Less
            | Operator::LessEqual
            | Operator::Greater
            | Operator::GreaterEqual
            | Operator::Like
            | Operator::NotLike
            | Operator::Regexp
            | Operator::NotRegexp
            | Operator::In
            | Operator::NotIn
            | Operator::Between
            | Operator::NotBetween
            | Operator::IsNull
            | Operator::IsNotNull
            | Operator::IsTrue
            | Operator::IsNotTrue
            | Operator::IsFalse
            | Operator::IsNotFalse => 5,
            Operator::BitwiseOr => 6,
            Operator::BitwiseAnd => 7,
            Operator::ShiftLeft | Operator::ShiftRight => 8,
            Operator::Plus | Operator::Minus => 9,
            Operator::Multiply
            | Operator::Divide
            | Operator::Modulo
            | Operator::IntDivide
            | Operator::Concat => 10,
            Operator::BitwiseXor => 11,
            Operator::UnaryMinus | Operator::UnaryPlus | Operator::BitwiseNot => 12,
            _ => 13,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectNode {
    pub distinct: bool,
    pub select_list: Vec<SqlNode>,
    pub from: Option<SqlNode>,
    pub r#where: Option<SqlNode>,
    pub group_by: Vec<SqlNode>,
    pub having: Option<SqlNode>,
    pub order_by: Vec<SqlNode>,
    pub limit: Option<SqlNode>,
    pub offset: Option<SqlNode>,
}

#[derive(PartialEq, Clone, Debug, EnumDiscriminants, Serialize, Deserialize)]
#[strum_discriminants(name(TokenTypeVariant))]
pub enum TokenType {
    LeftParen,
    RightParen,
    Comma,
    Dot,
    Minus,
    Plus,
    BitwiseNot,
    BitwiseOr,
    BitwiseAnd,
    BitwiseXor,
    BitwiseRightShift,
    BitwiseLeftShift,
    Semicolon,
    Slash,
    Percent,
    Star,
    ConcatOperator,
    Bang,
    BangEqual,
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    QuotedIdentifier(String),
    Identifier(String),
    String(String),
    Number(String),
    Eof,

    // Reserved Keywords
    All,
    And,
    As,
    Asc,
    Between,
    By,
    Case,
    Cast,
    Cross,
    Desc,
    Distinct,
    Div,
    Else,
    End,
    Except,
    Exists,
    False,
    From,
    Full,
    Group,
    Having,
    In,
    Inner,
    Intersect,
    Interval,
    Is,
    Join,
    Left,
    Like,
    Limit,
    Mod,
    Natural,
    Not,
    Null,
    Offset,
    On,
    Or,
    Order,
    Outer,
    Regexp,
    Right,
    Select,
    Then,
    True,
    Union,
    Using,
    When,
    Where,
    With,
    Xor,
}

impl TokenTypeVariant {
    pub(crate) fn variant_str(&self) -> &str {
        match self {
            TokenTypeVariant::LeftParen => "(",
            TokenTypeVariant::RightParen => ")",
            TokenTypeVariant::Comma => ",",
            TokenTypeVariant::Dot => ".",
            TokenTypeVariant::Minus => "-",
            TokenTypeVariant::Plus => "+",
            TokenTypeVariant::BitwiseNot => "~",
            TokenTypeVariant::BitwiseOr => "|",
            TokenTypeVariant::BitwiseAnd => "&",
            TokenTypeVariant::BitwiseXor => "^",
            TokenTypeVariant::BitwiseRightShift => ">>",
            TokenTypeVariant::BitwiseLeftShift => "<<",
            TokenTypeVariant::Semicolon => ";",
            TokenTypeVariant::Slash => "/",
            TokenTypeVariant::Percent => "%",
            TokenTypeVariant::Star => "*",
            TokenTypeVariant::ConcatOperator => "||",
            TokenTypeVariant::Bang => "!",
            TokenTypeVariant::BangEqual => "!=",
            TokenTypeVariant::Equal => "=",
            TokenTypeVariant::NotEqual => "<>",
            TokenTypeVariant::Greater => ">",
            TokenTypeVariant::GreaterEqual => ">=",
            TokenTypeVariant::Less => "<",
            TokenTypeVariant::LessEqual => "<=",
            TokenTypeVariant::QuotedIdentifier => "QuotedIdentifier",
            TokenTypeVariant::Identifier => "Identifier",
            TokenTypeVariant::String => "String",
            TokenTypeVariant::Number => "Number",
            TokenTypeVariant::Eof => "EOF",
            TokenTypeVariant::All => "ALL",
            TokenTypeVariant::And => "AND",
            TokenTypeVariant::As => "AS",
            TokenTypeVariant::Asc => "ASC",
            TokenTypeVariant::Between => "BETWEEN",
            TokenTypeVariant::By => "BY",
            TokenTypeVariant::Case => "CASE",
            TokenTypeVariant::Cast => "CAST",
            TokenTypeVariant::Cross => "CROSS",
            TokenTypeVariant::Desc => "DESC",
            TokenTypeVariant::Distinct => "DISTINCT",
            TokenTypeVariant::Div => "DIV",
            TokenTypeVariant::Else => "ELSE",
            TokenTypeVariant::End => "END",
            TokenTypeVariant::Except => "EXCEPT",
            TokenTypeVariant::Exists => "EXISTS",
            TokenTypeVariant::False => "FALSE",
            TokenTypeVariant::From => "FROM",
            TokenTypeVariant::Full => "FULL",
            TokenTypeVariant::Group => "GROUP",
            TokenTypeVariant::Having => "HAVING",
            TokenTypeVariant::In => "IN",
            TokenTypeVariant::Inner => "INNER",
            TokenTypeVariant::Intersect => "INTERSECT",
            TokenTypeVariant::Interval => "INTERVAL",
            TokenTypeVariant::Is => "IS",
            TokenTypeVariant::Join => "JOIN",
            TokenTypeVariant::Left => "LEFT",
            TokenTypeVariant::Like => "LIKE",
            TokenTypeVariant::Limit => "LIMIT",
            TokenTypeVariant::Mod => "MOD",
            TokenTypeVariant::Natural => "NATURAL",
            TokenTypeVariant::Not => "NOT",
            TokenTypeVariant::Null => "NULL",
            TokenTypeVariant::Offset => "OFFSET",
            TokenTypeVariant::On => "ON",
            TokenTypeVariant::Or => "OR",
            TokenTypeVariant::Order => "ORDER",
            TokenTypeVariant::Outer => "OUTER",
            TokenTypeVariant::Regexp => "REGEXP",
            TokenTypeVariant::Right => "RIGHT",
            TokenTypeVariant::Select => "SELECT",
            TokenTypeVariant::Then => "THEN",
            TokenTypeVariant::True => "TRUE",
            TokenTypeVariant::Union => "UNION",
            TokenTypeVariant::Using => "USING",
            TokenTypeVariant::When => "WHEN",
            TokenTypeVariant::Where => "WHERE",
            TokenTypeVariant::With => "WITH",
            TokenTypeVariant::Xor => "XOR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenType,
    pub lexeme: String,
    pub line: u32,
    pub col: u32,
}
