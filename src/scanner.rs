use anyhow::anyhow;

use crate::ast::{Token, TokenType};

/// MySQL flavoured lexer.
///
/// Backticks quote identifiers, both `'` and `"` delimit strings, and
/// `--`, `#` and `/* */` start comments.
pub struct Scanner {
    source_chars: Vec<char>,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    line: u32,
    col: u32,
}

impl Scanner {
    pub fn new(source: &str) -> Self {
        Self {
            source_chars: source.chars().collect(),
            tokens: vec![],
            start: 0,
            current: 0,
            line: 1,
            col: 0,
        }
    }

    pub fn tokens(&self) -> &Vec<Token> {
        &self.tokens
    }

    fn advance(&mut self) -> char {
        let c = self.source_chars[self.current];
        self.current += 1;
        self.col += 1;
        c
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source_chars.len()
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.source_chars[self.current]
        }
    }

    fn peek_next_i(&self, i: usize) -> char {
        if self.current + i >= self.source_chars.len() {
            '\0'
        } else {
            self.source_chars[self.current + i]
        }
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() != expected {
            return false;
        };

        self.current += 1;
        self.col += 1;
        true
    }

    fn add_token(&mut self, token_type: TokenType) {
        self.tokens.push(Token {
            kind: token_type,
            lexeme: self.current_source_str(),
            line: self.line,
            col: self.col,
        });
    }

    fn current_source_str(&self) -> String {
        self.source_chars[self.start..self.current].iter().collect()
    }

    fn reset(&mut self) {
        self.tokens.clear();
        self.start = 0;
        self.current = 0;
        self.col = 1;
        self.line = 1;
    }

    fn new_line(&mut self) {
        self.line += 1;
        self.col = 1;
    }

    pub fn scan(&mut self) -> anyhow::Result<()> {
        self.reset();
        while self.current < self.source_chars.len() {
            self.start = self.current;
            self.scan_token()?;
        }
        self.tokens.push(Token {
            kind: TokenType::Eof,
            lexeme: String::from("eof"),
            line: self.line,
            col: self.col,
        });

        Ok(())
    }

    /// Scans a quoted string, resolving backslash escapes and doubled delimiters.
    fn scan_string(&mut self, delimiter: char) -> anyhow::Result<String> {
        let mut value = String::new();
        loop {
            if self.is_at_end() {
                return Err(anyhow!(self.error_str("Found unterminated string")));
            }
            let c = self.advance();
            if c == '\n' {
                self.new_line();
            }
            if c == '\\' {
                if self.is_at_end() {
                    return Err(anyhow!(self.error_str("Found unterminated string")));
                }
                let escaped = self.advance();
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => other,
                });
                continue;
            }
            if c == delimiter {
                if self.match_char(delimiter) {
                    value.push(delimiter);
                    continue;
                }
                break;
            }
            value.push(c);
        }
        Ok(value)
    }

    fn match_number(&mut self) -> anyhow::Result<()> {
        let mut found_dot = self.source_chars[self.start] == '.';
        let mut found_e = false;
        loop {
            let peek_char = self.peek();

            if peek_char == '.' {
                if found_dot || found_e {
                    return Err(anyhow!(self.error_str("Found invalid number")));
                }
                found_dot = true;
                self.advance();
            } else if peek_char == 'e' || peek_char == 'E' {
                if found_e {
                    return Err(anyhow!(self.error_str("Found invalid number")));
                }
                found_e = true;
                let peek_next_char = self.peek_next_i(1);
                if peek_next_char == '+' || peek_next_char == '-' {
                    self.advance();
                    if !(self.peek_next_i(1).is_ascii_digit()) {
                        return Err(anyhow!(self.error_str("Found invalid number")));
                    }
                    self.advance();
                } else if peek_next_char.is_ascii_digit() {
                    self.advance();
                } else {
                    return Err(anyhow!(self.error_str("Found invalid number")));
                }
            } else if peek_char.is_ascii_digit() {
                self.advance();
            } else {
                if peek_char.is_alphabetic() || peek_char == '_' {
                    return Err(anyhow!(self.error_str("Found invalid number")));
                }
                self.add_token(TokenType::Number(self.current_source_str()));
                break;
            }
        }

        Ok(())
    }

    fn match_keyword_or_identifier(&mut self) {
        loop {
            let peek_char = self.peek();
            if !(peek_char.is_alphanumeric() || peek_char == '_' || peek_char == '$') {
                break;
            }
            self.advance();
        }
        let identifier: String = self.current_source_str();

        match identifier.to_lowercase().as_str() {
            "all" => self.add_token(TokenType::All),
            "and" => self.add_token(TokenType::And),
            "as" => self.add_token(TokenType::As),
            "asc" => self.add_token(TokenType::Asc),
            "between" => self.add_token(TokenType::Between),
            "by" => self.add_token(TokenType::By),
            "case" => self.add_token(TokenType::Case),
            "cast" => self.add_token(TokenType::Cast),
            "cross" => self.add_token(TokenType::Cross),
            "desc" => self.add_token(TokenType::Desc),
            "distinct" => self.add_token(TokenType::Distinct),
            "div" => self.add_token(TokenType::Div),
            "else" => self.add_token(TokenType::Else),
            "end" => self.add_token(TokenType::End),
            "except" => self.add_token(TokenType::Except),
            "exists" => self.add_token(TokenType::Exists),
            "false" => self.add_token(TokenType::False),
            "from" => self.add_token(TokenType::From),
            "full" => self.add_token(TokenType::Full),
            "group" => self.add_token(TokenType::Group),
            "having" => self.add_token(TokenType::Having),
            "in" => self.add_token(TokenType::In),
            "inner" => self.add_token(TokenType::Inner),
            "intersect" => self.add_token(TokenType::Intersect),
            "interval" => self.add_token(TokenType::Interval),
            "is" => self.add_token(TokenType::Is),
            "join" => self.add_token(TokenType::Join),
            "left" => self.add_token(TokenType::Left),
            "like" => self.add_token(TokenType::Like),
            "limit" => self.add_token(TokenType::Limit),
            "mod" => self.add_token(TokenType::Mod),
            "natural" => self.add_token(TokenType::Natural),
            "not" => self.add_token(TokenType::Not),
            "null" => self.add_token(TokenType::Null),
            "offset" => self.add_token(TokenType::Offset),
            "on" => self.add_token(TokenType::On),
            "or" => self.add_token(TokenType::Or),
            "order" => self.add_token(TokenType::Order),
            "outer" => self.add_token(TokenType::Outer),
            "regexp" | "rlike" => self.add_token(TokenType::Regexp),
            "right" => self.add_token(TokenType::Right),
            "select" => self.add_token(TokenType::Select),
            "then" => self.add_token(TokenType::Then),
            "true" => self.add_token(TokenType::True),
            "union" => self.add_token(TokenType::Union),
            "using" => self.add_token(TokenType::Using),
            "when" => self.add_token(TokenType::When),
            "where" => self.add_token(TokenType::Where),
            "with" => self.add_token(TokenType::With),
            "xor" => self.add_token(TokenType::Xor),
            _ => self.add_token(TokenType::Identifier(identifier)),
        }
    }

    fn skip_line_comment(&mut self) {
        loop {
            let peek_char = self.peek();
            if peek_char == '\n' || peek_char == '\0' {
                break;
            }
            self.advance();
        }
    }

    fn scan_token(&mut self) -> anyhow::Result<()> {
        let curr_char = self.advance();
        match curr_char {
            '(' => self.add_token(TokenType::LeftParen),
            ')' => self.add_token(TokenType::RightParen),
            '*' => self.add_token(TokenType::Star),
            ',' => self.add_token(TokenType::Comma),
            ';' => self.add_token(TokenType::Semicolon),
            '%' => self.add_token(TokenType::Percent),
            '.' => {
                if self.peek().is_ascii_digit() {
                    self.match_number()?;
                } else {
                    self.add_token(TokenType::Dot);
                }
            }
            '+' => self.add_token(TokenType::Plus),
            '=' => self.add_token(TokenType::Equal),
            '/' => {
                if self.match_char('*') {
                    loop {
                        if self.is_at_end() {
                            return Err(anyhow!(self.error_str("Found unterminated comment")));
                        }
                        if self.peek() == '*' && self.peek_next_i(1) == '/' {
                            self.advance();
                            self.advance();
                            break;
                        }
                        if self.advance() == '\n' {
                            self.new_line();
                        }
                    }
                } else {
                    self.add_token(TokenType::Slash)
                }
            }
            '#' => self.skip_line_comment(),
            '-' => {
                if self.match_char('-') {
                    self.skip_line_comment();
                } else {
                    self.add_token(TokenType::Minus)
                }
            }
            '<' => {
                if self.match_char('>') {
                    self.add_token(TokenType::NotEqual);
                } else if self.match_char('=') {
                    self.add_token(TokenType::LessEqual);
                } else if self.match_char('<') {
                    self.add_token(TokenType::BitwiseLeftShift);
                } else {
                    self.add_token(TokenType::Less);
                }
            }
            '!' => {
                if self.match_char('=') {
                    self.add_token(TokenType::BangEqual);
                } else {
                    self.add_token(TokenType::Bang);
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.add_token(TokenType::GreaterEqual);
                } else if self.match_char('>') {
                    self.add_token(TokenType::BitwiseRightShift);
                } else {
                    self.add_token(TokenType::Greater);
                }
            }
            '~' => self.add_token(TokenType::BitwiseNot),
            '&' => {
                if self.match_char('&') {
                    self.add_token(TokenType::And);
                } else {
                    self.add_token(TokenType::BitwiseAnd);
                }
            }
            '|' => {
                if self.match_char('|') {
                    self.add_token(TokenType::ConcatOperator);
                } else {
                    self.add_token(TokenType::BitwiseOr);
                }
            }
            '^' => self.add_token(TokenType::BitwiseXor),
            '\n' => self.new_line(),
            '\r' | ' ' | '\t' => {}

            // strings
            c if c == '\'' || c == '"' => {
                let value = self.scan_string(c)?;
                self.add_token(TokenType::String(value));
            }

            // numeric
            c if c.is_ascii_digit() => {
                self.match_number()?;
            }

            // Keywords and identifiers
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                self.match_keyword_or_identifier();
            }

            '`' => {
                let mut ident = String::new();
                loop {
                    if self.is_at_end() {
                        return Err(anyhow!(
                            self.error_str("Found unterminated quoted identifier")
                        ));
                    }
                    let curr_char = self.advance();
                    if curr_char == '`' {
                        if self.match_char('`') {
                            ident.push('`');
                            continue;
                        }
                        break;
                    }
                    ident.push(curr_char);
                }
                if ident.is_empty() {
                    return Err(anyhow!(self.error_str("Found empty quoted identifier.")));
                }
                self.add_token(TokenType::QuotedIdentifier(ident));
            }

            _ => {
                return Err(anyhow!(self.error_str(&format!(
                    "Found unexpected character while scanning: {}",
                    curr_char
                ))));
            }
        }
        Ok(())
    }

    fn error_str(&self, error: &str) -> String {
        format!(
            "[line: {}, col: {}] Scanner error: {}",
            self.line, self.col, error
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<TokenType> {
        let mut scanner = Scanner::new(sql);
        scanner.scan().unwrap();
        scanner.tokens().iter().map(|tok| tok.kind.clone()).collect()
    }

    #[test]
    fn scans_mysql_quoting_and_comments() {
        assert_eq!(
            kinds("select `my``col`, 'it''s', \"a\\nb\" -- trailing\n# hash\n/* block */ from t"),
            vec![
                TokenType::Select,
                TokenType::QuotedIdentifier("my`col".to_owned()),
                TokenType::Comma,
                TokenType::String("it's".to_owned()),
                TokenType::Comma,
                TokenType::String("a\nb".to_owned()),
                TokenType::From,
                TokenType::Identifier("t".to_owned()),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn scans_operators_and_numbers() {
        assert_eq!(
            kinds("a<>b != c || d && e rlike 1.5e-3"),
            vec![
                TokenType::Identifier("a".to_owned()),
                TokenType::NotEqual,
                TokenType::Identifier("b".to_owned()),
                TokenType::BangEqual,
                TokenType::Identifier("c".to_owned()),
                TokenType::ConcatOperator,
                TokenType::Identifier("d".to_owned()),
                TokenType::And,
                TokenType::Identifier("e".to_owned()),
                TokenType::Regexp,
                TokenType::Number("1.5e-3".to_owned()),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn reports_scanner_errors() {
        let mut scanner = Scanner::new("select 'open");
        let err = scanner.scan().unwrap_err().to_string();
        assert!(err.contains("Scanner error: Found unterminated string"), "{}", err);

        let mut scanner = Scanner::new("select ?");
        assert!(scanner.scan().is_err());
    }
}
