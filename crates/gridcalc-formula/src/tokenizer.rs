//! Formula tokenizer
//!
//! Turns formula text into a flat token stream. Every token records the
//! byte offset it starts at so that parse errors can point into the
//! original text.

use crate::error::{FormulaError, FormulaResult};
use gridcalc_core::CellAddress;
use lazy_regex::regex_is_match;
use std::fmt;

/// Kind of a [`Token`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Number,
    String,
    Boolean,
    CellRef,
    Operator,
    FunctionName,
    Comma,
    OpenParen,
    CloseParen,
    Colon,
    EndOfInput,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Number => "number",
            TokenKind::String => "string",
            TokenKind::Boolean => "boolean",
            TokenKind::CellRef => "cell reference",
            TokenKind::Operator => "operator",
            TokenKind::FunctionName => "function name",
            TokenKind::Comma => "','",
            TokenKind::OpenParen => "'('",
            TokenKind::CloseParen => "')'",
            TokenKind::Colon => "':'",
            TokenKind::EndOfInput => "end of input",
        };
        f.write_str(name)
    }
}

/// A single token
///
/// `text` is normalized per kind: string literals hold their unescaped
/// contents, cell references their canonical address (`$` removed,
/// upper-cased) and booleans `TRUE`/`FALSE`. Everything else keeps the
/// source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub position: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, position: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            position,
        }
    }

    /// Check for an operator token with the given text
    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.text == op
    }
}

/// Tokenize formula text
///
/// Leading whitespace and a single leading `=` are skipped. The returned
/// stream always ends with a [`TokenKind::EndOfInput`] token.
///
/// # Example
/// ```rust
/// use gridcalc_formula::tokenizer::{tokenize, TokenKind};
///
/// let tokens = tokenize("=SUM($a$1:B2)").unwrap();
/// let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
/// assert_eq!(kinds, vec![
///     TokenKind::FunctionName,
///     TokenKind::OpenParen,
///     TokenKind::CellRef,
///     TokenKind::Colon,
///     TokenKind::CellRef,
///     TokenKind::CloseParen,
///     TokenKind::EndOfInput,
/// ]);
/// assert_eq!(tokens[2].text, "A1");
/// ```
pub fn tokenize(input: &str) -> FormulaResult<Vec<Token>> {
    let mut tokenizer = Tokenizer::new(input);
    tokenizer.skip_whitespace();
    if tokenizer.peek_char() == Some('=') {
        tokenizer.advance();
    }

    let mut tokens = Vec::new();
    loop {
        let token = tokenizer.scan_token()?;
        let done = token.kind == TokenKind::EndOfInput;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn scan_token(&mut self) -> FormulaResult<Token> {
        self.skip_whitespace();
        let start = self.pos;

        let c = match self.peek_char() {
            Some(c) => c,
            None => return Ok(Token::new(TokenKind::EndOfInput, "", start)),
        };

        let single = match c {
            '+' | '-' | '*' | '/' | '^' | '&' | '=' => Some(TokenKind::Operator),
            ',' => Some(TokenKind::Comma),
            '(' => Some(TokenKind::OpenParen),
            ')' => Some(TokenKind::CloseParen),
            ':' => Some(TokenKind::Colon),
            _ => None,
        };
        if let Some(kind) = single {
            self.advance();
            return Ok(Token::new(kind, c.to_string(), start));
        }

        match c {
            '<' => {
                self.advance();
                let op = match self.peek_char() {
                    Some('=') => "<=",
                    Some('>') => "<>",
                    _ => "<",
                };
                if op.len() == 2 {
                    self.advance();
                }
                Ok(Token::new(TokenKind::Operator, op, start))
            }
            '>' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    return Ok(Token::new(TokenKind::Operator, ">=", start));
                }
                Ok(Token::new(TokenKind::Operator, ">", start))
            }
            '"' => self.scan_string(),
            c if c.is_ascii_digit() => self.scan_number(),
            '.' if self.peek_char_at(1).map_or(false, |c| c.is_ascii_digit()) => {
                self.scan_number()
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => self.scan_identifier_or_ref(),
            other => Err(FormulaError::lex(
                start,
                format!("unrecognized character '{}'", other),
            )),
        }
    }

    fn scan_string(&mut self) -> FormulaResult<Token> {
        let start = self.pos;
        self.advance();

        let mut s = String::new();
        loop {
            match self.peek_char() {
                None => return Err(FormulaError::lex(start, "unterminated string literal")),
                Some('"') => {
                    self.advance();
                    if self.peek_char() == Some('"') {
                        s.push('"');
                        self.advance();
                    } else {
                        return Ok(Token::new(TokenKind::String, s, start));
                    }
                }
                Some(c) => {
                    s.push(c);
                    self.advance();
                }
            }
        }
    }

    fn scan_number(&mut self) -> FormulaResult<Token> {
        let start = self.pos;

        self.skip_digits();

        if self.peek_char() == Some('.') {
            self.advance();
            self.skip_digits();
        }

        // Only take the exponent when digits actually follow it
        if matches!(self.peek_char(), Some('e' | 'E')) {
            let digits_at = match self.peek_char_at(1) {
                Some('+' | '-') => 2,
                _ => 1,
            };
            if self
                .peek_char_at(digits_at)
                .map_or(false, |c| c.is_ascii_digit())
            {
                for _ in 0..digits_at {
                    self.advance();
                }
                self.skip_digits();
            }
        }

        let text = &self.input[start..self.pos];
        match text.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(Token::new(TokenKind::Number, text, start)),
            _ => Err(FormulaError::lex(
                start,
                format!("number '{}' is out of range", text),
            )),
        }
    }

    fn scan_identifier_or_ref(&mut self) -> FormulaResult<Token> {
        let start = self.pos;

        while self
            .peek_char()
            .map_or(false, |c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.')
        {
            self.advance();
        }

        let text = &self.input[start..self.pos];

        // LOG10( is a call even though LOG10 looks like a reference
        if self.peek_char() == Some('(') {
            if regex_is_match!(r"^[A-Za-z_][A-Za-z0-9_.]*$", text) {
                return Ok(Token::new(TokenKind::FunctionName, text, start));
            }
            return Err(FormulaError::lex(
                start,
                format!("invalid function name '{}'", text),
            ));
        }

        if text.eq_ignore_ascii_case("TRUE") {
            return Ok(Token::new(TokenKind::Boolean, "TRUE", start));
        }
        if text.eq_ignore_ascii_case("FALSE") {
            return Ok(Token::new(TokenKind::Boolean, "FALSE", start));
        }

        if regex_is_match!(r"^\$?[A-Za-z]+\$?[0-9]+$", text) {
            return match CellAddress::parse(text) {
                Ok(addr) => Ok(Token::new(TokenKind::CellRef, addr.to_a1_string(), start)),
                Err(e) => Err(FormulaError::lex(
                    start,
                    format!("invalid cell reference '{}': {}", text, e),
                )),
            };
        }

        Err(FormulaError::lex(
            start,
            format!("unknown identifier '{}'", text),
        ))
    }

    // === Helper methods ===

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_digits(&mut self) {
        while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().map_or(false, char::is_whitespace) {
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds_and_text(input: &str) -> Vec<(TokenKind, String)> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn test_tokenize_arithmetic() {
        use TokenKind::*;
        assert_eq!(
            kinds_and_text("=1 + 2.5*3"),
            vec![
                (Number, "1".to_string()),
                (Operator, "+".to_string()),
                (Number, "2.5".to_string()),
                (Operator, "*".to_string()),
                (Number, "3".to_string()),
                (EndOfInput, std::string::String::new()),
            ]
        );
    }

    #[test]
    fn test_tokenize_positions() {
        let tokens = tokenize("=A1 <> \"x\"").unwrap();
        let positions: Vec<_> = tokens.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![1, 4, 7, 10]);
    }

    #[test]
    fn test_tokenize_two_char_operators() {
        let ops: Vec<_> = tokenize("1<=2>=3<>4<5>6=7")
            .unwrap()
            .into_iter()
            .filter(|t| t.kind == TokenKind::Operator)
            .map(|t| t.text)
            .collect();
        assert_eq!(ops, vec!["<=", ">=", "<>", "<", ">", "="]);
    }

    #[test]
    fn test_tokenize_strings() {
        let tokens = tokenize("\"say \"\"hi\"\"\"").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].text, "say \"hi\"");

        let tokens = tokenize("\"\"").unwrap();
        assert_eq!(tokens[0].text, "");
    }

    #[test]
    fn test_tokenize_numbers() {
        let texts: Vec<_> = tokenize("1 .5 2. 1e3 2.5E-2")
            .unwrap()
            .into_iter()
            .filter(|t| t.kind == TokenKind::Number)
            .map(|t| t.text)
            .collect();
        assert_eq!(texts, vec!["1", ".5", "2.", "1e3", "2.5E-2"]);
    }

    #[test]
    fn test_tokenize_references_and_booleans() {
        use TokenKind::*;
        assert_eq!(
            kinds_and_text("$b$2:c10 true FALSE"),
            vec![
                (CellRef, "B2".to_string()),
                (Colon, ":".to_string()),
                (CellRef, "C10".to_string()),
                (Boolean, "TRUE".to_string()),
                (Boolean, "FALSE".to_string()),
                (EndOfInput, std::string::String::new()),
            ]
        );
    }

    #[test]
    fn test_tokenize_function_names() {
        let tokens = tokenize("sum(LOG10(1))").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::FunctionName);
        assert_eq!(tokens[0].text, "sum");
        assert_eq!(tokens[2].kind, TokenKind::FunctionName);
        assert_eq!(tokens[2].text, "LOG10");
    }

    #[test]
    fn test_tokenize_errors() {
        assert!(matches!(
            tokenize("1 % 2"),
            Err(FormulaError::Lex { position: 2, .. })
        ));
        assert!(matches!(
            tokenize("=1 + \"abc"),
            Err(FormulaError::Lex { position: 5, .. })
        ));
        assert!(matches!(
            tokenize("foo + 1"),
            Err(FormulaError::Lex { position: 0, .. })
        ));
        assert!(matches!(
            tokenize("XFE1"),
            Err(FormulaError::Lex { position: 0, .. })
        ));
        assert!(matches!(
            tokenize("A0"),
            Err(FormulaError::Lex { position: 0, .. })
        ));
        assert!(matches!(
            tokenize("1e999"),
            Err(FormulaError::Lex { position: 0, .. })
        ));
    }

    #[test]
    fn test_tokenize_empty() {
        let tokens = tokenize("").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::EndOfInput);

        let tokens = tokenize("  =  ").unwrap();
        assert_eq!(tokens[0].position, 5);
    }
}
