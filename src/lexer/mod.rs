pub mod tokens;

use tokens::{keyword_type, Token, TokenType};
use std::fmt;

#[derive(Debug, Clone)]
pub struct LexerError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub file: String,
}

impl fmt::Display for LexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}: {}", self.file, self.line, self.column, self.message)
    }
}

impl std::error::Error for LexerError {}

pub struct Lexer {
    source: Vec<char>,
    filename: String,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    pub fn new(source: &str, filename: &str) -> Self {
        Self {
            source: source.chars().collect(),
            filename: filename.to_string(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexerError> {
        // A leading `#` line (shebang) is not part of the chunk.
        if self.peek_ahead(0) == Some('#') {
            self.skip_line();
        }

        loop {
            self.skip_trivia()?;
            if self.at_end() {
                break;
            }
            self.scan_token()?;
        }

        self.tokens.push(self.make_token(TokenType::Eof, "<eof>"));
        Ok(self.tokens)
    }

    fn skip_trivia(&mut self) -> Result<(), LexerError> {
        while !self.at_end() {
            let ch = self.peek();
            if matches!(ch, ' ' | '\t' | '\r' | '\n' | '\x0b' | '\x0c') {
                self.advance();
            } else if ch == '-' && self.peek_ahead(1) == Some('-') {
                self.advance();
                self.advance();
                if self.peek_ahead(0) == Some('[') {
                    if let Some(level) = self.long_bracket_level() {
                        self.read_long_bracket(level, "comment")?;
                        continue;
                    }
                }
                self.skip_line();
            } else {
                break;
            }
        }
        Ok(())
    }

    fn scan_token(&mut self) -> Result<(), LexerError> {
        let ch = self.peek();

        if ch == '"' || ch == '\'' {
            return self.scan_string(ch);
        }

        if ch.is_ascii_digit()
            || (ch == '.' && self.peek_ahead(1).is_some_and(|c| c.is_ascii_digit()))
        {
            return self.scan_number();
        }

        if ch == '[' {
            if let Some(level) = self.long_bracket_level() {
                let (line, column) = (self.line, self.column);
                let bytes = self.read_long_bracket(level, "string")?;
                self.tokens.push(Token {
                    token_type: TokenType::StringLit,
                    value: String::from_utf8_lossy(&bytes).into_owned(),
                    bytes: Some(bytes),
                    line,
                    column,
                    file: self.filename.clone(),
                });
                return Ok(());
            }
            if self.peek_ahead(1) == Some('=') {
                return Err(self.error("invalid long string delimiter"));
            }
        }

        // Three- and two-character operators
        let multi = match (ch, self.peek_ahead(1), self.peek_ahead(2)) {
            ('.', Some('.'), Some('.')) => Some((TokenType::Ellipsis, "...")),
            ('.', Some('.'), _) => Some((TokenType::Concat, "..")),
            ('=', Some('='), _) => Some((TokenType::Equals, "==")),
            ('~', Some('='), _) => Some((TokenType::NotEquals, "~=")),
            ('<', Some('='), _) => Some((TokenType::LessEqual, "<=")),
            ('>', Some('='), _) => Some((TokenType::GreaterEqual, ">=")),
            ('<', Some('<'), _) => Some((TokenType::ShiftLeft, "<<")),
            ('>', Some('>'), _) => Some((TokenType::ShiftRight, ">>")),
            ('/', Some('/'), _) => Some((TokenType::DoubleSlash, "//")),
            (':', Some(':'), _) => Some((TokenType::DoubleColon, "::")),
            _ => None,
        };
        if let Some((tt, text)) = multi {
            self.tokens.push(self.make_token(tt, text));
            for _ in 0..text.len() {
                self.advance();
            }
            return Ok(());
        }

        // Single-character tokens
        let single = match ch {
            '+' => Some(TokenType::Plus),
            '-' => Some(TokenType::Minus),
            '*' => Some(TokenType::Star),
            '/' => Some(TokenType::Slash),
            '%' => Some(TokenType::Percent),
            '^' => Some(TokenType::Caret),
            '#' => Some(TokenType::Hash),
            '&' => Some(TokenType::Ampersand),
            '~' => Some(TokenType::Tilde),
            '|' => Some(TokenType::Pipe),
            '<' => Some(TokenType::LessThan),
            '>' => Some(TokenType::GreaterThan),
            '=' => Some(TokenType::Assign),
            '(' => Some(TokenType::LParen),
            ')' => Some(TokenType::RParen),
            '{' => Some(TokenType::LBrace),
            '}' => Some(TokenType::RBrace),
            '[' => Some(TokenType::LBracket),
            ']' => Some(TokenType::RBracket),
            ';' => Some(TokenType::Semicolon),
            ':' => Some(TokenType::Colon),
            ',' => Some(TokenType::Comma),
            '.' => Some(TokenType::Dot),
            _ => None,
        };

        if let Some(tt) = single {
            let s = ch.to_string();
            self.tokens.push(self.make_token(tt, &s));
            self.advance();
            return Ok(());
        }

        // Identifiers and keywords
        if ch.is_ascii_alphabetic() || ch == '_' {
            return self.scan_identifier();
        }

        Err(self.error(&format!("unexpected symbol near {:?}", ch)))
    }

    fn scan_string(&mut self, quote: char) -> Result<(), LexerError> {
        let start_line = self.line;
        let start_col = self.column;
        self.advance(); // consume opening quote
        let mut bytes: Vec<u8> = Vec::new();

        loop {
            if self.at_end() {
                return Err(self.error_at("unfinished string", start_line, start_col));
            }
            let ch = self.peek();
            if ch == quote {
                self.advance();
                break;
            }
            if ch == '\n' {
                return Err(self.error_at("unfinished string", start_line, start_col));
            }
            if ch != '\\' {
                push_char(&mut bytes, ch);
                self.advance();
                continue;
            }

            self.advance(); // consume backslash
            if self.at_end() {
                return Err(self.error_at("unfinished string", start_line, start_col));
            }
            let escaped = self.advance();
            match escaped {
                'a' => bytes.push(0x07),
                'b' => bytes.push(0x08),
                'f' => bytes.push(0x0c),
                'n' => bytes.push(b'\n'),
                'r' => bytes.push(b'\r'),
                't' => bytes.push(b'\t'),
                'v' => bytes.push(0x0b),
                '\\' => bytes.push(b'\\'),
                '"' => bytes.push(b'"'),
                '\'' => bytes.push(b'\''),
                '\n' => {
                    bytes.push(b'\n');
                    if self.peek_ahead(0) == Some('\r') {
                        self.advance();
                    }
                }
                '\r' => {
                    bytes.push(b'\n');
                    if self.peek_ahead(0) == Some('\n') {
                        self.advance();
                    }
                }
                'z' => {
                    while !self.at_end() && self.peek().is_ascii_whitespace() {
                        self.advance();
                    }
                }
                'x' => {
                    let hi = self.advance_hex_digit()?;
                    let lo = self.advance_hex_digit()?;
                    bytes.push((hi * 16 + lo) as u8);
                }
                'u' => {
                    let code = self.scan_utf8_escape()?;
                    push_utf8_escape(&mut bytes, code);
                }
                d if d.is_ascii_digit() => {
                    let mut value = d.to_digit(10).unwrap_or(0);
                    for _ in 0..2 {
                        match self.peek_ahead(0).and_then(|c| c.to_digit(10)) {
                            Some(digit) => {
                                value = value * 10 + digit;
                                self.advance();
                            }
                            None => break,
                        }
                    }
                    if value > 255 {
                        return Err(self.error("decimal escape too large"));
                    }
                    bytes.push(value as u8);
                }
                other => {
                    return Err(self.error(&format!("invalid escape sequence '\\{}'", other)));
                }
            }
        }

        self.tokens.push(Token {
            token_type: TokenType::StringLit,
            value: String::from_utf8_lossy(&bytes).into_owned(),
            bytes: Some(bytes),
            line: start_line,
            column: start_col,
            file: self.filename.clone(),
        });
        Ok(())
    }

    fn advance_hex_digit(&mut self) -> Result<u32, LexerError> {
        match self.peek_ahead(0).and_then(|c| c.to_digit(16)) {
            Some(d) => {
                self.advance();
                Ok(d)
            }
            None => Err(self.error("hexadecimal digit expected")),
        }
    }

    fn scan_utf8_escape(&mut self) -> Result<u32, LexerError> {
        if self.peek_ahead(0) != Some('{') {
            return Err(self.error("missing '{' in \\u{xxxx}"));
        }
        self.advance();
        let mut code: u32 = self.advance_hex_digit()?;
        while let Some(d) = self.peek_ahead(0).and_then(|c| c.to_digit(16)) {
            code = code
                .checked_mul(16)
                .and_then(|c| c.checked_add(d))
                .filter(|c| *c <= 0x7FFF_FFFF)
                .ok_or_else(|| self.error("UTF-8 value too large"))?;
            self.advance();
        }
        if self.peek_ahead(0) != Some('}') {
            return Err(self.error("missing '}' in \\u{xxxx}"));
        }
        self.advance();
        Ok(code)
    }

    fn scan_number(&mut self) -> Result<(), LexerError> {
        let start_col = self.column;
        let start_line = self.line;
        let mut num_chars = String::new();

        let is_hex = self.peek() == '0' && matches!(self.peek_ahead(1), Some('x') | Some('X'));
        let (exponent_marks, digit_ok): (&[char], fn(char) -> bool) = if is_hex {
            num_chars.push(self.advance());
            num_chars.push(self.advance());
            (&['p', 'P'], |c| c.is_ascii_hexdigit())
        } else {
            (&['e', 'E'], |c| c.is_ascii_digit())
        };

        let mut is_float = false;
        while !self.at_end() {
            let c = self.peek();
            if exponent_marks.contains(&c) {
                is_float = true;
                num_chars.push(self.advance());
                if matches!(self.peek_ahead(0), Some('+') | Some('-')) {
                    num_chars.push(self.advance());
                }
            } else if c == '.' {
                is_float = true;
                num_chars.push(self.advance());
            } else if digit_ok(c) {
                num_chars.push(self.advance());
            } else {
                break;
            }
        }

        // A numeral running straight into a name is malformed (`3x`, `0x1g`).
        if !self.at_end() && (self.peek().is_ascii_alphanumeric() || self.peek() == '_') {
            num_chars.push(self.peek());
            return Err(self.error_at(
                &format!("malformed number near '{}'", num_chars),
                start_line,
                start_col,
            ));
        }

        let tt = if is_float {
            TokenType::Float
        } else {
            TokenType::Integer
        };

        self.tokens.push(Token {
            token_type: tt,
            value: num_chars,
            bytes: None,
            line: start_line,
            column: start_col,
            file: self.filename.clone(),
        });
        Ok(())
    }

    fn scan_identifier(&mut self) -> Result<(), LexerError> {
        let start_col = self.column;
        let mut word = String::new();

        while !self.at_end() && (self.peek().is_ascii_alphanumeric() || self.peek() == '_') {
            word.push(self.peek());
            self.advance();
        }

        let tt = keyword_type(&word).unwrap_or(TokenType::Identifier);
        self.tokens.push(Token {
            token_type: tt,
            value: word,
            bytes: None,
            line: self.line,
            column: start_col,
            file: self.filename.clone(),
        });
        Ok(())
    }

    // ── Long brackets ───────────────────────────────────────────────────

    /// If the cursor sits on `[`, `[[` or `[==[`, return the bracket level
    /// without consuming anything.
    fn long_bracket_level(&self) -> Option<usize> {
        let mut offset = 1;
        while self.peek_ahead(offset) == Some('=') {
            offset += 1;
        }
        if self.peek_ahead(offset) == Some('[') {
            Some(offset - 1)
        } else {
            None
        }
    }

    fn read_long_bracket(&mut self, level: usize, what: &str) -> Result<Vec<u8>, LexerError> {
        let (start_line, start_col) = (self.line, self.column);
        for _ in 0..level + 2 {
            self.advance();
        }
        // A newline right after the opening bracket is not part of the text.
        if self.peek_ahead(0) == Some('\r') {
            self.advance();
            if self.peek_ahead(0) == Some('\n') {
                self.advance();
            }
        } else if self.peek_ahead(0) == Some('\n') {
            self.advance();
            if self.peek_ahead(0) == Some('\r') {
                self.advance();
            }
        }

        let mut bytes = Vec::new();
        loop {
            if self.at_end() {
                return Err(self.error_at(
                    &format!("unfinished long {}", what),
                    start_line,
                    start_col,
                ));
            }
            let ch = self.peek();
            if ch == ']' && self.closes_long_bracket(level) {
                for _ in 0..level + 2 {
                    self.advance();
                }
                return Ok(bytes);
            }
            if ch == '\r' || ch == '\n' {
                self.advance();
                // \r\n and \n\r both count as a single line break
                if let Some(next) = self.peek_ahead(0) {
                    if (next == '\r' || next == '\n') && next != ch {
                        self.advance();
                    }
                }
                bytes.push(b'\n');
                continue;
            }
            push_char(&mut bytes, ch);
            self.advance();
        }
    }

    fn closes_long_bracket(&self, level: usize) -> bool {
        (1..=level).all(|i| self.peek_ahead(i) == Some('='))
            && self.peek_ahead(level + 1) == Some(']')
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    fn peek(&self) -> char {
        self.source[self.pos]
    }

    fn peek_ahead(&self, offset: usize) -> Option<char> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> char {
        let ch = self.source[self.pos];
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        ch
    }

    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn skip_line(&mut self) {
        while !self.at_end() && self.peek() != '\n' {
            self.advance();
        }
    }

    fn make_token(&self, token_type: TokenType, value: &str) -> Token {
        Token {
            token_type,
            value: value.to_string(),
            bytes: None,
            line: self.line,
            column: self.column,
            file: self.filename.clone(),
        }
    }

    fn error(&self, message: &str) -> LexerError {
        self.error_at(message, self.line, self.column)
    }

    fn error_at(&self, message: &str, line: usize, column: usize) -> LexerError {
        LexerError {
            message: message.to_string(),
            line,
            column,
            file: self.filename.clone(),
        }
    }
}

fn push_char(bytes: &mut Vec<u8>, ch: char) {
    let mut buf = [0u8; 4];
    bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
}

/// Encode `code` the way Lua's `\u{...}` escape does: plain UTF-8 for scalar
/// values, the original 6-byte scheme for anything up to 2^31.
fn push_utf8_escape(bytes: &mut Vec<u8>, code: u32) {
    if let Some(ch) = char::from_u32(code) {
        push_char(bytes, ch);
        return;
    }
    let mut buf = [0u8; 6];
    let mut n = 0;
    let mut x = code;
    let mut mfb: u32 = 0x3f;
    loop {
        buf[5 - n] = (0x80 | (x & 0x3f)) as u8;
        n += 1;
        x >>= 6;
        mfb >>= 1;
        if x <= mfb {
            break;
        }
    }
    buf[5 - n] = ((!mfb << 1) | x) as u8;
    n += 1;
    bytes.extend_from_slice(&buf[6 - n..]);
}
