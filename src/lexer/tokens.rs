use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Eof,

    // Literals
    StringLit,
    Integer,
    Float,
    Identifier,

    // Keywords
    And,
    Break,
    Do,
    Else,
    ElseIf,
    End,
    False,
    For,
    Function,
    Goto,
    If,
    In,
    Local,
    Nil,
    Not,
    Or,
    Repeat,
    Return,
    Then,
    True,
    Until,
    While,

    // Arithmetic / bitwise
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    Caret,
    Hash,
    Ampersand,
    Tilde,
    Pipe,
    ShiftLeft,
    ShiftRight,

    // Comparison
    Equals,
    NotEquals,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    // Punctuation
    Assign,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    DoubleColon,
    Semicolon,
    Colon,
    Comma,
    Dot,
    Concat,
    Ellipsis,
}

impl TokenType {
    /// Tokens that close a block. A statement list stops at any of these.
    pub fn ends_block(&self) -> bool {
        matches!(
            self,
            TokenType::Eof
                | TokenType::End
                | TokenType::Else
                | TokenType::ElseIf
                | TokenType::Until
        )
    }
}

/// Look up a keyword string and return its TokenType, or None if it's a plain identifier.
pub fn keyword_type(word: &str) -> Option<TokenType> {
    match word {
        "and" => Some(TokenType::And),
        "break" => Some(TokenType::Break),
        "do" => Some(TokenType::Do),
        "else" => Some(TokenType::Else),
        "elseif" => Some(TokenType::ElseIf),
        "end" => Some(TokenType::End),
        "false" => Some(TokenType::False),
        "for" => Some(TokenType::For),
        "function" => Some(TokenType::Function),
        "goto" => Some(TokenType::Goto),
        "if" => Some(TokenType::If),
        "in" => Some(TokenType::In),
        "local" => Some(TokenType::Local),
        "nil" => Some(TokenType::Nil),
        "not" => Some(TokenType::Not),
        "or" => Some(TokenType::Or),
        "repeat" => Some(TokenType::Repeat),
        "return" => Some(TokenType::Return),
        "then" => Some(TokenType::Then),
        "true" => Some(TokenType::True),
        "until" => Some(TokenType::Until),
        "while" => Some(TokenType::While),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    /// Source lexeme. For string literals this is the decoded text (lossy);
    /// the exact bytes are in `bytes`.
    pub value: String,
    pub bytes: Option<Vec<u8>>,
    pub line: usize,
    pub column: usize,
    pub file: String,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.token_type {
            TokenType::Eof => {
                write!(f, "Token({:?}, {}:{})", self.token_type, self.line, self.column)
            }
            _ => {
                write!(
                    f,
                    "Token({:?}, {:?}, {}:{})",
                    self.token_type, self.value, self.line, self.column
                )
            }
        }
    }
}
