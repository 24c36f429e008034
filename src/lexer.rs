//! Lexer: logos token definitions plus the indentation driver.
//!
//! Logos handles the intra-line tokens; the driver walks the source line by
//! line, measures leading whitespace against a stack of indentation widths,
//! and synthesizes `Indent` / `Dedent` / `Newline` tokens so the parser can
//! treat suites like bracketed blocks. Blank and comment-only lines produce
//! no tokens; a tab advances the column to the next multiple of eight.

use logos::Logos;

use crate::error::{SemantError, SemantResult};

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t]+")]
#[logos(skip r"#[^\n]*")]
pub enum Tok {
    #[token("def")]
    Def,
    #[token("if")]
    If,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("range")]
    Range,
    #[token("return")]
    Return,
    #[token("print")]
    Print,
    #[token("not")]
    Not,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("True")]
    True,
    #[token("False")]
    False,
    #[token("None")]
    NoneKw,
    #[token("pass")]
    Pass,
    #[token("continue")]
    Continue,
    #[token("break")]
    Break,
    #[token("import")]
    Import,
    #[token("class")]
    Class,
    #[token("int")]
    IntTy,
    #[token("float")]
    FloatTy,
    #[token("bool")]
    BoolTy,
    #[token("str")]
    StrTy,
    #[token("list")]
    ListTy,
    #[token("func")]
    FuncTy,
    #[token("object")]
    ObjectTy,

    #[token("**")]
    StarStar,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    Leq,
    #[token(">=")]
    Geq,
    #[token("->")]
    Arrow,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("=")]
    Assign,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    #[regex(r"[0-9]+\.[0-9]*", |lex| lex.slice().parse::<f64>().ok())]
    FloatLit(f64),
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i32>().ok())]
    IntLit(i32),
    #[regex(r#""([^"\\\n]|\\.)*""#, unescape)]
    StrLit(String),
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    // Synthesized by the indentation driver.
    Newline,
    Indent,
    Dedent,
    Eof,
}

fn unescape(lex: &mut logos::Lexer<Tok>) -> Option<String> {
    let raw = lex.slice();
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Some(out)
}

/// A token plus the 1-based source line it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: Tok,
    pub line: usize,
}

/// Column width of a line's leading whitespace; `None` for lines that hold
/// no tokens (blank or comment-only).
fn indent_width(line: &str) -> Option<usize> {
    let mut width = 0usize;
    for c in line.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width = width / 8 * 8 + 8,
            '#' => return None,
            _ => return Some(width),
        }
    }
    None
}

/// Tokenize a whole source file, synthesizing indentation tokens.
pub fn lex(src: &str) -> SemantResult<Vec<Token>> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut levels: Vec<usize> = vec![0];

    for (idx, line) in src.lines().enumerate() {
        let lineno = idx + 1;
        let width = match indent_width(line) {
            Some(w) => w,
            None => continue,
        };

        let top = *levels.last().unwrap_or(&0);
        if width > top {
            levels.push(width);
            tokens.push(Token {
                kind: Tok::Indent,
                line: lineno,
            });
        } else if width < top {
            while let Some(&lvl) = levels.last() {
                if lvl == width {
                    break;
                }
                if lvl < width {
                    return Err(SemantError::Syntax(format!(
                        "line {}: unindent does not match any outer indentation level",
                        lineno
                    )));
                }
                levels.pop();
                tokens.push(Token {
                    kind: Tok::Dedent,
                    line: lineno,
                });
            }
        }

        for item in Tok::lexer(line) {
            match item {
                Ok(kind) => tokens.push(Token { kind, line: lineno }),
                Err(_) => {
                    return Err(SemantError::Syntax(format!(
                        "line {}: unrecognized token",
                        lineno
                    )));
                }
            }
        }
        tokens.push(Token {
            kind: Tok::Newline,
            line: lineno,
        });
    }

    let last_line = src.lines().count().max(1);
    while levels.len() > 1 {
        levels.pop();
        tokens.push(Token {
            kind: Tok::Dedent,
            line: last_line,
        });
    }
    tokens.push(Token {
        kind: Tok::Eof,
        line: last_line,
    });
    Ok(tokens)
}
