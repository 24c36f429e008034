//! Recursive-descent parser: token stream to the untyped AST.
//!
//! Expression parsing is precedence-climbing (`or` < `and` < `not` <
//! comparison < additive < multiplicative < unary < power < postfix).
//! Suites are either an indented block or a single inline simple statement
//! after the colon. The parser resolves nothing: `import`, `class`, fields
//! and methods all survive to the semantic pass, which rejects them.

use std::rc::Rc;

use crate::ast::{Bind, Expr, Func, Lit, Op, Program, Stmt, Target, Type, Uop};
use crate::error::{SemantError, SemantResult};
use crate::lexer::{Tok, Token};

pub struct Parser {
    toks: Vec<Token>,
    pos: usize,
}

pub fn parse(tokens: Vec<Token>) -> SemantResult<Program> {
    Parser { toks: tokens, pos: 0 }.parse_program()
}

impl Parser {
    fn peek(&self) -> &Tok {
        self.toks
            .get(self.pos)
            .map(|t| &t.kind)
            .unwrap_or(&Tok::Eof)
    }

    fn peek_nth(&self, n: usize) -> &Tok {
        self.toks
            .get(self.pos + n)
            .map(|t| &t.kind)
            .unwrap_or(&Tok::Eof)
    }

    fn line(&self) -> usize {
        self.toks
            .get(self.pos.min(self.toks.len().saturating_sub(1)))
            .map(|t| t.line)
            .unwrap_or(0)
    }

    fn advance(&mut self) -> Tok {
        let t = self.peek().clone();
        if self.pos < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn check(&self, kind: &Tok) -> bool {
        self.peek() == kind
    }

    fn eat(&mut self, kind: &Tok) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: Tok, what: &str) -> SemantResult<()> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.err(&format!("expected {}", what)))
        }
    }

    fn err(&self, msg: &str) -> SemantError {
        SemantError::Syntax(format!("line {}: {}", self.line(), msg))
    }

    fn parse_program(&mut self) -> SemantResult<Program> {
        let mut body = Vec::new();
        while !self.check(&Tok::Eof) {
            if self.eat(&Tok::Newline) {
                continue;
            }
            body.push(self.parse_stmt()?);
        }
        Ok(Program { body })
    }

    fn parse_stmt(&mut self) -> SemantResult<Stmt> {
        match self.peek() {
            Tok::If => self.parse_if(),
            Tok::While => self.parse_while(),
            Tok::For => self.parse_for(),
            Tok::Def => self.parse_def(),
            Tok::Class => self.parse_class(),
            _ => {
                let stmt = self.parse_simple_stmt()?;
                self.expect(Tok::Newline, "end of statement")?;
                Ok(stmt)
            }
        }
    }

    /// A suite is an indented block, or a single simple statement on the
    /// same line as the colon.
    fn parse_suite(&mut self) -> SemantResult<Vec<Stmt>> {
        self.expect(Tok::Colon, "':'")?;
        if self.eat(&Tok::Newline) {
            self.expect(Tok::Indent, "an indented block")?;
            let mut stmts = Vec::new();
            while !self.eat(&Tok::Dedent) {
                if self.eat(&Tok::Newline) {
                    continue;
                }
                if self.check(&Tok::Eof) {
                    return Err(self.err("unexpected end of input in block"));
                }
                stmts.push(self.parse_stmt()?);
            }
            Ok(stmts)
        } else {
            let stmt = self.parse_simple_stmt()?;
            self.expect(Tok::Newline, "end of statement")?;
            Ok(vec![stmt])
        }
    }

    fn parse_if(&mut self) -> SemantResult<Stmt> {
        self.expect(Tok::If, "'if'")?;
        let cond = self.parse_expr()?;
        let then = self.parse_suite()?;
        let els = if self.check(&Tok::Elif) {
            // Rewrite `elif` as a nested if in the else branch.
            self.toks[self.pos].kind = Tok::If;
            vec![self.parse_if()?]
        } else if self.eat(&Tok::Else) {
            self.parse_suite()?
        } else {
            Vec::new()
        };
        Ok(Stmt::If(cond, then, els))
    }

    fn parse_while(&mut self) -> SemantResult<Stmt> {
        self.expect(Tok::While, "'while'")?;
        let cond = self.parse_expr()?;
        let body = self.parse_suite()?;
        Ok(Stmt::While(cond, body))
    }

    fn parse_for(&mut self) -> SemantResult<Stmt> {
        self.expect(Tok::For, "'for'")?;
        let var = self.expect_ident("loop variable")?;
        self.expect(Tok::In, "'in'")?;
        if self.eat(&Tok::Range) {
            self.expect(Tok::LParen, "'('")?;
            let bound = self.parse_expr()?;
            self.expect(Tok::RParen, "')'")?;
            let body = self.parse_suite()?;
            Ok(Stmt::Range(var, bound, body))
        } else {
            let seq = self.parse_expr()?;
            let body = self.parse_suite()?;
            Ok(Stmt::For(var, seq, body))
        }
    }

    fn parse_def(&mut self) -> SemantResult<Stmt> {
        self.expect(Tok::Def, "'def'")?;
        let name = self.expect_ident("function name")?;
        self.expect(Tok::LParen, "'('")?;
        let mut formals = Vec::new();
        if !self.check(&Tok::RParen) {
            loop {
                let pname = self.expect_ident("parameter name")?;
                let ty = if self.eat(&Tok::Colon) {
                    self.parse_type()?
                } else {
                    Type::Dyn
                };
                formals.push(Bind::new(pname, ty));
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
        }
        self.expect(Tok::RParen, "')'")?;
        let ret = if self.eat(&Tok::Arrow) {
            self.parse_type()?
        } else {
            Type::Dyn
        };
        let body = self.parse_suite()?;
        Ok(Stmt::Func(Rc::new(Func {
            name,
            formals,
            ret,
            body,
        })))
    }

    fn parse_class(&mut self) -> SemantResult<Stmt> {
        self.expect(Tok::Class, "'class'")?;
        let name = self.expect_ident("class name")?;
        let body = self.parse_suite()?;
        Ok(Stmt::Class(name, body))
    }

    fn parse_simple_stmt(&mut self) -> SemantResult<Stmt> {
        match self.peek() {
            Tok::Pass => {
                self.advance();
                Ok(Stmt::Nop)
            }
            Tok::Continue => {
                self.advance();
                Ok(Stmt::Continue)
            }
            Tok::Break => {
                self.advance();
                Ok(Stmt::Break)
            }
            Tok::Import => {
                self.advance();
                let module = self.expect_ident("module name")?;
                Ok(Stmt::Import(module))
            }
            Tok::Return => {
                self.advance();
                if self.check(&Tok::Newline) {
                    Ok(Stmt::Return(None))
                } else {
                    Ok(Stmt::Return(Some(self.parse_expr()?)))
                }
            }
            Tok::Print => {
                self.advance();
                self.expect(Tok::LParen, "'(' after print")?;
                let arg = self.parse_expr()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(Stmt::Print(arg))
            }
            // `x: int` or `x: int = e`: an annotated name.
            Tok::Ident(_) if *self.peek_nth(1) == Tok::Colon => {
                let name = self.expect_ident("name")?;
                self.expect(Tok::Colon, "':'")?;
                let ty = self.parse_type()?;
                if self.eat(&Tok::Assign) {
                    let mut targets = vec![Target::Name(name, ty)];
                    let value = self.parse_asn_tail(&mut targets)?;
                    Ok(Stmt::Asn(targets, value))
                } else {
                    Ok(Stmt::Type(Bind::new(name, ty)))
                }
            }
            _ => {
                let expr = self.parse_expr()?;
                if self.eat(&Tok::Assign) {
                    let mut targets = vec![self.expr_to_target(expr)?];
                    let value = self.parse_asn_tail(&mut targets)?;
                    Ok(Stmt::Asn(targets, value))
                } else {
                    Ok(Stmt::Expr(expr))
                }
            }
        }
    }

    /// After the first `=`: keep collecting chained targets until the final
    /// expression (`x = y = e`).
    fn parse_asn_tail(&mut self, targets: &mut Vec<Target>) -> SemantResult<Expr> {
        loop {
            let expr = self.parse_expr()?;
            if self.eat(&Tok::Assign) {
                targets.push(self.expr_to_target(expr)?);
            } else {
                return Ok(expr);
            }
        }
    }

    fn expr_to_target(&self, expr: Expr) -> SemantResult<Target> {
        match expr {
            Expr::Var(name) => Ok(Target::Name(name, Type::Dyn)),
            Expr::ListAccess(list, idx) => Ok(Target::Index(*list, *idx)),
            _ => Err(self.err("invalid assignment target")),
        }
    }

    fn expect_ident(&mut self, what: &str) -> SemantResult<String> {
        match self.advance() {
            Tok::Ident(name) => Ok(name),
            _ => Err(self.err(&format!("expected {}", what))),
        }
    }

    fn parse_type(&mut self) -> SemantResult<Type> {
        match self.advance() {
            Tok::IntTy => Ok(Type::Int),
            Tok::FloatTy => Ok(Type::Float),
            Tok::BoolTy => Ok(Type::Bool),
            Tok::StrTy => Ok(Type::String),
            Tok::ListTy => Ok(Type::Arr),
            Tok::FuncTy => Ok(Type::FuncType),
            Tok::ObjectTy => Ok(Type::Object),
            Tok::NoneKw => Ok(Type::Null),
            _ => Err(self.err("expected a type annotation")),
        }
    }

    // Expressions.

    pub fn parse_expr(&mut self) -> SemantResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> SemantResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Tok::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Binop(Box::new(lhs), Op::Or, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> SemantResult<Expr> {
        let mut lhs = self.parse_not()?;
        while self.eat(&Tok::And) {
            let rhs = self.parse_not()?;
            lhs = Expr::Binop(Box::new(lhs), Op::And, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> SemantResult<Expr> {
        if self.eat(&Tok::Not) {
            let operand = self.parse_not()?;
            Ok(Expr::Unop(Uop::Not, Box::new(operand)))
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> SemantResult<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Tok::EqEq => Op::Eq,
                Tok::NotEq => Op::Neq,
                Tok::Less => Op::Less,
                Tok::Leq => Op::Leq,
                Tok::Greater => Op::Greater,
                Tok::Geq => Op::Geq,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binop(Box::new(lhs), op, Box::new(rhs));
        }
    }

    fn parse_additive(&mut self) -> SemantResult<Expr> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Tok::Plus => Op::Add,
                Tok::Minus => Op::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_term()?;
            lhs = Expr::Binop(Box::new(lhs), op, Box::new(rhs));
        }
    }

    fn parse_term(&mut self) -> SemantResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Tok::Star => Op::Mul,
                Tok::Slash => Op::Div,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binop(Box::new(lhs), op, Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> SemantResult<Expr> {
        if self.eat(&Tok::Minus) {
            let operand = self.parse_unary()?;
            Ok(Expr::Unop(Uop::Neg, Box::new(operand)))
        } else {
            self.parse_power()
        }
    }

    fn parse_power(&mut self) -> SemantResult<Expr> {
        let base = self.parse_postfix()?;
        if self.eat(&Tok::StarStar) {
            // Right-associative, and `-` binds looser on the right side.
            let exp = self.parse_unary()?;
            Ok(Expr::Binop(Box::new(base), Op::Exp, Box::new(exp)))
        } else {
            Ok(base)
        }
    }

    fn parse_postfix(&mut self) -> SemantResult<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            if self.eat(&Tok::LParen) {
                let args = self.parse_args()?;
                expr = Expr::Call(Box::new(expr), args);
            } else if self.eat(&Tok::LBracket) {
                let idx = self.parse_expr()?;
                self.expect(Tok::RBracket, "']'")?;
                expr = Expr::ListAccess(Box::new(expr), Box::new(idx));
            } else if self.eat(&Tok::Dot) {
                let name = self.expect_ident("attribute name")?;
                if self.eat(&Tok::LParen) {
                    let args = self.parse_args()?;
                    expr = Expr::Method(Box::new(expr), name, args);
                } else {
                    expr = Expr::Field(Box::new(expr), name);
                }
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_args(&mut self) -> SemantResult<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(&Tok::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
        }
        self.expect(Tok::RParen, "')'")?;
        Ok(args)
    }

    fn parse_atom(&mut self) -> SemantResult<Expr> {
        match self.advance() {
            Tok::IntLit(v) => Ok(Expr::Lit(Lit::Int(v))),
            Tok::FloatLit(v) => Ok(Expr::Lit(Lit::Float(v))),
            Tok::StrLit(s) => Ok(Expr::Lit(Lit::Str(s))),
            Tok::True => Ok(Expr::Lit(Lit::Bool(true))),
            Tok::False => Ok(Expr::Lit(Lit::Bool(false))),
            Tok::Ident(name) => Ok(Expr::Var(name)),
            Tok::LParen => {
                let inner = self.parse_expr()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(inner)
            }
            Tok::LBracket => {
                let mut elems = Vec::new();
                if !self.check(&Tok::RBracket) {
                    loop {
                        elems.push(self.parse_expr()?);
                        if !self.eat(&Tok::Comma) {
                            break;
                        }
                    }
                }
                self.expect(Tok::RBracket, "']'")?;
                Ok(Expr::List(elems))
            }
            // `int(e)` and friends are casts, not calls.
            tok @ (Tok::IntTy | Tok::FloatTy | Tok::BoolTy | Tok::StrTy) => {
                let target = match tok {
                    Tok::IntTy => Type::Int,
                    Tok::FloatTy => Type::Float,
                    Tok::BoolTy => Type::Bool,
                    _ => Type::String,
                };
                self.expect(Tok::LParen, "'(' after cast")?;
                let inner = self.parse_expr()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(Expr::Cast(target, Box::new(inner)))
            }
            _ => Err(self.err("expected an expression")),
        }
    }
}
