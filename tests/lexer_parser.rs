use adder::ast::{Expr, Lit, Op, Stmt, Target, Type};
use adder::error::SemantError;
use adder::lexer::{lex, Tok};
use adder::parser::parse;

fn parse_src(src: &str) -> Vec<Stmt> {
    parse(lex(src).expect("lex failed")).expect("parse failed").body
}

#[test]
fn indentation_becomes_indent_dedent() {
    let toks = lex("if True:\n    x = 1\ny = 2\n").unwrap();
    let kinds: Vec<&Tok> = toks.iter().map(|t| &t.kind).collect();
    assert!(kinds.contains(&&Tok::Indent));
    assert!(kinds.contains(&&Tok::Dedent));
    // The dedent lands before `y`.
    let dedent_at = kinds.iter().position(|k| **k == Tok::Dedent).unwrap();
    assert!(matches!(kinds[dedent_at + 1], Tok::Ident(n) if n == "y"));
}

#[test]
fn pending_dedents_flush_at_eof() {
    let toks = lex("while True:\n    if True:\n        x = 1\n").unwrap();
    let dedents = toks.iter().filter(|t| t.kind == Tok::Dedent).count();
    assert_eq!(dedents, 2);
    assert_eq!(toks.last().unwrap().kind, Tok::Eof);
}

#[test]
fn mismatched_dedent_is_a_syntax_error() {
    let err = lex("if True:\n        x = 1\n    y = 2\n").unwrap_err();
    assert!(matches!(err, SemantError::Syntax(_)));
    assert!(err.to_string().contains("indentation"));
}

#[test]
fn blank_and_comment_lines_produce_no_tokens() {
    let toks = lex("# leading comment\n\nx = 1  # trailing\n\n").unwrap();
    let newlines = toks.iter().filter(|t| t.kind == Tok::Newline).count();
    assert_eq!(newlines, 1);
}

#[test]
fn tabs_count_as_eight_columns() {
    // A tab-indented body under a space-indented header must still nest.
    let toks = lex("if True:\n\tx = 1\n").unwrap();
    assert!(toks.iter().any(|t| t.kind == Tok::Indent));
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    let body = parse_src("x = 1 + 2 * 3\n");
    let Stmt::Asn(_, value) = &body[0] else {
        panic!("expected assignment");
    };
    let Expr::Binop(_, Op::Add, rhs) = value else {
        panic!("expected addition at the top: {:?}", value);
    };
    assert!(matches!(&**rhs, Expr::Binop(_, Op::Mul, _)));
}

#[test]
fn power_is_right_associative() {
    let body = parse_src("x = 2 ** 3 ** 2\n");
    let Stmt::Asn(_, Expr::Binop(_, Op::Exp, rhs)) = &body[0] else {
        panic!("expected power");
    };
    assert!(matches!(&**rhs, Expr::Binop(_, Op::Exp, _)));
}

#[test]
fn chained_assignment_collects_targets() {
    let body = parse_src("x = y = 5\n");
    let Stmt::Asn(targets, _) = &body[0] else {
        panic!("expected assignment");
    };
    assert_eq!(targets.len(), 2);
}

#[test]
fn annotated_assignment_carries_the_type() {
    let body = parse_src("x: int = 5\n");
    let Stmt::Asn(targets, _) = &body[0] else {
        panic!("expected assignment");
    };
    assert!(matches!(&targets[0], Target::Name(n, Type::Int) if n == "x"));
}

#[test]
fn bare_annotation_is_a_type_statement() {
    let body = parse_src("x: float\n");
    assert!(matches!(&body[0], Stmt::Type(b) if b.name == "x" && b.ty == Type::Float));
}

#[test]
fn elif_desugars_to_nested_if() {
    let body = parse_src("c = True\nif c:\n    x = 1\nelif c:\n    x = 2\nelse:\n    x = 3\n");
    let Stmt::If(_, _, els) = &body[1] else {
        panic!("expected if");
    };
    assert_eq!(els.len(), 1);
    assert!(matches!(&els[0], Stmt::If(_, _, inner_els) if !inner_els.is_empty()));
}

#[test]
fn casts_parse_as_cast_nodes() {
    let body = parse_src("x = 1\ny = float(x)\n");
    let Stmt::Asn(_, value) = &body[1] else {
        panic!("expected assignment");
    };
    assert!(matches!(value, Expr::Cast(Type::Float, _)));
}

#[test]
fn range_for_and_list_for_are_distinct() {
    let body = parse_src("for i in range(10):\n    pass\nfor v in [1, 2]:\n    pass\n");
    assert!(matches!(&body[0], Stmt::Range(n, _, _) if n == "i"));
    assert!(matches!(&body[1], Stmt::For(n, _, _) if n == "v"));
}

#[test]
fn def_parses_formals_and_return_type() {
    let body = parse_src("def f(a: int, b) -> float:\n    return 1.5\n");
    let Stmt::Func(func) = &body[0] else {
        panic!("expected def");
    };
    assert_eq!(func.name, "f");
    assert_eq!(func.formals[0].ty, Type::Int);
    assert_eq!(func.formals[1].ty, Type::Dyn);
    assert_eq!(func.ret, Type::Float);
}

#[test]
fn inline_suite_after_colon() {
    let body = parse_src("c = False\nif c: x = 1\n");
    assert!(matches!(&body[1], Stmt::If(_, then, _) if then.len() == 1));
}

#[test]
fn indexed_assignment_target() {
    let body = parse_src("L = [1]\nL[0] = 2\n");
    let Stmt::Asn(targets, _) = &body[1] else {
        panic!("expected assignment");
    };
    assert!(matches!(&targets[0], Target::Index(_, _)));
}

#[test]
fn string_escapes_are_decoded() {
    let body = parse_src("s = \"a\\nb\"\n");
    let Stmt::Asn(_, Expr::Lit(Lit::Str(s))) = &body[0] else {
        panic!("expected string literal");
    };
    assert_eq!(s, "a\nb");
}

#[test]
fn print_is_a_statement() {
    let body = parse_src("print(1)\n");
    assert!(matches!(&body[0], Stmt::Print(_)));
}
