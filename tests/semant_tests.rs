use std::rc::Rc;

use adder::analyze;
use adder::ast::Type;
use adder::error::SemantError;
use adder::sast::{SExprKind, SFunc, SLval, SProgram, SStmt};

fn ok(src: &str) -> SProgram {
    analyze(src).expect("program should typecheck")
}

fn err(src: &str) -> SemantError {
    analyze(src).expect_err("program should be rejected")
}

/// Collect every specialized call record in a statement tree.
fn collect_specs(stmts: &[SStmt], out: &mut Vec<Rc<SFunc>>) {
    fn walk_expr(e: &adder::sast::SExpr, out: &mut Vec<Rc<SFunc>>) {
        match &e.node {
            SExprKind::SBinop(l, _, r) => {
                walk_expr(l, out);
                walk_expr(r, out);
            }
            SExprKind::SUnop(_, x) => walk_expr(x, out),
            SExprKind::SCall(callee, args, mode) => {
                walk_expr(callee, out);
                for a in args {
                    walk_expr(a, out);
                }
                if let SStmt::SFunc(rec) = &**mode {
                    out.push(rec.clone());
                    collect_specs(std::slice::from_ref(&rec.body), out);
                }
            }
            SExprKind::SList(elems, _) => {
                for e in elems {
                    walk_expr(e, out);
                }
            }
            SExprKind::SListAccess(l, i) => {
                walk_expr(l, out);
                walk_expr(i, out);
            }
            SExprKind::SCast(_, _, x) => walk_expr(x, out),
            _ => {}
        }
    }
    for stmt in stmts {
        match stmt {
            SStmt::SBlock(b) => collect_specs(b, out),
            SStmt::SExpr(e) | SStmt::SPrint(e) | SStmt::SReturn(e) => walk_expr(e, out),
            SStmt::SAsn(lvals, e) => {
                walk_expr(e, out);
                for lv in lvals {
                    if let SLval::Index { list, idx } = lv {
                        walk_expr(list, out);
                        walk_expr(idx, out);
                    }
                }
            }
            SStmt::SIf(c, a, b) => {
                walk_expr(c, out);
                collect_specs(std::slice::from_ref(a), out);
                collect_specs(std::slice::from_ref(b), out);
            }
            SStmt::SWhile(c, b) => {
                walk_expr(c, out);
                collect_specs(std::slice::from_ref(b), out);
            }
            SStmt::SFor(_, e, b) | SStmt::SRange(_, e, b) => {
                walk_expr(e, out);
                collect_specs(std::slice::from_ref(b), out);
            }
            SStmt::SStage(entry, b, exit) => {
                collect_specs(entry, out);
                collect_specs(std::slice::from_ref(b), out);
                collect_specs(exit, out);
            }
            SStmt::SFunc(rec) => collect_specs(std::slice::from_ref(&rec.body), out),
            _ => {}
        }
    }
}

#[test]
fn arithmetic_infers_concrete_types() {
    let prog = ok("x = 1\ny = 2\nz = x + y\n");
    assert!(prog
        .globals
        .iter()
        .any(|b| b.name == "z" && b.ty == Type::Int));
}

#[test]
fn int_plus_string_is_a_type_error() {
    let e = err("x = 1 + \"a\"\n");
    assert!(matches!(e, SemantError::Type(_)));
    assert!(e.to_string().starts_with("STypeError:"));
}

#[test]
fn undefined_name_is_a_name_error() {
    let e = err("print(x)\n");
    assert!(matches!(e, SemantError::Name(_)));
    assert!(e.to_string().contains("name 'x' is not defined"));
}

#[test]
fn unannotated_names_can_change_type() {
    let prog = ok("x = 1\nx = \"hi\"\nprint(x)\n");
    // The second assignment rebinds x at type str.
    let SStmt::SAsn(lvals, _) = &prog.body[1] else {
        panic!("expected assignment");
    };
    assert!(matches!(
        &lvals[0],
        SLval::Var { name, ty: Type::String, .. } if name == "x"
    ));
}

#[test]
fn annotated_names_are_pinned() {
    let e = err("x: int = 1\nx = \"hi\"\n");
    assert!(matches!(e, SemantError::Type(_)));
}

#[test]
fn conflicting_annotations_are_rejected() {
    let e = err("x: int = 1\nx: str = \"s\"\n");
    assert!(matches!(e, SemantError::Type(_)));
}

#[test]
fn first_time_explicit_typing_in_a_branch_is_rejected() {
    let e = err("c = True\nif c:\n    x: int = 1\n");
    assert!(matches!(e, SemantError::Type(_)));
    assert!(e.to_string().contains("conditional"));
}

#[test]
fn dyn_into_annotated_name_requires_a_runtime_check() {
    let prog = ok("d = [1]\nx: int = 0\nx = d[0]\n");
    let SStmt::SAsn(lvals, _) = &prog.body[2] else {
        panic!("expected assignment");
    };
    assert!(matches!(
        &lvals[0],
        SLval::Var { check: Some(Type::Int), .. }
    ));
}

#[test]
fn diverging_branches_emit_transforms() {
    let prog = ok("c = True\nif c:\n    x = 1\nelse:\n    x = \"s\"\nprint(x)\n");
    let SStmt::SIf(_, then, els) = &prog.body[1] else {
        panic!("expected if");
    };
    let SStmt::SBlock(then) = &**then else {
        panic!("expected block");
    };
    let SStmt::SBlock(els) = &**els else {
        panic!("expected block");
    };
    assert!(then
        .iter()
        .any(|s| matches!(s, SStmt::STransform(n, Type::Int, Type::Dyn) if n == "x")));
    assert!(els
        .iter()
        .any(|s| matches!(s, SStmt::STransform(n, Type::String, Type::Dyn) if n == "x")));
    // After the join, the print sees a dyn x.
    let SStmt::SPrint(e) = &prog.body[2] else {
        panic!("expected print");
    };
    assert_eq!(e.ty, Type::Dyn);
}

#[test]
fn agreeing_branches_do_not_dynify() {
    let prog = ok("c = True\nx = 1\nif c:\n    x = 2\nelse:\n    x = 3\nprint(x)\n");
    let SStmt::SPrint(e) = &prog.body[3] else {
        panic!("expected print");
    };
    assert_eq!(e.ty, Type::Int);
}

#[test]
fn loop_retyping_wraps_a_stage() {
    let prog = ok("x = 1\nc = True\nwhile c:\n    x = \"s\"\nprint(x)\n");
    let SStmt::SStage(entry, body, _) = &prog.body[2] else {
        panic!("expected a staged loop, got {:?}", prog.body[2]);
    };
    assert!(entry
        .iter()
        .any(|s| matches!(s, SStmt::STransform(n, Type::Int, Type::Dyn) if n == "x")));
    // The body carries the back-edge transform so every iteration re-enters
    // under the merged mapping.
    let SStmt::SWhile(_, inner) = &**body else {
        panic!("expected while");
    };
    let SStmt::SBlock(inner) = &**inner else {
        panic!("expected block");
    };
    assert!(inner
        .iter()
        .any(|s| matches!(s, SStmt::STransform(n, Type::String, Type::Dyn) if n == "x")));
}

#[test]
fn stable_loops_stay_plain() {
    let prog = ok("x = 1\nc = True\nwhile c:\n    x = 2\nprint(x)\n");
    assert!(matches!(&prog.body[2], SStmt::SWhile(_, _)));
}

#[test]
fn empty_list_is_dyn() {
    let prog = ok("L = []\n");
    assert!(prog
        .globals
        .iter()
        .any(|b| b.name == "L" && b.ty == Type::Dyn));
}

#[test]
fn uniform_list_is_arr() {
    let prog = ok("L = [1, 2, 3]\n");
    assert!(prog
        .globals
        .iter()
        .any(|b| b.name == "L" && b.ty == Type::Arr));
}

#[test]
fn calls_specialize_per_argument_types() {
    let prog = ok("def f(x):\n    return x + 1\nprint(f(1))\nprint(f(1.5))\n");
    let mut specs = Vec::new();
    collect_specs(&prog.body, &mut specs);
    let sigs: Vec<&[Type]> = specs
        .iter()
        .filter(|r| r.name == "f" && !r.sig.iter().all(|t| *t == Type::Dyn))
        .map(|r| r.sig.as_slice())
        .collect();
    assert!(sigs.contains(&&[Type::Int][..]));
    assert!(sigs.contains(&&[Type::Float][..]));
    let int_spec = specs
        .iter()
        .find(|r| r.sig == [Type::Int])
        .expect("int specialization");
    assert_eq!(int_spec.ret, Type::Int);
}

#[test]
fn recursion_falls_back_to_the_generic_path() {
    let prog = ok("def f(n: int) -> int:\n    return f(n)\nprint(f(1))\n");
    let mut specs = Vec::new();
    collect_specs(&prog.body, &mut specs);
    // The call-site specialization exists, and its body's self-call is a
    // stage (memo hit), not a nested specialization of the same key.
    let spec = specs
        .iter()
        .find(|r| r.sig == [Type::Int])
        .expect("specialized instance");
    fn has_stage_call(stmt: &SStmt) -> bool {
        match stmt {
            SStmt::SBlock(b) => b.iter().any(has_stage_call),
            SStmt::SReturn(e) | SStmt::SExpr(e) | SStmt::SPrint(e) => {
                fn expr_has(e: &adder::sast::SExpr) -> bool {
                    match &e.node {
                        SExprKind::SCall(_, _, mode) => matches!(&**mode, SStmt::SStage(_, _, _)),
                        SExprKind::SBinop(l, _, r) => expr_has(l) || expr_has(r),
                        SExprKind::SUnop(_, x) => expr_has(x),
                        _ => false,
                    }
                }
                expr_has(e)
            }
            _ => false,
        }
    }
    assert!(has_stage_call(&spec.body));
}

#[test]
fn generic_calls_dynify_globals_across_the_boundary() {
    let prog = ok("g = 1\ndef f(x):\n    return x\nL = [f]\nprint(L[0](g))\n");
    let mut found = false;
    fn find_stage(stmts: &[SStmt], found: &mut bool) {
        for s in stmts {
            if let SStmt::SPrint(e) = s {
                if let SExprKind::SCall(_, _, mode) = &e.node {
                    if let SStmt::SStage(entry, _, exit) = &**mode {
                        assert!(entry
                            .iter()
                            .any(|t| matches!(t, SStmt::STransform(n, Type::Int, Type::Dyn) if n == "g")));
                        assert!(exit
                            .iter()
                            .any(|t| matches!(t, SStmt::STransform(n, Type::Dyn, Type::Int) if n == "g")));
                        *found = true;
                    }
                }
            }
        }
    }
    find_stage(&prog.body, &mut found);
    assert!(found, "expected a generic staged call");
}

#[test]
fn missing_return_on_annotated_function_is_rejected() {
    let e = err("def f() -> int:\n    pass\n");
    assert!(matches!(e, SemantError::Type(_)));
}

#[test]
fn mismatched_return_type_is_rejected() {
    let e = err("def f() -> int:\n    return \"s\"\n");
    assert!(matches!(e, SemantError::Type(_)));
}

#[test]
fn arity_mismatch_is_rejected() {
    let e = err("def f(a):\n    return a\nf(1, 2)\n");
    assert!(matches!(e, SemantError::Type(_)));
    assert!(e.to_string().contains("takes"));
}

#[test]
fn duplicate_formals_are_rejected() {
    let e = err("def f(a, a):\n    return a\n");
    assert!(matches!(e, SemantError::Syntax(_)));
}

#[test]
fn return_outside_function_is_rejected() {
    let e = err("return 1\n");
    assert!(matches!(e, SemantError::Syntax(_)));
}

#[test]
fn break_outside_loop_is_rejected() {
    let e = err("break\n");
    assert!(matches!(e, SemantError::Syntax(_)));
}

#[test]
fn import_is_not_implemented() {
    let e = err("import os\n");
    assert!(matches!(e, SemantError::NotImplemented(_)));
    assert!(e.to_string().starts_with("SNotImplementedError:"));
}

#[test]
fn classes_are_not_implemented() {
    let e = err("class Foo:\n    pass\n");
    assert!(matches!(e, SemantError::NotImplemented(_)));
}

#[test]
fn for_over_a_list_binds_a_dyn_variable() {
    let prog = ok("for v in [1, 2]:\n    print(v)\n");
    let SStmt::SFor(bind, _, _) = &prog.body[0] else {
        panic!("expected for, got {:?}", prog.body[0]);
    };
    assert_eq!(bind.ty, Type::Dyn);
}

#[test]
fn for_over_a_string_binds_a_string_variable() {
    let prog = ok("s = \"ab\"\nfor c in s:\n    print(c)\n");
    let SStmt::SFor(bind, _, _) = &prog.body[1] else {
        panic!("expected for, got {:?}", prog.body[1]);
    };
    assert_eq!(bind.ty, Type::String);
}

#[test]
fn range_bound_must_be_int() {
    let e = err("for i in range(1.5):\n    pass\n");
    assert!(matches!(e, SemantError::Type(_)));
}

#[test]
fn identity_cast_is_rejected() {
    let e = err("x = 1\ny = int(x)\n");
    assert!(matches!(e, SemantError::Type(_)));
}

#[test]
fn string_to_int_cast_is_rejected() {
    let e = err("s = \"a\"\ny = int(s)\n");
    assert!(matches!(e, SemantError::Type(_)));
}

#[test]
fn numeric_casts_are_allowed() {
    let prog = ok("x = 1\ny = float(x)\nz = str(x)\n");
    assert!(prog
        .globals
        .iter()
        .any(|b| b.name == "y" && b.ty == Type::Float));
    assert!(prog
        .globals
        .iter()
        .any(|b| b.name == "z" && b.ty == Type::String));
}

#[test]
fn non_boolean_if_condition_is_rejected() {
    let e = err("if 1:\n    pass\n");
    assert!(matches!(e, SemantError::Type(_)));
}

#[test]
fn string_order_against_other_types_is_rejected() {
    let e = err("s = \"a\"\nx = s < 1\n");
    assert!(matches!(e, SemantError::Type(_)));
}

#[test]
fn explicit_annotations_stay_within_inferred_types() {
    // For every global the analyzer reports, an annotation either matched
    // the flow type or compilation failed; spot-check the accepted case.
    let prog = ok("x: int = 1\ny = x + 1\n");
    assert!(prog
        .globals
        .iter()
        .any(|b| b.name == "y" && b.ty == Type::Int));
}
