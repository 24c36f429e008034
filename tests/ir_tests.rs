mod common;

use common::{gen_ir_for_source, gen_ir_no_checks};

#[test]
fn raw_int_addition_stays_unboxed() {
    let ir = gen_ir_for_source("x = 1\ny = 2\nprint(x + y)\n").unwrap();
    assert!(ir.contains("define i32 @main()"), "missing main: {}", ir);
    assert!(ir.contains("add i32"), "expected raw add in IR: {}", ir);
    assert!(ir.contains("@x.raw"), "expected raw global slot: {}", ir);
}

#[test]
fn main_returns_zero() {
    let ir = gen_ir_for_source("x = 1\n").unwrap();
    assert!(ir.contains("ret i32 0"));
}

#[test]
fn ctype_tables_are_statically_initialized() {
    let ir = gen_ir_for_source("x = 1\n").unwrap();
    for table in [
        "@ctype.int",
        "@ctype.float",
        "@ctype.bool",
        "@ctype.char",
        "@ctype.list",
        "@ctype.str",
        "@ctype.func",
    ] {
        assert!(ir.contains(table), "missing {}: {}", table, ir);
    }
    // Populated and null slots both appear.
    assert!(ir.contains("@int.add"));
    assert!(ir.contains("ptr null"));
    // The call trampoline only lives in the func table.
    assert!(ir.contains("@func.call"));
}

#[test]
fn annotated_function_specializes_once() {
    let src = "def f(a: int) -> int:\n    return a + 1\nprint(f(5))\nprint(f(6))\n";
    let ir = gen_ir_for_source(src).unwrap();
    assert!(
        ir.contains("define i32 @f.int(i32"),
        "expected specialized signature: {}",
        ir
    );
    assert_eq!(
        ir.matches("define i32 @f.int(").count(),
        1,
        "one instance per cache key: {}",
        ir
    );
    // The generic boxed form is always emitted alongside.
    assert!(ir.contains("@f.gen(ptr"), "expected generic form: {}", ir);
}

#[test]
fn untyped_function_specializes_per_call_types() {
    let src = "def f(x):\n    return x + 1\nprint(f(1))\nprint(f(1.5))\n";
    let ir = gen_ir_for_source(src).unwrap();
    assert!(ir.contains("define i32 @f.int(i32"), "{}", ir);
    assert!(ir.contains("define double @f.float(double"), "{}", ir);
}

#[test]
fn string_literals_build_cstrings() {
    let ir = gen_ir_for_source("s = \"hi\"\nprint(s)\n").unwrap();
    assert!(ir.contains("@str.new"), "{}", ir);
    assert!(ir.contains("@str.print"), "{}", ir);
}

#[test]
fn rebinding_moves_to_the_boxed_slot() {
    let ir = gen_ir_for_source("x = 1\nx = \"hi\"\nprint(x)\n").unwrap();
    assert!(ir.contains("@x.raw"), "{}", ir);
    assert!(ir.contains("@x.box"), "{}", ir);
    assert!(ir.contains("@str.new"), "{}", ir);
}

#[test]
fn bounds_checks_are_emitted_inside_index_thunks() {
    let ir = gen_ir_for_source("L = [1, 2, 3]\nL[5]\n").unwrap();
    assert!(
        ir.contains("RuntimeError: list index out of bounds"),
        "{}",
        ir
    );
    assert!(ir.contains("@exit") || ir.contains("call i32 @exit"), "{}", ir);
}

#[test]
fn checks_vanish_when_disabled() {
    let ir = gen_ir_no_checks("L = [1, 2, 3]\nL[5]\n").unwrap();
    assert!(!ir.contains("RuntimeError"), "{}", ir);
}

#[test]
fn defined_checks_guard_boxed_reads() {
    let src = "c = True\nif c:\n    x = 1\nelse:\n    x = \"s\"\nprint(x)\n";
    let ir = gen_ir_for_source(src).unwrap();
    assert!(ir.contains("if.then"), "{}", ir);
    assert!(ir.contains("if.merge"), "{}", ir);
    assert!(
        ir.contains("RuntimeError: name 'x' is not defined"),
        "{}",
        ir
    );
}

#[test]
fn loops_lower_to_cond_body_blocks() {
    let ir = gen_ir_for_source("c = True\nwhile c:\n    c = False\n").unwrap();
    assert!(ir.contains("while.cond"), "{}", ir);
    assert!(ir.contains("while.body"), "{}", ir);

    let ir = gen_ir_for_source("for i in range(3):\n    print(i)\n").unwrap();
    assert!(ir.contains("range.cond"), "{}", ir);

    let ir = gen_ir_for_source("for v in [1, 2]:\n    print(v)\n").unwrap();
    assert!(ir.contains("for.cond"), "{}", ir);
}

#[test]
fn float_comparisons_use_unordered_predicates() {
    let ir = gen_ir_for_source("a = 1.5\nb = 2.5\nprint(a < b)\n").unwrap();
    assert!(ir.contains("fcmp ult"), "{}", ir);
}

#[test]
fn exponentiation_round_trips_through_pow() {
    let ir = gen_ir_for_source("a = 2\nb = 3\nprint(a ** b)\n").unwrap();
    assert!(ir.contains("@pow"), "{}", ir);
    assert!(ir.contains("fptosi"), "{}", ir);
}

#[test]
fn generic_calls_pack_an_argv_array() {
    let src = "def f(x):\n    return x\nL = [f]\nprint(L[0](1))\n";
    let ir = gen_ir_for_source(src).unwrap();
    assert!(ir.contains("argv"), "{}", ir);
    assert!(
        ir.contains("RuntimeError: unsupported operand type(s) for binary call"),
        "{}",
        ir
    );
}

#[test]
fn loop_dynification_heapifies_on_use() {
    let src = "x = 1\nc = True\nwhile c:\n    x = \"s\"\n    c = False\nprint(x)\n";
    let ir = gen_ir_for_source(src).unwrap();
    // The entry transform boxes the raw slot in place; the later use goes
    // through the heapify slot.
    assert!(ir.contains("heapify"), "{}", ir);
    assert!(ir.contains("@x.box"), "{}", ir);
}

#[test]
fn dispatch_guards_on_dyn_operands() {
    let src = "d = [1]\nx = d[0]\nprint(x + 1)\n";
    let ir = gen_ir_for_source(src).unwrap();
    assert!(
        ir.contains("RuntimeError: unsupported operand type(s) for binary +"),
        "{}",
        ir
    );
}

#[test]
fn explicit_type_checks_on_dyn_assignment() {
    let src = "d = [1]\nx: int = 0\nx = d[0]\n";
    let ir = gen_ir_for_source(src).unwrap();
    assert!(
        ir.contains("RuntimeError: invalid type assigned to x"),
        "{}",
        ir
    );
}

#[test]
fn return_type_checks_use_the_expected_type() {
    let src = "def f(n: int) -> int:\n    return f(n)\nprint(f(1))\n";
    let ir = gen_ir_for_source(src).unwrap();
    assert!(
        ir.contains("RuntimeError: invalid return type (expected int)"),
        "{}",
        ir
    );
}

#[test]
fn sdiv_for_integer_division() {
    let ir = gen_ir_for_source("a = 7\nb = 2\nprint(a / b)\n").unwrap();
    assert!(ir.contains("sdiv i32"), "{}", ir);
}

#[test]
fn list_literals_allocate_and_box_elements() {
    let ir = gen_ir_for_source("L = [1, 2]\nprint(L)\n").unwrap();
    assert!(ir.contains("@ctype.list"), "{}", ir);
    assert!(ir.contains("@list.print"), "{}", ir);
}

#[test]
fn indexed_stores_go_through_idx_parent() {
    let ir = gen_ir_for_source("L = [1, 2]\nL[0] = 5\n").unwrap();
    assert!(ir.contains("@list.idx_parent"), "{}", ir);
}
