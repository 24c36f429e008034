//! The semantic pass: flow-sensitive type inference over the untyped AST,
//! producing the annotated SAST.
//!
//! The checker threads a `State` by value through recursive descent, so each
//! branch of a conditional sees an independent copy of the environment and
//! may diverge before `transform::merge_envs` reconciles the worlds at the
//! join. Statically-known calls are checked by re-running the body against
//! the inferred argument types (specialization); a call-stack memo keyed by
//! `(function identity, formal type tuple)` breaks recursion by forcing the
//! generic boxed path instead of iterating to a fixed point.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::ast::{Bind, Expr, Func, Lit, Op, Program, Stmt, Target, Type, Uop};
use crate::error::{SemantError, SemantResult};
use crate::sast::{SExpr, SExprKind, SFunc, SLval, SProgram, SStmt};
use crate::transform::{envs_agree, merge_envs};

/// What the environment tracks per name: the user's annotation (`Dyn` when
/// absent), the current flow-sensitive type, and optionally the AST of the
/// function the name is bound to (used for inline specialization).
#[derive(Debug, Clone)]
pub struct Binding {
    pub explicit: Type,
    pub inferred: Type,
    pub data: Option<Rc<Func>>,
}

impl Binding {
    pub fn dyn_binding() -> Self {
        Binding {
            explicit: Type::Dyn,
            inferred: Type::Dyn,
            data: None,
        }
    }
}

pub type Env = BTreeMap<String, Binding>;

type MemoKey = (usize, Vec<Type>);

#[derive(Debug, Clone)]
pub struct State {
    pub locals: Env,
    pub globals: Env,
    pub in_function: bool,
    pub in_conditional: bool,
    pub in_forloop: bool,
    /// Set while first-pass scanning a function body at its declaration:
    /// unknown names resolve to `Dyn` instead of erroring, deferring
    /// forward-referenced globals to the call sites that specialize.
    pub noeval: bool,
    pub callstack: Vec<MemoKey>,
    /// Observed return type of the function being checked (`None` until a
    /// return statement is seen).
    pub ret: Option<Type>,
    /// Names bound in the current function, in binding order.
    pub new_locals: Vec<Bind>,
    /// Names bound at the top level, in binding order.
    pub new_globals: Vec<Bind>,
}

impl State {
    pub fn new() -> Self {
        State {
            locals: Env::new(),
            globals: Env::new(),
            in_function: false,
            in_conditional: false,
            in_forloop: false,
            noeval: false,
            callstack: Vec::new(),
            ret: None,
            new_locals: Vec::new(),
            new_globals: Vec::new(),
        }
    }

    fn lookup(&self, name: &str) -> Option<&Binding> {
        if self.in_function {
            self.locals.get(name).or_else(|| self.globals.get(name))
        } else {
            self.globals.get(name)
        }
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge observed return types at a join: agreement keeps the type, any
/// disagreement (including one side not returning) degrades to `Dyn`.
fn match_data(a: Option<Type>, b: Option<Type>) -> Option<Type> {
    match (a, b) {
        (None, None) => None,
        (Some(t1), Some(t2)) if t1 == t2 => Some(t1),
        _ => Some(Type::Dyn),
    }
}

/// Check a whole program. Returns the annotated top level plus the global
/// bindings the emitter must allocate slots for.
pub fn check_program(prog: &Program) -> SemantResult<SProgram> {
    let (body, st) = check_stmts(&prog.body, State::new())?;
    Ok(SProgram {
        body,
        globals: st.new_globals,
    })
}

pub fn check_stmts(stmts: &[Stmt], mut st: State) -> SemantResult<(Vec<SStmt>, State)> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        let (sstmt, st2) = check_stmt(stmt, st)?;
        st = st2;
        out.push(sstmt);
    }
    Ok((out, st))
}

fn check_stmt(stmt: &Stmt, mut st: State) -> SemantResult<(SStmt, State)> {
    match stmt {
        Stmt::Nop => Ok((SStmt::SNop, st)),
        Stmt::Block(stmts) => {
            let (body, st) = check_stmts(stmts, st)?;
            Ok((SStmt::SBlock(body), st))
        }
        Stmt::Expr(e) => {
            let (se, _, st) = check_expr(e, st)?;
            Ok((SStmt::SExpr(se), st))
        }
        Stmt::Print(e) => {
            let (se, _, st) = check_expr(e, st)?;
            Ok((SStmt::SPrint(se), st))
        }
        Stmt::Asn(targets, e) => check_asn(targets, e, st),
        Stmt::Type(bind) => check_type_decl(bind, st),
        Stmt::If(cond, then, els) => check_if(cond, then, els, st),
        Stmt::While(cond, body) => {
            let (entry, scond, sbody, exit, st) = check_loop(st, None, Some(cond), body)?;
            let scond = scond.expect("while loop always has a condition");
            wrap_stage(entry, SStmt::SWhile(scond, Box::new(sbody)), exit, st)
        }
        Stmt::For(var, seq, body) => {
            let (sseq, _, st2) = check_expr(seq, st)?;
            st = st2;
            if !(sseq.ty == Type::Dyn || sseq.ty.is_arr()) {
                return Err(SemantError::Type(
                    "unsupported operand type(s) for list access".into(),
                ));
            }
            let elem_ty = if sseq.ty == Type::String {
                Type::String
            } else {
                Type::Dyn
            };
            let (entry, _, sbody, exit, st) = check_loop(st, Some((var.as_str(), elem_ty)), None, body)?;
            let bound_ty = st
                .lookup(var)
                .map(|b| b.inferred)
                .unwrap_or(Type::Dyn);
            wrap_stage(
                entry,
                SStmt::SFor(Bind::new(var.clone(), bound_ty), sseq, Box::new(sbody)),
                exit,
                st,
            )
        }
        Stmt::Range(var, bound, body) => {
            let (sbound, _, st2) = check_expr(bound, st)?;
            st = st2;
            if !matches!(sbound.ty, Type::Int | Type::Dyn) {
                return Err(SemantError::Type(format!(
                    "range() bound must be int, found {}",
                    sbound.ty
                )));
            }
            let (entry, _, sbody, exit, st) = check_loop(st, Some((var.as_str(), Type::Int)), None, body)?;
            let bound_ty = st
                .lookup(var)
                .map(|b| b.inferred)
                .unwrap_or(Type::Int);
            wrap_stage(
                entry,
                SStmt::SRange(Bind::new(var.clone(), bound_ty), sbound, Box::new(sbody)),
                exit,
                st,
            )
        }
        Stmt::Return(e) => {
            if !st.in_function {
                return Err(SemantError::Syntax("return outside function".into()));
            }
            let (se, st2) = match e {
                Some(e) => {
                    let (se, _, st2) = check_expr(e, st)?;
                    (se, st2)
                }
                None => (SExpr::noexpr(), st),
            };
            st = st2;
            // Sequential returns: the first one sets the observed type,
            // later ones merge against it.
            st.ret = match st.ret {
                None => Some(se.ty),
                seen => match_data(seen, Some(se.ty)),
            };
            Ok((SStmt::SReturn(se), st))
        }
        Stmt::Func(func) => check_func_decl(func, st),
        Stmt::Continue => {
            if !st.in_forloop {
                return Err(SemantError::Syntax("continue outside loop".into()));
            }
            Ok((SStmt::SContinue, st))
        }
        Stmt::Break => {
            if !st.in_forloop {
                return Err(SemantError::Syntax("break outside loop".into()));
            }
            Ok((SStmt::SBreak, st))
        }
        Stmt::Import(name) => Err(SemantError::NotImplemented(format!(
            "import of '{}' is not supported",
            name
        ))),
        Stmt::Class(name, _) => Err(SemantError::NotImplemented(format!(
            "class '{}': classes are not supported",
            name
        ))),
    }
}

/// Bind `name` to a value of type `rhs_ty` (optionally annotated `declared`
/// at this assignment). Returns the static type of the name after the
/// assignment and the runtime check the emitter must insert, if any.
fn assign(
    mut st: State,
    name: &str,
    declared: Type,
    rhs_ty: Type,
    data: Option<Rc<Func>>,
) -> SemantResult<(Type, Option<Type>, State)> {
    let existing = st.lookup(name).cloned();
    match existing {
        None => {
            if declared != Type::Dyn && st.in_conditional {
                return Err(SemantError::Type(format!(
                    "cannot introduce explicit type for '{}' inside a conditional branch",
                    name
                )));
            }
            let (inferred, check) = if declared != Type::Dyn {
                if rhs_ty == Type::Dyn {
                    (declared, Some(declared))
                } else if rhs_ty == declared {
                    (declared, None)
                } else {
                    return Err(SemantError::Type(format!(
                        "illegal assignment of {} to {} variable '{}'",
                        rhs_ty, declared, name
                    )));
                }
            } else {
                (rhs_ty, None)
            };
            let binding = Binding {
                explicit: declared,
                inferred,
                data,
            };
            if st.in_function {
                st.locals.insert(name.to_string(), binding);
                st.new_locals.push(Bind::new(name, inferred));
            } else {
                st.globals.insert(name.to_string(), binding);
                st.new_globals.push(Bind::new(name, inferred));
            }
            Ok((inferred, check, st))
        }
        Some(old) => {
            let explicit = if declared != Type::Dyn {
                if old.explicit != Type::Dyn && old.explicit != declared {
                    return Err(SemantError::Type(format!(
                        "conflicting explicit types for '{}': {} and {}",
                        name, old.explicit, declared
                    )));
                }
                if old.explicit == Type::Dyn && st.in_conditional {
                    return Err(SemantError::Type(format!(
                        "cannot introduce explicit type for '{}' inside a conditional branch",
                        name
                    )));
                }
                declared
            } else {
                old.explicit
            };
            let (inferred, check) = if explicit == Type::Dyn {
                (rhs_ty, None)
            } else if rhs_ty == Type::Dyn {
                (explicit, Some(explicit))
            } else if rhs_ty == explicit {
                (rhs_ty, None)
            } else {
                return Err(SemantError::Type(format!(
                    "illegal assignment of {} to {} variable '{}'",
                    rhs_ty, explicit, name
                )));
            };
            let binding = Binding {
                explicit,
                inferred,
                data,
            };
            update_binding(&mut st, name, binding);
            Ok((inferred, check, st))
        }
    }
}

/// Write back a binding to whichever scope currently holds the name.
/// Assignment in function scope to a name bound only globally mutates the
/// global; a new local is only created for names unknown in both scopes.
fn update_binding(st: &mut State, name: &str, binding: Binding) {
    if st.in_function && st.locals.contains_key(name) {
        st.locals.insert(name.to_string(), binding);
    } else if st.globals.contains_key(name) {
        st.globals.insert(name.to_string(), binding);
    } else if st.in_function {
        st.locals.insert(name.to_string(), binding);
    } else {
        st.globals.insert(name.to_string(), binding);
    }
}

fn check_asn(targets: &[Target], e: &Expr, st: State) -> SemantResult<(SStmt, State)> {
    let (se, data, mut st) = check_expr(e, st)?;
    let mut lvals = Vec::with_capacity(targets.len());
    for target in targets {
        match target {
            Target::Name(name, declared) => {
                let (ty, check, st2) = assign(st, name, *declared, se.ty, data.clone())?;
                st = st2;
                lvals.push(SLval::Var {
                    name: name.clone(),
                    ty,
                    check,
                });
            }
            Target::Index(lexpr, iexpr) => {
                let (sl, _, st2) = check_expr(lexpr, st)?;
                st = st2;
                if !(sl.ty == Type::Dyn || sl.ty.is_arr()) {
                    return Err(SemantError::Type(
                        "unsupported operand type(s) for list access".into(),
                    ));
                }
                let (si, _, st2) = check_expr(iexpr, st)?;
                st = st2;
                if !matches!(si.ty, Type::Int | Type::Dyn) {
                    return Err(SemantError::Type(
                        "unsupported operand type(s) for list access".into(),
                    ));
                }
                lvals.push(SLval::Index { list: sl, idx: si });
            }
        }
    }
    Ok((SStmt::SAsn(lvals, se), st))
}

fn check_type_decl(bind: &Bind, mut st: State) -> SemantResult<(SStmt, State)> {
    if st.in_conditional {
        return Err(SemantError::Type(format!(
            "cannot introduce explicit type for '{}' inside a conditional branch",
            bind.name
        )));
    }
    match st.lookup(&bind.name).cloned() {
        Some(old) => {
            if old.explicit != Type::Dyn && old.explicit != bind.ty {
                return Err(SemantError::Type(format!(
                    "conflicting explicit types for '{}': {} and {}",
                    bind.name, old.explicit, bind.ty
                )));
            }
            if old.inferred != Type::Dyn && old.inferred != bind.ty {
                return Err(SemantError::Type(format!(
                    "illegal assignment of {} to {} variable '{}'",
                    old.inferred, bind.ty, bind.name
                )));
            }
            update_binding(
                &mut st,
                &bind.name,
                Binding {
                    explicit: bind.ty,
                    inferred: bind.ty,
                    data: old.data,
                },
            );
        }
        None => {
            let binding = Binding {
                explicit: bind.ty,
                inferred: bind.ty,
                data: None,
            };
            if st.in_function {
                st.locals.insert(bind.name.clone(), binding);
                st.new_locals.push(bind.clone());
            } else {
                st.globals.insert(bind.name.clone(), binding);
                st.new_globals.push(bind.clone());
            }
        }
    }
    Ok((SStmt::SNop, st))
}

fn check_if(
    cond: &Expr,
    then: &[Stmt],
    els: &[Stmt],
    st: State,
) -> SemantResult<(SStmt, State)> {
    let (scond, _, st) = check_expr(cond, st)?;
    if !matches!(scond.ty, Type::Bool | Type::Dyn) {
        return Err(SemantError::Type(
            "invalid boolean type in if statement".into(),
        ));
    }

    let mut st_a_in = st.clone();
    st_a_in.in_conditional = true;
    let (sthen, st_a) = check_stmts(then, st_a_in)?;

    let mut st_b_in = st.clone();
    st_b_in.in_conditional = true;
    // The callstack is balanced across a branch, so starting from `st` is
    // equivalent to starting from `st_a`'s.
    let (sels, st_b) = check_stmts(els, st_b_in)?;

    let mut out = st_a.clone();
    out.in_conditional = st.in_conditional;
    out.ret = match_data(st_a.ret, st_b.ret);
    out.new_locals = union_binds(&st_a.new_locals, &st_b.new_locals);
    out.new_globals = union_binds(&st_a.new_globals, &st_b.new_globals);

    if envs_agree(&st_a.locals, &st_b.locals) && envs_agree(&st_a.globals, &st_b.globals) {
        return Ok((
            SStmt::SIf(
                scond,
                Box::new(SStmt::SBlock(sthen)),
                Box::new(SStmt::SBlock(sels)),
            ),
            out,
        ));
    }

    let ml = merge_envs(&st_a.locals, &st_b.locals);
    let mg = merge_envs(&st_a.globals, &st_b.globals);

    let mut then_block = sthen;
    then_block.extend(ml.tx_a);
    then_block.extend(mg.tx_a);
    let mut else_block = sels;
    else_block.extend(ml.tx_b);
    else_block.extend(mg.tx_b);

    out.locals = ml.env;
    out.globals = mg.env;
    mark_dyn_binds(&mut out.new_locals, &ml.new_dyn);
    mark_dyn_binds(&mut out.new_globals, &mg.new_dyn);

    Ok((
        SStmt::SIf(
            scond,
            Box::new(SStmt::SBlock(then_block)),
            Box::new(SStmt::SBlock(else_block)),
        ),
        out,
    ))
}

/// Union of two detected-binding lists that share a common prefix.
fn union_binds(a: &[Bind], b: &[Bind]) -> Vec<Bind> {
    let mut out = a.to_vec();
    for bind in b {
        if !out.iter().any(|x| x.name == bind.name) {
            out.push(bind.clone());
        }
    }
    out
}

/// Rewrite the recorded type of join-created dyn bindings so slot allocation
/// starts them boxed (pointing at the sentinel) instead of raw.
fn mark_dyn_binds(binds: &mut [Bind], new_dyn: &[String]) {
    for bind in binds.iter_mut() {
        if new_dyn.contains(&bind.name) {
            bind.ty = Type::Dyn;
        }
    }
}

fn wrap_stage(
    entry: Vec<SStmt>,
    body: SStmt,
    exit: Vec<SStmt>,
    st: State,
) -> SemantResult<(SStmt, State)> {
    if entry.is_empty() && exit.is_empty() {
        Ok((body, st))
    } else {
        Ok((SStmt::SStage(entry, Box::new(body), exit), st))
    }
}

/// Shared loop checking. First-passes the body; when the post-body
/// environment differs from the pre-loop one, dynifies the affected names
/// before the loop, re-passes the body under the merged environment until it
/// stabilizes, and appends the back-edge transforms to the body so every
/// iteration re-enters under the merged name-to-address mapping.
///
/// Returns `(entry transforms, checked condition, body, exit transforms,
/// state)`. The condition (when given) is checked under the stabilized
/// environment.
fn check_loop(
    st: State,
    bind_var: Option<(&str, Type)>,
    cond: Option<&Expr>,
    body: &[Stmt],
) -> SemantResult<(Vec<SStmt>, Option<SExpr>, SStmt, Vec<SStmt>, State)> {
    let mut st0 = st.clone();
    if let Some((name, ty)) = bind_var {
        let (_, _, st2) = assign(st0, name, Type::Dyn, ty, None)?;
        st0 = st2;
    }

    let check_cond = |cur: State, which: &str| -> SemantResult<(Option<SExpr>, State)> {
        match cond {
            Some(c) => {
                let (sc, _, cur) = check_expr(c, cur)?;
                if !matches!(sc.ty, Type::Bool | Type::Dyn) {
                    return Err(SemantError::Type(format!(
                        "invalid boolean type in {} statement",
                        which
                    )));
                }
                Ok((Some(sc), cur))
            }
            None => Ok((None, cur)),
        }
    };

    // First pass from the pre-loop environment.
    let mut pass_in = st0.clone();
    pass_in.in_conditional = true;
    pass_in.in_forloop = true;
    let (sbody1, st1) = check_stmts(body, pass_in)?;

    if envs_agree(&st0.locals, &st1.locals) && envs_agree(&st0.globals, &st1.globals) {
        let mut out = st1;
        out.in_conditional = st.in_conditional;
        out.in_forloop = st.in_forloop;
        out.ret = match_data(st0.ret, out.ret);
        let (scond, out) = check_cond(out, "while")?;
        return Ok((Vec::new(), scond, SStmt::SBlock(sbody1), Vec::new(), out));
    }

    // Dynify the names the body re-types, then re-pass to stabilize.
    let ml = merge_envs(&st0.locals, &st1.locals);
    let mg = merge_envs(&st0.globals, &st1.globals);
    let mut entry: Vec<SStmt> = ml.tx_a;
    entry.extend(mg.tx_a);

    let mut cur = st1;
    cur.locals = ml.env;
    cur.globals = mg.env;
    cur.ret = st0.ret;
    mark_dyn_binds(&mut cur.new_locals, &ml.new_dyn);
    mark_dyn_binds(&mut cur.new_globals, &mg.new_dyn);

    loop {
        let mut pass_in = cur.clone();
        pass_in.in_conditional = true;
        pass_in.in_forloop = true;
        let (sbody, post) = check_stmts(body, pass_in)?;

        let ml = merge_envs(&cur.locals, &post.locals);
        let mg = merge_envs(&cur.globals, &post.globals);
        if envs_agree(&ml.env, &cur.locals) && envs_agree(&mg.env, &cur.globals) {
            let mut body_block = sbody;
            body_block.extend(ml.tx_b);
            body_block.extend(mg.tx_b);

            let mut out = post;
            out.locals = ml.env;
            out.globals = mg.env;
            out.in_conditional = st.in_conditional;
            out.in_forloop = st.in_forloop;
            out.ret = match_data(st0.ret, out.ret);
            let (scond, out) = check_cond(out, "while")?;
            return Ok((entry, scond, SStmt::SBlock(body_block), Vec::new(), out));
        }

        entry.extend(ml.tx_a);
        entry.extend(mg.tx_a);
        let mut next = post;
        next.locals = ml.env;
        next.globals = mg.env;
        next.ret = st0.ret;
        mark_dyn_binds(&mut next.new_locals, &ml.new_dyn);
        mark_dyn_binds(&mut next.new_globals, &mg.new_dyn);
        cur = next;
    }
}

fn dup_formal(func: &Func) -> Option<&str> {
    for (i, f) in func.formals.iter().enumerate() {
        if func.formals[..i].iter().any(|g| g.name == f.name) {
            return Some(&f.name);
        }
    }
    None
}

/// Check a function declaration: bind the name, then produce the generic
/// (all-`Dyn` formals) instance under `noeval` so forward references inside
/// the body defer to call sites.
fn check_func_decl(func: &Rc<Func>, st: State) -> SemantResult<(SStmt, State)> {
    if let Some(name) = dup_formal(func) {
        return Err(SemantError::Syntax(format!(
            "duplicate formal '{}' in {}()",
            name, func.name
        )));
    }
    let (_, _, st) = assign(st, &func.name, Type::Dyn, Type::FuncType, Some(func.clone()))?;

    let args: Vec<(Type, Option<Rc<Func>>)> = func.formals.iter().map(|_| (Type::Dyn, None)).collect();
    let (record, st) = specialize(func, &args, true, st)?;
    let record = record.expect("declaration pass is never already on the call stack");
    Ok((SStmt::SFunc(record), st))
}

/// Transforms that dynify every currently-tracked global across a generic
/// call boundary and restore them afterwards.
fn global_stage_transforms(st: &State) -> (Vec<SStmt>, Vec<SStmt>) {
    let mut entry = Vec::new();
    let mut exit = Vec::new();
    for (name, b) in &st.globals {
        if b.inferred != Type::Dyn {
            entry.push(SStmt::STransform(name.clone(), b.inferred, Type::Dyn));
            exit.push(SStmt::STransform(name.clone(), Type::Dyn, b.inferred));
        }
    }
    (entry, exit)
}

/// Re-check `func`'s body against the given argument types, producing a
/// specialized record. Returns `None` when the memo key is already on the
/// call stack (the caller must fall back to the generic path).
fn specialize(
    func: &Rc<Func>,
    args: &[(Type, Option<Rc<Func>>)],
    noeval: bool,
    mut st: State,
) -> SemantResult<(Option<Rc<SFunc>>, State)> {
    // Enter the function scope: locals cleared so the formal annotations
    // win, globals kept with their explicit types cleared to Dyn.
    let saved_locals = std::mem::take(&mut st.locals);
    let saved_flags = (st.in_function, st.in_conditional, st.in_forloop, st.noeval);
    let saved_ret = st.ret.take();
    let saved_new_locals = std::mem::take(&mut st.new_locals);
    let saved_explicits: Vec<(String, Type)> = st
        .globals
        .iter()
        .map(|(k, b)| (k.clone(), b.explicit))
        .collect();
    for b in st.globals.values_mut() {
        b.explicit = Type::Dyn;
    }
    st.in_function = true;
    st.in_conditional = false;
    st.in_forloop = false;
    st.noeval = st.noeval || noeval;

    let mut sig = Vec::with_capacity(args.len());
    for (formal, (aty, adata)) in func.formals.iter().zip(args) {
        let (bound_ty, _, st2) = assign(st, &formal.name, formal.ty, *aty, adata.clone())?;
        st = st2;
        sig.push(bound_ty);
    }

    let restore = |mut st: State| -> State {
        st.locals = saved_locals.clone();
        st.in_function = saved_flags.0;
        st.in_conditional = saved_flags.1;
        st.in_forloop = saved_flags.2;
        st.noeval = saved_flags.3;
        st.ret = saved_ret;
        st.new_locals = saved_new_locals.clone();
        for (name, exp) in &saved_explicits {
            if let Some(b) = st.globals.get_mut(name) {
                // Only restore annotations the callee left consistent.
                if *exp == Type::Dyn || b.inferred == *exp {
                    b.explicit = *exp;
                }
            }
        }
        st
    };

    let key: MemoKey = (Rc::as_ptr(func) as usize, sig.clone());
    if st.callstack.contains(&key) {
        return Ok((None, restore(st)));
    }

    st.callstack.push(key);
    let (sbody, mut st) = check_stmts(&func.body, st)?;
    st.callstack.pop();

    let observed = st.ret;
    let ret_ty = match (func.ret, observed) {
        (Type::Dyn, None) => Type::Dyn,
        (Type::Dyn, Some(t)) => t,
        (d, None) => {
            return Err(SemantError::Type(format!(
                "function '{}' must return {}",
                func.name, d
            )));
        }
        (d, Some(t)) if t == d || t == Type::Dyn => d,
        (d, Some(t)) => {
            return Err(SemantError::Type(format!(
                "invalid return type for '{}': expected {}, found {}",
                func.name, d, t
            )));
        }
    };

    let locals = st.new_locals.clone();
    let st = restore(st);

    let record = Rc::new(SFunc {
        name: func.name.clone(),
        source: func.clone(),
        formals: func.formals.clone(),
        sig,
        ret: ret_ty,
        locals,
        body: Box::new(SStmt::SBlock(sbody)),
    });
    Ok((Some(record), st))
}

fn check_call(callee: &Expr, args: &[Expr], st: State) -> SemantResult<(SExpr, State)> {
    let (scallee, data, mut st) = check_expr(callee, st)?;
    if !matches!(scallee.ty, Type::FuncType | Type::Dyn) {
        return Err(SemantError::Type(format!(
            "'{}' object is not callable",
            scallee.ty
        )));
    }

    let mut sargs = Vec::with_capacity(args.len());
    let mut arg_info = Vec::with_capacity(args.len());
    for arg in args {
        let (sa, d, st2) = check_expr(arg, st)?;
        st = st2;
        arg_info.push((sa.ty, d));
        sargs.push(sa);
    }

    if let Some(func) = data {
        if func.formals.len() != sargs.len() {
            return Err(SemantError::Type(format!(
                "{}() takes {} arguments ({} given)",
                func.name,
                func.formals.len(),
                sargs.len()
            )));
        }
        if let Some(name) = dup_formal(&func) {
            return Err(SemantError::Syntax(format!(
                "duplicate formal '{}' in {}()",
                name, func.name
            )));
        }
        let (record, st) = specialize(&func, &arg_info, false, st)?;
        if let Some(record) = record {
            let ty = record.ret;
            return Ok((
                SExpr::new(
                    ty,
                    SExprKind::SCall(Box::new(scallee), sargs, Box::new(SStmt::SFunc(record))),
                ),
                st,
            ));
        }
        // Memo hit: break recursion through the generic path.
        let (entry, exit) = global_stage_transforms(&st);
        return Ok((
            SExpr::new(
                Type::Dyn,
                SExprKind::SCall(
                    Box::new(scallee),
                    sargs,
                    Box::new(SStmt::SStage(entry, Box::new(SStmt::SNop), exit)),
                ),
            ),
            st,
        ));
    }

    // Callee unknown at compile time: generic boxed call, with every
    // tracked global dynified across the boundary and restored after.
    let (entry, exit) = global_stage_transforms(&st);
    Ok((
        SExpr::new(
            Type::Dyn,
            SExprKind::SCall(
                Box::new(scallee),
                sargs,
                Box::new(SStmt::SStage(entry, Box::new(SStmt::SNop), exit)),
            ),
        ),
        st,
    ))
}

fn binop_type(l: Type, op: Op, r: Type) -> SemantResult<Type> {
    use Op::*;
    use Type::*;
    if l == Dyn || r == Dyn {
        return Ok(Dyn);
    }
    let fail = || {
        Err(SemantError::Type(format!(
            "unsupported operand type(s) for binary {}: {} and {}",
            op, l, r
        )))
    };
    match op {
        Add | Sub | Mul | Exp => match (l, r) {
            (Int, Int) => Ok(Int),
            (Float, Float) => Ok(Float),
            (Bool, Bool) => Ok(Bool),
            (Int, Bool) | (Bool, Int) => Ok(Int),
            (Int, Float) | (Float, Int) => Ok(Float),
            (String, String) if op == Add => Ok(String),
            (Arr, Arr) if op == Add => Ok(Arr),
            (Arr, Int) if op == Mul => Ok(Arr),
            (String, Int) if op == Mul => Ok(String),
            _ => fail(),
        },
        Div => match (l, r) {
            (Int, Int) => Ok(Int),
            (Float, Float) => Ok(Float),
            (Int, Bool) | (Bool, Int) => Ok(Int),
            (Int, Float) | (Float, Int) => Ok(Float),
            _ => fail(),
        },
        Eq | Neq | Less | Leq | Greater | Geq => {
            if l == r {
                Ok(Bool)
            } else {
                fail()
            }
        }
        And | Or => {
            if l == r {
                Ok(l)
            } else {
                fail()
            }
        }
    }
}

pub fn check_expr(
    expr: &Expr,
    mut st: State,
) -> SemantResult<(SExpr, Option<Rc<Func>>, State)> {
    match expr {
        Expr::Lit(lit) => {
            let ty = match lit {
                Lit::Int(_) => Type::Int,
                Lit::Float(_) => Type::Float,
                Lit::Bool(_) => Type::Bool,
                Lit::Str(_) => Type::String,
            };
            Ok((SExpr::new(ty, SExprKind::SLit(lit.clone())), None, st))
        }
        Expr::Var(name) => match st.lookup(name).cloned() {
            Some(b) => {
                let se = SExpr::new(b.inferred, SExprKind::SVar(name.clone()));
                Ok((se, b.data, st))
            }
            None if st.noeval => Ok((
                SExpr::new(Type::Dyn, SExprKind::SVar(name.clone())),
                None,
                st,
            )),
            None => Err(SemantError::Name(format!(
                "name '{}' is not defined",
                name
            ))),
        },
        Expr::Binop(l, op, r) => {
            let (sl, _, st2) = check_expr(l, st)?;
            let (sr, _, st3) = check_expr(r, st2)?;
            st = st3;
            let ty = binop_type(sl.ty, *op, sr.ty)?;
            Ok((
                SExpr::new(ty, SExprKind::SBinop(Box::new(sl), *op, Box::new(sr))),
                None,
                st,
            ))
        }
        Expr::Unop(uop, e) => {
            let (se, _, st2) = check_expr(e, st)?;
            st = st2;
            let ty = match uop {
                Uop::Neg => match se.ty {
                    Type::Int | Type::Float | Type::Bool | Type::Dyn => se.ty,
                    other => {
                        return Err(SemantError::Type(format!(
                            "unsupported operand type for unary -: {}",
                            other
                        )));
                    }
                },
                // `not` preserves the operand type.
                Uop::Not => se.ty,
            };
            Ok((
                SExpr::new(ty, SExprKind::SUnop(*uop, Box::new(se))),
                None,
                st,
            ))
        }
        Expr::Call(callee, args) => {
            let (se, st) = check_call(callee, args, st)?;
            Ok((se, None, st))
        }
        Expr::List(elems) => {
            let mut selems = Vec::with_capacity(elems.len());
            for e in elems {
                let (se, _, st2) = check_expr(e, st)?;
                st = st2;
                selems.push(se);
            }
            if selems.is_empty() {
                // Empty literals never specialize.
                return Ok((
                    SExpr::new(Type::Dyn, SExprKind::SList(selems, Type::Dyn)),
                    None,
                    st,
                ));
            }
            let first = selems[0].ty;
            let elem_ty = if selems.iter().all(|e| e.ty == first) {
                first
            } else {
                Type::Dyn
            };
            Ok((
                SExpr::new(Type::Arr, SExprKind::SList(selems, elem_ty)),
                None,
                st,
            ))
        }
        Expr::ListAccess(l, i) => {
            let (sl, _, st2) = check_expr(l, st)?;
            st = st2;
            if !(sl.ty == Type::Dyn || sl.ty.is_arr()) {
                return Err(SemantError::Type(
                    "unsupported operand type(s) for list access".into(),
                ));
            }
            let (si, _, st2) = check_expr(i, st)?;
            st = st2;
            if !matches!(si.ty, Type::Int | Type::Dyn) {
                return Err(SemantError::Type(
                    "unsupported operand type(s) for list access".into(),
                ));
            }
            let ty = if sl.ty == Type::String {
                Type::String
            } else {
                Type::Dyn
            };
            Ok((
                SExpr::new(ty, SExprKind::SListAccess(Box::new(sl), Box::new(si))),
                None,
                st,
            ))
        }
        Expr::Cast(to, e) => {
            let (se, _, st2) = check_expr(e, st)?;
            st = st2;
            let from = se.ty;
            if matches!(
                to,
                Type::Dyn | Type::Arr | Type::FuncType | Type::Null | Type::Object
            ) {
                return Err(SemantError::Type(format!("cannot cast to {}", to)));
            }
            let numeric_pair = from.is_numeric() && to.is_numeric();
            if from == *to || !(from == Type::Dyn || numeric_pair || *to == Type::String) {
                return Err(SemantError::Type(format!(
                    "cannot cast {} to {}",
                    from, to
                )));
            }
            Ok((
                SExpr::new(*to, SExprKind::SCast(*to, from, Box::new(se))),
                None,
                st,
            ))
        }
        Expr::Field(_, name) => Err(SemantError::NotImplemented(format!(
            "attribute access '.{}': classes are not supported",
            name
        ))),
        Expr::Method(_, name, _) => Err(SemantError::NotImplemented(format!(
            "method call '.{}()': classes are not supported",
            name
        ))),
    }
}
