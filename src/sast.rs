//! Annotated AST produced by the semantic pass.
//!
//! Every expression carries its inferred type. Assignment targets are
//! resolved lvalues, calls carry either a specialized function record or a
//! stage of entry/exit transforms, and `STransform` is a dedicated statement
//! that moves a variable between its raw and boxed addresses at runtime.

use std::rc::Rc;

use crate::ast::{Bind, Func, Lit, Op, Type, Uop};

/// A typed expression: the inferred type plus the node itself.
#[derive(Debug, Clone)]
pub struct SExpr {
    pub ty: Type,
    pub node: SExprKind,
}

impl SExpr {
    pub fn new(ty: Type, node: SExprKind) -> Self {
        SExpr { ty, node }
    }

    pub fn noexpr() -> Self {
        SExpr {
            ty: Type::Null,
            node: SExprKind::SNoexpr,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SExprKind {
    SLit(Lit),
    SVar(String),
    SBinop(Box<SExpr>, Op, Box<SExpr>),
    SUnop(Uop, Box<SExpr>),
    /// Callee, arguments, and the lowering mode: an `SStmt::SFunc` holding
    /// the specialized record, or an `SStmt::SStage` holding the entry/exit
    /// transforms of the generic boxed path.
    SCall(Box<SExpr>, Vec<SExpr>, Box<SStmt>),
    /// Elements plus the common element type (`Dyn` when mixed).
    SList(Vec<SExpr>, Type),
    SListAccess(Box<SExpr>, Box<SExpr>),
    /// Cast to the first type from the second.
    SCast(Type, Type, Box<SExpr>),
    SNoexpr,
}

/// Resolved assignment target.
#[derive(Debug, Clone)]
pub enum SLval {
    /// `ty` is the static type of the name after this assignment; `check`
    /// asks the emitter for an explicit-type check before the store (set
    /// when a `Dyn` value flows into a concretely-annotated name).
    Var {
        name: String,
        ty: Type,
        check: Option<Type>,
    },
    Index {
        list: SExpr,
        idx: SExpr,
    },
}

/// A specialized (or generic, when every formal is `Dyn`) function record.
///
/// `source` keeps the identity of the untyped declaration: the emitter's
/// specialization cache is keyed by `(Rc::as_ptr(source), sig)`.
#[derive(Debug, Clone)]
pub struct SFunc {
    pub name: String,
    pub source: Rc<Func>,
    /// Formals with their explicit (annotated) types, enforced at runtime
    /// when a boxed value arrives for a concrete formal.
    pub formals: Vec<Bind>,
    /// The inferred formal types this instance was built for; also the
    /// IR-level signature.
    pub sig: Vec<Type>,
    pub ret: Type,
    /// Non-formal names bound in the body, with the inferred type at their
    /// first binding.
    pub locals: Vec<Bind>,
    pub body: Box<SStmt>,
}

#[derive(Debug, Clone)]
pub enum SStmt {
    SBlock(Vec<SStmt>),
    SExpr(SExpr),
    SAsn(Vec<SLval>, SExpr),
    SIf(SExpr, Box<SStmt>, Box<SStmt>),
    SWhile(SExpr, Box<SStmt>),
    /// Loop variable (with its static element type), list, body.
    SFor(Bind, SExpr, Box<SStmt>),
    SRange(Bind, SExpr, Box<SStmt>),
    SReturn(SExpr),
    SFunc(Rc<SFunc>),
    SPrint(SExpr),
    /// `(name, from, to)`: move the name's live value between its raw and
    /// boxed slots. Output of the dataflow pass, not a language feature.
    STransform(String, Type, Type),
    /// Entry transforms, wrapped statement, exit transforms.
    SStage(Vec<SStmt>, Box<SStmt>, Vec<SStmt>),
    SNop,
    SContinue,
    SBreak,
}

/// Semantic pass output: the annotated top level plus the global bindings
/// the emitter must allocate module slots for.
#[derive(Debug, Clone)]
pub struct SProgram {
    pub body: Vec<SStmt>,
    pub globals: Vec<Bind>,
}
