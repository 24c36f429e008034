//! LLVM IR emission for the annotated AST.
//!
//! Every value is representable as a `CObj` (a data pointer plus a pointer
//! to the `CType` dispatch table of its runtime type), and operations
//! dispatch through the table unless static types let the emitter use raw
//! machine values and direct calls instead. Each name owns up to two
//! addresses: a raw slot for unboxed primitives and a boxed slot holding a
//! `CObj*`; `Transform` statements and assignments move liveness between
//! them.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::types::{
    ArrayType, BasicMetadataTypeEnum, BasicTypeEnum, FloatType, IntType, PointerType, StructType,
};
use inkwell::values::{BasicValueEnum, FunctionValue, GlobalValue, PointerValue};
use inkwell::AddressSpace;

use crate::ast::{Bind, Type};
use crate::diagnostics::Diagnostic;
use crate::sast::{SFunc, SProgram};

pub mod ctype;
pub mod expr;
pub mod helpers;
pub mod stmt;

pub type CgResult<T> = Result<T, Diagnostic>;

/// Runtime primitive kinds. One statically-initialized `CType` dispatch
/// table exists per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rt {
    Int,
    Float,
    Bool,
    Char,
    List,
    Str,
    Func,
}

/// A lowered value: an unboxed machine value with its static type, or a
/// pointer to a `CObj`.
#[derive(Debug, Clone, Copy)]
pub enum RVal<'a> {
    Raw(BasicValueEnum<'a>, Type),
    Boxed(PointerValue<'a>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Live {
    Raw,
    Boxed,
}

/// The addresses of one name. The boxed slot always exists and starts out
/// pointing at the all-null sentinel object; the raw slot exists when the
/// recorded type is a machine primitive, or once a transform needs one.
/// At any program point exactly one of the two is live.
#[derive(Debug, Clone)]
pub struct VarSlots<'a> {
    pub raw: Option<(PointerValue<'a>, Type)>,
    pub boxed: PointerValue<'a>,
    pub live: Live,
    /// Set when the boxed slot holds an object whose data field references
    /// the raw slot's storage; the next use must heapify it.
    pub needs_heapify: bool,
}

pub struct LoopCtx<'a> {
    pub cont: BasicBlock<'a>,
    pub brk: BasicBlock<'a>,
}

/// Per-function emission context.
pub struct FnCtx<'a> {
    pub function: FunctionValue<'a>,
    pub vars: HashMap<String, VarSlots<'a>>,
    pub ret_ty: Type,
    /// Generic-convention functions always return a boxed value.
    pub generic: bool,
    pub loops: Vec<LoopCtx<'a>>,
    /// Canonical raw slot per `(name, type)`. Unlike `vars`, never rolled
    /// back at branch joins, so both arms of a conditional share one
    /// entry-block alloca.
    pub raw_registry: HashMap<(String, Type), PointerValue<'a>>,
}

impl<'a> FnCtx<'a> {
    pub fn new(function: FunctionValue<'a>, ret_ty: Type, generic: bool) -> Self {
        FnCtx {
            function,
            vars: HashMap::new(),
            ret_ty,
            generic,
            loops: Vec::new(),
            raw_registry: HashMap::new(),
        }
    }
}

/// Branch-local addressing state, saved and restored around conditionals.
pub type Snapshot<'a> = (
    HashMap<String, VarSlots<'a>>,
    HashMap<String, VarSlots<'a>>,
);

pub struct CodeGen<'a> {
    pub context: &'a Context,
    pub module: Module<'a>,
    pub builder: Builder<'a>,
    /// Emit the runtime checks (defined-use, slot, operand type, explicit
    /// type, bounds). Cleared by `--no-checks`.
    pub exceptions: bool,

    pub i8_t: IntType<'a>,
    pub i32_t: IntType<'a>,
    pub i64_t: IntType<'a>,
    pub bool_t: IntType<'a>,
    pub f64_t: FloatType<'a>,
    pub ptr_t: PointerType<'a>,
    /// `{ data: ptr, type: ptr }`
    pub cobj_t: StructType<'a>,
    /// `{ data: ptr, len: i32, cap: i32 }`; strings share the layout.
    pub clist_t: StructType<'a>,
    /// `[20 x ptr]`, one slot per primitive operation.
    pub ctype_t: ArrayType<'a>,

    /// The shared all-null sentinel: a boxed slot pointing here means
    /// "defined but uninitialized".
    pub null_obj: GlobalValue<'a>,

    ctype_globals: HashMap<Rt, GlobalValue<'a>>,
    /// Operator thunks, for direct calls when static types are known.
    pub(crate) thunks: RefCell<HashMap<(Rt, u32), FunctionValue<'a>>>,

    pub(crate) fn_printf: RefCell<Option<FunctionValue<'a>>>,
    pub(crate) fn_exit: RefCell<Option<FunctionValue<'a>>>,
    pub(crate) fn_pow: RefCell<Option<FunctionValue<'a>>>,
    pub(crate) fn_snprintf: RefCell<Option<FunctionValue<'a>>>,
    pub(crate) fn_str_new: RefCell<Option<FunctionValue<'a>>>,
    pub(crate) fn_str_cmp: RefCell<Option<FunctionValue<'a>>>,
    pub(crate) fn_int_str: RefCell<Option<FunctionValue<'a>>>,
    pub(crate) fn_float_str: RefCell<Option<FunctionValue<'a>>>,

    pub(crate) str_id: Cell<u32>,
    pub(crate) interned: RefCell<HashMap<String, PointerValue<'a>>>,

    /// Specialization cache: `(source function identity, argument type
    /// tuple)` to the emitted monomorphic function.
    pub(crate) optim_funcs: RefCell<HashMap<(usize, Vec<Type>), FunctionValue<'a>>>,
    /// One generic boxed-convention function per source declaration.
    pub(crate) generic_funcs: RefCell<HashMap<usize, FunctionValue<'a>>>,
    /// Module-level slots for globals.
    pub(crate) globals: RefCell<HashMap<String, VarSlots<'a>>>,
}

impl<'a> CodeGen<'a> {
    pub fn new(context: &'a Context, module_name: &str, exceptions: bool) -> Self {
        let module = context.create_module(module_name);
        let builder = context.create_builder();
        let ptr_t = context.ptr_type(AddressSpace::default());

        let cobj_t = context.opaque_struct_type("CObj");
        cobj_t.set_body(&[ptr_t.into(), ptr_t.into()], false);
        let clist_t = context.opaque_struct_type("CList");
        clist_t.set_body(
            &[ptr_t.into(), context.i32_type().into(), context.i32_type().into()],
            false,
        );
        let ctype_t = ptr_t.array_type(ctype::NUM_SLOTS);

        let null_obj = module.add_global(cobj_t, None, "null.obj");
        null_obj.set_initializer(&cobj_t.const_zero());

        let mut ctype_globals = HashMap::new();
        for (rt, name) in [
            (Rt::Int, "ctype.int"),
            (Rt::Float, "ctype.float"),
            (Rt::Bool, "ctype.bool"),
            (Rt::Char, "ctype.char"),
            (Rt::List, "ctype.list"),
            (Rt::Str, "ctype.str"),
            (Rt::Func, "ctype.func"),
        ] {
            let g = module.add_global(ctype_t, None, name);
            g.set_constant(true);
            ctype_globals.insert(rt, g);
        }

        CodeGen {
            context,
            module,
            builder,
            exceptions,
            i8_t: context.i8_type(),
            i32_t: context.i32_type(),
            i64_t: context.i64_type(),
            bool_t: context.bool_type(),
            f64_t: context.f64_type(),
            ptr_t,
            cobj_t,
            clist_t,
            ctype_t,
            null_obj,
            ctype_globals,
            thunks: RefCell::new(HashMap::new()),
            fn_printf: RefCell::new(None),
            fn_exit: RefCell::new(None),
            fn_pow: RefCell::new(None),
            fn_snprintf: RefCell::new(None),
            fn_str_new: RefCell::new(None),
            fn_str_cmp: RefCell::new(None),
            fn_int_str: RefCell::new(None),
            fn_float_str: RefCell::new(None),
            str_id: Cell::new(0),
            interned: RefCell::new(HashMap::new()),
            optim_funcs: RefCell::new(HashMap::new()),
            generic_funcs: RefCell::new(HashMap::new()),
            globals: RefCell::new(HashMap::new()),
        }
    }

    pub fn rt_of(&self, ty: Type) -> CgResult<Rt> {
        match ty {
            Type::Int => Ok(Rt::Int),
            Type::Float => Ok(Rt::Float),
            Type::Bool => Ok(Rt::Bool),
            Type::String => Ok(Rt::Str),
            Type::Arr => Ok(Rt::List),
            Type::FuncType => Ok(Rt::Func),
            other => Err(Diagnostic::simple(format!(
                "no runtime type for {}",
                other
            ))),
        }
    }

    pub fn ctype_ptr(&self, rt: Rt) -> PointerValue<'a> {
        self.ctype_globals[&rt].as_pointer_value()
    }

    pub(crate) fn raw_llvm_type(&self, ty: Type) -> BasicTypeEnum<'a> {
        match ty {
            Type::Int => self.i32_t.into(),
            Type::Float => self.f64_t.into(),
            Type::Bool => self.bool_t.into(),
            _ => self.ptr_t.into(),
        }
    }

    pub(crate) fn abi_type(&self, ty: Type) -> BasicMetadataTypeEnum<'a> {
        match ty {
            Type::Int => self.i32_t.into(),
            Type::Float => self.f64_t.into(),
            Type::Bool => self.bool_t.into(),
            _ => self.ptr_t.into(),
        }
    }

    /// Emit the whole program: the runtime tables, the global slots, and a
    /// `main` holding the top-level statements.
    pub fn emit_program(&self, prog: &SProgram) -> CgResult<()> {
        self.emit_runtime()?;

        for bind in &prog.globals {
            self.declare_global(bind)?;
        }

        let fn_ty = self.i32_t.fn_type(&[], false);
        let main_fn = self.module.add_function("main", fn_ty, None);
        let entry = self.context.append_basic_block(main_fn, "entry");
        self.builder.position_at_end(entry);

        let mut ctx = FnCtx::new(main_fn, Type::Int, false);
        let terminated = self.lower_stmts(&prog.body, &mut ctx)?;
        if !terminated
            && self
                .builder
                .get_insert_block()
                .is_none_or(|b| b.get_terminator().is_none())
        {
            self.builder
                .build_return(Some(&self.i32_t.const_zero()))
                .map_err(|_| Diagnostic::simple("failed to build main return"))?;
        }
        Ok(())
    }

    fn declare_global(&self, bind: &Bind) -> CgResult<()> {
        if self.globals.borrow().contains_key(&bind.name) {
            return Ok(());
        }
        let boxed = self
            .module
            .add_global(self.ptr_t, None, &format!("{}.box", bind.name));
        boxed.set_initializer(&self.null_obj.as_pointer_value());

        let raw = if bind.ty.is_raw() {
            let ty = self.raw_llvm_type(bind.ty);
            let g = self
                .module
                .add_global(ty, None, &format!("{}.raw", bind.name));
            g.set_initializer(&ty.const_zero());
            Some((g.as_pointer_value(), bind.ty))
        } else {
            None
        };

        self.globals.borrow_mut().insert(
            bind.name.clone(),
            VarSlots {
                raw,
                boxed: boxed.as_pointer_value(),
                live: if bind.ty.is_raw() { Live::Raw } else { Live::Boxed },
                needs_heapify: false,
            },
        );
        Ok(())
    }

    // Addressing.

    pub(crate) fn get_slots(&self, ctx: &FnCtx<'a>, name: &str) -> CgResult<VarSlots<'a>> {
        if let Some(s) = ctx.vars.get(name) {
            return Ok(s.clone());
        }
        self.globals
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| Diagnostic::simple(format!("unbound name '{}' reached the emitter", name)))
    }

    pub(crate) fn put_slots(&self, ctx: &mut FnCtx<'a>, name: &str, slots: VarSlots<'a>) {
        if ctx.vars.contains_key(name) {
            ctx.vars.insert(name.to_string(), slots);
        } else {
            self.globals.borrow_mut().insert(name.to_string(), slots);
        }
    }

    /// Build an alloca in the function's entry block, so the slot dominates
    /// every later use regardless of which branch first needed it.
    pub(crate) fn entry_alloca(
        &self,
        ctx: &FnCtx<'a>,
        ty: BasicTypeEnum<'a>,
        name: &str,
    ) -> CgResult<PointerValue<'a>> {
        let current = self
            .builder
            .get_insert_block()
            .ok_or_else(|| Diagnostic::simple("builder has no insertion point"))?;
        let entry = ctx
            .function
            .get_first_basic_block()
            .ok_or_else(|| Diagnostic::simple("function has no entry block"))?;
        match entry.get_first_instruction() {
            Some(instr) => self.builder.position_before(&instr),
            None => self.builder.position_at_end(entry),
        }
        let p = self
            .builder
            .build_alloca(ty, name)
            .map_err(|_| Diagnostic::simple("alloca failed for raw slot"))?;
        self.builder.position_at_end(current);
        Ok(p)
    }

    /// Make sure `name` has a raw slot of the given primitive type,
    /// allocating one (entry-block alloca for locals, module global
    /// otherwise) if needed. Slots are canonical per `(name, type)` so
    /// diverging branches agree on the address.
    pub(crate) fn ensure_raw_slot(
        &self,
        ctx: &mut FnCtx<'a>,
        name: &str,
        ty: Type,
    ) -> CgResult<(PointerValue<'a>, VarSlots<'a>)> {
        let mut slots = self.get_slots(ctx, name)?;
        if let Some((p, t)) = slots.raw {
            if t == ty {
                return Ok((p, slots));
            }
        }
        let is_local = ctx.vars.contains_key(name);
        let llvm_ty = self.raw_llvm_type(ty);
        let p = if is_local {
            if let Some(p) = ctx.raw_registry.get(&(name.to_string(), ty)).copied() {
                p
            } else {
                let p = self.entry_alloca(ctx, llvm_ty, &format!("{}.raw", name))?;
                ctx.raw_registry.insert((name.to_string(), ty), p);
                p
            }
        } else {
            let gname = format!("{}.raw.{}", name, ty);
            match self.module.get_global(&gname) {
                Some(g) => g.as_pointer_value(),
                None => {
                    let g = self.module.add_global(llvm_ty, None, &gname);
                    g.set_initializer(&llvm_ty.const_zero());
                    g.as_pointer_value()
                }
            }
        };
        slots.raw = Some((p, ty));
        self.put_slots(ctx, name, slots.clone());
        Ok((p, slots))
    }

    pub(crate) fn snapshot(&self, ctx: &FnCtx<'a>) -> Snapshot<'a> {
        (ctx.vars.clone(), self.globals.borrow().clone())
    }

    pub(crate) fn restore_snapshot(&self, ctx: &mut FnCtx<'a>, snap: &Snapshot<'a>) {
        ctx.vars = snap.0.clone();
        *self.globals.borrow_mut() = snap.1.clone();
    }

    /// After an `If`, reconcile the current (else-side) addressing state
    /// with the then-side's: disagreement on liveness means the merged
    /// binding is boxed.
    pub(crate) fn reconcile_branches(&self, ctx: &mut FnCtx<'a>, then_state: &Snapshot<'a>) {
        for (name, then_slots) in &then_state.0 {
            if let Some(cur) = ctx.vars.get_mut(name) {
                if cur.live != then_slots.live {
                    cur.live = Live::Boxed;
                }
                cur.needs_heapify |= then_slots.needs_heapify;
            }
        }
        let mut globals = self.globals.borrow_mut();
        for (name, then_slots) in &then_state.1 {
            if let Some(cur) = globals.get_mut(name) {
                if cur.live != then_slots.live {
                    cur.live = Live::Boxed;
                }
                cur.needs_heapify |= then_slots.needs_heapify;
            }
        }
    }

    // Function emission.

    fn unique_fn_name(&self, base: &str) -> String {
        if self.module.get_function(base).is_none() {
            return base.to_string();
        }
        let mut i = 1u32;
        loop {
            let cand = format!("{}.{}", base, i);
            if self.module.get_function(&cand).is_none() {
                return cand;
            }
            i += 1;
        }
    }

    /// Allocate the boxed (and, for primitives, raw) slots for a list of
    /// bindings. Boxed slots start out pointing at the sentinel so
    /// use-before-definition is detectable at runtime.
    fn bind_local_slots(&self, ctx: &mut FnCtx<'a>, binds: &[Bind]) -> CgResult<()> {
        for bind in binds {
            if ctx.vars.contains_key(&bind.name) {
                continue;
            }
            let boxed = self
                .builder
                .build_alloca(self.ptr_t, &format!("{}.box", bind.name))
                .map_err(|_| Diagnostic::simple("alloca failed for boxed slot"))?;
            self.builder
                .build_store(boxed, self.null_obj.as_pointer_value())
                .map_err(|_| Diagnostic::simple("store failed for boxed slot"))?;
            let raw = if bind.ty.is_raw() {
                let p = self
                    .builder
                    .build_alloca(self.raw_llvm_type(bind.ty), &format!("{}.raw", bind.name))
                    .map_err(|_| Diagnostic::simple("alloca failed for raw slot"))?;
                Some((p, bind.ty))
            } else {
                None
            };
            ctx.vars.insert(
                bind.name.clone(),
                VarSlots {
                    raw,
                    boxed,
                    live: if bind.ty.is_raw() { Live::Raw } else { Live::Boxed },
                    needs_heapify: false,
                },
            );
        }
        Ok(())
    }

    /// Get (or lazily build) the monomorphic instance of a function for its
    /// inferred argument types. Cached by `(source identity, signature)`, so
    /// identical keys share one IR function referentially.
    pub fn get_or_emit_specialized(&self, rec: &Rc<SFunc>) -> CgResult<FunctionValue<'a>> {
        let key = (Rc::as_ptr(&rec.source) as usize, rec.sig.clone());
        if let Some(f) = self.optim_funcs.borrow().get(&key).copied() {
            return Ok(f);
        }

        let param_tys: Vec<BasicMetadataTypeEnum> =
            rec.sig.iter().map(|t| self.abi_type(*t)).collect();
        let fn_ty = match rec.ret {
            Type::Int => self.i32_t.fn_type(&param_tys, false),
            Type::Float => self.f64_t.fn_type(&param_tys, false),
            Type::Bool => self.bool_t.fn_type(&param_tys, false),
            _ => self.ptr_t.fn_type(&param_tys, false),
        };
        let base = if rec.sig.is_empty() {
            rec.name.clone()
        } else {
            let mangle: Vec<String> = rec.sig.iter().map(|t| t.to_string()).collect();
            format!("{}.{}", rec.name, mangle.join("."))
        };
        let f = self.module.add_function(&self.unique_fn_name(&base), fn_ty, None);
        self.optim_funcs.borrow_mut().insert(key, f);

        let saved = self.builder.get_insert_block();
        let entry = self.context.append_basic_block(f, "entry");
        self.builder.position_at_end(entry);

        let mut ctx = FnCtx::new(f, rec.ret, false);

        for (i, (formal, sty)) in rec.formals.iter().zip(&rec.sig).enumerate() {
            let pv = f
                .get_nth_param(i as u32)
                .ok_or_else(|| Diagnostic::simple(format!("missing parameter {}", formal.name)))?;
            let boxed = self
                .builder
                .build_alloca(self.ptr_t, &format!("{}.box", formal.name))
                .map_err(|_| Diagnostic::simple("alloca failed for formal"))?;
            self.builder
                .build_store(boxed, self.null_obj.as_pointer_value())
                .map_err(|_| Diagnostic::simple("store failed for formal"))?;
            if sty.is_raw() {
                let raw = self
                    .builder
                    .build_alloca(self.raw_llvm_type(*sty), &formal.name)
                    .map_err(|_| Diagnostic::simple("alloca failed for formal"))?;
                self.builder
                    .build_store(raw, pv)
                    .map_err(|_| Diagnostic::simple("store failed for formal"))?;
                ctx.vars.insert(
                    formal.name.clone(),
                    VarSlots {
                        raw: Some((raw, *sty)),
                        boxed,
                        live: Live::Raw,
                        needs_heapify: false,
                    },
                );
            } else {
                self.builder
                    .build_store(boxed, pv)
                    .map_err(|_| Diagnostic::simple("store failed for formal"))?;
                ctx.vars.insert(
                    formal.name.clone(),
                    VarSlots {
                        raw: None,
                        boxed,
                        live: Live::Boxed,
                        needs_heapify: false,
                    },
                );
            }
        }
        self.bind_local_slots(&mut ctx, &rec.locals)?;

        let terminated = self.lower_stmt(&rec.body, &mut ctx)?;
        if !terminated
            && self
                .builder
                .get_insert_block()
                .is_none_or(|b| b.get_terminator().is_none())
        {
            self.emit_default_return(&ctx)?;
        }

        if let Some(bb) = saved {
            self.builder.position_at_end(bb);
        }
        Ok(f)
    }

    /// Get (or build) the generic boxed-convention form of a function:
    /// `ptr f(ptr callee_obj, ptr argv)`. Always emitted at the declaration
    /// so the function is first-class.
    pub fn get_or_emit_generic(&self, rec: &Rc<SFunc>) -> CgResult<FunctionValue<'a>> {
        let key = Rc::as_ptr(&rec.source) as usize;
        if let Some(f) = self.generic_funcs.borrow().get(&key).copied() {
            return Ok(f);
        }

        let fn_ty = self
            .ptr_t
            .fn_type(&[self.ptr_t.into(), self.ptr_t.into()], false);
        let f = self
            .module
            .add_function(&self.unique_fn_name(&format!("{}.gen", rec.name)), fn_ty, None);
        self.generic_funcs.borrow_mut().insert(key, f);

        let saved = self.builder.get_insert_block();
        let entry = self.context.append_basic_block(f, "entry");
        self.builder.position_at_end(entry);

        let mut ctx = FnCtx::new(f, Type::Dyn, true);

        let argv = f
            .get_nth_param(1)
            .ok_or_else(|| Diagnostic::simple("generic function missing argv"))?
            .into_pointer_value();

        for (i, (formal, sty)) in rec.formals.iter().zip(&rec.sig).enumerate() {
            let slot = unsafe {
                self.builder
                    .build_in_bounds_gep(
                        self.ptr_t,
                        argv,
                        &[self.i32_t.const_int(i as u64, false)],
                        &format!("argv.{}", i),
                    )
                    .map_err(|_| Diagnostic::simple("gep failed for argv"))?
            };
            let obj = self
                .builder
                .build_load(self.ptr_t, slot, &formal.name)
                .map_err(|_| Diagnostic::simple("load failed for argv"))?
                .into_pointer_value();

            if formal.ty != Type::Dyn {
                self.check_obj_type(
                    f,
                    obj,
                    formal.ty,
                    &format!("RuntimeError: invalid type assigned to {}", formal.name),
                )?;
            }

            let boxed = self
                .builder
                .build_alloca(self.ptr_t, &format!("{}.box", formal.name))
                .map_err(|_| Diagnostic::simple("alloca failed for formal"))?;
            if sty.is_raw() {
                // The body was inferred with this formal at its annotated
                // primitive type: extract into a raw slot.
                let raw = self
                    .builder
                    .build_alloca(self.raw_llvm_type(*sty), &formal.name)
                    .map_err(|_| Diagnostic::simple("alloca failed for formal"))?;
                let v = self.unbox_raw(obj, *sty)?;
                self.builder
                    .build_store(raw, v)
                    .map_err(|_| Diagnostic::simple("store failed for formal"))?;
                self.builder
                    .build_store(boxed, self.null_obj.as_pointer_value())
                    .map_err(|_| Diagnostic::simple("store failed for formal"))?;
                ctx.vars.insert(
                    formal.name.clone(),
                    VarSlots {
                        raw: Some((raw, *sty)),
                        boxed,
                        live: Live::Raw,
                        needs_heapify: false,
                    },
                );
            } else {
                self.builder
                    .build_store(boxed, obj)
                    .map_err(|_| Diagnostic::simple("store failed for formal"))?;
                ctx.vars.insert(
                    formal.name.clone(),
                    VarSlots {
                        raw: None,
                        boxed,
                        live: Live::Boxed,
                        needs_heapify: false,
                    },
                );
            }
        }
        self.bind_local_slots(&mut ctx, &rec.locals)?;

        let terminated = self.lower_stmt(&rec.body, &mut ctx)?;
        if !terminated
            && self
                .builder
                .get_insert_block()
                .is_none_or(|b| b.get_terminator().is_none())
        {
            self.builder
                .build_return(Some(&self.null_obj.as_pointer_value()))
                .map_err(|_| Diagnostic::simple("failed to build generic return"))?;
        }

        if let Some(bb) = saved {
            self.builder.position_at_end(bb);
        }
        Ok(f)
    }

    fn emit_default_return(&self, ctx: &FnCtx<'a>) -> CgResult<()> {
        let res: Result<_, _> = match ctx.ret_ty {
            Type::Int => self.builder.build_return(Some(&self.i32_t.const_zero())),
            Type::Float => self.builder.build_return(Some(&self.f64_t.const_zero())),
            Type::Bool => self.builder.build_return(Some(&self.bool_t.const_zero())),
            _ => self
                .builder
                .build_return(Some(&self.null_obj.as_pointer_value())),
        };
        res.map_err(|_| Diagnostic::simple("failed to build default return"))?;
        Ok(())
    }
}
