//! Statement lowering.
//!
//! `lower_stmt` returns `true` when it emitted a terminator, so callers can
//! stop emitting dead code after returns, breaks and continues. Branch-local
//! addressing state is snapshotted around `If` diamonds and loops; the
//! semantic pass guarantees loop bodies re-enter under the merged
//! name-to-address mapping via the back-edge transforms it appended.

use inkwell::values::{BasicMetadataValueEnum, IntValue, PointerValue};

use crate::ast::Type;
use crate::diagnostics::Diagnostic;
use crate::sast::{SExpr, SExprKind, SLval, SStmt};

use super::ctype::{SLOT_IDX, SLOT_IDX_PARENT, SLOT_PRINT};
use super::{CgResult, CodeGen, FnCtx, Live, LoopCtx, RVal};

impl<'a> CodeGen<'a> {
    pub(crate) fn lower_stmts(&self, stmts: &[SStmt], ctx: &mut FnCtx<'a>) -> CgResult<bool> {
        for stmt in stmts {
            if self.lower_stmt(stmt, ctx)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub(crate) fn lower_stmt(&self, stmt: &SStmt, ctx: &mut FnCtx<'a>) -> CgResult<bool> {
        match stmt {
            SStmt::SNop => Ok(false),
            SStmt::SBlock(stmts) => self.lower_stmts(stmts, ctx),
            SStmt::SExpr(e) => {
                self.lower_expr(e, ctx)?;
                Ok(false)
            }
            SStmt::SPrint(e) => self.lower_print(e, ctx),
            SStmt::SAsn(lvals, e) => {
                let v = self.lower_expr(e, ctx)?;
                for lval in lvals {
                    self.store_lval(lval, v, ctx)?;
                }
                Ok(false)
            }
            SStmt::SIf(cond, then, els) => self.lower_if(cond, then, els, ctx),
            SStmt::SWhile(cond, body) => self.lower_while(cond, body, ctx),
            SStmt::SFor(bind, seq, body) => self.lower_for(bind, seq, body, ctx),
            SStmt::SRange(bind, bound, body) => self.lower_range(bind, bound, body, ctx),
            SStmt::SReturn(e) => self.lower_return(e, ctx),
            SStmt::SFunc(rec) => {
                let f = self.get_or_emit_generic(rec)?;
                let obj = self
                    .builder
                    .build_malloc(self.cobj_t, "func.obj")
                    .map_err(|_| Diagnostic::simple("malloc build failed"))?;
                self.builder
                    .build_store(
                        self.obj_data_addr(obj)?,
                        f.as_global_value().as_pointer_value(),
                    )
                    .map_err(|_| Diagnostic::simple("store build failed"))?;
                self.builder
                    .build_store(self.obj_type_addr(obj)?, self.ctype_ptr(super::Rt::Func))
                    .map_err(|_| Diagnostic::simple("store build failed"))?;
                self.store_var(ctx, &rec.name, RVal::Boxed(obj), Type::FuncType, None)?;
                Ok(false)
            }
            SStmt::STransform(name, from, to) => {
                self.lower_transform(name, *from, *to, ctx)?;
                Ok(false)
            }
            SStmt::SStage(entry, body, exit) => {
                for t in entry {
                    self.lower_stmt(t, ctx)?;
                }
                let terminated = self.lower_stmt(body, ctx)?;
                if !terminated {
                    for t in exit {
                        self.lower_stmt(t, ctx)?;
                    }
                }
                Ok(terminated)
            }
            SStmt::SContinue => {
                let target = ctx
                    .loops
                    .last()
                    .map(|l| l.cont)
                    .ok_or_else(|| Diagnostic::simple("continue outside loop reached emitter"))?;
                self.builder
                    .build_unconditional_branch(target)
                    .map_err(|_| Diagnostic::simple("branch build failed"))?;
                Ok(true)
            }
            SStmt::SBreak => {
                let target = ctx
                    .loops
                    .last()
                    .map(|l| l.brk)
                    .ok_or_else(|| Diagnostic::simple("break outside loop reached emitter"))?;
                self.builder
                    .build_unconditional_branch(target)
                    .map_err(|_| Diagnostic::simple("branch build failed"))?;
                Ok(true)
            }
        }
    }

    /// Store into a named slot, rebinding the live address kind to the
    /// assignment's static type.
    pub(crate) fn store_var(
        &self,
        ctx: &mut FnCtx<'a>,
        name: &str,
        v: RVal<'a>,
        ty: Type,
        check: Option<Type>,
    ) -> CgResult<()> {
        if ty.is_raw() {
            let (slot, mut slots) = self.ensure_raw_slot(ctx, name, ty)?;
            let raw = match v {
                RVal::Raw(val, _) => val,
                RVal::Boxed(obj) => {
                    if check.is_some() {
                        self.check_obj_type(
                            ctx.function,
                            obj,
                            ty,
                            &format!("RuntimeError: invalid type assigned to {}", name),
                        )?;
                    }
                    self.unbox_raw(obj, ty)?
                }
            };
            self.builder
                .build_store(slot, raw)
                .map_err(|_| Diagnostic::simple("store build failed"))?;
            slots.live = Live::Raw;
            self.put_slots(ctx, name, slots);
        } else {
            let mut slots = self.get_slots(ctx, name)?;
            let obj = match v {
                RVal::Raw(val, t) => self.build_box(val, t)?,
                RVal::Boxed(obj) => {
                    if let Some(expected) = check {
                        if expected != Type::Dyn {
                            self.check_obj_type(
                                ctx.function,
                                obj,
                                expected,
                                &format!("RuntimeError: invalid type assigned to {}", name),
                            )?;
                        }
                    }
                    obj
                }
            };
            self.builder
                .build_store(slots.boxed, obj)
                .map_err(|_| Diagnostic::simple("store build failed"))?;
            slots.live = Live::Boxed;
            slots.needs_heapify = false;
            self.put_slots(ctx, name, slots);
        }
        Ok(())
    }

    fn store_lval(&self, lval: &SLval, v: RVal<'a>, ctx: &mut FnCtx<'a>) -> CgResult<()> {
        match lval {
            SLval::Var { name, ty, check } => self.store_var(ctx, name, v, *ty, *check),
            SLval::Index { list, idx } => {
                let lv = self.lower_expr(list, ctx)?;
                let lobj = self.to_box(lv)?;
                let iv = self.lower_expr(idx, ctx)?;
                let iobj = match iv {
                    RVal::Raw(val, t) => self.build_box(val, t)?,
                    RVal::Boxed(obj) => {
                        if idx.ty == Type::Dyn {
                            self.check_obj_type(
                                ctx.function,
                                obj,
                                Type::Int,
                                "RuntimeError: unsupported operand type(s) for list access",
                            )?;
                        }
                        obj
                    }
                };

                let slot_ptr = if list.ty.is_arr() {
                    let rt = self.rt_of(list.ty)?;
                    let f = self
                        .thunks
                        .borrow()
                        .get(&(rt, SLOT_IDX_PARENT))
                        .copied()
                        .ok_or_else(|| Diagnostic::simple("missing idx_parent thunk"))?;
                    let cs = self
                        .builder
                        .build_call(f, &[lobj.into(), iobj.into()], "idx.parent")
                        .map_err(|_| Diagnostic::simple("call build failed"))?;
                    cs.try_as_basic_value()
                        .left()
                        .ok_or_else(|| Diagnostic::simple("idx_parent returned no value"))?
                        .into_pointer_value()
                } else {
                    let slot = self.load_slot(lobj, SLOT_IDX_PARENT)?;
                    self.check_slot(
                        ctx.function,
                        slot,
                        "RuntimeError: unsupported operand type(s) for list access",
                    )?;
                    let fn_ty = self
                        .ptr_t
                        .fn_type(&[self.ptr_t.into(), self.ptr_t.into()], false);
                    let cs = self
                        .builder
                        .build_indirect_call(fn_ty, slot, &[lobj.into(), iobj.into()], "idx.parent")
                        .map_err(|_| Diagnostic::simple("indirect call build failed"))?;
                    cs.try_as_basic_value()
                        .left()
                        .ok_or_else(|| Diagnostic::simple("idx_parent returned no value"))?
                        .into_pointer_value()
                };

                let obj = self.to_box(v)?;
                self.builder
                    .build_store(slot_ptr, obj)
                    .map_err(|_| Diagnostic::simple("store build failed"))?;
                Ok(())
            }
        }
    }

    fn lower_print(&self, e: &SExpr, ctx: &mut FnCtx<'a>) -> CgResult<bool> {
        let v = self.lower_expr(e, ctx)?;
        let printf = self.get_printf();
        match v {
            RVal::Raw(val, Type::Int) => {
                let fmt = self.intern_str("%d\n", "fmt")?;
                self.builder
                    .build_call(printf, &[fmt.into(), val.into()], "printf")
                    .map_err(|_| Diagnostic::simple("printf call build failed"))?;
            }
            RVal::Raw(val, Type::Float) => {
                let fmt = self.intern_str("%g\n", "fmt")?;
                self.builder
                    .build_call(printf, &[fmt.into(), val.into()], "printf")
                    .map_err(|_| Diagnostic::simple("printf call build failed"))?;
            }
            RVal::Raw(val, Type::Bool) => {
                let z = self
                    .builder
                    .build_int_z_extend(val.into_int_value(), self.i32_t, "ext")
                    .map_err(|_| Diagnostic::simple("zext build failed"))?;
                let fmt = self.intern_str("%d\n", "fmt")?;
                self.builder
                    .build_call(printf, &[fmt.into(), z.into()], "printf")
                    .map_err(|_| Diagnostic::simple("printf call build failed"))?;
            }
            RVal::Raw(_, other) => {
                return Err(Diagnostic::simple(format!(
                    "raw value of type {} reached print",
                    other
                )));
            }
            RVal::Boxed(obj) => {
                let slot = self.load_slot(obj, SLOT_PRINT)?;
                self.check_slot(
                    ctx.function,
                    slot,
                    "RuntimeError: unsupported operand type(s) for binary print",
                )?;
                let fn_ty = self.context.void_type().fn_type(&[self.ptr_t.into()], false);
                self.builder
                    .build_indirect_call(fn_ty, slot, &[obj.into()], "print")
                    .map_err(|_| Diagnostic::simple("indirect call build failed"))?;
                let fmt = self.intern_str("\n", "fmt")?;
                self.builder
                    .build_call(printf, &[fmt.into()], "printf")
                    .map_err(|_| Diagnostic::simple("printf call build failed"))?;
            }
        }
        Ok(false)
    }

    /// Lower a condition to an i1, type-checking boxed values at runtime.
    fn lower_condition(
        &self,
        cond: &SExpr,
        ctx: &mut FnCtx<'a>,
        message: &str,
    ) -> CgResult<IntValue<'a>> {
        let v = self.lower_expr(cond, ctx)?;
        match v {
            RVal::Raw(val, Type::Bool) => Ok(val.into_int_value()),
            RVal::Raw(_, other) => Err(Diagnostic::simple(format!(
                "condition of type {} reached the emitter",
                other
            ))),
            RVal::Boxed(obj) => {
                self.check_obj_type(ctx.function, obj, Type::Bool, message)?;
                Ok(self.unbox_raw(obj, Type::Bool)?.into_int_value())
            }
        }
    }

    fn lower_if(
        &self,
        cond: &SExpr,
        then: &SStmt,
        els: &SStmt,
        ctx: &mut FnCtx<'a>,
    ) -> CgResult<bool> {
        let cond_v =
            self.lower_condition(cond, ctx, "RuntimeError: invalid boolean type in if statement")?;

        let then_bb = self.context.append_basic_block(ctx.function, "if.then");
        let else_bb = self.context.append_basic_block(ctx.function, "if.else");
        let merge_bb = self.context.append_basic_block(ctx.function, "if.merge");

        self.builder
            .build_conditional_branch(cond_v, then_bb, else_bb)
            .map_err(|_| Diagnostic::simple("branch build failed"))?;

        let before = self.snapshot(ctx);

        self.builder.position_at_end(then_bb);
        let then_terminated = self.lower_stmt(then, ctx)?;
        if !then_terminated
            && self
                .builder
                .get_insert_block()
                .is_none_or(|b| b.get_terminator().is_none())
        {
            self.builder
                .build_unconditional_branch(merge_bb)
                .map_err(|_| Diagnostic::simple("branch build failed"))?;
        }
        let after_then = self.snapshot(ctx);

        self.restore_snapshot(ctx, &before);
        self.builder.position_at_end(else_bb);
        let else_terminated = self.lower_stmt(els, ctx)?;
        if !else_terminated
            && self
                .builder
                .get_insert_block()
                .is_none_or(|b| b.get_terminator().is_none())
        {
            self.builder
                .build_unconditional_branch(merge_bb)
                .map_err(|_| Diagnostic::simple("branch build failed"))?;
        }

        // The branch transforms leave both sides at the merged mapping;
        // any residual disagreement (a branch that returned early) boxes.
        self.reconcile_branches(ctx, &after_then);

        self.builder.position_at_end(merge_bb);
        if then_terminated && else_terminated {
            self.builder
                .build_unreachable()
                .map_err(|_| Diagnostic::simple("unreachable build failed"))?;
            return Ok(true);
        }
        Ok(false)
    }

    fn lower_while(&self, cond: &SExpr, body: &SStmt, ctx: &mut FnCtx<'a>) -> CgResult<bool> {
        let snap = self.snapshot(ctx);
        let cond_bb = self.context.append_basic_block(ctx.function, "while.cond");
        let body_bb = self.context.append_basic_block(ctx.function, "while.body");
        let after_bb = self.context.append_basic_block(ctx.function, "while.end");

        self.builder
            .build_unconditional_branch(cond_bb)
            .map_err(|_| Diagnostic::simple("branch build failed"))?;

        self.builder.position_at_end(cond_bb);
        let cond_v = self.lower_condition(
            cond,
            ctx,
            "RuntimeError: invalid boolean type in while statement",
        )?;
        self.builder
            .build_conditional_branch(cond_v, body_bb, after_bb)
            .map_err(|_| Diagnostic::simple("branch build failed"))?;

        self.builder.position_at_end(body_bb);
        ctx.loops.push(LoopCtx {
            cont: cond_bb,
            brk: after_bb,
        });
        let terminated = self.lower_stmts(std::slice::from_ref(body), ctx)?;
        if !terminated
            && self
                .builder
                .get_insert_block()
                .is_none_or(|b| b.get_terminator().is_none())
        {
            self.builder
                .build_unconditional_branch(cond_bb)
                .map_err(|_| Diagnostic::simple("branch build failed"))?;
        }
        ctx.loops.pop();

        self.builder.position_at_end(after_bb);
        self.restore_snapshot(ctx, &snap);
        Ok(false)
    }

    fn lower_range(
        &self,
        bind: &crate::ast::Bind,
        bound: &SExpr,
        body: &SStmt,
        ctx: &mut FnCtx<'a>,
    ) -> CgResult<bool> {
        let bv = self.lower_expr(bound, ctx)?;
        let n: IntValue<'a> = match bv {
            RVal::Raw(val, Type::Int) => val.into_int_value(),
            RVal::Raw(_, other) => {
                return Err(Diagnostic::simple(format!(
                    "range bound of type {} reached the emitter",
                    other
                )));
            }
            RVal::Boxed(obj) => {
                self.check_obj_type(
                    ctx.function,
                    obj,
                    Type::Int,
                    &format!("RuntimeError: invalid type assigned to {}", bind.name),
                )?;
                self.unbox_raw(obj, Type::Int)?.into_int_value()
            }
        };

        let counter = self
            .builder
            .build_alloca(self.i32_t, "range.i")
            .map_err(|_| Diagnostic::simple("alloca build failed"))?;
        self.builder
            .build_store(counter, self.i32_t.const_zero())
            .map_err(|_| Diagnostic::simple("store build failed"))?;

        let snap = self.snapshot(ctx);
        let cond_bb = self.context.append_basic_block(ctx.function, "range.cond");
        let body_bb = self.context.append_basic_block(ctx.function, "range.body");
        let step_bb = self.context.append_basic_block(ctx.function, "range.step");
        let after_bb = self.context.append_basic_block(ctx.function, "range.end");

        self.builder
            .build_unconditional_branch(cond_bb)
            .map_err(|_| Diagnostic::simple("branch build failed"))?;

        self.builder.position_at_end(cond_bb);
        let i = self
            .builder
            .build_load(self.i32_t, counter, "i")
            .map_err(|_| Diagnostic::simple("load build failed"))?
            .into_int_value();
        let in_range = self
            .builder
            .build_int_compare(inkwell::IntPredicate::SLT, i, n, "inrange")
            .map_err(|_| Diagnostic::simple("cmp build failed"))?;
        self.builder
            .build_conditional_branch(in_range, body_bb, after_bb)
            .map_err(|_| Diagnostic::simple("branch build failed"))?;

        self.builder.position_at_end(body_bb);
        self.store_var(ctx, &bind.name, RVal::Raw(i.into(), Type::Int), bind.ty, None)?;
        ctx.loops.push(LoopCtx {
            cont: step_bb,
            brk: after_bb,
        });
        let terminated = self.lower_stmts(std::slice::from_ref(body), ctx)?;
        if !terminated
            && self
                .builder
                .get_insert_block()
                .is_none_or(|b| b.get_terminator().is_none())
        {
            self.builder
                .build_unconditional_branch(step_bb)
                .map_err(|_| Diagnostic::simple("branch build failed"))?;
        }
        ctx.loops.pop();

        self.builder.position_at_end(step_bb);
        let i2 = self
            .builder
            .build_load(self.i32_t, counter, "i")
            .map_err(|_| Diagnostic::simple("load build failed"))?
            .into_int_value();
        let next = self
            .builder
            .build_int_add(i2, self.i32_t.const_int(1, false), "next")
            .map_err(|_| Diagnostic::simple("add build failed"))?;
        self.builder
            .build_store(counter, next)
            .map_err(|_| Diagnostic::simple("store build failed"))?;
        self.builder
            .build_unconditional_branch(cond_bb)
            .map_err(|_| Diagnostic::simple("branch build failed"))?;

        self.builder.position_at_end(after_bb);
        self.restore_snapshot(ctx, &snap);
        Ok(false)
    }

    fn lower_for(
        &self,
        bind: &crate::ast::Bind,
        seq: &SExpr,
        body: &SStmt,
        ctx: &mut FnCtx<'a>,
    ) -> CgResult<bool> {
        let sv = self.lower_expr(seq, ctx)?;
        let sobj = self.to_box(sv)?;

        // Resolve the idx slot once, before the loop.
        let idx_fn: PointerValue<'a> = if seq.ty.is_arr() {
            let rt = self.rt_of(seq.ty)?;
            self.thunks
                .borrow()
                .get(&(rt, SLOT_IDX))
                .copied()
                .ok_or_else(|| Diagnostic::simple("missing idx thunk"))?
                .as_global_value()
                .as_pointer_value()
        } else {
            let slot = self.load_slot(sobj, SLOT_IDX)?;
            self.check_slot(
                ctx.function,
                slot,
                "RuntimeError: unsupported operand type(s) for list access",
            )?;
            slot
        };
        let (_, len) = self.load_list_header(sobj)?;

        let counter = self
            .builder
            .build_alloca(self.i32_t, "for.i")
            .map_err(|_| Diagnostic::simple("alloca build failed"))?;
        self.builder
            .build_store(counter, self.i32_t.const_zero())
            .map_err(|_| Diagnostic::simple("store build failed"))?;

        let snap = self.snapshot(ctx);
        let cond_bb = self.context.append_basic_block(ctx.function, "for.cond");
        let body_bb = self.context.append_basic_block(ctx.function, "for.body");
        let step_bb = self.context.append_basic_block(ctx.function, "for.step");
        let after_bb = self.context.append_basic_block(ctx.function, "for.end");

        self.builder
            .build_unconditional_branch(cond_bb)
            .map_err(|_| Diagnostic::simple("branch build failed"))?;

        self.builder.position_at_end(cond_bb);
        let i = self
            .builder
            .build_load(self.i32_t, counter, "i")
            .map_err(|_| Diagnostic::simple("load build failed"))?
            .into_int_value();
        let in_range = self
            .builder
            .build_int_compare(inkwell::IntPredicate::SLT, i, len, "inrange")
            .map_err(|_| Diagnostic::simple("cmp build failed"))?;
        self.builder
            .build_conditional_branch(in_range, body_bb, after_bb)
            .map_err(|_| Diagnostic::simple("branch build failed"))?;

        self.builder.position_at_end(body_bb);
        let iobj = self.build_box(i.into(), Type::Int)?;
        let fn_ty = self
            .ptr_t
            .fn_type(&[self.ptr_t.into(), self.ptr_t.into()], false);
        let args: [BasicMetadataValueEnum<'a>; 2] = [sobj.into(), iobj.into()];
        let cs = self
            .builder
            .build_indirect_call(fn_ty, idx_fn, &args, "elem")
            .map_err(|_| Diagnostic::simple("indirect call build failed"))?;
        let elem = cs
            .try_as_basic_value()
            .left()
            .ok_or_else(|| Diagnostic::simple("idx returned no value"))?
            .into_pointer_value();
        self.store_var(ctx, &bind.name, RVal::Boxed(elem), bind.ty, None)?;

        ctx.loops.push(LoopCtx {
            cont: step_bb,
            brk: after_bb,
        });
        let terminated = self.lower_stmts(std::slice::from_ref(body), ctx)?;
        if !terminated
            && self
                .builder
                .get_insert_block()
                .is_none_or(|b| b.get_terminator().is_none())
        {
            self.builder
                .build_unconditional_branch(step_bb)
                .map_err(|_| Diagnostic::simple("branch build failed"))?;
        }
        ctx.loops.pop();

        self.builder.position_at_end(step_bb);
        let i2 = self
            .builder
            .build_load(self.i32_t, counter, "i")
            .map_err(|_| Diagnostic::simple("load build failed"))?
            .into_int_value();
        let next = self
            .builder
            .build_int_add(i2, self.i32_t.const_int(1, false), "next")
            .map_err(|_| Diagnostic::simple("add build failed"))?;
        self.builder
            .build_store(counter, next)
            .map_err(|_| Diagnostic::simple("store build failed"))?;
        self.builder
            .build_unconditional_branch(cond_bb)
            .map_err(|_| Diagnostic::simple("branch build failed"))?;

        self.builder.position_at_end(after_bb);
        self.restore_snapshot(ctx, &snap);
        Ok(false)
    }

    fn lower_return(&self, e: &SExpr, ctx: &mut FnCtx<'a>) -> CgResult<bool> {
        if ctx.generic || ctx.ret_ty == Type::Dyn {
            let obj = if matches!(e.node, SExprKind::SNoexpr) {
                self.null_obj.as_pointer_value()
            } else {
                let v = self.lower_expr(e, ctx)?;
                self.to_box(v)?
            };
            self.builder
                .build_return(Some(&obj))
                .map_err(|_| Diagnostic::simple("return build failed"))?;
            return Ok(true);
        }

        let v = self.lower_expr(e, ctx)?;
        if ctx.ret_ty.is_raw() {
            let raw = match v {
                RVal::Raw(val, _) => val,
                RVal::Boxed(obj) => {
                    self.check_obj_type(
                        ctx.function,
                        obj,
                        ctx.ret_ty,
                        &format!("RuntimeError: invalid return type (expected {})", ctx.ret_ty),
                    )?;
                    self.unbox_raw(obj, ctx.ret_ty)?
                }
            };
            self.builder
                .build_return(Some(&raw))
                .map_err(|_| Diagnostic::simple("return build failed"))?;
        } else {
            let obj = match v {
                RVal::Boxed(obj) => {
                    self.check_obj_type(
                        ctx.function,
                        obj,
                        ctx.ret_ty,
                        &format!("RuntimeError: invalid return type (expected {})", ctx.ret_ty),
                    )?;
                    obj
                }
                RVal::Raw(val, t) => self.build_box(val, t)?,
            };
            self.builder
                .build_return(Some(&obj))
                .map_err(|_| Diagnostic::simple("return build failed"))?;
        }
        Ok(true)
    }

    /// Move a name's live value between its raw and boxed slots. Same-kind
    /// box moves are bookkeeping only, since both static types share the
    /// one boxed slot.
    fn lower_transform(
        &self,
        name: &str,
        from: Type,
        to: Type,
        ctx: &mut FnCtx<'a>,
    ) -> CgResult<()> {
        if from == to {
            return Ok(());
        }
        match (from.is_raw(), to.is_raw()) {
            (false, false) => {
                let mut slots = self.get_slots(ctx, name)?;
                slots.live = Live::Boxed;
                self.put_slots(ctx, name, slots);
                Ok(())
            }
            (false, true) => {
                // Boxed to raw: heapify if flagged, then extract the data
                // at the target primitive type.
                let slots = self.get_slots(ctx, name)?;
                let mut obj = self
                    .builder
                    .build_load(self.ptr_t, slots.boxed, name)
                    .map_err(|_| Diagnostic::simple("load build failed"))?
                    .into_pointer_value();
                if slots.needs_heapify {
                    obj = self.dispatch_heapify(obj)?;
                }
                let raw = self.unbox_raw(obj, to)?;
                let (raw_slot, mut slots) = self.ensure_raw_slot(ctx, name, to)?;
                self.builder
                    .build_store(raw_slot, raw)
                    .map_err(|_| Diagnostic::simple("store build failed"))?;
                slots.live = Live::Raw;
                slots.needs_heapify = false;
                self.put_slots(ctx, name, slots);
                Ok(())
            }
            (true, false) => {
                // Raw to boxed: the fresh object's data field aliases the
                // raw slot, so a later use must heapify before the value
                // can be captured.
                let slots = self.get_slots(ctx, name)?;
                let (raw_slot, _) = slots.raw.ok_or_else(|| {
                    Diagnostic::simple(format!("'{}' has no raw slot to box", name))
                })?;
                let obj = self.build_box_of_slot(raw_slot, from)?;
                let mut slots = slots;
                self.builder
                    .build_store(slots.boxed, obj)
                    .map_err(|_| Diagnostic::simple("store build failed"))?;
                slots.live = Live::Boxed;
                slots.needs_heapify = true;
                self.put_slots(ctx, name, slots);
                Ok(())
            }
            (true, true) => Err(Diagnostic::simple(format!(
                "raw-to-raw transform {} -> {} for '{}'",
                from, to, name
            ))),
        }
    }
}
