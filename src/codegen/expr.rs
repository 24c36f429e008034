//! Expression lowering.
//!
//! Every expression produces an `RVal`: raw machine values where static
//! types allow, boxed objects otherwise. Binary operations take the
//! primitive-instruction path when both operands are raw numerics, a direct
//! thunk call when the left type is statically known, and otherwise dispatch
//! through the left operand's `CType` slot behind null-slot and same-type
//! guards.

use inkwell::values::{BasicMetadataValueEnum, BasicValueEnum, PointerValue};
use inkwell::{FloatPredicate, IntPredicate};

use crate::ast::{Lit, Op, Type, Uop};
use crate::diagnostics::Diagnostic;
use crate::sast::{SExpr, SExprKind, SStmt};

use super::ctype::{op_slot, uop_slot, SLOT_CALL, SLOT_IDX};
use super::{CgResult, CodeGen, FnCtx, Live, RVal, Rt};

impl<'a> CodeGen<'a> {
    pub(crate) fn lower_expr(&self, e: &SExpr, ctx: &mut FnCtx<'a>) -> CgResult<RVal<'a>> {
        match &e.node {
            SExprKind::SLit(lit) => self.lower_lit(lit),
            SExprKind::SVar(name) => self.lower_var(name, ctx),
            SExprKind::SBinop(l, op, r) => self.lower_binop(l, *op, r, ctx),
            SExprKind::SUnop(uop, operand) => self.lower_unop(*uop, operand, ctx),
            SExprKind::SCall(callee, args, mode) => self.lower_call(callee, args, mode, ctx),
            SExprKind::SList(elems, _) => self.lower_list(elems, ctx),
            SExprKind::SListAccess(l, i) => self.lower_access(l, i, ctx),
            SExprKind::SCast(to, from, inner) => self.lower_cast(*to, *from, inner, ctx),
            SExprKind::SNoexpr => Ok(RVal::Boxed(self.null_obj.as_pointer_value())),
        }
    }

    fn lower_lit(&self, lit: &Lit) -> CgResult<RVal<'a>> {
        match lit {
            Lit::Int(v) => Ok(RVal::Raw(
                self.i32_t.const_int(*v as i64 as u64, true).into(),
                Type::Int,
            )),
            Lit::Float(v) => Ok(RVal::Raw(self.f64_t.const_float(*v).into(), Type::Float)),
            Lit::Bool(v) => Ok(RVal::Raw(
                self.bool_t.const_int(*v as u64, false).into(),
                Type::Bool,
            )),
            Lit::Str(s) => {
                let bytes = self.intern_str(s, "strlit")?;
                let len = self.i32_t.const_int(s.len() as u64, false);
                let str_new = self
                    .fn_str_new
                    .borrow()
                    .ok_or_else(|| Diagnostic::simple("str.new not emitted"))?;
                let cs = self
                    .builder
                    .build_call(str_new, &[bytes.into(), len.into()], "str")
                    .map_err(|_| Diagnostic::simple("str.new call build failed"))?;
                let obj = cs
                    .try_as_basic_value()
                    .left()
                    .ok_or_else(|| Diagnostic::simple("str.new returned no value"))?
                    .into_pointer_value();
                Ok(RVal::Boxed(obj))
            }
        }
    }

    fn lower_var(&self, name: &str, ctx: &mut FnCtx<'a>) -> CgResult<RVal<'a>> {
        let slots = self.get_slots(ctx, name)?;
        match slots.live {
            Live::Raw => {
                let (p, t) = slots
                    .raw
                    .ok_or_else(|| Diagnostic::simple(format!("'{}' live raw without slot", name)))?;
                let v = self
                    .builder
                    .build_load(self.raw_llvm_type(t), p, name)
                    .map_err(|_| Diagnostic::simple("load build failed"))?;
                Ok(RVal::Raw(v, t))
            }
            Live::Boxed => {
                let obj = self
                    .builder
                    .build_load(self.ptr_t, slots.boxed, name)
                    .map_err(|_| Diagnostic::simple("load build failed"))?
                    .into_pointer_value();
                self.check_defined(ctx.function, obj, name)?;
                if slots.needs_heapify {
                    let obj = self.dispatch_heapify(obj)?;
                    let mut cleared = slots.clone();
                    cleared.needs_heapify = false;
                    self.put_slots(ctx, name, cleared);
                    return Ok(RVal::Boxed(obj));
                }
                Ok(RVal::Boxed(obj))
            }
        }
    }

    /// Primitive instructions for raw numeric operands; `None` when the
    /// combination has no direct builder and must dispatch.
    fn raw_binop(
        &self,
        a: BasicValueEnum<'a>,
        ta: Type,
        op: Op,
        b: BasicValueEnum<'a>,
        tb: Type,
    ) -> CgResult<Option<RVal<'a>>> {
        // Bool promotes to int, and int to float, in mixed arithmetic.
        let (a, ta, b, tb) = match (ta, tb) {
            (Type::Int, Type::Bool) => {
                let bz = self
                    .builder
                    .build_int_z_extend(b.into_int_value(), self.i32_t, "ext")
                    .map_err(|_| Diagnostic::simple("zext build failed"))?;
                (a, ta, bz.into(), Type::Int)
            }
            (Type::Bool, Type::Int) => {
                let az = self
                    .builder
                    .build_int_z_extend(a.into_int_value(), self.i32_t, "ext")
                    .map_err(|_| Diagnostic::simple("zext build failed"))?;
                (az.into(), Type::Int, b, tb)
            }
            (Type::Float, Type::Int) => {
                let bf = self
                    .builder
                    .build_signed_int_to_float(b.into_int_value(), self.f64_t, "i2f")
                    .map_err(|_| Diagnostic::simple("i2f build failed"))?;
                (a, ta, bf.into(), Type::Float)
            }
            (Type::Int, Type::Float) => {
                let af = self
                    .builder
                    .build_signed_int_to_float(a.into_int_value(), self.f64_t, "i2f")
                    .map_err(|_| Diagnostic::simple("i2f build failed"))?;
                (af.into(), Type::Float, b, tb)
            }
            _ => (a, ta, b, tb),
        };
        if ta != tb {
            return Ok(None);
        }

        if ta == Type::Float {
            let (x, y) = (a.into_float_value(), b.into_float_value());
            let out: RVal<'a> = match op {
                Op::Add | Op::Sub | Op::Mul | Op::Div => {
                    let v = match op {
                        Op::Add => self.builder.build_float_add(x, y, "sum"),
                        Op::Sub => self.builder.build_float_sub(x, y, "sub"),
                        Op::Mul => self.builder.build_float_mul(x, y, "mul"),
                        _ => self.builder.build_float_div(x, y, "div"),
                    }
                    .map_err(|_| Diagnostic::simple("float arith build failed"))?;
                    RVal::Raw(v.into(), Type::Float)
                }
                Op::Exp => {
                    let cs = self
                        .builder
                        .build_call(self.get_pow(), &[x.into(), y.into()], "pow")
                        .map_err(|_| Diagnostic::simple("pow call build failed"))?;
                    let v = cs
                        .try_as_basic_value()
                        .left()
                        .ok_or_else(|| Diagnostic::simple("pow returned no value"))?;
                    RVal::Raw(v, Type::Float)
                }
                Op::Eq | Op::Neq | Op::Less | Op::Leq | Op::Greater | Op::Geq => {
                    let pred = match op {
                        Op::Eq => FloatPredicate::UEQ,
                        Op::Neq => FloatPredicate::UNE,
                        Op::Less => FloatPredicate::ULT,
                        Op::Leq => FloatPredicate::ULE,
                        Op::Greater => FloatPredicate::UGT,
                        _ => FloatPredicate::UGE,
                    };
                    let v = self
                        .builder
                        .build_float_compare(pred, x, y, "cmp")
                        .map_err(|_| Diagnostic::simple("float compare build failed"))?;
                    RVal::Raw(v.into(), Type::Bool)
                }
                // No float and/or builder; dispatch decides.
                Op::And | Op::Or => return Ok(None),
            };
            return Ok(Some(out));
        }

        // Int or Bool, same width.
        let (x, y) = (a.into_int_value(), b.into_int_value());
        let out: RVal<'a> = match op {
            Op::Add | Op::Sub | Op::Mul | Op::Div => {
                let v = match op {
                    Op::Add => self.builder.build_int_add(x, y, "sum"),
                    Op::Sub => self.builder.build_int_sub(x, y, "sub"),
                    Op::Mul => self.builder.build_int_mul(x, y, "mul"),
                    _ => self.builder.build_int_signed_div(x, y, "div"),
                }
                .map_err(|_| Diagnostic::simple("int arith build failed"))?;
                RVal::Raw(v.into(), ta)
            }
            Op::Exp => {
                let rt = if ta == Type::Bool { Rt::Bool } else { Rt::Int };
                let v = self.build_int_pow(x, y, rt)?;
                RVal::Raw(v, ta)
            }
            Op::Eq | Op::Neq | Op::Less | Op::Leq | Op::Greater | Op::Geq => {
                let pred = match op {
                    Op::Eq => IntPredicate::EQ,
                    Op::Neq => IntPredicate::NE,
                    Op::Less => IntPredicate::SLT,
                    Op::Leq => IntPredicate::SLE,
                    Op::Greater => IntPredicate::SGT,
                    _ => IntPredicate::SGE,
                };
                let v = self
                    .builder
                    .build_int_compare(pred, x, y, "cmp")
                    .map_err(|_| Diagnostic::simple("int compare build failed"))?;
                RVal::Raw(v.into(), Type::Bool)
            }
            Op::And => {
                let v = self
                    .builder
                    .build_and(x, y, "and")
                    .map_err(|_| Diagnostic::simple("and build failed"))?;
                RVal::Raw(v.into(), ta)
            }
            Op::Or => {
                let v = self
                    .builder
                    .build_or(x, y, "or")
                    .map_err(|_| Diagnostic::simple("or build failed"))?;
                RVal::Raw(v.into(), ta)
            }
        };
        Ok(Some(out))
    }

    fn lower_binop(&self, l: &SExpr, op: Op, r: &SExpr, ctx: &mut FnCtx<'a>) -> CgResult<RVal<'a>> {
        let lv = self.lower_expr(l, ctx)?;
        let rv = self.lower_expr(r, ctx)?;

        // Both operands statically numeric: compute on machine values,
        // unboxing if either arrived boxed.
        if l.ty.is_numeric() && r.ty.is_numeric() {
            let a = self.raw_of(lv, l.ty)?;
            let b = self.raw_of(rv, r.ty)?;
            if let Some(out) = self.raw_binop(a, l.ty, op, b, r.ty)? {
                return Ok(out);
            }
        } else if let (RVal::Raw(a, ta), RVal::Raw(b, tb)) = (lv, rv) {
            if let Some(out) = self.raw_binop(a, ta, op, b, tb)? {
                return Ok(out);
            }
        }

        let slot_idx = op_slot(op);
        let lobj = self.to_box(lv)?;
        let robj = self.to_box(rv)?;

        // Both types statically known and the left type's slot populated:
        // call the thunk directly, no runtime dispatch or checks.
        if l.ty != Type::Dyn && r.ty != Type::Dyn {
            if let Ok(rt) = self.rt_of(l.ty) {
                let thunk = self.thunks.borrow().get(&(rt, slot_idx)).copied();
                if let Some(f) = thunk {
                    let cs = self
                        .builder
                        .build_call(f, &[lobj.into(), robj.into()], "binop")
                        .map_err(|_| Diagnostic::simple("thunk call build failed"))?;
                    let obj = cs
                        .try_as_basic_value()
                        .left()
                        .ok_or_else(|| Diagnostic::simple("thunk returned no value"))?
                        .into_pointer_value();
                    return Ok(RVal::Boxed(obj));
                }
            }
        }

        let msg = format!("RuntimeError: unsupported operand type(s) for binary {}", op);
        let slot = self.load_slot(lobj, slot_idx)?;
        self.check_slot(ctx.function, slot, &msg)?;
        if l.ty == Type::Dyn || r.ty == Type::Dyn {
            self.check_same_type(ctx.function, lobj, robj, &msg)?;
        }
        let fn_ty = self
            .ptr_t
            .fn_type(&[self.ptr_t.into(), self.ptr_t.into()], false);
        let cs = self
            .builder
            .build_indirect_call(fn_ty, slot, &[lobj.into(), robj.into()], "binop")
            .map_err(|_| Diagnostic::simple("indirect call build failed"))?;
        let obj = cs
            .try_as_basic_value()
            .left()
            .ok_or_else(|| Diagnostic::simple("dispatch returned no value"))?
            .into_pointer_value();
        Ok(RVal::Boxed(obj))
    }

    fn lower_unop(&self, uop: Uop, operand: &SExpr, ctx: &mut FnCtx<'a>) -> CgResult<RVal<'a>> {
        let v = self.lower_expr(operand, ctx)?;
        if let RVal::Raw(a, t) = v {
            match (uop, t) {
                (Uop::Neg, Type::Int) | (Uop::Neg, Type::Bool) => {
                    let r = self
                        .builder
                        .build_int_neg(a.into_int_value(), "neg")
                        .map_err(|_| Diagnostic::simple("neg build failed"))?;
                    return Ok(RVal::Raw(r.into(), t));
                }
                (Uop::Neg, Type::Float) => {
                    let r = self
                        .builder
                        .build_float_neg(a.into_float_value(), "neg")
                        .map_err(|_| Diagnostic::simple("fneg build failed"))?;
                    return Ok(RVal::Raw(r.into(), t));
                }
                (Uop::Not, Type::Int) | (Uop::Not, Type::Bool) => {
                    let r = self
                        .builder
                        .build_not(a.into_int_value(), "not")
                        .map_err(|_| Diagnostic::simple("not build failed"))?;
                    return Ok(RVal::Raw(r.into(), t));
                }
                _ => {}
            }
        }
        let obj = self.to_box(v)?;
        let slot = self.load_slot(obj, uop_slot(uop))?;
        self.check_slot(
            ctx.function,
            slot,
            &format!("RuntimeError: unsupported operand type for unary {}", uop),
        )?;
        let fn_ty = self.ptr_t.fn_type(&[self.ptr_t.into()], false);
        let cs = self
            .builder
            .build_indirect_call(fn_ty, slot, &[obj.into()], "unop")
            .map_err(|_| Diagnostic::simple("indirect call build failed"))?;
        let out = cs
            .try_as_basic_value()
            .left()
            .ok_or_else(|| Diagnostic::simple("dispatch returned no value"))?
            .into_pointer_value();
        Ok(RVal::Boxed(out))
    }

    fn lower_call(
        &self,
        callee: &SExpr,
        args: &[SExpr],
        mode: &SStmt,
        ctx: &mut FnCtx<'a>,
    ) -> CgResult<RVal<'a>> {
        match mode {
            SStmt::SFunc(rec) => {
                let f = self.get_or_emit_specialized(rec)?;
                let mut call_args: Vec<BasicMetadataValueEnum<'a>> =
                    Vec::with_capacity(args.len());
                for (i, arg) in args.iter().enumerate() {
                    let v = self.lower_expr(arg, ctx)?;
                    let sig_ty = rec.sig[i];
                    let formal = &rec.formals[i];
                    match v {
                        RVal::Raw(raw, t) => {
                            if sig_ty.is_raw() {
                                call_args.push(raw.into());
                            } else {
                                call_args.push(self.build_box(raw, t)?.into());
                            }
                        }
                        RVal::Boxed(obj) => {
                            if formal.ty != Type::Dyn {
                                self.check_obj_type(
                                    ctx.function,
                                    obj,
                                    formal.ty,
                                    &format!(
                                        "RuntimeError: invalid type assigned to {}",
                                        formal.name
                                    ),
                                )?;
                            }
                            if sig_ty.is_raw() {
                                call_args.push(self.unbox_raw(obj, sig_ty)?.into());
                            } else {
                                call_args.push(obj.into());
                            }
                        }
                    }
                }
                let cs = self
                    .builder
                    .build_call(f, &call_args, "call")
                    .map_err(|_| Diagnostic::simple("call build failed"))?;
                let out = cs
                    .try_as_basic_value()
                    .left()
                    .ok_or_else(|| Diagnostic::simple("call returned no value"))?;
                if rec.ret.is_raw() {
                    Ok(RVal::Raw(out, rec.ret))
                } else {
                    Ok(RVal::Boxed(out.into_pointer_value()))
                }
            }
            SStmt::SStage(entry, _, exit) => {
                for t in entry {
                    self.lower_stmt(t, ctx)?;
                }
                let cv = self.lower_expr(callee, ctx)?;
                let cobj = self.to_box(cv)?;
                let mut objs: Vec<PointerValue<'a>> = Vec::with_capacity(args.len());
                for arg in args {
                    let v = self.lower_expr(arg, ctx)?;
                    objs.push(self.to_box(v)?);
                }

                let n = (args.len() as u64).max(1);
                let argv = self
                    .builder
                    .build_array_alloca(self.ptr_t, self.i32_t.const_int(n, false), "argv")
                    .map_err(|_| Diagnostic::simple("alloca build failed"))?;
                for (i, obj) in objs.iter().enumerate() {
                    let slot = unsafe {
                        self.builder
                            .build_in_bounds_gep(
                                self.ptr_t,
                                argv,
                                &[self.i32_t.const_int(i as u64, false)],
                                &format!("argv.{}", i),
                            )
                            .map_err(|_| Diagnostic::simple("gep build failed"))?
                    };
                    self.builder
                        .build_store(slot, *obj)
                        .map_err(|_| Diagnostic::simple("store build failed"))?;
                }

                let slot = self.load_slot(cobj, SLOT_CALL)?;
                self.check_slot(
                    ctx.function,
                    slot,
                    "RuntimeError: unsupported operand type(s) for binary call",
                )?;
                let fn_ty = self
                    .ptr_t
                    .fn_type(&[self.ptr_t.into(), self.ptr_t.into()], false);
                let cs = self
                    .builder
                    .build_indirect_call(fn_ty, slot, &[cobj.into(), argv.into()], "call")
                    .map_err(|_| Diagnostic::simple("indirect call build failed"))?;
                let out = cs
                    .try_as_basic_value()
                    .left()
                    .ok_or_else(|| Diagnostic::simple("generic call returned no value"))?
                    .into_pointer_value();

                for t in exit {
                    self.lower_stmt(t, ctx)?;
                }
                Ok(RVal::Boxed(out))
            }
            other => Err(Diagnostic::simple(format!(
                "call carries a non-call lowering mode: {:?}",
                std::mem::discriminant(other)
            ))),
        }
    }

    fn lower_list(&self, elems: &[SExpr], ctx: &mut FnCtx<'a>) -> CgResult<RVal<'a>> {
        let len = self.i32_t.const_int(elems.len() as u64, false);
        let (obj, data) = self.build_list_obj(len, Rt::List)?;
        for (i, e) in elems.iter().enumerate() {
            let v = self.lower_expr(e, ctx)?;
            let boxed = self.to_box(v)?;
            let dst = self.elem_addr(data, self.i32_t.const_int(i as u64, false), "elem.dst")?;
            self.builder
                .build_store(dst, boxed)
                .map_err(|_| Diagnostic::simple("store build failed"))?;
        }
        Ok(RVal::Boxed(obj))
    }

    fn lower_access(&self, l: &SExpr, i: &SExpr, ctx: &mut FnCtx<'a>) -> CgResult<RVal<'a>> {
        let lv = self.lower_expr(l, ctx)?;
        let lobj = self.to_box(lv)?;
        let iv = self.lower_expr(i, ctx)?;
        let iobj = match iv {
            RVal::Raw(v, t) => self.build_box(v, t)?,
            RVal::Boxed(obj) => {
                if i.ty == Type::Dyn {
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

        if l.ty.is_arr() {
            let rt = self.rt_of(l.ty)?;
            let f = self
                .thunks
                .borrow()
                .get(&(rt, SLOT_IDX))
                .copied()
                .ok_or_else(|| Diagnostic::simple("missing idx thunk"))?;
            let cs = self
                .builder
                .build_call(f, &[lobj.into(), iobj.into()], "idx")
                .map_err(|_| Diagnostic::simple("call build failed"))?;
            let out = cs
                .try_as_basic_value()
                .left()
                .ok_or_else(|| Diagnostic::simple("idx returned no value"))?
                .into_pointer_value();
            return Ok(RVal::Boxed(out));
        }

        let slot = self.load_slot(lobj, SLOT_IDX)?;
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
            .build_indirect_call(fn_ty, slot, &[lobj.into(), iobj.into()], "idx")
            .map_err(|_| Diagnostic::simple("indirect call build failed"))?;
        let out = cs
            .try_as_basic_value()
            .left()
            .ok_or_else(|| Diagnostic::simple("idx returned no value"))?
            .into_pointer_value();
        Ok(RVal::Boxed(out))
    }

    fn raw_of(&self, v: RVal<'a>, ty: Type) -> CgResult<BasicValueEnum<'a>> {
        match v {
            RVal::Raw(val, _) => Ok(val),
            RVal::Boxed(obj) => self.unbox_raw(obj, ty),
        }
    }

    fn lower_cast(
        &self,
        to: Type,
        from: Type,
        inner: &SExpr,
        ctx: &mut FnCtx<'a>,
    ) -> CgResult<RVal<'a>> {
        let v = self.lower_expr(inner, ctx)?;
        match (from, to) {
            // Dyn sources: extraction (or reinterpretation) at the target.
            (Type::Dyn, t) if t.is_raw() => {
                let obj = self.to_box(v)?;
                Ok(RVal::Raw(self.unbox_raw(obj, t)?, t))
            }
            (Type::Dyn, Type::String) => Ok(RVal::Boxed(self.to_box(v)?)),
            // Numeric to string goes through the snprintf helpers.
            (f, Type::String) if f.is_raw() => {
                let raw = self.raw_of(v, f)?;
                let (helper, arg): (_, BasicMetadataValueEnum<'a>) = match f {
                    Type::Float => (self.get_float_str()?, raw.into()),
                    Type::Bool => {
                        let z = self
                            .builder
                            .build_int_z_extend(raw.into_int_value(), self.i32_t, "ext")
                            .map_err(|_| Diagnostic::simple("zext build failed"))?;
                        (self.get_int_str()?, z.into())
                    }
                    _ => (self.get_int_str()?, raw.into()),
                };
                let cs = self
                    .builder
                    .build_call(helper, &[arg], "tostr")
                    .map_err(|_| Diagnostic::simple("call build failed"))?;
                let obj = cs
                    .try_as_basic_value()
                    .left()
                    .ok_or_else(|| Diagnostic::simple("tostr returned no value"))?
                    .into_pointer_value();
                Ok(RVal::Boxed(obj))
            }
            (f, t) if f.is_raw() && t.is_raw() => {
                let raw = self.raw_of(v, f)?;
                Ok(RVal::Raw(self.convert_raw(raw, f, t)?, t))
            }
            // Aggregate-to-string casts only retag the static type.
            (_, Type::String) => Ok(RVal::Boxed(self.to_box(v)?)),
            (f, t) => Err(Diagnostic::simple(format!(
                "cast from {} to {} reached the emitter",
                f, t
            ))),
        }
    }

    fn convert_raw(
        &self,
        val: BasicValueEnum<'a>,
        from: Type,
        to: Type,
    ) -> CgResult<BasicValueEnum<'a>> {
        let out: BasicValueEnum<'a> = match (from, to) {
            (Type::Int, Type::Float) => self
                .builder
                .build_signed_int_to_float(val.into_int_value(), self.f64_t, "i2f")
                .map_err(|_| Diagnostic::simple("i2f build failed"))?
                .into(),
            (Type::Bool, Type::Float) => self
                .builder
                .build_unsigned_int_to_float(val.into_int_value(), self.f64_t, "b2f")
                .map_err(|_| Diagnostic::simple("b2f build failed"))?
                .into(),
            (Type::Float, Type::Int) => self
                .builder
                .build_float_to_signed_int(val.into_float_value(), self.i32_t, "f2i")
                .map_err(|_| Diagnostic::simple("f2i build failed"))?
                .into(),
            (Type::Bool, Type::Int) => self
                .builder
                .build_int_z_extend(val.into_int_value(), self.i32_t, "b2i")
                .map_err(|_| Diagnostic::simple("b2i build failed"))?
                .into(),
            (Type::Int, Type::Bool) => self
                .builder
                .build_int_compare(
                    IntPredicate::NE,
                    val.into_int_value(),
                    self.i32_t.const_zero(),
                    "i2b",
                )
                .map_err(|_| Diagnostic::simple("i2b build failed"))?
                .into(),
            (Type::Float, Type::Bool) => self
                .builder
                .build_float_compare(
                    FloatPredicate::UNE,
                    val.into_float_value(),
                    self.f64_t.const_zero(),
                    "f2b",
                )
                .map_err(|_| Diagnostic::simple("f2b build failed"))?
                .into(),
            (f, t) => {
                return Err(Diagnostic::simple(format!(
                    "no raw conversion from {} to {}",
                    f, t
                )));
            }
        };
        Ok(out)
    }
}
