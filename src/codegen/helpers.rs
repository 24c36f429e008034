//! Shared emission helpers: lazily-declared externs, object field access,
//! boxing and unboxing, runtime check guards, and the numeric-to-string
//! conversion helpers.

use inkwell::values::{BasicValueEnum, FunctionValue, IntValue, PointerValue};
use inkwell::IntPredicate;

use crate::ast::Type;
use crate::diagnostics::Diagnostic;

use super::ctype::{NUM_SLOTS, SLOT_HEAPIFY};
use super::{CgResult, CodeGen, RVal, Rt};

impl<'a> CodeGen<'a> {
    // Externs, declared on first use.

    pub fn get_printf(&self) -> FunctionValue<'a> {
        if let Some(f) = *self.fn_printf.borrow() {
            return f;
        }
        let fn_ty = self.i32_t.fn_type(&[self.ptr_t.into()], true);
        let f = self.module.add_function("printf", fn_ty, None);
        *self.fn_printf.borrow_mut() = Some(f);
        f
    }

    pub fn get_exit(&self) -> FunctionValue<'a> {
        if let Some(f) = *self.fn_exit.borrow() {
            return f;
        }
        let fn_ty = self.i32_t.fn_type(&[self.i32_t.into()], false);
        let f = self.module.add_function("exit", fn_ty, None);
        *self.fn_exit.borrow_mut() = Some(f);
        f
    }

    pub fn get_pow(&self) -> FunctionValue<'a> {
        if let Some(f) = *self.fn_pow.borrow() {
            return f;
        }
        let fn_ty = self
            .f64_t
            .fn_type(&[self.f64_t.into(), self.f64_t.into()], false);
        let f = self.module.add_function("pow", fn_ty, None);
        *self.fn_pow.borrow_mut() = Some(f);
        f
    }

    fn get_snprintf(&self) -> FunctionValue<'a> {
        if let Some(f) = *self.fn_snprintf.borrow() {
            return f;
        }
        let fn_ty = self.i32_t.fn_type(
            &[self.ptr_t.into(), self.i64_t.into(), self.ptr_t.into()],
            true,
        );
        let f = self.module.add_function("snprintf", fn_ty, None);
        *self.fn_snprintf.borrow_mut() = Some(f);
        f
    }

    /// Intern a string constant; identical contents share one global.
    pub(crate) fn intern_str(&self, s: &str, label: &str) -> CgResult<PointerValue<'a>> {
        if let Some(p) = self.interned.borrow().get(s) {
            return Ok(*p);
        }
        let id = self.str_id.get();
        self.str_id.set(id + 1);
        let g = self
            .builder
            .build_global_string_ptr(s, &format!("{}.{}", label, id))
            .map_err(|_| Diagnostic::simple("global string build failed"))?;
        let p = g.as_pointer_value();
        self.interned.borrow_mut().insert(s.to_string(), p);
        Ok(p)
    }

    // CObj field access.

    pub(crate) fn obj_data_addr(&self, obj: PointerValue<'a>) -> CgResult<PointerValue<'a>> {
        self.builder
            .build_struct_gep(self.cobj_t, obj, 0, "data.addr")
            .map_err(|_| Diagnostic::simple("gep build failed"))
    }

    pub(crate) fn obj_type_addr(&self, obj: PointerValue<'a>) -> CgResult<PointerValue<'a>> {
        self.builder
            .build_struct_gep(self.cobj_t, obj, 1, "type.addr")
            .map_err(|_| Diagnostic::simple("gep build failed"))
    }

    pub(crate) fn load_obj_data(&self, obj: PointerValue<'a>) -> CgResult<PointerValue<'a>> {
        let addr = self.obj_data_addr(obj)?;
        Ok(self
            .builder
            .build_load(self.ptr_t, addr, "data")
            .map_err(|_| Diagnostic::simple("load build failed"))?
            .into_pointer_value())
    }

    pub(crate) fn load_obj_type(&self, obj: PointerValue<'a>) -> CgResult<PointerValue<'a>> {
        let addr = self.obj_type_addr(obj)?;
        Ok(self
            .builder
            .build_load(self.ptr_t, addr, "type")
            .map_err(|_| Diagnostic::simple("load build failed"))?
            .into_pointer_value())
    }

    /// Load the primitive value an object's data field points at.
    pub(crate) fn load_prim(&self, obj: PointerValue<'a>, rt: Rt) -> CgResult<BasicValueEnum<'a>> {
        let data = self.load_obj_data(obj)?;
        let ty: inkwell::types::BasicTypeEnum = match rt {
            Rt::Int => self.i32_t.into(),
            Rt::Float => self.f64_t.into(),
            Rt::Bool => self.bool_t.into(),
            Rt::Char => self.i8_t.into(),
            _ => self.ptr_t.into(),
        };
        self.builder
            .build_load(ty, data, "prim")
            .map_err(|_| Diagnostic::simple("load build failed"))
    }

    pub(crate) fn unbox_raw(
        &self,
        obj: PointerValue<'a>,
        ty: Type,
    ) -> CgResult<BasicValueEnum<'a>> {
        self.load_prim(obj, self.rt_of(ty)?)
    }

    /// Load a dispatch-table slot off an object's runtime type.
    pub(crate) fn load_slot(&self, obj: PointerValue<'a>, slot: u32) -> CgResult<PointerValue<'a>> {
        let ty = self.load_obj_type(obj)?;
        self.load_slot_of(ty, slot)
    }

    pub(crate) fn load_slot_of(
        &self,
        ctype: PointerValue<'a>,
        slot: u32,
    ) -> CgResult<PointerValue<'a>> {
        debug_assert!(slot < NUM_SLOTS);
        let addr = unsafe {
            self.builder
                .build_in_bounds_gep(
                    self.ctype_t,
                    ctype,
                    &[
                        self.i32_t.const_zero(),
                        self.i32_t.const_int(slot as u64, false),
                    ],
                    "slot.addr",
                )
                .map_err(|_| Diagnostic::simple("gep build failed"))?
        };
        Ok(self
            .builder
            .build_load(self.ptr_t, addr, "slot")
            .map_err(|_| Diagnostic::simple("load build failed"))?
            .into_pointer_value())
    }

    // Boxing.

    /// Box a raw value into a freshly heap-allocated object.
    pub(crate) fn build_box_rt(
        &self,
        val: BasicValueEnum<'a>,
        rt: Rt,
    ) -> CgResult<PointerValue<'a>> {
        let data = self
            .builder
            .build_malloc(val.get_type(), "box.data")
            .map_err(|_| Diagnostic::simple("malloc build failed"))?;
        self.builder
            .build_store(data, val)
            .map_err(|_| Diagnostic::simple("store build failed"))?;
        let obj = self
            .builder
            .build_malloc(self.cobj_t, "box.obj")
            .map_err(|_| Diagnostic::simple("malloc build failed"))?;
        self.builder
            .build_store(self.obj_data_addr(obj)?, data)
            .map_err(|_| Diagnostic::simple("store build failed"))?;
        self.builder
            .build_store(self.obj_type_addr(obj)?, self.ctype_ptr(rt))
            .map_err(|_| Diagnostic::simple("store build failed"))?;
        Ok(obj)
    }

    pub(crate) fn build_box(
        &self,
        val: BasicValueEnum<'a>,
        ty: Type,
    ) -> CgResult<PointerValue<'a>> {
        self.build_box_rt(val, self.rt_of(ty)?)
    }

    /// Box over existing storage: the object's data field aliases `slot`
    /// rather than a fresh allocation. Used by the raw-to-Dyn transform;
    /// the caller must set `needs_heapify` on the receiving slot.
    pub(crate) fn build_box_of_slot(
        &self,
        slot: PointerValue<'a>,
        ty: Type,
    ) -> CgResult<PointerValue<'a>> {
        let obj = self
            .builder
            .build_malloc(self.cobj_t, "box.obj")
            .map_err(|_| Diagnostic::simple("malloc build failed"))?;
        self.builder
            .build_store(self.obj_data_addr(obj)?, slot)
            .map_err(|_| Diagnostic::simple("store build failed"))?;
        self.builder
            .build_store(self.obj_type_addr(obj)?, self.ctype_ptr(self.rt_of(ty)?))
            .map_err(|_| Diagnostic::simple("store build failed"))?;
        Ok(obj)
    }

    pub(crate) fn to_box(&self, v: RVal<'a>) -> CgResult<PointerValue<'a>> {
        match v {
            RVal::Raw(val, ty) => self.build_box(val, ty),
            RVal::Boxed(obj) => Ok(obj),
        }
    }

    /// Dispatch the heapify slot on an object. Raw-typed objects copy their
    /// data to the heap; aggregates are untouched. Always present in every
    /// table, so no slot guard is needed.
    pub(crate) fn dispatch_heapify(&self, obj: PointerValue<'a>) -> CgResult<PointerValue<'a>> {
        let slot = self.load_slot(obj, SLOT_HEAPIFY)?;
        let fn_ty = self.ptr_t.fn_type(&[self.ptr_t.into()], false);
        let cs = self
            .builder
            .build_indirect_call(fn_ty, slot, &[obj.into()], "heapify")
            .map_err(|_| Diagnostic::simple("indirect call build failed"))?;
        Ok(cs
            .try_as_basic_value()
            .left()
            .ok_or_else(|| Diagnostic::simple("heapify returned no value"))?
            .into_pointer_value())
    }

    // Runtime checks.

    /// Split-block check: when `ok` is false, print the message and
    /// `exit(1)`. A no-op when runtime checks are disabled.
    pub(crate) fn emit_guard(
        &self,
        f: FunctionValue<'a>,
        ok: IntValue<'a>,
        message: &str,
    ) -> CgResult<()> {
        if !self.exceptions {
            return Ok(());
        }
        let fail_bb = self.context.append_basic_block(f, "check.fail");
        let cont_bb = self.context.append_basic_block(f, "check.cont");
        self.builder
            .build_conditional_branch(ok, cont_bb, fail_bb)
            .map_err(|_| Diagnostic::simple("branch build failed"))?;

        self.builder.position_at_end(fail_bb);
        let msg = self.intern_str(&format!("{}\n", message), "err")?;
        self.builder
            .build_call(self.get_printf(), &[msg.into()], "printf")
            .map_err(|_| Diagnostic::simple("printf call build failed"))?;
        self.builder
            .build_call(
                self.get_exit(),
                &[self.i32_t.const_int(1, false).into()],
                "exit",
            )
            .map_err(|_| Diagnostic::simple("exit call build failed"))?;
        self.builder
            .build_unreachable()
            .map_err(|_| Diagnostic::simple("unreachable build failed"))?;

        self.builder.position_at_end(cont_bb);
        Ok(())
    }

    fn ptr_eq(
        &self,
        a: PointerValue<'a>,
        b: PointerValue<'a>,
        name: &str,
    ) -> CgResult<IntValue<'a>> {
        let ai = self
            .builder
            .build_ptr_to_int(a, self.i64_t, "lhs.addr")
            .map_err(|_| Diagnostic::simple("ptr to int build failed"))?;
        let bi = self
            .builder
            .build_ptr_to_int(b, self.i64_t, "rhs.addr")
            .map_err(|_| Diagnostic::simple("ptr to int build failed"))?;
        self.builder
            .build_int_compare(IntPredicate::EQ, ai, bi, name)
            .map_err(|_| Diagnostic::simple("cmp build failed"))
    }

    pub(crate) fn ptr_is_null(&self, p: PointerValue<'a>, name: &str) -> CgResult<IntValue<'a>> {
        let pi = self
            .builder
            .build_ptr_to_int(p, self.i64_t, "addr")
            .map_err(|_| Diagnostic::simple("ptr to int build failed"))?;
        self.builder
            .build_int_compare(IntPredicate::EQ, pi, self.i64_t.const_zero(), name)
            .map_err(|_| Diagnostic::simple("cmp build failed"))
    }

    /// Guard that an object's runtime type matches the expected static one.
    pub(crate) fn check_obj_type(
        &self,
        f: FunctionValue<'a>,
        obj: PointerValue<'a>,
        expected: Type,
        message: &str,
    ) -> CgResult<()> {
        if !self.exceptions {
            return Ok(());
        }
        // Types without a runtime table (object, null) have nothing to
        // compare against.
        let Ok(rt) = self.rt_of(expected) else {
            return Ok(());
        };
        let t = self.load_obj_type(obj)?;
        let ok = self.ptr_eq(t, self.ctype_ptr(rt), "type.ok")?;
        self.emit_guard(f, ok, message)
    }

    /// Guard against use of an uninitialized boxed name: the sentinel's
    /// data field is null.
    pub(crate) fn check_defined(
        &self,
        f: FunctionValue<'a>,
        obj: PointerValue<'a>,
        name: &str,
    ) -> CgResult<()> {
        if !self.exceptions {
            return Ok(());
        }
        let data = self.load_obj_data(obj)?;
        let is_null = self.ptr_is_null(data, "undef")?;
        let ok = self
            .builder
            .build_not(is_null, "defined")
            .map_err(|_| Diagnostic::simple("not build failed"))?;
        self.emit_guard(
            f,
            ok,
            &format!("RuntimeError: name '{}' is not defined", name),
        )
    }

    /// Guard that a dispatch slot is populated before calling through it.
    pub(crate) fn check_slot(
        &self,
        f: FunctionValue<'a>,
        slot: PointerValue<'a>,
        message: &str,
    ) -> CgResult<()> {
        if !self.exceptions {
            return Ok(());
        }
        let is_null = self.ptr_is_null(slot, "slot.null")?;
        let ok = self
            .builder
            .build_not(is_null, "slot.ok")
            .map_err(|_| Diagnostic::simple("not build failed"))?;
        self.emit_guard(f, ok, message)
    }

    /// Guard that two boxed operands share a runtime type.
    pub(crate) fn check_same_type(
        &self,
        f: FunctionValue<'a>,
        l: PointerValue<'a>,
        r: PointerValue<'a>,
        message: &str,
    ) -> CgResult<()> {
        if !self.exceptions {
            return Ok(());
        }
        let lt = self.load_obj_type(l)?;
        let rt = self.load_obj_type(r)?;
        let ok = self.ptr_eq(lt, rt, "types.match")?;
        self.emit_guard(f, ok, message)
    }

    // Numeric-to-string conversion, for casts.

    fn emit_num_str(&self, name: &str, is_float: bool) -> CgResult<FunctionValue<'a>> {
        let saved = self.builder.get_insert_block();
        let param: inkwell::types::BasicMetadataTypeEnum = if is_float {
            self.f64_t.into()
        } else {
            self.i32_t.into()
        };
        let fn_ty = self.ptr_t.fn_type(&[param], false);
        let f = self.module.add_function(name, fn_ty, None);
        let entry = self.context.append_basic_block(f, "entry");
        self.builder.position_at_end(entry);

        let v = f
            .get_nth_param(0)
            .ok_or_else(|| Diagnostic::simple("missing parameter"))?;
        let cap = self.i64_t.const_int(32, false);
        let buf = self
            .builder
            .build_array_malloc(self.i8_t, self.i32_t.const_int(32, false), "buf")
            .map_err(|_| Diagnostic::simple("array malloc build failed"))?;
        let fmt = self.intern_str(if is_float { "%g" } else { "%d" }, "fmt")?;
        let cs = self
            .builder
            .build_call(
                self.get_snprintf(),
                &[buf.into(), cap.into(), fmt.into(), v.into()],
                "snprintf",
            )
            .map_err(|_| Diagnostic::simple("snprintf call build failed"))?;
        let len = cs
            .try_as_basic_value()
            .left()
            .ok_or_else(|| Diagnostic::simple("snprintf returned no value"))?
            .into_int_value();
        let str_new = self
            .fn_str_new
            .borrow()
            .ok_or_else(|| Diagnostic::simple("str.new not emitted"))?;
        let cs = self
            .builder
            .build_call(str_new, &[buf.into(), len.into()], "tostr")
            .map_err(|_| Diagnostic::simple("str.new call build failed"))?;
        let obj = cs
            .try_as_basic_value()
            .left()
            .ok_or_else(|| Diagnostic::simple("str.new returned no value"))?;
        self.builder
            .build_return(Some(&obj))
            .map_err(|_| Diagnostic::simple("return build failed"))?;

        if let Some(bb) = saved {
            self.builder.position_at_end(bb);
        }
        Ok(f)
    }

    pub(crate) fn get_int_str(&self) -> CgResult<FunctionValue<'a>> {
        if let Some(f) = *self.fn_int_str.borrow() {
            return Ok(f);
        }
        let f = self.emit_num_str("int.str", false)?;
        *self.fn_int_str.borrow_mut() = Some(f);
        Ok(f)
    }

    pub(crate) fn get_float_str(&self) -> CgResult<FunctionValue<'a>> {
        if let Some(f) = *self.fn_float_str.borrow() {
            return Ok(f);
        }
        let f = self.emit_num_str("float.str", true)?;
        *self.fn_float_str.borrow_mut() = Some(f);
        Ok(f)
    }
}
