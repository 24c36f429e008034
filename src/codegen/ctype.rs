//! The `CType` dispatch tables and the per-primitive-type operator thunks.
//!
//! Every primitive runtime type gets a statically-initialized global table
//! of twenty function pointers, one per operation, in fixed slot order. A
//! null slot means the operation is unsupported for that type; call sites
//! guard the slot before dispatching. Thunks take and return `CObj*`: binary
//! thunks load both operands' data at the LLVM primitive type, apply the
//! table's instruction builder, and box the result into a fresh allocation.

use std::collections::HashMap;

use inkwell::values::{BasicValueEnum, FunctionValue, IntValue, PointerValue};
use inkwell::{FloatPredicate, IntPredicate};

use crate::ast::{Op, Uop};
use crate::diagnostics::Diagnostic;

use super::{CgResult, CodeGen, Rt};

pub const SLOT_ADD: u32 = 0;
pub const SLOT_SUB: u32 = 1;
pub const SLOT_MUL: u32 = 2;
pub const SLOT_DIV: u32 = 3;
pub const SLOT_EXP: u32 = 4;
pub const SLOT_EQ: u32 = 5;
pub const SLOT_NEQ: u32 = 6;
pub const SLOT_LT: u32 = 7;
pub const SLOT_LE: u32 = 8;
pub const SLOT_GT: u32 = 9;
pub const SLOT_GE: u32 = 10;
pub const SLOT_AND: u32 = 11;
pub const SLOT_OR: u32 = 12;
pub const SLOT_IDX: u32 = 13;
pub const SLOT_IDX_PARENT: u32 = 14;
pub const SLOT_NEG: u32 = 15;
pub const SLOT_NOT: u32 = 16;
pub const SLOT_HEAPIFY: u32 = 17;
pub const SLOT_PRINT: u32 = 18;
pub const SLOT_CALL: u32 = 19;
pub const NUM_SLOTS: u32 = 20;

const SLOT_NAMES: [&str; NUM_SLOTS as usize] = [
    "add", "sub", "mul", "div", "exp", "eq", "neq", "lt", "le", "gt", "ge", "and", "or", "idx",
    "idx_parent", "neg", "not", "heapify", "print", "call",
];

pub fn op_slot(op: Op) -> u32 {
    match op {
        Op::Add => SLOT_ADD,
        Op::Sub => SLOT_SUB,
        Op::Mul => SLOT_MUL,
        Op::Div => SLOT_DIV,
        Op::Exp => SLOT_EXP,
        Op::Eq => SLOT_EQ,
        Op::Neq => SLOT_NEQ,
        Op::Less => SLOT_LT,
        Op::Leq => SLOT_LE,
        Op::Greater => SLOT_GT,
        Op::Geq => SLOT_GE,
        Op::And => SLOT_AND,
        Op::Or => SLOT_OR,
    }
}

pub fn uop_slot(uop: Uop) -> u32 {
    match uop {
        Uop::Neg => SLOT_NEG,
        Uop::Not => SLOT_NOT,
    }
}

/// Instruction builders the numeric rows of the operator table can name.
#[derive(Clone, Copy)]
enum OpBuild {
    IAdd,
    ISub,
    IMul,
    IDiv,
    IPow,
    ICmp(IntPredicate),
    IAnd,
    IOr,
    INeg,
    INot,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FPow,
    FCmp(FloatPredicate),
    FNeg,
}

/// The numeric portion of the operator table:
/// `type → [(slot, builder, result type)]`.
fn numeric_table(rt: Rt) -> Vec<(u32, OpBuild, Rt)> {
    use OpBuild::*;
    match rt {
        Rt::Int => vec![
            (SLOT_ADD, IAdd, Rt::Int),
            (SLOT_SUB, ISub, Rt::Int),
            (SLOT_MUL, IMul, Rt::Int),
            (SLOT_DIV, IDiv, Rt::Int),
            (SLOT_EXP, IPow, Rt::Int),
            (SLOT_EQ, ICmp(IntPredicate::EQ), Rt::Bool),
            (SLOT_NEQ, ICmp(IntPredicate::NE), Rt::Bool),
            (SLOT_LT, ICmp(IntPredicate::SLT), Rt::Bool),
            (SLOT_LE, ICmp(IntPredicate::SLE), Rt::Bool),
            (SLOT_GT, ICmp(IntPredicate::SGT), Rt::Bool),
            (SLOT_GE, ICmp(IntPredicate::SGE), Rt::Bool),
            (SLOT_AND, IAnd, Rt::Int),
            (SLOT_OR, IOr, Rt::Int),
            (SLOT_NEG, INeg, Rt::Int),
            (SLOT_NOT, INot, Rt::Int),
        ],
        Rt::Bool => vec![
            (SLOT_ADD, IAdd, Rt::Bool),
            (SLOT_SUB, ISub, Rt::Bool),
            (SLOT_MUL, IMul, Rt::Bool),
            (SLOT_EXP, IPow, Rt::Bool),
            (SLOT_EQ, ICmp(IntPredicate::EQ), Rt::Bool),
            (SLOT_NEQ, ICmp(IntPredicate::NE), Rt::Bool),
            (SLOT_LT, ICmp(IntPredicate::SLT), Rt::Bool),
            (SLOT_LE, ICmp(IntPredicate::SLE), Rt::Bool),
            (SLOT_GT, ICmp(IntPredicate::SGT), Rt::Bool),
            (SLOT_GE, ICmp(IntPredicate::SGE), Rt::Bool),
            (SLOT_AND, IAnd, Rt::Bool),
            (SLOT_OR, IOr, Rt::Bool),
            (SLOT_NEG, INeg, Rt::Bool),
            (SLOT_NOT, INot, Rt::Bool),
        ],
        // The char row mirrors the int row over i8 data; `or` deliberately
        // uses the logical-or builder on the integer data.
        Rt::Char => vec![
            (SLOT_ADD, IAdd, Rt::Char),
            (SLOT_EQ, ICmp(IntPredicate::EQ), Rt::Bool),
            (SLOT_NEQ, ICmp(IntPredicate::NE), Rt::Bool),
            (SLOT_LT, ICmp(IntPredicate::SLT), Rt::Bool),
            (SLOT_LE, ICmp(IntPredicate::SLE), Rt::Bool),
            (SLOT_GT, ICmp(IntPredicate::SGT), Rt::Bool),
            (SLOT_GE, ICmp(IntPredicate::SGE), Rt::Bool),
            (SLOT_AND, IAnd, Rt::Char),
            (SLOT_OR, IOr, Rt::Char),
            (SLOT_NEG, INeg, Rt::Char),
            (SLOT_NOT, INot, Rt::Char),
        ],
        Rt::Float => vec![
            (SLOT_ADD, FAdd, Rt::Float),
            (SLOT_SUB, FSub, Rt::Float),
            (SLOT_MUL, FMul, Rt::Float),
            (SLOT_DIV, FDiv, Rt::Float),
            (SLOT_EXP, FPow, Rt::Float),
            (SLOT_EQ, FCmp(FloatPredicate::UEQ), Rt::Bool),
            (SLOT_NEQ, FCmp(FloatPredicate::UNE), Rt::Bool),
            (SLOT_LT, FCmp(FloatPredicate::ULT), Rt::Bool),
            (SLOT_LE, FCmp(FloatPredicate::ULE), Rt::Bool),
            (SLOT_GT, FCmp(FloatPredicate::UGT), Rt::Bool),
            (SLOT_GE, FCmp(FloatPredicate::UGE), Rt::Bool),
            (SLOT_NEG, FNeg, Rt::Float),
        ],
        Rt::List | Rt::Str | Rt::Func => Vec::new(),
    }
}

impl<'a> CodeGen<'a> {
    fn int_prim(&self, rt: Rt) -> inkwell::types::IntType<'a> {
        match rt {
            Rt::Int => self.i32_t,
            Rt::Bool => self.bool_t,
            Rt::Char => self.i8_t,
            _ => self.i32_t,
        }
    }

    fn thunk_name(rt: Rt, slot: u32) -> String {
        let ty = match rt {
            Rt::Int => "int",
            Rt::Float => "float",
            Rt::Bool => "bool",
            Rt::Char => "char",
            Rt::List => "list",
            Rt::Str => "str",
            Rt::Func => "func",
        };
        format!("{}.{}", ty, SLOT_NAMES[slot as usize])
    }

    fn begin_thunk(&self, name: &str, nargs: u32, void_ret: bool) -> CgResult<FunctionValue<'a>> {
        let params: Vec<inkwell::types::BasicMetadataTypeEnum> =
            (0..nargs).map(|_| self.ptr_t.into()).collect();
        let fn_ty = if void_ret {
            self.context.void_type().fn_type(&params, false)
        } else {
            self.ptr_t.fn_type(&params, false)
        };
        let f = self.module.add_function(name, fn_ty, None);
        let entry = self.context.append_basic_block(f, "entry");
        self.builder.position_at_end(entry);
        Ok(f)
    }

    fn param_obj(&self, f: FunctionValue<'a>, i: u32) -> CgResult<PointerValue<'a>> {
        Ok(f.get_nth_param(i)
            .ok_or_else(|| Diagnostic::simple("thunk missing parameter"))?
            .into_pointer_value())
    }

    /// Emit the per-type operator functions, the shared string helpers, and
    /// the seven `CType` table constants.
    pub(crate) fn emit_runtime(&self) -> CgResult<()> {
        let saved = self.builder.get_insert_block();

        self.emit_str_cmp()?;
        self.emit_str_new()?;

        let mut tables: HashMap<Rt, Vec<Option<FunctionValue<'a>>>> = HashMap::new();
        let all = [
            Rt::Int,
            Rt::Float,
            Rt::Bool,
            Rt::Char,
            Rt::List,
            Rt::Str,
            Rt::Func,
        ];
        for rt in all {
            tables.insert(rt, vec![None; NUM_SLOTS as usize]);
        }

        // Numeric rows, straight from the table.
        for rt in [Rt::Int, Rt::Float, Rt::Bool, Rt::Char] {
            for (slot, build, result) in numeric_table(rt) {
                let f = if matches!(slot, SLOT_NEG | SLOT_NOT) {
                    self.emit_numeric_unop_thunk(rt, slot, build, result)?
                } else {
                    self.emit_numeric_binop_thunk(rt, slot, build, result)?
                };
                tables.get_mut(&rt).unwrap()[slot as usize] = Some(f);
            }
            let h = self.emit_heapify_copy(rt)?;
            tables.get_mut(&rt).unwrap()[SLOT_HEAPIFY as usize] = Some(h);
            let p = self.emit_print_prim(rt)?;
            tables.get_mut(&rt).unwrap()[SLOT_PRINT as usize] = Some(p);
        }

        // Structural rows.
        for rt in [Rt::List, Rt::Str] {
            let t = tables.get_mut(&rt).unwrap();
            t[SLOT_ADD as usize] = Some(self.emit_concat_thunk(rt)?);
            t[SLOT_MUL as usize] = Some(self.emit_repeat_thunk(rt)?);
            t[SLOT_IDX as usize] = Some(self.emit_idx_thunk(rt)?);
            t[SLOT_IDX_PARENT as usize] = Some(self.emit_idx_parent_thunk(rt)?);
            t[SLOT_HEAPIFY as usize] = Some(self.emit_heapify_nop(rt)?);
            t[SLOT_PRINT as usize] = Some(self.emit_seq_print(rt)?);
        }
        for (slot, pred) in [
            (SLOT_EQ, IntPredicate::EQ),
            (SLOT_NEQ, IntPredicate::NE),
            (SLOT_LT, IntPredicate::SLT),
            (SLOT_LE, IntPredicate::SLE),
            (SLOT_GT, IntPredicate::SGT),
            (SLOT_GE, IntPredicate::SGE),
        ] {
            let f = self.emit_str_cmp_thunk(slot, pred)?;
            tables.get_mut(&Rt::Str).unwrap()[slot as usize] = Some(f);
        }
        {
            let t = tables.get_mut(&Rt::Func).unwrap();
            t[SLOT_HEAPIFY as usize] = Some(self.emit_heapify_nop(Rt::Func)?);
            t[SLOT_CALL as usize] = Some(self.emit_func_call_thunk()?);
        }

        // Initialize the table globals; missing operations stay null.
        for rt in all {
            let slots = &tables[&rt];
            let vals: Vec<PointerValue<'a>> = slots
                .iter()
                .map(|of| {
                    of.map(|f| f.as_global_value().as_pointer_value())
                        .unwrap_or_else(|| self.ptr_t.const_null())
                })
                .collect();
            let init = self.ptr_t.const_array(&vals);
            self.ctype_global(rt).set_initializer(&init);
            for (slot, of) in slots.iter().enumerate() {
                if let Some(f) = of {
                    self.thunks.borrow_mut().insert((rt, slot as u32), *f);
                }
            }
        }

        if let Some(bb) = saved {
            self.builder.position_at_end(bb);
        }
        Ok(())
    }

    pub(crate) fn ctype_global(&self, rt: Rt) -> inkwell::values::GlobalValue<'a> {
        self.ctype_globals[&rt]
    }

    fn emit_numeric_binop_thunk(
        &self,
        rt: Rt,
        slot: u32,
        build: OpBuild,
        result: Rt,
    ) -> CgResult<FunctionValue<'a>> {
        let f = self.begin_thunk(&Self::thunk_name(rt, slot), 2, false)?;
        let a = self.param_obj(f, 0)?;
        let b = self.param_obj(f, 1)?;
        let av = self.load_prim(a, rt)?;
        let bv = self.load_prim(b, rt)?;
        let res: BasicValueEnum<'a> = match build {
            OpBuild::IAdd | OpBuild::ISub | OpBuild::IMul | OpBuild::IDiv => {
                let (x, y) = (av.into_int_value(), bv.into_int_value());
                let v = match build {
                    OpBuild::IAdd => self.builder.build_int_add(x, y, "sum"),
                    OpBuild::ISub => self.builder.build_int_sub(x, y, "sub"),
                    OpBuild::IMul => self.builder.build_int_mul(x, y, "mul"),
                    _ => self.builder.build_int_signed_div(x, y, "div"),
                }
                .map_err(|_| Diagnostic::simple("int arith build failed"))?;
                v.into()
            }
            OpBuild::IPow => self.build_int_pow(av.into_int_value(), bv.into_int_value(), rt)?,
            OpBuild::ICmp(pred) => self
                .builder
                .build_int_compare(pred, av.into_int_value(), bv.into_int_value(), "cmp")
                .map_err(|_| Diagnostic::simple("int compare build failed"))?
                .into(),
            OpBuild::IAnd => self
                .builder
                .build_and(av.into_int_value(), bv.into_int_value(), "and")
                .map_err(|_| Diagnostic::simple("and build failed"))?
                .into(),
            OpBuild::IOr => self
                .builder
                .build_or(av.into_int_value(), bv.into_int_value(), "or")
                .map_err(|_| Diagnostic::simple("or build failed"))?
                .into(),
            OpBuild::FAdd | OpBuild::FSub | OpBuild::FMul | OpBuild::FDiv => {
                let (x, y) = (av.into_float_value(), bv.into_float_value());
                let v = match build {
                    OpBuild::FAdd => self.builder.build_float_add(x, y, "sum"),
                    OpBuild::FSub => self.builder.build_float_sub(x, y, "sub"),
                    OpBuild::FMul => self.builder.build_float_mul(x, y, "mul"),
                    _ => self.builder.build_float_div(x, y, "div"),
                }
                .map_err(|_| Diagnostic::simple("float arith build failed"))?;
                v.into()
            }
            OpBuild::FPow => {
                let pow = self.get_pow();
                let cs = self
                    .builder
                    .build_call(
                        pow,
                        &[av.into_float_value().into(), bv.into_float_value().into()],
                        "pow",
                    )
                    .map_err(|_| Diagnostic::simple("pow call build failed"))?;
                cs.try_as_basic_value()
                    .left()
                    .ok_or_else(|| Diagnostic::simple("pow returned no value"))?
            }
            OpBuild::FCmp(pred) => self
                .builder
                .build_float_compare(pred, av.into_float_value(), bv.into_float_value(), "cmp")
                .map_err(|_| Diagnostic::simple("float compare build failed"))?
                .into(),
            OpBuild::INeg | OpBuild::INot | OpBuild::FNeg => {
                return Err(Diagnostic::simple("unary builder in binary table row"));
            }
        };
        let obj = self.build_box_rt(res, result)?;
        self.builder
            .build_return(Some(&obj))
            .map_err(|_| Diagnostic::simple("thunk return build failed"))?;
        Ok(f)
    }

    fn emit_numeric_unop_thunk(
        &self,
        rt: Rt,
        slot: u32,
        build: OpBuild,
        result: Rt,
    ) -> CgResult<FunctionValue<'a>> {
        let f = self.begin_thunk(&Self::thunk_name(rt, slot), 1, false)?;
        let a = self.param_obj(f, 0)?;
        let av = self.load_prim(a, rt)?;
        let res: BasicValueEnum<'a> = match build {
            OpBuild::INeg => self
                .builder
                .build_int_neg(av.into_int_value(), "neg")
                .map_err(|_| Diagnostic::simple("neg build failed"))?
                .into(),
            OpBuild::INot => self
                .builder
                .build_not(av.into_int_value(), "not")
                .map_err(|_| Diagnostic::simple("not build failed"))?
                .into(),
            OpBuild::FNeg => self
                .builder
                .build_float_neg(av.into_float_value(), "neg")
                .map_err(|_| Diagnostic::simple("fneg build failed"))?
                .into(),
            _ => return Err(Diagnostic::simple("binary builder in unary table row")),
        };
        let obj = self.build_box_rt(res, result)?;
        self.builder
            .build_return(Some(&obj))
            .map_err(|_| Diagnostic::simple("thunk return build failed"))?;
        Ok(f)
    }

    /// Integer-family exponentiation round-trips through C `pow`.
    pub(crate) fn build_int_pow(
        &self,
        a: IntValue<'a>,
        b: IntValue<'a>,
        rt: Rt,
    ) -> CgResult<BasicValueEnum<'a>> {
        let to_f = |v: IntValue<'a>, name: &str| -> CgResult<inkwell::values::FloatValue<'a>> {
            let r = if rt == Rt::Bool {
                self.builder.build_unsigned_int_to_float(v, self.f64_t, name)
            } else {
                self.builder.build_signed_int_to_float(v, self.f64_t, name)
            };
            r.map_err(|_| Diagnostic::simple("int to float build failed"))
        };
        let af = to_f(a, "base")?;
        let bf = to_f(b, "expo")?;
        let pow = self.get_pow();
        let cs = self
            .builder
            .build_call(pow, &[af.into(), bf.into()], "pow")
            .map_err(|_| Diagnostic::simple("pow call build failed"))?;
        let rf = cs
            .try_as_basic_value()
            .left()
            .ok_or_else(|| Diagnostic::simple("pow returned no value"))?
            .into_float_value();
        let prim = self.int_prim(rt);
        let back = if rt == Rt::Bool {
            self.builder.build_float_to_unsigned_int(rf, prim, "powi")
        } else {
            self.builder.build_float_to_signed_int(rf, prim, "powi")
        }
        .map_err(|_| Diagnostic::simple("float to int build failed"))?;
        Ok(back.into())
    }

    /// Raw-type heapify: copy the value out of whatever storage the data
    /// pointer references into a fresh heap allocation, and repoint the
    /// object at it.
    fn emit_heapify_copy(&self, rt: Rt) -> CgResult<FunctionValue<'a>> {
        let f = self.begin_thunk(&Self::thunk_name(rt, SLOT_HEAPIFY), 1, false)?;
        let obj = self.param_obj(f, 0)?;
        let v = self.load_prim(obj, rt)?;
        let prim_ty: inkwell::types::BasicTypeEnum = if rt == Rt::Float {
            self.f64_t.into()
        } else {
            self.int_prim(rt).into()
        };
        let fresh = self
            .builder
            .build_malloc(prim_ty, "heap.data")
            .map_err(|_| Diagnostic::simple("malloc build failed"))?;
        self.builder
            .build_store(fresh, v)
            .map_err(|_| Diagnostic::simple("store build failed"))?;
        let data_addr = self.obj_data_addr(obj)?;
        self.builder
            .build_store(data_addr, fresh)
            .map_err(|_| Diagnostic::simple("store build failed"))?;
        self.builder
            .build_return(Some(&obj))
            .map_err(|_| Diagnostic::simple("thunk return build failed"))?;
        Ok(f)
    }

    /// Aggregates already live on the heap; heapify is the identity.
    fn emit_heapify_nop(&self, rt: Rt) -> CgResult<FunctionValue<'a>> {
        let f = self.begin_thunk(&Self::thunk_name(rt, SLOT_HEAPIFY), 1, false)?;
        let obj = self.param_obj(f, 0)?;
        self.builder
            .build_return(Some(&obj))
            .map_err(|_| Diagnostic::simple("thunk return build failed"))?;
        Ok(f)
    }

    fn emit_print_prim(&self, rt: Rt) -> CgResult<FunctionValue<'a>> {
        let f = self.begin_thunk(&Self::thunk_name(rt, SLOT_PRINT), 1, true)?;
        let obj = self.param_obj(f, 0)?;
        let v = self.load_prim(obj, rt)?;
        let printf = self.get_printf();
        let (fmt, arg): (&str, inkwell::values::BasicMetadataValueEnum) = match rt {
            Rt::Int => ("%d", v.into()),
            Rt::Float => ("%g", v.into()),
            Rt::Bool => {
                let z = self
                    .builder
                    .build_int_z_extend(v.into_int_value(), self.i32_t, "ext")
                    .map_err(|_| Diagnostic::simple("zext build failed"))?;
                ("%d", z.into())
            }
            _ => {
                let z = self
                    .builder
                    .build_int_z_extend(v.into_int_value(), self.i32_t, "ext")
                    .map_err(|_| Diagnostic::simple("zext build failed"))?;
                ("%c", z.into())
            }
        };
        let fmt_ptr = self.intern_str(fmt, "fmt")?;
        self.builder
            .build_call(printf, &[fmt_ptr.into(), arg], "printf")
            .map_err(|_| Diagnostic::simple("printf call build failed"))?;
        self.builder
            .build_return(None)
            .map_err(|_| Diagnostic::simple("thunk return build failed"))?;
        Ok(f)
    }

    /// Load the `CList` header out of an aggregate object: `(data, len)`.
    pub(crate) fn load_list_header(
        &self,
        obj: PointerValue<'a>,
    ) -> CgResult<(PointerValue<'a>, IntValue<'a>)> {
        let list = self.load_obj_data(obj)?;
        let data_addr = self
            .builder
            .build_struct_gep(self.clist_t, list, 0, "list.data.addr")
            .map_err(|_| Diagnostic::simple("gep build failed"))?;
        let data = self
            .builder
            .build_load(self.ptr_t, data_addr, "list.data")
            .map_err(|_| Diagnostic::simple("load build failed"))?
            .into_pointer_value();
        let len_addr = self
            .builder
            .build_struct_gep(self.clist_t, list, 1, "list.len.addr")
            .map_err(|_| Diagnostic::simple("gep build failed"))?;
        let len = self
            .builder
            .build_load(self.i32_t, len_addr, "list.len")
            .map_err(|_| Diagnostic::simple("load build failed"))?
            .into_int_value();
        Ok((data, len))
    }

    pub(crate) fn elem_addr(
        &self,
        data: PointerValue<'a>,
        idx: IntValue<'a>,
        name: &str,
    ) -> CgResult<PointerValue<'a>> {
        unsafe {
            self.builder
                .build_in_bounds_gep(self.ptr_t, data, &[idx], name)
                .map_err(|_| Diagnostic::simple("gep build failed"))
        }
    }

    /// Allocate a fresh `CList` of `len` element slots and wrap it in a
    /// `CObj` of the given runtime type. Returns `(obj, data)`.
    pub(crate) fn build_list_obj(
        &self,
        len: IntValue<'a>,
        rt: Rt,
    ) -> CgResult<(PointerValue<'a>, PointerValue<'a>)> {
        let data = self
            .builder
            .build_array_malloc(self.ptr_t, len, "list.data")
            .map_err(|_| Diagnostic::simple("array malloc build failed"))?;
        let list = self
            .builder
            .build_malloc(self.clist_t, "list.hdr")
            .map_err(|_| Diagnostic::simple("malloc build failed"))?;
        let st = |i: u32, v: BasicValueEnum<'a>, n: &str| -> CgResult<()> {
            let addr = self
                .builder
                .build_struct_gep(self.clist_t, list, i, n)
                .map_err(|_| Diagnostic::simple("gep build failed"))?;
            self.builder
                .build_store(addr, v)
                .map_err(|_| Diagnostic::simple("store build failed"))?;
            Ok(())
        };
        st(0, data.into(), "hdr.data")?;
        st(1, len.into(), "hdr.len")?;
        st(2, len.into(), "hdr.cap")?;

        let obj = self
            .builder
            .build_malloc(self.cobj_t, "list.obj")
            .map_err(|_| Diagnostic::simple("malloc build failed"))?;
        self.builder
            .build_store(self.obj_data_addr(obj)?, list)
            .map_err(|_| Diagnostic::simple("store build failed"))?;
        self.builder
            .build_store(self.obj_type_addr(obj)?, self.ctype_ptr(rt))
            .map_err(|_| Diagnostic::simple("store build failed"))?;
        Ok((obj, data))
    }

    /// Concatenation by shallow pointer copy.
    fn emit_concat_thunk(&self, rt: Rt) -> CgResult<FunctionValue<'a>> {
        let f = self.begin_thunk(&Self::thunk_name(rt, SLOT_ADD), 2, false)?;
        let a = self.param_obj(f, 0)?;
        let b = self.param_obj(f, 1)?;
        let (da, la) = self.load_list_header(a)?;
        let (db, lb) = self.load_list_header(b)?;
        let n = self
            .builder
            .build_int_add(la, lb, "cat.len")
            .map_err(|_| Diagnostic::simple("add build failed"))?;
        let (obj, nd) = self.build_list_obj(n, rt)?;

        self.emit_counted_loop(f, la, |cg, i| {
            let src = cg.elem_addr(da, i, "src")?;
            let v = cg
                .builder
                .build_load(cg.ptr_t, src, "elem")
                .map_err(|_| Diagnostic::simple("load build failed"))?;
            let dst = cg.elem_addr(nd, i, "dst")?;
            cg.builder
                .build_store(dst, v)
                .map_err(|_| Diagnostic::simple("store build failed"))?;
            Ok(())
        })?;
        self.emit_counted_loop(f, lb, |cg, i| {
            let src = cg.elem_addr(db, i, "src")?;
            let v = cg
                .builder
                .build_load(cg.ptr_t, src, "elem")
                .map_err(|_| Diagnostic::simple("load build failed"))?;
            let off = cg
                .builder
                .build_int_add(la, i, "off")
                .map_err(|_| Diagnostic::simple("add build failed"))?;
            let dst = cg.elem_addr(nd, off, "dst")?;
            cg.builder
                .build_store(dst, v)
                .map_err(|_| Diagnostic::simple("store build failed"))?;
            Ok(())
        })?;

        self.builder
            .build_return(Some(&obj))
            .map_err(|_| Diagnostic::simple("thunk return build failed"))?;
        Ok(f)
    }

    /// Repetition (`seq * n`): shallow pointer copy, negative counts clamp
    /// to empty.
    fn emit_repeat_thunk(&self, rt: Rt) -> CgResult<FunctionValue<'a>> {
        let f = self.begin_thunk(&Self::thunk_name(rt, SLOT_MUL), 2, false)?;
        let a = self.param_obj(f, 0)?;
        let b = self.param_obj(f, 1)?;
        let (da, la) = self.load_list_header(a)?;
        let k = self.load_prim(b, Rt::Int)?.into_int_value();
        let zero = self.i32_t.const_zero();
        let neg = self
            .builder
            .build_int_compare(IntPredicate::SLT, k, zero, "neg")
            .map_err(|_| Diagnostic::simple("cmp build failed"))?;
        let k = self
            .builder
            .build_select(neg, zero, k, "reps")
            .map_err(|_| Diagnostic::simple("select build failed"))?
            .into_int_value();
        let total = self
            .builder
            .build_int_mul(la, k, "rep.len")
            .map_err(|_| Diagnostic::simple("mul build failed"))?;
        let (obj, nd) = self.build_list_obj(total, rt)?;

        self.emit_counted_loop(f, total, |cg, i| {
            let src_i = cg
                .builder
                .build_int_signed_rem(i, la, "src.i")
                .map_err(|_| Diagnostic::simple("rem build failed"))?;
            let src = cg.elem_addr(da, src_i, "src")?;
            let v = cg
                .builder
                .build_load(cg.ptr_t, src, "elem")
                .map_err(|_| Diagnostic::simple("load build failed"))?;
            let dst = cg.elem_addr(nd, i, "dst")?;
            cg.builder
                .build_store(dst, v)
                .map_err(|_| Diagnostic::simple("store build failed"))?;
            Ok(())
        })?;

        self.builder
            .build_return(Some(&obj))
            .map_err(|_| Diagnostic::simple("thunk return build failed"))?;
        Ok(f)
    }

    fn emit_bounds_check(
        &self,
        f: FunctionValue<'a>,
        idx: IntValue<'a>,
        len: IntValue<'a>,
    ) -> CgResult<()> {
        if !self.exceptions {
            return Ok(());
        }
        let ge0 = self
            .builder
            .build_int_compare(IntPredicate::SGE, idx, self.i32_t.const_zero(), "ge0")
            .map_err(|_| Diagnostic::simple("cmp build failed"))?;
        let lt_len = self
            .builder
            .build_int_compare(IntPredicate::SLT, idx, len, "ltlen")
            .map_err(|_| Diagnostic::simple("cmp build failed"))?;
        let ok = self
            .builder
            .build_and(ge0, lt_len, "inbounds")
            .map_err(|_| Diagnostic::simple("and build failed"))?;
        self.emit_guard(f, ok, "RuntimeError: list index out of bounds")
    }

    /// List indexing returns the stored object; string indexing returns a
    /// freshly allocated single-char string.
    fn emit_idx_thunk(&self, rt: Rt) -> CgResult<FunctionValue<'a>> {
        let f = self.begin_thunk(&Self::thunk_name(rt, SLOT_IDX), 2, false)?;
        let a = self.param_obj(f, 0)?;
        let b = self.param_obj(f, 1)?;
        let (da, la) = self.load_list_header(a)?;
        let iv = self.load_prim(b, Rt::Int)?.into_int_value();
        self.emit_bounds_check(f, iv, la)?;
        let addr = self.elem_addr(da, iv, "elem.addr")?;
        let elem = self
            .builder
            .build_load(self.ptr_t, addr, "elem")
            .map_err(|_| Diagnostic::simple("load build failed"))?
            .into_pointer_value();
        if rt == Rt::Str {
            let one = self.i32_t.const_int(1, false);
            let (obj, nd) = self.build_list_obj(one, Rt::Str)?;
            let dst = self.elem_addr(nd, self.i32_t.const_zero(), "dst")?;
            self.builder
                .build_store(dst, elem)
                .map_err(|_| Diagnostic::simple("store build failed"))?;
            self.builder
                .build_return(Some(&obj))
                .map_err(|_| Diagnostic::simple("thunk return build failed"))?;
        } else {
            self.builder
                .build_return(Some(&elem))
                .map_err(|_| Diagnostic::simple("thunk return build failed"))?;
        }
        Ok(f)
    }

    /// Returns a pointer to the element slot itself, for indexed stores.
    fn emit_idx_parent_thunk(&self, rt: Rt) -> CgResult<FunctionValue<'a>> {
        let f = self.begin_thunk(&Self::thunk_name(rt, SLOT_IDX_PARENT), 2, false)?;
        let a = self.param_obj(f, 0)?;
        let b = self.param_obj(f, 1)?;
        let (da, la) = self.load_list_header(a)?;
        let iv = self.load_prim(b, Rt::Int)?.into_int_value();
        self.emit_bounds_check(f, iv, la)?;
        let addr = self.elem_addr(da, iv, "elem.addr")?;
        self.builder
            .build_return(Some(&addr))
            .map_err(|_| Diagnostic::simple("thunk return build failed"))?;
        Ok(f)
    }

    /// `[` elem `, ` elem `, ` ... `]` for lists (the trailing separator is
    /// part of the format); bare elements for strings.
    fn emit_seq_print(&self, rt: Rt) -> CgResult<FunctionValue<'a>> {
        let f = self.begin_thunk(&Self::thunk_name(rt, SLOT_PRINT), 1, true)?;
        let obj = self.param_obj(f, 0)?;
        let (data, len) = self.load_list_header(obj)?;
        let printf = self.get_printf();
        if rt == Rt::List {
            let open = self.intern_str("[", "fmt")?;
            self.builder
                .build_call(printf, &[open.into()], "printf")
                .map_err(|_| Diagnostic::simple("printf call build failed"))?;
        }
        let sep = if rt == Rt::List {
            Some(self.intern_str(", ", "fmt")?)
        } else {
            None
        };
        self.emit_counted_loop(f, len, |cg, i| {
            let addr = cg.elem_addr(data, i, "elem.addr")?;
            let elem = cg
                .builder
                .build_load(cg.ptr_t, addr, "elem")
                .map_err(|_| Diagnostic::simple("load build failed"))?
                .into_pointer_value();
            let slot = cg.load_slot(elem, SLOT_PRINT)?;
            let fn_ty = cg.context.void_type().fn_type(&[cg.ptr_t.into()], false);
            cg.builder
                .build_indirect_call(fn_ty, slot, &[elem.into()], "print")
                .map_err(|_| Diagnostic::simple("indirect call build failed"))?;
            if let Some(sep) = sep {
                cg.builder
                    .build_call(printf, &[sep.into()], "printf")
                    .map_err(|_| Diagnostic::simple("printf call build failed"))?;
            }
            Ok(())
        })?;
        if rt == Rt::List {
            let close = self.intern_str("]", "fmt")?;
            self.builder
                .build_call(printf, &[close.into()], "printf")
                .map_err(|_| Diagnostic::simple("printf call build failed"))?;
        }
        self.builder
            .build_return(None)
            .map_err(|_| Diagnostic::simple("thunk return build failed"))?;
        Ok(f)
    }

    /// Lexicographic comparison helper shared by the string comparison
    /// thunks: `i32 str.cmp(ptr, ptr)` returning -1/0/1.
    fn emit_str_cmp(&self) -> CgResult<()> {
        let fn_ty = self
            .i32_t
            .fn_type(&[self.ptr_t.into(), self.ptr_t.into()], false);
        let f = self.module.add_function("str.cmp", fn_ty, None);
        let entry = self.context.append_basic_block(f, "entry");
        self.builder.position_at_end(entry);

        let a = self.param_obj(f, 0)?;
        let b = self.param_obj(f, 1)?;
        let (da, la) = self.load_list_header(a)?;
        let (db, lb) = self.load_list_header(b)?;
        let a_shorter = self
            .builder
            .build_int_compare(IntPredicate::SLT, la, lb, "a.shorter")
            .map_err(|_| Diagnostic::simple("cmp build failed"))?;
        let min = self
            .builder
            .build_select(a_shorter, la, lb, "min")
            .map_err(|_| Diagnostic::simple("select build failed"))?
            .into_int_value();

        let neg_one = self.i32_t.const_int(u64::MAX, true);
        let one = self.i32_t.const_int(1, false);

        let cond_bb = self.context.append_basic_block(f, "cmp.cond");
        let body_bb = self.context.append_basic_block(f, "cmp.body");
        let lens_bb = self.context.append_basic_block(f, "cmp.lens");
        let lt_bb = self.context.append_basic_block(f, "cmp.lt");
        let gt_bb = self.context.append_basic_block(f, "cmp.gt");

        let i_slot = self
            .builder
            .build_alloca(self.i32_t, "i")
            .map_err(|_| Diagnostic::simple("alloca build failed"))?;
        self.builder
            .build_store(i_slot, self.i32_t.const_zero())
            .map_err(|_| Diagnostic::simple("store build failed"))?;
        self.builder
            .build_unconditional_branch(cond_bb)
            .map_err(|_| Diagnostic::simple("branch build failed"))?;

        self.builder.position_at_end(cond_bb);
        let i = self
            .builder
            .build_load(self.i32_t, i_slot, "i")
            .map_err(|_| Diagnostic::simple("load build failed"))?
            .into_int_value();
        let in_range = self
            .builder
            .build_int_compare(IntPredicate::SLT, i, min, "inrange")
            .map_err(|_| Diagnostic::simple("cmp build failed"))?;
        self.builder
            .build_conditional_branch(in_range, body_bb, lens_bb)
            .map_err(|_| Diagnostic::simple("branch build failed"))?;

        self.builder.position_at_end(body_bb);
        let load_char = |data: PointerValue<'a>| -> CgResult<IntValue<'a>> {
            let addr = self.elem_addr(data, i, "ch.addr")?;
            let elem = self
                .builder
                .build_load(self.ptr_t, addr, "ch.obj")
                .map_err(|_| Diagnostic::simple("load build failed"))?
                .into_pointer_value();
            Ok(self.load_prim(elem, Rt::Char)?.into_int_value())
        };
        let ca = load_char(da)?;
        let cb = load_char(db)?;
        let ca_lt = self
            .builder
            .build_int_compare(IntPredicate::SLT, ca, cb, "ch.lt")
            .map_err(|_| Diagnostic::simple("cmp build failed"))?;
        let step_bb = self.context.append_basic_block(f, "cmp.step");
        let gt_chk_bb = self.context.append_basic_block(f, "cmp.gtchk");
        self.builder
            .build_conditional_branch(ca_lt, lt_bb, gt_chk_bb)
            .map_err(|_| Diagnostic::simple("branch build failed"))?;
        self.builder.position_at_end(gt_chk_bb);
        let ca_gt = self
            .builder
            .build_int_compare(IntPredicate::SGT, ca, cb, "ch.gt")
            .map_err(|_| Diagnostic::simple("cmp build failed"))?;
        self.builder
            .build_conditional_branch(ca_gt, gt_bb, step_bb)
            .map_err(|_| Diagnostic::simple("branch build failed"))?;
        self.builder.position_at_end(step_bb);
        let next = self
            .builder
            .build_int_add(i, self.i32_t.const_int(1, false), "next")
            .map_err(|_| Diagnostic::simple("add build failed"))?;
        self.builder
            .build_store(i_slot, next)
            .map_err(|_| Diagnostic::simple("store build failed"))?;
        self.builder
            .build_unconditional_branch(cond_bb)
            .map_err(|_| Diagnostic::simple("branch build failed"))?;

        self.builder.position_at_end(lens_bb);
        let la_lt = self
            .builder
            .build_int_compare(IntPredicate::SLT, la, lb, "len.lt")
            .map_err(|_| Diagnostic::simple("cmp build failed"))?;
        let la_gt = self
            .builder
            .build_int_compare(IntPredicate::SGT, la, lb, "len.gt")
            .map_err(|_| Diagnostic::simple("cmp build failed"))?;
        let by_len = self
            .builder
            .build_select(la_lt, neg_one, self.i32_t.const_zero(), "by.len")
            .map_err(|_| Diagnostic::simple("select build failed"))?
            .into_int_value();
        let by_len = self
            .builder
            .build_select(la_gt, one, by_len, "by.len2")
            .map_err(|_| Diagnostic::simple("select build failed"))?;
        self.builder
            .build_return(Some(&by_len))
            .map_err(|_| Diagnostic::simple("return build failed"))?;

        self.builder.position_at_end(lt_bb);
        self.builder
            .build_return(Some(&neg_one))
            .map_err(|_| Diagnostic::simple("return build failed"))?;
        self.builder.position_at_end(gt_bb);
        self.builder
            .build_return(Some(&one))
            .map_err(|_| Diagnostic::simple("return build failed"))?;

        *self.fn_str_cmp.borrow_mut() = Some(f);
        Ok(())
    }

    fn emit_str_cmp_thunk(&self, slot: u32, pred: IntPredicate) -> CgResult<FunctionValue<'a>> {
        let f = self.begin_thunk(&Self::thunk_name(Rt::Str, slot), 2, false)?;
        let a = self.param_obj(f, 0)?;
        let b = self.param_obj(f, 1)?;
        let cmp_fn = self
            .fn_str_cmp
            .borrow()
            .ok_or_else(|| Diagnostic::simple("str.cmp not emitted"))?;
        let cs = self
            .builder
            .build_call(cmp_fn, &[a.into(), b.into()], "cmp")
            .map_err(|_| Diagnostic::simple("call build failed"))?;
        let c = cs
            .try_as_basic_value()
            .left()
            .ok_or_else(|| Diagnostic::simple("str.cmp returned no value"))?
            .into_int_value();
        let r = self
            .builder
            .build_int_compare(pred, c, self.i32_t.const_zero(), "rel")
            .map_err(|_| Diagnostic::simple("cmp build failed"))?;
        let obj = self.build_box_rt(r.into(), Rt::Bool)?;
        self.builder
            .build_return(Some(&obj))
            .map_err(|_| Diagnostic::simple("thunk return build failed"))?;
        Ok(f)
    }

    /// Build a `CString` from raw bytes: `ptr str.new(ptr bytes, i32 len)`.
    /// Each character becomes its own boxed char object.
    fn emit_str_new(&self) -> CgResult<()> {
        let fn_ty = self
            .ptr_t
            .fn_type(&[self.ptr_t.into(), self.i32_t.into()], false);
        let f = self.module.add_function("str.new", fn_ty, None);
        let entry = self.context.append_basic_block(f, "entry");
        self.builder.position_at_end(entry);

        let bytes = self.param_obj(f, 0)?;
        let len = f
            .get_nth_param(1)
            .ok_or_else(|| Diagnostic::simple("str.new missing len"))?
            .into_int_value();
        let (obj, data) = self.build_list_obj(len, Rt::Str)?;

        self.emit_counted_loop(f, len, |cg, i| {
            let src = unsafe {
                cg.builder
                    .build_in_bounds_gep(cg.i8_t, bytes, &[i], "byte.addr")
                    .map_err(|_| Diagnostic::simple("gep build failed"))?
            };
            let c = cg
                .builder
                .build_load(cg.i8_t, src, "byte")
                .map_err(|_| Diagnostic::simple("load build failed"))?;
            let ch_obj = cg.build_box_rt(c, Rt::Char)?;
            let dst = cg.elem_addr(data, i, "dst")?;
            cg.builder
                .build_store(dst, ch_obj)
                .map_err(|_| Diagnostic::simple("store build failed"))?;
            Ok(())
        })?;

        self.builder
            .build_return(Some(&obj))
            .map_err(|_| Diagnostic::simple("return build failed"))?;
        *self.fn_str_new.borrow_mut() = Some(f);
        Ok(())
    }

    /// The generic call trampoline: loads the function pointer out of the
    /// callee object's data field and invokes it with `(callee, argv)`.
    fn emit_func_call_thunk(&self) -> CgResult<FunctionValue<'a>> {
        let f = self.begin_thunk(&Self::thunk_name(Rt::Func, SLOT_CALL), 2, false)?;
        let fobj = self.param_obj(f, 0)?;
        let argv = self.param_obj(f, 1)?;
        let fp = self.load_obj_data(fobj)?;
        let fn_ty = self
            .ptr_t
            .fn_type(&[self.ptr_t.into(), self.ptr_t.into()], false);
        let cs = self
            .builder
            .build_indirect_call(fn_ty, fp, &[fobj.into(), argv.into()], "call")
            .map_err(|_| Diagnostic::simple("indirect call build failed"))?;
        let r = cs
            .try_as_basic_value()
            .left()
            .ok_or_else(|| Diagnostic::simple("generic call returned no value"))?;
        self.builder
            .build_return(Some(&r))
            .map_err(|_| Diagnostic::simple("thunk return build failed"))?;
        Ok(f)
    }

    /// Emit `for i in 0..n { body }` around the builder's current position,
    /// leaving it at the loop exit.
    pub(crate) fn emit_counted_loop<F>(
        &self,
        f: FunctionValue<'a>,
        n: IntValue<'a>,
        body: F,
    ) -> CgResult<()>
    where
        F: Fn(&Self, IntValue<'a>) -> CgResult<()>,
    {
        let i_slot = self
            .builder
            .build_alloca(self.i32_t, "i")
            .map_err(|_| Diagnostic::simple("alloca build failed"))?;
        self.builder
            .build_store(i_slot, self.i32_t.const_zero())
            .map_err(|_| Diagnostic::simple("store build failed"))?;
        let cond_bb = self.context.append_basic_block(f, "loop.cond");
        let body_bb = self.context.append_basic_block(f, "loop.body");
        let end_bb = self.context.append_basic_block(f, "loop.end");
        self.builder
            .build_unconditional_branch(cond_bb)
            .map_err(|_| Diagnostic::simple("branch build failed"))?;

        self.builder.position_at_end(cond_bb);
        let i = self
            .builder
            .build_load(self.i32_t, i_slot, "i")
            .map_err(|_| Diagnostic::simple("load build failed"))?
            .into_int_value();
        let in_range = self
            .builder
            .build_int_compare(IntPredicate::SLT, i, n, "inrange")
            .map_err(|_| Diagnostic::simple("cmp build failed"))?;
        self.builder
            .build_conditional_branch(in_range, body_bb, end_bb)
            .map_err(|_| Diagnostic::simple("branch build failed"))?;

        self.builder.position_at_end(body_bb);
        body(self, i)?;
        let next = self
            .builder
            .build_int_add(i, self.i32_t.const_int(1, false), "next")
            .map_err(|_| Diagnostic::simple("add build failed"))?;
        self.builder
            .build_store(i_slot, next)
            .map_err(|_| Diagnostic::simple("store build failed"))?;
        self.builder
            .build_unconditional_branch(cond_bb)
            .map_err(|_| Diagnostic::simple("branch build failed"))?;

        self.builder.position_at_end(end_bb);
        Ok(())
    }
}
