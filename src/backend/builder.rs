//! Typed SSA value/instruction builder: arithmetic, comparison, branch,
//! call, load/store, cast, and GEP.
//!
//! SSA registers and block labels are formatted strings with a running
//! counter, and every builder method is a `writeln!` into a per-function
//! string buffer. The raw strings are wrapped in newtypes ([`Value`],
//! [`BasicBlock`]) so the rest of the compiler never formats IR syntax
//! itself — only this module and [`super::types::TypeMapper`] know what the
//! textual form looks like.

use crate::types::{BuiltinKind, Type};
use std::fmt::Write as _;

/// A typed SSA value: an LLVM register name (or an immediate constant
/// rendered as a bare literal) plus its [`Type`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Value {
    text: String,
    pub ty: Type,
}

impl Value {
    /// A raw register reference, e.g. `%3`. Used by callers (notably
    /// [`crate::symbol`]'s tests) that only care about the SSA name.
    pub fn register(name: impl Into<String>) -> Self {
        Value {
            text: name.into(),
            ty: Type::void(),
        }
    }

    pub fn typed(name: impl Into<String>, ty: Type) -> Self {
        Value {
            text: name.into(),
            ty,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// A basic-block label handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BasicBlock(pub String);

impl BasicBlock {
    pub fn label(&self) -> &str {
        &self.0
    }
}

/// A declared or defined function handle. Parameter/return types are
/// already-lowered IR type text (see [`crate::backend::types::TypeMapper`]);
/// the *language*-level signature lives in
/// [`crate::registry::Registries::function_param_types`] /
/// `function_return_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionValue {
    pub name: String,
    pub param_ir_types: Vec<String>,
    pub return_ir_type: String,
    pub external: bool,
    pub variadic: bool,
}

/// Integer comparison predicates the builder can emit: signed vs unsigned
/// chosen per operand signedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntPredicate {
    Eq,
    Ne,
    SLt,
    SLe,
    SGt,
    SGe,
    ULt,
    ULe,
    UGt,
    UGe,
}

impl IntPredicate {
    fn mnemonic(self) -> &'static str {
        match self {
            IntPredicate::Eq => "eq",
            IntPredicate::Ne => "ne",
            IntPredicate::SLt => "slt",
            IntPredicate::SLe => "sle",
            IntPredicate::SGt => "sgt",
            IntPredicate::SGe => "sge",
            IntPredicate::ULt => "ult",
            IntPredicate::ULe => "ule",
            IntPredicate::UGt => "ugt",
            IntPredicate::UGe => "uge",
        }
    }

    pub fn signed(is_signed: bool, op: ComparisonOp) -> Self {
        use ComparisonOp::*;
        match (op, is_signed) {
            (Eq, _) => IntPredicate::Eq,
            (Ne, _) => IntPredicate::Ne,
            (Lt, true) => IntPredicate::SLt,
            (Lt, false) => IntPredicate::ULt,
            (Le, true) => IntPredicate::SLe,
            (Le, false) => IntPredicate::ULe,
            (Gt, true) => IntPredicate::SGt,
            (Gt, false) => IntPredicate::UGt,
            (Ge, true) => IntPredicate::SGe,
            (Ge, false) => IntPredicate::UGe,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// One function's IR builder: owns the growing instruction text, the
/// current insertion block, and the SSA/label counters for this function
/// only. Per-function state lives only as long as that function's lowering.
pub struct Builder {
    body: String,
    next_reg: u32,
    next_label: u32,
    current_block: BasicBlock,
    /// Whether the current block already has a terminator — further
    /// terminators are elided once one exists.
    terminated: bool,
}

impl Builder {
    pub fn new(entry_block: BasicBlock) -> Self {
        let mut body = String::new();
        let _ = writeln!(body, "{}:", entry_block.label());
        Builder {
            body,
            next_reg: 0,
            next_label: 0,
            current_block: entry_block,
            terminated: false,
        }
    }

    pub fn into_body(self) -> String {
        self.body
    }

    pub fn current_block(&self) -> &BasicBlock {
        &self.current_block
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    fn fresh_reg(&mut self) -> String {
        let name = format!("%r{}", self.next_reg);
        self.next_reg += 1;
        name
    }

    /// Allocate a fresh block label without switching to it; the caller
    /// emits a terminator that targets it and later calls
    /// [`Builder::switch_to_block`].
    pub fn fresh_block(&mut self, hint: &str) -> BasicBlock {
        let label = format!("{hint}.{}", self.next_label);
        self.next_label += 1;
        BasicBlock(label)
    }

    /// Begin emitting into a new (already-allocated) block. Resets the
    /// terminated flag: each block tracks its own terminator independently.
    pub fn switch_to_block(&mut self, block: BasicBlock) {
        let _ = writeln!(self.body, "{}:", block.label());
        self.current_block = block;
        self.terminated = false;
    }

    fn emit(&mut self, line: &str) {
        if self.terminated {
            // : an instruction after a terminator in the same
            // block is dead code reachable only via a fallthrough that
            // cannot occur in well-formed input; silently drop it rather
            // than emit invalid IR with two terminators.
            return;
        }
        let _ = writeln!(self.body, "  {line}");
    }

    // -- arithmetic / comparison --------------------------------------

    pub fn int_binop(&mut self, op: &str, ty_text: &str, lhs: &Value, rhs: &Value, result_ty: Type) -> Value {
        let reg = self.fresh_reg();
        self.emit(&format!(
            "{reg} = {op} {ty_text} {}, {}",
            lhs.text(),
            rhs.text()
        ));
        Value::typed(reg, result_ty)
    }

    pub fn float_binop(&mut self, op: &str, ty_text: &str, lhs: &Value, rhs: &Value, result_ty: Type) -> Value {
        let reg = self.fresh_reg();
        self.emit(&format!(
            "{reg} = f{op} {ty_text} {}, {}",
            lhs.text(),
            rhs.text()
        ));
        Value::typed(reg, result_ty)
    }

    pub fn icmp(&mut self, pred: IntPredicate, ty_text: &str, lhs: &Value, rhs: &Value) -> Value {
        let reg = self.fresh_reg();
        self.emit(&format!(
            "{reg} = icmp {} {ty_text} {}, {}",
            pred.mnemonic(),
            lhs.text(),
            rhs.text()
        ));
        // icmp natively yields i1; the caller (codegen::expr) widens to the
        // 8-bit boolean representation with `zext`.
        Value::typed(reg, Type::Builtin(BuiltinKind::Bool))
    }

    pub fn zext(&mut self, value: &Value, from_ty: &str, to_ty: &str, result_ty: Type) -> Value {
        let reg = self.fresh_reg();
        self.emit(&format!(
            "{reg} = zext {from_ty} {} to {to_ty}",
            value.text()
        ));
        Value::typed(reg, result_ty)
    }

    pub fn sext(&mut self, value: &Value, from_ty: &str, to_ty: &str, result_ty: Type) -> Value {
        let reg = self.fresh_reg();
        self.emit(&format!(
            "{reg} = sext {from_ty} {} to {to_ty}",
            value.text()
        ));
        Value::typed(reg, result_ty)
    }

    pub fn trunc(&mut self, value: &Value, from_ty: &str, to_ty: &str, result_ty: Type) -> Value {
        let reg = self.fresh_reg();
        self.emit(&format!(
            "{reg} = trunc {from_ty} {} to {to_ty}",
            value.text()
        ));
        Value::typed(reg, result_ty)
    }

    pub fn bitcast(&mut self, value: &Value, from_ty: &str, to_ty: &str, result_ty: Type) -> Value {
        let reg = self.fresh_reg();
        self.emit(&format!(
            "{reg} = bitcast {from_ty} {} to {to_ty}",
            value.text()
        ));
        Value::typed(reg, result_ty)
    }

    // -- memory ----------------------------------------------------------

    pub fn alloca(&mut self, ty_text: &str, result_ty: Type) -> Value {
        let reg = self.fresh_reg();
        self.emit(&format!("{reg} = alloca {ty_text}"));
        Value::typed(reg, result_ty)
    }

    pub fn load(&mut self, ty_text: &str, ptr: &Value, result_ty: Type) -> Value {
        let reg = self.fresh_reg();
        self.emit(&format!("{reg} = load {ty_text}, ptr {}", ptr.text()));
        Value::typed(reg, result_ty)
    }

    pub fn store(&mut self, ty_text: &str, value: &Value, ptr: &Value) {
        self.emit(&format!("store {ty_text} {}, ptr {}", value.text(), ptr.text()));
    }

    /// GEP-like address computation for member access / subscript.
    pub fn gep(&mut self, elem_ty_text: &str, base: &Value, indices: &[(&str, &str)], result_ty: Type) -> Value {
        let reg = self.fresh_reg();
        let mut idx_text = String::new();
        for (ty, val) in indices {
            let _ = write!(idx_text, ", {ty} {val}");
        }
        self.emit(&format!(
            "{reg} = getelementptr inbounds {elem_ty_text}, ptr {}{idx_text}",
            base.text()
        ));
        Value::typed(reg, result_ty)
    }

    // -- calls -------------------------------------------------------------

    pub fn call(
        &mut self,
        callee: &str,
        args: &[(String, Value)],
        return_ty_text: &str,
        result_ty: Type,
    ) -> Option<Value> {
        let arg_text = args
            .iter()
            .map(|(ty, v)| format!("{ty} {}", v.text()))
            .collect::<Vec<_>>()
            .join(", ");
        if return_ty_text == "void" {
            self.emit(&format!("call void @{callee}({arg_text})"));
            None
        } else {
            let reg = self.fresh_reg();
            self.emit(&format!(
                "{reg} = call {return_ty_text} @{callee}({arg_text})"
            ));
            Some(Value::typed(reg, result_ty))
        }
    }

    // -- control flow --------------------------------------------------

    pub fn br(&mut self, target: &BasicBlock) {
        self.emit(&format!("br label %{}", target.label()));
        self.terminated = true;
    }

    pub fn cond_br(&mut self, cond: &Value, then_bb: &BasicBlock, else_bb: &BasicBlock) {
        self.emit(&format!(
            "br i1 {}, label %{}, label %{}",
            cond.text(),
            then_bb.label(),
            else_bb.label()
        ));
        self.terminated = true;
    }

    pub fn ret(&mut self, ty_text: &str, value: &Value) {
        self.emit(&format!("ret {ty_text} {}", value.text()));
        self.terminated = true;
    }

    pub fn ret_void(&mut self) {
        self.emit("ret void");
        self.terminated = true;
    }

    pub fn unreachable(&mut self) {
        self.emit("unreachable");
        self.terminated = true;
    }

    /// A phi node merging values from predecessor blocks — used by logical
    /// `&&`/`||` lowering's short-circuit-via-branches-and-merge shape.
    pub fn phi(&mut self, ty_text: &str, incoming: &[(Value, BasicBlock)], result_ty: Type) -> Value {
        let reg = self.fresh_reg();
        let pairs = incoming
            .iter()
            .map(|(v, bb)| format!("[ {}, %{} ]", v.text(), bb.label()))
            .collect::<Vec<_>>()
            .join(", ");
        self.emit(&format!("{reg} = phi {ty_text} {pairs}"));
        Value::typed(reg, result_ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_terminator_in_a_block_is_elided() {
        let mut b = Builder::new(BasicBlock("entry".into()));
        b.ret_void();
        assert!(b.is_terminated());
        b.ret_void();
        let body = b.into_body();
        assert_eq!(body.matches("ret void").count(), 1);
    }

    #[test]
    fn switching_blocks_resets_terminated_flag() {
        let mut b = Builder::new(BasicBlock("entry".into()));
        let next = b.fresh_block("next");
        b.br(&next);
        assert!(b.is_terminated());
        b.switch_to_block(next);
        assert!(!b.is_terminated());
    }

    #[test]
    fn icmp_yields_boolean_typed_value() {
        let mut b = Builder::new(BasicBlock("entry".into()));
        let lhs = Value::typed("%a", Type::i32());
        let rhs = Value::typed("%b", Type::i32());
        let v = b.icmp(IntPredicate::SLt, "i32", &lhs, &rhs);
        assert_eq!(v.ty, Type::bool());
    }
}
