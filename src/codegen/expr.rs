//! Expression lowering.
//!
//! One `match` arm per expression form, each lowering to a typed SSA
//! [`Value`] and returning it.

use crate::ast::{BinaryOp, CompoundAssignOp, Expression, IncDecOp, UnaryOp};
use crate::backend::builder::{Builder, ComparisonOp, IntPredicate, Value};
use crate::codegen::state::CodeGen;
use crate::codegen::toplevel::class_field_offset;
use crate::diagnostics::CodegenError;
use crate::ident::{Identifier, Path};
use crate::mangle::{mangle_function, mangle_method, Accessibility};
use crate::namespace::{EntryKind, NamespaceEntry};
use crate::registry::FunctionHandle;
use crate::types::{promote, BuiltinKind, Type};

/// Lower one expression, producing a typed SSA value.
pub fn lower_expr(cg: &mut CodeGen, b: &mut Builder, expr: &Expression) -> Result<Value, CodegenError> {
    match expr {
        Expression::IntLiteral { value, .. } => Ok(Value::typed(value.to_string(), Type::i32())),
        Expression::FloatLiteral { value, .. } => {
            Ok(Value::typed(format!("{value:e}"), Type::Builtin(BuiltinKind::F64)))
        }
        Expression::BoolLiteral { value, .. } => {
            Ok(Value::typed(if *value { "1" } else { "0" }, Type::bool()))
        }
        Expression::CharLiteral { value, .. } => {
            Ok(Value::typed((*value as u32).to_string(), Type::Builtin(BuiltinKind::Char)))
        }
        Expression::StringLiteral { value, node } => lower_string_literal(cg, value, *node),
        Expression::NameRef { name, node } => lower_name_ref(cg, b, name, *node),
        Expression::Grouping { inner, .. } => lower_expr(cg, b, inner),
        Expression::Unary { op, operand, node } => lower_unary(cg, b, *op, operand, *node),
        Expression::Binary { op, lhs, rhs, node } => lower_binary(cg, b, *op, lhs, rhs, *node),
        Expression::Assign { target, value, node } => lower_assign(cg, b, target, value, *node),
        Expression::CompoundAssign { op, target, value, node } => {
            lower_compound_assign(cg, b, *op, target, value, *node)
        }
        Expression::IncDec { op, target, node } => lower_inc_dec(cg, b, *op, target, *node),
        Expression::Call { callee, args, node } => lower_call(cg, b, callee, args, *node),
        Expression::TemplateCall {
            callee,
            template_args,
            args,
            node,
        } => crate::codegen::templates::lower_template_call(cg, b, callee, template_args, args, *node),
        Expression::MemberAccess { object, member, node } => lower_member_access(cg, b, object, member, *node),
        Expression::ScopeResolution { path, node } => {
            let last = path.segments().pop().unwrap_or_default();
            lower_name_ref(cg, b, &Identifier::new(last), *node)
        }
        Expression::ArrayIndex { array, index, node } => lower_array_index(cg, b, array, index, *node),
        Expression::Cast { target_type, operand, node } => lower_cast(cg, b, target_type, operand, *node),
        Expression::New { ty, args, node } => lower_new(cg, b, ty, args, *node),
        Expression::Delete { operand, node } => lower_delete(cg, b, operand, *node),
        Expression::Sizeof { ty, .. } => {
            let resolved = crate::codegen::templates::resolve_type_in_scope(cg, ty);
            let size = crate::backend::types::TypeMapper::size_of(&resolved);
            Ok(Value::typed(size.to_string(), Type::Builtin(BuiltinKind::U64)))
        }
        Expression::Null { .. } => Ok(Value::typed("null", Type::Builtin(BuiltinKind::Void).pointer_to(1))),
        Expression::ArrayLiteral { elements, node } => lower_array_literal(cg, b, elements, *node),
        Expression::ClassLiteral { ty, args, node } => lower_new(cg, b, ty, args, *node),
    }
}

fn lower_string_literal(cg: &mut CodeGen, value: &str, _node: crate::diagnostics::NodeId) -> Result<Value, CodegenError> {
    let bytes = value.as_bytes();
    let len = bytes.len() + 1;
    let escaped: String = bytes
        .iter()
        .map(|b| format!("\\{b:02X}"))
        .collect::<Vec<_>>()
        .join("");
    let name = cg
        .module
        .add_global(&format!("private unnamed_addr constant [{len} x i8] c\"{escaped}\\00\""));
    Ok(Value::typed(
        name,
        Type::Builtin(BuiltinKind::U8).pointer_to(1),
    ))
}

fn lower_name_ref(
    cg: &mut CodeGen,
    b: &mut Builder,
    name: &Identifier,
    node: crate::diagnostics::NodeId,
) -> Result<Value, CodegenError> {
    let Some(var) = cg.scopes.lookup(name).cloned() else {
        return Err(cg.error_at(node, |msg| CodegenError::UnknownName(format!("{msg}: unknown name '{name}'"))));
    };
    let ty_text = cg.type_mapper.map(&var.ty);
    Ok(b.load(&ty_text, &var.alloca, var.ty))
}

fn lower_unary(
    cg: &mut CodeGen,
    b: &mut Builder,
    op: UnaryOp,
    operand: &Expression,
    node: crate::diagnostics::NodeId,
) -> Result<Value, CodegenError> {
    match op {
        UnaryOp::AddressOf => lower_lvalue_address(cg, b, operand),
        UnaryOp::Deref => {
            let ptr = lower_expr(cg, b, operand)?;
            let Type::Pointer { pointee, .. } = ptr.ty.clone() else {
                return Err(cg.error_at(node, |msg| CodegenError::TypeMismatch(format!("{msg}: cannot dereference a non-pointer"))));
            };
            let ty_text = cg.type_mapper.map(&pointee);
            Ok(b.load(&ty_text, &ptr, *pointee))
        }
        UnaryOp::Neg => {
            let v = lower_expr(cg, b, operand)?;
            let ty_text = cg.type_mapper.map(&v.ty);
            let zero = Value::typed("0", v.ty.clone());
            if v.ty.is_float() {
                Ok(b.float_binop("sub", &ty_text, &zero, &v, v.ty.clone()))
            } else {
                Ok(b.int_binop("sub", &ty_text, &zero, &v, v.ty.clone()))
            }
        }
        UnaryOp::Not => {
            let v = lower_expr(cg, b, operand)?;
            let ty_text = cg.type_mapper.map(&v.ty);
            let one = Value::typed("1", v.ty.clone());
            Ok(b.int_binop("xor", &ty_text, &v, &one, v.ty))
        }
        UnaryOp::BitNot => {
            let v = lower_expr(cg, b, operand)?;
            let ty_text = cg.type_mapper.map(&v.ty);
            let neg_one = Value::typed("-1", v.ty.clone());
            Ok(b.int_binop("xor", &ty_text, &v, &neg_one, v.ty))
        }
    }
}

/// Compute the address (not the loaded value) of an lvalue expression —
/// needed for `&expr`, assignment targets, and compound assignment.
fn lower_lvalue_address(cg: &mut CodeGen, b: &mut Builder, expr: &Expression) -> Result<Value, CodegenError> {
    match expr {
        Expression::NameRef { name, node } => {
            let Some(var) = cg.scopes.lookup(name).cloned() else {
                return Err(cg.error_at(*node, |msg| CodegenError::UnknownName(format!("{msg}: unknown name '{name}'"))));
            };
            Ok(Value::typed(var.alloca.text().to_string(), var.ty.pointer_to(1)))
        }
        Expression::MemberAccess { object, member, node } => lower_member_address(cg, b, object, member, *node),
        Expression::ArrayIndex { array, index, node } => lower_array_address(cg, b, array, index, *node),
        Expression::Unary {
            op: UnaryOp::Deref,
            operand,
            ..
        } => lower_expr(cg, b, operand),
        other => Err(cg.error_at(other.node(), |msg| {
            CodegenError::NotAssignable(format!("{msg}: expression is not an lvalue"))
        })),
    }
}

fn lower_binary(
    cg: &mut CodeGen,
    b: &mut Builder,
    op: BinaryOp,
    lhs: &Expression,
    rhs: &Expression,
    node: crate::diagnostics::NodeId,
) -> Result<Value, CodegenError> {
    // Short-circuit logical operators lower to branches + a merge, not a
    // plain instruction.
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        return lower_short_circuit(cg, b, op, lhs, rhs);
    }

    let l = lower_expr(cg, b, lhs)?;
    let r = lower_expr(cg, b, rhs)?;

    if let (Type::Builtin(lb), Type::Builtin(rb)) = (&l.ty, &r.ty) {
        if lb.is_integer() && rb.is_integer() {
            let result_kind = promote(*lb, *rb);
            let ty_text = cg.type_mapper.map(&Type::Builtin(result_kind));
            return Ok(lower_int_binary(b, op, &ty_text, &l, &r, result_kind));
        }
        if lb.is_float() && rb.is_float() {
            let ty_text = cg.type_mapper.map(&l.ty);
            return Ok(lower_float_binary(cg, b, op, &ty_text, &l, &r, node)?);
        }
    }
    Err(cg.error_at(node, |msg| {
        CodegenError::TypeMismatch(format!("{msg}: incompatible operand types for binary operator"))
    }))
}

fn lower_int_binary(b: &mut Builder, op: BinaryOp, ty_text: &str, l: &Value, r: &Value, result_kind: BuiltinKind) -> Value {
    let result_ty = Type::Builtin(result_kind);
    match op {
        BinaryOp::Add => b.int_binop("add", ty_text, l, r, result_ty),
        BinaryOp::Sub => b.int_binop("sub", ty_text, l, r, result_ty),
        BinaryOp::Mul => b.int_binop("mul", ty_text, l, r, result_ty),
        BinaryOp::Div => b.int_binop(if result_kind.is_signed() { "sdiv" } else { "udiv" }, ty_text, l, r, result_ty),
        BinaryOp::Rem => b.int_binop(if result_kind.is_signed() { "srem" } else { "urem" }, ty_text, l, r, result_ty),
        BinaryOp::BitOr => b.int_binop("or", ty_text, l, r, result_ty),
        BinaryOp::BitXor => b.int_binop("xor", ty_text, l, r, result_ty),
        BinaryOp::BitAnd => b.int_binop("and", ty_text, l, r, result_ty),
        BinaryOp::Shl => b.int_binop("shl", ty_text, l, r, result_ty),
        BinaryOp::Shr => b.int_binop(if result_kind.is_signed() { "ashr" } else { "lshr" }, ty_text, l, r, result_ty),
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            let pred = IntPredicate::signed(result_kind.is_signed(), comparison_op(op));
            let raw = b.icmp(pred, ty_text, l, r);
            b.zext(&raw, "i1", "i8", Type::bool())
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("handled by lower_short_circuit"),
    }
}

fn lower_float_binary(
    cg: &mut CodeGen,
    b: &mut Builder,
    op: BinaryOp,
    ty_text: &str,
    l: &Value,
    r: &Value,
    node: crate::diagnostics::NodeId,
) -> Result<Value, CodegenError> {
    let result_ty = l.ty.clone();
    Ok(match op {
        BinaryOp::Add => b.float_binop("add", ty_text, l, r, result_ty),
        BinaryOp::Sub => b.float_binop("sub", ty_text, l, r, result_ty),
        BinaryOp::Mul => b.float_binop("mul", ty_text, l, r, result_ty),
        BinaryOp::Div => b.float_binop("div", ty_text, l, r, result_ty),
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            let mnemonic = match op {
                BinaryOp::Eq => "oeq",
                BinaryOp::Ne => "one",
                BinaryOp::Lt => "olt",
                BinaryOp::Gt => "ogt",
                BinaryOp::Le => "ole",
                BinaryOp::Ge => "oge",
                _ => unreachable!(),
            };
            return Ok(b_fcmp(b, mnemonic, ty_text, l, r));
        }
        _ => {
            return Err(cg.error_at(node, |msg| {
                CodegenError::UnknownOperator(format!("{msg}: operator not valid on floats"))
            }))
        }
    })
}

/// `cond_br`/`br_if` need an `i1`, but every boolean in Ember is carried as
/// the 8-bit representation; truncate right at the
/// branch rather than widening every producer back down.
pub(crate) fn to_i1(b: &mut Builder, cond: &Value) -> Value {
    b.trunc(cond, "i8", "i1", Type::bool())
}

fn b_fcmp(b: &mut Builder, mnemonic: &str, ty_text: &str, l: &Value, r: &Value) -> Value {
    // Builder has no dedicated `fcmp` entry point (only integer `icmp`);
    // reuse `int_binop`'s raw-opcode formatting since both just splice an
    // opcode string between two typed operands. The raw result is i1, so
    // widen it to the 8-bit boolean representation like `icmp` callers do.
    let raw = b.int_binop(&format!("fcmp {mnemonic}"), ty_text, l, r, Type::bool());
    b.zext(&raw, "i1", "i8", Type::bool())
}

fn comparison_op(op: BinaryOp) -> ComparisonOp {
    match op {
        BinaryOp::Eq => ComparisonOp::Eq,
        BinaryOp::Ne => ComparisonOp::Ne,
        BinaryOp::Lt => ComparisonOp::Lt,
        BinaryOp::Gt => ComparisonOp::Gt,
        BinaryOp::Le => ComparisonOp::Le,
        BinaryOp::Ge => ComparisonOp::Ge,
        _ => unreachable!("only called for comparison operators"),
    }
}

/// `a && b` / `a || b`: evaluate `a`, branch, evaluate `b` only on the
/// short-circuit-surviving path, and join with a phi.
fn lower_short_circuit(
    cg: &mut CodeGen,
    b: &mut Builder,
    op: BinaryOp,
    lhs: &Expression,
    rhs: &Expression,
) -> Result<Value, CodegenError> {
    let l = lower_expr(cg, b, lhs)?;
    let rhs_block = b.fresh_block("sc.rhs");
    let merge_block = b.fresh_block("sc.merge");
    let short_circuit_block = b.fresh_block("sc.short");

    let (then_bb, else_bb) = match op {
        BinaryOp::And => (rhs_block.clone(), short_circuit_block.clone()),
        BinaryOp::Or => (short_circuit_block.clone(), rhs_block.clone()),
        _ => unreachable!(),
    };
    let cond = to_i1(b, &l);
    b.cond_br(&cond, &then_bb, &else_bb);

    b.switch_to_block(short_circuit_block.clone());
    let short_value = Value::typed(if matches!(op, BinaryOp::And) { "0" } else { "1" }, Type::bool());
    b.br(&merge_block);
    let short_circuit_exit = b.current_block().clone();

    b.switch_to_block(rhs_block);
    let r = lower_expr(cg, b, rhs)?;
    b.br(&merge_block);
    let rhs_exit = b.current_block().clone();

    b.switch_to_block(merge_block);
    Ok(b.phi(
        "i8",
        &[(short_value, short_circuit_exit), (r, rhs_exit)],
        Type::bool(),
    ))
}

fn lower_assign(
    cg: &mut CodeGen,
    b: &mut Builder,
    target: &Expression,
    value: &Expression,
    node: crate::diagnostics::NodeId,
) -> Result<Value, CodegenError> {
    let addr = lower_lvalue_address(cg, b, target)?;
    let Type::Pointer { pointee, .. } = addr.ty.clone() else {
        return Err(cg.error_at(node, |msg| CodegenError::NotAssignable(format!("{msg}: invalid assignment target"))));
    };
    let v = lower_expr(cg, b, value)?;
    let ty_text = cg.type_mapper.map(&pointee);
    b.store(&ty_text, &v, &addr);
    Ok(v)
}

fn lower_compound_assign(
    cg: &mut CodeGen,
    b: &mut Builder,
    op: CompoundAssignOp,
    target: &Expression,
    value: &Expression,
    node: crate::diagnostics::NodeId,
) -> Result<Value, CodegenError> {
    let binop = match op {
        CompoundAssignOp::Add => BinaryOp::Add,
        CompoundAssignOp::Sub => BinaryOp::Sub,
        CompoundAssignOp::Mul => BinaryOp::Mul,
        CompoundAssignOp::Div => BinaryOp::Div,
    };
    let addr = lower_lvalue_address(cg, b, target)?;
    let Type::Pointer { pointee, .. } = addr.ty.clone() else {
        return Err(cg.error_at(node, |msg| CodegenError::NotAssignable(format!("{msg}: invalid assignment target"))));
    };
    let ty_text = cg.type_mapper.map(&pointee);
    let current = b.load(&ty_text, &addr, *pointee.clone());
    let rhs = lower_expr(cg, b, value)?;
    let combined = if pointee.is_float() {
        lower_float_binary(cg, b, binop, &ty_text, &current, &rhs, node)?
    } else {
        let kind = match &*pointee {
            Type::Builtin(k) => *k,
            _ => {
                return Err(cg.error_at(node, |msg| {
                    CodegenError::TypeMismatch(format!("{msg}: compound assignment requires a scalar"))
                }))
            }
        };
        lower_int_binary(b, binop, &ty_text, &current, &rhs, kind)
    };
    b.store(&ty_text, &combined, &addr);
    Ok(combined)
}

fn lower_inc_dec(
    cg: &mut CodeGen,
    b: &mut Builder,
    op: IncDecOp,
    target: &Expression,
    node: crate::diagnostics::NodeId,
) -> Result<Value, CodegenError> {
    let addr = lower_lvalue_address(cg, b, target)?;
    let Type::Pointer { pointee, .. } = addr.ty.clone() else {
        return Err(cg.error_at(node, |msg| CodegenError::NotAssignable(format!("{msg}: invalid ++/-- target"))));
    };
    let ty_text = cg.type_mapper.map(&pointee);
    let current = b.load(&ty_text, &addr, *pointee.clone());
    let kind = match &*pointee {
        Type::Builtin(k) => *k,
        _ => {
            return Err(cg.error_at(node, |msg| {
                CodegenError::TypeMismatch(format!("{msg}: ++/-- requires an integer"))
            }))
        }
    };
    let one = Value::typed("1", *pointee.clone());
    let updated = match op {
        IncDecOp::Increment => lower_int_binary(b, BinaryOp::Add, &ty_text, &current, &one, kind),
        IncDecOp::Decrement => lower_int_binary(b, BinaryOp::Sub, &ty_text, &current, &one, kind),
    };
    b.store(&ty_text, &updated, &addr);
    Ok(updated)
}

fn lower_call(
    cg: &mut CodeGen,
    b: &mut Builder,
    callee: &Expression,
    args: &[Expression],
    node: crate::diagnostics::NodeId,
) -> Result<Value, CodegenError> {
    match callee {
        Expression::NameRef { name, .. } => lower_plain_call(cg, b, name, args, node),
        Expression::ScopeResolution { path, .. } => lower_scoped_call(cg, b, path, args, node),
        Expression::MemberAccess { object, member, .. } => lower_method_call(cg, b, object, member, args, node),
        _ => Err(cg.error_at(node, |msg| {
            CodegenError::UnknownName(format!("{msg}: call target must be a name, a scoped path, or a method access"))
        })),
    }
}

/// A bare `name(args)` call: a free function, or — when no function of that
/// name is registered but a class is — bare class-literal construction
/// (`Box(42)`), reusing [`lower_new`]'s allocation path.
fn lower_plain_call(
    cg: &mut CodeGen,
    b: &mut Builder,
    name: &Identifier,
    args: &[Expression],
    node: crate::diagnostics::NodeId,
) -> Result<Value, CodegenError> {
    if resolve_function_symbol(cg, name, node).is_err() && cg.registries.find_class_by_name(name).is_some() {
        return lower_new(cg, b, &Type::UserDefined(name.clone()), args, node);
    }

    let mut arg_values = Vec::with_capacity(args.len());
    for a in args {
        arg_values.push(lower_expr(cg, b, a)?);
    }

    let mangled = resolve_function_symbol(cg, name, node)?;
    call_registered_function(cg, b, &mangled, &format!("'{name}'"), arg_values, node)
}

/// `ns::func(args)`: resolved against the path's own namespace segments,
/// not the caller's enclosing scope — `a::b::c(...)` always means the `c`
/// registered under namespace `a::b`, regardless of where the call sits.
fn lower_scoped_call(
    cg: &mut CodeGen,
    b: &mut Builder,
    path: &Path,
    args: &[Expression],
    node: crate::diagnostics::NodeId,
) -> Result<Value, CodegenError> {
    let mut arg_values = Vec::with_capacity(args.len());
    for a in args {
        arg_values.push(lower_expr(cg, b, a)?);
    }
    let arg_types: Vec<Type> = arg_values.iter().map(|v| v.ty.clone()).collect();

    let mut segments = path.segments();
    let Some(name) = segments.pop() else {
        return Err(cg.error_at(node, |msg| CodegenError::UnknownName(format!("{msg}: empty scope path"))));
    };
    let name = Identifier::new(name);
    let entries: Vec<NamespaceEntry> = segments
        .into_iter()
        .map(|s| NamespaceEntry {
            name: Identifier::new(s),
            kind: EntryKind::Namespace,
        })
        .collect();
    let candidate = mangle_function(&entries, &name, Accessibility::Public, &arg_types);
    let candidate_priv = mangle_function(&entries, &name, Accessibility::Private, &arg_types);
    let mangled = if cg.registries.function_return_type.contains_key(&FunctionHandle(candidate.clone())) {
        candidate
    } else if cg
        .registries
        .function_return_type
        .contains_key(&FunctionHandle(candidate_priv.clone()))
    {
        candidate_priv
    } else {
        return Err(cg.error_at(node, |msg| CodegenError::UnknownName(format!("{msg}: unknown function '{path}'"))));
    };
    call_registered_function(cg, b, &mangled, &format!("'{path}'"), arg_values, node)
}

/// `obj.method(args)`: resolve `method` against `obj`'s class, mangled the
/// same way a constructor/destructor is — the class pushed as a `Class`
/// namespace entry — then call it with `obj` prepended as the implicit
/// receiver. The receiver is never part of the registered parameter types
/// (those come straight from the method's declared, receiver-less
/// parameter list), only of the emitted call's argument list, matching the
/// extra leading `ptr %arg.self` [`lower_function_with_receiver`]
/// (crate::codegen::toplevel) always emits.
fn lower_method_call(
    cg: &mut CodeGen,
    b: &mut Builder,
    object: &Expression,
    member: &Identifier,
    args: &[Expression],
    node: crate::diagnostics::NodeId,
) -> Result<Value, CodegenError> {
    let obj = lower_expr(cg, b, object)?;
    let class_name = match obj.ty.decay_reference() {
        Type::UserDefined(n) => n.clone(),
        Type::Pointer { pointee, .. } => match pointee.decay_reference() {
            Type::UserDefined(n) => n.clone(),
            _ => {
                return Err(cg.error_at(node, |msg| {
                    CodegenError::TypeMismatch(format!("{msg}: method call on a non-class type"))
                }))
            }
        },
        _ => {
            return Err(cg.error_at(node, |msg| {
                CodegenError::TypeMismatch(format!("{msg}: method call on a non-class type"))
            }))
        }
    };

    let mut arg_values = Vec::with_capacity(args.len());
    for a in args {
        arg_values.push(lower_expr(cg, b, a)?);
    }
    let arg_types: Vec<Type> = arg_values.iter().map(|v| v.ty.clone()).collect();

    let mangled = resolve_method_symbol(cg, &class_name, member, &arg_types, node)?;
    let handle = FunctionHandle(mangled.clone());
    let param_types = cg
        .registries
        .function_param_types
        .get(&handle)
        .cloned()
        .unwrap_or_default();
    if param_types.len() != arg_values.len() {
        return Err(cg.error_at(node, |msg| {
            CodegenError::ArityMismatch(format!(
                "{msg}: '{class_name}::{member}' expects {} argument(s), found {}",
                param_types.len(),
                arg_values.len()
            ))
        }));
    }
    let return_type = cg
        .registries
        .function_return_type
        .get(&handle)
        .cloned()
        .unwrap_or_else(Type::void);
    let return_ty_text = cg.type_mapper.map(&return_type);
    let mut call_args: Vec<(String, Value)> = vec![("ptr".to_string(), obj)];
    call_args.extend(arg_values.into_iter().map(|v| (cg.type_mapper.map(&v.ty), v)));
    Ok(b
        .call(&mangled, &call_args, &return_ty_text, return_type.clone())
        .unwrap_or(Value::typed("", return_type)))
}

/// Look up a method's mangled symbol by trying every enclosing-namespace
/// prefix (innermost first) with `class_name` pushed as the `Class` entry,
/// public accessibility before private — the same walk
/// [`resolve_function_symbol`] does for free functions.
fn resolve_method_symbol(
    cg: &CodeGen,
    class_name: &Identifier,
    member: &Identifier,
    arg_types: &[Type],
    node: crate::diagnostics::NodeId,
) -> Result<String, CodegenError> {
    for prefix in cg.namespaces.prefixes_innermost_first() {
        let candidate = mangle_method(&prefix, class_name, member, Accessibility::Public, arg_types);
        if cg.registries.function_return_type.contains_key(&FunctionHandle(candidate.clone())) {
            return Ok(candidate);
        }
        let candidate_priv = mangle_method(&prefix, class_name, member, Accessibility::Private, arg_types);
        if cg
            .registries
            .function_return_type
            .contains_key(&FunctionHandle(candidate_priv.clone()))
        {
            return Ok(candidate_priv);
        }
    }
    Err(cg.error_at(node, |msg| {
        CodegenError::UnknownName(format!("{msg}: unknown method '{class_name}::{member}'"))
    }))
}

fn call_registered_function(
    cg: &mut CodeGen,
    b: &mut Builder,
    mangled: &str,
    display_name: &str,
    arg_values: Vec<Value>,
    node: crate::diagnostics::NodeId,
) -> Result<Value, CodegenError> {
    let handle = FunctionHandle(mangled.to_string());
    let param_types = cg
        .registries
        .function_param_types
        .get(&handle)
        .cloned()
        .unwrap_or_default();
    if param_types.len() != arg_values.len() {
        return Err(cg.error_at(node, |msg| {
            CodegenError::ArityMismatch(format!(
                "{msg}: {display_name} expects {} argument(s), found {}",
                param_types.len(),
                arg_values.len()
            ))
        }));
    }
    let return_type = cg
        .registries
        .function_return_type
        .get(&handle)
        .cloned()
        .unwrap_or_else(Type::void);
    let return_ty_text = cg.type_mapper.map(&return_type);
    let call_args: Vec<(String, Value)> = arg_values
        .into_iter()
        .map(|v| (cg.type_mapper.map(&v.ty), v))
        .collect();
    Ok(b
        .call(mangled, &call_args, &return_ty_text, return_type.clone())
        .unwrap_or(Value::typed("", return_type)))
}

/// Resolve a callee name to its mangled symbol: `nomangle` externs keep
/// their source name, everything else is looked up by
/// re-mangling with the current namespace and the caller-observed
/// accessibility (public, since cross-module private calls are rejected
/// earlier in [`crate::codegen::toplevel`]).
fn resolve_function_symbol(cg: &CodeGen, name: &Identifier, node: crate::diagnostics::NodeId) -> Result<String, CodegenError> {
    for prefix in cg.namespaces.prefixes_innermost_first() {
        let candidate = mangle_function(&prefix, name, Accessibility::Public, &[]);
        if cg.registries.function_return_type.contains_key(&FunctionHandle(candidate.clone())) {
            return Ok(candidate);
        }
        let candidate_priv = mangle_function(&prefix, name, Accessibility::Private, &[]);
        if cg
            .registries
            .function_return_type
            .contains_key(&FunctionHandle(candidate_priv.clone()))
        {
            return Ok(candidate_priv);
        }
    }
    if cg.module.has_function(&name.as_utf8()) {
        return Ok(name.as_utf8());
    }
    Err(cg.error_at(node, |msg| CodegenError::UnknownName(format!("{msg}: unknown function '{name}'"))))
}

fn lower_member_address(
    cg: &mut CodeGen,
    b: &mut Builder,
    object: &Expression,
    member: &Identifier,
    node: crate::diagnostics::NodeId,
) -> Result<Value, CodegenError> {
    let obj = lower_expr(cg, b, object)?;
    let class_name = match obj.ty.decay_reference() {
        Type::UserDefined(n) => n.clone(),
        Type::Pointer { pointee, .. } => match pointee.decay_reference() {
            Type::UserDefined(n) => n.clone(),
            _ => {
                return Err(cg.error_at(node, |msg| {
                    CodegenError::TypeMismatch(format!("{msg}: member access on a non-class type"))
                }))
            }
        },
        _ => {
            return Err(cg.error_at(node, |msg| {
                CodegenError::TypeMismatch(format!("{msg}: member access on a non-class type"))
            }))
        }
    };
    let Some((offset, field_ty)) = class_field_offset(cg, &class_name, member) else {
        return Err(cg.error_at(node, |msg| {
            CodegenError::UnknownName(format!("{msg}: no field '{member}' on class '{class_name}'"))
        }));
    };
    let addr = b.gep("i8", &obj, &[("i64", &offset.to_string())], field_ty.pointer_to(1));
    Ok(addr)
}

fn lower_member_access(
    cg: &mut CodeGen,
    b: &mut Builder,
    object: &Expression,
    member: &Identifier,
    node: crate::diagnostics::NodeId,
) -> Result<Value, CodegenError> {
    let addr = lower_member_address(cg, b, object, member, node)?;
    let Type::Pointer { pointee, .. } = addr.ty.clone() else {
        unreachable!("lower_member_address always returns a pointer")
    };
    let ty_text = cg.type_mapper.map(&pointee);
    Ok(b.load(&ty_text, &addr, *pointee))
}

fn lower_array_address(
    cg: &mut CodeGen,
    b: &mut Builder,
    array: &Expression,
    index: &Expression,
    node: crate::diagnostics::NodeId,
) -> Result<Value, CodegenError> {
    let arr = lower_expr(cg, b, array)?;
    let idx = lower_expr(cg, b, index)?;
    let elem_ty = match &arr.ty {
        Type::Array { element, .. } => (**element).clone(),
        Type::Pointer { pointee, .. } => (**pointee).clone(),
        _ => {
            return Err(cg.error_at(node, |msg| {
                CodegenError::TypeMismatch(format!("{msg}: indexing requires an array or pointer"))
            }))
        }
    };
    let elem_ty_text = cg.type_mapper.map(&elem_ty);
    let addr = b.gep(&elem_ty_text, &arr, &[("i64", idx.text())], elem_ty.pointer_to(1));
    Ok(addr)
}

fn lower_array_index(
    cg: &mut CodeGen,
    b: &mut Builder,
    array: &Expression,
    index: &Expression,
    node: crate::diagnostics::NodeId,
) -> Result<Value, CodegenError> {
    let addr = lower_array_address(cg, b, array, index, node)?;
    let Type::Pointer { pointee, .. } = addr.ty.clone() else {
        unreachable!()
    };
    let ty_text = cg.type_mapper.map(&pointee);
    Ok(b.load(&ty_text, &addr, *pointee))
}

fn lower_cast(
    cg: &mut CodeGen,
    b: &mut Builder,
    target_type: &Type,
    operand: &Expression,
    node: crate::diagnostics::NodeId,
) -> Result<Value, CodegenError> {
    let v = lower_expr(cg, b, operand)?;
    let target_type = &crate::codegen::templates::resolve_type_in_scope(cg, target_type);
    if !crate::types::cast_is_legal(&v.ty, target_type) {
        return Err(cg.error_at(node, |msg| {
            CodegenError::InvalidCast(format!("{msg}: cannot cast '{}' to '{target_type}'", v.ty))
        }));
    }
    let from_text = cg.type_mapper.map(&v.ty);
    let to_text = cg.type_mapper.map(target_type);
    if v.ty.is_pointer() {
        return Ok(b.bitcast(&v, &from_text, &to_text, target_type.clone()));
    }
    let (Type::Builtin(from_kind), Type::Builtin(to_kind)) = (&v.ty, target_type) else {
        unreachable!("cast_is_legal guarantees both sides are builtins here");
    };
    Ok(match from_kind.bit_width().cmp(&to_kind.bit_width()) {
        std::cmp::Ordering::Less if from_kind.is_signed() => b.sext(&v, &from_text, &to_text, target_type.clone()),
        std::cmp::Ordering::Less => b.zext(&v, &from_text, &to_text, target_type.clone()),
        std::cmp::Ordering::Greater => b.trunc(&v, &from_text, &to_text, target_type.clone()),
        std::cmp::Ordering::Equal => Value::typed(v.text().to_string(), target_type.clone()),
    })
}

/// `[e0, e1, ...]`: alloca a stack slot sized for the element count, store
/// each element in order, and yield the loaded array value — the same
/// shape [`lower_var_def`](crate::codegen::stmt) already uses for any
/// `Type::Array` local.
fn lower_array_literal(
    cg: &mut CodeGen,
    b: &mut Builder,
    elements: &[Expression],
    node: crate::diagnostics::NodeId,
) -> Result<Value, CodegenError> {
    let mut values = Vec::with_capacity(elements.len());
    for e in elements {
        values.push(lower_expr(cg, b, e)?);
    }
    let elem_ty = match values.first() {
        Some(v) => v.ty.clone(),
        None => {
            return Err(cg.error_at(node, |msg| {
                CodegenError::TypeMismatch(format!("{msg}: empty array literal has no element type"))
            }))
        }
    };
    for v in &values[1..] {
        if !v.ty.equal_as_operand(&elem_ty) {
            return Err(cg.error_at(node, |msg| {
                CodegenError::TypeMismatch(format!("{msg}: array literal elements must share one type"))
            }));
        }
    }
    let array_ty = Type::Array {
        element: Box::new(elem_ty.clone()),
        size: values.len() as u64,
    };
    let ty_text = cg.type_mapper.map(&array_ty);
    let elem_ty_text = cg.type_mapper.map(&elem_ty);
    let alloca = b.alloca(&ty_text, array_ty.clone().pointer_to(1));
    for (i, v) in values.into_iter().enumerate() {
        let addr = b.gep(&elem_ty_text, &alloca, &[("i64", &i.to_string())], elem_ty.clone().pointer_to(1));
        b.store(&elem_ty_text, &v, &addr);
    }
    Ok(b.load(&ty_text, &alloca, array_ty))
}

fn lower_new(cg: &mut CodeGen, b: &mut Builder, ty: &Type, args: &[Expression], node: crate::diagnostics::NodeId) -> Result<Value, CodegenError> {
    let resolved = crate::codegen::templates::resolve_type_in_scope(cg, ty);
    let class_name = match &resolved {
        Type::UserDefined(name) => Some(name.clone()),
        Type::UserDefinedTemplate { base, args: targs } => crate::codegen::templates::instantiate_class_template(cg, base, targs),
        _ => None,
    };
    let alloc_ty = class_name.clone().map(Type::UserDefined).unwrap_or_else(|| resolved.clone());

    cg.module.declare("declare ptr @malloc(i64)");
    let size = crate::backend::types::TypeMapper::size_of(&resolved);
    let ptr = b
        .call(
            "malloc",
            &[("i64".to_string(), Value::typed(size.to_string(), Type::Builtin(BuiltinKind::U64)))],
            "ptr",
            alloc_ty.pointer_to(1),
        )
        .expect("malloc returns a value");

    if let Some(class_name) = class_name {
        let mut arg_values = Vec::with_capacity(args.len());
        for a in args {
            arg_values.push(lower_expr(cg, b, a)?);
        }
        let ctor_param_types: Vec<Type> = arg_values.iter().map(|v| v.ty.clone()).collect();
        let ctor = crate::mangle::mangle_constructor(cg.namespaces.entries(), &class_name, &ctor_param_types);
        if cg.registries.function_return_type.contains_key(&FunctionHandle(ctor.clone())) {
            let mut call_args = vec![("ptr".to_string(), ptr.clone())];
            for v in arg_values {
                call_args.push((cg.type_mapper.map(&v.ty), v));
            }
            b.call(&ctor, &call_args, "void", Type::void());
        }
    }
    let _ = node;
    Ok(ptr)
}

fn lower_delete(cg: &mut CodeGen, b: &mut Builder, operand: &Expression, _node: crate::diagnostics::NodeId) -> Result<Value, CodegenError> {
    let v = lower_expr(cg, b, operand)?;
    if let Type::Pointer { pointee, .. } = v.ty.decay_reference() {
        if let Type::UserDefined(class_name) = pointee.as_ref() {
            crate::codegen::destructors::emit_destructor_call(cg, b, class_name, &v);
        }
    }
    cg.module.declare("declare void @free(ptr)");
    b.call("free", &[("ptr".to_string(), v.clone())], "void", Type::void());
    Ok(Value::typed("", Type::void()))
}
