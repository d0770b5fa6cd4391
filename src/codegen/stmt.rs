//! Statement lowering.
//!
//! One `match` arm per statement shape (blocks, `if`/`while`/`for`/`loop`,
//! `match`), each emitting into the current [`Builder`] and returning once
//! its own control flow is stitched. This module also owns scope push/pop
//! and destructor draining at every block boundary — every exit path runs
//! the destructors of every in-scope class-typed local, innermost scope
//! first.

use crate::ast::{Pattern, Statement, VarDef};
use crate::backend::builder::{Builder, IntPredicate, Value};
use crate::codegen::control_flow::LoopContext;
use crate::codegen::destructors;
use crate::codegen::expr::{lower_expr, to_i1};
use crate::codegen::state::CodeGen;
use crate::codegen::templates::resolve_type_in_scope;
use crate::diagnostics::CodegenError;
use crate::symbol::Variable;

/// Lower a function or instantiation body. Does not push its own scope —
/// the caller ([`crate::codegen::toplevel::lower_function`],
/// [`crate::codegen::templates`]'s instantiation lowering) already pushed
/// the parameter scope this body's top level shares.
pub fn lower_block(cg: &mut CodeGen, b: &mut Builder, stmts: &[Statement]) -> Result<(), CodegenError> {
    lower_statements(cg, b, stmts, None)
}

fn lower_statements(
    cg: &mut CodeGen,
    b: &mut Builder,
    stmts: &[Statement],
    loop_ctx: Option<&LoopContext>,
) -> Result<(), CodegenError> {
    for stmt in stmts {
        if b.is_terminated() {
            // Dead code after `return`/`break`/`continue` in the same
            // block; nothing left to lower into it.
            break;
        }
        lower_statement(cg, b, stmt, loop_ctx)?;
    }
    Ok(())
}

/// Push a fresh scope, lower `stmts` into it, drain it on fallthrough, pop.
/// Used for every braced sub-scope: `if`/`else` arms, loop bodies, and bare
/// `{ ... }` blocks.
fn lower_scoped_block(
    cg: &mut CodeGen,
    b: &mut Builder,
    stmts: &[Statement],
    loop_ctx: Option<&LoopContext>,
) -> Result<(), CodegenError> {
    cg.scopes.push();
    let result = lower_statements(cg, b, stmts, loop_ctx);
    let scope = cg.scopes.current().clone();
    if result.is_ok() && !b.is_terminated() {
        destructors::drain_scope_on_fallthrough(cg, b, &scope);
    }
    cg.scopes.pop();
    result
}

fn lower_statement(
    cg: &mut CodeGen,
    b: &mut Builder,
    stmt: &Statement,
    loop_ctx: Option<&LoopContext>,
) -> Result<(), CodegenError> {
    match stmt {
        Statement::Expr(e) => {
            lower_expr(cg, b, e)?;
            Ok(())
        }
        Statement::VarDef(v) => lower_var_def(cg, b, v),
        Statement::Return { value, .. } => {
            let lowered = value.as_ref().map(|e| lower_expr(cg, b, e)).transpose()?;
            destructors::drain_scopes_to_floor(cg, b, 0);
            match lowered {
                Some(v) => {
                    let ty_text = cg.type_mapper.map(&v.ty);
                    b.ret(&ty_text, &v);
                }
                None => b.ret_void(),
            }
            Ok(())
        }
        Statement::Break(node) => {
            let ctx = loop_ctx.ok_or_else(|| cg.error_at(*node, CodegenError::UnknownOperator))?;
            destructors::drain_scopes_to_floor(cg, b, ctx.scope_floor);
            b.br(&ctx.break_block);
            Ok(())
        }
        Statement::Continue(node) => {
            let ctx = loop_ctx.ok_or_else(|| cg.error_at(*node, CodegenError::UnknownOperator))?;
            destructors::drain_scopes_to_floor(cg, b, ctx.scope_floor);
            b.br(&ctx.continue_block);
            Ok(())
        }
        Statement::Block { body, .. } => lower_scoped_block(cg, b, body, loop_ctx),
        Statement::If {
            condition,
            then_branch,
            else_branch,
            ..
        } => lower_if(cg, b, condition, then_branch, else_branch.as_deref(), loop_ctx),
        Statement::While { condition, body, .. } => lower_while(cg, b, condition, body),
        Statement::For {
            init,
            condition,
            step,
            body,
            ..
        } => lower_for(cg, b, init.as_deref(), condition.as_ref(), step.as_deref(), body),
        Statement::Loop { body, .. } => lower_loop(cg, b, body),
        Statement::Match { scrutinee, arms, node } => lower_match(cg, b, scrutinee, arms, *node, loop_ctx),
    }
}

fn lower_var_def(cg: &mut CodeGen, b: &mut Builder, v: &VarDef) -> Result<(), CodegenError> {
    let initializer = v.initializer.as_ref().map(|e| lower_expr(cg, b, e)).transpose()?;
    let ty = match (&v.declared_type, &initializer) {
        (Some(t), _) => resolve_type_in_scope(cg, t),
        (None, Some(init)) => init.ty.clone(),
        (None, None) => {
            return Err(cg.error_at(v.node, |m| {
                CodegenError::TypeMismatch(format!("{m}: cannot infer a type for '{}' with no initializer", v.name))
            }));
        }
    };
    let ty_text = cg.type_mapper.map(&ty);
    let alloca = b.alloca(&ty_text, ty.clone().pointer_to(1));
    if let Some(init) = initializer {
        b.store(&ty_text, &init, &alloca);
    }
    let inserted = cg.scopes.current_mut().insert(v.name.clone(), Variable::new(alloca, ty, v.mutable));
    if !inserted {
        return Err(cg.error_at(v.node, |m| {
            CodegenError::Redefinition(format!("{m}: '{}' is already declared in this scope", v.name))
        }));
    }
    Ok(())
}

fn lower_if(
    cg: &mut CodeGen,
    b: &mut Builder,
    condition: &crate::ast::Expression,
    then_branch: &[Statement],
    else_branch: Option<&[Statement]>,
    loop_ctx: Option<&LoopContext>,
) -> Result<(), CodegenError> {
    let cond = lower_expr(cg, b, condition)?;
    let cond = to_i1(b, &cond);
    let then_bb = b.fresh_block("if.then");
    let else_bb = b.fresh_block("if.else");
    let merge_bb = b.fresh_block("if.end");
    b.cond_br(&cond, &then_bb, &else_bb);

    b.switch_to_block(then_bb);
    lower_scoped_block(cg, b, then_branch, loop_ctx)?;
    if !b.is_terminated() {
        b.br(&merge_bb);
    }

    b.switch_to_block(else_bb);
    if let Some(else_stmts) = else_branch {
        lower_scoped_block(cg, b, else_stmts, loop_ctx)?;
    }
    if !b.is_terminated() {
        b.br(&merge_bb);
    }

    b.switch_to_block(merge_bb);
    Ok(())
}

fn lower_while(
    cg: &mut CodeGen,
    b: &mut Builder,
    condition: &crate::ast::Expression,
    body: &[Statement],
) -> Result<(), CodegenError> {
    let cond_bb = b.fresh_block("while.cond");
    let body_bb = b.fresh_block("while.body");
    let end_bb = b.fresh_block("while.end");
    b.br(&cond_bb);

    b.switch_to_block(cond_bb.clone());
    let cond = lower_expr(cg, b, condition)?;
    let cond = to_i1(b, &cond);
    b.cond_br(&cond, &body_bb, &end_bb);

    b.switch_to_block(body_bb);
    let ctx = LoopContext {
        break_block: end_bb.clone(),
        continue_block: cond_bb.clone(),
        scope_floor: cg.scopes.depth(),
    };
    lower_scoped_block(cg, b, body, Some(&ctx))?;
    if !b.is_terminated() {
        b.br(&cond_bb);
    }

    b.switch_to_block(end_bb);
    Ok(())
}

fn lower_for(
    cg: &mut CodeGen,
    b: &mut Builder,
    init: Option<&Statement>,
    condition: Option<&crate::ast::Expression>,
    step: Option<&Statement>,
    body: &[Statement],
) -> Result<(), CodegenError> {
    // The init statement (typically a `VarDef`) lives in its own scope
    // enclosing the whole loop, so the loop variable is visible to
    // `condition`/`step`/`body` but gone once the loop exits.
    cg.scopes.push();
    let outer_floor = cg.scopes.depth();
    let init_result: Result<(), CodegenError> = (|| {
        if let Some(init) = init {
            lower_statement(cg, b, init, None)?;
        }

        let cond_bb = b.fresh_block("for.cond");
        let body_bb = b.fresh_block("for.body");
        let step_bb = b.fresh_block("for.step");
        let end_bb = b.fresh_block("for.end");
        b.br(&cond_bb);

        b.switch_to_block(cond_bb.clone());
        if let Some(cond_expr) = condition {
            let cond = lower_expr(cg, b, cond_expr)?;
            let cond = to_i1(b, &cond);
            b.cond_br(&cond, &body_bb, &end_bb);
        } else {
            b.br(&body_bb);
        }

        b.switch_to_block(body_bb);
        let ctx = LoopContext {
            break_block: end_bb.clone(),
            continue_block: step_bb.clone(),
            scope_floor: outer_floor,
        };
        lower_scoped_block(cg, b, body, Some(&ctx))?;
        if !b.is_terminated() {
            b.br(&step_bb);
        }

        b.switch_to_block(step_bb);
        if let Some(step) = step {
            lower_statement(cg, b, step, None)?;
        }
        if !b.is_terminated() {
            b.br(&cond_bb);
        }

        b.switch_to_block(end_bb);
        Ok(())
    })();

    let outer_scope = cg.scopes.current().clone();
    if init_result.is_ok() {
        destructors::drain_scope_on_fallthrough(cg, b, &outer_scope);
    }
    cg.scopes.pop();
    init_result
}

fn lower_loop(cg: &mut CodeGen, b: &mut Builder, body: &[Statement]) -> Result<(), CodegenError> {
    let body_bb = b.fresh_block("loop.body");
    let end_bb = b.fresh_block("loop.end");
    b.br(&body_bb);

    b.switch_to_block(body_bb.clone());
    let ctx = LoopContext {
        break_block: end_bb.clone(),
        continue_block: body_bb.clone(),
        scope_floor: cg.scopes.depth(),
    };
    lower_scoped_block(cg, b, body, Some(&ctx))?;
    if !b.is_terminated() {
        b.br(&body_bb);
    }

    b.switch_to_block(end_bb);
    Ok(())
}

/// Discriminant tag width and offset of the variant payload: a tag plus a
/// payload large enough for its widest variant. No alignment padding is
/// applied beyond this fixed 8-byte payload start, the same simplification
/// [`crate::codegen::toplevel::class_field_offset`] makes for class fields.
const UNION_TAG_IR_TYPE: &str = "i32";
const UNION_PAYLOAD_OFFSET: u64 = 8;

fn lower_match(
    cg: &mut CodeGen,
    b: &mut Builder,
    scrutinee: &crate::ast::Expression,
    arms: &[crate::ast::MatchArm],
    node: crate::diagnostics::NodeId,
    loop_ctx: Option<&LoopContext>,
) -> Result<(), CodegenError> {
    let scrutinee_val = lower_expr(cg, b, scrutinee)?;
    let union_name = match scrutinee_val.ty.decay_reference() {
        crate::types::Type::UserDefined(name) => name.clone(),
        crate::types::Type::Pointer { pointee, .. } => match pointee.decay_reference() {
            crate::types::Type::UserDefined(name) => name.clone(),
            _ => {
                return Err(cg.error_at(node, |m| {
                    CodegenError::TypeMismatch(format!("{m}: match scrutinee is not a tagged union"))
                }));
            }
        },
        _ => {
            return Err(cg.error_at(node, |m| {
                CodegenError::TypeMismatch(format!("{m}: match scrutinee is not a tagged union"))
            }));
        }
    };
    let union_def = cg
        .registries
        .find_union_by_name(&union_name)
        .cloned()
        .ok_or_else(|| cg.error_at(node, |m| CodegenError::UnknownName(format!("{m}: unknown union '{union_name}'"))))?;

    let tag = b.load(UNION_TAG_IR_TYPE, &scrutinee_val, crate::types::Type::i32());
    let merge_bb = b.fresh_block("match.end");

    let mut wildcard_arm = None;
    let mut variant_arms = Vec::new();
    for arm in arms {
        match &arm.pattern {
            Pattern::Wildcard => wildcard_arm = Some(arm),
            Pattern::Variant { name, bindings } => {
                let idx = union_def.variants.iter().position(|v| &v.name == name).ok_or_else(|| {
                    cg.error_at(arm.node, |m| CodegenError::UnknownName(format!("{m}: '{union_name}' has no variant '{name}'")))
                })?;
                variant_arms.push((idx, bindings, arm));
            }
        }
    }

    let mut result: Result<(), CodegenError> = Ok(());
    for (i, (idx, bindings, arm)) in variant_arms.iter().enumerate() {
        if result.is_err() {
            break;
        }
        let arm_bb = b.fresh_block("match.arm");
        let is_last = i + 1 == variant_arms.len();
        let next_bb = if is_last {
            if wildcard_arm.is_some() {
                b.fresh_block("match.wildcard")
            } else {
                merge_bb.clone()
            }
        } else {
            b.fresh_block("match.check")
        };

        let idx_val = Value::typed(idx.to_string(), crate::types::Type::i32());
        let matches = b.icmp(IntPredicate::Eq, UNION_TAG_IR_TYPE, &tag, &idx_val);
        b.cond_br(&matches, &arm_bb, &next_bb);

        b.switch_to_block(arm_bb);
        result = lower_match_arm(cg, b, &union_def.variants[*idx].fields, bindings, &scrutinee_val, &arm.body, loop_ctx);
        if result.is_ok() && !b.is_terminated() {
            b.br(&merge_bb);
        }

        b.switch_to_block(next_bb);
    }
    result?;

    if let Some(arm) = wildcard_arm {
        // Already positioned in the wildcard block by the loop above, or
        // (if there were no variant arms at all) still in the original
        // block.
        cg.scopes.push();
        let body_result = lower_statements(cg, b, &arm.body, loop_ctx);
        let scope = cg.scopes.current().clone();
        if body_result.is_ok() && !b.is_terminated() {
            destructors::drain_scope_on_fallthrough(cg, b, &scope);
        }
        cg.scopes.pop();
        body_result?;
        if !b.is_terminated() {
            b.br(&merge_bb);
        }
    } else if variant_arms.is_empty() {
        b.unreachable();
    } else if !b.is_terminated() {
        // No wildcard: the last variant's `next_bb` was `merge_bb` itself,
        // already the active block with no terminator of its own needed.
    }

    b.switch_to_block(merge_bb);
    Ok(())
}

fn lower_match_arm(
    cg: &mut CodeGen,
    b: &mut Builder,
    fields: &[crate::ast::FieldDef],
    bindings: &[crate::ident::Identifier],
    scrutinee: &Value,
    body: &[Statement],
    loop_ctx: Option<&LoopContext>,
) -> Result<(), CodegenError> {
    cg.scopes.push();
    let mut offset = UNION_PAYLOAD_OFFSET;
    for (field, binding) in fields.iter().zip(bindings.iter()) {
        let field_ty_text = cg.type_mapper.map(&field.ty);
        let addr = b.gep(
            "i8",
            scrutinee,
            &[("i64", &offset.to_string())],
            field.ty.clone().pointer_to(1),
        );
        let value = b.load(&field_ty_text, &addr, field.ty.clone());
        let slot = b.alloca(&field_ty_text, field.ty.clone().pointer_to(1));
        b.store(&field_ty_text, &value, &slot);
        cg.scopes.current_mut().insert(binding.clone(), Variable::new(slot, field.ty.clone(), true));
        offset += crate::backend::types::TypeMapper::size_of(&field.ty);
    }
    let result = lower_statements(cg, b, body, loop_ctx);
    let scope = cg.scopes.current().clone();
    if result.is_ok() && !b.is_terminated() {
        destructors::drain_scope_on_fallthrough(cg, b, &scope);
    }
    cg.scopes.pop();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expression;
    use crate::backend::builder::BasicBlock;
    use crate::backend::target::{RelocModel, TargetInfo};
    use crate::diagnostics::{NodeId, SourceMap};
    use crate::ident::Identifier;
    use crate::types::{BuiltinKind, Type};
    use std::path::PathBuf;

    fn n() -> NodeId {
        NodeId(0)
    }

    fn fresh_cg(map: &SourceMap) -> CodeGen<'_> {
        CodeGen::new("t", TargetInfo::host(RelocModel::Static), map)
    }

    #[test]
    fn var_def_without_type_or_initializer_errors() {
        let map = SourceMap::new(PathBuf::from("t.em"), String::new());
        let mut cg = fresh_cg(&map);
        cg.scopes.push();
        let mut b = Builder::new(BasicBlock("entry".to_string()));
        let v = VarDef {
            name: Identifier::new("x"),
            declared_type: None,
            initializer: None,
            mutable: true,
            node: n(),
        };
        assert!(lower_var_def(&mut cg, &mut b, &v).is_err());
    }

    #[test]
    fn var_def_infers_type_from_initializer() {
        let map = SourceMap::new(PathBuf::from("t.em"), String::new());
        let mut cg = fresh_cg(&map);
        cg.scopes.push();
        let mut b = Builder::new(BasicBlock("entry".to_string()));
        let v = VarDef {
            name: Identifier::new("x"),
            declared_type: None,
            initializer: Some(Expression::IntLiteral { value: 1, node: n() }),
            mutable: true,
            node: n(),
        };
        assert!(lower_var_def(&mut cg, &mut b, &v).is_ok());
        let bound = cg.scopes.current().get(&Identifier::new("x")).unwrap();
        assert_eq!(bound.ty, Type::Builtin(BuiltinKind::I32));
    }

    #[test]
    fn redeclaring_in_same_scope_errors() {
        let map = SourceMap::new(PathBuf::from("t.em"), String::new());
        let mut cg = fresh_cg(&map);
        cg.scopes.push();
        let mut b = Builder::new(BasicBlock("entry".to_string()));
        let v = VarDef {
            name: Identifier::new("x"),
            declared_type: Some(Type::i32()),
            initializer: None,
            mutable: true,
            node: n(),
        };
        assert!(lower_var_def(&mut cg, &mut b, &v).is_ok());
        assert!(lower_var_def(&mut cg, &mut b, &v).is_err());
    }

    #[test]
    fn break_outside_loop_errors() {
        let map = SourceMap::new(PathBuf::from("t.em"), String::new());
        let mut cg = fresh_cg(&map);
        cg.scopes.push();
        let mut b = Builder::new(BasicBlock("entry".to_string()));
        let result = lower_statement(&mut cg, &mut b, &Statement::Break(n()), None);
        assert!(result.is_err());
    }

    #[test]
    fn return_drains_scopes_to_floor_zero() {
        let map = SourceMap::new(PathBuf::from("t.em"), String::new());
        let mut cg = fresh_cg(&map);
        cg.scopes.push();
        let mut b = Builder::new(BasicBlock("entry".to_string()));
        let stmt = Statement::Return {
            value: Some(Expression::IntLiteral { value: 0, node: n() }),
            node: n(),
        };
        assert!(lower_statement(&mut cg, &mut b, &stmt, None).is_ok());
        assert!(b.is_terminated());
    }
}
