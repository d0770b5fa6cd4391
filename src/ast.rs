//! Abstract syntax tree.
//!
//! A flat set of `#[derive(Debug, Clone, PartialEq)]` sum types. Ember tags
//! nodes with a [`NodeId`] into [`crate::diagnostics::SourceMap`] rather than
//! embedding a source position directly in every node — a side table from
//! node identity to source range, rather than a span on every node — so the
//! position-carrying field here is always `NodeId`, never a span.

use crate::diagnostics::NodeId;
use crate::ident::{Identifier, Path};
use crate::types::Type;

/// Visibility/linkage attributes recognized on top-level declarations:
/// `public`/`private` control mangled-name accessibility; `extern` and
/// `nomangle` control linkage and whether mangling is applied at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Attributes {
    pub public: bool,
    pub private: bool,
    pub is_extern: bool,
    pub nomangle: bool,
}

impl Attributes {
    pub fn is_public(&self) -> bool {
        self.public || !self.private
    }
}

/// Binary operators, ordered by precedence table from lowest
/// to highest (used directly by the precedence-climbing parser in
/// [`crate::parser`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    BitOr,
    BitXor,
    BitAnd,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
    AddressOf,
    Deref,
}

/// Compound-assignment operators desugar to `lhs = lhs OP rhs` during
/// lowering, but are parsed as their own token so the parser
/// never has to duplicate the left-hand side text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundAssignOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Prefix `++`/`--`; Ember has no postfix form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncDecOp {
    Increment,
    Decrement,
}

/// Expression forms.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    IntLiteral {
        value: i64,
        node: NodeId,
    },
    FloatLiteral {
        value: f64,
        node: NodeId,
    },
    BoolLiteral {
        value: bool,
        node: NodeId,
    },
    StringLiteral {
        value: String,
        node: NodeId,
    },
    CharLiteral {
        value: char,
        node: NodeId,
    },
    NameRef {
        name: Identifier,
        node: NodeId,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
        node: NodeId,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
        node: NodeId,
    },
    Assign {
        target: Box<Expression>,
        value: Box<Expression>,
        node: NodeId,
    },
    CompoundAssign {
        op: CompoundAssignOp,
        target: Box<Expression>,
        value: Box<Expression>,
        node: NodeId,
    },
    IncDec {
        op: IncDecOp,
        target: Box<Expression>,
        node: NodeId,
    },
    Call {
        callee: Box<Expression>,
        args: Vec<Expression>,
        node: NodeId,
    },
    TemplateCall {
        callee: Box<Expression>,
        template_args: Vec<Type>,
        args: Vec<Expression>,
        node: NodeId,
    },
    MemberAccess {
        object: Box<Expression>,
        member: Identifier,
        node: NodeId,
    },
    /// `a::b::c` resolved through [`crate::namespace::NamespaceStack`]
    /// rather than member access on a value.
    ScopeResolution {
        path: Path,
        node: NodeId,
    },
    ArrayIndex {
        array: Box<Expression>,
        index: Box<Expression>,
        node: NodeId,
    },
    Cast {
        target_type: Type,
        operand: Box<Expression>,
        node: NodeId,
    },
    New {
        ty: Type,
        args: Vec<Expression>,
        node: NodeId,
    },
    Delete {
        operand: Box<Expression>,
        node: NodeId,
    },
    Sizeof {
        ty: Type,
        node: NodeId,
    },
    Grouping {
        inner: Box<Expression>,
        node: NodeId,
    },
    /// The `null` literal: a zero pointer constant, typed by context.
    Null {
        node: NodeId,
    },
    ArrayLiteral {
        elements: Vec<Expression>,
        node: NodeId,
    },
    /// Bare `ClassName(args)` construction — the same allocation as `new
    /// ClassName(args)`, without the keyword.
    ClassLiteral {
        ty: Type,
        args: Vec<Expression>,
        node: NodeId,
    },
}

impl Expression {
    pub fn node(&self) -> NodeId {
        match self {
            Expression::IntLiteral { node, .. }
            | Expression::FloatLiteral { node, .. }
            | Expression::BoolLiteral { node, .. }
            | Expression::StringLiteral { node, .. }
            | Expression::CharLiteral { node, .. }
            | Expression::NameRef { node, .. }
            | Expression::Unary { node, .. }
            | Expression::Binary { node, .. }
            | Expression::Assign { node, .. }
            | Expression::CompoundAssign { node, .. }
            | Expression::IncDec { node, .. }
            | Expression::Call { node, .. }
            | Expression::TemplateCall { node, .. }
            | Expression::MemberAccess { node, .. }
            | Expression::ScopeResolution { node, .. }
            | Expression::ArrayIndex { node, .. }
            | Expression::Cast { node, .. }
            | Expression::New { node, .. }
            | Expression::Delete { node, .. }
            | Expression::Sizeof { node, .. }
            | Expression::Grouping { node, .. }
            | Expression::Null { node }
            | Expression::ArrayLiteral { node, .. }
            | Expression::ClassLiteral { node, .. } => *node,
        }
    }
}

/// A single `pattern -> body` arm of a `match`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub body: Vec<Statement>,
    pub node: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// Bind the matched tagged-union variant by name, optionally
    /// destructuring its fields.
    Variant {
        name: Identifier,
        bindings: Vec<Identifier>,
    },
    Wildcard,
}

/// A local variable declaration: hoisted to an entry-block
/// `alloca` during lowering regardless of where in its block
/// it textually appears.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDef {
    pub name: Identifier,
    pub declared_type: Option<Type>,
    pub initializer: Option<Expression>,
    pub mutable: bool,
    pub node: NodeId,
}

/// Statement forms.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Expr(Expression),
    VarDef(VarDef),
    Return {
        value: Option<Expression>,
        node: NodeId,
    },
    If {
        condition: Expression,
        then_branch: Vec<Statement>,
        else_branch: Option<Vec<Statement>>,
        node: NodeId,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
        node: NodeId,
    },
    /// C-style `for (init; cond; step)`; `init`/`step` are statements so a
    /// `for` can declare its own loop variable.
    For {
        init: Option<Box<Statement>>,
        condition: Option<Expression>,
        step: Option<Box<Statement>>,
        body: Vec<Statement>,
        node: NodeId,
    },
    /// Unconditional loop, exited only via `break`.
    Loop {
        body: Vec<Statement>,
        node: NodeId,
    },
    Match {
        scrutinee: Expression,
        arms: Vec<MatchArm>,
        node: NodeId,
    },
    Break(NodeId),
    Continue(NodeId),
    /// A braced sub-scope with its own destructor schedule.
    Block {
        body: Vec<Statement>,
        node: NodeId,
    },
}

impl Statement {
    pub fn node(&self) -> NodeId {
        match self {
            Statement::Expr(e) => e.node(),
            Statement::VarDef(v) => v.node,
            Statement::Return { node, .. }
            | Statement::If { node, .. }
            | Statement::While { node, .. }
            | Statement::For { node, .. }
            | Statement::Loop { node, .. }
            | Statement::Match { node, .. }
            | Statement::Block { node, .. } => *node,
            Statement::Break(n) | Statement::Continue(n) => *n,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Identifier,
    pub ty: Type,
}

/// A function declaration or definition. `body` is `None`
/// for a bare declaration (e.g. an `extern` prototype).
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: Identifier,
    pub template_params: Vec<Identifier>,
    pub params: Vec<Param>,
    pub return_type: Type,
    pub body: Option<Vec<Statement>>,
    pub attributes: Attributes,
    pub node: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: Identifier,
    pub ty: Type,
    pub attributes: Attributes,
}

/// A class definition: fields, methods, an optional user-written
/// destructor (a default is synthesized if absent).
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: Identifier,
    pub template_params: Vec<Identifier>,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<FunctionDef>,
    pub attributes: Attributes,
    pub node: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionVariant {
    pub name: Identifier,
    pub fields: Vec<FieldDef>,
}

/// A tagged union definition: a discriminant tag plus
/// a payload large enough for its widest variant.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionDef {
    pub name: Identifier,
    pub variants: Vec<UnionVariant>,
    pub attributes: Attributes,
    pub node: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedefDef {
    pub name: Identifier,
    pub target: Type,
    pub node: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDef {
    pub path: Path,
    pub node: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceDef {
    pub name: Identifier,
    pub items: Vec<TopLevel>,
    pub node: NodeId,
}

/// Top-level declaration forms.
#[derive(Debug, Clone, PartialEq)]
pub enum TopLevel {
    Function(FunctionDef),
    Class(ClassDef),
    Union(UnionDef),
    Typedef(TypedefDef),
    Import(ImportDef),
    Namespace(NamespaceDef),
}

/// One parsed translation unit: an ordered list of top-level items, in
/// source order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub items: Vec<TopLevel>,
}

/// Renders an AST back to Ember-like source text, used only by tests to
/// check that parse → print → parse round-trips are stable.
/// Not used by the compiler itself: it is not a pretty-printer for user
/// output, only a testing aid.
pub fn print_expression(expr: &Expression) -> String {
    match expr {
        Expression::IntLiteral { value, .. } => value.to_string(),
        Expression::FloatLiteral { value, .. } => value.to_string(),
        Expression::BoolLiteral { value, .. } => value.to_string(),
        Expression::StringLiteral { value, .. } => format!("{value:?}"),
        Expression::CharLiteral { value, .. } => format!("'{value}'"),
        Expression::NameRef { name, .. } => name.to_string(),
        Expression::Unary { op, operand, .. } => {
            let sym = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Not => "!",
                UnaryOp::BitNot => "~",
                UnaryOp::AddressOf => "&",
                UnaryOp::Deref => "*",
            };
            format!("{sym}{}", print_expression(operand))
        }
        Expression::Binary { op, lhs, rhs, .. } => {
            let sym = binary_op_symbol(*op);
            format!("({} {sym} {})", print_expression(lhs), print_expression(rhs))
        }
        Expression::Assign { target, value, .. } => {
            format!("{} = {}", print_expression(target), print_expression(value))
        }
        Expression::CompoundAssign { op, target, value, .. } => {
            let sym = match op {
                CompoundAssignOp::Add => "+=",
                CompoundAssignOp::Sub => "-=",
                CompoundAssignOp::Mul => "*=",
                CompoundAssignOp::Div => "/=",
            };
            format!("{} {sym} {}", print_expression(target), print_expression(value))
        }
        Expression::IncDec { op, target, .. } => {
            let sym = match op {
                IncDecOp::Increment => "++",
                IncDecOp::Decrement => "--",
            };
            format!("{sym}{}", print_expression(target))
        }
        Expression::Call { callee, args, .. } => {
            format!(
                "{}({})",
                print_expression(callee),
                args.iter().map(print_expression).collect::<Vec<_>>().join(", ")
            )
        }
        Expression::TemplateCall {
            callee,
            template_args,
            args,
            ..
        } => {
            let targs = template_args.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ");
            format!(
                "{}<{}>({})",
                print_expression(callee),
                targs,
                args.iter().map(print_expression).collect::<Vec<_>>().join(", ")
            )
        }
        Expression::MemberAccess { object, member, .. } => {
            format!("{}.{}", print_expression(object), member)
        }
        Expression::ScopeResolution { path, .. } => path.to_string(),
        Expression::ArrayIndex { array, index, .. } => {
            format!("{}[{}]", print_expression(array), print_expression(index))
        }
        Expression::Cast { target_type, operand, .. } => {
            format!("({} as {})", print_expression(operand), target_type)
        }
        Expression::New { ty, args, .. } => {
            format!(
                "new {ty}({})",
                args.iter().map(print_expression).collect::<Vec<_>>().join(", ")
            )
        }
        Expression::Delete { operand, .. } => format!("delete {}", print_expression(operand)),
        Expression::Sizeof { ty, .. } => format!("sizeof({ty})"),
        Expression::Grouping { inner, .. } => format!("({})", print_expression(inner)),
        Expression::Null { .. } => "null".to_string(),
        Expression::ArrayLiteral { elements, .. } => {
            format!(
                "[{}]",
                elements.iter().map(print_expression).collect::<Vec<_>>().join(", ")
            )
        }
        Expression::ClassLiteral { ty, args, .. } => {
            format!(
                "{ty}({})",
                args.iter().map(print_expression).collect::<Vec<_>>().join(", ")
            )
        }
    }
}

fn binary_op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Or => "||",
        BinaryOp::And => "&&",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Gt => ">",
        BinaryOp::Le => "<=",
        BinaryOp::Ge => ">=",
        BinaryOp::BitOr => "|",
        BinaryOp::BitXor => "^",
        BinaryOp::BitAnd => "&",
        BinaryOp::Shl => "<<",
        BinaryOp::Shr => ">>",
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::NodeId;

    fn n() -> NodeId {
        NodeId(0)
    }

    #[test]
    fn prints_binary_expression_fully_parenthesized() {
        let e = Expression::Binary {
            op: BinaryOp::Add,
            lhs: Box::new(Expression::IntLiteral { value: 1, node: n() }),
            rhs: Box::new(Expression::IntLiteral { value: 2, node: n() }),
            node: n(),
        };
        assert_eq!(print_expression(&e), "(1 + 2)");
    }

    #[test]
    fn prints_call_with_args() {
        let e = Expression::Call {
            callee: Box::new(Expression::NameRef {
                name: Identifier::new("add"),
                node: n(),
            }),
            args: vec![
                Expression::IntLiteral { value: 1, node: n() },
                Expression::IntLiteral { value: 2, node: n() },
            ],
            node: n(),
        };
        assert_eq!(print_expression(&e), "add(1, 2)");
    }

    #[test]
    fn attributes_default_to_public() {
        let a = Attributes::default();
        assert!(a.is_public());
    }

    #[test]
    fn explicit_private_overrides_default_visibility() {
        let a = Attributes {
            private: true,
            ..Default::default()
        };
        assert!(!a.is_public());
    }
}
