//! The type model.
//!
//! A flat sum type with structural `PartialEq`/`Eq`/`Hash` and a
//! hand-written `Display` separate from `Debug`. `Type` carries no
//! polymorphic variables at this layer — generics are handled by template
//! instantiation (`crate::codegen::templates`), which produces concrete,
//! monomorphic `Type`s before anything here ever sees them.

use crate::ident::Identifier;
use std::cmp::Ordering;
use std::fmt;

/// Builtin scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuiltinKind {
    Void,
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    /// `char` — a UTF-32 codepoint, representationally `u32`.
    Char,
}

impl BuiltinKind {
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            BuiltinKind::I8
                | BuiltinKind::U8
                | BuiltinKind::I16
                | BuiltinKind::U16
                | BuiltinKind::I32
                | BuiltinKind::U32
                | BuiltinKind::I64
                | BuiltinKind::U64
                | BuiltinKind::Char
        )
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            BuiltinKind::I8 | BuiltinKind::I16 | BuiltinKind::I32 | BuiltinKind::I64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, BuiltinKind::F32 | BuiltinKind::F64)
    }

    /// Width in bits. Booleans are always 8 bits wide in IR — observationally
    /// indistinguishable from `u8` — to dodge 1-bit signedness ambiguity.
    pub fn bit_width(self) -> u32 {
        match self {
            BuiltinKind::Void => 0,
            BuiltinKind::Bool | BuiltinKind::I8 | BuiltinKind::U8 => 8,
            BuiltinKind::I16 | BuiltinKind::U16 => 16,
            BuiltinKind::I32 | BuiltinKind::U32 | BuiltinKind::F32 | BuiltinKind::Char => 32,
            BuiltinKind::I64 | BuiltinKind::U64 | BuiltinKind::F64 => 64,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BuiltinKind::Void => "void",
            BuiltinKind::Bool => "bool",
            BuiltinKind::I8 => "i8",
            BuiltinKind::U8 => "u8",
            BuiltinKind::I16 => "i16",
            BuiltinKind::U16 => "u16",
            BuiltinKind::I32 => "i32",
            BuiltinKind::U32 => "u32",
            BuiltinKind::I64 => "i64",
            BuiltinKind::U64 => "u64",
            BuiltinKind::F32 => "f32",
            BuiltinKind::F64 => "f64",
            BuiltinKind::Char => "char",
        }
    }
}

/// The structural type sum.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Builtin(BuiltinKind),
    UserDefined(Identifier),
    UserDefinedTemplate {
        base: Identifier,
        args: Vec<Type>,
    },
    Array {
        element: Box<Type>,
        size: u64,
    },
    Pointer {
        pointee: Box<Type>,
        depth: u32,
    },
    Reference(Box<Type>),
}

impl Type {
    pub fn void() -> Self {
        Type::Builtin(BuiltinKind::Void)
    }

    pub fn bool() -> Self {
        Type::Builtin(BuiltinKind::Bool)
    }

    pub fn i32() -> Self {
        Type::Builtin(BuiltinKind::I32)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Builtin(BuiltinKind::Void))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Builtin(b) if b.is_integer())
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Builtin(b) if b.is_float())
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer { .. })
    }

    /// Strip one level of reference-ness. References are transparent to
    /// their referent as an *operand* but distinct as a *declared* type
    ///.
    pub fn decay_reference(&self) -> &Type {
        match self {
            Type::Reference(inner) => inner.decay_reference(),
            other => other,
        }
    }

    pub fn pointer_to(self, depth: u32) -> Self {
        assert!(depth >= 1, "Pointer depth must be >= 1");
        Type::Pointer {
            pointee: Box::new(self),
            depth,
        }
    }

    /// Operand-position equality: references decay, everything else is
    /// exact structural equality (including `UserDefinedTemplate(base, args)`
    /// comparing both fields, `Array` comparing element and size, `Pointer`
    /// comparing depth and pointee).
    pub fn equal_as_operand(&self, other: &Type) -> bool {
        self.decay_reference() == other.decay_reference()
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Builtin(b) => write!(f, "{}", b.name()),
            Type::UserDefined(name) => write!(f, "{name}"),
            Type::UserDefinedTemplate { base, args } => {
                write!(f, "{base}<")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ">")
            }
            Type::Array { element, size } => write!(f, "[{element}; {size}]"),
            Type::Pointer { pointee, depth } => {
                write!(f, "{pointee}")?;
                for _ in 0..*depth {
                    write!(f, "*")?;
                }
                Ok(())
            }
            Type::Reference(referent) => write!(f, "{referent}&"),
        }
    }
}

/// A total order used as a memoization key, e.g. by `created_class_templates`
/// in [`crate::registry::Registries`].
impl PartialOrd for Type {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Type {
    fn cmp(&self, other: &Self) -> Ordering {
        fn rank(t: &Type) -> u8 {
            match t {
                Type::Builtin(_) => 0,
                Type::UserDefined(_) => 1,
                Type::UserDefinedTemplate { .. } => 2,
                Type::Array { .. } => 3,
                Type::Pointer { .. } => 4,
                Type::Reference(_) => 5,
            }
        }
        match (self, other) {
            (Type::Builtin(a), Type::Builtin(b)) => a.cmp(b),
            (Type::UserDefined(a), Type::UserDefined(b)) => a.cmp(b),
            (
                Type::UserDefinedTemplate { base: ba, args: aa },
                Type::UserDefinedTemplate { base: bb, args: ab },
            ) => ba.cmp(bb).then_with(|| aa.cmp(ab)),
            (
                Type::Array {
                    element: ea,
                    size: sa,
                },
                Type::Array {
                    element: eb,
                    size: sb,
                },
            ) => sa.cmp(sb).then_with(|| ea.cmp(eb)),
            (
                Type::Pointer {
                    pointee: pa,
                    depth: da,
                },
                Type::Pointer {
                    pointee: pb,
                    depth: db,
                },
            ) => da.cmp(db).then_with(|| pa.cmp(pb)),
            (Type::Reference(a), Type::Reference(b)) => a.cmp(b),
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }
}

/// Integer implicit promotion: returns the wider type,
/// preserving the signedness of the wider operand, unsigned winning ties.
pub fn promote(a: BuiltinKind, b: BuiltinKind) -> BuiltinKind {
    assert!(a.is_integer() && b.is_integer(), "promote() on non-integers");
    match a.bit_width().cmp(&b.bit_width()) {
        Ordering::Greater => a,
        Ordering::Less => b,
        Ordering::Equal => {
            if !a.is_signed() {
                a
            } else if !b.is_signed() {
                b
            } else {
                a
            }
        }
    }
}

/// Whether an explicit `as` cast between these two types is legal:
/// integer↔integer or pointer↔pointer only.
pub fn cast_is_legal(from: &Type, to: &Type) -> bool {
    match (from, to) {
        (Type::Builtin(a), Type::Builtin(b)) => a.is_integer() && b.is_integer(),
        (Type::Pointer { .. }, Type::Pointer { .. }) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_equality_compares_depth_and_pointee() {
        let a = Type::i32().pointer_to(1);
        let b = Type::i32().pointer_to(1);
        let c = Type::i32().pointer_to(2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn array_equality_compares_element_and_size() {
        let a = Type::Array {
            element: Box::new(Type::i32()),
            size: 4,
        };
        let b = Type::Array {
            element: Box::new(Type::i32()),
            size: 5,
        };
        assert_ne!(a, b);
    }

    #[test]
    fn template_type_equality_compares_base_and_args() {
        let a = Type::UserDefinedTemplate {
            base: Identifier::new("Box"),
            args: vec![Type::i32()],
        };
        let b = Type::UserDefinedTemplate {
            base: Identifier::new("Box"),
            args: vec![Type::Builtin(BuiltinKind::F64)],
        };
        assert_ne!(a, b);
    }

    #[test]
    fn reference_is_transparent_as_operand_but_not_as_declared_type() {
        let r = Type::Reference(Box::new(Type::i32()));
        let plain = Type::i32();
        assert_ne!(r, plain); // distinct as declared type
        assert!(r.equal_as_operand(&plain)); // transparent as operand
    }

    #[test]
    fn promote_picks_wider_width() {
        assert_eq!(promote(BuiltinKind::I8, BuiltinKind::I32), BuiltinKind::I32);
    }

    #[test]
    fn promote_same_width_prefers_unsigned() {
        assert_eq!(promote(BuiltinKind::I32, BuiltinKind::U32), BuiltinKind::U32);
        assert_eq!(promote(BuiltinKind::U32, BuiltinKind::I32), BuiltinKind::U32);
    }

    #[test]
    fn cast_int_to_int_and_pointer_to_pointer_legal() {
        assert!(cast_is_legal(&Type::i32(), &Type::Builtin(BuiltinKind::I64)));
        assert!(cast_is_legal(
            &Type::i32().pointer_to(1),
            &Type::Builtin(BuiltinKind::U8).pointer_to(1)
        ));
    }

    #[test]
    fn cast_int_to_pointer_illegal() {
        assert!(!cast_is_legal(&Type::i32(), &Type::i32().pointer_to(1)));
    }
}
