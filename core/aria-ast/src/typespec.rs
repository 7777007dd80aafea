//! The shared `Typespec` graph.
//!
//! Typespecs are conceptually immutable after construction. Primitives,
//! `void`, `noreturn` and `bool` are predefined singletons handed out by a
//! [`TypespecTable`]; composite typespecs (`Ptr`, `Slice`, `Array`, `Func`,
//! …) are built fresh by the type checker as it needs them. Two `Struct`
//! typespecs compare equal iff their `decl` ids are equal — nominal
//! identity, never structural — which is what makes mutually recursive
//! structs through pointers representable without a cycle in this graph.

use std::rc::Rc;

use aria_bigint::BigInt;
use aria_span::SrcfileId;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PrimIntKind {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
}

impl PrimIntKind {
    #[must_use]
    pub fn bytes(self) -> u32 {
        match self {
            PrimIntKind::U8 | PrimIntKind::I8 => 1,
            PrimIntKind::U16 | PrimIntKind::I16 => 2,
            PrimIntKind::U32 | PrimIntKind::I32 => 4,
            PrimIntKind::U64 | PrimIntKind::I64 => 8,
        }
    }

    #[must_use]
    pub fn signed(self) -> bool {
        matches!(
            self,
            PrimIntKind::I8 | PrimIntKind::I16 | PrimIntKind::I32 | PrimIntKind::I64
        )
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            PrimIntKind::U8 => "u8",
            PrimIntKind::U16 => "u16",
            PrimIntKind::U32 => "u32",
            PrimIntKind::U64 => "u64",
            PrimIntKind::I8 => "i8",
            PrimIntKind::I16 => "i16",
            PrimIntKind::I32 => "i32",
            PrimIntKind::I64 => "i64",
        }
    }

    pub const ALL: [PrimIntKind; 8] = [
        PrimIntKind::U8,
        PrimIntKind::U16,
        PrimIntKind::U32,
        PrimIntKind::U64,
        PrimIntKind::I8,
        PrimIntKind::I16,
        PrimIntKind::I32,
        PrimIntKind::I64,
    ];
}

#[derive(Clone, PartialEq, Debug)]
pub enum PrimKind {
    Int(PrimIntKind),
    Bool,
    /// The type of an unsuffixed integer literal; carries the literal's
    /// exact value so the checker can range-check it against whatever
    /// sized integer it eventually coerces to.
    ComptimeInteger(BigInt),
}

/// A value in the type domain. Distinct from an `AstNode`: an `AstNode` is
/// syntax (e.g. the `*imm u32` a programmer wrote), a `Typespec` is what
/// that syntax *means*.
#[derive(Clone, Debug)]
pub enum Typespec {
    Prim(PrimKind),
    Void,
    Noreturn,
    Ptr { immutable: bool, child: Rc<Typespec> },
    MultiPtr { immutable: bool, child: Rc<Typespec> },
    Slice { immutable: bool, child: Rc<Typespec> },
    Array { size: BigInt, child: Rc<Typespec> },
    Func { params: Vec<Rc<Typespec>>, ret: Rc<Typespec> },
    /// Nominal identity by decl id, never structural.
    Struct { decl: u32 },
    /// The type of a typespec-syntax node when it appears in value
    /// position (e.g. the builtin symbol `u32` used as a cast target).
    Type { inner: Rc<Typespec> },
    /// The type of an imported name: `import "path"` binds this to a
    /// local name, identified by the target file.
    Module { srcfile: SrcfileId },
}

impl Typespec {
    #[must_use]
    pub fn is_comptime_integer(&self) -> bool {
        matches!(self, Typespec::Prim(PrimKind::ComptimeInteger(_)))
    }

    #[must_use]
    pub fn as_int_kind(&self) -> Option<PrimIntKind> {
        match self {
            Typespec::Prim(PrimKind::Int(k)) => Some(*k),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_comptime_value(&self) -> Option<&BigInt> {
        match self {
            Typespec::Prim(PrimKind::ComptimeInteger(v)) => Some(v),
            _ => None,
        }
    }

    /// The use-site classification every typespec falls into; `AcceptSet`s
    /// at each checker call site are built from this.
    #[must_use]
    pub fn accept_kind(&self) -> AcceptKind {
        match self {
            Typespec::Void => AcceptKind::Void,
            Typespec::Noreturn => AcceptKind::Noreturn,
            Typespec::Prim(PrimKind::ComptimeInteger(_)) => AcceptKind::Comptime,
            Typespec::Func { .. } => AcceptKind::Func,
            _ => AcceptKind::Runtime,
        }
    }

    /// Canonical display used in diagnostics, e.g. `*imm [4]u8`.
    #[must_use]
    pub fn display(&self) -> String {
        match self {
            Typespec::Prim(PrimKind::Int(k)) => k.name().to_string(),
            Typespec::Prim(PrimKind::Bool) => "bool".to_string(),
            Typespec::Prim(PrimKind::ComptimeInteger(_)) => "{integer}".to_string(),
            Typespec::Void => "void".to_string(),
            Typespec::Noreturn => "noreturn".to_string(),
            Typespec::Ptr { immutable, child } => {
                format!("*{}{}", if *immutable { "imm " } else { "" }, child.display())
            }
            Typespec::MultiPtr { immutable, child } => {
                format!(
                    "[*]{}{}",
                    if *immutable { "imm " } else { "" },
                    child.display()
                )
            }
            Typespec::Slice { immutable, child } => {
                format!("[]{}{}", if *immutable { "imm " } else { "" }, child.display())
            }
            Typespec::Array { size, child } => format!("[{size}]{}", child.display()),
            Typespec::Func { params, ret } => {
                let params = params
                    .iter()
                    .map(|p| p.display())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("fn({params}) {}", ret.display())
            }
            Typespec::Struct { decl } => format!("struct#{decl}"),
            Typespec::Type { inner } => format!("type({})", inner.display()),
            Typespec::Module { srcfile } => format!("module#{}", srcfile.index()),
        }
    }
}

/// At each use site the checker passes an `AcceptSet` — the subset of
/// kinds legal in that context — and rejects with a targeted message
/// otherwise ("expected runtime value, got module").
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum AcceptKind {
    Runtime,
    Comptime,
    Void,
    Func,
    Noreturn,
}

impl AcceptKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            AcceptKind::Runtime => "runtime value",
            AcceptKind::Comptime => "comptime value",
            AcceptKind::Void => "void",
            AcceptKind::Func => "function",
            AcceptKind::Noreturn => "noreturn value",
        }
    }
}

/// Shared singleton instances for every primitive, `void`, `noreturn` and
/// `bool`. Initialized once at the start of compilation and immutable
/// thereafter — the checker refers to these by `Rc` identity rather than
/// constructing fresh primitive typespecs on every lookup.
pub struct TypespecTable {
    ints: rustc_hash::FxHashMap<PrimIntKind, Rc<Typespec>>,
    bool_: Rc<Typespec>,
    void: Rc<Typespec>,
    noreturn: Rc<Typespec>,
}

impl Default for TypespecTable {
    fn default() -> Self {
        let ints = PrimIntKind::ALL
            .into_iter()
            .map(|k| (k, Rc::new(Typespec::Prim(PrimKind::Int(k)))))
            .collect();
        Self {
            ints,
            bool_: Rc::new(Typespec::Prim(PrimKind::Bool)),
            void: Rc::new(Typespec::Void),
            noreturn: Rc::new(Typespec::Noreturn),
        }
    }
}

impl TypespecTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn int(&self, kind: PrimIntKind) -> Rc<Typespec> {
        Rc::clone(&self.ints[&kind])
    }

    #[must_use]
    pub fn bool_(&self) -> Rc<Typespec> {
        Rc::clone(&self.bool_)
    }

    #[must_use]
    pub fn void(&self) -> Rc<Typespec> {
        Rc::clone(&self.void)
    }

    #[must_use]
    pub fn noreturn(&self) -> Rc<Typespec> {
        Rc::clone(&self.noreturn)
    }

    #[must_use]
    pub fn comptime_integer(&self, value: BigInt) -> Rc<Typespec> {
        Rc::new(Typespec::Prim(PrimKind::ComptimeInteger(value)))
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<Rc<Typespec>> {
        if name == "bool" {
            return Some(self.bool_());
        }
        if name == "void" {
            return Some(self.void());
        }
        if name == "noreturn" {
            return Some(self.noreturn());
        }
        PrimIntKind::ALL
            .into_iter()
            .find(|k| k.name() == name)
            .map(|k| self.int(k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predefined_primitives_are_shared_instances() {
        let table = TypespecTable::new();
        let a = table.int(PrimIntKind::U32);
        let b = table.int(PrimIntKind::U32);
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn struct_identity_is_by_decl() {
        let a = Typespec::Struct { decl: 7 };
        let b = Typespec::Struct { decl: 7 };
        let c = Typespec::Struct { decl: 8 };
        assert_eq!(format!("{a:?}"), format!("{b:?}"));
        assert_ne!(format!("{a:?}"), format!("{c:?}"));
    }

    #[test]
    fn display_shows_immutability_and_child() {
        let inner = Rc::new(Typespec::Prim(PrimKind::Int(PrimIntKind::U8)));
        let ptr = Typespec::Ptr {
            immutable: true,
            child: inner,
        };
        assert_eq!(ptr.display(), "*imm u8");
    }
}
