/// Declares one AST node struct, prefixing it with the fields every node
/// carries: a unique `id`, its `span`, a `short_span` for diagnostics that
/// should underline less than the whole construct (an operator, a keyword),
/// and a `typespec` slot the type checker fills in — `None` until then.
#[macro_export]
macro_rules! ast_node {
    (
        $(#[$outer:meta])*
        $struct_vis:vis struct $name:ident {
            $(
                $(#[$field_attr:meta])*
                $field_vis:vis $field_name:ident : $field_ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug)]
        $struct_vis struct $name {
            pub id: u32,
            pub span: $crate::nodes::Span,
            pub short_span: $crate::nodes::Span,
            pub typespec: std::cell::RefCell<Option<std::rc::Rc<$crate::typespec::Typespec>>>,
            $(
                $(#[$field_attr])*
                $field_vis $field_name : $field_ty,
            )*
        }

        impl $name {
            #[must_use]
            pub fn typespec(&self) -> Option<std::rc::Rc<$crate::typespec::Typespec>> {
                self.typespec.borrow().clone()
            }

            pub fn set_typespec(&self, ty: std::rc::Rc<$crate::typespec::Typespec>) {
                *self.typespec.borrow_mut() = Some(ty);
            }
        }
    };
}

macro_rules! ast_nodes {
    (
        $(
            $(#[$outer:meta])*
            $struct_vis:vis struct $name:ident { $($fields:tt)* }
        )+
    ) => {
        $(
            $crate::ast_node! {
                $(#[$outer])*
                $struct_vis struct $name { $($fields)* }
            }
        )+
    };
}

/// Declares one closed enum of AST node variants, each wrapping an
/// `Rc<Struct>`, plus `id()`/`span()` dispatch over all arms. `@inner_enum`
/// marks a variant whose payload is itself one of these enums (e.g.
/// `Expression::Block(BlockLike)`), so dispatch recurses instead of reading
/// fields directly.
macro_rules! ast_enum {
    (
        $(#[$outer:meta])*
        $enum_vis:vis enum $name:ident {
            $(
                $(#[$arm_attr:meta])*
                $(@$conv:ident)? $arm:ident ( $($tuple:tt)* ) ,
            )*
        }
    ) => {
        $(#[$outer])*
        #[derive(Clone, Debug)]
        $enum_vis enum $name {
            $(
                $(#[$arm_attr])*
                $arm ( $($tuple)* ) ,
            )*
        }

        impl $name {
            #[must_use]
            pub fn id(&self) -> u32 {
                match self {
                    $(
                        $name::$arm(n, ..) => { ast_enum!(@id_arm n, $($conv)?) }
                    )*
                }
            }

            #[must_use]
            pub fn span(&self) -> $crate::nodes::Span {
                match self {
                    $(
                        $name::$arm(n, ..) => { ast_enum!(@span_arm n, $($conv)?) }
                    )*
                }
            }

            #[must_use]
            pub fn typespec(&self) -> Option<std::rc::Rc<$crate::typespec::Typespec>> {
                match self {
                    $(
                        $name::$arm(n, ..) => { ast_enum!(@typespec_arm n, $($conv)?) }
                    )*
                }
            }
        }
    };

    (@id_arm $inner:ident, inner_enum) => { $inner.id() };
    (@id_arm $inner:ident, ) => { $inner.id };

    (@span_arm $inner:ident, inner_enum) => { $inner.span() };
    (@span_arm $inner:ident, ) => { $inner.span };

    (@typespec_arm $inner:ident, inner_enum) => { $inner.typespec() };
    (@typespec_arm $inner:ident, ) => { $inner.typespec() };
}

macro_rules! ast_enums {
    (
        $(
            $(#[$outer:meta])*
            $enum_vis:vis enum $name:ident { $($arms:tt)* }
        )+
    ) => {
        $(
            ast_enum! {
                $(#[$outer])*
                $enum_vis enum $name { $($arms)* }
            }
        )+

        #[derive(Clone, Debug)]
        pub enum AstNode {
            $(
                $name($name),
            )+
        }

        impl AstNode {
            #[must_use]
            pub fn id(&self) -> u32 {
                match self {
                    $(
                        AstNode::$name(node) => node.id(),
                    )+
                }
            }

            #[must_use]
            pub fn span(&self) -> $crate::nodes::Span {
                match self {
                    $(
                        AstNode::$name(node) => node.span(),
                    )+
                }
            }
        }
    };
}
