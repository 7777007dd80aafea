//! Type equality and assignability.
//!
//! Two predicates the checker builds everything else on: [`exact_eq`]
//! (structural equality, used for array sizes, struct identity, cast
//! legality) and [`assign`] (the implicit-conversion rule used at every
//! value-flow site — initializers, call arguments, return values, peer
//! unification of `if`/`while` branches).

use std::rc::Rc;

use aria_ast::typespec::PrimIntKind;
use aria_ast::{PrimKind, Typespec};
use aria_diagnostics::{DiagnosticEngine, Msg};
use aria_span::Span;

#[must_use]
pub fn exact_eq(a: &Typespec, b: &Typespec) -> bool {
    match (a, b) {
        (Typespec::Void, Typespec::Void) | (Typespec::Noreturn, Typespec::Noreturn) => true,
        (Typespec::Prim(PrimKind::Bool), Typespec::Prim(PrimKind::Bool)) => true,
        (Typespec::Prim(PrimKind::Int(x)), Typespec::Prim(PrimKind::Int(y))) => x == y,
        (Typespec::Prim(PrimKind::ComptimeInteger(x)), Typespec::Prim(PrimKind::ComptimeInteger(y))) => {
            x == y
        }
        (
            Typespec::Ptr { immutable: ia, child: ca },
            Typespec::Ptr { immutable: ib, child: cb },
        ) => ia == ib && exact_eq(ca, cb),
        (
            Typespec::MultiPtr { immutable: ia, child: ca },
            Typespec::MultiPtr { immutable: ib, child: cb },
        ) => ia == ib && exact_eq(ca, cb),
        (
            Typespec::Slice { immutable: ia, child: ca },
            Typespec::Slice { immutable: ib, child: cb },
        ) => ia == ib && exact_eq(ca, cb),
        (Typespec::Array { size: sa, child: ca }, Typespec::Array { size: sb, child: cb }) => {
            sa == sb && exact_eq(ca, cb)
        }
        (Typespec::Func { params: pa, ret: ra }, Typespec::Func { params: pb, ret: rb }) => {
            pa.len() == pb.len()
                && pa.iter().zip(pb.iter()).all(|(x, y)| exact_eq(x, y))
                && exact_eq(ra, rb)
        }
        (Typespec::Struct { decl: da }, Typespec::Struct { decl: db }) => da == db,
        (Typespec::Type { inner: ia }, Typespec::Type { inner: ib }) => exact_eq(ia, ib),
        (Typespec::Module { srcfile: sa }, Typespec::Module { srcfile: sb }) => sa == sb,
        _ => false,
    }
}

/// Outcome of [`assign`]. `Reported` means a diagnostic was already emitted
/// internally (the integer-fit case carries a message no generic wording
/// could reproduce); `Mismatch`/`ConstViolation` are left for the caller to
/// word, since the same predicate backs both directional messages
/// (`cannot convert to T from U`) and peer messages (`type mismatch: T and
/// U`).
pub enum AssignResult {
    Ok(Rc<Typespec>),
    Mismatch,
    ConstViolation,
    Reported,
}

/// Whether `from` may flow into a slot of type `to`. In `peer` mode (two
/// branches meeting, e.g. `if`/`else` arms or `break` values), sized
/// integers widen symmetrically and the final type is whichever side is
/// wider, rather than requiring `from` to narrow into a fixed `to`.
pub fn assign(
    diags: &mut DiagnosticEngine,
    span: Span,
    from: &Rc<Typespec>,
    to: &Rc<Typespec>,
    peer: bool,
) -> AssignResult {
    if matches!(from.as_ref(), Typespec::Noreturn) {
        return AssignResult::Ok(Rc::clone(to));
    }
    if matches!(to.as_ref(), Typespec::Noreturn) {
        return AssignResult::Mismatch;
    }
    if exact_eq(from, to) {
        return AssignResult::Ok(Rc::clone(to));
    }

    match (from.as_ref(), to.as_ref()) {
        (Typespec::Prim(PrimKind::ComptimeInteger(v)), Typespec::Prim(PrimKind::Int(k))) => {
            fit_or_report(diags, span, v, *k, Rc::clone(to))
        }
        (Typespec::Prim(PrimKind::Int(k)), Typespec::Prim(PrimKind::ComptimeInteger(v))) => {
            fit_or_report(diags, span, v, *k, Rc::clone(from))
        }
        (Typespec::Prim(PrimKind::ComptimeInteger(_)), Typespec::Prim(PrimKind::ComptimeInteger(_))) => {
            AssignResult::Ok(Rc::clone(to))
        }
        (Typespec::Prim(PrimKind::Int(kf)), Typespec::Prim(PrimKind::Int(kt))) => {
            if kf.signed() != kt.signed() {
                AssignResult::Mismatch
            } else if kf.bytes() <= kt.bytes() {
                AssignResult::Ok(Rc::clone(to))
            } else if peer {
                AssignResult::Ok(Rc::clone(from))
            } else {
                AssignResult::Mismatch
            }
        }
        (
            Typespec::Ptr { immutable: imm_f, child: cf },
            Typespec::Ptr { immutable: imm_t, child: ct },
        ) => assign_ref_like(*imm_f, cf, *imm_t, ct, to),
        (
            Typespec::MultiPtr { immutable: imm_f, child: cf },
            Typespec::MultiPtr { immutable: imm_t, child: ct },
        ) => assign_ref_like(*imm_f, cf, *imm_t, ct, to),
        (
            Typespec::Slice { immutable: imm_f, child: cf },
            Typespec::Slice { immutable: imm_t, child: ct },
        ) => assign_ref_like(*imm_f, cf, *imm_t, ct, to),
        (
            Typespec::Ptr { immutable: imm_f, child: arr },
            Typespec::MultiPtr { immutable: imm_t, child: ct },
        ) => decay_array_pointer(*imm_f, arr, *imm_t, ct, to),
        (
            Typespec::Ptr { immutable: imm_f, child: arr },
            Typespec::Slice { immutable: imm_t, child: ct },
        ) => decay_array_pointer(*imm_f, arr, *imm_t, ct, to),
        (Typespec::Func { params: pf, ret: rf }, Typespec::Func { params: pt, ret: rt }) => {
            if pf.len() != pt.len() {
                return AssignResult::Mismatch;
            }
            for (f, t) in pf.iter().zip(pt.iter()) {
                if !matches!(assign(diags, span, f, t, false), AssignResult::Ok(_)) {
                    return AssignResult::Mismatch;
                }
            }
            if !matches!(assign(diags, span, rf, rt, false), AssignResult::Ok(_)) {
                return AssignResult::Mismatch;
            }
            AssignResult::Ok(Rc::clone(to))
        }
        _ => AssignResult::Mismatch,
    }
}

fn fit_or_report(
    diags: &mut DiagnosticEngine,
    span: Span,
    v: &aria_bigint::BigInt,
    k: PrimIntKind,
    result: Rc<Typespec>,
) -> AssignResult {
    if v.fits(k.bytes(), k.signed()) {
        AssignResult::Ok(result)
    } else {
        diags.emit(Msg::error(
            format!("integer {v} does not fit in {}", k.name()),
            span,
        ));
        AssignResult::Reported
    }
}

fn assign_ref_like(
    imm_f: bool,
    cf: &Rc<Typespec>,
    imm_t: bool,
    ct: &Rc<Typespec>,
    to: &Rc<Typespec>,
) -> AssignResult {
    if !exact_eq(cf, ct) {
        return AssignResult::Mismatch;
    }
    if imm_f && !imm_t {
        return AssignResult::ConstViolation;
    }
    AssignResult::Ok(Rc::clone(to))
}

fn decay_array_pointer(
    imm_f: bool,
    arr: &Rc<Typespec>,
    imm_t: bool,
    ct: &Rc<Typespec>,
    to: &Rc<Typespec>,
) -> AssignResult {
    let Typespec::Array { child: ac, .. } = arr.as_ref() else {
        return AssignResult::Mismatch;
    };
    if !exact_eq(ac, ct) {
        return AssignResult::Mismatch;
    }
    if imm_f && !imm_t {
        return AssignResult::ConstViolation;
    }
    AssignResult::Ok(Rc::clone(to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aria_bigint::BigInt;
    use aria_span::SrcManager;

    fn span() -> Span {
        let mut mgr = SrcManager::new();
        let f = mgr.add("t.aria".into(), "x".to_string());
        Span::new(f, 0, 1)
    }

    #[test]
    fn comptime_fits_in_target_width() {
        let mut diags = DiagnosticEngine::new();
        let from = Rc::new(Typespec::Prim(PrimKind::ComptimeInteger(BigInt::from_i64(200))));
        let to = Rc::new(Typespec::Prim(PrimKind::Int(PrimIntKind::U8)));
        assert!(matches!(
            assign(&mut diags, span(), &from, &to, false),
            AssignResult::Ok(_)
        ));
        assert!(!diags.has_errors());
    }

    #[test]
    fn comptime_overflow_is_reported() {
        let mut diags = DiagnosticEngine::new();
        let from = Rc::new(Typespec::Prim(PrimKind::ComptimeInteger(BigInt::from_i64(256))));
        let to = Rc::new(Typespec::Prim(PrimKind::Int(PrimIntKind::U8)));
        assert!(matches!(
            assign(&mut diags, span(), &from, &to, false),
            AssignResult::Reported
        ));
        assert!(diags.has_errors());
    }

    #[test]
    fn immutable_to_mutable_pointer_is_const_violation() {
        let mut diags = DiagnosticEngine::new();
        let u8_ = Rc::new(Typespec::Prim(PrimKind::Int(PrimIntKind::U8)));
        let from = Rc::new(Typespec::Ptr { immutable: true, child: Rc::clone(&u8_) });
        let to = Rc::new(Typespec::Ptr { immutable: false, child: u8_ });
        assert!(matches!(
            assign(&mut diags, span(), &from, &to, false),
            AssignResult::ConstViolation
        ));
    }

    #[test]
    fn mutable_to_immutable_pointer_is_fine() {
        let mut diags = DiagnosticEngine::new();
        let u8_ = Rc::new(Typespec::Prim(PrimKind::Int(PrimIntKind::U8)));
        let from = Rc::new(Typespec::Ptr { immutable: false, child: Rc::clone(&u8_) });
        let to = Rc::new(Typespec::Ptr { immutable: true, child: u8_ });
        assert!(matches!(
            assign(&mut diags, span(), &from, &to, false),
            AssignResult::Ok(_)
        ));
    }

    #[test]
    fn array_pointer_decays_to_slice() {
        let mut diags = DiagnosticEngine::new();
        let u8_ = Rc::new(Typespec::Prim(PrimKind::Int(PrimIntKind::U8)));
        let arr = Rc::new(Typespec::Array { size: BigInt::from_i64(3), child: Rc::clone(&u8_) });
        let from = Rc::new(Typespec::Ptr { immutable: false, child: arr });
        let to = Rc::new(Typespec::Slice { immutable: false, child: u8_ });
        assert!(matches!(
            assign(&mut diags, span(), &from, &to, false),
            AssignResult::Ok(_)
        ));
    }

    #[test]
    fn peer_widens_to_larger_sized_integer() {
        let mut diags = DiagnosticEngine::new();
        let u8_ = Rc::new(Typespec::Prim(PrimKind::Int(PrimIntKind::U8)));
        let u32_ = Rc::new(Typespec::Prim(PrimKind::Int(PrimIntKind::U32)));
        match assign(&mut diags, span(), &u32_, &u8_, true) {
            AssignResult::Ok(t) => assert!(exact_eq(&t, &u32_)),
            _ => panic!("expected peer widening to u32"),
        }
    }
}
