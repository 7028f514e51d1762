use proptest::prelude::*;
use scadasim::expr::eval_str;
use scadasim::point::{scale, unscale};
use scadasim::table::Arena;
use scadasim::value::Value;
use scadasim::var::{StoreConfig, VarStore};

fn store() -> VarStore {
    VarStore::with_seed(StoreConfig::default(), 42)
}

proptest! {
    /// The evaluator returns Ok or Err on any input, never panics.
    #[test]
    fn evaluator_does_not_panic(s in "\\PC{0,40}") {
        let mut st = store();
        let _ = eval_str(&s, &mut st);
    }

    /// Expressions built from the operator alphabet never panic either.
    #[test]
    fn operator_soup_does_not_panic(s in "[0-9a-z()+*/%<>=!&|^., -]{0,30}") {
        let mut st = store();
        let _ = st.evaluate(&s);
    }
}

proptest! {
    /// One float operand promotes the whole binary operation.
    #[test]
    fn float_operand_promotes(a in -10_000i32..10_000, b in -1000.0f32..1000.0) {
        let mut st = store();
        for op in ["+", "-", "*"] {
            let src = format!("{a} {op} {b:.3}");
            let v = st.evaluate(&src).unwrap();
            prop_assert!(v.is_float(), "{src} gave {v:?}");
        }
    }

    /// Int op Int stays Int and matches wrapping i32 arithmetic.
    #[test]
    fn int_arithmetic_stays_int(a in 0i32..100_000, b in 1i32..1000) {
        let mut st = store();
        prop_assert_eq!(st.evaluate(&format!("{a} + {b}")).unwrap(), Value::Int(a + b));
        prop_assert_eq!(st.evaluate(&format!("{a} * {b}")).unwrap(), Value::Int(a.wrapping_mul(b)));
        prop_assert_eq!(st.evaluate(&format!("{a} / {b}")).unwrap(), Value::Int(a / b));
        prop_assert_eq!(st.evaluate(&format!("{a} % {b}")).unwrap(), Value::Int(a % b));
    }
}

proptest! {
    /// Polling at gaps shorter than one interval ticks exactly once per
    /// interval elapsed.
    #[test]
    fn ticks_follow_elapsed_intervals(gaps in prop::collection::vec(1u64..250, 1..200)) {
        let mut st = store();
        let mut now = 0;
        for gap in gaps {
            now += gap;
            st.poll(now);
            prop_assert_eq!(u64::from(st.ticks()), now / 250);
        }
    }

    /// The tick counter never goes backwards, whatever the poll pattern.
    #[test]
    fn ticks_are_monotonic(gaps in prop::collection::vec(0u64..2000, 1..100)) {
        let mut st = store();
        let mut now = 0;
        let mut last = 0;
        for gap in gaps {
            now += gap;
            st.poll(now);
            prop_assert!(st.ticks() >= last);
            prop_assert!(st.ticks() - last <= 1);
            last = st.ticks();
        }
    }
}

proptest! {
    /// unscale(scale(e)) stays within one raw step of e.
    #[test]
    fn scaled_round_trip(min in -1000.0f32..1000.0, span in 1.0f32..1000.0, frac in 0.0f32..=1.0) {
        let max = min + span;
        let e = min + frac * span;
        let back = unscale(scale(Value::Float(e), min, max), min, max).as_float();
        let tol = span * 2.0 / 65535.0 + 1e-3;
        prop_assert!((back - e).abs() <= tol, "e={e} back={back}");
    }

    /// Out-of-range engineering values clamp to the raw limits.
    #[test]
    fn scaled_clamps(min in -1000.0f32..1000.0, span in 1.0f32..1000.0, over in 1.0f32..1e4) {
        let max = min + span;
        prop_assert_eq!(scale(Value::Float(max + over), min, max), 65535);
        prop_assert_eq!(scale(Value::Float(min - over), min, max), 0);
    }

    /// Every raw value unscales into [min, max].
    #[test]
    fn unscale_stays_in_range(raw: u16, min in -1000.0f32..1000.0, span in 1.0f32..1000.0) {
        let max = min + span;
        let e = unscale(raw, min, max).as_float();
        prop_assert!(e >= min - 1e-3 && e <= max + 1e-3);
    }
}

proptest! {
    /// Deleting a slot keeps the survivors in their original order, with
    /// names and formulas still paired.
    #[test]
    fn delete_preserves_order(n in 1usize..40, pick in any::<prop::sample::Index>()) {
        let mut st = store();
        for i in 0..n {
            let idx = st.create(&format!("v{i}")).unwrap();
            st.set_formula(idx, Some(&format!("{i} * 2"))).unwrap();
        }
        let victim = pick.index(n);
        st.delete(victim);

        let expected: Vec<usize> = (0..n).filter(|i| *i != victim).collect();
        prop_assert_eq!(st.len(), expected.len());
        for (slot, i) in expected.iter().enumerate() {
            prop_assert_eq!(st.name(slot), Some(format!("v{i}")));
            prop_assert_eq!(st.formula(slot), Some(format!("{i}*2")));
            prop_assert_eq!(st.lookup(&format!("V{i}")), Some(slot));
        }
    }

    /// Arena handles survive arbitrary deletions of other entries.
    #[test]
    fn arena_handles_survive_deletes(
        words in prop::collection::vec("[a-z]{1,8}", 1..30),
        kill in prop::collection::vec(any::<bool>(), 30),
    ) {
        let mut arena = Arena::with_capacity(1024);
        let ids: Vec<_> = words.iter().map(|w| arena.add(w, false).unwrap()).collect();
        let mut used = arena.used();
        for (i, id) in ids.iter().enumerate() {
            if kill[i] {
                used -= arena.delete(*id);
            }
        }
        prop_assert_eq!(arena.used(), used);
        for (i, id) in ids.iter().enumerate() {
            if kill[i] {
                prop_assert_eq!(arena.text(*id), None);
            } else {
                prop_assert_eq!(arena.text(*id), Some(words[i].clone()));
            }
        }
    }
}
