//! Derived operators over boolean, float, and generic inputs.
//!
//! Each operator returns a `Derived` that recomputes when any operand
//! updates. Edge detectors return event inputs.

use super::{
    BooleanInput, ChannelValue, Derived, EventCell, EventOutput, FloatInput, Input,
    SharedEventInput,
};
use std::sync::Arc;

pub fn not(input: &BooleanInput) -> Derived<bool> {
    let a = Arc::clone(input);
    Derived::new(&[input], move || !a.get())
}

pub fn and(lhs: &BooleanInput, rhs: &BooleanInput) -> Derived<bool> {
    let (a, b) = (Arc::clone(lhs), Arc::clone(rhs));
    Derived::new(&[lhs, rhs], move || a.get() && b.get())
}

pub fn or(lhs: &BooleanInput, rhs: &BooleanInput) -> Derived<bool> {
    let (a, b) = (Arc::clone(lhs), Arc::clone(rhs));
    Derived::new(&[lhs, rhs], move || a.get() || b.get())
}

pub fn xor(lhs: &BooleanInput, rhs: &BooleanInput) -> Derived<bool> {
    let (a, b) = (Arc::clone(lhs), Arc::clone(rhs));
    Derived::new(&[lhs, rhs], move || a.get() ^ b.get())
}

pub fn plus(lhs: &FloatInput, rhs: &FloatInput) -> Derived<f32> {
    let (a, b) = (Arc::clone(lhs), Arc::clone(rhs));
    Derived::new(&[lhs, rhs], move || a.get() + b.get())
}

pub fn minus(lhs: &FloatInput, rhs: &FloatInput) -> Derived<f32> {
    let (a, b) = (Arc::clone(lhs), Arc::clone(rhs));
    Derived::new(&[lhs, rhs], move || a.get() - b.get())
}

pub fn scaled(input: &FloatInput, factor: f32) -> Derived<f32> {
    let a = Arc::clone(input);
    Derived::new(&[input], move || a.get() * factor)
}

pub fn negated(input: &FloatInput) -> Derived<f32> {
    let a = Arc::clone(input);
    Derived::new(&[input], move || -a.get())
}

pub fn abs(input: &FloatInput) -> Derived<f32> {
    let a = Arc::clone(input);
    Derived::new(&[input], move || a.get().abs())
}

/// Zero inside `(-width, width)`, passthrough outside.
pub fn deadzone(input: &FloatInput, width: f32) -> Derived<f32> {
    let a = Arc::clone(input);
    Derived::new(&[input], move || {
        let value = a.get();
        if value.abs() < width {
            0.0
        } else {
            value
        }
    })
}

pub fn at_least(input: &FloatInput, minimum: f32) -> Derived<bool> {
    let a = Arc::clone(input);
    Derived::new(&[input], move || a.get() >= minimum)
}

pub fn at_most(input: &FloatInput, maximum: f32) -> Derived<bool> {
    let a = Arc::clone(input);
    Derived::new(&[input], move || a.get() <= maximum)
}

/// True while `minimum <= input <= maximum`.
pub fn in_range(input: &FloatInput, minimum: f32, maximum: f32) -> Derived<bool> {
    let a = Arc::clone(input);
    Derived::new(&[input], move || {
        let value = a.get();
        value >= minimum && value <= maximum
    })
}

/// Follows `when_true` or `when_false` depending on `condition`.
pub fn select<T: ChannelValue>(
    condition: &BooleanInput,
    when_true: &Arc<dyn Input<T>>,
    when_false: &Arc<dyn Input<T>>,
) -> Derived<T> {
    let (c, t, f) = (
        Arc::clone(condition),
        Arc::clone(when_true),
        Arc::clone(when_false),
    );
    Derived::new(&[condition, when_true, when_false], move || {
        if c.get() {
            t.get()
        } else {
            f.get()
        }
    })
}

/// Fires when `input` goes from false to true.
pub fn on_press(input: &BooleanInput) -> SharedEventInput {
    edge(input, |value| value)
}

/// Fires when `input` goes from true to false.
pub fn on_release(input: &BooleanInput) -> SharedEventInput {
    edge(input, |value| !value)
}

/// Fires on every change of `input`.
pub fn on_change_event(input: &BooleanInput) -> SharedEventInput {
    edge(input, |_| true)
}

fn edge(input: &BooleanInput, wanted: fn(bool) -> bool) -> SharedEventInput {
    let cell = EventCell::new();
    let target = cell.clone();
    // Lives as long as `input`.
    input.on_change(Arc::new(move |value| {
        if wanted(value) {
            target.event();
        }
    }));
    cell.as_input()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{BooleanCell, FloatCell, Output, Updating};
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_boolean_operators() {
        let a = BooleanCell::new(false);
        let b = BooleanCell::new(true);
        let (ai, bi) = (a.as_input(), b.as_input());

        let both = and(&ai, &bi);
        let either = or(&ai, &bi);
        let differ = xor(&ai, &bi);
        let inverted = not(&ai);

        assert!(!both.get());
        assert!(either.get());
        assert!(differ.get());
        assert!(inverted.get());

        a.set(true);
        assert!(both.get());
        assert!(!differ.get());
        assert!(!inverted.get());
    }

    #[test]
    fn test_float_operators() {
        let x = FloatCell::new(0.25);
        let y = FloatCell::new(0.5);
        let (xi, yi) = (x.as_input(), y.as_input());

        let sum = plus(&xi, &yi);
        let diff = minus(&xi, &yi);
        let half = scaled(&xi, 0.5);
        let neg = negated(&xi);

        assert_relative_eq!(sum.get(), 0.75);
        assert_relative_eq!(diff.get(), -0.25);
        assert_relative_eq!(half.get(), 0.125);
        assert_relative_eq!(neg.get(), -0.25);

        x.set(-1.0);
        assert_relative_eq!(abs(&xi).get(), 1.0);
        assert_relative_eq!(sum.get(), -0.5);
    }

    #[test]
    fn test_deadzone_and_thresholds() {
        let stick = FloatCell::new(0.05);
        let input = stick.as_input();
        let filtered = deadzone(&input, 0.1);
        let high = at_least(&input, 0.5);
        let low = at_most(&input, -0.5);
        let centered = in_range(&input, -0.1, 0.1);

        assert_eq!(filtered.get(), 0.0);
        assert!(centered.get());

        stick.set(0.8);
        assert_relative_eq!(filtered.get(), 0.8);
        assert!(high.get());
        assert!(!low.get());
        assert!(!centered.get());
    }

    #[test]
    fn test_select_follows_condition() {
        let cond = BooleanCell::new(false);
        let a = FloatCell::new(1.0);
        let b = FloatCell::new(2.0);
        let chosen = select(&cond.as_input(), &a.as_input(), &b.as_input());

        assert_eq!(chosen.get(), 2.0);
        cond.set(true);
        assert_eq!(chosen.get(), 1.0);
        a.set(3.0);
        assert_eq!(chosen.get(), 3.0);
    }

    #[test]
    fn test_edge_events() {
        let button = BooleanCell::new(false);
        let input = button.as_input();
        let events = [on_press(&input), on_release(&input), on_change_event(&input)];
        let counts: Vec<Arc<AtomicUsize>> = events
            .iter()
            .map(|event| {
                let count = Arc::new(AtomicUsize::new(0));
                let count2 = count.clone();
                event.on_update(Arc::new(move || {
                    count2.fetch_add(1, Ordering::SeqCst);
                }));
                count
            })
            .collect();

        button.set(true);
        button.set(false);
        button.set(true);

        let seen: Vec<usize> = counts.iter().map(|c| c.load(Ordering::SeqCst)).collect();
        assert_eq!(seen, vec![2, 1, 3]);
    }
}
