// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Property-Based Tests: MPMC queue against a `VecDeque` model
//!
//! Single-threaded sequences of non-blocking operations must behave exactly
//! like a bounded FIFO: a push succeeds iff fewer than `capacity` elements
//! are held, a pop returns the oldest element iff one is held, and the
//! counters track both.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use ringlog::MpmcQueue;
    use std::collections::VecDeque;

    #[derive(Debug, Clone)]
    enum Op {
        TryPush(u32),
        TryPop,
        WriteIfNotFull(u32),
        ReadIfNotEmpty,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<u32>().prop_map(Op::TryPush),
            Just(Op::TryPop),
            any::<u32>().prop_map(Op::WriteIfNotFull),
            Just(Op::ReadIfNotEmpty),
        ]
    }

    proptest! {
        /// **Property:** non-blocking operations match a bounded `VecDeque`.
        #[test]
        fn test_matches_bounded_fifo(
            capacity in 1usize..=33,
            ops in prop::collection::vec(op(), 0..400),
        ) {
            let queue = MpmcQueue::new(capacity).unwrap();
            let mut model = VecDeque::new();
            let (mut pushes, mut pops) = (0u64, 0u64);

            for op in ops {
                match op {
                    Op::TryPush(v) | Op::WriteIfNotFull(v) => {
                        let result = if matches!(op, Op::TryPush(_)) {
                            queue.try_push(v)
                        } else {
                            queue.write_if_not_full(v)
                        };
                        if model.len() < capacity {
                            prop_assert_eq!(result, Ok(()));
                            model.push_back(v);
                            pushes += 1;
                        } else {
                            prop_assert_eq!(result, Err(v));
                        }
                    }
                    Op::TryPop | Op::ReadIfNotEmpty => {
                        let got = if matches!(op, Op::TryPop) {
                            queue.try_pop()
                        } else {
                            queue.read_if_not_empty()
                        };
                        let want = model.pop_front();
                        if want.is_some() {
                            pops += 1;
                        }
                        prop_assert_eq!(got, want);
                    }
                }

                prop_assert_eq!(queue.size(), model.len());
                prop_assert_eq!(queue.is_empty(), model.is_empty());
                prop_assert_eq!(queue.is_full(), model.len() == capacity);
                prop_assert_eq!(queue.write_count(), pushes);
                prop_assert_eq!(queue.read_count(), pops);
            }
        }

        /// **Property:** whatever is left in the queue is dropped exactly once.
        #[test]
        fn test_leftovers_dropped_once(capacity in 1usize..=16, fill in 0usize..=16) {
            use std::rc::Rc;

            let token = Rc::new(());
            {
                let queue = MpmcQueue::new(capacity).unwrap();
                for _ in 0..fill.min(capacity) {
                    prop_assert!(queue.try_push(Rc::clone(&token)).is_ok());
                }
                prop_assert_eq!(Rc::strong_count(&token), 1 + fill.min(capacity));
            }
            prop_assert_eq!(Rc::strong_count(&token), 1);
        }
    }
}
