// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Blocking primitives: futex wrappers, spin-then-park strategies and the
//! turn sequencer built on them.

pub mod futex;
pub mod turn_sequencer;
pub mod wait;

pub use futex::FutexResult;
pub use turn_sequencer::{TryWaitResult, TurnSequencer};
pub use wait::{FutexWait, SpinCutoff, WaitStrategy};
