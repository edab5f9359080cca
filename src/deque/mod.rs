/*!
 * Blocking Concurrent Deque
 *
 * A double-ended queue built from a short internal lock plus four signaling
 * events: a push gate, a pop gate, and the complementary empty/content
 * pair. Push-blocking and pop-blocking hold tokens close the gates; a
 * nested upgradable iterator lock serializes traversal against structural
 * mutation.
 *
 * # Gating
 *
 * - `push_gate` set ⇔ no push-blocking hold is outstanding
 * - `pop_gate` set ⇔ no pop-blocking hold is outstanding
 * - `empty` set ⇔ the sequence is empty; `content` is always its complement
 *
 * Every gated operation takes a timeout budget and an optional external
 * abort waitable, and observes teardown rather than proceeding against a
 * closing container.
 */

mod deque;
mod guards;

pub use deque::{BlockingDeque, DequeError, DequeResult};
pub use guards::{DequeReadGuard, DequeWriteGuard};
