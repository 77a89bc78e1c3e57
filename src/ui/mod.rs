//! The UI-thread injection protocol.
//!
//! Desktop applications own exactly one thread that pumps the event
//! loop. This module lets background threads inject closures into that
//! thread ([`UiDispatcher::perform`]) and lets the UI thread itself wait
//! on events without freezing the interface
//! ([`UiDispatcher::modal_wait`]).
//!
//! The platform coupling lives behind the [`MessagePump`] trait: post a
//! wake-up notification, peek/dispatch messages by class, register a
//! message-extraction hook, and block in a combined object/message wait.
//! [`StubPump`] is the in-memory implementation used by the test suite;
//! a production backend wraps the host event-dispatch API.

mod dispatcher;
mod pump;
mod stub;

pub use dispatcher::UiDispatcher;
pub use pump::{HookVerdict, Message, MessageClass, MessageHook, MessagePump, PumpWait};
pub use stub::StubPump;
