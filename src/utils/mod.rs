pub mod listeners;

pub use listeners::{ListenerRegistry, Subscription};
