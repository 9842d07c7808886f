pub mod client;

pub use client::{Console, TermNotifier};
