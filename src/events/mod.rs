//! # Events Module
//!
//! Progress reporting for fingerprinting runs.
//!
//! ## Design
//! The engine emits events through a channel so a front-end (the CLI
//! progress bar, a log, a test) can follow a run without the engine knowing
//! who is listening. Sending never blocks a worker on an absent listener.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         if let Event::File(FileEvent::Written(p)) = event {
//!             println!("{}/{}", p.completed, p.total);
//!         }
//!     }
//! });
//!
//! Pipeline::builder().events(sender).build().run(files, sink)?;
//! ```

mod channel;
mod types;

pub use channel::{null_sender, EventChannel, EventReceiver, EventSender};
pub use types::*;
