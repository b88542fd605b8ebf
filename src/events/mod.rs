//! # Events Module
//!
//! Progress and diagnostic events for registrations and searches.
//!
//! ## Design
//! Services emit events through channels, so any front end (CLI, GUI,
//! web) can show progress and surface skipped photos without parsing logs.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         match event {
//!             Event::Image(ImageEvent::Processed(p)) => println!("{}/{}", p.completed, p.total),
//!             Event::Image(ImageEvent::Skipped { file_name, reason, .. }) => {
//!                 eprintln!("skipped {}: {}", file_name, reason)
//!             }
//!             _ => {}
//!         }
//!     }
//! });
//!
//! service.register_with_events(request, &sender)?;
//! ```

mod channel;
mod types;

pub use channel::{EventChannel, EventReceiver, EventSender, null_sender};
pub use types::*;
