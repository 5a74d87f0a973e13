//! Right-to-left layout engine for HTML documents.
//!
//! Elements whose text contains Hebrew are mirrored: `direction`, alignment,
//! horizontal spacing, floats, flex rows and corner radii are flipped, gated
//! by an intensity derived from the viewport width. Every change is recorded
//! on the element so it can be reverted exactly.
//!
//! The engine runs on the current thread: [`transform`] must be awaited
//! inside a [`tokio::task::LocalSet`].
//!
//! ```no_run
//! # async fn demo() -> rtl_mirror::Result<()> {
//! use rtl_mirror::{transform, Document, EngineConfig};
//!
//! let doc = Document::parse("<html><body><p>שלום עולם</p></body></html>").into_shared();
//! let body = doc.borrow().body().expect("parsed documents have a body");
//! tokio::task::LocalSet::new()
//!     .run_until(async {
//!         let handle = transform(doc.clone(), body, EngineConfig::default()).await?;
//!         println!("{:?}", handle.stats());
//!         handle.dispose();
//!         Ok(())
//!     })
//!     .await
//! # }
//! ```

pub mod browser;
pub mod config;
pub mod detect;
pub mod disposable;
pub mod dom;
pub mod engine;
pub mod error;
pub mod mutation;
pub mod planner;
pub mod responsive;
pub mod scheduler;
mod serialize;
pub mod style;
pub mod transform;
pub mod verify;

pub use config::{EngineConfig, Preset};
pub use detect::{detect, Confidence, DetectionResult};
pub use disposable::Disposable;
pub use dom::{Document, SharedDocument};
pub use engine::{transform, EngineHandle, EngineStats};
pub use error::{Error, Result};
pub use responsive::Intensity;
pub use scheduler::Stats;
pub use verify::{VerificationReport, VerificationReporter};
