//! Business logic services.
//!
//! The reconciliation core (`keyed_merge`, `due_date`, `reconcile`) is pure
//! and synchronous. `admission`, `sync_cycle` and `sync_manager` add the
//! scheduling around it, and the `*_client` modules are the HTTP adapters
//! behind the traits in `sources`.

pub mod admission;
pub mod canvas_client;
pub mod classifier;
pub mod due_date;
pub mod html_text;
pub mod keyed_merge;
pub mod notion_client;
pub mod reconcile;
pub mod sources;
pub mod sync_cycle;
pub mod sync_manager;

pub use admission::AdmissionScheduler;
pub use canvas_client::CanvasClient;
pub use classifier::OpenAiClassifier;
pub use notion_client::NotionClient;
pub use sources::{NoClassifier, PlannerSource, SizeClassifier, TaskDatabase};
pub use sync_cycle::SyncCycle;
pub use sync_manager::{CycleOutcome, CycleRunner, HttpCycleRunner, SyncManager, TenantRun};
