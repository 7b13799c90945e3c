//! `hb-tools` — the tool catalog and executor behind the conversation loop.
//!
//! | Module        | Purpose                                                   |
//! |---------------|-----------------------------------------------------------|
//! | `kind`        | closed [`ToolKind`] catalog and model-facing definitions  |
//! | `input`       | typed, validated tool inputs                              |
//! | `executor`    | handler registry and [`ToolExecutor`]                     |
//! | `handlers`    | one handler per tool                                      |
//! | `enrichment`  | property-data source and the enrichment service           |
//! | `undo`        | reversal of undo actions                                  |
//! | `background`  | fire-and-forget job dispatcher                            |
//! | `summary`     | one-line descriptions of calls and results                |

pub mod address;
pub mod background;
pub mod enrichment;
pub mod executor;
pub mod files;
pub mod handlers;
pub mod input;
pub mod kind;
pub mod summary;
pub mod todo;
pub mod undo;

pub use background::Dispatcher;
pub use enrichment::{Enricher, EnrichmentOutcome, PropertyDataSource, PropertyRecord, RentCastSource};
pub use executor::{ToolContext, ToolExecutor, ToolOutcome, ToolRegistry, ToolSettings, Touched};
pub use files::GeneratedFile;
pub use handlers::upcoming_deadlines;
pub use kind::ToolKind;
pub use todo::TodoList;
pub use undo::{UndoError, UndoRequest, UndoService};
