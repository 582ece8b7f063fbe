//! kanalwart-core – Gemeinsame Typen, Ereignisse und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von den
//! anderen Kanalwart-Crates gemeinsam genutzt werden.

pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{FehlerSchwere, Result, SyncFehler};
pub use event::{SpielEreignis, SpielerInfo};
pub use types::{ClientId, DatenbankId, KanalId};
