//! kanalwart-sync – Roster-Abgleich zwischen Spielserver und Teamspeak
//!
//! Haelt zwei unabhaengig voneinander wechselnde Roster (Voice-Clients und
//! Spiel-Clients) synchron, indem Voice-Clients zwischen Staging-, Team-
//! und Squad-Kanaelen verschoben werden.
//!
//! Kernbausteine:
//! - [`verbindung::TsVerbindung`] – eine Query-Verbindung, eine Anfrage in
//!   Flug, Antwort-Akkumulation bis Statuszeile oder Zeitbudget
//! - [`roster::RosterBestand`] – Schnappschuesse beider Roster plus die
//!   abgeglichene Master-Sicht
//! - [`kanaele::KanalVerzeichnis`] – Staging/Dropoff/Pickup/Team/Squad-
//!   Kanaele, finden-oder-erstellen, Aufraeumen leerer Kanaele
//! - [`engine::SyncEngine`] – die Abgleichslogik selbst
//! - [`dienst::SyncDienst`] – Warteschlange, Verteiler-Task und Takt-Geber
//!
//! Alle Protokoll-I/O und alle Zustandsmutation laufen im einzigen
//! Verteiler-Task (Single-Writer-Disziplin); Produzenten reihen nur
//! Aktionen ein.

pub mod aktionen;
pub mod dienst;
pub mod engine;
pub mod kanaele;
pub mod konfig;
pub mod matcher;
pub mod nachrichten;
pub mod roster;
pub mod verbindung;
pub mod wiederverbindung;

pub use aktionen::{Aktion, AktionsWarteschlange, RosterSchnappschuss, SchnappschussEintrag};
pub use dienst::{LaufStatus, SyncDienst, SyncHandle};
pub use konfig::SyncKonfig;
pub use nachrichten::{ProtokollNachrichter, SpielNachrichter};
