//! kanalwart-daemon – Bibliotheks-Root
//!
//! Deklariert die Daemon-Module und stellt die Konfiguration fuer
//! Integrationstests bereit.

pub mod konfig;

pub use konfig::DaemonKonfig;
