//! kanalwart-protocol – Wire-Codec fuer das Teamspeak-Query-Protokoll
//!
//! Zeilenbasiertes Textprotokoll (ServerQuery-Stil):
//!
//! ```text
//! Anfrage:  befehl key1=wert1 key2=wert2 -option\n
//! Antwort:  key=wert key=wert|key=wert ...       (Sektionen)
//!           error id=0 msg=ok                    (Statuszeile)
//! ```
//!
//! Sonderzeichen in Werten werden mit Backslash escaped (`\s` = Leerzeichen,
//! `\p` = Pipe usw., siehe [`escape`]). Der Parser ist bewusst nachsichtig:
//! fehlerhafte `key=value`-Fragmente werden verworfen, doppelte Keys
//! ueberschreiben sich (der letzte Wert gewinnt) – der entfernte Server
//! sendet gelegentlich Keys doppelt.

pub mod escape;
pub mod query;
pub mod response;

pub use escape::{ts_escape, ts_unescape};
pub use query::TsQuery;
pub use response::{AntwortGruppe, AntwortSektion, TsAntwort, STATUS_MARKER};
