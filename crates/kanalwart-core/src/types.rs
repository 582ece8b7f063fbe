//! Identifikationstypen fuer das Teamspeak-Query-Protokoll
//!
//! Die IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen. Team- und
//! Squad-IDs des Spielservers bleiben bewusst rohe `i32`-Werte: der Wert
//! `0` bedeutet dort "kein Team/Squad" und wird staendig verglichen.

use serde::{Deserialize, Serialize};

/// ID eines verbundenen Voice-Clients (`clid` im Wire-Protokoll)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub i32);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "clid:{}", self.0)
    }
}

/// ID eines Kanals (`cid` im Wire-Protokoll)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KanalId(pub i32);

impl std::fmt::Display for KanalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cid:{}", self.0)
    }
}

/// Persistente Datenbank-ID eines Voice-Clients (`client_database_id`)
///
/// Bleibt ueber Verbindungen hinweg stabil und wird darum fuer die
/// Entfernungs-Whitelist verwendet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatenbankId(pub i32);

impl std::fmt::Display for DatenbankId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cldbid:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_sind_vergleichbar() {
        assert_eq!(ClientId(5), ClientId(5));
        assert_ne!(KanalId(1), KanalId(2));
    }

    #[test]
    fn display_format() {
        assert_eq!(ClientId(7).to_string(), "clid:7");
        assert_eq!(KanalId(12).to_string(), "cid:12");
        assert_eq!(DatenbankId(99).to_string(), "cldbid:99");
    }
}
