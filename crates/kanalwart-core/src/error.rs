//! Fehlertypen fuer Kanalwart
//!
//! Zentraler Fehler-Enum der alle Fehlerzustaende der Synchronisation
//! abdeckt. Jeder Fehler traegt eine Schwere-Einstufung, an der die
//! Engine entscheidet ob eine Operation abgebrochen, die Verbindung neu
//! aufgebaut oder der Dienst komplett deaktiviert wird.

use thiserror::Error;

/// Globaler Result-Alias fuer Kanalwart
pub type Result<T> = std::result::Result<T, SyncFehler>;

/// Wire-Fehlercode: temporaerer Bann wegen Flooding
pub const CODE_FLOOD_BANN: i32 = 3329;
/// Wire-Fehlercode: temporaerer Bann fuer n Sekunden
pub const CODE_ZEIT_BANN: i32 = 3331;
/// Wire-Fehlercode: Kanal existiert nicht mehr (ungueltige Kanal-ID)
pub const CODE_KANAL_UNGUELTIG: i32 = 768;
/// Wire-Fehlercode: Nickname bereits vergeben
pub const CODE_NICKNAME_VERGEBEN: i32 = 513;

/// Schwere-Einstufung eines Fehlers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FehlerSchwere {
    /// Protokollieren und weitermachen
    Unbedeutend,
    /// Die laufende Operation abbrechen, naechster Durchlauf versucht es erneut
    OperationAbbrechen,
    /// Verbindung ist unbrauchbar: Neuverbindung oder Deaktivierung
    Fatal,
    /// Der Server hat uns gebannt: sofort deaktivieren, KEINE Neuverbindung
    FloodBann,
}

/// Alle moeglichen Fehler der Teamspeak-Synchronisation
#[derive(Debug, Error)]
pub enum SyncFehler {
    // --- Vorbedingungen (Verbindung) ---
    #[error("Verbindung wurde erneut geoeffnet obwohl sie bereits offen war")]
    BereitsVerbunden,

    #[error("Leere Server-Adresse")]
    LeererHost,

    #[error("Port 0 ist ungueltig")]
    PortNull,

    #[error("Es besteht keine Verbindung zum Server")]
    NichtVerbunden,

    // --- Transport ---
    #[error("Verbindungsaufbau fehlgeschlagen: {0}")]
    VerbindungFehlgeschlagen(String),

    #[error("Begruessung des Servers enthielt kein TS3-Banner")]
    BegruessungUngueltig,

    #[error("Senden der Abfrage fehlgeschlagen: {0}")]
    SendenFehlgeschlagen(String),

    #[error("Empfang der Antwort fehlgeschlagen: {0}")]
    EmpfangFehlgeschlagen(String),

    // --- Protokoll ---
    #[error("Server-Fehler {id}: {nachricht}")]
    Server {
        id: i32,
        nachricht: String,
        zusatz: Option<String>,
    },

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Intern ---
    #[error(transparent)]
    Intern(#[from] anyhow::Error),
}

impl SyncFehler {
    /// Stuft den Fehler nach Schwere ein.
    ///
    /// Server-Fehler ausserhalb der Bann-Codes sind standardmaessig
    /// `OperationAbbrechen`; die Engine verschaerft oder mildert das je
    /// nach Aufrufstelle (Login-Fehler sind fatal, Nickname-Kollisionen
    /// unbedeutend).
    pub fn schwere(&self) -> FehlerSchwere {
        match self {
            Self::BereitsVerbunden | Self::NichtVerbunden => FehlerSchwere::Unbedeutend,
            Self::LeererHost | Self::PortNull => FehlerSchwere::Fatal,
            Self::VerbindungFehlgeschlagen(_)
            | Self::BegruessungUngueltig
            | Self::SendenFehlgeschlagen(_)
            | Self::EmpfangFehlgeschlagen(_) => FehlerSchwere::Fatal,
            Self::Server { id, .. } if ist_bann_code(*id) => FehlerSchwere::FloodBann,
            Self::Server { .. } => FehlerSchwere::OperationAbbrechen,
            Self::Konfiguration(_) => FehlerSchwere::Fatal,
            Self::Intern(_) => FehlerSchwere::Fatal,
        }
    }

    /// True wenn es sich um einen Transport-Fehler handelt, fuer den eine
    /// Neuverbindung sinnvoll ist.
    pub fn ist_transport(&self) -> bool {
        matches!(
            self,
            Self::VerbindungFehlgeschlagen(_)
                | Self::BegruessungUngueltig
                | Self::SendenFehlgeschlagen(_)
                | Self::EmpfangFehlgeschlagen(_)
        )
    }
}

/// True fuer Wire-Codes die einen temporaeren Bann anzeigen
pub fn ist_bann_code(id: i32) -> bool {
    id == CODE_FLOOD_BANN || id == CODE_ZEIT_BANN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bann_codes_sind_flood_bann() {
        let f = SyncFehler::Server {
            id: CODE_FLOOD_BANN,
            nachricht: "flooding".into(),
            zusatz: None,
        };
        assert_eq!(f.schwere(), FehlerSchwere::FloodBann);

        let f = SyncFehler::Server {
            id: CODE_ZEIT_BANN,
            nachricht: "banned".into(),
            zusatz: Some("600".into()),
        };
        assert_eq!(f.schwere(), FehlerSchwere::FloodBann);
    }

    #[test]
    fn transport_fehler_sind_fatal() {
        let f = SyncFehler::SendenFehlgeschlagen("broken pipe".into());
        assert_eq!(f.schwere(), FehlerSchwere::Fatal);
        assert!(f.ist_transport());
    }

    #[test]
    fn vorbedingungen_sind_unbedeutend() {
        assert_eq!(
            SyncFehler::BereitsVerbunden.schwere(),
            FehlerSchwere::Unbedeutend
        );
        assert_eq!(
            SyncFehler::NichtVerbunden.schwere(),
            FehlerSchwere::Unbedeutend
        );
        assert!(!SyncFehler::NichtVerbunden.ist_transport());
    }

    #[test]
    fn server_fehler_bricht_operation_ab() {
        let f = SyncFehler::Server {
            id: 512,
            nachricht: "invalid clientID".into(),
            zusatz: None,
        };
        assert_eq!(f.schwere(), FehlerSchwere::OperationAbbrechen);
    }

    #[test]
    fn fehler_anzeige() {
        let f = SyncFehler::Server {
            id: 520,
            nachricht: "invalid loginname or password".into(),
            zusatz: None,
        };
        assert_eq!(
            f.to_string(),
            "Server-Fehler 520: invalid loginname or password"
        );
    }
}
