//! Daemon-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte; lediglich der Teamspeak-Zugang muss gesetzt
//! werden, was die Validierung nach dem Laden erzwingt.

use serde::{Deserialize, Serialize};

use kanalwart_sync::SyncKonfig;

/// Vollstaendige Daemon-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonKonfig {
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Synchronisations-Einstellungen (siehe kanalwart-sync)
    #[serde(flatten)]
    pub sync: SyncKonfig,
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl DaemonKonfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let konfig: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(konfig)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_konfig() {
        let konfig = DaemonKonfig::default();
        assert_eq!(konfig.logging.level, "info");
        assert_eq!(konfig.logging.format, "text");
        assert_eq!(konfig.sync.teamspeak.query_port, 10011);
    }

    #[test]
    fn konfig_aus_toml_string() {
        let toml = r#"
            [logging]
            level = "debug"

            [teamspeak]
            host = "voice.example.org"
            query_nutzername = "serveradmin"
            query_passwort = "geheim"
            staging_kanal = "Lobby"

            [synchronisierung]
            squad_swapping = true
            update_intervall_ms = 15000
        "#;
        let konfig: DaemonKonfig = toml::from_str(toml).unwrap();
        assert_eq!(konfig.logging.level, "debug");
        assert_eq!(konfig.sync.teamspeak.host, "voice.example.org");
        assert!(konfig.sync.synchronisierung.squad_swapping);
        assert_eq!(konfig.sync.synchronisierung.update_intervall_ms, 15_000);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(konfig.sync.teamspeak.server_port, 9987);
        assert!(konfig.sync.validieren().is_ok());
    }

    #[test]
    fn unvollstaendige_konfig_faellt_durch_validierung() {
        let konfig = DaemonKonfig::default();
        assert!(konfig.sync.validieren().is_err());
    }
}
