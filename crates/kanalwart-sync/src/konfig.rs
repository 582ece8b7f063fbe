//! Typisierte Konfiguration der Synchronisation
//!
//! Wird einmal beim Start geladen und validiert. Alle Schwellwerte,
//! Namenstabellen und Feature-Schalter der Abgleichsregeln leben hier;
//! die Persistenz (TOML-Datei) uebernimmt der Daemon.

use serde::{Deserialize, Serialize};

/// Vollstaendige Sync-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncKonfig {
    /// Teamspeak-Server und Query-Zugang
    pub teamspeak: TeamspeakEinstellungen,
    /// Kanal-Namenstabellen und Kanal-Verwaltung
    pub kanaele: KanalEinstellungen,
    /// Abgleichsregeln und Schwellwerte
    pub synchronisierung: SyncEinstellungen,
    /// Neuverbindungs-Verhalten
    pub fehlerbehandlung: FehlerEinstellungen,
    /// Spieler-Benachrichtigungen
    pub nachrichten: NachrichtenEinstellungen,
    /// In-Game-Chatbefehle
    pub befehle: BefehlEinstellungen,
}

impl SyncKonfig {
    /// Prueft die Konfiguration auf offensichtliche Fehler.
    ///
    /// Wird vom Daemon einmal nach dem Laden aufgerufen, damit die Engine
    /// mit bereits validierten Werten arbeiten kann.
    pub fn validieren(&self) -> Result<(), String> {
        if self.teamspeak.host.trim().is_empty() {
            return Err("teamspeak.host darf nicht leer sein".into());
        }
        if self.teamspeak.query_port == 0 {
            return Err("teamspeak.query_port darf nicht 0 sein".into());
        }
        if self.synchronisierung.update_intervall_ms == 0 {
            return Err("synchronisierung.update_intervall_ms darf nicht 0 sein".into());
        }
        if !(0.0..=100.0).contains(&self.synchronisierung.matching_schwelle) {
            return Err("synchronisierung.matching_schwelle muss zwischen 0 und 100 liegen".into());
        }
        Ok(())
    }
}

/// Teamspeak-Server und Query-Zugang
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamspeakEinstellungen {
    /// Hostname oder IP des Teamspeak-Servers
    pub host: String,
    /// Voice-Port des virtuellen Servers (fuer `use port=`)
    pub server_port: u16,
    /// Query-Port (Text-Protokoll)
    pub query_port: u16,
    /// Query-Benutzername
    pub query_nutzername: String,
    /// Query-Passwort
    pub query_passwort: String,
    /// Nickname unter dem der Query-Client sichtbar ist
    pub query_nickname: String,
    /// Name des Staging-Kanals (Lobby)
    pub staging_kanal: String,
    /// Dropoff-Kanal aktiviert?
    pub dropoff_aktiviert: bool,
    /// Name des Dropoff-Kanals
    pub dropoff_kanal: String,
    /// Namen der Pickup-Kanaele (Schutzzonen, nie Ziel einer Verschiebung)
    pub pickup_kanaele: Vec<String>,
}

impl Default for TeamspeakEinstellungen {
    fn default() -> Self {
        Self {
            host: String::new(),
            server_port: 9987,
            query_port: 10011,
            query_nutzername: String::new(),
            query_passwort: String::new(),
            query_nickname: "Kanalwart".into(),
            staging_kanal: "Lobby".into(),
            dropoff_aktiviert: false,
            dropoff_kanal: "AFK".into(),
            pickup_kanaele: Vec::new(),
        }
    }
}

/// Kanal-Namenstabellen und Kanal-Verwaltung
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KanalEinstellungen {
    /// Passwort fuer automatisch erstellte Kanaele (leer = kein Passwort)
    pub passwort: String,
    /// Namen der Team-Kanaele, Index 0 = Team 1
    pub team_namen: Vec<String>,
    /// Namen der Squad-Kanaele, Index 0 = Squad 1
    pub squad_namen: Vec<String>,
    /// Leere Team-/Squad-Kanaele nach jeder Verschiebung loeschen?
    pub leere_entfernen: bool,
}

impl KanalEinstellungen {
    /// Name eines Team-Kanals, mit Rueckfall auf "Team N"
    pub fn team_name(&self, team_id: i32) -> String {
        self.team_namen
            .get((team_id - 1).max(0) as usize)
            .cloned()
            .unwrap_or_else(|| format!("Team {team_id}"))
    }

    /// Name eines Squad-Kanals, mit Rueckfall auf "Squad N"
    pub fn squad_name(&self, squad_id: i32) -> String {
        self.squad_namen
            .get((squad_id - 1).max(0) as usize)
            .cloned()
            .unwrap_or_else(|| format!("Squad {squad_id}"))
    }
}

impl Default for KanalEinstellungen {
    fn default() -> Self {
        Self {
            passwort: String::new(),
            team_namen: vec![
                "Team 1".into(),
                "Team 2".into(),
                "Team 3".into(),
                "Team 4".into(),
            ],
            squad_namen: [
                "Alpha", "Bravo", "Charlie", "Delta", "Echo", "Foxtrot", "Golf", "Hotel",
                "India", "Juliet", "Kilo", "Lima", "Mike", "November", "Oscar", "Papa",
                "Quebec", "Romeo", "Sierra", "Tango", "Uniform", "Victor", "Whiskey", "Xray",
                "Yankee", "Zulu",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            leere_entfernen: false,
        }
    }
}

/// Abgleichsregeln und Schwellwerte
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncEinstellungen {
    /// Mindestabstand zwischen zwei Abfragen aktivieren?
    ///
    /// Der entfernte Server bannt Query-Clients die schneller als etwa
    /// 10 Befehle pro 3 Sekunden senden.
    pub abfragen_drosseln: bool,
    /// Mindestabstand zwischen zwei Abfragen in Millisekunden
    pub drossel_abstand_ms: u64,
    /// Intervall des Roster-Abgleich-Takts in Millisekunden
    pub update_intervall_ms: u64,
    /// Team-basiertes Verschieben aktiv?
    pub team_swapping: bool,
    /// Mindestanzahl Spieler auf beiden Servern fuer Team-Verschiebung
    pub team_schwelle: u32,
    /// Zwischen Runden alle in den Staging-Kanal verschieben?
    pub zwischenrunden_swapping: bool,
    /// Squad-basiertes Verschieben aktiv?
    pub squad_swapping: bool,
    /// Mindestanzahl Team-Spieler auf beiden Servern fuer Squad-Verschiebung
    pub squad_schwelle: u32,
    /// Mindestgroesse eines Squads auf beiden Servern
    pub squad_mindestgroesse: u32,
    /// Namens-Aehnlichkeitsschwelle (0-100) fuer Abgleich ohne IP.
    ///
    /// Standard 100 = nur exakte Treffer. Die Quelle war hier zwischen
    /// Revisionen uneindeutig; konservativ ist die sichere Wahl.
    pub matching_schwelle: f64,
    /// Voice-Clients ohne Spiel-Gegenstueck in den Dropoff/Staging-Kanal
    /// verschieben?
    pub clients_entfernen: bool,
    /// Datenbank-IDs die von der Entfernung ausgenommen sind
    pub entfernen_whitelist: Vec<i32>,
}

impl Default for SyncEinstellungen {
    fn default() -> Self {
        Self {
            abfragen_drosseln: false,
            drossel_abstand_ms: 700,
            update_intervall_ms: 10_000,
            team_swapping: true,
            team_schwelle: 1,
            zwischenrunden_swapping: true,
            squad_swapping: false,
            squad_schwelle: 8,
            squad_mindestgroesse: 2,
            matching_schwelle: 100.0,
            clients_entfernen: true,
            entfernen_whitelist: Vec::new(),
        }
    }
}

/// Neuverbindungs-Verhalten nach Transportfehlern
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FehlerEinstellungen {
    /// Nach Transportfehlern neu verbinden?
    pub neu_verbinden: bool,
    /// Maximale Anzahl Versuche
    pub versuche: u32,
    /// Wartezeit zwischen Versuchen in Millisekunden (nicht vor dem ersten)
    pub intervall_ms: u64,
}

impl Default for FehlerEinstellungen {
    fn default() -> Self {
        Self {
            neu_verbinden: true,
            versuche: 20,
            intervall_ms: 30_000,
        }
    }
}

/// Spieler-Benachrichtigungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NachrichtenEinstellungen {
    /// Benachrichtigungen aktiv?
    pub aktiviert: bool,
    /// Neu beigetretene Spieler nach einer Verzoegerung anschreiben?
    pub bei_beitritt: bool,
    /// Verzoegerung der Beitritts-Nachricht in Millisekunden
    pub beitritt_verzoegerung_ms: u64,
    /// Intervall des Benachrichtigungs-Takts in Millisekunden
    pub intervall_ms: u64,
    /// Text der Benachrichtigung
    pub text: String,
    /// Anzeigedauer in Sekunden
    pub dauer_s: u32,
}

impl Default for NachrichtenEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: false,
            bei_beitritt: false,
            beitritt_verzoegerung_ms: 300_000,
            intervall_ms: 1_800_000,
            text: "Dieser Server synchronisiert Teamspeak-Kanaele mit den Squads.".into(),
            dauer_s: 6,
        }
    }
}

/// Schalter fuer die In-Game-Chatbefehle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BefehlEinstellungen {
    /// `!tssquads` – freie Squads mit Teamspeak-Spielern anzeigen
    pub squad_liste: bool,
    /// `!tslobby` – Spieler im Staging-Kanal halten
    pub sync_staging: bool,
    /// `!tsteam` – Spieler im Team-Kanal halten
    pub sync_team: bool,
    /// `!tsnosync` – Spieler vom Abgleich ausnehmen
    pub kein_sync: bool,
}

impl Default for BefehlEinstellungen {
    fn default() -> Self {
        Self {
            squad_liste: true,
            sync_staging: true,
            sync_team: true,
            kein_sync: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardwerte() {
        let konfig = SyncKonfig::default();
        assert_eq!(konfig.teamspeak.query_port, 10011);
        assert_eq!(konfig.teamspeak.server_port, 9987);
        assert_eq!(konfig.synchronisierung.update_intervall_ms, 10_000);
        assert_eq!(konfig.synchronisierung.matching_schwelle, 100.0);
        assert_eq!(konfig.fehlerbehandlung.versuche, 20);
        assert!(!konfig.nachrichten.aktiviert);
    }

    #[test]
    fn team_name_mit_rueckfall() {
        let kanaele = KanalEinstellungen::default();
        assert_eq!(kanaele.team_name(1), "Team 1");
        assert_eq!(kanaele.team_name(7), "Team 7");
    }

    #[test]
    fn squad_name_aus_tabelle() {
        let kanaele = KanalEinstellungen::default();
        assert_eq!(kanaele.squad_name(1), "Alpha");
        assert_eq!(kanaele.squad_name(26), "Zulu");
        assert_eq!(kanaele.squad_name(27), "Squad 27");
    }

    #[test]
    fn validierung_lehnt_leeren_host_ab() {
        let konfig = SyncKonfig::default();
        assert!(konfig.validieren().is_err());

        let mut konfig = SyncKonfig::default();
        konfig.teamspeak.host = "voice.example.org".into();
        assert!(konfig.validieren().is_ok());
    }

    #[test]
    fn validierung_prueft_schwelle() {
        let mut konfig = SyncKonfig::default();
        konfig.teamspeak.host = "voice.example.org".into();
        konfig.synchronisierung.matching_schwelle = 150.0;
        assert!(konfig.validieren().is_err());
    }
}
