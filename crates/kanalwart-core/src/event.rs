//! Ereignisse des Spielservers
//!
//! Definiert die Schnittstelle zur Spielserver-Seite: der Host (RCON-Layer,
//! Plugin-Umgebung o.ae.) liefert diese Ereignisse an den Sync-Dienst.
//! Kanalwart konsumiert sie nur; wie sie entstehen ist Sache des Hosts.

use serde::{Deserialize, Serialize};

/// Ein Spieler-Eintrag aus einem Roster-Schnappschuss des Spielservers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpielerInfo {
    /// Spielername (primaerer Abgleichschluessel)
    pub name: String,
    /// Team-ID, 0 = Zuschauer / noch keinem Team zugeteilt
    pub team_id: i32,
    /// Squad-ID, 0 = kein Squad
    pub squad_id: i32,
}

/// Alle Ereignisse die der Spielserver an den Dienst liefert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SpielEreignis {
    /// Ein Spieler hat den Spielserver betreten
    Beigetreten { name: String },
    /// Ein Spieler hat den Spielserver verlassen
    Verlassen { name: String },
    /// Ein Spieler ist gespawnt
    Gespawnt { name: String },
    /// Ein Spieler hat Team oder Squad gewechselt
    TeamGewechselt {
        name: String,
        team_id: i32,
        squad_id: i32,
    },
    /// Vollstaendiger Roster-Schnappschuss des Spielservers
    RosterSchnappschuss { spieler: Vec<SpielerInfo> },
    /// Die Runde ist zu Ende (Zwischenrunden-Phase beginnt)
    RundeBeendet,
    /// Eine neue Runde hat begonnen
    RundeGestartet,
    /// Freitext-Chat, ggf. ein `!ts...`-Steuerbefehl
    ChatBefehl { sprecher: String, text: String },
    /// IP-Information aus der Nebenquelle (unabhaengig vom Roster)
    IpInfo {
        name: String,
        ip: String,
        land: String,
    },
}
