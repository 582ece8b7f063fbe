//! Aktions-Warteschlange des Verteilers
//!
//! Alle Produzenten (Takt-Geber, Spielserver-Ereignisse, Chat-Befehle)
//! reihen Aktionen ein; ein einziger Verteiler-Task entnimmt sie der
//! Reihe nach. Die Warteschlange ist die einzige Struktur die von
//! mehreren Tasks beruehrt wird: parking_lot-Mutex plus ein zaehlendes
//! Semaphor als Signal.
//!
//! Aktivieren/Deaktivieren sind Schaltbefehle mit Sonderbehandlung: sie
//! springen an den Kopf der Warteschlange und verdraengen dort wartende
//! Schaltbefehle (nur der neueste gewuenschte Zustand zaehlt, redundantes
//! Verbinden/Trennen entfaellt). Invariante: am Kopf wartet hoechstens
//! ein Schaltbefehl.

use std::collections::VecDeque;

use kanalwart_core::event::SpielerInfo;
use kanalwart_core::types::{ClientId, KanalId};
use parking_lot::Mutex;
use tokio::sync::{oneshot, Semaphore};

/// Lese-Schnappschuss der Master-Liste (Anfrage ueber die Warteschlange,
/// Antwort per Oneshot – kein geteilter Speicherzugriff)
#[derive(Debug, Clone, Default)]
pub struct RosterSchnappschuss {
    pub eintraege: Vec<SchnappschussEintrag>,
}

/// Ein Eintrag des Lese-Schnappschusses
#[derive(Debug, Clone)]
pub struct SchnappschussEintrag {
    pub voice_name: Option<String>,
    pub spiel_name: Option<String>,
    pub team_id: Option<i32>,
    pub squad_id: Option<i32>,
    pub kanal_id: Option<KanalId>,
    pub kein_sync: bool,
    pub sync_zu_staging: bool,
    pub sync_zu_team: bool,
}

/// Eine Aktion fuer den Verteiler; wird genau einmal konsumiert
#[derive(Debug)]
pub enum Aktion {
    // --- Schaltbefehle ---
    Aktivieren,
    Deaktivieren,
    /// Beendet den Verteiler-Task (Lifecycle, kein Schaltbefehl)
    Beenden,

    // --- Roster-Pflege ---
    VoiceInfoAktualisieren,
    MasterAktualisieren,
    SpielInfoAktualisieren(Vec<SpielerInfo>),
    IpInfoAktualisieren {
        name: String,
        ip: String,
        land: String,
    },

    // --- Abgleich ---
    AlleSwapsPruefen,
    AlleEntfernungenPruefen,
    AlleNachrichtenPruefen,
    SwapPruefen(String),
    EntfernungPruefen(ClientId),
    NachrichtPruefen(String),
    NachrichtNachBeitritt(String),

    // --- Spielserver-Ereignisse ---
    SpielerBeigetreten(String),
    SpielerVerlassen(String),
    SpielerGespawnt(String),
    TeamGewechselt {
        name: String,
        team_id: i32,
        squad_id: i32,
    },
    RundeBeendet,
    RundeGestartet,
    ChatBefehl {
        sprecher: String,
        text: String,
    },

    // --- Lese-Zugriff ---
    SchnappschussAnfordern(oneshot::Sender<RosterSchnappschuss>),
}

impl Aktion {
    /// True fuer Aktivieren/Deaktivieren (Warteschlangen-Sonderbehandlung)
    pub fn ist_schaltbefehl(&self) -> bool {
        matches!(self, Aktion::Aktivieren | Aktion::Deaktivieren)
    }
}

/// Warteschlange mit einem Konsumenten und beliebig vielen Produzenten
pub struct AktionsWarteschlange {
    aktionen: Mutex<VecDeque<Aktion>>,
    signal: Semaphore,
}

impl AktionsWarteschlange {
    pub fn neu() -> Self {
        Self {
            aktionen: Mutex::new(VecDeque::new()),
            signal: Semaphore::new(0),
        }
    }

    /// Reiht eine Aktion ein.
    ///
    /// Schaltbefehle verdraengen am Kopf wartende Schaltbefehle und landen
    /// selbst am Kopf. Das Semaphor wird dabei nur freigegeben wenn kein
    /// Schaltbefehl verdraengt wurde, sonst stimmte der Zaehler nicht mehr
    /// mit der Warteschlangenlaenge ueberein.
    pub fn einreihen(&self, aktion: Aktion) {
        let mut aktionen = self.aktionen.lock();
        if aktion.ist_schaltbefehl() {
            let mut verdraengt = 0usize;
            while aktionen.front().map_or(false, Aktion::ist_schaltbefehl) {
                aktionen.pop_front();
                verdraengt += 1;
            }
            aktionen.push_front(aktion);
            if verdraengt == 0 {
                self.signal.add_permits(1);
            }
        } else {
            aktionen.push_back(aktion);
            self.signal.add_permits(1);
        }
    }

    /// Entnimmt die naechste Aktion; blockiert bis eine verfuegbar ist.
    ///
    /// `None` nach [`schliessen`](Self::schliessen).
    pub async fn entnehmen(&self) -> Option<Aktion> {
        match self.signal.acquire().await {
            Ok(erlaubnis) => {
                erlaubnis.forget();
                self.aktionen.lock().pop_front()
            }
            Err(_) => None,
        }
    }

    /// True wenn am Kopf eine Deaktivierung wartet (Abbruchpruefung der
    /// Neuverbindung)
    pub fn kopf_ist_deaktivieren(&self) -> bool {
        matches!(self.aktionen.lock().front(), Some(Aktion::Deaktivieren))
    }

    /// Anzahl wartender Aktionen
    pub fn laenge(&self) -> usize {
        self.aktionen.lock().len()
    }

    /// Beendet die Entnahme; weitere `entnehmen`-Aufrufe liefern `None`
    pub fn schliessen(&self) {
        self.signal.close();
    }
}

impl Default for AktionsWarteschlange {
    fn default() -> Self {
        Self::neu()
    }
}
