//! Neuverbindung nach Transportfehlern
//!
//! Begrenzte Versuche mit fester Wartezeit dazwischen (keine vor dem
//! ersten). Jeder Versuch schliesst die Verbindung vollstaendig und
//! spielt die komplette Aufbau-Sequenz neu ab. Wartet am Kopf der
//! Warteschlange eine Deaktivierung, wird sofort abgebrochen. Sind alle
//! Versuche erschoepft, bleibt der Dienst deaktiviert bis zu einer neuen
//! expliziten Aktivierung.
//!
//! Die Wartezeit schlaeft absichtlich den Verteiler-Task: solange die
//! Verbindung unten ist, darf kein Abgleich weiterlaufen.

use std::time::Duration;

use crate::engine::SyncEngine;
use crate::konfig::FehlerEinstellungen;

/// Fuehrt einen Neuverbindungs-Zyklus aus
#[derive(Debug)]
pub struct Wiederverbinder {
    versuche: u32,
    intervall: Duration,
}

impl Wiederverbinder {
    pub fn neu(konfig: &FehlerEinstellungen) -> Self {
        Self {
            versuche: konfig.versuche,
            intervall: Duration::from_millis(konfig.intervall_ms),
        }
    }

    /// Versucht die Verbindung neu aufzubauen. `true` bei Erfolg.
    pub async fn ausfuehren(&self, engine: &mut SyncEngine) -> bool {
        tracing::info!(
            versuche = self.versuche,
            "Neuverbindung zum Teamspeak-Server wird versucht"
        );
        engine.status().verbindet_neu_setzen(true);
        let mut erfolgreich = false;

        for versuch in 1..=self.versuche {
            if versuch != 1 {
                tokio::time::sleep(self.intervall).await;
            }
            if engine.warteschlange().kopf_ist_deaktivieren() {
                tracing::info!("Deaktivierung wartet, Neuverbindung abgebrochen");
                break;
            }

            engine.verbindung_trennen();
            match engine.hochfahren().await {
                Ok(()) => {
                    tracing::info!(versuch, "Neuverbindung erfolgreich");
                    erfolgreich = true;
                    break;
                }
                Err(fehler) => {
                    tracing::warn!(
                        versuch,
                        von = self.versuche,
                        fehler = %fehler,
                        "Neuverbindungs-Versuch fehlgeschlagen"
                    );
                }
            }
        }

        engine.status().verbindet_neu_setzen(false);
        erfolgreich
    }
}
