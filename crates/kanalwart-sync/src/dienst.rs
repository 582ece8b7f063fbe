//! Der Sync-Dienst: Verteiler-Task, Takt-Geber und Produzenten-Handle
//!
//! [`SyncDienst::starten`] erzeugt den einzigen Verteiler-Task (der die
//! Engine exklusiv besitzt) und die beiden Takt-Geber. Produzenten
//! sprechen ausschliesslich ueber das [`SyncHandle`]: Spielserver-
//! Ereignisse, Aktivieren/Deaktivieren und Schnappschuss-Anfragen werden
//! als Aktionen eingereiht, nie direkt am Zustand ausgefuehrt.
//!
//! Waehrend der Dienst deaktiviert ist, verwirft der Verteiler alle
//! Aktionen ausser den Schaltbefehlen selbst (kein Aufstauen).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use kanalwart_core::event::SpielEreignis;

use crate::aktionen::{Aktion, AktionsWarteschlange, RosterSchnappschuss};
use crate::engine::SyncEngine;
use crate::konfig::SyncKonfig;
use crate::nachrichten::SpielNachrichter;

/// Von mehreren Tasks lesbare Zustands-Flags des Dienstes.
///
/// Die Takt-Geber pruefen sie, bevor sie Arbeit einreihen; geschrieben
/// werden sie nur vom Verteiler-Task.
#[derive(Debug, Default)]
pub struct LaufStatus {
    aktiv: AtomicBool,
    verbindet_neu: AtomicBool,
}

impl LaufStatus {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn ist_aktiv(&self) -> bool {
        self.aktiv.load(Ordering::SeqCst)
    }

    pub fn aktiv_setzen(&self, wert: bool) {
        self.aktiv.store(wert, Ordering::SeqCst);
    }

    pub fn verbindet_neu(&self) -> bool {
        self.verbindet_neu.load(Ordering::SeqCst)
    }

    pub fn verbindet_neu_setzen(&self, wert: bool) {
        self.verbindet_neu.store(wert, Ordering::SeqCst);
    }
}

/// Produzenten-Seite des Dienstes; beliebig klonbar
#[derive(Clone)]
pub struct SyncHandle {
    warteschlange: Arc<AktionsWarteschlange>,
    status: Arc<LaufStatus>,
}

impl SyncHandle {
    /// Startet die Synchronisation (Verbindungsaufbau im Verteiler-Task)
    pub fn aktivieren(&self) {
        self.warteschlange.einreihen(Aktion::Aktivieren);
    }

    /// Beendet die Synchronisation beim naechsten Aktionswechsel
    pub fn deaktivieren(&self) {
        self.warteschlange.einreihen(Aktion::Deaktivieren);
    }

    /// True solange die Engine aktiv ist
    pub fn ist_aktiv(&self) -> bool {
        self.status.ist_aktiv()
    }

    /// Nimmt ein Spielserver-Ereignis entgegen und reiht die passende
    /// Aktion ein
    pub fn ereignis(&self, ereignis: SpielEreignis) {
        let aktion = match ereignis {
            SpielEreignis::Beigetreten { name } => Aktion::SpielerBeigetreten(name),
            SpielEreignis::Verlassen { name } => Aktion::SpielerVerlassen(name),
            SpielEreignis::Gespawnt { name } => Aktion::SpielerGespawnt(name),
            SpielEreignis::TeamGewechselt {
                name,
                team_id,
                squad_id,
            } => Aktion::TeamGewechselt {
                name,
                team_id,
                squad_id,
            },
            SpielEreignis::RosterSchnappschuss { spieler } => {
                Aktion::SpielInfoAktualisieren(spieler)
            }
            SpielEreignis::RundeBeendet => Aktion::RundeBeendet,
            SpielEreignis::RundeGestartet => Aktion::RundeGestartet,
            SpielEreignis::ChatBefehl { sprecher, text } => {
                Aktion::ChatBefehl { sprecher, text }
            }
            SpielEreignis::IpInfo { name, ip, land } => {
                Aktion::IpInfoAktualisieren { name, ip, land }
            }
        };
        self.warteschlange.einreihen(aktion);
    }

    /// Fordert einen Lese-Schnappschuss der Master-Liste an.
    ///
    /// Die Anfrage laeuft als Aktion durch die Warteschlange (kein
    /// geteilter Speicherzugriff); `None` wenn der Dienst beendet wurde
    /// bevor die Anfrage an der Reihe war.
    pub async fn schnappschuss(&self) -> Option<RosterSchnappschuss> {
        let (sender, empfaenger) = oneshot::channel();
        self.warteschlange
            .einreihen(Aktion::SchnappschussAnfordern(sender));
        empfaenger.await.ok()
    }
}

/// Der laufende Dienst; besitzt Verteiler- und Takt-Tasks
pub struct SyncDienst {
    handle: SyncHandle,
    warteschlange: Arc<AktionsWarteschlange>,
    verteiler: JoinHandle<()>,
    takt_geber: Vec<JoinHandle<()>>,
}

impl SyncDienst {
    /// Startet Verteiler und Takt-Geber. Die Engine bleibt deaktiviert
    /// bis [`SyncHandle::aktivieren`] aufgerufen wird.
    pub fn starten(konfig: SyncKonfig, nachrichter: Arc<dyn SpielNachrichter>) -> Self {
        let warteschlange = Arc::new(AktionsWarteschlange::neu());
        let status = Arc::new(LaufStatus::neu());

        let engine = SyncEngine::neu(
            konfig.clone(),
            nachrichter,
            warteschlange.clone(),
            status.clone(),
        );
        let verteiler = tokio::spawn(verteiler_schleife(
            engine,
            warteschlange.clone(),
            status.clone(),
        ));

        let takt_geber = vec![
            tokio::spawn(sync_takt(
                warteschlange.clone(),
                status.clone(),
                konfig.clone(),
            )),
            tokio::spawn(nachrichten_takt(
                warteschlange.clone(),
                status.clone(),
                konfig,
            )),
        ];

        let handle = SyncHandle {
            warteschlange: warteschlange.clone(),
            status,
        };
        Self {
            handle,
            warteschlange,
            verteiler,
            takt_geber,
        }
    }

    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }

    /// Faehrt den Dienst geordnet herunter: erst deaktivieren (Verbindung
    /// schliessen), dann den Verteiler beenden
    pub async fn stoppen(self) {
        self.handle.deaktivieren();
        self.warteschlange.einreihen(Aktion::Beenden);
        let _ = self.verteiler.await;
        for takt in self.takt_geber {
            takt.abort();
        }
        tracing::info!("Sync-Dienst gestoppt");
    }
}

/// Der einzige Konsument: entnimmt eine Aktion nach der anderen.
///
/// Waehrend der Dienst deaktiviert ist, werden alle Aktionen ausser den
/// Schaltbefehlen verworfen. Jeder aus einer Aktion herausgereichte
/// Fehler wird hier behandelt; nichts propagiert ueber diese Schleife
/// hinaus.
async fn verteiler_schleife(
    mut engine: SyncEngine,
    warteschlange: Arc<AktionsWarteschlange>,
    status: Arc<LaufStatus>,
) {
    while let Some(aktion) = warteschlange.entnehmen().await {
        if matches!(aktion, Aktion::Beenden) {
            engine.abschalten();
            break;
        }
        if !status.ist_aktiv() && !aktion.ist_schaltbefehl() {
            tracing::trace!("Aktion verworfen, Dienst ist deaktiviert");
            continue;
        }
        if let Err(fehler) = engine.ausfuehren(aktion).await {
            engine.fehler_behandeln(fehler).await;
        }
    }
    tracing::debug!("Verteiler-Schleife beendet");
}

/// Takt-Geber des Roster-Abgleichs: Voice-Roster holen, Master-Liste neu
/// aufbauen, alle Swaps pruefen, optional alle Entfernungen
async fn sync_takt(
    warteschlange: Arc<AktionsWarteschlange>,
    status: Arc<LaufStatus>,
    konfig: SyncKonfig,
) {
    let mut takt = tokio::time::interval(Duration::from_millis(
        konfig.synchronisierung.update_intervall_ms,
    ));
    takt.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        takt.tick().await;
        if !status.ist_aktiv() || status.verbindet_neu() {
            continue;
        }
        warteschlange.einreihen(Aktion::VoiceInfoAktualisieren);
        warteschlange.einreihen(Aktion::MasterAktualisieren);
        warteschlange.einreihen(Aktion::AlleSwapsPruefen);
        if konfig.synchronisierung.clients_entfernen {
            warteschlange.einreihen(Aktion::AlleEntfernungenPruefen);
        }
    }
}

/// Takt-Geber der Spieler-Benachrichtigungen
async fn nachrichten_takt(
    warteschlange: Arc<AktionsWarteschlange>,
    status: Arc<LaufStatus>,
    konfig: SyncKonfig,
) {
    let mut takt =
        tokio::time::interval(Duration::from_millis(konfig.nachrichten.intervall_ms));
    takt.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        takt.tick().await;
        if !status.ist_aktiv() || status.verbindet_neu() || !konfig.nachrichten.aktiviert {
            continue;
        }
        warteschlange.einreihen(Aktion::AlleNachrichtenPruefen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nachrichten::ProtokollNachrichter;

    #[test]
    fn laufstatus_flags() {
        let status = LaufStatus::neu();
        assert!(!status.ist_aktiv());
        status.aktiv_setzen(true);
        assert!(status.ist_aktiv());
        status.verbindet_neu_setzen(true);
        assert!(status.verbindet_neu());
    }

    #[tokio::test]
    async fn dienst_startet_deaktiviert_und_stoppt_sauber() {
        let dienst = SyncDienst::starten(SyncKonfig::default(), Arc::new(ProtokollNachrichter));
        let handle = dienst.handle();
        assert!(!handle.ist_aktiv());
        dienst.stoppen().await;
    }

    #[tokio::test]
    async fn schnappschuss_ueber_die_warteschlange() {
        let dienst = SyncDienst::starten(SyncKonfig::default(), Arc::new(ProtokollNachrichter));
        let handle = dienst.handle();

        // Deaktivierter Dienst: die Aktion wird verworfen, der Sender
        // fallengelassen, der Empfaenger bekommt None
        assert!(handle.schnappschuss().await.is_none());
        dienst.stoppen().await;
    }

    #[tokio::test]
    async fn ereignisse_werden_eingereiht() {
        let warteschlange = Arc::new(AktionsWarteschlange::neu());
        let handle = SyncHandle {
            warteschlange: warteschlange.clone(),
            status: Arc::new(LaufStatus::neu()),
        };

        handle.ereignis(SpielEreignis::Beigetreten {
            name: "Hans".into(),
        });
        handle.ereignis(SpielEreignis::RundeBeendet);
        assert_eq!(warteschlange.laenge(), 2);
    }
}
