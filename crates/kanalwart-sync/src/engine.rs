//! Die Abgleichs-Engine
//!
//! Entscheidet pro Spieler in welchen Kanal er gehoert und fuehrt die
//! noetigen Verschiebungen aus. Zwischen zwei Takten ist die Engine
//! gedaechtnislos: das Verhalten ist eine reine Funktion aus aktuellem
//! Roster, Override-Flags und Konfiguration – einzige Ausnahmen sind der
//! Kanal-Cache und das Zwischenrunden-Flag.
//!
//! Fehlerpolitik (siehe auch `kanalwart_core::error`): unbedeutende
//! Server-Fehler brechen nur die laufende Operation ab, Transportfehler
//! stossen die Neuverbindung an, Bann-Codes deaktivieren den Dienst
//! sofort und ohne Neuverbindung.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use kanalwart_core::error::{
    ist_bann_code, FehlerSchwere, Result, SyncFehler, CODE_KANAL_UNGUELTIG,
    CODE_NICKNAME_VERGEBEN,
};
use kanalwart_core::types::{ClientId, KanalId};
use kanalwart_protocol::{TsAntwort, TsQuery};

use crate::aktionen::{Aktion, AktionsWarteschlange, RosterSchnappschuss, SchnappschussEintrag};
use crate::dienst::LaufStatus;
use crate::kanaele::{KanalVerzeichnis, TsKanal};
use crate::konfig::{SyncEinstellungen, SyncKonfig};
use crate::nachrichten::SpielNachrichter;
use crate::roster::{MasterClient, RosterBestand, VoiceClientRoh};
use crate::verbindung::{SendeDrossel, TsVerbindung, WireProtokollierer};
use crate::wiederverbindung::Wiederverbinder;

/// Wandelt eine Nicht-OK-Antwort in einen Server-Fehler um.
///
/// Eine Antwort ohne Statuszeile (Zeitbudget abgelaufen) bekommt die
/// synthetische ID -1.
pub(crate) fn server_fehler(antwort: &TsAntwort) -> SyncFehler {
    SyncFehler::Server {
        id: antwort.id().unwrap_or(-1),
        nachricht: antwort
            .nachricht()
            .unwrap_or("keine Statuszeile empfangen")
            .to_string(),
        zusatz: antwort.zusatz_nachricht().map(String::from),
    }
}

/// Bann-Codes sind an jeder Aufrufstelle fatal und werden darum vor jeder
/// kontextspezifischen Behandlung geprueft
pub(crate) fn bann_pruefen(antwort: &TsAntwort) -> Result<()> {
    match antwort.id() {
        Some(id) if ist_bann_code(id) => Err(server_fehler(antwort)),
        _ => Ok(()),
    }
}

/// Fatal-Variante: jede Nicht-OK-Antwort wird zum Fehler (Aufbau-Sequenz)
fn muss_ok(antwort: &TsAntwort, kontext: &str) -> Result<()> {
    bann_pruefen(antwort)?;
    if antwort.ist_ok() {
        Ok(())
    } else {
        tracing::error!(
            kontext,
            id = ?antwort.id(),
            nachricht = ?antwort.nachricht(),
            "Abfrage fehlgeschlagen"
        );
        Err(server_fehler(antwort))
    }
}

/// Ziel einer Swap-Pruefung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SwapZiel {
    Staging,
    Team,
    Squad,
}

/// Die Entscheidungstabelle des Abgleichs, als reine Funktion der Lage.
///
/// Staging hat Vorrang, dann Team, Squad ist der Rest.
pub(crate) fn swap_ziel(
    regeln: &SyncEinstellungen,
    beide: usize,
    team_beide: usize,
    squad_beide: usize,
    squad_id: i32,
    zwischen_runden: bool,
    sync_zu_team: bool,
) -> SwapZiel {
    if !regeln.team_swapping
        || beide < regeln.team_schwelle as usize
        || (regeln.zwischenrunden_swapping && zwischen_runden)
    {
        SwapZiel::Staging
    } else if !regeln.squad_swapping
        || team_beide < regeln.squad_schwelle as usize
        || squad_id == 0
        || squad_beide < regeln.squad_mindestgroesse as usize
        || sync_zu_team
    {
        SwapZiel::Team
    } else {
        SwapZiel::Squad
    }
}

/// True wenn ein Master-Eintrag von der Swap-Pruefung ausgenommen ist:
/// eine Seite fehlt, Team 0 (Zuschauer) oder selbstgewaehlter Ausschluss
pub(crate) fn swap_ausgenommen(master: &MasterClient) -> bool {
    master.spiel.is_none()
        || master.voice.is_none()
        || master.spiel.as_ref().map(|s| s.team_id) == Some(0)
        || master.kein_sync
}

/// Ausgang eines Verschiebe-Versuchs
enum MoveErgebnis {
    Verschoben,
    /// Wire-Code 768: der Zielkanal existiert nicht mehr
    KanalWeg,
    Abgebrochen,
}

/// Die Abgleichs-Engine; lebt exklusiv im Verteiler-Task
pub struct SyncEngine {
    konfig: SyncKonfig,
    verbindung: TsVerbindung,
    roster: RosterBestand,
    kanaele: KanalVerzeichnis,
    nachrichter: Arc<dyn SpielNachrichter>,
    status: Arc<LaufStatus>,
    warteschlange: Arc<AktionsWarteschlange>,
    zwischen_runden: bool,
}

impl SyncEngine {
    pub fn neu(
        konfig: SyncKonfig,
        nachrichter: Arc<dyn SpielNachrichter>,
        warteschlange: Arc<AktionsWarteschlange>,
        status: Arc<LaufStatus>,
    ) -> Self {
        let drossel = if konfig.synchronisierung.abfragen_drosseln {
            SendeDrossel::neu(Duration::from_millis(konfig.synchronisierung.drossel_abstand_ms))
        } else {
            SendeDrossel::aus()
        };
        let mut verbindung = TsVerbindung::neu(drossel);
        verbindung.beobachter_setzen(Arc::new(WireProtokollierer));
        Self {
            konfig,
            verbindung,
            roster: RosterBestand::neu(),
            kanaele: KanalVerzeichnis::neu(),
            nachrichter,
            status,
            warteschlange,
            zwischen_runden: false,
        }
    }

    pub(crate) fn status(&self) -> &Arc<LaufStatus> {
        &self.status
    }

    pub(crate) fn warteschlange(&self) -> &Arc<AktionsWarteschlange> {
        &self.warteschlange
    }

    pub(crate) fn verbindung_trennen(&mut self) {
        self.verbindung.schliessen();
    }

    /// Fuehrt eine Aktion aus. `Err` bedeutet immer fatal-Klasse; alle
    /// unbedeutenden Fehler sind an der Stelle ihres Auftretens behandelt.
    pub(crate) async fn ausfuehren(&mut self, aktion: Aktion) -> Result<()> {
        match aktion {
            Aktion::Aktivieren => {
                tracing::debug!("Aktivierung wird verarbeitet");
                self.hochfahren().await?;
            }
            Aktion::Deaktivieren => {
                tracing::debug!("Deaktivierung wird verarbeitet");
                self.abschalten();
            }
            Aktion::Beenden => {}

            Aktion::VoiceInfoAktualisieren => self.voice_info_aktualisieren().await?,
            Aktion::MasterAktualisieren => {
                self.roster
                    .master_neu_aufbauen(self.konfig.synchronisierung.matching_schwelle);
                tracing::debug!(
                    eintraege = self.roster.master_alle().len(),
                    beide = self.roster.anzahl_beide(),
                    "Master-Roster neu aufgebaut"
                );
            }
            Aktion::SpielInfoAktualisieren(spieler) => {
                tracing::debug!(anzahl = spieler.len(), "Spiel-Roster ersetzt");
                self.roster.spiel_roster_ersetzen(spieler);
            }
            Aktion::IpInfoAktualisieren { name, ip, land } => {
                self.roster.ip_info_aktualisieren(&name, &ip, &land);
            }

            Aktion::AlleSwapsPruefen => {
                let namen: Vec<String> = self
                    .roster
                    .beide()
                    .filter_map(|m| m.spiel.as_ref())
                    .map(|s| s.name.clone())
                    .collect();
                for name in namen {
                    self.warteschlange.einreihen(Aktion::SwapPruefen(name));
                }
            }
            Aktion::AlleEntfernungenPruefen => {
                let ids: Vec<ClientId> = self
                    .roster
                    .nur_voice()
                    .filter_map(|m| m.voice.as_ref())
                    .map(|v| v.id)
                    .collect();
                for id in ids {
                    self.warteschlange.einreihen(Aktion::EntfernungPruefen(id));
                }
            }
            Aktion::AlleNachrichtenPruefen => {
                let namen: Vec<String> = self
                    .roster
                    .nur_spiel()
                    .filter_map(|m| m.spiel.as_ref())
                    .map(|s| s.name.clone())
                    .collect();
                for name in namen {
                    self.warteschlange.einreihen(Aktion::NachrichtPruefen(name));
                }
            }

            Aktion::SwapPruefen(name) => self.swap_pruefen(&name).await?,
            Aktion::EntfernungPruefen(id) => self.entfernung_pruefen(id).await?,
            Aktion::NachrichtPruefen(name) | Aktion::NachrichtNachBeitritt(name) => {
                self.nachricht_pruefen(&name)
            }

            Aktion::SpielerBeigetreten(name) => self.beitritt_vormerken(&name),
            Aktion::SpielerVerlassen(name) => {
                if let Some(voice_id) = self.roster.spieler_verlassen(&name) {
                    self.warteschlange
                        .einreihen(Aktion::EntfernungPruefen(voice_id));
                }
            }
            Aktion::SpielerGespawnt(name) => self.swap_pruefen(&name).await?,
            Aktion::TeamGewechselt {
                name,
                team_id,
                squad_id,
            } => {
                self.roster.team_wechsel(&name, team_id, squad_id);
                self.swap_pruefen(&name).await?;
            }
            Aktion::RundeBeendet => {
                self.zwischen_runden = true;
                self.warteschlange.einreihen(Aktion::AlleSwapsPruefen);
            }
            Aktion::RundeGestartet => {
                self.zwischen_runden = false;
                self.roster.flags_alle_zuruecksetzen();
                self.warteschlange.einreihen(Aktion::AlleSwapsPruefen);
            }
            Aktion::ChatBefehl { sprecher, text } => self.chat_befehl(&sprecher, &text),

            Aktion::SchnappschussAnfordern(sender) => {
                let _ = sender.send(self.schnappschuss_bauen());
            }
        }
        Ok(())
    }

    /// Zentrale Fehlerbehandlung des Verteilers: nichts propagiert weiter,
    /// im Zweifel wird defensiv deaktiviert statt mit moeglicherweise
    /// korruptem Zustand weiterzulaufen.
    pub(crate) async fn fehler_behandeln(&mut self, fehler: SyncFehler) {
        match fehler.schwere() {
            FehlerSchwere::Unbedeutend => {
                tracing::warn!(fehler = %fehler, "Unbedeutender Fehler");
            }
            FehlerSchwere::OperationAbbrechen => {
                tracing::warn!(fehler = %fehler, "Operation abgebrochen");
            }
            FehlerSchwere::FloodBann => {
                tracing::error!(
                    fehler = %fehler,
                    "Temporaer vom Teamspeak-Server gebannt; Dienst wird deaktiviert, keine Neuverbindung"
                );
                self.abschalten();
            }
            FehlerSchwere::Fatal => {
                tracing::error!(fehler = %fehler, "Fataler Fehler");
                if fehler.ist_transport()
                    && self.konfig.fehlerbehandlung.neu_verbinden
                    && !self.status.verbindet_neu()
                {
                    let wiederverbinder = Wiederverbinder::neu(&self.konfig.fehlerbehandlung);
                    if wiederverbinder.ausfuehren(self).await {
                        return;
                    }
                }
                self.abschalten();
            }
        }
    }

    // -----------------------------------------------------------------
    // Aufbau und Abbau
    // -----------------------------------------------------------------

    /// Die vollstaendige Aufbau-Sequenz: Verbindung, Login, virtuellen
    /// Server waehlen, Staging- (und optional Dropoff-) Kanal aufloesen,
    /// Nickname setzen, bestehende Kanaele uebernehmen.
    pub(crate) async fn hochfahren(&mut self) -> Result<()> {
        let ts = self.konfig.teamspeak.clone();

        tracing::info!(host = %ts.host, port = ts.query_port, "Verbindung zum Teamspeak-Server wird aufgebaut");
        let antwort = self.verbindung.oeffnen(&ts.host, ts.query_port).await?;
        muss_ok(&antwort, "Verbindungsaufbau")?;

        tracing::info!(nutzer = %ts.query_nutzername, "Login als Server-Query-Client");
        let antwort = self
            .verbindung
            .senden(&TsQuery::login(&ts.query_nutzername, &ts.query_passwort))
            .await?;
        muss_ok(&antwort, "Login")?;

        let antwort = self
            .verbindung
            .senden(&TsQuery::use_port(ts.server_port))
            .await?;
        muss_ok(&antwort, "Auswahl des virtuellen Servers")?;

        let antwort = self
            .verbindung
            .senden(&TsQuery::kanal_suchen(&ts.staging_kanal))
            .await?;
        muss_ok(&antwort, "Suche des Staging-Kanals")?;
        let staging = antwort
            .erste_gruppe()
            .and_then(TsKanal::aus_gruppe)
            .ok_or_else(|| {
                SyncFehler::Konfiguration(format!(
                    "Staging-Kanal '{}' nicht gefunden",
                    ts.staging_kanal
                ))
            })?;
        tracing::info!(kanal = %staging.id, name = %staging.name, "Staging-Kanal gefunden");
        self.kanaele.staging_setzen(staging);

        if ts.dropoff_aktiviert {
            let antwort = self
                .verbindung
                .senden(&TsQuery::kanal_suchen(&ts.dropoff_kanal))
                .await?;
            muss_ok(&antwort, "Suche des Dropoff-Kanals")?;
            let dropoff = antwort
                .erste_gruppe()
                .and_then(TsKanal::aus_gruppe)
                .ok_or_else(|| {
                    SyncFehler::Konfiguration(format!(
                        "Dropoff-Kanal '{}' nicht gefunden",
                        ts.dropoff_kanal
                    ))
                })?;
            tracing::info!(kanal = %dropoff.id, name = %dropoff.name, "Dropoff-Kanal gefunden");
            self.kanaele.dropoff_setzen(dropoff);
        }

        // Nickname-Kollisionen sind unbedeutend
        let antwort = self
            .verbindung
            .senden(&TsQuery::nickname_aendern(&ts.query_nickname))
            .await?;
        bann_pruefen(&antwort)?;
        match antwort.id() {
            Some(0) => tracing::info!(nickname = %ts.query_nickname, "Nickname gesetzt"),
            Some(CODE_NICKNAME_VERGEBEN) => {
                tracing::warn!(nickname = %ts.query_nickname, "Nickname bereits vergeben")
            }
            anderes => tracing::warn!(id = ?anderes, "Nickname konnte nicht gesetzt werden"),
        }

        // Bereits existierende Pickup-, Team- und Squad-Kanaele uebernehmen
        let antwort = self.verbindung.senden(&TsQuery::kanal_liste()).await?;
        bann_pruefen(&antwort)?;
        if antwort.ist_ok() {
            let kanaele: Vec<TsKanal> = antwort
                .alle_gruppen()
                .filter_map(TsKanal::aus_gruppe)
                .collect();
            self.kanaele.bestehende_uebernehmen(&kanaele, &self.konfig);
        } else {
            tracing::warn!(id = ?antwort.id(), "Kanalliste beim Verbindungsaufbau fehlgeschlagen");
        }

        self.status.aktiv_setzen(true);
        tracing::info!("Teamspeak-Synchronisation gestartet");
        Ok(())
    }

    /// Schliesst die Verbindung und verwirft allen Zustand. Idempotent.
    pub(crate) fn abschalten(&mut self) {
        self.verbindung.schliessen();
        self.roster.leeren();
        self.kanaele.leeren();
        self.zwischen_runden = false;
        let war_aktiv = self.status.ist_aktiv();
        self.status.aktiv_setzen(false);
        if war_aktiv {
            tracing::info!("Teamspeak-Synchronisation beendet");
        }
    }

    // -----------------------------------------------------------------
    // Roster-Pflege
    // -----------------------------------------------------------------

    /// Holt die Client-Liste, verwirft Clients ausserhalb der verfolgten
    /// Kanaele, loest pro Client die IP ueber `clientinfo` auf und ersetzt
    /// den Voice-Roster wholesale.
    async fn voice_info_aktualisieren(&mut self) -> Result<()> {
        let antwort = self.verbindung.senden(&TsQuery::client_liste()).await?;
        bann_pruefen(&antwort)?;
        if !antwort.ist_ok() {
            tracing::warn!(id = ?antwort.id(), "Client-Liste fehlgeschlagen");
            return Ok(());
        }
        let mut rohe: Vec<VoiceClientRoh> = antwort
            .alle_gruppen()
            .filter_map(VoiceClientRoh::aus_gruppe)
            .collect();

        rohe.retain(|roh| self.kanaele.ist_bekannt(roh.kanal_id));

        for roh in &mut rohe {
            let antwort = self
                .verbindung
                .senden(&TsQuery::client_info(roh.id.0))
                .await?;
            bann_pruefen(&antwort)?;
            if !antwort.ist_ok() {
                // Client ist vermutlich zwischen den Abfragen gegangen
                continue;
            }
            let Some(gruppe) = antwort.erste_gruppe() else {
                continue;
            };
            if let Some(ip) = gruppe.wert("connection_client_ip") {
                roh.ip_setzen(ip);
            }
        }

        self.roster.voice_roster_ersetzen(rohe);
        tracing::debug!(
            anzahl = self.roster.master_alle().len(),
            "Voice-Roster aktualisiert"
        );
        Ok(())
    }

    // -----------------------------------------------------------------
    // Abgleich
    // -----------------------------------------------------------------

    /// Verschiebt einen Spieler in den Kanal in den er laut Lage gehoert
    async fn swap_pruefen(&mut self, name: &str) -> Result<()> {
        let lage = {
            let Some(master) = self.roster.master_mit_spielname(name) else {
                return Ok(());
            };
            if swap_ausgenommen(master) {
                tracing::trace!(name, "Swap-Pruefung uebersprungen");
                return Ok(());
            }
            let (Some(voice), Some(spiel)) = (&master.voice, &master.spiel) else {
                return Ok(());
            };
            (
                voice.id,
                voice.kanal_id,
                voice.name.clone(),
                spiel.team_id,
                spiel.squad_id,
                master.sync_zu_team,
            )
        };
        let (client_id, aktueller_kanal, voice_name, team_id, squad_id, sync_zu_team) = lage;

        let beide = self.roster.anzahl_beide();
        let team_beide = self.roster.anzahl_beide_im_team(team_id);
        let squad_beide = self.roster.anzahl_beide_im_squad(team_id, squad_id);
        let ziel = swap_ziel(
            &self.konfig.synchronisierung,
            beide,
            team_beide,
            squad_beide,
            squad_id,
            self.zwischen_runden,
            sync_zu_team,
        );

        match ziel {
            SwapZiel::Staging => {
                // Pickup-Kanaele sind Schutzzonen: von dort wird niemand
                // nach Staging geholt
                if self.kanaele.ist_pickup(aktueller_kanal) {
                    tracing::debug!(
                        name = %voice_name,
                        kanal = %aktueller_kanal,
                        "Pickup-Kanal, keine Verschiebung nach Staging"
                    );
                    return Ok(());
                }
                let Some(ziel_id) = self.kanaele.staging().map(|k| k.id) else {
                    return Ok(());
                };
                if aktueller_kanal != ziel_id {
                    if let MoveErgebnis::Verschoben =
                        self.verschieben(client_id, ziel_id).await?
                    {
                        tracing::debug!(
                            name = %voice_name,
                            von = %aktueller_kanal,
                            nach = %ziel_id,
                            "In den Staging-Kanal verschoben"
                        );
                    }
                }
            }
            SwapZiel::Team => {
                if self.kanaele.team(team_id).is_none() {
                    self.kanaele
                        .team_finden_oder_erstellen(&mut self.verbindung, &self.konfig, team_id)
                        .await?;
                }
                let Some(ziel_id) = self.kanaele.team(team_id).map(|k| k.id) else {
                    return Ok(());
                };
                if aktueller_kanal != ziel_id {
                    match self.verschieben(client_id, ziel_id).await? {
                        MoveErgebnis::Verschoben => tracing::debug!(
                            name = %voice_name,
                            von = %aktueller_kanal,
                            nach = %ziel_id,
                            "In den Team-Kanal verschoben"
                        ),
                        MoveErgebnis::KanalWeg => {
                            // Veraltete Registrierung verwerfen; der
                            // naechste Takt loest neu auf oder erstellt neu
                            self.kanaele.team_vergessen(team_id);
                        }
                        MoveErgebnis::Abgebrochen => {}
                    }
                }
            }
            SwapZiel::Squad => {
                if self.kanaele.team(team_id).is_none() {
                    self.kanaele
                        .team_finden_oder_erstellen(&mut self.verbindung, &self.konfig, team_id)
                        .await?;
                }
                if self.kanaele.team(team_id).is_none() {
                    return Ok(());
                }
                if self.kanaele.squad(team_id, squad_id).is_none() {
                    self.kanaele
                        .squad_finden_oder_erstellen(
                            &mut self.verbindung,
                            &self.konfig,
                            team_id,
                            squad_id,
                        )
                        .await?;
                }
                let Some(ziel_id) = self.kanaele.squad(team_id, squad_id).map(|k| k.id) else {
                    return Ok(());
                };
                if aktueller_kanal != ziel_id {
                    match self.verschieben(client_id, ziel_id).await? {
                        MoveErgebnis::Verschoben => tracing::debug!(
                            name = %voice_name,
                            von = %aktueller_kanal,
                            nach = %ziel_id,
                            "In den Squad-Kanal verschoben"
                        ),
                        MoveErgebnis::KanalWeg => {
                            self.kanaele.squad_vergessen(team_id, squad_id);
                        }
                        MoveErgebnis::Abgebrochen => {}
                    }
                }
            }
        }
        Ok(())
    }

    /// Verschiebt Voice-Clients ohne Spiel-Gegenstueck in den Dropoff-
    /// beziehungsweise Staging-Kanal
    async fn entfernung_pruefen(&mut self, voice_id: ClientId) -> Result<()> {
        let lage = {
            let Some(master) = self.roster.master_mit_voice_id(voice_id) else {
                return Ok(());
            };
            if master.spiel.is_some() {
                return Ok(());
            }
            let Some(voice) = &master.voice else {
                return Ok(());
            };
            (voice.kanal_id, voice.datenbank_id, voice.name.clone())
        };
        let (aktueller_kanal, datenbank_id, voice_name) = lage;

        if self
            .konfig
            .synchronisierung
            .entfernen_whitelist
            .contains(&datenbank_id.0)
        {
            tracing::trace!(name = %voice_name, "Whitelist, keine Entfernung");
            return Ok(());
        }
        if self.kanaele.ist_pickup(aktueller_kanal) {
            return Ok(());
        }

        let ziel = if self.konfig.teamspeak.dropoff_aktiviert {
            self.kanaele.dropoff()
        } else {
            self.kanaele.staging()
        };
        let Some(ziel_id) = ziel.map(|k| k.id) else {
            return Ok(());
        };
        if aktueller_kanal != ziel_id {
            if let MoveErgebnis::Verschoben = self.verschieben(voice_id, ziel_id).await? {
                tracing::debug!(
                    name = %voice_name,
                    nach = %ziel_id,
                    "Voice-Client ohne Spiel-Gegenstueck verschoben"
                );
            }
        }
        Ok(())
    }

    /// Benachrichtigt einen Spieler der im Spiel, aber nicht im Teamspeak
    /// ist. Die Raten-Begrenzung liegt beim Nachrichter.
    fn nachricht_pruefen(&self, name: &str) {
        let Some(master) = self.roster.master_mit_spielname(name) else {
            return;
        };
        if master.voice.is_some() {
            return;
        }
        let nachrichten = &self.konfig.nachrichten;
        self.nachrichter
            .senden(&nachrichten.text, nachrichten.dauer_s, Some(name));
    }

    /// Merkt einen Beitritt fuer die verzoegerte Beitritts-Nachricht vor
    fn beitritt_vormerken(&self, name: &str) {
        let nachrichten = &self.konfig.nachrichten;
        if !(nachrichten.aktiviert && nachrichten.bei_beitritt) {
            return;
        }
        let warteschlange = self.warteschlange.clone();
        let verzoegerung = Duration::from_millis(nachrichten.beitritt_verzoegerung_ms);
        let name = name.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(verzoegerung).await;
            warteschlange.einreihen(Aktion::NachrichtNachBeitritt(name));
        });
    }

    /// Fuehrt das Verschieben aus und aktualisiert bei Erfolg den Kanal
    /// optimistisch; danach optional das Aufraeumen leerer Kanaele
    async fn verschieben(&mut self, client_id: ClientId, ziel: KanalId) -> Result<MoveErgebnis> {
        let antwort = self
            .verbindung
            .senden(&TsQuery::client_verschieben(client_id.0, ziel.0))
            .await?;
        bann_pruefen(&antwort)?;
        match antwort.id() {
            Some(0) => {
                self.roster.voice_kanal_setzen(client_id, ziel);
                if self.konfig.kanaele.leere_entfernen {
                    self.kanaele.leere_entfernen(&mut self.verbindung).await?;
                }
                Ok(MoveErgebnis::Verschoben)
            }
            Some(CODE_KANAL_UNGUELTIG) => Ok(MoveErgebnis::KanalWeg),
            anderes => {
                tracing::warn!(
                    client = %client_id,
                    ziel = %ziel,
                    id = ?anderes,
                    "Verschieben fehlgeschlagen"
                );
                Ok(MoveErgebnis::Abgebrochen)
            }
        }
    }

    // -----------------------------------------------------------------
    // Chat-Befehle und Override-Flags
    // -----------------------------------------------------------------

    fn chat_befehl(&mut self, sprecher: &str, text: &str) {
        let befehle = self.konfig.befehle.clone();
        match text.trim() {
            "!tssquads" if befehle.squad_liste => self.squad_liste_anzeigen(sprecher),
            "!tslobby" if befehle.sync_staging => self.sync_zu_staging_setzen(sprecher),
            "!tsteam" if befehle.sync_team => self.sync_zu_team_setzen(sprecher),
            "!tsnosync" if befehle.kein_sync => self.kein_sync_setzen(sprecher),
            "!tssync" => self.flags_zuruecksetzen(sprecher),
            _ => {}
        }
    }

    fn kein_sync_setzen(&mut self, name: &str) {
        if let Some(master) = self.roster.master_mit_spielname_mut(name) {
            master.kein_sync = true;
            master.sync_zu_staging = false;
            master.sync_zu_team = false;
            self.sagen("Squad sync disabled for you.", name);
            self.sagen("Type !tssync to re-enable squad sync.", name);
            self.sagen("Squad sync will automatically re-enable at round end.", name);
        }
    }

    fn sync_zu_team_setzen(&mut self, name: &str) {
        if let Some(master) = self.roster.master_mit_spielname_mut(name) {
            master.kein_sync = false;
            master.sync_zu_team = true;
            master.sync_zu_staging = false;
            self.sagen("Moving you to your team channel.", name);
            self.sagen("Type !tssync to re-enable squad sync.", name);
            self.warteschlange
                .einreihen(Aktion::SwapPruefen(name.to_string()));
        }
    }

    fn sync_zu_staging_setzen(&mut self, name: &str) {
        if let Some(master) = self.roster.master_mit_spielname_mut(name) {
            master.kein_sync = false;
            master.sync_zu_team = false;
            master.sync_zu_staging = true;
            self.sagen("Moving you to the lobby channel.", name);
            self.sagen("Type !tssync to re-enable squad sync.", name);
            self.warteschlange
                .einreihen(Aktion::SwapPruefen(name.to_string()));
        }
    }

    fn flags_zuruecksetzen(&mut self, name: &str) {
        if let Some(master) = self.roster.master_mit_spielname_mut(name) {
            master.kein_sync = false;
            master.sync_zu_team = false;
            master.sync_zu_staging = false;
            self.sagen("Squad sync re-enabled.", name);
            self.warteschlange
                .einreihen(Aktion::SwapPruefen(name.to_string()));
        }
    }

    /// Meldet einem Spieler die Squads seines Teams die Teamspeak-Spieler
    /// haben und noch Platz bieten
    fn squad_liste_anzeigen(&self, name: &str) {
        let mut spieler_team: Option<i32> = None;
        // (team, squad) -> (im Spiel, davon im Teamspeak)
        let mut squads: HashMap<(i32, i32), (u32, u32)> = HashMap::new();
        for master in self.roster.master_alle() {
            let Some(spiel) = &master.spiel else {
                continue;
            };
            if spiel.name == name {
                spieler_team = Some(spiel.team_id);
            }
            let eintrag = squads.entry((spiel.team_id, spiel.squad_id)).or_insert((0, 0));
            eintrag.0 += 1;
            if master.voice.is_some() {
                eintrag.1 += 1;
            }
        }
        let Some(team_id) = spieler_team else {
            return;
        };

        let mut squad_ids: Vec<i32> = squads
            .keys()
            .filter(|(team, _)| *team == team_id)
            .map(|(_, squad)| *squad)
            .collect();
        squad_ids.sort_unstable();

        let mut zeilen: Vec<String> = Vec::new();
        for squad_id in squad_ids {
            let (im_spiel, im_ts) = squads[&(team_id, squad_id)];
            // Interessant sind Squads mit 1-3 Teamspeak-Spielern: dort ist
            // jemand zum Reden UND noch ein Platz frei
            if im_ts > 0 && im_ts < 4 {
                let squad_name = if squad_id == 0 {
                    "No Squad".to_string()
                } else {
                    self.konfig.kanaele.squad_name(squad_id)
                };
                zeilen.push(format!("{squad_name}: ({im_ts}/{im_spiel})"));
            }
        }

        if zeilen.is_empty() {
            self.sagen(
                "No free squads found. Start one yourself and encourage people to join!",
                name,
            );
        } else {
            self.sagen("Squads with 1-3 Teamspeak players:", name);
            self.sagen("Key: Name (# TS players/# squad members)", name);
            self.sagen(&zeilen.join(", "), name);
        }
    }

    fn sagen(&self, text: &str, ziel: &str) {
        self.nachrichter
            .senden(text, self.konfig.nachrichten.dauer_s, Some(ziel));
    }

    fn schnappschuss_bauen(&self) -> RosterSchnappschuss {
        RosterSchnappschuss {
            eintraege: self
                .roster
                .master_alle()
                .iter()
                .map(|master| SchnappschussEintrag {
                    voice_name: master.voice.as_ref().map(|v| v.name.clone()),
                    spiel_name: master.spiel.as_ref().map(|s| s.name.clone()),
                    team_id: master.spiel.as_ref().map(|s| s.team_id),
                    squad_id: master.spiel.as_ref().map(|s| s.squad_id),
                    kanal_id: master.voice.as_ref().map(|v| v.kanal_id),
                    kein_sync: master.kein_sync,
                    sync_zu_staging: master.sync_zu_staging,
                    sync_zu_team: master.sync_zu_team,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::konfig::SyncEinstellungen;

    fn regeln() -> SyncEinstellungen {
        SyncEinstellungen {
            team_swapping: true,
            team_schwelle: 1,
            zwischenrunden_swapping: true,
            squad_swapping: true,
            squad_schwelle: 4,
            squad_mindestgroesse: 2,
            ..SyncEinstellungen::default()
        }
    }

    #[test]
    fn team_swapping_aus_heisst_staging() {
        let mut regeln = regeln();
        regeln.team_swapping = false;
        // Unabhaengig von Squad-Lage geht es in den Staging-Kanal
        assert_eq!(
            swap_ziel(&regeln, 10, 5, 3, 2, false, false),
            SwapZiel::Staging
        );
    }

    #[test]
    fn unter_team_schwelle_heisst_staging() {
        let mut regeln = regeln();
        regeln.team_schwelle = 4;
        assert_eq!(
            swap_ziel(&regeln, 3, 3, 3, 1, false, false),
            SwapZiel::Staging
        );
    }

    #[test]
    fn zwischenrunde_heisst_staging() {
        let regeln = regeln();
        assert_eq!(
            swap_ziel(&regeln, 10, 5, 3, 2, true, false),
            SwapZiel::Staging
        );

        // Mit deaktiviertem Zwischenrunden-Swapping zaehlt die Runde nicht
        let mut ohne = regeln.clone();
        ohne.zwischenrunden_swapping = false;
        assert_ne!(swap_ziel(&ohne, 10, 5, 3, 2, true, false), SwapZiel::Staging);
    }

    #[test]
    fn squad_swapping_aus_heisst_team() {
        let mut regeln = regeln();
        regeln.squad_swapping = false;
        assert_eq!(swap_ziel(&regeln, 10, 5, 3, 2, false, false), SwapZiel::Team);
    }

    #[test]
    fn ohne_squad_heisst_team() {
        let regeln = regeln();
        assert_eq!(swap_ziel(&regeln, 10, 5, 0, 0, false, false), SwapZiel::Team);
    }

    #[test]
    fn sync_zu_team_schlaegt_squad_regel() {
        let regeln = regeln();
        // Alle Squad-Schwellen erfuellt, aber der Spieler will ins Team
        assert_eq!(swap_ziel(&regeln, 10, 5, 3, 2, false, true), SwapZiel::Team);
        assert_eq!(swap_ziel(&regeln, 10, 5, 3, 2, false, false), SwapZiel::Squad);
    }

    #[test]
    fn squad_unter_mindestgroesse_heisst_team() {
        let regeln = regeln();
        assert_eq!(swap_ziel(&regeln, 10, 5, 1, 2, false, false), SwapZiel::Team);
    }

    #[test]
    fn ausnahmen_der_swap_pruefung() {
        use crate::roster::{MasterClient, SpielClient};

        let mut master = MasterClient::default();
        // Beide Seiten fehlen
        assert!(swap_ausgenommen(&master));

        master.spiel = Some(SpielClient {
            name: "Hans".into(),
            team_id: 0,
            squad_id: 0,
            ip: None,
            land: None,
        });
        // Voice fehlt, Team 0
        assert!(swap_ausgenommen(&master));
    }

    #[test]
    fn zuschauer_und_kein_sync_sind_ausgenommen() {
        use crate::roster::{MasterClient, SpielClient, VoiceClient};
        use kanalwart_core::types::{ClientId, DatenbankId, KanalId};

        let voll = |team_id: i32, kein_sync: bool| MasterClient {
            voice: Some(VoiceClient {
                id: ClientId(1),
                kanal_id: KanalId(5),
                name: "Hans".into(),
                ip: "10.0.0.1".into(),
                datenbank_id: DatenbankId(100),
            }),
            spiel: Some(SpielClient {
                name: "Hans".into(),
                team_id,
                squad_id: 1,
                ip: None,
                land: None,
            }),
            kein_sync,
            sync_zu_staging: false,
            sync_zu_team: false,
        };

        assert!(swap_ausgenommen(&voll(0, false)), "Team 0 nie verschieben");
        assert!(swap_ausgenommen(&voll(1, true)), "kein_sync gilt");
        assert!(!swap_ausgenommen(&voll(1, false)));
    }

    fn engine_mit(konfig: SyncKonfig) -> SyncEngine {
        use crate::nachrichten::ProtokollNachrichter;
        SyncEngine::neu(
            konfig,
            Arc::new(ProtokollNachrichter),
            Arc::new(AktionsWarteschlange::neu()),
            Arc::new(LaufStatus::neu()),
        )
    }

    /// Baut einen Engine-Zustand mit Hans auf beiden Servern, sitzend im
    /// angegebenen Kanal
    fn engine_mit_hans(kanal_id: i32) -> SyncEngine {
        use crate::kanaele::TsKanal;
        use crate::roster::VoiceClientRoh;
        use kanalwart_core::event::SpielerInfo;
        use kanalwart_core::types::{ClientId, DatenbankId, KanalId};

        let mut konfig = SyncKonfig::default();
        konfig.teamspeak.pickup_kanaele = vec!["Stammtisch".into()];
        // Team-Swapping aus: die Staging-Regel greift immer
        konfig.synchronisierung.team_swapping = false;

        let mut engine = engine_mit(konfig.clone());
        engine.kanaele.staging_setzen(TsKanal {
            id: KanalId(10),
            name: "Lobby".into(),
            eltern_id: Some(KanalId(0)),
        });
        engine.kanaele.bestehende_uebernehmen(
            &[TsKanal {
                id: KanalId(33),
                name: "Stammtisch".into(),
                eltern_id: Some(KanalId(0)),
            }],
            &konfig,
        );

        engine.roster.voice_roster_ersetzen(vec![VoiceClientRoh {
            id: ClientId(1),
            kanal_id: KanalId(kanal_id),
            name: "Hans".into(),
            datenbank_id: DatenbankId(7),
            ip: Some("10.0.0.1".into()),
        }]);
        engine.roster.ip_info_aktualisieren("Hans", "10.0.0.1", "DE");
        engine.roster.spiel_roster_ersetzen(vec![SpielerInfo {
            name: "Hans".into(),
            team_id: 1,
            squad_id: 0,
        }]);
        engine.roster.master_neu_aufbauen(100.0);
        engine
    }

    #[tokio::test]
    async fn pickup_kanal_ist_schutzzone() {
        // Hans sitzt im Pickup-Kanal: die Staging-Regel greift, aber es
        // darf kein Verschiebeversuch stattfinden
        let mut engine = engine_mit_hans(33);
        assert!(engine.swap_pruefen("Hans").await.is_ok());
    }

    #[tokio::test]
    async fn ausserhalb_der_schutzzone_wird_verschoben() {
        // Gegenprobe: ausserhalb des Pickup-Kanals versucht die Engine die
        // Verschiebung – ohne Verbindung schlaegt genau dieser Versuch fehl
        let mut engine = engine_mit_hans(99);
        let fehler = engine.swap_pruefen("Hans").await.unwrap_err();
        assert!(matches!(fehler, SyncFehler::NichtVerbunden));
    }

    #[tokio::test]
    async fn wer_schon_im_staging_sitzt_bleibt_unberuehrt() {
        let mut engine = engine_mit_hans(10);
        assert!(engine.swap_pruefen("Hans").await.is_ok());
    }

    #[test]
    fn server_fehler_ohne_statuszeile() {
        let antwort = TsAntwort::parsen("clid=1 cid=2\n\r");
        let fehler = server_fehler(&antwort);
        match fehler {
            SyncFehler::Server { id, .. } => assert_eq!(id, -1),
            anderes => panic!("unerwarteter Fehler: {anderes:?}"),
        }
    }

    #[test]
    fn bann_pruefung_schlaegt_an() {
        let antwort = TsAntwort::parsen("error id=3329 msg=flooding\n\r");
        assert!(bann_pruefen(&antwort).is_err());

        let antwort = TsAntwort::parsen("error id=512 msg=invalid\n\r");
        assert!(bann_pruefen(&antwort).is_ok());
    }
}
