//! Kanal-Verzeichnis: Staging, Dropoff, Pickup, Team- und Squad-Kanaele
//!
//! Team-Kanaele haengen unter dem Staging-Kanal (oder der Wurzel), Squad-
//! Kanaele unter ihrem Team-Kanal. Ein Squad-Eintrag existiert nur solange
//! sein Team-Eintrag existiert; das Vergessen eines Teams raeumt seine
//! Squads mit ab.
//!
//! Finden-oder-Erstellen laeuft immer in dieser Reihenfolge: erst die
//! Kanalliste nach dem konfigurierten Namen absuchen, erst dann einen
//! neuen Kanal anlegen. Fehlgeschlagene Einzeloperationen brechen nur die
//! laufende Operation ab; der naechste Abgleichstakt versucht es erneut.

use std::collections::{HashMap, HashSet};

use kanalwart_core::error::Result;
use kanalwart_core::types::KanalId;
use kanalwart_protocol::{AntwortGruppe, TsQuery};

use crate::engine::bann_pruefen;
use crate::konfig::SyncKonfig;
use crate::verbindung::TsVerbindung;

/// Ein Kanal auf dem Teamspeak-Server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsKanal {
    pub id: KanalId,
    pub name: String,
    /// Eltern-Kanal; `KanalId(0)` bedeutet Wurzel
    pub eltern_id: Option<KanalId>,
}

impl TsKanal {
    /// Baut einen Kanal aus einer `channellist`- oder `channelfind`-Gruppe
    pub fn aus_gruppe(gruppe: &AntwortGruppe) -> Option<Self> {
        Some(Self {
            id: KanalId(gruppe.ganzzahl("cid")?),
            name: gruppe.wert("channel_name")?.to_string(),
            eltern_id: gruppe.ganzzahl("pid").map(KanalId),
        })
    }

    /// Baut einen Kanal aus einer `channelinfo`-Gruppe.
    ///
    /// `channelinfo` liefert die eigene ID nicht zurueck, sie kommt vom
    /// vorangegangenen `channelcreate`.
    fn aus_info_gruppe(id: KanalId, gruppe: &AntwortGruppe, rueckfall_name: &str) -> Self {
        Self {
            id,
            name: gruppe
                .wert("channel_name")
                .unwrap_or(rueckfall_name)
                .to_string(),
            eltern_id: gruppe.ganzzahl("pid").map(KanalId),
        }
    }
}

/// Verzeichnis aller verfolgten Kanaele
#[derive(Debug, Default)]
pub struct KanalVerzeichnis {
    staging: Option<TsKanal>,
    dropoff: Option<TsKanal>,
    pickup: Vec<TsKanal>,
    teams: HashMap<i32, TsKanal>,
    squads: HashMap<i32, HashMap<i32, TsKanal>>,
}

impl KanalVerzeichnis {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Verwirft alle Registrierungen (beim Herunterfahren)
    pub fn leeren(&mut self) {
        self.staging = None;
        self.dropoff = None;
        self.pickup.clear();
        self.teams.clear();
        self.squads.clear();
    }

    pub fn staging_setzen(&mut self, kanal: TsKanal) {
        self.staging = Some(kanal);
    }

    pub fn staging(&self) -> Option<&TsKanal> {
        self.staging.as_ref()
    }

    pub fn dropoff_setzen(&mut self, kanal: TsKanal) {
        self.dropoff = Some(kanal);
    }

    pub fn dropoff(&self) -> Option<&TsKanal> {
        self.dropoff.as_ref()
    }

    /// True wenn der Kanal ein Pickup-Kanal (Schutzzone) ist
    pub fn ist_pickup(&self, kanal_id: KanalId) -> bool {
        self.pickup.iter().any(|k| k.id == kanal_id)
    }

    /// True wenn der Kanal irgendeiner der verfolgten Rollen angehoert
    pub fn ist_bekannt(&self, kanal_id: KanalId) -> bool {
        self.staging.as_ref().map(|k| k.id) == Some(kanal_id)
            || self.ist_pickup(kanal_id)
            || self.teams.values().any(|k| k.id == kanal_id)
            || self
                .squads
                .values()
                .any(|team| team.values().any(|k| k.id == kanal_id))
    }

    pub fn team(&self, team_id: i32) -> Option<&TsKanal> {
        self.teams.get(&team_id)
    }

    pub fn squad(&self, team_id: i32, squad_id: i32) -> Option<&TsKanal> {
        self.squads.get(&team_id)?.get(&squad_id)
    }

    /// Registriert einen Team-Kanal und setzt dessen Squad-Tabelle zurueck
    pub fn team_registrieren(&mut self, team_id: i32, kanal: TsKanal) {
        self.teams.insert(team_id, kanal);
        self.squads.insert(team_id, HashMap::new());
    }

    /// Registriert einen Squad-Kanal; ohne registriertes Team ein No-Op
    pub fn squad_registrieren(&mut self, team_id: i32, squad_id: i32, kanal: TsKanal) {
        if let Some(team_squads) = self.squads.get_mut(&team_id) {
            team_squads.insert(squad_id, kanal);
        }
    }

    /// Vergisst einen Team-Kanal samt aller Squad-Kinder (Fehlercode 768:
    /// der Kanal existiert nicht mehr, die naechste Pruefung loest neu auf)
    pub fn team_vergessen(&mut self, team_id: i32) {
        self.teams.remove(&team_id);
        self.squads.remove(&team_id);
    }

    /// Vergisst einen einzelnen Squad-Kanal
    pub fn squad_vergessen(&mut self, team_id: i32, squad_id: i32) {
        if let Some(team_squads) = self.squads.get_mut(&team_id) {
            team_squads.remove(&squad_id);
        }
    }

    /// Uebernimmt bereits existierende Kanaele aus der Kanalliste des
    /// Servers (Verbindungsaufbau): Pickup-Kanaele per Name, Team-Kanaele
    /// unter Staging oder Wurzel, Squad-Kanaele unter ihrem Team.
    pub fn bestehende_uebernehmen(&mut self, kanaele: &[TsKanal], konfig: &SyncKonfig) {
        for kanal in kanaele {
            if konfig
                .teamspeak
                .pickup_kanaele
                .iter()
                .any(|name| name == &kanal.name)
            {
                tracing::info!(kanal = %kanal.id, name = %kanal.name, "Pickup-Kanal gefunden");
                self.pickup.push(kanal.clone());
            }
        }

        let staging_id = self.staging.as_ref().map(|k| k.id);
        for kanal in kanaele {
            let unter_wurzel_oder_staging =
                kanal.eltern_id == Some(KanalId(0)) || kanal.eltern_id == staging_id;
            if !unter_wurzel_oder_staging {
                continue;
            }
            for (index, name) in konfig.kanaele.team_namen.iter().enumerate() {
                let team_id = index as i32 + 1;
                if !self.teams.contains_key(&team_id) && &kanal.name == name {
                    tracing::info!(kanal = %kanal.id, name = %kanal.name, team_id, "Team-Kanal gefunden");
                    self.team_registrieren(team_id, kanal.clone());
                    break;
                }
            }
        }

        let team_ids: Vec<i32> = self.teams.keys().copied().collect();
        for kanal in kanaele {
            for &team_id in &team_ids {
                if kanal.eltern_id != self.teams.get(&team_id).map(|k| k.id) {
                    continue;
                }
                for (index, name) in konfig.kanaele.squad_namen.iter().enumerate() {
                    let squad_id = index as i32 + 1;
                    let schon_bekannt = self
                        .squads
                        .get(&team_id)
                        .map(|s| s.contains_key(&squad_id))
                        .unwrap_or(false);
                    if !schon_bekannt && &kanal.name == name {
                        tracing::info!(kanal = %kanal.id, name = %kanal.name, team_id, squad_id, "Squad-Kanal gefunden");
                        self.squad_registrieren(team_id, squad_id, kanal.clone());
                        break;
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Finden oder Erstellen
    // -----------------------------------------------------------------

    /// Findet oder erstellt den Kanal fuer ein Team.
    ///
    /// Nach Rueckkehr ist das Team entweder registriert oder die Operation
    /// wurde wegen eines unbedeutenden Fehlers abgebrochen (naechster Takt
    /// versucht es erneut).
    pub async fn team_finden_oder_erstellen(
        &mut self,
        verbindung: &mut TsVerbindung,
        konfig: &SyncKonfig,
        team_id: i32,
    ) -> Result<()> {
        let name = konfig.kanaele.team_name(team_id);
        self.team_finden(verbindung, team_id, &name).await?;
        if !self.teams.contains_key(&team_id) {
            self.team_erstellen(verbindung, konfig, team_id, &name).await?;
        }
        Ok(())
    }

    /// Findet oder erstellt den Kanal fuer ein Squad. Ohne registriertes
    /// Team ein No-Op.
    pub async fn squad_finden_oder_erstellen(
        &mut self,
        verbindung: &mut TsVerbindung,
        konfig: &SyncKonfig,
        team_id: i32,
        squad_id: i32,
    ) -> Result<()> {
        if !self.teams.contains_key(&team_id) {
            return Ok(());
        }
        let name = konfig.kanaele.squad_name(squad_id);
        self.squad_finden(verbindung, team_id, squad_id, &name).await?;
        if self.squad(team_id, squad_id).is_none() {
            self.squad_erstellen(verbindung, konfig, team_id, squad_id, &name)
                .await?;
        }
        Ok(())
    }

    async fn team_finden(
        &mut self,
        verbindung: &mut TsVerbindung,
        team_id: i32,
        name: &str,
    ) -> Result<()> {
        let antwort = verbindung.senden(&TsQuery::kanal_liste()).await?;
        bann_pruefen(&antwort)?;
        if !antwort.ist_ok() {
            tracing::warn!(id = ?antwort.id(), "Kanalliste fuer Team-Suche fehlgeschlagen");
            return Ok(());
        }

        let kandidaten: Vec<TsKanal> = antwort
            .alle_gruppen()
            .filter_map(TsKanal::aus_gruppe)
            .filter(|k| k.name == name)
            .collect();

        // Kinder des Staging-Kanals haben Vorrang, dann Kinder der Wurzel;
        // alles andere qualifiziert sich nicht.
        let staging_id = self.staging.as_ref().map(|k| k.id);
        let gefunden = kandidaten
            .iter()
            .find(|k| k.eltern_id == staging_id)
            .or_else(|| kandidaten.iter().find(|k| k.eltern_id == Some(KanalId(0))));

        if let Some(kanal) = gefunden {
            tracing::debug!(kanal = %kanal.id, name, team_id, "Team-Kanal gefunden");
            self.team_registrieren(team_id, kanal.clone());
        }
        Ok(())
    }

    async fn squad_finden(
        &mut self,
        verbindung: &mut TsVerbindung,
        team_id: i32,
        squad_id: i32,
        name: &str,
    ) -> Result<()> {
        let eltern_id = match self.teams.get(&team_id) {
            Some(team) => team.id,
            None => return Ok(()),
        };

        let antwort = verbindung.senden(&TsQuery::kanal_liste()).await?;
        bann_pruefen(&antwort)?;
        if !antwort.ist_ok() {
            tracing::warn!(id = ?antwort.id(), "Kanalliste fuer Squad-Suche fehlgeschlagen");
            return Ok(());
        }

        let gefunden = antwort
            .alle_gruppen()
            .filter_map(TsKanal::aus_gruppe)
            .filter(|k| k.name == name)
            .find(|k| k.eltern_id == Some(eltern_id));

        if let Some(kanal) = gefunden {
            tracing::debug!(kanal = %kanal.id, name, team_id, squad_id, "Squad-Kanal gefunden");
            self.squad_registrieren(team_id, squad_id, kanal.clone());
        }
        Ok(())
    }

    async fn team_erstellen(
        &mut self,
        verbindung: &mut TsVerbindung,
        konfig: &SyncKonfig,
        team_id: i32,
        name: &str,
    ) -> Result<()> {
        let staging_id = match self.staging.as_ref() {
            Some(staging) => staging.id,
            None => return Ok(()),
        };

        let mut abfrage = TsQuery::neu("channelcreate")
            .mit_parameter("channel_name", name)
            .mit_parameter("channel_flag_permanent", "1")
            .mit_parameter("cpid", &staging_id.0.to_string())
            .mit_parameter("channel_codec_quality", "10");
        if !konfig.kanaele.passwort.is_empty() {
            abfrage.parameter_hinzufuegen("channel_password", &konfig.kanaele.passwort);
        }
        // Einsortierung hinter dem naechst-niedrigeren existierenden
        // Team-Kanal, sonst ganz oben
        abfrage.parameter_hinzufuegen("channel_order", &self.team_ordnung(team_id, staging_id).0.to_string());

        tracing::debug!(name, team_id, "Team-Kanal wird erstellt");
        let antwort = verbindung.senden(&abfrage).await?;
        bann_pruefen(&antwort)?;
        if !antwort.ist_ok() {
            tracing::warn!(id = ?antwort.id(), name, "Team-Kanal konnte nicht erstellt werden");
            // Moeglicherweise existiert ein gleichnamiger Kanal unter einem
            // anderen Elternteil; veraltete Registrierung verwerfen, damit
            // die naechste Suche neu aufloest.
            self.team_vergessen(team_id);
            return Ok(());
        }
        let kanal_id = match antwort.erste_gruppe().and_then(|g| g.ganzzahl("cid")) {
            Some(cid) => KanalId(cid),
            None => {
                tracing::warn!(name, "channelcreate-Antwort ohne cid");
                return Ok(());
            }
        };

        let antwort = verbindung.senden(&TsQuery::kanal_info(kanal_id.0)).await?;
        bann_pruefen(&antwort)?;
        if !antwort.ist_ok() {
            tracing::warn!(id = ?antwort.id(), "channelinfo des neuen Team-Kanals fehlgeschlagen");
            return Ok(());
        }
        let kanal = match antwort.erste_gruppe() {
            Some(gruppe) => TsKanal::aus_info_gruppe(kanal_id, gruppe, name),
            None => TsKanal {
                id: kanal_id,
                name: name.to_string(),
                eltern_id: Some(staging_id),
            },
        };

        tracing::info!(kanal = %kanal.id, name = %kanal.name, team_id, "Team-Kanal erstellt");
        self.team_registrieren(team_id, kanal);
        Ok(())
    }

    async fn squad_erstellen(
        &mut self,
        verbindung: &mut TsVerbindung,
        konfig: &SyncKonfig,
        team_id: i32,
        squad_id: i32,
        name: &str,
    ) -> Result<()> {
        let eltern_id = match self.teams.get(&team_id) {
            Some(team) => team.id,
            None => return Ok(()),
        };

        let mut abfrage = TsQuery::neu("channelcreate")
            .mit_parameter("channel_name", name)
            .mit_parameter("channel_flag_permanent", "1")
            .mit_parameter("cpid", &eltern_id.0.to_string());
        if !konfig.kanaele.passwort.is_empty() {
            abfrage.parameter_hinzufuegen("channel_password", &konfig.kanaele.passwort);
        }
        abfrage.parameter_hinzufuegen(
            "channel_order",
            &self.squad_ordnung(team_id, squad_id, eltern_id).0.to_string(),
        );

        tracing::debug!(name, team_id, squad_id, "Squad-Kanal wird erstellt");
        let antwort = verbindung.senden(&abfrage).await?;
        bann_pruefen(&antwort)?;
        if !antwort.ist_ok() {
            tracing::warn!(id = ?antwort.id(), name, "Squad-Kanal konnte nicht erstellt werden");
            self.squad_vergessen(team_id, squad_id);
            return Ok(());
        }
        let kanal_id = match antwort.erste_gruppe().and_then(|g| g.ganzzahl("cid")) {
            Some(cid) => KanalId(cid),
            None => {
                tracing::warn!(name, "channelcreate-Antwort ohne cid");
                return Ok(());
            }
        };

        let antwort = verbindung.senden(&TsQuery::kanal_info(kanal_id.0)).await?;
        bann_pruefen(&antwort)?;
        if !antwort.ist_ok() {
            tracing::warn!(id = ?antwort.id(), "channelinfo des neuen Squad-Kanals fehlgeschlagen");
            return Ok(());
        }
        let kanal = match antwort.erste_gruppe() {
            Some(gruppe) => TsKanal::aus_info_gruppe(kanal_id, gruppe, name),
            None => TsKanal {
                id: kanal_id,
                name: name.to_string(),
                eltern_id: Some(eltern_id),
            },
        };

        tracing::info!(kanal = %kanal.id, name = %kanal.name, team_id, squad_id, "Squad-Kanal erstellt");
        self.squad_registrieren(team_id, squad_id, kanal);
        Ok(())
    }

    /// Einsortierung eines neuen Team-Kanals: hinter dem naechst-
    /// niedrigeren Team das direkt unter Staging haengt, sonst Ordnung 0
    fn team_ordnung(&self, team_id: i32, staging_id: KanalId) -> KanalId {
        for niedrigeres in (1..team_id).rev() {
            if let Some(kanal) = self.teams.get(&niedrigeres) {
                if kanal.eltern_id == Some(staging_id) {
                    return kanal.id;
                }
            }
        }
        KanalId(0)
    }

    /// Einsortierung eines neuen Squad-Kanals relativ zu seinen
    /// Geschwistern unter demselben Team
    fn squad_ordnung(&self, team_id: i32, squad_id: i32, eltern_id: KanalId) -> KanalId {
        if let Some(team_squads) = self.squads.get(&team_id) {
            for niedrigeres in (1..squad_id).rev() {
                if let Some(kanal) = team_squads.get(&niedrigeres) {
                    if kanal.eltern_id == Some(eltern_id) {
                        return kanal.id;
                    }
                }
            }
        }
        KanalId(0)
    }

    // -----------------------------------------------------------------
    // Aufraeumen
    // -----------------------------------------------------------------

    /// Loescht leere Squad-Kanaele und danach leere Team-Kanaele.
    ///
    /// Team-Kanaele werden nur geloescht wenn sie direkt unter Staging
    /// haengen und nach dem Squad-Durchlauf keine Squad-Kinder mehr
    /// registriert sind. Ein fehlgeschlagenes Loeschen behaelt die
    /// Registrierung und macht mit dem naechsten Kanal weiter.
    pub async fn leere_entfernen(&mut self, verbindung: &mut TsVerbindung) -> Result<()> {
        let antwort = verbindung.senden(&TsQuery::client_liste()).await?;
        bann_pruefen(&antwort)?;
        if !antwort.ist_ok() {
            tracing::warn!(id = ?antwort.id(), "Clientliste fuer Kanal-Aufraeumen fehlgeschlagen");
            return Ok(());
        }
        let belegt: HashSet<KanalId> = antwort
            .alle_gruppen()
            .filter_map(|g| g.ganzzahl("cid").map(KanalId))
            .collect();

        let (leere_squads, leere_teams) = self.leerungs_plan(&belegt);

        for (team_id, squad_id, kanal_id) in leere_squads {
            let antwort = verbindung.senden(&TsQuery::kanal_loeschen(kanal_id.0)).await?;
            bann_pruefen(&antwort)?;
            if !antwort.ist_ok() {
                tracing::warn!(id = ?antwort.id(), kanal = %kanal_id, "Squad-Kanal konnte nicht geloescht werden");
                continue;
            }
            tracing::info!(kanal = %kanal_id, team_id, squad_id, "Leeren Squad-Kanal geloescht");
            self.squad_vergessen(team_id, squad_id);
        }

        for (team_id, kanal_id) in leere_teams {
            let squads_uebrig = self
                .squads
                .get(&team_id)
                .map(|s| !s.is_empty())
                .unwrap_or(false);
            if squads_uebrig {
                continue;
            }
            let antwort = verbindung.senden(&TsQuery::kanal_loeschen(kanal_id.0)).await?;
            bann_pruefen(&antwort)?;
            if !antwort.ist_ok() {
                tracing::warn!(id = ?antwort.id(), kanal = %kanal_id, "Team-Kanal konnte nicht geloescht werden");
                continue;
            }
            tracing::info!(kanal = %kanal_id, team_id, "Leeren Team-Kanal geloescht");
            self.team_vergessen(team_id);
        }

        Ok(())
    }

    /// Markiert unbesetzte Squad-Kanaele und unbesetzte Team-Kanaele
    /// (letztere nur als direkte Staging-Kinder). Ob ein markiertes Team
    /// tatsaechlich geloescht wird, entscheidet erst der Loesch-Durchlauf:
    /// solange noch Squad-Registrierungen uebrig sind, wird es
    /// uebersprungen.
    fn leerungs_plan(
        &self,
        belegt: &HashSet<KanalId>,
    ) -> (Vec<(i32, i32, KanalId)>, Vec<(i32, KanalId)>) {
        let leere_squads: Vec<(i32, i32, KanalId)> = self
            .squads
            .iter()
            .flat_map(|(&team_id, team_squads)| {
                team_squads
                    .iter()
                    .filter(|(_, kanal)| !belegt.contains(&kanal.id))
                    .map(move |(&squad_id, kanal)| (team_id, squad_id, kanal.id))
            })
            .collect();

        let staging_id = self.staging.as_ref().map(|k| k.id);
        let leere_teams: Vec<(i32, KanalId)> = self
            .teams
            .iter()
            .filter(|(_, kanal)| kanal.eltern_id == staging_id && !belegt.contains(&kanal.id))
            .map(|(&team_id, kanal)| (team_id, kanal.id))
            .collect();

        (leere_squads, leere_teams)
    }
}
