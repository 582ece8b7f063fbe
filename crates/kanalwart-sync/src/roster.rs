//! Roster-Schnappschuesse und die abgeglichene Master-Sicht
//!
//! Drei unabhaengig aktualisierte Sichten: Voice-Clients (vom Query-Port),
//! Spiel-Clients (vom Spielserver) und die daraus abgeglichene Master-Liste.
//! Voice- und Spiel-Roster werden bei jedem Abgleichstakt wholesale ersetzt;
//! die drei Override-Flags eines Spielers ueberleben den Neuaufbau ueber
//! seinen Spielernamen.
//!
//! Der Abgleich ist absichtlich gierig und reihenfolgeabhaengig (kein
//! global optimales bipartites Matching): hoechster Aehnlichkeitswert
//! gewinnt, bei Gleichstand der zuerst gesehene Kandidat. Nachgelagerte
//! Logik verlaesst sich auf genau diese Vertragsdetails.

use std::collections::HashMap;

use kanalwart_core::event::SpielerInfo;
use kanalwart_core::types::{ClientId, DatenbankId, KanalId};
use kanalwart_protocol::AntwortGruppe;

use crate::matcher::prozent_uebereinstimmung;

/// Ein Voice-Client mit vollstaendigen Pflichtfeldern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceClient {
    pub id: ClientId,
    /// Aktueller Kanal; wird nach erfolgreichem Verschieben optimistisch
    /// aktualisiert
    pub kanal_id: KanalId,
    pub name: String,
    pub ip: String,
    pub datenbank_id: DatenbankId,
}

/// Ein Voice-Client waehrend des Roster-Aufbaus (IP noch nicht aufgeloest)
#[derive(Debug, Clone)]
pub struct VoiceClientRoh {
    pub id: ClientId,
    pub kanal_id: KanalId,
    pub name: String,
    pub datenbank_id: DatenbankId,
    pub ip: Option<String>,
}

impl VoiceClientRoh {
    /// Baut einen Eintrag aus einer `clientlist`-Gruppe.
    ///
    /// Gruppen ohne die Pflichtfelder werden verworfen.
    pub fn aus_gruppe(gruppe: &AntwortGruppe) -> Option<Self> {
        Some(Self {
            id: ClientId(gruppe.ganzzahl("clid")?),
            kanal_id: KanalId(gruppe.ganzzahl("cid")?),
            name: gruppe.wert("client_nickname")?.to_string(),
            datenbank_id: DatenbankId(gruppe.ganzzahl("client_database_id")?),
            ip: None,
        })
    }

    /// Traegt die per `clientinfo` aufgeloeste IP nach
    pub fn ip_setzen(&mut self, ip: &str) {
        if !ip.trim().is_empty() {
            self.ip = Some(ip.trim().to_string());
        }
    }

    fn fertigstellen(self) -> Option<VoiceClient> {
        Some(VoiceClient {
            id: self.id,
            kanal_id: self.kanal_id,
            name: self.name,
            ip: self.ip?,
            datenbank_id: self.datenbank_id,
        })
    }
}

/// Ein Spieler auf dem Spielserver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpielClient {
    /// Spielername, primaerer Abgleichschluessel
    pub name: String,
    /// 0 = Zuschauer / nicht zugeteilt – nie verschiebbar
    pub team_id: i32,
    /// 0 = kein Squad
    pub squad_id: i32,
    /// IP aus der Nebenquelle, falls bekannt
    pub ip: Option<String>,
    pub land: Option<String>,
}

/// IP-Information aus der Nebenquelle, nach Spielername
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpEintrag {
    pub ip: String,
    pub land: String,
}

/// Die abgeglichene Paarung eines Voice- und eines Spiel-Clients
///
/// Mindestens eine Seite ist immer belegt; ein Eintrag ohne beide Seiten
/// ist ungueltig und wird sofort entfernt.
#[derive(Debug, Clone, Default)]
pub struct MasterClient {
    pub voice: Option<VoiceClient>,
    pub spiel: Option<SpielClient>,
    /// Spieler hat sich selbst vom Abgleich ausgenommen
    pub kein_sync: bool,
    /// Spieler moechte im Staging-Kanal bleiben
    pub sync_zu_staging: bool,
    /// Spieler moechte im Team-Kanal bleiben (statt Squad)
    pub sync_zu_team: bool,
}

impl MasterClient {
    fn aus_voice(voice: VoiceClient) -> Self {
        Self {
            voice: Some(voice),
            ..Self::default()
        }
    }

    fn aus_spiel(spiel: SpielClient) -> Self {
        Self {
            spiel: Some(spiel),
            ..Self::default()
        }
    }

    /// True wenn beide Seiten belegt sind
    pub fn auf_beiden(&self) -> bool {
        self.voice.is_some() && self.spiel.is_some()
    }

    fn spiel_name(&self) -> Option<&str> {
        self.spiel.as_ref().map(|s| s.name.as_str())
    }
}

/// In-Memory-Bestand aller drei Roster-Sichten
#[derive(Debug, Default)]
pub struct RosterBestand {
    voice_clients: Vec<VoiceClient>,
    spiel_clients: Vec<SpielClient>,
    master_clients: Vec<MasterClient>,
    ip_tabelle: HashMap<String, IpEintrag>,
}

impl RosterBestand {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Verwirft alle Sichten (beim Herunterfahren)
    pub fn leeren(&mut self) {
        self.voice_clients.clear();
        self.spiel_clients.clear();
        self.master_clients.clear();
        self.ip_tabelle.clear();
    }

    /// Ersetzt den Voice-Roster wholesale.
    ///
    /// Eintraege ohne aufgeloeste IP fallen durch die Plausibilitaets-
    /// pruefung und werden verworfen.
    pub fn voice_roster_ersetzen(&mut self, rohe: Vec<VoiceClientRoh>) {
        self.voice_clients = rohe
            .into_iter()
            .filter_map(VoiceClientRoh::fertigstellen)
            .collect();
    }

    /// Ersetzt den Spiel-Roster wholesale und annotiert jeden Eintrag mit
    /// IP-Daten aus der Nebenquelle. Die IP-Tabelle wird dabei auf die
    /// aktuell anwesenden Namen zurueckgeschnitten.
    pub fn spiel_roster_ersetzen(&mut self, spieler: Vec<SpielerInfo>) {
        let mut behalten = HashMap::new();
        let mut clients = Vec::with_capacity(spieler.len());
        for info in spieler {
            let eintrag = self.ip_tabelle.get(&info.name).cloned();
            if let Some(eintrag) = &eintrag {
                behalten.insert(info.name.clone(), eintrag.clone());
            }
            clients.push(SpielClient {
                ip: eintrag.as_ref().map(|e| e.ip.clone()),
                land: eintrag.map(|e| e.land),
                name: info.name,
                team_id: info.team_id,
                squad_id: info.squad_id,
            });
        }
        self.ip_tabelle = behalten;
        self.spiel_clients = clients;
    }

    /// Nimmt einen IP-Eintrag aus der Nebenquelle auf.
    ///
    /// Ein eventuell angehaengter Port wird abgeschnitten. Ein bestehender
    /// Eintrag wird nur ueberschrieben wenn die neue IP nicht leer ist.
    pub fn ip_info_aktualisieren(&mut self, name: &str, ip: &str, land: &str) {
        let ip = ip.split(':').next().unwrap_or_default().trim().to_string();
        match self.ip_tabelle.get_mut(name) {
            Some(eintrag) => {
                if !ip.is_empty() {
                    *eintrag = IpEintrag {
                        ip,
                        land: land.to_string(),
                    };
                }
            }
            None => {
                self.ip_tabelle.insert(
                    name.to_string(),
                    IpEintrag {
                        ip,
                        land: land.to_string(),
                    },
                );
            }
        }
    }

    /// Baut die Master-Liste aus den aktuellen Schnappschuessen neu auf.
    ///
    /// 1. Ein Master-Eintrag je Voice-Client.
    /// 2. Spiel-Clients mit IP: alle Master deren Voice-IP passt sammeln.
    ///    Kein Treffer → neuer ungepaarter Eintrag. Ein Treffer → direkt
    ///    paaren. Mehrere → hoechste Namensaehnlichkeit entscheidet,
    ///    Gleichstand behaelt den zuerst gesehenen.
    /// 3. Spiel-Clients ohne IP: hoechste Namensaehnlichkeit gegen alle
    ///    noch ungepaarten Master, gepaart nur ab `schwelle`.
    /// 4. Override-Flags vom vorherigen Master gleichen Spielernamens
    ///    uebernehmen, dann den alten Bestand verwerfen.
    pub fn master_neu_aufbauen(&mut self, schwelle: f64) {
        let mut neu: Vec<MasterClient> = self
            .voice_clients
            .iter()
            .cloned()
            .map(MasterClient::aus_voice)
            .collect();
        let mut ungepaart: Vec<MasterClient> = Vec::new();

        for spiel in &self.spiel_clients {
            if let Some(ip) = &spiel.ip {
                let treffer: Vec<usize> = neu
                    .iter()
                    .enumerate()
                    .filter(|(_, m)| m.voice.as_ref().map(|v| v.ip.as_str()) == Some(ip.as_str()))
                    .map(|(i, _)| i)
                    .collect();
                match treffer.as_slice() {
                    [] => ungepaart.push(MasterClient::aus_spiel(spiel.clone())),
                    [einziger] => neu[*einziger].spiel = Some(spiel.clone()),
                    mehrere => {
                        let mut bester = mehrere[0];
                        let mut bester_wert = 0.0;
                        for &index in mehrere {
                            let voice_name = match &neu[index].voice {
                                Some(voice) => voice.name.as_str(),
                                None => continue,
                            };
                            let wert = prozent_uebereinstimmung(&spiel.name, voice_name);
                            if wert > bester_wert {
                                bester = index;
                                bester_wert = wert;
                            }
                        }
                        neu[bester].spiel = Some(spiel.clone());
                    }
                }
            } else {
                let mut bester: Option<usize> = None;
                let mut bester_wert = 0.0;
                for (index, master) in neu.iter().enumerate() {
                    if master.spiel.is_some() {
                        continue;
                    }
                    let voice_name = match &master.voice {
                        Some(voice) => voice.name.as_str(),
                        None => continue,
                    };
                    let wert = prozent_uebereinstimmung(&spiel.name, voice_name);
                    if wert > bester_wert {
                        bester = Some(index);
                        bester_wert = wert;
                    }
                }
                match bester {
                    Some(index) if bester_wert >= schwelle => {
                        neu[index].spiel = Some(spiel.clone())
                    }
                    _ => ungepaart.push(MasterClient::aus_spiel(spiel.clone())),
                }
            }
        }
        neu.append(&mut ungepaart);

        // Flags vom alten Bestand uebernehmen (Schluessel: Spielername)
        for alt in &self.master_clients {
            let Some(alt_name) = alt.spiel_name() else {
                continue;
            };
            if let Some(master) = neu.iter_mut().find(|m| m.spiel_name() == Some(alt_name)) {
                master.kein_sync = alt.kein_sync;
                master.sync_zu_staging = alt.sync_zu_staging;
                master.sync_zu_team = alt.sync_zu_team;
            }
        }

        self.master_clients = neu;
    }

    /// Entfernt die Spiel-Seite eines Spielers.
    ///
    /// Bleibt die Voice-Seite uebrig, wird deren Client-ID zurueckgegeben,
    /// damit der Aufrufer eine Entfernungspruefung einreihen kann. Ohne
    /// Voice-Seite wird der Master-Eintrag sofort geloescht (nie beide
    /// Seiten leer).
    pub fn spieler_verlassen(&mut self, name: &str) -> Option<ClientId> {
        self.spiel_clients.retain(|s| s.name != name);
        let position = self
            .master_clients
            .iter()
            .position(|m| m.spiel_name() == Some(name))?;
        self.master_clients[position].spiel = None;
        match &self.master_clients[position].voice {
            Some(voice) => Some(voice.id),
            None => {
                self.master_clients.remove(position);
                None
            }
        }
    }

    /// Aktualisiert Team und Squad eines Spielers in beiden Sichten
    pub fn team_wechsel(&mut self, name: &str, team_id: i32, squad_id: i32) {
        for spiel in &mut self.spiel_clients {
            if spiel.name == name {
                spiel.team_id = team_id;
                spiel.squad_id = squad_id;
            }
        }
        for master in &mut self.master_clients {
            if let Some(spiel) = &mut master.spiel {
                if spiel.name == name {
                    spiel.team_id = team_id;
                    spiel.squad_id = squad_id;
                }
            }
        }
    }

    /// Optimistische Kanal-Aktualisierung nach erfolgreichem Verschieben
    pub fn voice_kanal_setzen(&mut self, id: ClientId, kanal_id: KanalId) {
        for master in &mut self.master_clients {
            if let Some(voice) = &mut master.voice {
                if voice.id == id {
                    voice.kanal_id = kanal_id;
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Auswahlen und Zaehlungen
    // -----------------------------------------------------------------

    pub fn master_alle(&self) -> &[MasterClient] {
        &self.master_clients
    }

    /// Spieler die auf beiden Servern anwesend sind
    pub fn beide(&self) -> impl Iterator<Item = &MasterClient> {
        self.master_clients.iter().filter(|m| m.auf_beiden())
    }

    /// Eintraege die nur auf der Voice-Seite existieren
    pub fn nur_voice(&self) -> impl Iterator<Item = &MasterClient> {
        self.master_clients
            .iter()
            .filter(|m| m.voice.is_some() && m.spiel.is_none())
    }

    /// Eintraege die nur auf der Spiel-Seite existieren
    pub fn nur_spiel(&self) -> impl Iterator<Item = &MasterClient> {
        self.master_clients
            .iter()
            .filter(|m| m.spiel.is_some() && m.voice.is_none())
    }

    pub fn anzahl_beide(&self) -> usize {
        self.beide().count()
    }

    pub fn anzahl_beide_im_team(&self, team_id: i32) -> usize {
        self.beide()
            .filter(|m| m.spiel.as_ref().map(|s| s.team_id) == Some(team_id))
            .count()
    }

    pub fn anzahl_beide_im_squad(&self, team_id: i32, squad_id: i32) -> usize {
        self.beide()
            .filter(|m| {
                m.spiel
                    .as_ref()
                    .map(|s| (s.team_id, s.squad_id) == (team_id, squad_id))
                    .unwrap_or(false)
            })
            .count()
    }

    pub fn master_mit_spielname(&self, name: &str) -> Option<&MasterClient> {
        self.master_clients
            .iter()
            .find(|m| m.spiel_name() == Some(name))
    }

    pub fn master_mit_spielname_mut(&mut self, name: &str) -> Option<&mut MasterClient> {
        self.master_clients
            .iter_mut()
            .find(|m| m.spiel_name() == Some(name))
    }

    pub fn master_mit_voice_id(&self, id: ClientId) -> Option<&MasterClient> {
        self.master_clients
            .iter()
            .find(|m| m.voice.as_ref().map(|v| v.id) == Some(id))
    }

    // -----------------------------------------------------------------
    // Override-Flags
    // -----------------------------------------------------------------

    /// Setzt alle drei Flags aller Spieler zurueck (Rundenwechsel)
    pub fn flags_alle_zuruecksetzen(&mut self) {
        for master in &mut self.master_clients {
            master.kein_sync = false;
            master.sync_zu_staging = false;
            master.sync_zu_team = false;
        }
    }
}
