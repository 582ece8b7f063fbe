//! Query-Verbindung zum Teamspeak-Server
//!
//! Eine [`TsVerbindung`] besitzt genau einen TCP-Strom zum Query-Port.
//! Es ist immer hoechstens eine Anfrage in Flug: `senden` schreibt die
//! Abfrage und akkumuliert Antwortbytes bis die Statuszeile samt
//! Zeilenende gesehen wurde oder das Zeitbudget ablaeuft – was zuerst
//! eintritt wird geparst und zurueckgegeben.
//!
//! Jeder Transportfehler schliesst den Strom und hinterlaesst die
//! Verbindung in einem frischen, wiederverwendbaren Zustand (nie
//! "halb geschlossen").

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};

use kanalwart_core::error::{Result, SyncFehler};
use kanalwart_protocol::{TsAntwort, TsQuery, STATUS_MARKER};

/// Wandzeit-Budget fuer eine vollstaendige Antwort
pub const ANTWORT_BUDGET: Duration = Duration::from_millis(5500);
/// Zeitlimit fuer einen einzelnen Lesevorgang ohne ein einziges Byte
const LESE_TIMEOUT: Duration = Duration::from_secs(5);
/// Zeitlimit fuer den TCP-Verbindungsaufbau
const VERBINDUNGS_TIMEOUT: Duration = Duration::from_secs(5);
/// Ruhefenster beim Einlesen der Begruessung
const BEGRUESSUNG_RUHE: Duration = Duration::from_millis(500);
/// Erwartetes Banner in der Begruessung des Servers
const BANNER: &str = "TS3";

/// Diagnose-Haken fuer rohe Wire-Daten
///
/// Rein beobachtend; die Verbindung funktioniert ohne Beobachter genauso.
pub trait DatenBeobachter: Send + Sync {
    /// Wird nach jedem erfolgreichen Schreiben aufgerufen
    fn daten_gesendet(&self, daten: &str);
    /// Wird nach jedem vollstaendigen Empfang aufgerufen
    fn daten_empfangen(&self, daten: &str);
}

/// Beobachter der rohe Wire-Daten ins Protokoll schreibt (Trace-Level)
#[derive(Debug, Default)]
pub struct WireProtokollierer;

impl DatenBeobachter for WireProtokollierer {
    fn daten_gesendet(&self, daten: &str) {
        tracing::trace!(daten, "Wire gesendet");
    }

    fn daten_empfangen(&self, daten: &str) {
        for zeile in daten.lines() {
            tracing::trace!(zeile, "Wire empfangen");
        }
    }
}

/// Mindestabstand zwischen zwei Abfragen
///
/// Der entfernte Server bannt Clients die zu schnell senden; die Drossel
/// sitzt als reiner Rate-Limiter vor dem Senden.
#[derive(Debug)]
pub struct SendeDrossel {
    abstand: Option<Duration>,
    zuletzt: Option<Instant>,
}

impl SendeDrossel {
    /// Drossel mit dem angegebenen Mindestabstand
    pub fn neu(abstand: Duration) -> Self {
        Self {
            abstand: Some(abstand),
            zuletzt: None,
        }
    }

    /// Deaktivierte Drossel (kein Mindestabstand)
    pub fn aus() -> Self {
        Self {
            abstand: None,
            zuletzt: None,
        }
    }

    /// Wartet bis seit dem letzten Senden der Mindestabstand vergangen ist
    pub async fn warten(&self) {
        if let (Some(abstand), Some(zuletzt)) = (self.abstand, self.zuletzt) {
            let vergangen = zuletzt.elapsed();
            if vergangen < abstand {
                tokio::time::sleep(abstand - vergangen).await;
            }
        }
    }

    /// Vermerkt den Zeitpunkt des letzten Sendens
    pub fn vermerken(&mut self) {
        if self.abstand.is_some() {
            self.zuletzt = Some(Instant::now());
        }
    }
}

/// Eine Query-Verbindung zum Teamspeak-Server
pub struct TsVerbindung {
    strom: Option<TcpStream>,
    drossel: SendeDrossel,
    beobachter: Option<Arc<dyn DatenBeobachter>>,
}

impl TsVerbindung {
    /// Erstellt eine unverbundene Verbindung
    pub fn neu(drossel: SendeDrossel) -> Self {
        Self {
            strom: None,
            drossel,
            beobachter: None,
        }
    }

    /// Haengt einen Diagnose-Beobachter an
    pub fn beobachter_setzen(&mut self, beobachter: Arc<dyn DatenBeobachter>) {
        self.beobachter = Some(beobachter);
    }

    /// True solange ein Strom offen ist
    pub fn ist_verbunden(&self) -> bool {
        self.strom.is_some()
    }

    /// Oeffnet die Verbindung und liest die Begruessung.
    ///
    /// Drei getrennte Vorbedingungsfehler, damit Aufrufer ohne
    /// Ausnahmebehandlung verzweigen koennen: bereits verbunden, leerer
    /// Host, Port 0. Die Begruessung muss das TS3-Banner enthalten;
    /// enthaelt sie bereits eine Statuszeile, wird diese geparst
    /// zurueckgegeben.
    pub async fn oeffnen(&mut self, host: &str, port: u16) -> Result<TsAntwort> {
        if self.strom.is_some() {
            return Err(SyncFehler::BereitsVerbunden);
        }
        if host.trim().is_empty() {
            return Err(SyncFehler::LeererHost);
        }
        if port == 0 {
            return Err(SyncFehler::PortNull);
        }

        let strom = match timeout(VERBINDUNGS_TIMEOUT, TcpStream::connect((host, port))).await {
            Ok(Ok(strom)) => strom,
            Ok(Err(e)) => return Err(SyncFehler::VerbindungFehlgeschlagen(e.to_string())),
            Err(_) => {
                return Err(SyncFehler::VerbindungFehlgeschlagen(
                    "Zeitlimit beim Verbindungsaufbau".into(),
                ))
            }
        };
        self.strom = Some(strom);

        let begruessung = match self.begruessung_lesen().await {
            Ok(text) => text,
            Err(fehler) => {
                self.schliessen();
                return Err(fehler);
            }
        };
        if !begruessung.contains(BANNER) {
            self.schliessen();
            return Err(SyncFehler::BegruessungUngueltig);
        }
        self.melden_empfangen(&begruessung);
        tracing::debug!(host, port, "Query-Verbindung geoeffnet");

        if begruessung.contains(STATUS_MARKER) {
            Ok(TsAntwort::parsen(&begruessung))
        } else {
            Ok(TsAntwort::ok())
        }
    }

    /// Sendet eine Abfrage und blockiert bis zur Antwort.
    ///
    /// Transportfehler schliessen den Strom und kommen als Wert zurueck;
    /// ein abgelaufenes Zeitbudget liefert die bis dahin akkumulierte
    /// Teilantwort.
    pub async fn senden(&mut self, abfrage: &TsQuery) -> Result<TsAntwort> {
        if self.strom.is_none() {
            return Err(SyncFehler::NichtVerbunden);
        }
        self.drossel.warten().await;

        let roh = abfrage.als_rohtext();
        let geschrieben = match self.strom.as_mut() {
            Some(strom) => strom.write_all(roh.as_bytes()).await,
            None => return Err(SyncFehler::NichtVerbunden),
        };
        if let Err(e) = geschrieben {
            self.schliessen();
            return Err(SyncFehler::SendenFehlgeschlagen(e.to_string()));
        }
        self.drossel.vermerken();
        self.melden_gesendet(&roh);

        match self.antwort_lesen().await {
            Ok(text) => {
                self.melden_empfangen(&text);
                Ok(TsAntwort::parsen(&text))
            }
            Err(fehler) => {
                self.schliessen();
                Err(fehler)
            }
        }
    }

    /// Schliesst die Verbindung. Idempotent; hinterlaesst immer einen
    /// frischen, erneut verwendbaren Zustand.
    pub fn schliessen(&mut self) {
        if self.strom.take().is_some() {
            tracing::debug!("Query-Verbindung geschlossen");
        }
    }

    /// Akkumuliert Bytes bis Statuszeile + Zeilenende gesehen wurden oder
    /// das Budget ablaeuft
    async fn antwort_lesen(&mut self) -> Result<String> {
        let strom = self.strom.as_mut().ok_or(SyncFehler::NichtVerbunden)?;
        let mut puffer = BytesMut::with_capacity(64 * 1024);
        let start = Instant::now();

        loop {
            {
                let text = String::from_utf8_lossy(&puffer);
                // Terminator: Statuszeile vorhanden UND Puffer endet auf "\n\r"
                if text.contains(STATUS_MARKER) && text.ends_with("\n\r") {
                    break;
                }
            }
            let verbleibend = ANTWORT_BUDGET.saturating_sub(start.elapsed());
            if verbleibend.is_zero() {
                break;
            }
            let fenster = LESE_TIMEOUT.min(verbleibend);
            match timeout(fenster, strom.read_buf(&mut puffer)).await {
                Ok(Ok(0)) => {
                    return Err(SyncFehler::EmpfangFehlgeschlagen(
                        "Verbindung vom Server geschlossen".into(),
                    ))
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(SyncFehler::EmpfangFehlgeschlagen(e.to_string())),
                Err(_) if fenster == LESE_TIMEOUT => {
                    // Volles Lesefenster ohne ein einziges Byte
                    return Err(SyncFehler::EmpfangFehlgeschlagen(
                        "Zeitlimit beim Empfang".into(),
                    ));
                }
                Err(_) => break,
            }
        }
        Ok(String::from_utf8_lossy(&puffer).into_owned())
    }

    /// Liest die Begruessung bis der Server ein Ruhefenster lang nichts
    /// mehr nachliefert (die Begruessung hat keine Statuszeile als
    /// Terminator)
    async fn begruessung_lesen(&mut self) -> Result<String> {
        let strom = self.strom.as_mut().ok_or(SyncFehler::NichtVerbunden)?;
        let mut puffer = BytesMut::with_capacity(2048);
        let start = Instant::now();

        loop {
            match timeout(BEGRUESSUNG_RUHE, strom.read_buf(&mut puffer)).await {
                Ok(Ok(0)) => {
                    return Err(SyncFehler::VerbindungFehlgeschlagen(
                        "Verbindung waehrend der Begruessung geschlossen".into(),
                    ))
                }
                Ok(Ok(_)) => {
                    if start.elapsed() > LESE_TIMEOUT {
                        break;
                    }
                }
                Ok(Err(e)) => return Err(SyncFehler::VerbindungFehlgeschlagen(e.to_string())),
                Err(_) => {
                    if !puffer.is_empty() {
                        break;
                    }
                    if start.elapsed() > LESE_TIMEOUT {
                        return Err(SyncFehler::VerbindungFehlgeschlagen(
                            "Keine Begruessung vom Server".into(),
                        ));
                    }
                }
            }
        }
        Ok(String::from_utf8_lossy(&puffer).into_owned())
    }

    fn melden_gesendet(&self, daten: &str) {
        if let Some(beobachter) = &self.beobachter {
            beobachter.daten_gesendet(daten.trim());
        }
    }

    fn melden_empfangen(&self, daten: &str) {
        if let Some(beobachter) = &self.beobachter {
            beobachter.daten_empfangen(daten.trim());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn oeffnen_lehnt_leeren_host_ab() {
        let mut verbindung = TsVerbindung::neu(SendeDrossel::aus());
        let fehler = verbindung.oeffnen("", 10011).await.unwrap_err();
        assert!(matches!(fehler, SyncFehler::LeererHost));
    }

    #[tokio::test]
    async fn oeffnen_lehnt_port_null_ab() {
        let mut verbindung = TsVerbindung::neu(SendeDrossel::aus());
        let fehler = verbindung.oeffnen("voice.example.org", 0).await.unwrap_err();
        assert!(matches!(fehler, SyncFehler::PortNull));
    }

    #[tokio::test]
    async fn senden_ohne_verbindung() {
        let mut verbindung = TsVerbindung::neu(SendeDrossel::aus());
        let fehler = verbindung
            .senden(&TsQuery::client_liste())
            .await
            .unwrap_err();
        assert!(matches!(fehler, SyncFehler::NichtVerbunden));
    }

    #[tokio::test]
    async fn schliessen_ist_idempotent() {
        let mut verbindung = TsVerbindung::neu(SendeDrossel::aus());
        verbindung.schliessen();
        verbindung.schliessen();
        assert!(!verbindung.ist_verbunden());
    }

    #[tokio::test(start_paused = true)]
    async fn drossel_haelt_mindestabstand_ein() {
        let mut drossel = SendeDrossel::neu(Duration::from_millis(700));
        drossel.warten().await; // noch nie gesendet: kein Warten
        drossel.vermerken();

        let start = Instant::now();
        drossel.warten().await;
        assert!(start.elapsed() >= Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn deaktivierte_drossel_wartet_nie() {
        let mut drossel = SendeDrossel::aus();
        drossel.vermerken();
        let start = Instant::now();
        drossel.warten().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
