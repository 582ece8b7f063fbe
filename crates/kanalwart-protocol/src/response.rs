//! Parsen eingehender Antworten
//!
//! Eine Antwort besteht aus drei Ebenen:
//!
//! 1. [`TsAntwort`] – Statusgruppe (`error id=.. msg=..`) plus Sektionen
//! 2. [`AntwortSektion`] – Gruppen, auf `|` getrennt
//! 3. [`AntwortGruppe`] – key/value-Paare, auf Leerzeichen und erstem `=`
//!    getrennt
//!
//! Der Parser schlaegt nie fehl: fehlerhafte Fragmente ohne `=` werden
//! stillschweigend verworfen, doppelte Keys ueberschrieben (letzter Wert
//! gewinnt). Beides sind bekannte Eigenheiten des entfernten Servers und
//! bleiben absichtlich erhalten.

use std::collections::HashMap;

use crate::escape::ts_unescape;

/// Markierung der Statuszeile einer Antwort
pub const STATUS_MARKER: &str = "error id=";

/// Eine key/value-Gruppe innerhalb einer Sektion
#[derive(Debug, Clone, Default)]
pub struct AntwortGruppe {
    roh: String,
    paare: HashMap<String, String>,
}

impl AntwortGruppe {
    /// Parst eine Gruppe aus ihrem Rohtext
    pub fn parsen(roh: &str) -> Self {
        let mut paare = HashMap::new();
        for element in roh.split(' ') {
            // Fragmente ohne '=' werden verworfen; der Wert wird am ersten
            // '=' abgetrennt und unescaped.
            if let Some((key, wert)) = element.split_once('=') {
                paare.insert(key.to_string(), ts_unescape(wert));
            }
        }
        Self {
            roh: roh.to_string(),
            paare,
        }
    }

    /// Gibt den unbearbeiteten Rohtext der Gruppe zurueck
    pub fn rohtext(&self) -> &str {
        &self.roh
    }

    /// Wert zu einem Key, `None` wenn nicht vorhanden
    pub fn wert(&self, key: &str) -> Option<&str> {
        self.paare.get(key).map(|w| w.as_str())
    }

    /// Wert als `i32`.
    ///
    /// Fehlender Key und unparsebarer Wert sind absichtlich nicht
    /// unterscheidbar – Aufrufer behandeln beide Faelle gleich.
    pub fn ganzzahl(&self, key: &str) -> Option<i32> {
        self.wert(key)?.parse().ok()
    }

    /// Wert als Schalter (`"1"` = true, `"0"` = false)
    pub fn schalter(&self, key: &str) -> Option<bool> {
        match self.wert(key)? {
            "1" => Some(true),
            "0" => Some(false),
            _ => None,
        }
    }
}

/// Eine Sektion einer Antwort (eine Nicht-Statuszeile)
#[derive(Debug, Clone)]
pub struct AntwortSektion {
    gruppen: Vec<AntwortGruppe>,
}

impl AntwortSektion {
    fn parsen(roh: &str) -> Self {
        Self {
            gruppen: roh.split('|').map(|g| AntwortGruppe::parsen(g.trim())).collect(),
        }
    }

    /// Gibt alle Gruppen der Sektion zurueck
    pub fn gruppen(&self) -> &[AntwortGruppe] {
        &self.gruppen
    }
}

/// Eine vollstaendige Antwort des Servers
#[derive(Debug, Clone)]
pub struct TsAntwort {
    roh: String,
    status: AntwortGruppe,
    sektionen: Vec<AntwortSektion>,
}

impl TsAntwort {
    /// Parst eine Antwort aus dem akkumulierten Rohtext.
    ///
    /// Zeilenenden werden normalisiert (`\n\r` → `\n`), jede Zeile die den
    /// [`STATUS_MARKER`] enthaelt wird zur Statusgruppe, alle anderen
    /// nicht-leeren Zeilen werden Sektionen.
    pub fn parsen(roh: &str) -> Self {
        let mut status = AntwortGruppe::default();
        let mut sektionen = Vec::new();
        for zeile in roh.replace("\n\r", "\n").split('\n') {
            let zeile = zeile.trim();
            if zeile.contains(STATUS_MARKER) {
                status = AntwortGruppe::parsen(zeile);
            } else if !zeile.is_empty() {
                sektionen.push(AntwortSektion::parsen(zeile));
            }
        }
        Self {
            roh: roh.to_string(),
            status,
            sektionen,
        }
    }

    /// Synthetische Erfolgs-Antwort (fuer lokale Zustandsuebergaenge)
    pub fn ok() -> Self {
        Self::parsen("error id=0 msg=ok")
    }

    /// Gibt den unbearbeiteten Rohtext zurueck
    pub fn rohtext(&self) -> &str {
        &self.roh
    }

    /// Numerische Status-ID (`0` = Erfolg), `None` wenn keine Statuszeile
    /// empfangen wurde (z.B. Zeitbudget abgelaufen)
    pub fn id(&self) -> Option<i32> {
        self.status.ganzzahl("id")
    }

    /// True wenn die Antwort den Erfolgs-Status traegt
    pub fn ist_ok(&self) -> bool {
        self.id() == Some(0)
    }

    /// Fehlermeldung der Statuszeile
    pub fn nachricht(&self) -> Option<&str> {
        self.status.wert("msg")
    }

    /// Optionale Zusatzmeldung der Statuszeile
    pub fn zusatz_nachricht(&self) -> Option<&str> {
        self.status.wert("extra_msg")
    }

    /// Alle Sektionen der Antwort
    pub fn sektionen(&self) -> &[AntwortSektion] {
        &self.sektionen
    }

    /// True wenn mindestens eine Sektion vorhanden ist
    pub fn hat_sektionen(&self) -> bool {
        !self.sektionen.is_empty()
    }

    /// Erste Gruppe der ersten Sektion (haeufigster Zugriffspfad bei
    /// Einzelergebnis-Abfragen wie `channelfind` oder `clientinfo`)
    pub fn erste_gruppe(&self) -> Option<&AntwortGruppe> {
        self.sektionen.first()?.gruppen().first()
    }

    /// Iteriert ueber alle Gruppen aller Sektionen
    pub fn alle_gruppen(&self) -> impl Iterator<Item = &AntwortGruppe> {
        self.sektionen.iter().flat_map(|s| s.gruppen().iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_ohne_sektionen() {
        let antwort = TsAntwort::parsen("error id=0 msg=ok\n\r");
        assert_eq!(antwort.id(), Some(0));
        assert!(antwort.ist_ok());
        assert_eq!(antwort.nachricht(), Some("ok"));
        assert!(!antwort.hat_sektionen());
    }

    #[test]
    fn fehler_status_mit_escaptem_text() {
        let antwort =
            TsAntwort::parsen("error id=520 msg=invalid\\sloginname\\sor\\spassword\n\r");
        assert_eq!(antwort.id(), Some(520));
        assert!(!antwort.ist_ok());
        assert_eq!(antwort.nachricht(), Some("invalid loginname or password"));
        assert_eq!(antwort.zusatz_nachricht(), None);
    }

    #[test]
    fn zusatz_nachricht_wird_gelesen() {
        let antwort = TsAntwort::parsen(
            "error id=3331 msg=flood\\sban extra_msg=you\\smay\\sretry\\sin\\s600\\sseconds\n\r",
        );
        assert_eq!(antwort.id(), Some(3331));
        assert_eq!(
            antwort.zusatz_nachricht(),
            Some("you may retry in 600 seconds")
        );
    }

    #[test]
    fn clientlist_antwort_mit_gruppen() {
        let roh = "clid=1 cid=5 client_nickname=Hans|clid=2 cid=5 client_nickname=Eva\n\r\
                   error id=0 msg=ok\n\r";
        let antwort = TsAntwort::parsen(roh);
        assert!(antwort.ist_ok());
        assert_eq!(antwort.sektionen().len(), 1);
        let gruppen = antwort.sektionen()[0].gruppen();
        assert_eq!(gruppen.len(), 2);
        assert_eq!(gruppen[0].ganzzahl("clid"), Some(1));
        assert_eq!(gruppen[1].wert("client_nickname"), Some("Eva"));
    }

    #[test]
    fn doppelter_key_letzter_gewinnt() {
        let gruppe = AntwortGruppe::parsen("cid=1 cid=2 name=x");
        assert_eq!(gruppe.ganzzahl("cid"), Some(2));
    }

    #[test]
    fn fragmente_ohne_gleichheitszeichen_werden_verworfen() {
        let gruppe = AntwortGruppe::parsen("kaputt cid=7 nochkaputt");
        assert_eq!(gruppe.ganzzahl("cid"), Some(7));
        assert_eq!(gruppe.wert("kaputt"), None);
    }

    #[test]
    fn wert_mit_gleichheitszeichen_bleibt_ganz() {
        // Abtrennung am ERSTEN '='
        let gruppe = AntwortGruppe::parsen("client_meta_data=a=b");
        assert_eq!(gruppe.wert("client_meta_data"), Some("a=b"));
    }

    #[test]
    fn ganzzahl_fehlt_und_unparsebar_sind_gleich() {
        let gruppe = AntwortGruppe::parsen("cid=abc");
        assert_eq!(gruppe.ganzzahl("cid"), None);
        assert_eq!(gruppe.ganzzahl("nicht_da"), None);
    }

    #[test]
    fn schalter_werte() {
        let gruppe = AntwortGruppe::parsen("a=1 b=0 c=ja");
        assert_eq!(gruppe.schalter("a"), Some(true));
        assert_eq!(gruppe.schalter("b"), Some(false));
        assert_eq!(gruppe.schalter("c"), None);
    }

    #[test]
    fn teilantwort_ohne_status() {
        // Zeitbudget abgelaufen bevor die Statuszeile ankam
        let antwort = TsAntwort::parsen("clid=1 cid=5\n\r");
        assert_eq!(antwort.id(), None);
        assert!(!antwort.ist_ok());
        assert!(antwort.hat_sektionen());
    }

    #[test]
    fn erste_gruppe_zugriff() {
        let antwort = TsAntwort::parsen("cid=42 channel_name=Lobby\n\rerror id=0 msg=ok\n\r");
        let gruppe = antwort.erste_gruppe().expect("Gruppe vorhanden");
        assert_eq!(gruppe.ganzzahl("cid"), Some(42));
        assert_eq!(gruppe.wert("channel_name"), Some("Lobby"));
    }

    #[test]
    fn synthetisches_ok() {
        assert!(TsAntwort::ok().ist_ok());
    }
}
