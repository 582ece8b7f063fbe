//! Aufbau ausgehender Abfragen
//!
//! Eine [`TsQuery`] ist ein zustandsloses Wertobjekt: Befehlsverb,
//! key/value-Parameter (Reihenfolge der Einfuegung bleibt fuer die
//! Wire-Ausgabe erhalten) und Flag-Optionen. Parameter werden beim
//! Einfuegen escaped.

use crate::escape::ts_escape;

/// Eine ausgehende Abfrage an den Query-Port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsQuery {
    befehl: String,
    /// Bereits escapte key/value-Paare in Einfuegereihenfolge
    parameter: Vec<(String, String)>,
    /// Bereits escapte Optionen (ohne fuehrenden Strich)
    optionen: Vec<String>,
}

impl TsQuery {
    /// Erstellt eine Abfrage mit dem angegebenen Befehlsverb
    pub fn neu(befehl: &str) -> Self {
        Self {
            befehl: befehl.trim().to_string(),
            parameter: Vec::new(),
            optionen: Vec::new(),
        }
    }

    /// Gibt das Befehlsverb zurueck
    pub fn befehl(&self) -> &str {
        &self.befehl
    }

    /// Fuegt ein key/value-Paar hinzu.
    ///
    /// Leere Keys/Werte und doppelte Keys werden ignoriert.
    pub fn parameter_hinzufuegen(&mut self, key: &str, wert: &str) {
        let key = key.trim();
        let wert = wert.trim();
        if key.is_empty() || wert.is_empty() {
            return;
        }
        let key = ts_escape(key);
        if self.parameter.iter().any(|(k, _)| k == &key) {
            return;
        }
        self.parameter.push((key, ts_escape(wert)));
    }

    /// Fuegt eine Flag-Option hinzu (auf dem Wire als `-option`)
    pub fn option_hinzufuegen(&mut self, option: &str) {
        let option = option.trim();
        if !option.is_empty() {
            self.optionen.push(ts_escape(option));
        }
    }

    /// Builder-Variante von [`parameter_hinzufuegen`](Self::parameter_hinzufuegen)
    pub fn mit_parameter(mut self, key: &str, wert: &str) -> Self {
        self.parameter_hinzufuegen(key, wert);
        self
    }

    /// Builder-Variante von [`option_hinzufuegen`](Self::option_hinzufuegen)
    pub fn mit_option(mut self, option: &str) -> Self {
        self.option_hinzufuegen(option);
        self
    }

    /// Rendert die Abfrage als Wire-Zeile inklusive abschliessendem `\n`
    pub fn als_rohtext(&self) -> String {
        let mut zeile = String::from(&self.befehl);
        for (key, wert) in &self.parameter {
            zeile.push(' ');
            zeile.push_str(key);
            zeile.push('=');
            zeile.push_str(wert);
        }
        for option in &self.optionen {
            zeile.push_str(" -");
            zeile.push_str(option);
        }
        zeile.push('\n');
        zeile
    }

    // -----------------------------------------------------------------
    // Vorgefertigte Abfragen
    // -----------------------------------------------------------------

    /// Login als Server-Query-Client
    pub fn login(nutzername: &str, passwort: &str) -> Self {
        Self::neu("login")
            .mit_parameter("client_login_name", nutzername)
            .mit_parameter("client_login_password", passwort)
    }

    /// Nickname des Query-Clients aendern
    pub fn nickname_aendern(nickname: &str) -> Self {
        Self::neu("clientupdate").mit_parameter("client_nickname", nickname)
    }

    /// Liste aller virtuellen Server
    pub fn server_liste() -> Self {
        Self::neu("serverlist")
    }

    /// Virtuellen Server ueber seinen Voice-Port auswaehlen
    pub fn use_port(port: u16) -> Self {
        Self::neu("use").mit_parameter("port", &port.to_string())
    }

    /// Virtuellen Server ueber seine numerische ID auswaehlen
    pub fn use_id(server_id: i32) -> Self {
        Self::neu("use").mit_parameter("sid", &server_id.to_string())
    }

    /// Liste aller Kanaele
    pub fn kanal_liste() -> Self {
        Self::neu("channellist")
    }

    /// Kanal per Namensmuster suchen
    pub fn kanal_suchen(name: &str) -> Self {
        Self::neu("channelfind").mit_parameter("pattern", name)
    }

    /// Detailinformationen eines Kanals
    pub fn kanal_info(kanal_id: i32) -> Self {
        Self::neu("channelinfo").mit_parameter("cid", &kanal_id.to_string())
    }

    /// Kanal loeschen (force raeumt auch belegte Kanaele)
    pub fn kanal_loeschen(kanal_id: i32) -> Self {
        Self::neu("channeldelete")
            .mit_parameter("cid", &kanal_id.to_string())
            .mit_parameter("force", "1")
    }

    /// Liste aller verbundenen Clients
    pub fn client_liste() -> Self {
        Self::neu("clientlist")
    }

    /// Client per Namensmuster suchen
    pub fn client_suchen(name: &str) -> Self {
        Self::neu("clientfind").mit_parameter("pattern", name)
    }

    /// Detailinformationen eines Clients (enthaelt die IP-Adresse)
    pub fn client_info(client_id: i32) -> Self {
        Self::neu("clientinfo").mit_parameter("clid", &client_id.to_string())
    }

    /// Client in einen anderen Kanal verschieben
    pub fn client_verschieben(client_id: i32, kanal_id: i32) -> Self {
        Self::neu("clientmove")
            .mit_parameter("clid", &client_id.to_string())
            .mit_parameter("cid", &kanal_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn einfacher_befehl() {
        assert_eq!(TsQuery::neu("clientlist").als_rohtext(), "clientlist\n");
    }

    #[test]
    fn parameter_in_einfuegereihenfolge() {
        let abfrage = TsQuery::neu("clientmove")
            .mit_parameter("clid", "5")
            .mit_parameter("cid", "12");
        assert_eq!(abfrage.als_rohtext(), "clientmove clid=5 cid=12\n");
    }

    #[test]
    fn werte_werden_escaped() {
        let abfrage = TsQuery::neu("channelcreate").mit_parameter("channel_name", "Team 1");
        assert_eq!(
            abfrage.als_rohtext(),
            "channelcreate channel_name=Team\\s1\n"
        );
    }

    #[test]
    fn optionen_mit_strich() {
        let abfrage = TsQuery::neu("clientlist").mit_option("ip").mit_option("uid");
        assert_eq!(abfrage.als_rohtext(), "clientlist -ip -uid\n");
    }

    #[test]
    fn doppelter_key_wird_ignoriert() {
        let abfrage = TsQuery::neu("use")
            .mit_parameter("port", "9987")
            .mit_parameter("port", "10011");
        assert_eq!(abfrage.als_rohtext(), "use port=9987\n");
    }

    #[test]
    fn leere_keys_und_werte_werden_ignoriert() {
        let abfrage = TsQuery::neu("use")
            .mit_parameter("", "9987")
            .mit_parameter("port", "  ");
        assert_eq!(abfrage.als_rohtext(), "use\n");
    }

    #[test]
    fn vorgefertigter_login() {
        let abfrage = TsQuery::login("admin", "geheimes wort");
        assert_eq!(
            abfrage.als_rohtext(),
            "login client_login_name=admin client_login_password=geheimes\\swort\n"
        );
    }

    #[test]
    fn vorgefertigte_abfragen_verwenden_wire_schluessel() {
        assert_eq!(TsQuery::use_port(9987).als_rohtext(), "use port=9987\n");
        assert_eq!(TsQuery::use_id(3).als_rohtext(), "use sid=3\n");
        assert_eq!(
            TsQuery::kanal_suchen("Lobby").als_rohtext(),
            "channelfind pattern=Lobby\n"
        );
        assert_eq!(TsQuery::client_info(9).als_rohtext(), "clientinfo clid=9\n");
        assert_eq!(
            TsQuery::kanal_loeschen(4).als_rohtext(),
            "channeldelete cid=4 force=1\n"
        );
        assert_eq!(
            TsQuery::nickname_aendern("Kanalwart").als_rohtext(),
            "clientupdate client_nickname=Kanalwart\n"
        );
    }
}
