//! Ausgehende Spieler-Benachrichtigungen
//!
//! Der eigentliche Versand (In-Game-Chat, Yell o.ae.) gehoert dem Host;
//! Kanalwart spricht nur gegen dieses Trait. Eine Raten-Begrenzung der
//! Nachrichten ist Sache des Implementierers.

/// Schnittstelle zum Chat des Spielservers
pub trait SpielNachrichter: Send + Sync {
    /// Sendet eine Nachricht, optional an einen einzelnen Spieler
    fn senden(&self, text: &str, dauer_s: u32, ziel: Option<&str>);
}

/// Standard-Implementierung die Nachrichten nur protokolliert.
///
/// Nuetzlich fuer den Daemon-Betrieb ohne angebundenen Spielserver-Chat
/// und fuer Tests.
#[derive(Debug, Default)]
pub struct ProtokollNachrichter;

impl SpielNachrichter for ProtokollNachrichter {
    fn senden(&self, text: &str, dauer_s: u32, ziel: Option<&str>) {
        match ziel {
            Some(ziel) => tracing::info!(ziel, dauer_s, "Nachricht: {text}"),
            None => tracing::info!(dauer_s, "Nachricht an alle: {text}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Sammelt Nachrichten fuer Assertions
    #[derive(Default)]
    pub struct TestNachrichter {
        pub gesendet: Mutex<Vec<(String, Option<String>)>>,
    }

    impl SpielNachrichter for TestNachrichter {
        fn senden(&self, text: &str, _dauer_s: u32, ziel: Option<&str>) {
            self.gesendet
                .lock()
                .unwrap()
                .push((text.to_string(), ziel.map(String::from)));
        }
    }

    #[test]
    fn test_nachrichter_sammelt() {
        let nachrichter = TestNachrichter::default();
        nachrichter.senden("hallo", 6, Some("Hans"));
        let gesendet = nachrichter.gesendet.lock().unwrap();
        assert_eq!(gesendet.len(), 1);
        assert_eq!(gesendet[0].1.as_deref(), Some("Hans"));
    }
}
