//! Integrationstests der Query-Verbindung gegen einen geskripteten
//! In-Process-Server

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use kanalwart_core::error::SyncFehler;
use kanalwart_protocol::TsQuery;
use kanalwart_sync::verbindung::{SendeDrossel, TsVerbindung};

const BEGRUESSUNG: &[u8] = b"TS3\n\rWelcome to the TeamSpeak 3 ServerQuery interface\n\r";

/// Startet einen Server der die Begruessung schickt und dann pro
/// empfangenem Datenblock die naechste geskriptete Antwort liefert
/// (Rueckfall: `error id=0 msg=ok`).
async fn mock_server(antworten: Vec<String>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut strom, _) = listener.accept().await.unwrap();
        strom.write_all(BEGRUESSUNG).await.unwrap();
        let mut antworten = antworten.into_iter();
        let mut puffer = vec![0u8; 4096];
        loop {
            match strom.read(&mut puffer).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let antwort = antworten
                .next()
                .unwrap_or_else(|| "error id=0 msg=ok\n\r".to_string());
            if strom.write_all(antwort.as_bytes()).await.is_err() {
                break;
            }
        }
    });
    port
}

#[tokio::test]
async fn oeffnen_und_senden() {
    let port = mock_server(vec![
        "clid=1 cid=5 client_nickname=Hans client_database_id=7|clid=2 cid=5 client_nickname=Eva client_database_id=8\n\rerror id=0 msg=ok\n\r".to_string(),
    ])
    .await;

    let mut verbindung = TsVerbindung::neu(SendeDrossel::aus());
    let antwort = verbindung.oeffnen("127.0.0.1", port).await.unwrap();
    assert!(antwort.ist_ok());
    assert!(verbindung.ist_verbunden());

    let antwort = verbindung.senden(&TsQuery::client_liste()).await.unwrap();
    assert!(antwort.ist_ok());
    let gruppen = antwort.sektionen()[0].gruppen();
    assert_eq!(gruppen.len(), 2);
    assert_eq!(gruppen[1].wert("client_nickname"), Some("Eva"));

    verbindung.schliessen();
    assert!(!verbindung.ist_verbunden());
}

#[tokio::test]
async fn doppeltes_oeffnen_wird_abgelehnt() {
    let port = mock_server(vec![]).await;

    let mut verbindung = TsVerbindung::neu(SendeDrossel::aus());
    verbindung.oeffnen("127.0.0.1", port).await.unwrap();
    let fehler = verbindung.oeffnen("127.0.0.1", port).await.unwrap_err();
    assert!(matches!(fehler, SyncFehler::BereitsVerbunden));

    // Nach dem Schliessen ist die Verbindung wieder frisch verwendbar
    verbindung.schliessen();
    let fehler = verbindung
        .senden(&TsQuery::client_liste())
        .await
        .unwrap_err();
    assert!(matches!(fehler, SyncFehler::NichtVerbunden));
}

#[tokio::test]
async fn begruessung_ohne_banner_schlaegt_fehl() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut strom, _) = listener.accept().await.unwrap();
        let _ = strom.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
        // Verbindung offen halten bis der Client aufgibt
        let mut puffer = [0u8; 16];
        let _ = strom.read(&mut puffer).await;
    });

    let mut verbindung = TsVerbindung::neu(SendeDrossel::aus());
    let fehler = verbindung.oeffnen("127.0.0.1", port).await.unwrap_err();
    assert!(matches!(fehler, SyncFehler::BegruessungUngueltig));
    assert!(!verbindung.ist_verbunden());
}

#[tokio::test]
async fn antwort_in_mehreren_stuecken() {
    // Antwort kommt in drei Haeppchen; die Verbindung akkumuliert bis
    // zur Statuszeile samt Zeilenende
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut strom, _) = listener.accept().await.unwrap();
        strom.write_all(BEGRUESSUNG).await.unwrap();
        let mut puffer = vec![0u8; 4096];
        let _ = strom.read(&mut puffer).await;
        for stueck in [
            "cid=42 channel_name=Lob",
            "by\n\rerror id=0 ",
            "msg=ok\n\r",
        ] {
            strom.write_all(stueck.as_bytes()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let _ = strom.read(&mut puffer).await;
    });

    let mut verbindung = TsVerbindung::neu(SendeDrossel::aus());
    verbindung.oeffnen("127.0.0.1", port).await.unwrap();
    let antwort = verbindung
        .senden(&TsQuery::kanal_suchen("Lobby"))
        .await
        .unwrap();
    assert!(antwort.ist_ok());
    let gruppe = antwort.erste_gruppe().unwrap();
    assert_eq!(gruppe.ganzzahl("cid"), Some(42));
    assert_eq!(gruppe.wert("channel_name"), Some("Lobby"));
}

#[tokio::test]
async fn serverabbruch_schliesst_die_verbindung() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut strom, _) = listener.accept().await.unwrap();
        strom.write_all(BEGRUESSUNG).await.unwrap();
        let mut puffer = vec![0u8; 4096];
        let _ = strom.read(&mut puffer).await;
        // Mitten in der Abfrage: Verbindung weg
        drop(strom);
    });

    let mut verbindung = TsVerbindung::neu(SendeDrossel::aus());
    verbindung.oeffnen("127.0.0.1", port).await.unwrap();
    let fehler = verbindung
        .senden(&TsQuery::client_liste())
        .await
        .unwrap_err();
    assert!(matches!(fehler, SyncFehler::EmpfangFehlgeschlagen(_)));
    // Transportfehler hinterlassen eine frische, getrennte Verbindung
    assert!(!verbindung.ist_verbunden());
}
