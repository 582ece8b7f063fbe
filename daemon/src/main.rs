//! Kanalwart Daemon – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging, startet den
//! Sync-Dienst und laeuft bis Ctrl-C.

use std::sync::Arc;

use anyhow::Result;
use kanalwart_daemon::konfig::DaemonKonfig;
use kanalwart_sync::{ProtokollNachrichter, SyncDienst};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let konfig_pfad =
        std::env::var("KANALWART_CONFIG").unwrap_or_else(|_| "kanalwart.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let konfig = DaemonKonfig::laden(&konfig_pfad)?;

    // Logging initialisieren
    logging_initialisieren(&konfig.logging.level, &konfig.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        konfig = %konfig_pfad,
        "Kanalwart wird initialisiert"
    );

    // Konfiguration einmalig validieren; die Engine arbeitet danach mit
    // bereits geprueften Werten
    konfig
        .sync
        .validieren()
        .map_err(|grund| anyhow::anyhow!("Ungueltige Konfiguration: {grund}"))?;

    // Dienst starten und Synchronisation aktivieren
    let dienst = SyncDienst::starten(konfig.sync, Arc::new(ProtokollNachrichter));
    let handle = dienst.handle();
    handle.aktivieren();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl-C empfangen, Kanalwart wird beendet");
    dienst.stoppen().await;

    Ok(())
}

/// Initialisiert tracing-subscriber mit dem konfigurierten Level und Format
fn logging_initialisieren(level: &str, format: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}
