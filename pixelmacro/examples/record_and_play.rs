//! Hotkey-driven recorder: F2 starts recording, F4 stops and saves,
//! F8 replays the last macro, F10 cancels a running replay.

use pixelmacro::{
    HotkeyConfig, MacroController, MacroStorage, RdevActuator, RdevListener, RecordingConfig,
    ScreenSampler, XcapScreen,
};
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let sampler = ScreenSampler::new(Arc::new(XcapScreen::new()));
    let controller = Arc::new(MacroController::new(
        sampler,
        Arc::new(RdevActuator::new()),
        RecordingConfig::default(),
        HotkeyConfig::default(),
    ));
    let storage = MacroStorage::new("macros")?;

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let _listener = RdevListener::spawn(tx)?;

    // Print events as they are recorded.
    let live = Arc::clone(&controller);
    tokio::spawn(async move {
        let mut stream = live.event_stream();
        while let Some(event) = stream.next().await {
            info!("Recorded: {:?}", event);
        }
    });

    info!("F2: record, F4: stop recording, F8: play, F10: stop playback. Ctrl+C to quit.");
    let dispatch = Arc::clone(&controller);
    tokio::spawn(async move {
        dispatch.run_dispatch_loop(rx).await;
    });

    tokio::signal::ctrl_c().await?;

    let events = controller.events();
    if !events.is_empty() {
        let path = storage.save(&events, "session")?;
        info!("Saved {} events to {:?}", events.len(), path);
    }
    Ok(())
}
