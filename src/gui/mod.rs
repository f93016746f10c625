mod window;

use anyhow::Result;
use gtk4::prelude::*;
use gtk4::{self, glib};
use tracing::{error, info};

use crate::config::Config;
use crate::engine::ChatEngine;
use crate::messages::{EngineMsg, UiMsg};

pub use window::ChatWindow;

pub fn run_gui(config: Config) -> Result<()> {
    let application = gtk4::Application::builder()
        .application_id("com.github.banter")
        .build();

    let config_clone = config.clone();

    application.connect_activate(move |app| {
        if let Err(e) = setup_gui(app, config_clone.clone()) {
            error!("Failed to setup GUI: {}", e);
        }
    });

    application.run_with_args::<String>(&[]);
    Ok(())
}

fn setup_gui(app: &gtk4::Application, config: Config) -> Result<()> {
    // Window -> engine requests and engine -> window updates. The second
    // channel is the only road back to the widgets from background work.
    let (ui_tx, ui_rx) = async_channel::bounded::<UiMsg>(32);
    let (engine_tx, engine_rx) = async_channel::bounded::<EngineMsg>(32);

    let window = ChatWindow::new(app, &config.window, ui_tx.clone());

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create tokio runtime: {}", e))?;

    rt.spawn(async move {
        match ChatEngine::new(&config, ui_rx, engine_tx) {
            Ok(engine) => engine.run().await,
            Err(e) => error!("Failed to create chat engine: {}", e),
        }
    });

    // Drain engine updates on the GTK main thread.
    let window_for_engine = window.clone();
    let app_for_quit = app.clone();
    glib::spawn_future_local(async move {
        while let Ok(msg) = engine_rx.recv().await {
            match msg {
                EngineMsg::Append(sender, text) => {
                    window_for_engine.append(sender.label(), &text);
                }
                EngineMsg::Status(status) => {
                    window_for_engine.set_status(&status);
                }
                EngineMsg::Listening(listening) => {
                    window_for_engine.set_listening(listening);
                }
                EngineMsg::Cleared => {
                    window_for_engine.clear();
                }
            }
        }
        info!("Engine channel closed, quitting application");
        app_for_quit.quit();
    });

    // Window close tears the engine down; the microphone and model handles
    // go with it.
    let ui_tx_quit = ui_tx;
    app.connect_shutdown(move |_| {
        let _ = ui_tx_quit.try_send(UiMsg::Quit);
    });

    window.present();
    window.focus_entry();

    // Leak the runtime so it lives for the process lifetime
    // (GTK Application::run takes control of the main loop)
    std::mem::forget(rt);

    Ok(())
}
