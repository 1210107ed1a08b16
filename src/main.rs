use eframe::egui;
use midikeys::gui::MidiKeysApp;

fn main() -> eframe::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Starting midikeys");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([600.0, 300.0])
            .with_title("MIDI → Lute Keys (F4 Play / F3 Stop)"),
        ..Default::default()
    };

    eframe::run_native(
        "midikeys",
        options,
        Box::new(|cc| Box::new(MidiKeysApp::new(cc))),
    )
}
