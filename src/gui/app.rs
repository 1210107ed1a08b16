use crate::input::{self, Hotkey};
use crate::player::config::{SPEED_RANGE, SPEED_STEP, TRANSPOSE_RANGE};
use crate::player::{Articulation, PlaybackSettings, Player, StartError, Status};
use eframe::egui;
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::time::Duration;

const STATUS_COLOR: egui::Color32 = egui::Color32::from_rgb(90, 160, 255);

/// Control panel: file picker, mapping parameters, speed and start/stop.
pub struct MidiKeysApp {
    player: Player,
    settings: PlaybackSettings,
    path_text: String,
    speed: f64,
    status: Status,
    error: Option<(String, String)>,
    hotkeys: Receiver<Hotkey>,
}

impl MidiKeysApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        Self::with_player(cc, Player::default())
    }

    pub fn with_player(cc: &eframe::CreationContext<'_>, player: Player) -> Self {
        let (hotkey_tx, hotkey_rx) = std::sync::mpsc::channel();
        let ctx = cc.egui_ctx.clone();
        if let Err(e) = input::spawn_listener(hotkey_tx, move || ctx.request_repaint()) {
            log::warn!("Global hotkeys unavailable: {}", e);
        }

        let speed = player.speed().get();
        Self {
            player,
            settings: PlaybackSettings::default(),
            path_text: String::new(),
            speed,
            status: Status::Idle,
            error: None,
            hotkeys: hotkey_rx,
        }
    }

    fn start(&mut self) {
        self.settings.path = PathBuf::from(self.path_text.trim());
        match self.player.start(&self.settings) {
            Ok(()) => {}
            // Reported through the status channel
            Err(StartError::AlreadyPlaying) => {}
            Err(StartError::MissingFile) => {
                self.error = Some(("Missing file".into(), StartError::MissingFile.to_string()));
            }
            Err(e) => {
                log::error!("{}", e);
                self.status = Status::Error(e.to_string());
            }
        }
    }

    fn browse(&mut self) {
        let picked = rfd::FileDialog::new()
            .set_title("Select MIDI file")
            .add_filter("MIDI files", &["mid", "midi"])
            .add_filter("All files", &["*"])
            .pick_file();
        if let Some(path) = picked {
            self.path_text = path.display().to_string();
        }
    }

    fn handle_events(&mut self) {
        let hotkeys: Vec<Hotkey> = self.hotkeys.try_iter().collect();
        for hotkey in hotkeys {
            match hotkey {
                Hotkey::Start => self.start(),
                Hotkey::Stop => self.player.stop(),
            }
        }

        let updates: Vec<Status> = self.player.poll_status().collect();
        for status in updates {
            if let Status::Error(message) = &status {
                self.error = Some(("MIDI error".into(), message.clone()));
            }
            self.status = status;
        }
    }

    fn render_controls(&mut self, ui: &mut egui::Ui) {
        let playing = self.player.is_playing();

        egui::Grid::new("controls")
            .num_columns(3)
            .spacing([8.0, 8.0])
            .show(ui, |ui| {
                ui.label("MIDI file:");
                ui.add(egui::TextEdit::singleline(&mut self.path_text).desired_width(320.0));
                if ui.button("Browse...").clicked() {
                    self.browse();
                }
                ui.end_row();

                ui.label("DO MIDI (A = do, Q = do'):");
                ui.add(egui::DragValue::new(&mut self.settings.reference_note).clamp_range(0..=127));
                ui.end_row();

                ui.label("Transpose (semitones):");
                ui.add(
                    egui::DragValue::new(&mut self.settings.transpose)
                        .clamp_range(TRANSPOSE_RANGE),
                );
                ui.end_row();

                ui.label("Speed (drag while playing):");
                let slider = egui::Slider::new(&mut self.speed, SPEED_RANGE)
                    .step_by(SPEED_STEP)
                    .fixed_decimals(2);
                if ui.add(slider).changed() {
                    self.player.speed().set(self.speed);
                }
                ui.label(format!("Speed: {:.2}×", 1.0 / self.speed));
                ui.end_row();

                ui.label("Keys:");
                ui.horizontal(|ui| {
                    ui.radio_value(&mut self.settings.articulation, Articulation::Hold, "Hold");
                    ui.radio_value(&mut self.settings.articulation, Articulation::Tap, "Tap");
                });
                ui.end_row();
            });

        ui.add_space(12.0);
        ui.horizontal(|ui| {
            let can_start = !playing && !self.path_text.trim().is_empty();
            if ui.add_enabled(can_start, egui::Button::new("Start (F4)")).clicked() {
                self.start();
            }
            if ui.add_enabled(playing, egui::Button::new("Stop (F3)")).clicked() {
                self.player.stop();
            }
        });

        ui.add_space(12.0);
        ui.colored_label(STATUS_COLOR, self.status.to_string());
    }

    fn render_error(&mut self, ctx: &egui::Context) {
        let Some((title, message)) = &self.error else {
            return;
        };
        let mut dismissed = false;
        egui::Window::new(title.as_str())
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(message.as_str());
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });
        if dismissed {
            self.error = None;
        }
    }
}

impl eframe::App for MidiKeysApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_events();

        egui::CentralPanel::default().show(ctx, |ui| {
            self.render_controls(ui);
        });
        self.render_error(ctx);

        // Status updates arrive from the playback thread without waking us
        let poll = if self.player.is_playing() { 50 } else { 250 };
        ctx.request_repaint_after(Duration::from_millis(poll));
    }
}
