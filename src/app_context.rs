use std::time::Duration;
use egui::{CentralPanel, Color32, Context, ProgressBar, RichText, TopBottomPanel};
use eframe::Frame;
use log::{error, warn};

use crate::ingestor::SampleIngestor;
use crate::readout::Readout;
use crate::settings::Settings;

const REPAINT_INTERVAL: Duration = Duration::from_millis(100);

pub struct AppContext {
    settings: Settings,
    readout: Readout,
    ingestor: SampleIngestor,
    source_name: String,
}

impl AppContext {
    pub fn new(settings: Settings, ingestor: SampleIngestor, source_name: String) -> Self {
        Self {
            readout: Readout::new(settings.unit),
            settings,
            ingestor,
            source_name,
        }
    }

    fn toggle_tracking(&mut self) {
        if self.readout.is_busy() {
            self.readout.request_stop();
            if let Err(error) = self.ingestor.stop() {
                error!("Failed to send stop command: {}", error);
            }
        } else {
            let session = self.readout.request_start();
            if let Err(error) = self.ingestor.start(session) {
                error!("Failed to send start command: {}", error);
                self.readout.request_stop();
            }
        }
    }

    fn toggle_unit(&mut self) {
        self.settings.unit = self.readout.toggle_unit();
        if let Err(error) = self.settings.save() {
            warn!("Could not save settings: {}", error);
        }
    }
}

impl eframe::App for AppContext {
    fn update(&mut self, ctx: &Context, _frame: &mut Frame) {
        while let Some(message) = self.ingestor.recv_message() {
            self.readout.apply(&message);
        }

        let view = self.readout.view();
        let mut tracking_clicked = false;
        let mut unit_clicked = false;

        // Draw top bar
        TopBottomPanel::top("title_bar").show(ctx, |ui| {
            ui.vertical(|ui| {
                ui.heading("GPS Speedo");
                ui.label(format!("Source: {}", self.source_name));

                if let Some(error) = &view.error_message {
                    ui.colored_label(Color32::RED, error.as_str());
                }
                ui.add_space(2.0);
            });
        });

        // Draw readout
        CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(16.0);
                ui.label(RichText::new(&view.display_speed_text).size(72.0).strong());
                ui.label(RichText::new(view.unit).size(20.0));

                ui.add_space(16.0);
                ui.label(format!("Accuracy: {}", view.accuracy_text));
                ui.add(
                    ProgressBar::new((view.signal_quality_percent / 100.0) as f32)
                        .text(format!("Signal {:.0}%", view.signal_quality_percent)),
                );

                ui.add_space(16.0);
                let tracking_label = if self.readout.is_busy() { "Stop" } else { "Start" };
                if ui.button(tracking_label).clicked() {
                    tracking_clicked = true;
                }
                let unit_label = format!("Show {}", self.readout.unit().toggle().label());
                if ui.button(unit_label).clicked() {
                    unit_clicked = true;
                }
            });
        });

        if tracking_clicked {
            self.toggle_tracking();
        }
        if unit_clicked {
            self.toggle_unit();
        }

        ctx.request_repaint_after(REPAINT_INTERVAL);
    }
}
