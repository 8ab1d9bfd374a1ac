use std::path::PathBuf;

use clap::Parser;
use eframe::egui;

use pneumonia_diagnosis::shell::WINDOW_TITLE;
use pneumonia_diagnosis::{
    DiagnosisConfig, DiagnosisPipeline, InteractiveShell, ShellEffect, TractClassifier, UserIntent,
};

/// Desktop front end: pick X-ray images one after another and see each diagnosis.
#[derive(Debug, Parser)]
#[command(name = "diagnose_gui", version)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// ONNX model, overrides the configured path
    #[arg(short, long)]
    model: Option<PathBuf>,
}

struct DiagnosisApp {
    shell: InteractiveShell<TractClassifier>,
    texture: Option<egui::TextureHandle>,
}

impl DiagnosisApp {
    fn apply(&mut self, ctx: &egui::Context, intent: UserIntent) {
        match self.shell.handle(intent) {
            ShellEffect::Unchanged => {}
            ShellEffect::ShowResult => {
                if let Some(rendered) = self.shell.current() {
                    let (width, height) = rendered.image.dimensions();
                    let pixels = egui::ColorImage::from_rgb(
                        [width as usize, height as usize],
                        rendered.image.as_raw(),
                    );
                    self.texture =
                        Some(ctx.load_texture("diagnosis", pixels, egui::TextureOptions::LINEAR));
                }
            }
            ShellEffect::ShowError(err) => show_error(&err.to_string()),
            ShellEffect::Exit => ctx.send_viewport_cmd(egui::ViewportCommand::Close),
        }
    }
}

impl eframe::App for DiagnosisApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if ctx.input(|i| i.viewport().close_requested()) {
            self.shell.handle(UserIntent::CloseRequested);
        }

        let mut select_clicked = false;
        let (diagnosis_text, confidence_text) = self.shell.labels();
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(20.0);
                ui.heading("Pneumonia Diagnosis System");
                ui.add_space(10.0);
                if let Some(texture) = &self.texture {
                    ui.add(egui::Image::new(egui::load::SizedTexture::from_handle(texture)));
                }
                ui.add_space(20.0);
                select_clicked = ui
                    .button(egui::RichText::new("Select Image").size(16.0))
                    .clicked();
                ui.add_space(10.0);
                ui.label(egui::RichText::new(diagnosis_text).size(18.0));
                ui.label(egui::RichText::new(confidence_text).size(18.0));
            });
        });

        if select_clicked {
            let intent = pick_image();
            self.apply(ctx, intent);
        }
    }
}

fn pick_image() -> UserIntent {
    let mut dialog = rfd::FileDialog::new()
        .set_title("Select an image")
        .add_filter("Images", &["jpg", "jpeg", "png"]);
    if let Some(home) = dirs::home_dir() {
        dialog = dialog.set_directory(home);
    }
    match dialog.pick_file() {
        Some(path) => UserIntent::FileChosen(path),
        None => UserIntent::DialogCancelled,
    }
}

fn show_error(message: &str) {
    rfd::MessageDialog::new()
        .set_level(rfd::MessageLevel::Error)
        .set_title("Error")
        .set_description(message)
        .set_buttons(rfd::MessageButtons::Ok)
        .show();
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = DiagnosisConfig::load(args.config.as_deref()).map(|config| match args.model {
        Some(model) => config.with_model_path(model),
        None => config,
    });
    let shell = match config.and_then(|config| {
        InteractiveShell::start(&config, DiagnosisPipeline::from_config)
    }) {
        Ok(shell) => shell,
        Err(err) => {
            log::error!("{err}");
            show_error(&err.to_string());
            std::process::exit(1);
        }
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size([900.0, 700.0]),
        ..Default::default()
    };
    let app = DiagnosisApp {
        shell,
        texture: None,
    };
    if let Err(err) = eframe::run_native(WINDOW_TITLE, options, Box::new(|_cc| Box::new(app))) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
