use std::path::PathBuf;

use clap::Parser;
use image::RgbImage;
use show_image::{event, BoxImage, ImageInfo, WindowOptions};

use pneumonia_diagnosis::{
    DiagnosisConfig, DiagnosisError, DiagnosisPipeline, DisplaySurface, FileSurface, Result,
    SingleShot,
};

/// Classify a chest X-ray as PNEUMONIA or NORMAL and show the annotated image.
#[derive(Debug, Parser)]
#[command(name = "pneumonia-diagnosis", version)]
struct Args {
    /// JPEG or PNG image to classify
    #[arg(default_value = "xray.jpg")]
    image: PathBuf,
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// ONNX model, overrides the configured path
    #[arg(short, long)]
    model: Option<PathBuf>,
    /// Also write the annotated image to this file
    #[arg(short, long)]
    save: Option<PathBuf>,
    /// Do not open a window, only write the --save file
    #[arg(long, requires = "save")]
    no_window: bool,
}

/// Blocking preview window, closed by any key press.
struct WindowSurface;

impl DisplaySurface for WindowSurface {
    fn show(&mut self, title: &str, image: &RgbImage) -> Result<()> {
        let (width, height) = image.dimensions();
        let pixels = BoxImage::new(
            ImageInfo::rgb8(width, height),
            image.as_raw().clone().into_boxed_slice(),
        );

        let window = show_image::create_window(title, WindowOptions::default())
            .map_err(|e| DiagnosisError::Ui(e.to_string()))?;
        window
            .set_image("diagnosis", pixels)
            .map_err(|e| DiagnosisError::Ui(e.to_string()))?;

        // The channel closes when the window is destroyed.
        for event in window.event_channel().map_err(|e| DiagnosisError::Ui(e.to_string()))? {
            if let event::WindowEvent::KeyboardInput(event) = event {
                if !event.is_synthetic && event.input.state.is_pressed() {
                    break;
                }
            }
        }
        Ok(())
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = DiagnosisConfig::load(args.config.as_deref())?;
    if let Some(model) = args.model {
        config = config.with_model_path(model);
    }

    let mut surfaces: Vec<Box<dyn DisplaySurface>> = Vec::new();
    if let Some(path) = args.save {
        surfaces.push(Box::new(FileSurface::new(path)));
    }
    if !args.no_window {
        surfaces.push(Box::new(WindowSurface));
    }

    let mut shell = SingleShot::new(&config);
    shell.run(DiagnosisPipeline::from_config, &args.image, &mut surfaces)?;
    Ok(())
}

#[show_image::main]
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
