//! Presentation shells.
//!
//! [`SingleShot`] runs the pipeline once and hands the result to a
//! [`DisplaySurface`]; every failure ends the run. [`InteractiveShell`] is
//! driven by [`UserIntent`] events from a GUI and survives per-image
//! failures, keeping the last good result on screen.

use std::fmt;
use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::classifier::Classifier;
use crate::config::{DiagnosisConfig, ScaleRule};
use crate::diagnosis::{Diagnosis, CONFIDENCE_PREFIX, DIAGNOSIS_PREFIX};
use crate::error::{DiagnosisError, Result};
use crate::loader;
use crate::pipeline::{DiagnosisPipeline, RenderedDiagnosis};

pub const WINDOW_TITLE: &str = "Pneumonia Diagnosis";

pub const RESULT_WINDOW_TITLE: &str = "Result - Pneumonia Diagnosis";

/// Somewhere a rendered diagnosis can be shown.
pub trait DisplaySurface {
    /// Shows `image`, returning once the user is done with it.
    fn show(&mut self, title: &str, image: &RgbImage) -> Result<()>;
}

impl DisplaySurface for Vec<Box<dyn DisplaySurface>> {
    fn show(&mut self, title: &str, image: &RgbImage) -> Result<()> {
        for surface in self.iter_mut() {
            surface.show(title, image)?;
        }
        Ok(())
    }
}

/// Writes the rendered image to a file, format chosen by extension.
pub struct FileSurface {
    path: PathBuf,
}

impl FileSurface {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSurface { path: path.into() }
    }
}

impl DisplaySurface for FileSurface {
    fn show(&mut self, _title: &str, image: &RgbImage) -> Result<()> {
        image
            .save(&self.path)
            .map_err(|e| DiagnosisError::Ui(format!("cannot write {}: {e}", self.path.display())))?;
        log::info!("Saved annotated image to {}", self.path.display());
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SingleShotState {
    Init,
    ModelLoaded,
    ImageLoaded,
    Preprocessed,
    Classified,
    Rendered,
    Displayed,
    Terminated,
}

impl fmt::Display for SingleShotState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One pass from model load to display. The caller owns the exit policy:
/// `run` returns the first error instead of exiting.
pub struct SingleShot<'a> {
    config: &'a DiagnosisConfig,
    state: SingleShotState,
    history: Vec<SingleShotState>,
}

impl<'a> SingleShot<'a> {
    pub fn new(config: &'a DiagnosisConfig) -> Self {
        SingleShot {
            config,
            state: SingleShotState::Init,
            history: vec![SingleShotState::Init],
        }
    }

    pub fn state(&self) -> SingleShotState {
        self.state
    }

    /// Every state visited so far, starting with `Init`.
    pub fn history(&self) -> &[SingleShotState] {
        &self.history
    }

    pub fn run<C, L, D>(
        &mut self,
        load_model: L,
        image_path: &Path,
        surface: &mut D,
    ) -> Result<Diagnosis>
    where
        C: Classifier,
        L: FnOnce(&DiagnosisConfig) -> Result<DiagnosisPipeline<C>>,
        D: DisplaySurface + ?Sized,
    {
        let outcome = self.drive(load_model, image_path, surface);
        if let Err(err) = &outcome {
            log::error!("Stopping in state {}: {err}", self.state);
        }
        self.advance(SingleShotState::Terminated);
        outcome
    }

    fn drive<C, L, D>(
        &mut self,
        load_model: L,
        image_path: &Path,
        surface: &mut D,
    ) -> Result<Diagnosis>
    where
        C: Classifier,
        L: FnOnce(&DiagnosisConfig) -> Result<DiagnosisPipeline<C>>,
        D: DisplaySurface + ?Sized,
    {
        let pipeline = load_model(self.config)?;
        self.advance(SingleShotState::ModelLoaded);

        let image = loader::load(image_path)?;
        self.advance(SingleShotState::ImageLoaded);

        let tensor = pipeline.preprocessor().preprocess(&image)?;
        self.advance(SingleShotState::Preprocessed);

        let diagnosis = pipeline.adapter().classify(tensor)?;
        self.advance(SingleShotState::Classified);
        println!("{}", diagnosis.console_report());

        let rendered = pipeline
            .renderer()
            .render(&image, &diagnosis, self.config.single_shot_scale);
        self.advance(SingleShotState::Rendered);

        surface.show(RESULT_WINDOW_TITLE, &rendered)?;
        self.advance(SingleShotState::Displayed);
        Ok(diagnosis)
    }

    fn advance(&mut self, next: SingleShotState) {
        log::debug!("single-shot: {} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShellState {
    Idle,
    Processing,
    Terminated,
}

/// What the user asked the GUI to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserIntent {
    FileChosen(PathBuf),
    DialogCancelled,
    CloseRequested,
}

/// What the GUI should do in response to an intent.
#[derive(Debug)]
pub enum ShellEffect {
    /// Nothing on screen changes.
    Unchanged,
    /// A new result is available from [`InteractiveShell::current`].
    ShowResult,
    /// Report the error in a dialog; the previous result stays visible.
    ShowError(DiagnosisError),
    Exit,
}

pub struct InteractiveShell<C> {
    pipeline: DiagnosisPipeline<C>,
    scale: ScaleRule,
    state: ShellState,
    current: Option<RenderedDiagnosis>,
}

impl<C: Classifier> InteractiveShell<C> {
    /// Loads the model. A failure here is fatal for the GUI.
    pub fn start<L>(config: &DiagnosisConfig, load_model: L) -> Result<Self>
    where
        L: FnOnce(&DiagnosisConfig) -> Result<DiagnosisPipeline<C>>,
    {
        let pipeline = load_model(config)?;
        Ok(InteractiveShell {
            pipeline,
            scale: config.interactive_scale,
            state: ShellState::Idle,
            current: None,
        })
    }

    pub fn state(&self) -> ShellState {
        self.state
    }

    pub fn current(&self) -> Option<&RenderedDiagnosis> {
        self.current.as_ref()
    }

    /// Text for the diagnosis and confidence labels.
    pub fn labels(&self) -> (String, String) {
        match &self.current {
            Some(rendered) => (
                rendered.diagnosis.diagnosis_line(),
                rendered.diagnosis.confidence_line(),
            ),
            None => (DIAGNOSIS_PREFIX.to_string(), CONFIDENCE_PREFIX.to_string()),
        }
    }

    pub fn handle(&mut self, intent: UserIntent) -> ShellEffect {
        if self.state == ShellState::Terminated {
            return ShellEffect::Unchanged;
        }
        match intent {
            UserIntent::DialogCancelled => ShellEffect::Unchanged,
            UserIntent::CloseRequested => {
                log::info!("Window closed");
                self.state = ShellState::Terminated;
                ShellEffect::Exit
            }
            UserIntent::FileChosen(path) => {
                self.state = ShellState::Processing;
                let outcome = self.pipeline.run(&path, self.scale);
                self.state = ShellState::Idle;
                match outcome {
                    Ok(rendered) => {
                        self.current = Some(rendered);
                        ShellEffect::ShowResult
                    }
                    Err(err) => {
                        log::warn!("{err}");
                        ShellEffect::ShowError(err)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::InputTensor;
    use crate::render::ResultRenderer;
    use image::Rgb;

    struct Constant;

    impl Classifier for Constant {
        fn predict(&self, _input: InputTensor) -> Result<Vec<f32>> {
            Ok(vec![0.25, 0.75])
        }
    }

    struct Recorder(Vec<(String, (u32, u32))>);

    impl DisplaySurface for Recorder {
        fn show(&mut self, title: &str, image: &RgbImage) -> Result<()> {
            self.0.push((title.to_string(), image.dimensions()));
            Ok(())
        }
    }

    fn pipeline(config: &DiagnosisConfig) -> Result<DiagnosisPipeline<Constant>> {
        let renderer = ResultRenderer::without_font(config.classes.clone(), config.render.clone());
        Ok(DiagnosisPipeline::with_renderer(config, Constant, renderer))
    }

    #[test]
    fn single_shot_walks_every_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xray.png");
        RgbImage::from_pixel(370, 170, Rgb([90, 90, 90]))
            .save(&path)
            .unwrap();

        let config = DiagnosisConfig::default();
        let mut shell = SingleShot::new(&config);
        let mut recorder = Recorder(Vec::new());
        let diagnosis = shell.run(pipeline, &path, &mut recorder).unwrap();

        assert_eq!(diagnosis.label, "NORMAL");
        assert_eq!(
            recorder.0,
            vec![(RESULT_WINDOW_TITLE.to_string(), (800, 400))]
        );
        use SingleShotState::*;
        assert_eq!(
            shell.history(),
            &[Init, ModelLoaded, ImageLoaded, Preprocessed, Classified, Rendered, Displayed, Terminated]
        );
    }

    #[test]
    fn single_shot_stops_at_missing_image() {
        let dir = tempfile::tempdir().unwrap();
        let config = DiagnosisConfig::default();
        let mut shell = SingleShot::new(&config);
        let mut recorder = Recorder(Vec::new());
        let result = shell.run(pipeline, &dir.path().join("nope.jpg"), &mut recorder);

        assert!(matches!(result, Err(DiagnosisError::MissingImage { .. })));
        assert!(recorder.0.is_empty());
        assert_eq!(shell.state(), SingleShotState::Terminated);
        assert!(!shell.history().contains(&SingleShotState::ImageLoaded));
    }

    #[test]
    fn cancelled_dialog_changes_nothing() {
        let config = DiagnosisConfig::default();
        let mut shell = InteractiveShell::start(&config, pipeline).unwrap();
        let before = shell.labels();
        assert!(matches!(
            shell.handle(UserIntent::DialogCancelled),
            ShellEffect::Unchanged
        ));
        assert_eq!(shell.state(), ShellState::Idle);
        assert_eq!(shell.labels(), before);
        assert_eq!(before.0, "Diagnosis: ");
        assert!(shell.current().is_none());
    }

    #[test]
    fn close_terminates_the_loop() {
        let config = DiagnosisConfig::default();
        let mut shell = InteractiveShell::start(&config, pipeline).unwrap();
        assert!(matches!(shell.handle(UserIntent::CloseRequested), ShellEffect::Exit));
        assert_eq!(shell.state(), ShellState::Terminated);
        assert!(matches!(
            shell.handle(UserIntent::DialogCancelled),
            ShellEffect::Unchanged
        ));
    }
}
