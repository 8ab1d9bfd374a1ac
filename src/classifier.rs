use std::path::Path;

use tract_onnx::prelude::*;

use crate::config::ClassSet;
use crate::diagnosis::Diagnosis;
use crate::error::{DiagnosisError, Result};
use crate::pipeline::InputTensor;

/// Black-box inference engine: one tensor in, one score per class out.
pub trait Classifier {
    fn predict(&self, input: InputTensor) -> Result<Vec<f32>>;
}

type TractSimplePlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// An ONNX model run through tract.
pub struct TractClassifier {
    model: TractSimplePlan,
}

impl TractClassifier {
    /// Loads and optimizes the model at `path` for a fixed input shape.
    pub fn load(path: &Path, input_shape: &[usize]) -> Result<Self> {
        if !path.is_file() {
            return Err(DiagnosisError::MissingModel {
                path: path.to_path_buf(),
            });
        }
        let input_shape: TVec<usize> = input_shape.iter().copied().collect();
        let model = Self::build_plan(path, input_shape).map_err(|e| DiagnosisError::ModelLoad {
            path: path.to_path_buf(),
            message: format!("{e:#}"),
        })?;
        log::info!("Loaded model {}", path.display());
        Ok(TractClassifier { model })
    }

    fn build_plan(path: &Path, input_shape: TVec<usize>) -> TractResult<TractSimplePlan> {
        tract_onnx::onnx()
            .model_for_path(path)?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), input_shape))?
            .into_optimized()?
            .into_runnable()
    }
}

impl Classifier for TractClassifier {
    fn predict(&self, input: InputTensor) -> Result<Vec<f32>> {
        let result = self
            .model
            .run(tvec!(input.into_inner()))
            .map_err(|e| DiagnosisError::Inference(format!("{e:#}")))?;
        let output = result
            .first()
            .ok_or_else(|| DiagnosisError::Inference("model produced no outputs".to_string()))?;
        let scores: Vec<f32> = output
            .to_array_view::<f32>()
            .map_err(|e| DiagnosisError::Inference(format!("{e:#}")))?
            .iter()
            .cloned()
            .collect();
        Ok(scores)
    }
}

/// Index of the largest score. Ties go to the lowest index; NaN never wins.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((index, score)),
        }
    }
    best.map(|(index, _)| index)
}

/// Turns raw model scores into a [`Diagnosis`].
pub struct ClassifierAdapter<C> {
    model: C,
    classes: ClassSet,
}

impl<C: Classifier> ClassifierAdapter<C> {
    pub fn new(model: C, classes: ClassSet) -> Self {
        ClassifierAdapter { model, classes }
    }

    pub fn classes(&self) -> &ClassSet {
        &self.classes
    }

    pub fn classify(&self, input: InputTensor) -> Result<Diagnosis> {
        let scores = self.model.predict(input)?;
        if scores.len() != self.classes.len() {
            return Err(DiagnosisError::Inference(format!(
                "model produced {} scores for {} classes",
                scores.len(),
                self.classes.len()
            )));
        }
        let index = argmax(&scores).ok_or_else(|| {
            DiagnosisError::Inference("prediction has no comparable scores".to_string())
        })?;
        let entry = self.classes.get(index).ok_or_else(|| {
            DiagnosisError::Inference(format!("class index {index} is out of range"))
        })?;
        log::debug!("Scores {:?} -> {}", scores, entry.label);
        Ok(Diagnosis {
            index,
            label: entry.label.clone(),
            confidence: scores[index],
        })
    }
}
