// ONNX Runtime hidden-state model

use std::borrow::Cow;
use std::path::Path;
use std::sync::Mutex;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionInputValue};
use ort::value::Tensor;
use tracing::{debug, info};

use super::{HiddenStateModel, HiddenStates, TokenBatch};
use crate::{RecipeError, Result};

const INPUT_IDS: &str = "input_ids";
const ATTENTION_MASK: &str = "attention_mask";
const TOKEN_TYPE_IDS: &str = "token_type_ids";
const PREFERRED_OUTPUT: &str = "last_hidden_state";

fn backend_error(context: &str, error: impl std::fmt::Display) -> RecipeError {
    RecipeError::EncodingBackend(format!("{}: {}", context, error))
}

/// Transformer exported to ONNX, producing `[batch, seq, hidden]` states
pub struct OnnxModel {
    session: Mutex<Session>,
    input_names: Vec<String>,
    output_name: String,
}

impl OnnxModel {
    #[inline]
    pub fn load(path: &Path, intra_threads: usize, inter_threads: usize) -> Result<Self> {
        info!("Loading ONNX model from {:?}", path);

        let session = Session::builder()
            .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|builder| builder.with_intra_threads(intra_threads))
            .and_then(|builder| builder.with_inter_threads(inter_threads))
            .and_then(|builder| builder.commit_from_file(path))
            .map_err(|e| {
                RecipeError::Config(format!(
                    "Failed to load ONNX model {}: {}",
                    path.display(),
                    e
                ))
            })?;

        let input_names: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name == PREFERRED_OUTPUT)
            .or_else(|| session.outputs.first())
            .map(|o| o.name.clone())
            .ok_or_else(|| RecipeError::Config("ONNX model declares no outputs".to_string()))?;

        debug!(
            "ONNX model inputs {:?}, reading output '{}'",
            input_names, output_name
        );

        Ok(Self {
            session: Mutex::new(session),
            input_names,
            output_name,
        })
    }

    fn input_tensor(name: &str, batch: &TokenBatch) -> Option<Vec<i64>> {
        match name {
            INPUT_IDS => Some(batch.input_ids.clone()),
            ATTENTION_MASK => Some(batch.attention_mask.clone()),
            TOKEN_TYPE_IDS => Some(batch.token_type_ids.clone()),
            _ => None,
        }
    }
}

impl HiddenStateModel for OnnxModel {
    fn forward(&self, batch: &TokenBatch) -> Result<HiddenStates> {
        let shape = [batch.batch_size, batch.seq_len];

        let mut inputs: Vec<(Cow<'_, str>, SessionInputValue<'_>)> =
            Vec::with_capacity(self.input_names.len());
        for name in &self.input_names {
            let data = Self::input_tensor(name, batch).ok_or_else(|| {
                RecipeError::EncodingBackend(format!("Unsupported model input '{}'", name))
            })?;
            let tensor = Tensor::from_array((shape, data))
                .map_err(|e| backend_error("Failed to build input tensor", e))?;
            inputs.push((Cow::Borrowed(name.as_str()), tensor.into()));
        }

        let mut session = self
            .session
            .lock()
            .map_err(|_| RecipeError::EncodingBackend("ONNX session lock poisoned".to_string()))?;
        let outputs = session
            .run(inputs)
            .map_err(|e| backend_error("Inference failed", e))?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            RecipeError::EncodingBackend(format!("Missing model output '{}'", self.output_name))
        })?;
        let (dims, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| backend_error("Failed to read hidden states", e))?;

        if dims.len() != 3 {
            return Err(RecipeError::EncodingBackend(format!(
                "Expected a rank-3 output, got shape {:?}",
                dims
            )));
        }

        let to_usize = |value: i64| {
            usize::try_from(value)
                .map_err(|_| RecipeError::EncodingBackend(format!("Invalid output dim {}", value)))
        };

        Ok(HiddenStates {
            data: data.to_vec(),
            batch_size: to_usize(dims[0])?,
            seq_len: to_usize(dims[1])?,
            hidden_size: to_usize(dims[2])?,
        })
    }
}
