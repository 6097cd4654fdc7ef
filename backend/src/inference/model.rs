use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::backend::ScoringBackend;
use crate::config::ModelConfig;

/// Memory layout the model expects for its single input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputLayout {
    #[default]
    Nhwc,
    Nchw,
}

/// Loads the trained model once at startup. Any problem (missing weights,
/// incompatible file, runtime compiled out) yields `None` and the engine runs
/// on the heuristic alone.
pub fn load_model_or_none(config: &ModelConfig) -> Option<Arc<dyn ScoringBackend>> {
    let path = &config.path;
    if !path.exists() {
        log::warn!(
            "No model weights at {}, scoring with the heuristic only",
            path.display()
        );
        return None;
    }

    #[cfg(feature = "torch")]
    {
        match torch::TorchBackend::load(path, config.input_layout) {
            Ok(backend) => {
                log::info!("Loaded TorchScript model from {}", path.display());
                Some(Arc::new(backend))
            }
            Err(e) => {
                log::error!("Could not load model from {}: {}", path.display(), e);
                None
            }
        }
    }

    #[cfg(not(feature = "torch"))]
    {
        log::info!(
            "Built without the `torch` feature, ignoring model at {}",
            path.display()
        );
        None
    }
}

#[cfg(feature = "torch")]
pub use torch::TorchBackend;

#[cfg(feature = "torch")]
mod torch {
    use shared::ScoreSource;
    use std::path::Path;
    use std::sync::Mutex;
    use tch::{CModule, Device, Kind, Tensor};

    use super::InputLayout;
    use crate::error::BackendError;
    use crate::inference::backend::{RawOutput, ScoringBackend};
    use crate::inference::normalize::NormalizedTensor;

    impl From<tch::TchError> for BackendError {
        fn from(err: tch::TchError) -> Self {
            BackendError::Inference(err.to_string())
        }
    }

    pub struct TorchBackend {
        module: Mutex<CModule>,
        device: Device,
        layout: InputLayout,
    }

    impl TorchBackend {
        pub fn load(path: &Path, layout: InputLayout) -> Result<Self, BackendError> {
            let device = Device::cuda_if_available();
            let module = CModule::load_on_device(path, device)?;
            Ok(Self {
                module: Mutex::new(module),
                device,
                layout,
            })
        }

        fn prepare(&self, tensor: &NormalizedTensor) -> Result<Tensor, BackendError> {
            let [h, w, c] = NormalizedTensor::SHAPE.map(|d| d as i64);
            let input = Tensor::f_from_slice(&tensor.to_vec())?.f_view([1, h, w, c])?;
            let input = match self.layout {
                InputLayout::Nhwc => input,
                InputLayout::Nchw => input.f_permute([0, 3, 1, 2])?.f_contiguous()?,
            };
            Ok(input.to_device(self.device))
        }
    }

    impl ScoringBackend for TorchBackend {
        fn name(&self) -> &str {
            "torchscript"
        }

        fn source(&self) -> ScoreSource {
            ScoreSource::Model
        }

        fn predict(&self, tensor: &NormalizedTensor) -> Result<RawOutput, BackendError> {
            let input = self.prepare(tensor)?;
            let output = {
                let module = self.module.lock().map_err(|_| BackendError::Unavailable)?;
                tch::no_grad(|| module.forward_ts(&[input]))?
            };
            let output = output.f_to_kind(Kind::Float)?.to_device(Device::Cpu);
            if output.dim() == 0 {
                return Ok(RawOutput::Scalar(output.f_double_value(&[])? as f32));
            }
            let flat = output.f_view([-1])?;
            Ok(RawOutput::Vector(Vec::<f32>::try_from(&flat)?))
        }
    }
}
