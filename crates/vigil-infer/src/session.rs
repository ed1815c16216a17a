use crate::{Device, InferError, TaskType};
use ndarray::ArrayD;
use ort::inputs;
use ort::session::Session as OrtSession;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::{Once, OnceLock};
use vigil_base::Tensor;

static ORT_INIT: OnceLock<()> = OnceLock::new();

fn ensure_ort_init() {
    ORT_INIT.get_or_init(|| {
        let _ = ort::init().commit();
    });
}

/// A loaded model backend. `run` is mutation-exclusive: no two inference
/// calls may execute concurrently on the same session, which the
/// `&mut self` receiver enforces at compile time.
pub trait Session: Send {
    /// Execute one forward pass; returns the model's output tensors in
    /// declaration order.
    fn run(&mut self, input: Tensor<f32>) -> Result<Vec<Tensor<f32>>, InferError>;
}

/// ONNX Runtime backed [`Session`].
pub struct OnnxSession {
    session: OrtSession,
    input_name: String,
    output_names: Vec<String>,
}

impl OnnxSession {
    /// Load a model file and build a session on the requested device.
    ///
    /// When CUDA is requested but unavailable the session falls back to
    /// CPU; the fallback is logged once per process.
    pub fn load(path: &Path, device: Device) -> Result<Self, InferError> {
        ensure_ort_init();
        let mut builder = OrtSession::builder()
            .map_err(|e| InferError::ModelLoad(format!("session builder: {e}")))?;

        builder = match device {
            Device::Cpu => builder
                .with_execution_providers([
                    ort::execution_providers::CPUExecutionProvider::default().build(),
                ])
                .map_err(|e| InferError::ModelLoad(format!("CPU provider: {e}")))?,
            #[cfg(feature = "cuda")]
            Device::Cuda { device_id } => {
                use ort::ep::ExecutionProvider;
                let ep = ort::execution_providers::CUDAExecutionProvider::default()
                    .with_device_id(device_id);
                if ep.is_available().unwrap_or(false) {
                    builder
                        .with_execution_providers([
                            ep.build(),
                            ort::execution_providers::CPUExecutionProvider::default().build(),
                        ])
                        .map_err(|e| InferError::ModelLoad(format!("CUDA provider: {e}")))?
                } else {
                    warn_gpu_fallback(device);
                    builder
                        .with_execution_providers([
                            ort::execution_providers::CPUExecutionProvider::default().build(),
                        ])
                        .map_err(|e| InferError::ModelLoad(format!("CPU provider: {e}")))?
                }
            }
            #[cfg(not(feature = "cuda"))]
            Device::Cuda { .. } => {
                warn_gpu_fallback(device);
                builder
                    .with_execution_providers([
                        ort::execution_providers::CPUExecutionProvider::default().build(),
                    ])
                    .map_err(|e| InferError::ModelLoad(format!("CPU provider: {e}")))?
            }
        };

        let session = builder
            .commit_from_file(path)
            .map_err(|e| InferError::ModelLoad(format!("{}: {e}", path.display())))?;

        let input_name = session
            .inputs
            .iter()
            .next()
            .map(|input| input.name.clone())
            .ok_or_else(|| InferError::ModelLoad("model declares no inputs".to_string()))?;
        let output_names: Vec<String> =
            session.outputs.iter().map(|output| output.name.clone()).collect();
        if output_names.is_empty() {
            return Err(InferError::ModelLoad("model declares no outputs".to_string()));
        }

        Ok(Self { session, input_name, output_names })
    }

    /// Class labels from the model's `names` metadata entry, if present.
    pub fn metadata_labels(&self) -> Option<Vec<String>> {
        let metadata = self.session.metadata().ok()?;
        let names = metadata.custom("names").ok()??;
        parse_label_map(&names)
    }
}

fn warn_gpu_fallback(device: Device) {
    static WARNED: Once = Once::new();
    WARNED.call_once(|| {
        log::warn!("{device} unavailable, falling back to CPU execution");
    });
}

impl Session for OnnxSession {
    fn run(&mut self, input: Tensor<f32>) -> Result<Vec<Tensor<f32>>, InferError> {
        let array = ArrayD::from_shape_vec(input.shape.clone(), input.data)
            .map_err(|e| InferError::Backend(format!("input tensor: {e}")))?;
        let tensor_ref = TensorRef::from_array_view(array.view())
            .map_err(|e| InferError::Backend(format!("input tensor ref: {e}")))?;

        let outputs = self
            .session
            .run(inputs![self.input_name.as_str() => tensor_ref])
            .map_err(|e| InferError::Backend(format!("inference failed: {e}")))?;

        let mut result = Vec::with_capacity(self.output_names.len());
        for name in &self.output_names {
            let value = &outputs[name.as_str()];
            let array = value.try_extract_array::<f32>().map_err(|e| {
                InferError::Backend(format!("output '{name}' is not f32: {e}"))
            })?;
            result.push(Tensor::new(array.shape().to_vec(), array.iter().copied().collect())?);
        }
        Ok(result)
    }
}

/// Parse an exported label map of the form `{0: 'person', 1: 'bicycle'}`
/// into an index-ordered label list.
pub fn parse_label_map(raw: &str) -> Option<Vec<String>> {
    let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
    let mut pairs: Vec<(usize, String)> = Vec::new();
    for entry in split_outside_quotes(body) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (key, value) = entry.split_once(':')?;
        let index: usize = key.trim().parse().ok()?;
        let label = value.trim().trim_matches(|c| c == '\'' || c == '"').to_string();
        pairs.push((index, label));
    }
    if pairs.is_empty() {
        return None;
    }
    pairs.sort_by_key(|&(index, _)| index);
    Some(pairs.into_iter().map(|(_, label)| label).collect())
}

/// Split on commas that are not inside single or double quotes.
fn split_outside_quotes(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match (c, quote) {
            ('\'' | '"', None) => quote = Some(c),
            (c, Some(q)) if c == q => quote = None,
            (',', None) => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// How a model should be loaded and interpreted; values come from the
/// detection section of the configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub task: TaskType,
    pub model_version: u32,
    pub device: Device,
    pub input_w: u32,
    pub input_h: u32,
}

/// A [`Session`] bundled with the model facts the pipeline needs: label
/// list, input extent, task type and version hint.
pub struct InferenceSession {
    name: String,
    labels: Vec<String>,
    input_w: u32,
    input_h: u32,
    task: TaskType,
    model_version: u32,
    session: Box<dyn Session>,
}

impl std::fmt::Debug for InferenceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceSession")
            .field("name", &self.name)
            .field("labels", &self.labels.len())
            .field("input", &(self.input_w, self.input_h))
            .field("task", &self.task)
            .field("model_version", &self.model_version)
            .finish()
    }
}

impl InferenceSession {
    /// Load an ONNX model and wrap it with its metadata. Labels come
    /// from the model's metadata when present, otherwise they are
    /// generated as `class0..classN` placeholders once the first output
    /// is seen — so loading never fails for missing names.
    pub fn load(path: &Path, settings: &SessionSettings) -> Result<Self, InferError> {
        let onnx = OnnxSession::load(path, settings.device)?;
        let labels = onnx.metadata_labels().unwrap_or_default();
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::from_parts(name, Box::new(onnx), labels, settings))
    }

    /// Assemble a session from an arbitrary backend; used for non-ONNX
    /// backends and scripted sessions in tests.
    pub fn from_parts(
        name: String,
        session: Box<dyn Session>,
        labels: Vec<String>,
        settings: &SessionSettings,
    ) -> Self {
        Self {
            name,
            labels,
            input_w: settings.input_w,
            input_h: settings.input_h,
            task: settings.task,
            model_version: settings.model_version,
            session,
        }
    }

    pub fn infer(&mut self, input: Tensor<f32>) -> Result<Vec<Tensor<f32>>, InferError> {
        self.session.run(input)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Ensure `count` labels exist, padding with `classN` placeholders.
    pub fn ensure_labels(&mut self, count: usize) {
        while self.labels.len() < count {
            self.labels.push(format!("class{}", self.labels.len()));
        }
    }

    pub fn input_extent(&self) -> (u32, u32) {
        (self.input_w, self.input_h)
    }

    pub fn task_type(&self) -> TaskType {
        self.task
    }

    pub fn set_task_type(&mut self, task: TaskType) {
        self.task = task;
    }

    pub fn model_version(&self) -> u32 {
        self.model_version
    }
}
