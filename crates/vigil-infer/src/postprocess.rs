use crate::{Detection, InferError, Keypoint, LetterboxTransform, TaskType};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use vigil_base::{Rect, Tensor, Vec2};

/// Region of interest in normalized `[0, 1]` image coordinates.
///
/// A ROI with width or height below 0.001 is degenerate and filters
/// nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Roi {
    pub fn is_active(&self) -> bool {
        self.width >= 0.001 && self.height >= 0.001
    }

    fn to_pixels(&self, src_w: u32, src_h: u32) -> Rect<f32> {
        Rect::new(
            Vec2::new(self.x * src_w as f32, self.y * src_h as f32),
            Vec2::new(self.width * src_w as f32, self.height * src_h as f32),
        )
    }
}

/// Decoding parameters for one postprocess run.
#[derive(Debug, Clone, PartialEq)]
pub struct PostprocessConfig {
    pub task: TaskType,
    /// Minimum confidence for a candidate to survive decoding.
    pub confidence: f32,
    /// NMS overlap threshold.
    pub iou: f32,
    /// Suppress across classes instead of per class.
    pub class_agnostic_nms: bool,
    /// Model generation hint; 5-7 use the objectness row layout, 8-25 the
    /// column layout, 26 and later are decoded end to end (no NMS).
    pub model_version: u32,
    pub roi: Option<Roi>,
}

/// Intersection over union of two axis-aligned boxes.
///
/// Returns 0 for boxes with non-positive area and for boxes that are
/// disjoint or touch only along an edge.
pub fn iou(a: &Detection, b: &Detection) -> f32 {
    if a.area() <= 0.0 || b.area() <= 0.0 {
        return 0.0;
    }
    let inter_w = a.right().min(b.right()) - a.left().max(b.left());
    let inter_h = a.bottom().min(b.bottom()) - a.top().max(b.top());
    if inter_w <= 0.0 || inter_h <= 0.0 {
        return 0.0;
    }
    let inter = inter_w * inter_h;
    let union = a.area() + b.area() - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

/// Non-maximum suppression; returns the indices to keep, in descending
/// confidence order. Confidence ties keep their original decode order.
pub fn nms_indices(candidates: &[Detection], threshold: f32, class_agnostic: bool) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    // Stable sort: equal confidences stay in output-column order.
    order.sort_by(|&a, &b| {
        candidates[b]
            .confidence
            .partial_cmp(&candidates[a].confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut keep: Vec<usize> = Vec::with_capacity(order.len());
    'candidates: for idx in order {
        for &kept in &keep {
            let same_class =
                class_agnostic || candidates[kept].class_id == candidates[idx].class_id;
            if same_class && iou(&candidates[kept], &candidates[idx]) > threshold {
                continue 'candidates;
            }
        }
        keep.push(idx);
    }
    keep
}

/// Decode raw model outputs into detections in source-image pixels.
///
/// `outputs` holds the model's output tensors in declaration order
/// (segmentation models add the mask prototype as a second output);
/// `input_extent` is the model input `(w, h)` the tensor was packed for.
pub fn postprocess(
    outputs: &[Tensor<f32>],
    transform: &LetterboxTransform,
    input_extent: (u32, u32),
    label_count: usize,
    cfg: &PostprocessConfig,
) -> Result<Vec<Detection>, InferError> {
    let head = outputs
        .first()
        .ok_or_else(|| invalid("at least one output tensor", "none"))?;

    if cfg.task == TaskType::Classify {
        let mut dets = decode_classify(head, transform, label_count, cfg.confidence)?;
        apply_roi(&mut dets, cfg.roi, transform);
        return Ok(dets);
    }

    let nms_free = cfg.model_version >= 26;

    let mut dets = if nms_free {
        decode_end_to_end(outputs, input_extent, label_count, cfg)?
    } else {
        let candidates = match cfg.task {
            TaskType::Detect if (5..=7).contains(&cfg.model_version) => {
                decode_objectness_rows(head, label_count, cfg.confidence)?
            }
            TaskType::Detect => decode_columns(head, label_count, cfg.confidence)?,
            TaskType::ObbDetect => decode_obb(head, label_count, cfg.confidence)?,
            TaskType::Pose => decode_pose(head, label_count, cfg.confidence)?,
            TaskType::Segment => {
                return decode_segment(outputs, transform, input_extent, label_count, cfg);
            }
            TaskType::Classify => unreachable!(),
        };
        let keep = nms_indices(&candidates, cfg.iou, cfg.class_agnostic_nms);
        let mut slots: Vec<Option<Detection>> = candidates.into_iter().map(Some).collect();
        keep.into_iter().filter_map(|i| slots[i].take()).collect()
    };

    unmap_detections(&mut dets, transform);
    apply_roi(&mut dets, cfg.roi, transform);
    Ok(dets)
}

/// Derive the class count from the output shape when a model carries no
/// label metadata. Pose heads are ambiguous (`4 + nc + 3K` rows) and
/// assumed single-class, as exported pose models are.
pub fn infer_label_count(outputs: &[Tensor<f32>], task: TaskType, model_version: u32) -> Option<usize> {
    let head = outputs.first()?;
    if task == TaskType::Classify {
        return Some(head.len());
    }
    if model_version >= 26 {
        // End-to-end rows carry the class id in column 5, whatever the
        // task-specific trailing columns are.
        let stride = head.dim(2);
        if stride < 6 {
            return None;
        }
        let max_class = head
            .data
            .chunks_exact(stride)
            .map(|row| row[5].max(0.0) as usize)
            .max()
            .unwrap_or(0);
        return Some(max_class + 1);
    }
    match task {
        TaskType::Classify => unreachable!(),
        TaskType::Pose => Some(1),
        TaskType::ObbDetect => head.dim(1).checked_sub(5).filter(|&n| n > 0),
        TaskType::Segment => {
            let nm = outputs.get(1)?.dim(1);
            head.dim(1).checked_sub(4 + nm).filter(|&n| n > 0)
        }
        TaskType::Detect if (5..=7).contains(&model_version) => {
            head.dim(2).checked_sub(5).filter(|&n| n > 0)
        }
        TaskType::Detect => head.dim(1).checked_sub(4).filter(|&n| n > 0),
    }
}

fn invalid(expected: impl Into<String>, got: impl Into<String>) -> InferError {
    InferError::InvalidOutput { expected: expected.into(), got: got.into() }
}

/// Column-major head access for `(1, C, N)` outputs.
struct Columns<'t> {
    data: &'t [f32],
    rows: usize,
    cols: usize,
}

impl<'t> Columns<'t> {
    fn checked(tensor: &'t Tensor<f32>, expected_rows: usize, what: &str) -> Result<Self, InferError> {
        if tensor.ndim() != 3 || tensor.dim(0) != 1 || tensor.dim(1) != expected_rows {
            return Err(invalid(
                format!("shape (1, {expected_rows}, N) for {what}"),
                format!("{:?}", tensor.shape),
            ));
        }
        Ok(Self { data: &tensor.data, rows: tensor.dim(1), cols: tensor.dim(2) })
    }

    fn at(&self, row: usize, col: usize) -> f32 {
        debug_assert!(row < self.rows);
        self.data[row * self.cols + col]
    }
}

/// Standard detect head: `(1, 4 + nc, N)`, each column
/// `(cx, cy, w, h, score_0, .., score_{nc-1})` in model pixels.
fn decode_columns(
    head: &Tensor<f32>,
    label_count: usize,
    confidence: f32,
) -> Result<Vec<Detection>, InferError> {
    let cols = Columns::checked(head, 4 + label_count, "detect head")?;
    let mut out = Vec::new();
    for n in 0..cols.cols {
        let Some((class_id, score)) = best_class(&cols, n, label_count) else { continue };
        if score < confidence {
            continue;
        }
        let det = Detection::new(
            cols.at(0, n),
            cols.at(1, n),
            cols.at(2, n),
            cols.at(3, n),
            score,
            class_id,
        );
        if det.width > 0.0 && det.height > 0.0 {
            out.push(det);
        }
    }
    Ok(out)
}

fn best_class(cols: &Columns<'_>, col: usize, label_count: usize) -> Option<(usize, f32)> {
    let mut best = None;
    for class_id in 0..label_count {
        let score = cols.at(4 + class_id, col);
        match best {
            Some((_, s)) if s >= score => {}
            _ => best = Some((class_id, score)),
        }
    }
    best
}

/// Oriented-box head: detect columns plus one trailing angle row.
fn decode_obb(
    head: &Tensor<f32>,
    label_count: usize,
    confidence: f32,
) -> Result<Vec<Detection>, InferError> {
    let cols = Columns::checked(head, 4 + label_count + 1, "oriented-box head")?;
    let angle_row = 4 + label_count;
    let mut out = Vec::new();
    for n in 0..cols.cols {
        let Some((class_id, score)) = best_class(&cols, n, label_count) else { continue };
        if score < confidence {
            continue;
        }
        let mut det = Detection::new(
            cols.at(0, n),
            cols.at(1, n),
            cols.at(2, n),
            cols.at(3, n),
            score,
            class_id,
        );
        if det.width <= 0.0 || det.height <= 0.0 {
            continue;
        }
        det.angle = Some(cols.at(angle_row, n));
        out.push(det);
    }
    Ok(out)
}

/// Pose head: detect columns plus `3 * K` keypoint rows `(x, y, score)`.
fn decode_pose(
    head: &Tensor<f32>,
    label_count: usize,
    confidence: f32,
) -> Result<Vec<Detection>, InferError> {
    let rows = head.dim(1);
    let base = 4 + label_count;
    if head.ndim() != 3 || head.dim(0) != 1 || rows <= base || (rows - base) % 3 != 0 {
        return Err(invalid(
            format!("shape (1, {base} + 3K, N) for pose head"),
            format!("{:?}", head.shape),
        ));
    }
    let keypoint_count = (rows - base) / 3;
    let cols = Columns { data: &head.data, rows, cols: head.dim(2) };

    let mut out = Vec::new();
    for n in 0..cols.cols {
        let Some((class_id, score)) = best_class(&cols, n, label_count) else { continue };
        if score < confidence {
            continue;
        }
        let mut det = Detection::new(
            cols.at(0, n),
            cols.at(1, n),
            cols.at(2, n),
            cols.at(3, n),
            score,
            class_id,
        );
        if det.width <= 0.0 || det.height <= 0.0 {
            continue;
        }
        let mut keypoints = Vec::with_capacity(keypoint_count);
        for k in 0..keypoint_count {
            keypoints.push(Keypoint {
                position: Vec2::new(cols.at(base + 3 * k, n), cols.at(base + 3 * k + 1, n)),
                confidence: cols.at(base + 3 * k + 2, n),
            });
        }
        det.keypoints = Some(keypoints);
        out.push(det);
    }
    Ok(out)
}

/// Version 5-7 head: `(1, N, 5 + nc)` rows of
/// `(cx, cy, w, h, objectness, score_0, ..)`; confidence is
/// `objectness * class score`.
fn decode_objectness_rows(
    head: &Tensor<f32>,
    label_count: usize,
    confidence: f32,
) -> Result<Vec<Detection>, InferError> {
    let stride = 5 + label_count;
    if head.ndim() != 3 || head.dim(0) != 1 || head.dim(2) != stride {
        return Err(invalid(
            format!("shape (1, N, {stride}) for legacy detect head"),
            format!("{:?}", head.shape),
        ));
    }
    let mut out = Vec::new();
    for row in head.data.chunks_exact(stride) {
        let objectness = row[4];
        let (class_id, class_score) = row[5..]
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
            .unwrap_or((0, 0.0));
        let score = objectness * class_score;
        if score < confidence {
            continue;
        }
        let det = Detection::new(row[0], row[1], row[2], row[3], score, class_id);
        if det.width > 0.0 && det.height > 0.0 {
            out.push(det);
        }
    }
    Ok(out)
}

/// Version >= 26 end-to-end head: `(1, N, 6 + extras)` rows of
/// `(x1, y1, x2, y2, score, class, ..)` in model pixels, already
/// suppressed by the model. The trailing columns depend on the task:
/// `3 * K` keypoint values for pose, one angle for oriented boxes, `nm`
/// mask coefficients (with the prototype as second output) for
/// segmentation. Only confidence filtering, the task extras and
/// coordinate unmapping remain.
fn decode_end_to_end(
    outputs: &[Tensor<f32>],
    input_extent: (u32, u32),
    label_count: usize,
    cfg: &PostprocessConfig,
) -> Result<Vec<Detection>, InferError> {
    let head = &outputs[0];
    let stride = head.dim(2);

    let proto = if cfg.task == TaskType::Segment {
        let proto = outputs
            .get(1)
            .ok_or_else(|| invalid("mask prototype as second output", "one output"))?;
        if proto.ndim() != 4 || proto.dim(0) != 1 {
            return Err(invalid("prototype shape (1, nm, mh, mw)", format!("{:?}", proto.shape)));
        }
        Some(proto)
    } else {
        None
    };

    let stride_fits = match cfg.task {
        TaskType::Detect => stride == 6,
        TaskType::ObbDetect => stride == 7,
        TaskType::Pose => stride > 6 && (stride - 6) % 3 == 0,
        TaskType::Segment => proto.is_some_and(|p| stride == 6 + p.dim(1)),
        TaskType::Classify => false,
    };
    if head.ndim() != 3 || head.dim(0) != 1 || !stride_fits {
        return Err(invalid(
            format!("shape (1, N, 6 + extras) for end-to-end {} head", cfg.task),
            format!("{:?}", head.shape),
        ));
    }

    let mut out = Vec::new();
    for row in head.data.chunks_exact(stride) {
        let score = row[4];
        if score < cfg.confidence {
            continue;
        }
        let class_id = row[5].max(0.0) as usize;
        if class_id >= label_count {
            continue;
        }
        let (x1, y1, x2, y2) = (row[0], row[1], row[2], row[3]);
        let mut det = Detection::new(
            (x1 + x2) / 2.0,
            (y1 + y2) / 2.0,
            x2 - x1,
            y2 - y1,
            score,
            class_id,
        );
        if det.width <= 0.0 || det.height <= 0.0 {
            continue;
        }
        match cfg.task {
            TaskType::Pose => {
                let keypoints = row[6..]
                    .chunks_exact(3)
                    .map(|kp| Keypoint { position: Vec2::new(kp[0], kp[1]), confidence: kp[2] })
                    .collect();
                det.keypoints = Some(keypoints);
            }
            TaskType::ObbDetect => det.angle = Some(row[6]),
            TaskType::Segment => {
                if let Some(proto) = proto {
                    det.mask = Some(assemble_mask(&row[6..], proto, &det, input_extent));
                }
            }
            TaskType::Detect | TaskType::Classify => {}
        }
        out.push(det);
    }
    Ok(out)
}

/// Classification head: a single score vector; the result is one
/// detection with a full-image box.
fn decode_classify(
    head: &Tensor<f32>,
    transform: &LetterboxTransform,
    label_count: usize,
    confidence: f32,
) -> Result<Vec<Detection>, InferError> {
    if head.len() != label_count {
        return Err(invalid(
            format!("{label_count} class scores"),
            format!("{} values of shape {:?}", head.len(), head.shape),
        ));
    }
    let Some((class_id, score)) = head
        .data
        .iter()
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
    else {
        return Ok(Vec::new());
    };
    if score < confidence {
        return Ok(Vec::new());
    }
    let (w, h) = (transform.src_w as f32, transform.src_h as f32);
    Ok(vec![Detection::new(w / 2.0, h / 2.0, w, h, score, class_id)])
}

/// Segmentation: detect columns with `nm` trailing coefficient rows plus
/// a prototype tensor `(1, nm, mh, mw)`; masks are assembled for the
/// detections that survive NMS.
fn decode_segment(
    outputs: &[Tensor<f32>],
    transform: &LetterboxTransform,
    input_extent: (u32, u32),
    label_count: usize,
    cfg: &PostprocessConfig,
) -> Result<Vec<Detection>, InferError> {
    let head = &outputs[0];
    let proto = outputs
        .get(1)
        .ok_or_else(|| invalid("mask prototype as second output", "one output"))?;
    if proto.ndim() != 4 || proto.dim(0) != 1 {
        return Err(invalid("prototype shape (1, nm, mh, mw)", format!("{:?}", proto.shape)));
    }
    let nm = proto.dim(1);
    let cols = Columns::checked(head, 4 + label_count + nm, "segment head")?;

    let mut candidates = Vec::new();
    let mut coefficients: Vec<Vec<f32>> = Vec::new();
    for n in 0..cols.cols {
        let Some((class_id, score)) = best_class(&cols, n, label_count) else { continue };
        if score < cfg.confidence {
            continue;
        }
        let det = Detection::new(
            cols.at(0, n),
            cols.at(1, n),
            cols.at(2, n),
            cols.at(3, n),
            score,
            class_id,
        );
        if det.width <= 0.0 || det.height <= 0.0 {
            continue;
        }
        coefficients.push((0..nm).map(|k| cols.at(4 + label_count + k, n)).collect());
        candidates.push(det);
    }

    let keep = nms_indices(&candidates, cfg.iou, cfg.class_agnostic_nms);
    let mut dets = Vec::with_capacity(keep.len());
    for idx in keep {
        let mut det = candidates[idx].clone();
        det.mask = Some(assemble_mask(&coefficients[idx], proto, &det, input_extent));
        dets.push(det);
    }

    unmap_detections(&mut dets, transform);
    apply_roi(&mut dets, cfg.roi, transform);
    Ok(dets)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Combine mask coefficients with the prototype tensor; the result is a
/// `(mh, mw)` probability map cropped to the detection box.
fn assemble_mask(
    coefficients: &[f32],
    proto: &Tensor<f32>,
    det: &Detection,
    input_extent: (u32, u32),
) -> Tensor<f32> {
    let (nm, mh, mw) = (proto.dim(1), proto.dim(2), proto.dim(3));
    let sx = mw as f32 / input_extent.0 as f32;
    let sy = mh as f32 / input_extent.1 as f32;
    let (left, right) = (det.left() * sx, det.right() * sx);
    let (top, bottom) = (det.top() * sy, det.bottom() * sy);

    let plane = mh * mw;
    let mut mask = vec![0.0f32; plane];
    for y in 0..mh {
        let inside_y = (y as f32) >= top && (y as f32) < bottom;
        if !inside_y {
            continue;
        }
        for x in 0..mw {
            if (x as f32) < left || (x as f32) >= right {
                continue;
            }
            let mut acc = 0.0;
            for k in 0..nm {
                acc += coefficients[k] * proto.data[k * plane + y * mw + x];
            }
            mask[y * mw + x] = sigmoid(acc);
        }
    }
    // Shape and length agree by construction.
    Tensor { shape: vec![mh, mw], data: mask }
}

/// Map detections from model-input pixels back to source pixels, clamp
/// them to the image, and drop boxes that collapse outside it.
fn unmap_detections(dets: &mut Vec<Detection>, transform: &LetterboxTransform) {
    let (max_x, max_y) = (transform.src_w as f32, transform.src_h as f32);
    dets.retain_mut(|det| {
        let left = transform.unmap_x(det.left()).clamp(0.0, max_x);
        let right = transform.unmap_x(det.right()).clamp(0.0, max_x);
        let top = transform.unmap_y(det.top()).clamp(0.0, max_y);
        let bottom = transform.unmap_y(det.bottom()).clamp(0.0, max_y);
        if right - left <= 0.0 || bottom - top <= 0.0 {
            return false;
        }
        det.cx = (left + right) / 2.0;
        det.cy = (top + bottom) / 2.0;
        det.width = right - left;
        det.height = bottom - top;
        if let Some(keypoints) = det.keypoints.as_mut() {
            for kp in keypoints {
                kp.position.x = transform.unmap_x(kp.position.x).clamp(0.0, max_x);
                kp.position.y = transform.unmap_y(kp.position.y).clamp(0.0, max_y);
            }
        }
        true
    });
}

/// Keep only detections whose center falls inside the ROI.
fn apply_roi(dets: &mut Vec<Detection>, roi: Option<Roi>, transform: &LetterboxTransform) {
    let Some(roi) = roi else { return };
    if !roi.is_active() {
        return;
    }
    let rect = roi.to_pixels(transform.src_w, transform.src_h);
    dets.retain(|d| rect.contains(Vec2::new(d.cx, d.cy)));
}
