use vigil_base::Tensor;
use vigil_infer::{
    Detection, InferError, LetterboxTransform, PostprocessConfig, Roi, TaskType, iou,
    nms_indices, postprocess,
};

fn det(cx: f32, cy: f32, w: f32, h: f32, conf: f32, class_id: usize) -> Detection {
    Detection::new(cx, cy, w, h, conf, class_id)
}

fn identity_transform(src_w: u32, src_h: u32) -> LetterboxTransform {
    LetterboxTransform { scale: 1.0, pad_x: 0, pad_y: 0, src_w, src_h }
}

fn config(task: TaskType) -> PostprocessConfig {
    PostprocessConfig {
        task,
        confidence: 0.25,
        iou: 0.45,
        class_agnostic_nms: false,
        model_version: 11,
        roi: None,
    }
}

/// Build a `(1, 4 + nc, N)` column-layout head from candidate rows of
/// `(cx, cy, w, h, scores...)`.
fn column_head(nc: usize, candidates: &[Vec<f32>]) -> Tensor<f32> {
    let rows = 4 + nc;
    let n = candidates.len();
    let mut data = vec![0.0; rows * n];
    for (col, cand) in candidates.iter().enumerate() {
        assert_eq!(cand.len(), rows);
        for (row, &v) in cand.iter().enumerate() {
            data[row * n + col] = v;
        }
    }
    Tensor::new(vec![1, rows, n], data).unwrap()
}

// --- IoU contract -------------------------------------------------------

#[test]
fn iou_identical_boxes_is_one() {
    let a = det(100.0, 100.0, 50.0, 50.0, 0.9, 0);
    assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
}

#[test]
fn iou_known_overlap() {
    // Boxes A(100,100,100x100) and B(125,125,100x100): inter 75*75, IoU ~ 0.391.
    let a = det(100.0, 100.0, 100.0, 100.0, 0.9, 0);
    let b = det(125.0, 125.0, 100.0, 100.0, 0.8, 0);
    let v = iou(&a, &b);
    assert!((v - 0.391).abs() < 0.01, "iou was {v}");
    assert_eq!(iou(&a, &b), iou(&b, &a));
}

#[test]
fn iou_disjoint_and_touching_are_zero() {
    let a = det(50.0, 50.0, 100.0, 100.0, 0.9, 0);
    let disjoint = det(500.0, 500.0, 100.0, 100.0, 0.9, 0);
    // Touching along x = 100 only.
    let touching = det(150.0, 50.0, 100.0, 100.0, 0.9, 0);
    assert_eq!(iou(&a, &disjoint), 0.0);
    assert_eq!(iou(&a, &touching), 0.0);
}

#[test]
fn iou_zero_area_is_zero() {
    let a = det(10.0, 10.0, 0.0, 10.0, 0.9, 0);
    let b = det(10.0, 10.0, 10.0, 10.0, 0.9, 0);
    assert_eq!(iou(&a, &b), 0.0);
}

// --- NMS ---------------------------------------------------------------

#[test]
fn nms_keeps_highest_of_identical_boxes() {
    let candidates = vec![
        det(100.0, 100.0, 50.0, 50.0, 0.8, 0),
        det(100.0, 100.0, 50.0, 50.0, 0.9, 0),
    ];
    let keep = nms_indices(&candidates, 0.5, false);
    assert_eq!(keep, vec![1]);
}

#[test]
fn nms_is_per_class_by_default() {
    let candidates = vec![
        det(100.0, 100.0, 50.0, 50.0, 0.9, 0),
        det(100.0, 100.0, 50.0, 50.0, 0.8, 1),
    ];
    assert_eq!(nms_indices(&candidates, 0.5, false).len(), 2);
    assert_eq!(nms_indices(&candidates, 0.5, true), vec![0]);
}

#[test]
fn nms_tie_break_is_stable() {
    let candidates = vec![
        det(100.0, 100.0, 50.0, 50.0, 0.7, 0),
        det(100.0, 100.0, 50.0, 50.0, 0.7, 0),
    ];
    assert_eq!(nms_indices(&candidates, 0.5, false), vec![0]);
}

#[test]
fn nms_retained_pairs_respect_threshold() {
    let candidates = vec![
        det(100.0, 100.0, 100.0, 100.0, 0.9, 0),
        det(125.0, 125.0, 100.0, 100.0, 0.8, 0), // IoU ~0.391 with the first
        det(105.0, 105.0, 100.0, 100.0, 0.7, 0), // IoU ~0.72 with the first
    ];
    let keep = nms_indices(&candidates, 0.45, false);
    assert_eq!(keep, vec![0, 1]);
    for (i, &a) in keep.iter().enumerate() {
        for &b in &keep[i + 1..] {
            assert!(iou(&candidates[a], &candidates[b]) <= 0.45);
        }
    }
}

// --- Decode ------------------------------------------------------------

#[test]
fn detect_columns_filter_and_suppress() {
    let head = column_head(
        2,
        &[
            vec![100.0, 100.0, 50.0, 50.0, 0.9, 0.05],
            vec![100.0, 100.0, 50.0, 50.0, 0.8, 0.1], // duplicate, suppressed
            vec![300.0, 300.0, 40.0, 40.0, 0.1, 0.7], // class 1
            vec![500.0, 500.0, 40.0, 40.0, 0.2, 0.01], // below threshold
        ],
    );
    let dets = postprocess(
        &[head],
        &identity_transform(640, 640),
        (640, 640),
        2,
        &config(TaskType::Detect),
    )
    .unwrap();

    assert_eq!(dets.len(), 2);
    assert_eq!(dets[0].class_id, 0);
    assert!((dets[0].confidence - 0.9).abs() < 1e-6);
    assert_eq!(dets[1].class_id, 1);
    for d in &dets {
        assert!(d.confidence >= 0.0 && d.confidence <= 1.0);
        assert!(d.width > 0.0 && d.height > 0.0);
        assert!(d.class_id < 2);
    }
}

#[test]
fn detect_shape_mismatch_is_invalid_output() {
    let head = Tensor::new(vec![1, 3, 4], vec![0.0; 12]).unwrap();
    let err = postprocess(
        &[head],
        &identity_transform(640, 640),
        (640, 640),
        2,
        &config(TaskType::Detect),
    )
    .unwrap_err();
    assert!(matches!(err, InferError::InvalidOutput { .. }));
}

#[test]
fn boxes_unmap_through_letterbox() {
    // 1920x1080 source letterboxed into 640x640: scale 1/3, pad_y 140.
    let transform = LetterboxTransform { scale: 1.0 / 3.0, pad_x: 0, pad_y: 140, src_w: 1920, src_h: 1080 };
    // A box centered at source (960, 540) maps to model (320, 320).
    let head = column_head(1, &[vec![320.0, 320.0, 100.0, 100.0, 0.9]]);
    let dets = postprocess(&[head], &transform, (640, 640), 1, &config(TaskType::Detect)).unwrap();

    assert_eq!(dets.len(), 1);
    assert!((dets[0].cx - 960.0).abs() < 1.0);
    assert!((dets[0].cy - 540.0).abs() < 1.0);
    assert!((dets[0].width - 300.0).abs() < 1.0);
}

#[test]
fn boxes_clamp_to_source_extent() {
    let transform = identity_transform(100, 100);
    let head = column_head(1, &[vec![95.0, 95.0, 30.0, 30.0, 0.9]]);
    let dets = postprocess(&[head], &transform, (640, 640), 1, &config(TaskType::Detect)).unwrap();

    assert_eq!(dets.len(), 1);
    assert!(dets[0].right() <= 100.0);
    assert!(dets[0].bottom() <= 100.0);
}

#[test]
fn roi_keeps_only_centers_inside() {
    let head = column_head(
        1,
        &[
            vec![100.0, 100.0, 50.0, 50.0, 0.9],
            vec![500.0, 500.0, 50.0, 50.0, 0.9],
        ],
    );
    let mut cfg = config(TaskType::Detect);
    cfg.roi = Some(Roi { x: 0.0, y: 0.0, width: 0.5, height: 0.5 });
    let dets =
        postprocess(&[head], &identity_transform(640, 640), (640, 640), 1, &cfg).unwrap();
    assert_eq!(dets.len(), 1);
    assert!((dets[0].cx - 100.0).abs() < 1.0);
}

#[test]
fn degenerate_roi_is_a_no_op() {
    let head = column_head(
        1,
        &[
            vec![100.0, 100.0, 50.0, 50.0, 0.9],
            vec![500.0, 500.0, 50.0, 50.0, 0.9],
        ],
    );
    let mut cfg = config(TaskType::Detect);
    cfg.roi = Some(Roi { x: 0.2, y: 0.2, width: 0.0005, height: 0.5 });
    let dets =
        postprocess(&[head], &identity_transform(640, 640), (640, 640), 1, &cfg).unwrap();
    assert_eq!(dets.len(), 2);
}

#[test]
fn classify_emits_single_full_image_detection() {
    let head = Tensor::new(vec![1, 3], vec![0.1, 0.7, 0.2]).unwrap();
    let dets = postprocess(
        &[head],
        &identity_transform(800, 600),
        (224, 224),
        3,
        &config(TaskType::Classify),
    )
    .unwrap();

    assert_eq!(dets.len(), 1);
    assert_eq!(dets[0].class_id, 1);
    assert_eq!(dets[0].width, 800.0);
    assert_eq!(dets[0].height, 600.0);
    assert_eq!(dets[0].cx, 400.0);
}

#[test]
fn obb_carries_the_angle() {
    // Rows: cx, cy, w, h, score, angle.
    let n = 1;
    let data = vec![100.0, 100.0, 50.0, 20.0, 0.9, 0.5];
    let head = Tensor::new(vec![1, 6, n], data).unwrap();
    let dets = postprocess(
        &[head],
        &identity_transform(640, 640),
        (640, 640),
        1,
        &config(TaskType::ObbDetect),
    )
    .unwrap();

    assert_eq!(dets.len(), 1);
    assert!((dets[0].angle.unwrap() - 0.5).abs() < 1e-6);
}

#[test]
fn pose_decodes_keypoints() {
    // 1 class, 2 keypoints: rows = 4 + 1 + 6 = 11, one column.
    let data = vec![100.0, 100.0, 50.0, 50.0, 0.9, 10.0, 20.0, 0.8, 30.0, 40.0, 0.6];
    let head = Tensor::new(vec![1, 11, 1], data).unwrap();
    let dets = postprocess(
        &[head],
        &identity_transform(640, 640),
        (640, 640),
        1,
        &config(TaskType::Pose),
    )
    .unwrap();

    assert_eq!(dets.len(), 1);
    let kps = dets[0].keypoints.as_ref().unwrap();
    assert_eq!(kps.len(), 2);
    assert!((kps[0].position.x - 10.0).abs() < 1e-6);
    assert!((kps[1].confidence - 0.6).abs() < 1e-6);
}

#[test]
fn segment_builds_cropped_masks() {
    // 1 class, 2 coefficients; one candidate column.
    // Rows: cx, cy, w, h, score, c0, c1.
    let head = Tensor::new(vec![1, 7, 1], vec![8.0, 8.0, 8.0, 8.0, 0.9, 10.0, 0.0]).unwrap();
    // Prototype (1, 2, 4, 4): first plane all ones, second all zeros.
    let mut proto_data = vec![1.0; 16];
    proto_data.extend(vec![0.0; 16]);
    let proto = Tensor::new(vec![1, 2, 4, 4], proto_data).unwrap();

    let dets = postprocess(
        &[head, proto],
        &identity_transform(16, 16),
        (16, 16),
        1,
        &config(TaskType::Segment),
    )
    .unwrap();

    assert_eq!(dets.len(), 1);
    let mask = dets[0].mask.as_ref().unwrap();
    assert_eq!(mask.shape, vec![4, 4]);
    // Box covers model pixels 4..12 -> proto pixels 1..3 in both axes.
    let inside = mask.data[1 * 4 + 1];
    let outside = mask.data[0];
    assert!(inside > 0.99, "inside mask value {inside}");
    assert_eq!(outside, 0.0);
}

#[test]
fn segment_without_prototype_is_invalid() {
    let head = Tensor::new(vec![1, 7, 1], vec![0.0; 7]).unwrap();
    let err = postprocess(
        &[head],
        &identity_transform(16, 16),
        (16, 16),
        1,
        &config(TaskType::Segment),
    )
    .unwrap_err();
    assert!(matches!(err, InferError::InvalidOutput { .. }));
}

// --- Version branches ----------------------------------------------------

#[test]
fn legacy_rows_multiply_objectness() {
    // (1, N, 5 + nc): one row, objectness 0.5, class scores (0.8, 0.1).
    let head = Tensor::new(vec![1, 1, 7], vec![100.0, 100.0, 50.0, 50.0, 0.5, 0.8, 0.1]).unwrap();
    let mut cfg = config(TaskType::Detect);
    cfg.model_version = 5;
    let dets =
        postprocess(&[head], &identity_transform(640, 640), (640, 640), 2, &cfg).unwrap();
    assert_eq!(dets.len(), 1);
    assert!((dets[0].confidence - 0.4).abs() < 1e-6);
}

#[test]
fn end_to_end_rows_skip_nms() {
    // Two heavily overlapping rows survive because version >= 26 output
    // is trusted as already suppressed.
    let rows = vec![
        90.0, 90.0, 140.0, 140.0, 0.9, 0.0, //
        92.0, 92.0, 142.0, 142.0, 0.8, 0.0,
    ];
    let head = Tensor::new(vec![1, 2, 6], rows).unwrap();
    let mut cfg = config(TaskType::Detect);
    cfg.model_version = 26;
    let dets =
        postprocess(&[head], &identity_transform(640, 640), (640, 640), 1, &cfg).unwrap();

    assert_eq!(dets.len(), 2);
    // x1y1x2y2 -> center/size.
    assert!((dets[0].cx - 115.0).abs() < 1e-3);
    assert!((dets[0].width - 50.0).abs() < 1e-3);
}

#[test]
fn end_to_end_obb_rows_carry_the_angle() {
    // Rows: x1, y1, x2, y2, score, class, angle. Two overlapping rows
    // must both survive — the model already suppressed duplicates.
    let rows = vec![
        90.0, 90.0, 140.0, 140.0, 0.9, 0.0, 0.4, //
        92.0, 92.0, 142.0, 142.0, 0.8, 0.0, -0.2,
    ];
    let head = Tensor::new(vec![1, 2, 7], rows).unwrap();
    let mut cfg = config(TaskType::ObbDetect);
    cfg.model_version = 26;
    let dets =
        postprocess(&[head], &identity_transform(640, 640), (640, 640), 1, &cfg).unwrap();

    assert_eq!(dets.len(), 2);
    assert!((dets[0].angle.unwrap() - 0.4).abs() < 1e-6);
    assert!((dets[1].angle.unwrap() + 0.2).abs() < 1e-6);
}

#[test]
fn end_to_end_segment_rows_assemble_masks() {
    // Rows: x1, y1, x2, y2, score, class, c0, c1; box covers model
    // pixels 4..12 of a 16x16 input.
    let rows = vec![4.0, 4.0, 12.0, 12.0, 0.9, 0.0, 10.0, 0.0];
    let head = Tensor::new(vec![1, 1, 8], rows).unwrap();
    // Prototype (1, 2, 4, 4): first plane ones, second zeros.
    let mut proto_data = vec![1.0; 16];
    proto_data.extend(vec![0.0; 16]);
    let proto = Tensor::new(vec![1, 2, 4, 4], proto_data).unwrap();

    let mut cfg = config(TaskType::Segment);
    cfg.model_version = 26;
    let dets =
        postprocess(&[head, proto], &identity_transform(16, 16), (16, 16), 1, &cfg).unwrap();

    assert_eq!(dets.len(), 1);
    let mask = dets[0].mask.as_ref().unwrap();
    assert_eq!(mask.shape, vec![4, 4]);
    assert!(mask.data[1 * 4 + 1] > 0.99);
    assert_eq!(mask.data[0], 0.0);
}

#[test]
fn end_to_end_stride_mismatch_is_invalid() {
    // An OBB head without its angle column must fail fast.
    let head = Tensor::new(vec![1, 1, 6], vec![90.0, 90.0, 140.0, 140.0, 0.9, 0.0]).unwrap();
    let mut cfg = config(TaskType::ObbDetect);
    cfg.model_version = 26;
    let err = postprocess(&[head], &identity_transform(640, 640), (640, 640), 1, &cfg)
        .unwrap_err();
    assert!(matches!(err, InferError::InvalidOutput { .. }));
}

#[test]
fn end_to_end_rows_still_filter_confidence() {
    let rows = vec![
        90.0, 90.0, 140.0, 140.0, 0.9, 0.0, //
        300.0, 300.0, 340.0, 340.0, 0.1, 0.0,
    ];
    let head = Tensor::new(vec![1, 2, 6], rows).unwrap();
    let mut cfg = config(TaskType::Detect);
    cfg.model_version = 26;
    let dets =
        postprocess(&[head], &identity_transform(640, 640), (640, 640), 1, &cfg).unwrap();
    assert_eq!(dets.len(), 1);
}
