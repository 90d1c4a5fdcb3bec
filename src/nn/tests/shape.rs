//! TensorShape / DType 兼容性规则测试

use crate::nn::{DType, Dim, ShapeCheck, TensorShape, check_shapes};

fn f32_shape(dims: &[Dim]) -> TensorShape {
    TensorShape::new(DType::Float32, dims.to_vec())
}

#[test]
fn test_dtype_subtype_chain() {
    assert!(DType::Bool.flows_into(DType::Int32));
    assert!(DType::Bool.flows_into(DType::Float32));
    assert!(DType::Int32.flows_into(DType::Float32));
    assert!(DType::Float32.flows_into(DType::Float32));

    // 反方向不成立
    assert!(!DType::Float32.flows_into(DType::Int32));
    assert!(!DType::Float32.flows_into(DType::Bool));
    assert!(!DType::Int32.flows_into(DType::Bool));
}

#[test]
fn test_display() {
    assert_eq!(TensorShape::batched(&[28, 28, 1]).to_string(), "(batch, 28, 28, 1)");
    assert_eq!(f32_shape(&[Dim::Batch, Dim::Unknown]).to_string(), "(batch, ?)");
    assert_eq!(TensorShape::scalar().to_string(), "float32[]");
}

#[test]
fn test_sample_size_and_resolution() {
    let image = TensorShape::batched(&[28, 28, 1]);
    assert!(image.is_resolved());
    assert_eq!(image.sample_size(), Some(784));
    assert_eq!(image.feature_dims(), &[Dim::Fixed(28), Dim::Fixed(28), Dim::Fixed(1)]);

    let open = f32_shape(&[Dim::Batch, Dim::Unknown]);
    assert!(!open.is_resolved());
    assert!(open.has_unknown());
    assert_eq!(open.sample_size(), None);

    // 标量的样本长度为 1
    assert_eq!(TensorShape::scalar().sample_size(), Some(1));
}

#[test]
fn test_with_last() {
    let shape = TensorShape::batched(&[5, 3]).with_last(Dim::Fixed(7));
    assert_eq!(shape, TensorShape::batched(&[5, 7]));

    // 秩 0 时追加一维
    let shape = TensorShape::scalar().with_last(Dim::Fixed(2));
    assert_eq!(shape.dims, vec![Dim::Fixed(2)]);
}

#[test]
fn test_check_shapes_scalars_compatible() {
    assert_eq!(
        check_shapes(&TensorShape::scalar(), &TensorShape::scalar()),
        ShapeCheck::Compatible
    );
}

#[test]
fn test_check_shapes_dynamic_dims_match_anything() {
    let source = TensorShape::batched(&[784]);
    let target = f32_shape(&[Dim::Batch, Dim::Batch]);
    assert_eq!(check_shapes(&source, &target), ShapeCheck::Compatible);

    let target = f32_shape(&[Dim::Batch, Dim::Unknown]);
    assert_eq!(check_shapes(&source, &target), ShapeCheck::Compatible);
}

#[test]
fn test_check_shapes_dimension_mismatch() {
    let source = TensorShape::batched(&[28, 28, 1]);
    let target = TensorShape::batched(&[28, 28, 3]);
    assert_eq!(
        check_shapes(&source, &target),
        ShapeCheck::DimensionMismatch {
            index: 3,
            source: 1,
            target: 3,
        }
    );
}

#[test]
fn test_check_shapes_rank_rules() {
    let flat = TensorShape::batched(&[784]);

    // 目标含占位符：仅警告
    let image = f32_shape(&[Dim::Batch, Dim::Unknown, Dim::Unknown, Dim::Unknown]);
    assert_eq!(check_shapes(&flat, &image), ShapeCheck::RankWarning);

    // 目标全是确定/batch 维：不兼容
    let matrix = f32_shape(&[Dim::Batch, Dim::Batch]);
    assert_eq!(
        check_shapes(&TensorShape::scalar(), &matrix),
        ShapeCheck::RankMismatch
    );
}

#[test]
fn test_shape_serde_round_trip() {
    let shape = f32_shape(&[Dim::Batch, Dim::Fixed(10), Dim::Unknown]);
    let json = serde_json::to_string(&shape).unwrap();
    let back: TensorShape = serde_json::from_str(&json).unwrap();
    assert_eq!(back, shape);
}
