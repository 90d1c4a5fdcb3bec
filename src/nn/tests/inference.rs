//! 形状推断测试

use crate::nn::{BlockCatalog, DType, Dim, Node, ShapeInference, TensorShape, to_image_shape};

fn f32_shape(dims: &[Dim]) -> TensorShape {
    TensorShape::new(DType::Float32, dims.to_vec())
}

#[test]
fn test_dense_template_uses_default_units() {
    let catalog = BlockCatalog::builtin();
    let inference = ShapeInference::new(&catalog);
    let shape = inference.infer(&Node::new("d", "Dense"), None).unwrap();
    assert_eq!(shape, f32_shape(&[Dim::Batch, Dim::Fixed(64)]));
}

#[test]
fn test_dense_propagates_leading_dims() {
    let catalog = BlockCatalog::builtin();
    let inference = ShapeInference::new(&catalog);
    let node = Node::new("d", "Dense").with_param("units", 8);
    let shape = inference
        .infer(&node, Some(&TensorShape::batched(&[5, 3])))
        .unwrap();
    assert_eq!(shape, TensorShape::batched(&[5, 8]));
}

#[test]
fn test_max_pool_halves_spatial_dims() {
    let catalog = BlockCatalog::builtin();
    let inference = ShapeInference::new(&catalog);
    let node = Node::new("p", "MaxPooling2D");
    let shape = inference
        .infer(&node, Some(&TensorShape::batched(&[28, 28, 1])))
        .unwrap();
    assert_eq!(shape, TensorShape::batched(&[14, 14, 1]));

    // 向下取整，动态维度保持动态
    let node = Node::new("p", "MaxPooling2D").with_param("pool_size", 3);
    let upstream = f32_shape(&[Dim::Batch, Dim::Fixed(10), Dim::Batch, Dim::Fixed(4)]);
    let shape = inference.infer(&node, Some(&upstream)).unwrap();
    assert_eq!(
        shape,
        f32_shape(&[Dim::Batch, Dim::Fixed(3), Dim::Batch, Dim::Fixed(4)])
    );
}

#[test]
fn test_conv2d_rewrites_channels_only() {
    let catalog = BlockCatalog::builtin();
    let inference = ShapeInference::new(&catalog);
    let node = Node::new("c", "Conv2D").with_param("filters", 16);
    let shape = inference
        .infer(&node, Some(&TensorShape::batched(&[28, 28, 1])))
        .unwrap();
    assert_eq!(shape, TensorShape::batched(&[28, 28, 16]));
}

#[test]
fn test_flatten() {
    let catalog = BlockCatalog::builtin();
    let inference = ShapeInference::new(&catalog);
    let node = Node::new("f", "Flatten");
    let shape = inference
        .infer(&node, Some(&TensorShape::batched(&[14, 14, 8])))
        .unwrap();
    assert_eq!(shape, TensorShape::batched(&[1568]));
}

#[test]
fn test_lstm_drops_time_axis() {
    let catalog = BlockCatalog::builtin();
    let inference = ShapeInference::new(&catalog);
    let upstream = TensorShape::batched(&[20, 6]);

    let node = Node::new("l", "LSTM").with_param("units", 32);
    assert_eq!(
        inference.infer(&node, Some(&upstream)).unwrap(),
        TensorShape::batched(&[32])
    );

    let node = node.with_param("return_sequences", true);
    assert_eq!(
        inference.infer(&node, Some(&upstream)).unwrap(),
        TensorShape::batched(&[20, 32])
    );
}

#[test]
fn test_passthrough_and_attention() {
    let catalog = BlockCatalog::builtin();
    let inference = ShapeInference::new(&catalog);
    let upstream = TensorShape::batched(&[10, 16]);

    let dropout = inference.infer(&Node::new("d", "Dropout"), Some(&upstream)).unwrap();
    assert_eq!(dropout, upstream);

    let attention = Node::new("a", "MultiHeadAttention").with_param("dim", 24);
    assert_eq!(
        inference.infer(&attention, Some(&upstream)).unwrap(),
        TensorShape::batched(&[10, 24])
    );
}

#[test]
fn test_unknown_type_or_bad_params() {
    let catalog = BlockCatalog::builtin();
    let inference = ShapeInference::new(&catalog);
    assert_eq!(inference.infer(&Node::new("x", "Mystery"), None), None);
    let bad = Node::new("d", "Dense").with_param("units", "lots");
    assert_eq!(inference.infer(&bad, None), None);
}

#[test]
fn test_inference_is_pure() {
    let catalog = BlockCatalog::builtin();
    let inference = ShapeInference::new(&catalog);
    let node = Node::new("c", "Conv2D").with_param("filters", 4);
    let upstream = TensorShape::batched(&[8, 8, 3]);
    let first = inference.infer(&node, Some(&upstream));
    assert_eq!(inference.infer(&node, Some(&upstream)), first);
}

#[test]
fn test_to_image_shape() {
    assert_eq!(
        to_image_shape(&TensorShape::batched(&[784])),
        TensorShape::batched(&[784, 1, 1])
    );
    assert_eq!(
        to_image_shape(&TensorShape::batched(&[28, 28])),
        TensorShape::batched(&[28, 28, 1])
    );
    assert_eq!(
        to_image_shape(&TensorShape::batched(&[32, 32, 3])),
        TensorShape::batched(&[32, 32, 3])
    );
}
